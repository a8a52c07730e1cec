//! # Pipeline Errors
//!
//! パイプライン全体で共有するエラー分類
//!
//! インフラ層の trait は `anyhow::Result` を返し、ユースケースの境界で
//! この列挙型に分類し直す。

use thiserror::Error;

/// パイプラインのエラー種別
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// ログインまたはセッションの失敗（今回の実行のみ致命的）
    #[error("authentication failed: {0}")]
    Auth(String),

    /// ページ遷移のタイムアウト（ステップ単位で回復可能）
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// タイムアウト以外のページ遷移失敗
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// 抽出の失敗（空または部分的な出力になる）
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// 送信経路のエラー（接続単位でリトライ、宛先単位で隔離）
    #[error("transport error: {0}")]
    Transport(String),

    /// 認証情報や宛先の不足（リトライしない）
    #[error("configuration error: {0}")]
    Configuration(String),

    /// レンダリング環境を起動できない
    #[error("failed to launch the rendering environment: {0}")]
    Launch(String),
}

impl PipelineError {
    /// タイムアウト由来のエラーかどうか
    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::NavigationTimeout { .. })
    }

    /// ページ遷移の失敗を分類する（タイムアウトはそのまま残す）
    pub fn navigation(url: &str, error: &anyhow::Error) -> PipelineError {
        Self::classify(error, |reason| PipelineError::Navigation {
            url: url.to_string(),
            reason,
        })
    }

    /// `anyhow::Error` の中に `PipelineError` が埋め込まれていれば取り出し、
    /// そうでなければ `fallback` で分類する
    pub fn classify(
        error: &anyhow::Error,
        fallback: impl FnOnce(String) -> PipelineError,
    ) -> PipelineError {
        match error.downcast_ref::<PipelineError>() {
            Some(inner) => inner.clone(),
            None => fallback(crate::domain::services::retry::error_chain_to_string(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_keeps_embedded_kind() {
        let error = anyhow::Error::new(PipelineError::NavigationTimeout {
            url: "https://example.com/a".to_string(),
            timeout_ms: 30000,
        });

        let classified = PipelineError::classify(&error, PipelineError::Extraction);

        assert!(classified.is_timeout());
    }

    #[test]
    fn test_classify_uses_fallback_with_full_chain() {
        use anyhow::Context;

        let error = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("SMTP connect failed")
            .unwrap_err();

        let classified = PipelineError::classify(&error, PipelineError::Transport);

        assert_eq!(
            classified,
            PipelineError::Transport("SMTP connect failed | connection refused".to_string())
        );
    }

    #[test]
    fn test_navigation_wraps_plain_errors() {
        let error = anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED");

        let classified = PipelineError::navigation("https://example.com/a", &error);

        assert_eq!(
            classified,
            PipelineError::Navigation {
                url: "https://example.com/a".to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            }
        );
        assert!(!classified.is_timeout());
    }

    #[test]
    fn test_display_navigation_timeout() {
        let error = PipelineError::NavigationTimeout {
            url: "https://example.com".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(
            error.to_string(),
            "navigation to https://example.com timed out after 5000ms"
        );
    }
}
