//! # SessionState Entity
//!
//! ログイン状態（セッション blob）と、セッションストアの状態遷移

use serde::{Deserialize, Serialize};
use std::fmt;

/// ブラウザの保存状態
///
/// 中身は不透明な JSON として扱い、ブラウザ実装だけが解釈する
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StorageState {
    /// クッキー
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
    /// オリジンごとのストレージ
    #[serde(default)]
    pub origins: Vec<serde_json::Value>,
}

/// 永続化されたセッション
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// 保存状態
    pub storage: StorageState,
    /// 検証済みかどうか
    pub valid: bool,
}

impl SessionState {
    /// 保存された blob を検証して読み込む
    ///
    /// 空または壊れた内容は「存在しない」と同じ扱いで `None` を返す。
    ///
    /// ```
    /// use issue_courier::domain::entities::session_state::SessionState;
    ///
    /// assert!(SessionState::parse(r#"{"cookies": []}"#).is_some());
    /// assert!(SessionState::parse("   ").is_none());
    /// assert!(SessionState::parse("{not json").is_none());
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        serde_json::from_str::<StorageState>(trimmed)
            .ok()
            .map(|storage| Self {
                storage,
                valid: true,
            })
    }

    /// 永続化用にシリアライズ
    pub fn serialize(storage: &StorageState) -> serde_json::Result<String> {
        serde_json::to_string_pretty(storage)
    }
}

/// セッションストアの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// 永続化された blob が存在しない
    NoSession,
    /// blob を検証中
    Validating,
    /// 有効なセッションを利用中
    Valid,
    /// blob が壊れている、または再利用時の検証に失敗した
    Invalid,
    /// ログイン処理中
    LoggingIn,
    /// ログイン失敗（今回の試行では終端）
    LoginFailed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::NoSession => "no-session",
            SessionPhase::Validating => "validating",
            SessionPhase::Valid => "valid",
            SessionPhase::Invalid => "invalid",
            SessionPhase::LoggingIn => "logging-in",
            SessionPhase::LoginFailed => "login-failed",
        };
        f.write_str(name)
    }
}
