//! # Resource Lease
//!
//! 実行環境（ブラウザ）と認証済みコンテキストを組で貸し出す
//!
//! 取得に成功したものだけを、取得と逆の順（コンテキスト → 実行環境）で
//! 必ず1回だけ解放する。

use log::{error, info, warn};
use std::sync::Arc;

use crate::application::services::session_store::SessionStore;
use crate::domain::error::PipelineError;
use crate::domain::repositories::renderer::{BrowserContext, Environment, Page, Renderer};
use crate::domain::services::retry::error_chain_to_string;

/// 貸し出し元
pub struct ResourceLease {
    renderer: Arc<dyn Renderer>,
    sessions: Arc<SessionStore>,
}

impl ResourceLease {
    /// 新しい貸し出し元を作成
    ///
    /// # Arguments
    ///
    /// * `renderer` - 実行環境を起動するエンジン
    /// * `sessions` - 認証済みコンテキストの払い出し元
    pub fn new(renderer: Arc<dyn Renderer>, sessions: Arc<SessionStore>) -> Self {
        Self { renderer, sessions }
    }

    /// 新しい実行環境を起動し、認証済みコンテキストを得る
    ///
    /// # Errors
    ///
    /// 起動に失敗した場合は `PipelineError::Launch`。
    /// コンテキストが得られなかった場合は、起動済みの実行環境を閉じてから
    /// Session Store のエラーを返す
    pub async fn acquire(&self) -> Result<Lease, PipelineError> {
        let environment = self
            .renderer
            .launch()
            .await
            .map_err(|e| PipelineError::Launch(error_chain_to_string(&e)))?;

        match self.sessions.get_or_create_context(environment.as_ref()).await {
            Ok(context) => Ok(Lease {
                context,
                environment,
                released: false,
            }),
            Err(e) => {
                close_environment(environment.as_ref()).await;
                Err(e)
            }
        }
    }
}

/// 貸し出し中の資源
///
/// `release` で返却する。返却せずに破棄するとエラーログを出す
pub struct Lease {
    context: Box<dyn BrowserContext>,
    environment: Box<dyn Environment>,
    released: bool,
}

impl Lease {
    /// 認証済みコンテキスト
    pub fn context(&self) -> &dyn BrowserContext {
        self.context.as_ref()
    }

    /// コンテキストに新しいページを開く
    pub async fn new_page(&self) -> anyhow::Result<Box<dyn Page>> {
        self.context.new_page().await
    }

    /// コンテキスト、実行環境の順に閉じる
    ///
    /// 失敗はログに残すだけで呼び出し側には返さない
    pub async fn release(mut self) {
        if let Err(e) = self.context.close().await {
            warn!(
                "Failed to close browser context: {}",
                error_chain_to_string(&e)
            );
        }
        close_environment(self.environment.as_ref()).await;
        self.released = true;
        info!("Browser resources released");
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            error!("Browser lease dropped without release");
        }
    }
}

async fn close_environment(environment: &dyn Environment) {
    if let Err(e) = environment.close().await {
        warn!(
            "Failed to close rendering environment: {}",
            error_chain_to_string(&e)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{login_settings, FakeSite, MemorySessionRepository};

    fn lease_for(site: &FakeSite) -> ResourceLease {
        let sessions = Arc::new(SessionStore::new(
            Arc::new(MemorySessionRepository::default()),
            login_settings(),
        ));
        ResourceLease::new(site.renderer(), sessions)
    }

    #[tokio::test]
    async fn test_release_closes_context_then_environment() {
        let site = FakeSite::new();
        let lease = lease_for(&site).acquire().await.unwrap();

        lease.release().await;

        let journal = site.journal();
        let context_close = journal.iter().position(|e| e == "context-close").unwrap();
        let env_close = journal
            .iter()
            .position(|e| e == "environment-close")
            .unwrap();
        assert!(context_close < env_close);
        assert_eq!(site.count("launch"), 1);
        assert_eq!(site.count("environment-close"), 1);
    }

    #[tokio::test]
    async fn test_environment_released_when_context_fails() {
        let site = FakeSite::new();
        site.configure(|s| s.fail_context = true);

        let result = lease_for(&site).acquire().await;

        assert!(matches!(result, Err(PipelineError::Auth(_))));
        assert_eq!(site.count("launch"), 1);
        assert_eq!(site.count("environment-close"), 1);
        // Never opened, so never closed
        assert_eq!(site.count("context-close"), 0);
    }

    #[tokio::test]
    async fn test_nothing_released_when_launch_fails() {
        let site = FakeSite::new();
        site.configure(|s| s.fail_launch = true);

        let result = lease_for(&site).acquire().await;

        assert!(matches!(result, Err(PipelineError::Launch(_))));
        assert!(site.journal().is_empty());
    }

    #[tokio::test]
    async fn test_context_close_failure_still_closes_environment() {
        let site = FakeSite::new();
        site.configure(|s| s.fail_context_close = true);
        let lease = lease_for(&site).acquire().await.unwrap();

        lease.release().await;

        assert_eq!(site.count("context-close"), 1);
        assert_eq!(site.count("environment-close"), 1);
    }

    #[tokio::test]
    async fn test_failed_login_releases_everything() {
        let site = FakeSite::new();
        site.configure(|s| s.accepts_login = false);

        let result = lease_for(&site).acquire().await;

        assert!(result.is_err());
        assert_eq!(site.count("launch"), site.count("environment-close"));
        assert_eq!(site.count("context-new"), site.count("context-close"));
    }
}
