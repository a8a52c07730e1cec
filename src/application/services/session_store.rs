//! # Session Store
//!
//! 認証済みの閲覧コンテキストを払い出す
//!
//! 保存済みのセッションがあれば再利用し、無い・壊れている・期限切れの
//! 場合はログインして新しいセッションを保存する。
//!
//! ```text
//! NoSession ─┐                 ┌─> Valid
//!            ├─> LoggingIn ────┤
//! Validating ┤                 └─> LoginFailed
//!            ├─> Invalid ─> LoggingIn
//!            └─> Valid
//! ```

use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

use crate::application::dto::settings::LoginSettings;
use crate::domain::entities::session_state::{SessionPhase, SessionState};
use crate::domain::error::PipelineError;
use crate::domain::repositories::renderer::{BrowserContext, Environment, Page, WaitPolicy};
use crate::domain::repositories::session_repository::SessionRepository;
use crate::domain::services::html::HtmlQuery;
use crate::domain::services::retry::error_chain_to_string;

/// セッションストア
pub struct SessionStore {
    repository: Arc<dyn SessionRepository>,
    settings: LoginSettings,
    phase: Mutex<SessionPhase>,
}

impl SessionStore {
    /// 新しいセッションストアを作成
    ///
    /// # Arguments
    ///
    /// * `repository` - セッション blob の保存先
    /// * `settings` - ログイン設定
    pub fn new(repository: Arc<dyn SessionRepository>, settings: LoginSettings) -> Self {
        Self {
            repository,
            settings,
            phase: Mutex::new(SessionPhase::NoSession),
        }
    }

    /// 現在の状態
    pub fn phase(&self) -> SessionPhase {
        match self.phase.lock() {
            Ok(phase) => *phase,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_phase(&self, next: SessionPhase) {
        debug!("Session phase: {} -> {}", self.phase(), next);
        match self.phase.lock() {
            Ok(mut phase) => *phase = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// 認証済みのコンテキストを返す
    ///
    /// # Arguments
    ///
    /// * `environment` - 起動済みの実行環境
    ///
    /// # Errors
    ///
    /// - 認証情報が無い場合は `PipelineError::Configuration`
    /// - ログインできなかった場合は `PipelineError::Auth`
    ///
    /// いずれの場合も作りかけのコンテキストは閉じてから返す
    pub async fn get_or_create_context(
        &self,
        environment: &dyn Environment,
    ) -> Result<Box<dyn BrowserContext>, PipelineError> {
        let blob = match self.repository.load().await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(
                    "Could not read saved session, logging in again: {}",
                    error_chain_to_string(&e)
                );
                None
            }
        };

        let Some(raw) = blob else {
            self.set_phase(SessionPhase::NoSession);
            info!("No saved session found, logging in");
            return self.login(environment).await;
        };

        self.set_phase(SessionPhase::Validating);
        let Some(session) = SessionState::parse(&raw) else {
            self.set_phase(SessionPhase::Invalid);
            warn!("Saved session is empty or malformed, logging in");
            return self.login(environment).await;
        };

        self.set_phase(SessionPhase::Valid);
        info!("Loading existing session");
        let context = environment
            .new_context(Some(&session.storage))
            .await
            .map_err(|e| PipelineError::Auth(error_chain_to_string(&e)))?;

        if !self.settings.verify_reused {
            return Ok(context);
        }

        match self.is_logged_in(context.as_ref()).await {
            Ok(true) => Ok(context),
            Ok(false) => {
                warn!("Saved session has expired, logging in again");
                close_context(context.as_ref()).await;
                self.set_phase(SessionPhase::Invalid);
                if let Err(e) = self.repository.clear().await {
                    warn!(
                        "Failed to remove expired session: {}",
                        error_chain_to_string(&e)
                    );
                }
                self.login(environment).await
            }
            Err(e) => {
                // The saved blob is kept; the site may just be unreachable
                close_context(context.as_ref()).await;
                Err(e)
            }
        }
    }

    /// 再利用したコンテキストでログインフォームが消えているか確かめる
    async fn is_logged_in(&self, context: &dyn BrowserContext) -> Result<bool, PipelineError> {
        let page = context
            .new_page()
            .await
            .map_err(|e| PipelineError::Auth(error_chain_to_string(&e)))?;

        let result: Result<bool, PipelineError> = async {
            page.goto(
                &self.settings.login_url,
                WaitPolicy::NetworkIdle,
                self.settings.navigation_timeout,
            )
            .await
            .map_err(|e| PipelineError::navigation(&self.settings.login_url, &e))?;
            Ok(!self.login_form_present(page.as_ref()).await?)
        }
        .await;

        close_page(page.as_ref()).await;
        result
    }

    async fn login_form_present(&self, page: &dyn Page) -> Result<bool, PipelineError> {
        let html = page
            .content()
            .await
            .map_err(|e| PipelineError::Auth(error_chain_to_string(&e)))?;
        let forms = HtmlQuery::count(&html, &self.settings.username_selector)
            .map_err(|e| PipelineError::Configuration(error_chain_to_string(&e)))?;
        Ok(forms > 0)
    }

    /// ログインして新しいセッションを保存する
    async fn login(
        &self,
        environment: &dyn Environment,
    ) -> Result<Box<dyn BrowserContext>, PipelineError> {
        self.set_phase(SessionPhase::LoggingIn);

        if self.settings.username.trim().is_empty() || self.settings.password.is_empty() {
            self.set_phase(SessionPhase::LoginFailed);
            return Err(PipelineError::Configuration(
                "site credentials are not set".to_string(),
            ));
        }

        let context = match environment.new_context(None).await {
            Ok(context) => context,
            Err(e) => {
                self.set_phase(SessionPhase::LoginFailed);
                return Err(PipelineError::Auth(error_chain_to_string(&e)));
            }
        };

        let blob = match self.submit_credentials(context.as_ref()).await {
            Ok(blob) => blob,
            Err(e) => {
                close_context(context.as_ref()).await;
                self.set_phase(SessionPhase::LoginFailed);
                return Err(e);
            }
        };

        if let Err(e) = self.repository.save(&blob).await {
            warn!(
                "Logged in, but the session could not be saved: {}",
                error_chain_to_string(&e)
            );
        } else {
            info!("Login successful, session saved");
        }

        self.set_phase(SessionPhase::Valid);
        Ok(context)
    }

    /// ログインフォームを送信し、保存用の blob を返す
    async fn submit_credentials(&self, context: &dyn BrowserContext) -> Result<String, PipelineError> {
        let auth = |e: anyhow::Error| PipelineError::Auth(error_chain_to_string(&e));

        let page = context.new_page().await.map_err(auth)?;
        let result: Result<String, PipelineError> = async {
            info!("Logging in as {}", self.settings.username);
            page.goto(
                &self.settings.login_url,
                WaitPolicy::NetworkIdle,
                self.settings.navigation_timeout,
            )
            .await
            .map_err(auth)?;

            page.fill(&self.settings.username_selector, &self.settings.username)
                .await
                .map_err(auth)?;
            page.fill(&self.settings.password_selector, &self.settings.password)
                .await
                .map_err(auth)?;

            self.click_submit(page.as_ref()).await?;

            page.wait_for_settle(self.settings.settle_timeout)
                .await
                .map_err(auth)?;

            if self.login_form_present(page.as_ref()).await? {
                return Err(PipelineError::Auth(
                    "still on the login page after submitting credentials".to_string(),
                ));
            }

            let state = context.storage_state().await.map_err(auth)?;
            SessionState::serialize(&state).map_err(|e| PipelineError::Auth(e.to_string()))
        }
        .await;

        close_page(page.as_ref()).await;
        result
    }

    /// 設定された順にボタンを試し、最初に押せたもので終える
    async fn click_submit(&self, page: &dyn Page) -> Result<(), PipelineError> {
        for strategy in &self.settings.submit_strategies {
            match page.click(strategy, self.settings.click_timeout).await {
                Ok(()) => {
                    info!("Clicked login button using {}", strategy);
                    return Ok(());
                }
                Err(e) => debug!("Login button {} not usable: {}", strategy, e),
            }
        }

        Err(PipelineError::Auth(
            "could not find or click the login button".to_string(),
        ))
    }
}

async fn close_page(page: &dyn Page) {
    if let Err(e) = page.close().await {
        debug!("Failed to close page: {}", error_chain_to_string(&e));
    }
}

async fn close_context(context: &dyn BrowserContext) {
    if let Err(e) = context.close().await {
        warn!(
            "Failed to close browser context: {}",
            error_chain_to_string(&e)
        );
    }
}
