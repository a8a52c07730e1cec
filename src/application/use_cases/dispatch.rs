//! # Dispatch Use Case
//!
//! パッケージ1件を全宛先へ送る
//!
//! 接続の失敗は固定間隔でリトライする。接続できた後の宛先ごとの失敗は
//! 他の宛先に影響せず、接続の試行回数も消費しない。

use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

use crate::application::dto::settings::MailSettings;
use crate::domain::entities::delivery::DispatchReport;
use crate::domain::error::PipelineError;
use crate::domain::repositories::mail_transport::{MailConnection, MailTransport, OutgoingMail};
use crate::domain::services::retry::error_chain_to_string;

/// 送信ユースケース
pub struct Dispatcher {
    transport: Arc<dyn MailTransport>,
    settings: MailSettings,
}

impl Dispatcher {
    /// 新しいユースケースを作成
    ///
    /// # Arguments
    ///
    /// * `transport` - 配信経路
    /// * `settings` - 差出人・宛先・リトライ設定
    pub fn new(transport: Arc<dyn MailTransport>, settings: MailSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// ファイルを全宛先へ送る
    ///
    /// # Returns
    ///
    /// 少なくとも1宛先に届いた場合の送信結果
    ///
    /// # Errors
    ///
    /// - ファイル・認証情報・宛先が無い場合は接続前に `PipelineError::Configuration`
    /// - 接続が最大回数失敗した場合、またはどの宛先にも届かなかった場合は
    ///   `PipelineError::Transport`
    pub async fn dispatch(&self, path: &Path) -> Result<DispatchReport, PipelineError> {
        let mail = self.prepare(path).await?;
        let max_attempts = self.settings.retry.max_attempts;

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(
                "Connecting to mail server (attempt {}/{})",
                attempt, max_attempts
            );

            let connection = match self.transport.connect().await {
                Ok(connection) => connection,
                Err(e) => {
                    let message = error_chain_to_string(&e);
                    warn!("Connection attempt {} failed: {}", attempt, message);
                    match self.settings.retry.delay_after(attempt) {
                        Some(delay) => {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        None => {
                            return Err(PipelineError::Transport(format!(
                                "could not connect after {} attempts: {}",
                                attempt, message
                            )))
                        }
                    }
                }
            };

            let delivered = self.send_to_all(connection.as_ref(), &mail).await;
            if let Err(e) = connection.quit().await {
                warn!(
                    "Failed to close mail connection: {}",
                    error_chain_to_string(&e)
                );
            }

            let report = DispatchReport {
                delivered,
                attempted: self.settings.recipients.len(),
                connection_attempts: attempt,
            };

            if !report.is_success() {
                return Err(PipelineError::Transport(format!(
                    "no recipient accepted {}",
                    mail.attachment_name
                )));
            }

            info!(
                "Delivered {} to {}/{} recipients",
                mail.attachment_name, report.delivered, report.attempted
            );
            return Ok(report);
        }
    }

    /// 接続前の検証と送信内容の組み立て
    async fn prepare(&self, path: &Path) -> Result<OutgoingMail, PipelineError> {
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(PipelineError::Configuration(format!(
                "file not found: {}",
                path.display()
            )));
        }

        if self.settings.sender.trim().is_empty() || self.settings.password.is_empty() {
            return Err(PipelineError::Configuration(
                "mail credentials are not set".to_string(),
            ));
        }

        if self.settings.recipients.is_empty() {
            return Err(PipelineError::Configuration(
                "no recipients configured".to_string(),
            ));
        }

        let attachment_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(OutgoingMail {
            sender: self.settings.sender.clone(),
            subject: self.settings.subject.clone(),
            body: self.settings.body.clone(),
            attachment: path.to_path_buf(),
            attachment_name,
        })
    }

    /// 宛先ごとに送信し、届いた数を返す
    async fn send_to_all(&self, connection: &dyn MailConnection, mail: &OutgoingMail) -> usize {
        let mut delivered = 0;
        for recipient in self.settings.recipients.addresses() {
            match connection.transmit(mail, recipient).await {
                Ok(()) => {
                    info!("Sent {} to {}", mail.attachment_name, recipient);
                    delivered += 1;
                }
                Err(e) => warn!(
                    "Failed to send to {}: {}",
                    recipient,
                    error_chain_to_string(&e)
                ),
            }
        }
        delivered
    }
}
