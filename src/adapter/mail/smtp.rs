//! SMTP Mail Transport
//!
//! lettre による MailTransport 実装（ポート 465 は SMTPS、それ以外は STARTTLS）

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::Message;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::repositories::mail_transport::{MailConnection, MailTransport, OutgoingMail};

const EPUB_CONTENT_TYPE: &str = "application/epub+zip";
const IMPLICIT_TLS_PORT: u16 = 465;
const AUTH_MECHANISMS: &[Mechanism] = &[Mechanism::Plain, Mechanism::Login];

/// SMTP サーバの接続設定
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// TLS の張り方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Security {
    /// 接続直後から TLS（SMTPS）
    Implicit,
    /// 平文で接続して STARTTLS で昇格
    StartTls,
}

impl Security {
    fn for_port(port: u16) -> Self {
        if port == IMPLICIT_TLS_PORT {
            Security::Implicit
        } else {
            Security::StartTls
        }
    }
}

/// SMTP による配信経路
///
/// `connect` 1回につき TCP 接続を1本張り、認証まで済ませる。
/// 宛先ごとの送信はすべてその接続の上で行う。
pub struct SmtpMailTransport {
    settings: SmtpSettings,
}

impl SmtpMailTransport {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    /// 接続・TLS・EHLO・認証まで行う
    async fn open(&self) -> Result<AsyncSmtpConnection> {
        let host = self.settings.host.as_str();
        let hello = ClientId::default();
        let tls = TlsParameters::new(host.to_string())
            .with_context(|| format!("Invalid SMTP host {}", host))?;
        let security = Security::for_port(self.settings.port);
        let implicit_tls = match security {
            Security::Implicit => Some(tls.clone()),
            Security::StartTls => None,
        };

        let mut connection = AsyncSmtpConnection::connect_tokio1(
            (host, self.settings.port),
            Some(self.settings.timeout),
            &hello,
            implicit_tls,
            None,
        )
        .await
        .with_context(|| format!("Failed to connect to {}:{}", host, self.settings.port))?;

        if let Err(e) = self.secure_and_login(&mut connection, security, tls, &hello).await {
            connection.abort().await;
            return Err(e);
        }
        Ok(connection)
    }

    async fn secure_and_login(
        &self,
        connection: &mut AsyncSmtpConnection,
        security: Security,
        tls: TlsParameters,
        hello: &ClientId,
    ) -> Result<()> {
        if security == Security::StartTls {
            if !connection.can_starttls() {
                bail!("SMTP server {} does not offer STARTTLS", self.settings.host);
            }
            connection
                .starttls(tls, hello)
                .await
                .context("STARTTLS handshake failed")?;
        }

        let credentials = Credentials::new(
            self.settings.username.clone(),
            self.settings.password.clone(),
        );
        connection
            .auth(AUTH_MECHANISMS, &credentials)
            .await
            .context("SMTP authentication failed")?;
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn connect(&self) -> Result<Box<dyn MailConnection>> {
        let connection = self.open().await?;
        info!(
            "Connected to {}:{}",
            self.settings.host, self.settings.port
        );
        Ok(Box::new(SmtpConnection {
            connection: Mutex::new(connection),
        }))
    }
}

/// 認証済みの SMTP 接続（1回の接続試行につき1本）
pub struct SmtpConnection {
    connection: Mutex<AsyncSmtpConnection>,
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[async_trait]
impl MailConnection for SmtpConnection {
    async fn transmit(&self, mail: &OutgoingMail, recipient: &str) -> Result<()> {
        let bytes = tokio::fs::read(&mail.attachment)
            .await
            .with_context(|| format!("Failed to read {}", mail.attachment.display()))?;
        let message = build_message(mail, recipient, bytes)?;

        let mut connection = self.connection.lock().await;
        if connection.has_broken() {
            bail!("SMTP connection was lost before sending to {}", recipient);
        }
        let response = connection
            .send(message.envelope(), &message.formatted())
            .await
            .with_context(|| format!("SMTP server rejected mail to {}", recipient))?;
        debug!("SMTP response for {}: {:?}", recipient, response.code());
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if connection.has_broken() {
            warn!("SMTP connection already closed");
            return Ok(());
        }
        connection.quit().await.context("SMTP QUIT failed")?;
        Ok(())
    }
}

/// 本文と添付ファイルからメッセージを組み立てる
fn build_message(mail: &OutgoingMail, recipient: &str, attachment: Vec<u8>) -> Result<Message> {
    let from: Mailbox = mail
        .sender
        .parse()
        .with_context(|| format!("Invalid sender address {}", mail.sender))?;
    let to: Mailbox = recipient
        .parse()
        .with_context(|| format!("Invalid recipient address {}", recipient))?;
    let content_type = ContentType::parse(EPUB_CONTENT_TYPE)
        .map_err(|e| anyhow!("Invalid content type: {}", e))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.clone())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(mail.body.clone()))
                .singlepart(Attachment::new(mail.attachment_name.clone()).body(attachment, content_type)),
        )
        .context("Failed to build message")
}
