//! # Mail Transport Traits
//!
//! 配信経路（SMTP 等）への接続と送信を抽象化

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::PathBuf;

/// 送信するメール1通分（宛先を除く）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// 差出人アドレス
    pub sender: String,
    /// 件名
    pub subject: String,
    /// 本文（プレーンテキスト）
    pub body: String,
    /// 添付するファイル
    pub attachment: PathBuf,
    /// 添付ファイル名
    pub attachment_name: String,
}

/// 配信経路
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// 認証済みの接続を確立する
    ///
    /// # Errors
    ///
    /// 接続または認証に失敗した場合にエラーを返す（呼び出し側でリトライ）
    async fn connect(&self) -> Result<Box<dyn MailConnection>>;
}

/// 確立済みの接続
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MailConnection: Send + Sync {
    /// 1宛先に送信する
    ///
    /// # Arguments
    ///
    /// * `mail` - 送信内容
    /// * `recipient` - 宛先アドレス
    async fn transmit(&self, mail: &OutgoingMail, recipient: &str) -> Result<()>;

    /// 接続を閉じる
    async fn quit(&self) -> Result<()>;
}
