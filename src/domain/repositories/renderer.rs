//! # Renderer Traits
//!
//! 遠隔操作できるレンダラー（ブラウザ）の抽象化
//!
//! - `Renderer`: 実行環境（ブラウザプロセス）を起動する
//! - `Environment`: 起動済みの実行環境。コンテキストを作る
//! - `BrowserContext`: 認証状態を持つ閲覧コンテキスト
//! - `Page`: 1枚のタブ

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::entities::session_state::StorageState;

/// ページ遷移の完了条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// load イベント
    Load,
    /// DOMContentLoaded
    DomContentLoaded,
    /// ネットワークが落ち着くまで
    NetworkIdle,
}

/// ログインボタンを押すための戦略
///
/// 設定の順に試し、最初に成功したものを採用する
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStrategy {
    /// CSS セレクタで要素を探す
    Css(String),
    /// 表示テキスト（ボタンのラベルや value）が一致する要素を探す
    Text(String),
}

impl std::fmt::Display for SubmitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitStrategy::Css(selector) => write!(f, "css={}", selector),
            SubmitStrategy::Text(text) => write!(f, "text=\"{}\"", text),
        }
    }
}

/// ブラウザエンジン
#[async_trait]
pub trait Renderer: Send + Sync {
    /// 新しい、他と隔離された実行環境を起動する
    async fn launch(&self) -> Result<Box<dyn Environment>>;
}

/// 起動済みの実行環境
#[async_trait]
pub trait Environment: Send + Sync {
    /// 閲覧コンテキストを作る（保存状態があれば読み込む）
    async fn new_context(&self, state: Option<&StorageState>) -> Result<Box<dyn BrowserContext>>;

    /// 実行環境を終了する
    async fn close(&self) -> Result<()>;
}

/// 閲覧コンテキスト
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// 新しいページを開く
    async fn new_page(&self) -> Result<Box<dyn Page>>;

    /// 現在の保存状態（クッキー等）
    async fn storage_state(&self) -> Result<StorageState>;

    /// コンテキストと開いているページを閉じる
    async fn close(&self) -> Result<()>;
}

/// ブラウザのタブ
///
/// 遷移のタイムアウトは `PipelineError::NavigationTimeout` を
/// `anyhow::Error` に包んで返す
#[async_trait]
pub trait Page: Send + Sync {
    /// URL へ遷移する
    async fn goto(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<()>;

    /// 現在の HTML
    async fn content(&self) -> Result<String>;

    /// 現在の URL
    async fn url(&self) -> Result<String>;

    /// 入力欄に値を入れる
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// 戦略に従って要素をクリックする（見つからなければタイムアウトでエラー）
    async fn click(&self, strategy: &SubmitStrategy, timeout: Duration) -> Result<()>;

    /// 遷移や通信が落ち着くまで待つ
    async fn wait_for_settle(&self, timeout: Duration) -> Result<()>;

    /// ページを閉じる
    async fn close(&self) -> Result<()>;
}
