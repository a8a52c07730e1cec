//! # Session Repository Trait
//!
//! ログイン状態（セッション blob）の永続化を抽象化

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// セッションリポジトリ
///
/// 内容は不透明な文字列として扱い、解釈は Session Store が行う
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// 保存された blob を読み込む（存在しなければ `None`）
    async fn load(&self) -> Result<Option<String>>;

    /// blob を上書き保存する
    async fn save(&self, blob: &str) -> Result<()>;

    /// 保存された blob を削除する（存在しなくてもエラーにしない）
    async fn clear(&self) -> Result<()>;
}
