//! # Delivery Ledger Trait
//!
//! 配信済みファイル名の記録を抽象化

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::entities::delivery::DeliveryHistory;

/// 配信台帳
///
/// 追記のみ。一度記録された名前は二度と配信されない。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// 台帳全体を読み込む
    ///
    /// # Errors
    ///
    /// ファイルが存在しない場合は空の履歴を返す。
    /// それ以外の読み込み失敗はエラーを返す
    async fn history(&self) -> Result<DeliveryHistory>;

    /// ファイル名が記録済みかどうか
    ///
    /// # Arguments
    ///
    /// * `filename` - パッケージのファイル名（ディレクトリを含まない）
    async fn contains(&self, filename: &str) -> Result<bool> {
        Ok(self.history().await?.is_delivered(filename))
    }

    /// ファイル名を記録する（記録済みなら何もしない）
    ///
    /// # Errors
    ///
    /// ファイルの書き込みに失敗した場合にエラーを返す
    async fn record(&self, filename: &str) -> Result<()>;
}
