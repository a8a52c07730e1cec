//! # Output Repository Traits
//!
//! 取得成果物とパッケージ済みファイルの保管を抽象化

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::{Path, PathBuf};

use crate::domain::entities::artifact_set::ArtifactSet;

/// 取得成果物の保管庫
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// 処理済みかどうか
    ///
    /// 旧形式のファイル、導出したパッケージ名（出力先・保管先）、
    /// 取得済みディレクトリのいずれかがあれば処理済み
    ///
    /// # Arguments
    ///
    /// * `slug` - 処理単位の識別子
    /// * `packaged_name` - 導出したパッケージのファイル名
    async fn is_processed(&self, slug: &str, packaged_name: &str) -> Result<bool>;

    /// 成果物を書き出し、完成したディレクトリを返す
    ///
    /// 途中で失敗した場合は完成ディレクトリを残さない
    async fn save(&self, artifacts: &ArtifactSet) -> Result<PathBuf>;

    /// パッケージの出力先
    fn package_path(&self, packaged_name: &str) -> PathBuf;
}

/// パッケージ済みファイルの保管庫
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// 配信待ちのファイル（名前順）
    async fn list_pending(&self) -> Result<Vec<PathBuf>>;

    /// 保管先へ移動する（同名ファイルは置き換える）
    ///
    /// # Returns
    ///
    /// 移動後のパス
    async fn archive(&self, path: &Path) -> Result<PathBuf>;
}
