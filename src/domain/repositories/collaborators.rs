//! # Collaborator Traits
//!
//! 抽出・パッケージ・画像処理・ダウンロードの外部協調者
//!
//! いずれも入れ替え可能で、既定実装は Adapter 層にある

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTML から整形済みテキストを取り出す
#[cfg_attr(test, automock)]
pub trait TextExtractor: Send + Sync {
    /// 本文が見つからなければ `None`
    fn extract(&self, html: &str) -> Option<String>;
}

/// パッケージの入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// 成果物ディレクトリ（`article_NN.md` と任意の `cover.jpg`）
    pub source_dir: PathBuf,
    /// 出力先ファイル
    pub output_path: PathBuf,
    /// 表示タイトル
    pub title: String,
    /// 著者
    pub author: String,
    /// 言語コード
    pub language: String,
}

/// 成果物ディレクトリを1つのファイルにまとめる
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Packager: Send + Sync {
    /// 生成したファイルのパスを返す
    ///
    /// # Errors
    ///
    /// 記事が1つも無い場合やツールの実行に失敗した場合にエラーを返す
    async fn package(&self, request: &PackageRequest) -> Result<PathBuf>;
}

/// 画像の再エンコードと縮小
#[cfg_attr(test, automock)]
pub trait ImageProcessor: Send + Sync {
    /// カバー画像を最適化してファイルに書く
    fn optimize_cover(&self, source: &Path, destination: &Path) -> Result<()>;

    /// 記事内の画像を JPEG に変換する
    fn to_jpeg(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// URL からバイト列を取得する
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AssetDownloader: Send + Sync {
    /// タイムアウト付きでダウンロードする
    async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}
