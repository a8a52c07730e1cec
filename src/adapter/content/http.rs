//! HTTP Asset Downloader
//!
//! カバー画像・記事内画像を reqwest で取得する

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use crate::domain::repositories::collaborators::AssetDownloader;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// reqwest によるダウンローダ
#[derive(Clone)]
pub struct HttpAssetDownloader {
    client: reqwest::Client,
}

impl HttpAssetDownloader {
    /// 新しいダウンローダを作成
    ///
    /// # Arguments
    ///
    /// * `timeout` - リクエストの既定タイムアウト
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetDownloader for HttpAssetDownloader {
    async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?;

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
