//! # List Catalog Use Case
//!
//! 一覧ページから処理単位を列挙する

use log::{error, info};
use std::sync::Arc;

use crate::application::dto::settings::ScrapeSettings;
use crate::application::services::lease::{Lease, ResourceLease};
use crate::domain::entities::work_item::WorkItem;
use crate::domain::error::PipelineError;
use crate::domain::repositories::renderer::WaitPolicy;
use crate::domain::services::deduplication::DeduplicationService;
use crate::domain::services::html::HtmlQuery;
use crate::domain::services::retry::error_chain_to_string;

/// カタログ列挙ユースケース
pub struct CatalogLister {
    lease: Arc<ResourceLease>,
    settings: ScrapeSettings,
}

impl CatalogLister {
    /// 新しいユースケースを作成
    pub fn new(lease: Arc<ResourceLease>, settings: ScrapeSettings) -> Self {
        Self { lease, settings }
    }

    /// 現在公開されている処理単位（出現順、重複なし）
    ///
    /// どの段階で失敗しても空の列を返す
    pub async fn list_available(&self) -> Vec<WorkItem> {
        let lease = match self.lease.acquire().await {
            Ok(lease) => lease,
            Err(e) => {
                error!("Could not open a session to list the catalog: {}", e);
                return Vec::new();
            }
        };

        let result = self.collect_slugs(&lease).await;
        lease.release().await;

        match result {
            Ok(slugs) => {
                let items = DeduplicationService::to_work_items(slugs);
                info!("Found {} items in the catalog", items.len());
                items
            }
            Err(e) => {
                error!("Error listing the catalog: {}", e);
                Vec::new()
            }
        }
    }

    async fn collect_slugs(&self, lease: &Lease) -> Result<Vec<String>, PipelineError> {
        let index_url = self.settings.index_url();
        let page = lease
            .new_page()
            .await
            .map_err(|e| PipelineError::Extraction(error_chain_to_string(&e)))?;

        let result: Result<Vec<String>, PipelineError> = async {
            info!("Searching for available items at {}", index_url);
            page.goto(&index_url, WaitPolicy::Load, self.settings.navigation_timeout)
                .await
                .map_err(|e| PipelineError::navigation(&index_url, &e))?;

            let html = page
                .content()
                .await
                .map_err(|e| PipelineError::Extraction(error_chain_to_string(&e)))?;

            let hrefs =
                HtmlQuery::attribute_values(&html, &self.settings.edition_link_selector, "href")
                    .map_err(|e| PipelineError::Extraction(error_chain_to_string(&e)))?;

            Ok(hrefs
                .iter()
                .filter_map(|href| WorkItem::slug_from_href(href))
                .collect())
        }
        .await;

        if let Err(e) = page.close().await {
            log::debug!("Failed to close page: {}", error_chain_to_string(&e));
        }
        result
    }
}
