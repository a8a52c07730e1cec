//! # Fetch Item Use Case
//!
//! 1件の処理単位のページを巡回し、カバーと記事を成果物として集める
//!
//! カバーと記事ごとの失敗はログに残して先へ進む。処理単位のページ自体に
//! 到達できなかった場合だけが処理単位のエラーになる。

use log::{debug, info, warn};
use std::sync::Arc;

use crate::application::dto::settings::ScrapeSettings;
use crate::application::services::lease::{Lease, ResourceLease};
use crate::domain::entities::artifact_set::ArtifactSet;
use crate::domain::entities::work_item::WorkItem;
use crate::domain::error::PipelineError;
use crate::domain::repositories::collaborators::{AssetDownloader, TextExtractor};
use crate::domain::repositories::renderer::{Page, WaitPolicy};
use crate::domain::services::deduplication::DeduplicationService;
use crate::domain::services::html::{AuthorInfo, HtmlQuery};
use crate::domain::services::retry::error_chain_to_string;
use crate::domain::services::title::TitleService;

/// 取得ユースケース
pub struct ItemFetcher {
    lease: Arc<ResourceLease>,
    downloader: Arc<dyn AssetDownloader>,
    extractor: Arc<dyn TextExtractor>,
    settings: ScrapeSettings,
}

impl ItemFetcher {
    /// 新しいユースケースを作成
    ///
    /// # Arguments
    ///
    /// * `lease` - ブラウザ資源の貸し出し元
    /// * `downloader` - カバー画像のダウンロード
    /// * `extractor` - 記事本文の抽出
    /// * `settings` - URL とセレクタ
    pub fn new(
        lease: Arc<ResourceLease>,
        downloader: Arc<dyn AssetDownloader>,
        extractor: Arc<dyn TextExtractor>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            lease,
            downloader,
            extractor,
            settings,
        }
    }

    /// 処理単位の成果物を集める
    ///
    /// カバー、リンク探索、記事抽出は1つの貸し出しの中で行う
    ///
    /// # Errors
    ///
    /// 貸し出しに失敗した場合、または処理単位のページに遷移できなかった場合
    pub async fn fetch(&self, item: &WorkItem) -> Result<ArtifactSet, PipelineError> {
        let lease = self.lease.acquire().await?;
        let result = self.fetch_with(&lease, item).await;
        lease.release().await;
        result
    }

    async fn fetch_with(&self, lease: &Lease, item: &WorkItem) -> Result<ArtifactSet, PipelineError> {
        let page = lease
            .new_page()
            .await
            .map_err(|e| PipelineError::Extraction(error_chain_to_string(&e)))?;

        let result = self.collect(page.as_ref(), item).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", error_chain_to_string(&e));
        }
        result
    }

    async fn collect(&self, page: &dyn Page, item: &WorkItem) -> Result<ArtifactSet, PipelineError> {
        let url = self.settings.item_url(&item.slug);
        info!("Accessing {}", url);

        page.goto(&url, WaitPolicy::NetworkIdle, self.settings.navigation_timeout)
            .await
            .map_err(|e| PipelineError::navigation(&url, &e))?;

        let html = page
            .content()
            .await
            .map_err(|e| PipelineError::Extraction(error_chain_to_string(&e)))?;
        let page_url = page.url().await.unwrap_or_else(|_| url.clone());

        let mut artifacts = ArtifactSet::new(item.slug.clone());

        if let Some(cover) = self.download_cover(&html, &page_url).await {
            artifacts.set_cover(cover);
        }

        let links = self.article_links(&html, &page_url);
        info!("Found {} unique articles", links.len());

        for (index, link) in links.iter().enumerate() {
            info!("Processing ({}/{}): {}", index + 1, links.len(), link);

            match self.fetch_article(page, link).await {
                Ok(Some(content)) => artifacts.push_article(index, content),
                Ok(None) => warn!("No content extracted for {}", link),
                Err(e) if e.is_timeout() => warn!("Timeout loading article {}", link),
                Err(e) => warn!("Skipping article {}: {}", link, e),
            }
        }

        info!(
            "Collected {} articles for {}",
            artifacts.article_count(),
            item.slug
        );
        Ok(artifacts)
    }

    /// カバー画像を取得する（失敗しても処理は続ける）
    async fn download_cover(&self, html: &str, page_url: &str) -> Option<Vec<u8>> {
        let src = match HtmlQuery::first_attribute(html, &self.settings.cover_selector, "src") {
            Ok(Some(src)) => src,
            Ok(None) => {
                info!("Cover image not found");
                return None;
            }
            Err(e) => {
                warn!("Cover lookup failed: {}", error_chain_to_string(&e));
                return None;
            }
        };

        let Some(cover_url) = HtmlQuery::resolve_url(page_url, &src) else {
            warn!("Cover image has an unusable URL: {}", src);
            return None;
        };

        info!("Downloading cover: {}", cover_url);
        match self
            .downloader
            .download(&cover_url, self.settings.http_timeout)
            .await
        {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(
                    "Could not download cover image: {}",
                    error_chain_to_string(&e)
                );
                None
            }
        }
    }

    /// 記事リンク（絶対 URL、出現順、重複なし）
    fn article_links(&self, html: &str, page_url: &str) -> Vec<String> {
        match HtmlQuery::attribute_values(html, &self.settings.article_link_selector, "href") {
            Ok(hrefs) => DeduplicationService::unique_in_order(
                hrefs
                    .iter()
                    .filter_map(|href| HtmlQuery::resolve_url(page_url, href)),
            ),
            Err(e) => {
                warn!(
                    "Error extracting article links: {}",
                    error_chain_to_string(&e)
                );
                Vec::new()
            }
        }
    }

    /// 記事1件を Markdown にする（本文が無ければ `None`）
    async fn fetch_article(&self, page: &dyn Page, link: &str) -> Result<Option<String>, PipelineError> {
        page.goto(link, WaitPolicy::DomContentLoaded, self.settings.navigation_timeout)
            .await
            .map_err(|e| PipelineError::navigation(link, &e))?;

        let html = page
            .content()
            .await
            .map_err(|e| PipelineError::Extraction(error_chain_to_string(&e)))?;

        let title = TitleService::clean_article_title(
            &HtmlQuery::title(&html).unwrap_or_default(),
            &self.settings.title_separators,
            &self.settings.title_boilerplate,
        );

        let author = match HtmlQuery::author(
            &html,
            &self.settings.author_container_selector,
            &self.settings.author_name_selector,
            &self.settings.author_bio_selector,
        ) {
            Ok(author) => author,
            Err(e) => {
                debug!("Author extraction skipped: {}", error_chain_to_string(&e));
                None
            }
        };

        Ok(self
            .extractor
            .extract(&html)
            .map(|text| compose_article(&title, author.as_ref(), &text)))
    }
}

/// 記事ファイルの本文
fn compose_article(title: &str, author: Option<&AuthorInfo>, text: &str) -> String {
    let mut content = format!("# {}\n\n", title);
    if let Some(name) = author.and_then(|a| a.name.as_deref()) {
        content.push_str(&format!("**{}**\n\n", name));
    }
    content.push_str(text);
    if let Some(author) = author {
        content.push_str("\n\n");
        content.push_str(&author.markdown_section());
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::session_store::SessionStore;
    use crate::application::test_support::{
        article_page, article_url, item_page, item_url, login_settings, scrape_settings,
        FakeSite, MemorySessionRepository,
    };
    use crate::domain::entities::artifact_set::Artifact;
    use crate::domain::repositories::collaborators::{MockAssetDownloader, MockTextExtractor};

    struct ParagraphExtractor;

    impl TextExtractor for ParagraphExtractor {
        fn extract(&self, html: &str) -> Option<String> {
            let start = html.find("<p>")? + 3;
            let end = html[start..].find("</p>")? + start;
            let text = html[start..end].trim();
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        }
    }

    fn fetcher_for(site: &FakeSite, downloader: MockAssetDownloader) -> ItemFetcher {
        let sessions = Arc::new(SessionStore::new(
            Arc::new(MemorySessionRepository::default()),
            login_settings(),
        ));
        let lease = Arc::new(ResourceLease::new(site.renderer(), sessions));
        ItemFetcher::new(
            lease,
            Arc::new(downloader),
            Arc::new(ParagraphExtractor),
            scrape_settings(),
        )
    }

    fn texts(set: &ArtifactSet) -> Vec<(usize, String)> {
        set.artifacts()
            .iter()
            .filter_map(|a| match a {
                Artifact::Text { sequence, content } => Some((*sequence, content.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_collects_cover_and_articles() {
        let site = FakeSite::new();
        site.add_page(
            &item_url("ed-1"),
            &item_page(&["a", "b", "a"], Some("/img/cover.jpg")),
        );
        site.add_page(&article_url("a"), &article_page("First", "Alpha text"));
        site.add_page(&article_url("b"), &article_page("Second", "Beta text"));

        let mut downloader = MockAssetDownloader::new();
        downloader
            .expect_download()
            .withf(|url, _| url.ends_with("mag.test/img/cover.jpg"))
            .times(1)
            .returning(|_, _| Ok(vec![1, 2, 3]));

        let set = fetcher_for(&site, downloader)
            .fetch(&WorkItem::new("ed-1", 0))
            .await
            .unwrap();

        assert_eq!(set.item_slug(), "ed-1");
        assert_eq!(set.cover(), Some(&[1u8, 2, 3][..]));
        let articles = texts(&set);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0], (0, "# First\n\nAlpha text".to_string()));
        assert_eq!(articles[1].0, 1);
        assert_eq!(site.count("environment-close"), 1);
    }

    #[tokio::test]
    async fn test_article_failures_are_skipped_keeping_indices() {
        let site = FakeSite::new();
        site.add_page(&item_url("ed-2"), &item_page(&["a", "slow", "empty", "c"], None));
        site.add_page(&article_url("a"), &article_page("A", "one"));
        site.add_page(&article_url("empty"), "<html><body></body></html>");
        site.add_page(&article_url("c"), &article_page("C", "three"));
        site.configure(|s| {
            s.timeouts.insert(article_url("slow"));
        });

        let mut downloader = MockAssetDownloader::new();
        downloader.expect_download().never();

        let set = fetcher_for(&site, downloader)
            .fetch(&WorkItem::new("ed-2", 0))
            .await
            .unwrap();

        let sequences: Vec<usize> = texts(&set).into_iter().map(|(s, _)| s).collect();
        assert_eq!(sequences, vec![0, 3]);
        assert!(set.cover().is_none());
    }

    #[tokio::test]
    async fn test_cover_download_failure_is_not_fatal() {
        let site = FakeSite::new();
        site.add_page(&item_url("ed-3"), &item_page(&["a"], Some("https://cdn.test/c.jpg")));
        site.add_page(&article_url("a"), &article_page("A", "one"));

        let mut downloader = MockAssetDownloader::new();
        downloader
            .expect_download()
            .returning(|_, _| Err(anyhow::anyhow!("timed out")));

        let set = fetcher_for(&site, downloader)
            .fetch(&WorkItem::new("ed-3", 0))
            .await
            .unwrap();

        assert!(set.cover().is_none());
        assert_eq!(set.article_count(), 1);
    }

    #[tokio::test]
    async fn test_item_page_timeout_is_item_error() {
        let site = FakeSite::new();
        site.configure(|s| {
            s.timeouts.insert(item_url("ed-4"));
        });

        let result = fetcher_for(&site, MockAssetDownloader::new())
            .fetch(&WorkItem::new("ed-4", 0))
            .await;

        assert!(result.unwrap_err().is_timeout());
        assert_eq!(site.count("launch"), 1);
        assert_eq!(site.count("environment-close"), 1);
    }

    #[tokio::test]
    async fn test_article_with_author_block() {
        let site = FakeSite::new();
        site.add_page(&item_url("ed-5"), &item_page(&["a"], None));
        site.add_page(
            &article_url("a"),
            r#"<html><head><title>Liberdade – Revista Liberta</title></head><body>
               <p>Texto.</p><div id="author"><h6>Ana</h6><p>Autora.</p></div></body></html>"#,
        );

        let set = fetcher_for(&site, MockAssetDownloader::new())
            .fetch(&WorkItem::new("ed-5", 0))
            .await
            .unwrap();

        assert_eq!(
            texts(&set)[0].1,
            "# Liberdade\n\n**Ana**\n\nTexto.\n\n\n\n>**Ana**\n\n> *Autora.*\n\n---\n"
        );
    }

    #[tokio::test]
    async fn test_extractor_is_consulted_per_article() {
        let site = FakeSite::new();
        site.add_page(&item_url("ed-6"), &item_page(&["a", "b"], None));

        let sessions = Arc::new(SessionStore::new(
            Arc::new(MemorySessionRepository::default()),
            login_settings(),
        ));
        let lease = Arc::new(ResourceLease::new(site.renderer(), sessions));
        let mut extractor = MockTextExtractor::new();
        extractor.expect_extract().times(2).returning(|_| None);
        let fetcher = ItemFetcher::new(
            lease,
            Arc::new(MockAssetDownloader::new()),
            Arc::new(extractor),
            scrape_settings(),
        );

        let set = fetcher.fetch(&WorkItem::new("ed-6", 0)).await.unwrap();

        assert_eq!(set.article_count(), 0);
    }

    #[test]
    fn test_compose_article_without_author() {
        assert_eq!(compose_article("T", None, "body"), "# T\n\nbody");
    }
}
