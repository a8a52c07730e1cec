//! # Run Pipeline Use Case
//!
//! 取得・パッケージフェーズ
//!
//! カタログの処理単位を順に、処理済みなら飛ばし、未処理なら取得して
//! パッケージする。1件の失敗は次の処理単位に影響しない。

use log::{error, info};
use std::sync::Arc;

use crate::application::dto::settings::BookSettings;
use crate::application::dto::summary::RunSummary;
use crate::application::use_cases::fetch_item::ItemFetcher;
use crate::application::use_cases::list_catalog::CatalogLister;
use crate::domain::entities::artifact_set::PackagedArtifact;
use crate::domain::entities::work_item::WorkItem;
use crate::domain::repositories::collaborators::{PackageRequest, Packager};
use crate::domain::repositories::output_repository::ArtifactRepository;
use crate::domain::services::retry::error_chain_to_string;
use crate::domain::services::title::TitleService;

/// 処理単位1件の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// パッケージまで完了
    Processed(PackagedArtifact),
    /// 処理済みのため飛ばした
    Skipped,
    /// 取得またはパッケージに失敗
    Failed,
}

/// 実行コーディネーター
pub struct RunCoordinator {
    lister: CatalogLister,
    fetcher: ItemFetcher,
    artifacts: Arc<dyn ArtifactRepository>,
    packager: Arc<dyn Packager>,
    book: BookSettings,
}

impl RunCoordinator {
    /// 新しいコーディネーターを作成
    ///
    /// # Arguments
    ///
    /// * `lister` - カタログ列挙
    /// * `fetcher` - 処理単位の取得
    /// * `artifacts` - 成果物の保管庫
    /// * `packager` - パッケージ作成
    /// * `book` - 著者・言語・表示タイトル
    pub fn new(
        lister: CatalogLister,
        fetcher: ItemFetcher,
        artifacts: Arc<dyn ArtifactRepository>,
        packager: Arc<dyn Packager>,
        book: BookSettings,
    ) -> Self {
        Self {
            lister,
            fetcher,
            artifacts,
            packager,
            book,
        }
    }

    /// カタログ全体を処理する
    ///
    /// # Arguments
    ///
    /// * `max_items` - 新たに完了させる件数の上限（飛ばした件数は数えない）
    pub async fn run(&self, max_items: Option<usize>) -> RunSummary {
        let mut summary = RunSummary::default();

        let items = self.lister.list_available().await;
        if items.is_empty() {
            println!("No items found in the catalog");
            return summary;
        }

        println!("Found {} items in the catalog", items.len());

        for item in &items {
            if let Some(max) = max_items {
                if summary.processed >= max {
                    info!("Reached the limit of {} items", max);
                    break;
                }
            }

            match self.process(item).await {
                ItemOutcome::Processed(_) => summary.processed += 1,
                ItemOutcome::Skipped => summary.skipped += 1,
                ItemOutcome::Failed => summary.failed += 1,
            }
        }

        summary
    }

    /// 名前を指定して1件だけ処理する
    pub async fn process_single(&self, slug: &str) -> RunSummary {
        let mut summary = RunSummary::default();
        match self.process(&WorkItem::new(slug, 0)).await {
            ItemOutcome::Processed(_) => summary.processed += 1,
            ItemOutcome::Skipped => summary.skipped += 1,
            ItemOutcome::Failed => summary.failed += 1,
        }
        summary
    }

    /// 処理済みの判定、取得、パッケージ
    pub async fn process(&self, item: &WorkItem) -> ItemOutcome {
        let title = TitleService::display_title(&item.slug, &self.book.title_replacements);
        let packaged_name = TitleService::packaged_file_name(&title, &self.book.author);

        match self.artifacts.is_processed(&item.slug, &packaged_name).await {
            Ok(true) => {
                println!("⚠ Skipping {} (already processed)", item.slug);
                return ItemOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => {
                error!(
                    "Could not check whether {} was processed: {}",
                    item.slug,
                    error_chain_to_string(&e)
                );
                return ItemOutcome::Failed;
            }
        }

        println!("Processing {}", item.slug);

        let artifacts = match self.fetcher.fetch(item).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                println!("✗ Fetch failed for {}: {}", item.slug, e);
                return ItemOutcome::Failed;
            }
        };

        let source_dir = match self.artifacts.save(&artifacts).await {
            Ok(dir) => dir,
            Err(e) => {
                println!(
                    "✗ Could not store artifacts for {}: {}",
                    item.slug,
                    error_chain_to_string(&e)
                );
                return ItemOutcome::Failed;
            }
        };

        let request = PackageRequest {
            source_dir,
            output_path: self.artifacts.package_path(&packaged_name),
            title,
            author: self.book.author.clone(),
            language: self.book.language.clone(),
        };

        match self.packager.package(&request).await {
            Ok(path) => {
                println!("✓ Built {}", path.display());
                ItemOutcome::Processed(PackagedArtifact {
                    path,
                    display_name: packaged_name,
                })
            }
            Err(e) => {
                println!(
                    "✗ Packaging failed for {}: {}",
                    item.slug,
                    error_chain_to_string(&e)
                );
                ItemOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::lease::ResourceLease;
    use crate::application::services::session_store::SessionStore;
    use crate::application::test_support::{
        article_page, article_url, index_page, item_page, item_url, login_settings,
        scrape_settings, FakeSite, MemorySessionRepository, INDEX_URL,
    };
    use crate::domain::entities::artifact_set::ArtifactSet;
    use crate::domain::repositories::collaborators::{MockAssetDownloader, TextExtractor};
    use crate::domain::repositories::output_repository::MockArtifactRepository;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct BodyExtractor;

    impl TextExtractor for BodyExtractor {
        fn extract(&self, html: &str) -> Option<String> {
            html.contains("<p>").then(|| "text".to_string())
        }
    }

    /// 書き出し内容を記録するだけのパッケージャー
    #[derive(Default)]
    struct RecordingPackager {
        requests: Mutex<Vec<PackageRequest>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl Packager for RecordingPackager {
        async fn package(&self, request: &PackageRequest) -> Result<PathBuf> {
            if let Some(title) = &self.fail_for {
                if &request.title == title {
                    anyhow::bail!("pandoc exited with status 64");
                }
            }
            self.requests.lock().unwrap().push(request.clone());
            Ok(request.output_path.clone())
        }
    }

    /// 処理済みのスラッグを覚えているだけの保管庫
    #[derive(Default)]
    struct MemoryArtifacts {
        processed: Mutex<Vec<String>>,
        saved: Mutex<Vec<ArtifactSet>>,
    }

    #[async_trait]
    impl ArtifactRepository for MemoryArtifacts {
        async fn is_processed(&self, slug: &str, _packaged_name: &str) -> Result<bool> {
            Ok(self.processed.lock().unwrap().iter().any(|s| s == slug))
        }

        async fn save(&self, artifacts: &ArtifactSet) -> Result<PathBuf> {
            self.saved.lock().unwrap().push(artifacts.clone());
            Ok(PathBuf::from("/raw").join(artifacts.item_slug()))
        }

        fn package_path(&self, packaged_name: &str) -> PathBuf {
            PathBuf::from("/ebook").join(packaged_name)
        }
    }

    fn book() -> BookSettings {
        BookSettings {
            author: "Revista Liberta".to_string(),
            language: "pt-BR".to_string(),
            title_replacements: vec![("Edicao".to_string(), "Edição".to_string())],
        }
    }

    fn site_with(slugs: &[&str]) -> FakeSite {
        let site = FakeSite::new();
        site.add_page(INDEX_URL, &index_page(slugs));
        for slug in slugs {
            site.add_page(&item_url(slug), &item_page(&[slug], None));
            site.add_page(&article_url(slug), &article_page(slug, "body"));
        }
        site
    }

    fn coordinator(
        site: &FakeSite,
        artifacts: Arc<dyn ArtifactRepository>,
        packager: Arc<dyn Packager>,
    ) -> RunCoordinator {
        let sessions = Arc::new(SessionStore::new(
            Arc::new(MemorySessionRepository::default()),
            login_settings(),
        ));
        let lease = Arc::new(ResourceLease::new(site.renderer(), sessions));
        let mut downloader = MockAssetDownloader::new();
        downloader.expect_download().never();
        RunCoordinator::new(
            CatalogLister::new(lease.clone(), scrape_settings()),
            ItemFetcher::new(
                lease,
                Arc::new(downloader),
                Arc::new(BodyExtractor),
                scrape_settings(),
            ),
            artifacts,
            packager,
            book(),
        )
    }

    #[tokio::test]
    async fn test_max_items_counts_completed_items_only() {
        let site = site_with(&["ed-1", "ed-2", "ed-2", "ed-3"]);
        let artifacts = Arc::new(MemoryArtifacts::default());
        artifacts.processed.lock().unwrap().push("ed-1".to_string());
        let packager = Arc::new(RecordingPackager::default());

        let summary = coordinator(&site, artifacts.clone(), packager.clone())
            .run(Some(2))
            .await;

        assert_eq!(
            summary,
            RunSummary {
                processed: 2,
                skipped: 1,
                failed: 0
            }
        );
        let titles: Vec<String> = packager
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.title.clone())
            .collect();
        assert_eq!(titles, vec!["Ed 2", "Ed 3"]);
    }

    #[tokio::test]
    async fn test_duplicate_catalog_with_limit_processes_first_two() {
        let site = site_with(&["ed-1", "ed-2", "ed-2", "ed-3"]);
        let artifacts = Arc::new(MemoryArtifacts::default());
        let packager = Arc::new(RecordingPackager::default());

        let summary = coordinator(&site, artifacts.clone(), packager.clone())
            .run(Some(2))
            .await;

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 0);
        let titles: Vec<String> = packager
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.title.clone())
            .collect();
        assert_eq!(titles, vec!["Ed 1", "Ed 2"]);
        assert_eq!(site.count(&format!("goto {}", item_url("ed-3"))), 0);
    }

    #[tokio::test]
    async fn test_limit_stops_before_remaining_items() {
        let site = site_with(&["ed-1", "ed-2", "ed-3"]);
        let artifacts = Arc::new(MemoryArtifacts::default());
        let packager = Arc::new(RecordingPackager::default());

        let summary = coordinator(&site, artifacts.clone(), packager.clone())
            .run(Some(1))
            .await;

        assert_eq!(summary.processed, 1);
        assert_eq!(site.count(&format!("goto {}", item_url("ed-2"))), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_run() {
        let site = site_with(&["ed-1", "edicao-2", "ed-3"]);
        site.configure(|s| {
            s.timeouts.insert(item_url("ed-1"));
        });
        let artifacts = Arc::new(MemoryArtifacts::default());
        let packager = Arc::new(RecordingPackager {
            fail_for: Some("Edição 2".to_string()),
            ..Default::default()
        });

        let summary = coordinator(&site, artifacts.clone(), packager.clone())
            .run(None)
            .await;

        assert_eq!(
            summary,
            RunSummary {
                processed: 1,
                skipped: 0,
                failed: 2
            }
        );
        // Every item got a fresh lease, released once
        assert_eq!(site.count("launch"), site.count("environment-close"));
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let site = site_with(&["ed-1", "ed-2"]);
        let artifacts = Arc::new(MemoryArtifacts::default());
        let packager = Arc::new(RecordingPackager::default());
        let coordinator = coordinator(&site, artifacts.clone(), packager.clone());

        coordinator.run(None).await;
        artifacts
            .processed
            .lock()
            .unwrap()
            .extend(["ed-1".to_string(), "ed-2".to_string()]);
        let item_visits = |slug: &str| site.count(&format!("goto {}", item_url(slug)));
        let before = (item_visits("ed-1"), item_visits("ed-2"));
        let second = coordinator.run(None).await;

        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(packager.requests.lock().unwrap().len(), 2);
        // Skipped items are never fetched again
        assert_eq!(before, (1, 1));
        assert_eq!((item_visits("ed-1"), item_visits("ed-2")), before);
    }

    #[tokio::test]
    async fn test_empty_catalog_is_a_no_op() {
        let site = FakeSite::new();
        let artifacts = Arc::new(MemoryArtifacts::default());
        let packager = Arc::new(RecordingPackager::default());

        let summary = coordinator(&site, artifacts, packager).run(Some(5)).await;

        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn test_package_request_uses_derived_name() {
        let site = site_with(&["edicao-18"]);
        let artifacts = Arc::new(MemoryArtifacts::default());
        let packager = Arc::new(RecordingPackager::default());

        let summary = coordinator(&site, artifacts.clone(), packager.clone())
            .process_single("edicao-18")
            .await;

        assert_eq!(summary.processed, 1);
        let requests = packager.requests.lock().unwrap();
        assert_eq!(
            requests[0].output_path,
            PathBuf::from("/ebook/Edição 18 (Revista Liberta).epub")
        );
        assert_eq!(requests[0].source_dir, PathBuf::from("/raw/edicao-18"));
        assert_eq!(requests[0].language, "pt-BR");
        assert_eq!(artifacts.saved.lock().unwrap()[0].article_count(), 1);
    }

    #[tokio::test]
    async fn test_processed_check_error_counts_as_failure() {
        let site = site_with(&["ed-1"]);
        let mut artifacts = MockArtifactRepository::new();
        artifacts
            .expect_is_processed()
            .returning(|_, _| Err(anyhow::anyhow!("permission denied")));
        artifacts.expect_save().never();
        let packager = Arc::new(RecordingPackager::default());

        let summary = coordinator(&site, Arc::new(artifacts), packager)
            .run(None)
            .await;

        assert_eq!(summary.failed, 1);
    }
}
