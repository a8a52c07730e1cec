//! Workflow Orchestration
//!
//! 設定から各層を組み立て、取得・パッケージと配信の2フェーズを順に実行する

use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;

use crate::adapter::browser::chromium::{ChromiumOptions, ChromiumRenderer};
use crate::adapter::config::Config;
use crate::adapter::content::http::HttpAssetDownloader;
use crate::adapter::content::markdown::MarkdownExtractor;
use crate::adapter::content::pandoc::{PandocOptions, PandocPackager};
use crate::adapter::content::raster::RasterImageProcessor;
use crate::adapter::mail::smtp::{SmtpMailTransport, SmtpSettings};
use crate::adapter::repositories::fs_output_repository::{FsOutputRepository, OutputLayout};
use crate::adapter::repositories::json_session_repository::JsonSessionRepository;
use crate::adapter::repositories::text_ledger_repository::TextLedgerRepository;
use crate::application::dto::summary::{DeliverySummary, RunSummary};
use crate::application::services::lease::ResourceLease;
use crate::application::services::session_store::SessionStore;
use crate::application::use_cases::deliver_packages::DeliveryPass;
use crate::application::use_cases::dispatch::Dispatcher;
use crate::application::use_cases::fetch_item::ItemFetcher;
use crate::application::use_cases::list_catalog::CatalogLister;
use crate::application::use_cases::run_pipeline::RunCoordinator;

use super::cli::Args;

/// 取得・パッケージ・配信のワークフロー
pub struct PipelineWorkflow {
    config: Config,
}

impl PipelineWorkflow {
    /// Create a new workflow instance with dependency injection
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 出力ディレクトリの構成
    fn output_repository(&self) -> Arc<FsOutputRepository> {
        let paths = &self.config.paths;
        Arc::new(FsOutputRepository::new(OutputLayout {
            project_root: paths.root(),
            raw_dir: paths.raw(),
            ebook_dir: paths.ebook(),
            sent_dir: paths.sent(),
        }))
    }

    /// 取得・パッケージのコーディネーターを組み立てる
    ///
    /// # Errors
    ///
    /// セレクタや HTTP クライアントの設定が不正な場合
    pub fn build_coordinator(&self) -> Result<RunCoordinator> {
        let config = &self.config;

        let renderer = Arc::new(ChromiumRenderer::new(ChromiumOptions {
            executable: config
                .browser
                .executable
                .as_deref()
                .map(|p| config.paths.resolve(p)),
            headless: config.browser.headless,
            window_width: config.browser.window_width,
            window_height: config.browser.window_height,
            command_timeout: config.timeouts.browser_command(),
            close_timeout: config.timeouts.browser_close(),
        }));
        let sessions = Arc::new(SessionStore::new(
            Arc::new(JsonSessionRepository::new(config.paths.session())),
            config.login_settings(),
        ));
        let lease = Arc::new(ResourceLease::new(renderer, sessions));

        let downloader = Arc::new(HttpAssetDownloader::new(config.timeouts.http())?);
        let extractor = Arc::new(
            MarkdownExtractor::new(&[config.selectors.author_container.clone()])
                .context("Invalid author selector")?,
        );
        let images = Arc::new(RasterImageProcessor::new(
            config.book.cover_max_width,
            config.book.cover_max_height,
            config.book.cover_quality,
            config.book.image_quality,
        ));
        let packager = Arc::new(PandocPackager::new(
            PandocOptions {
                program: None,
                stylesheet: Some(config.paths.stylesheet()),
                timeout: config.timeouts.package(),
                http_timeout: config.timeouts.http(),
            },
            images,
            downloader.clone(),
        )?);

        let scrape = config.scrape_settings();
        Ok(RunCoordinator::new(
            CatalogLister::new(lease.clone(), scrape.clone()),
            ItemFetcher::new(lease, downloader, extractor, scrape),
            self.output_repository(),
            packager,
            config.book_settings(),
        ))
    }

    /// 配信パスを組み立てる
    pub fn build_delivery(&self) -> DeliveryPass<TextLedgerRepository, FsOutputRepository> {
        let config = &self.config;
        let transport = Arc::new(SmtpMailTransport::new(SmtpSettings {
            host: config.mail.host.clone(),
            port: config.mail.port,
            username: config.mail.sender.clone(),
            password: config.mail.password.clone(),
            timeout: config.timeouts.smtp(),
        }));

        DeliveryPass::new(
            Arc::new(TextLedgerRepository::new(config.paths.ledger())),
            self.output_repository(),
            Dispatcher::new(transport, config.mail_settings()),
        )
    }

    async fn run_fetch_phase(&self, args: &Args) -> Result<RunSummary> {
        let coordinator = self.build_coordinator()?;
        let summary = match &args.item {
            Some(slug) => coordinator.process_single(slug).await,
            None => coordinator.run(args.max_items).await,
        };
        Ok(summary)
    }

    async fn run_delivery_phase(&self) -> Result<DeliverySummary> {
        if let Err(e) = self.config.validate_recipients() {
            println!("⚠ {}", e);
        }
        self.build_delivery().run().await
    }

    /// Execute the workflow
    ///
    /// # Errors
    ///
    /// いずれかのフェーズ自体が失敗した場合（件ごとの失敗は集計に含める）。
    /// 取得・パッケージが失敗した場合は配信を行わない
    pub async fn execute(&self, args: Args) -> Result<()> {
        info!("Starting issue courier...");

        println!("✓ Using configuration:");
        println!("  Site: {}", self.config.site.base_url);
        println!("  Output: {}", self.config.paths.ebook().display());
        println!("  Recipients: {}", self.config.destinations().len());

        if args.runs_fetch() {
            let summary = self
                .run_fetch_phase(&args)
                .await
                .context("Fetch/build phase failed")?;
            println!("✓ Fetch/build complete: {}", summary);
        }

        if !args.runs_delivery() {
            println!("Delivery skipped");
            return Ok(());
        }

        let summary = self
            .run_delivery_phase()
            .await
            .context("Delivery phase failed")?;
        if summary.failed > 0 {
            warn!("{} packages could not be delivered", summary.failed);
        }
        println!("✓ Delivery complete: {}", summary);

        Ok(())
    }
}
