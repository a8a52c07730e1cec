//! Issue Courier
//!
//! 雑誌の号を取得して EPUB にまとめ、電子書籍リーダー宛てにメール配信する

// coverage_nightly cfg が設定されている場合のみ coverage_attribute を有効化
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use anyhow::Result;
use clap::Parser;

use issue_courier::adapter::config::Config;
use issue_courier::driver::{Args, PipelineWorkflow};

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    // Secrets may live in .env; a missing file is fine
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Create workflow with injected dependencies
    let workflow = PipelineWorkflow::new(config);

    workflow.execute(args).await
}
