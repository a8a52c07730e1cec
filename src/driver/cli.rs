//! CLI Argument Parsing
//!
//! CLIの引数解析

use clap::Parser;

/// 雑誌の号を取得して EPUB にまとめ、メールで配信するCLI
#[derive(Parser, Debug, Clone)]
#[command(name = "issue-courier")]
#[command(about = "Fetch magazine issues, package them as EPUB and deliver them by mail", long_about = None)]
pub struct Args {
    /// Config file path
    #[arg(short, long, default_value = "./config.json")]
    pub config: String,

    /// Stop after this many newly packaged items
    #[arg(long, value_name = "N")]
    pub max_items: Option<usize>,

    /// Process a single item by slug instead of the whole catalog
    #[arg(long, value_name = "SLUG", conflicts_with = "max_items")]
    pub item: Option<String>,

    /// Only deliver packages already in the output directory
    #[arg(long, conflicts_with_all = ["max_items", "item", "skip_delivery"])]
    pub deliver_only: bool,

    /// Fetch and package, but do not send anything
    #[arg(long)]
    pub skip_delivery: bool,
}

impl Args {
    /// 取得・パッケージを行うか
    pub fn runs_fetch(&self) -> bool {
        !self.deliver_only
    }

    /// 配信を行うか
    pub fn runs_delivery(&self) -> bool {
        !self.skip_delivery
    }
}
