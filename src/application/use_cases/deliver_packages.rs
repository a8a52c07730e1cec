//! # Deliver Packages Use Case
//!
//! 配信フェーズ
//!
//! 出力ディレクトリのパッケージを名前順に、台帳にあれば送らずに保管し、
//! 無ければ送信する。送信に成功したものだけを台帳に記録して保管する。

use anyhow::{Context, Result};
use log::{error, info};
use std::path::Path;
use std::sync::Arc;

use crate::application::dto::summary::DeliverySummary;
use crate::application::use_cases::dispatch::Dispatcher;
use crate::domain::repositories::ledger_repository::DeliveryLedger;
use crate::domain::repositories::output_repository::PackageRepository;
use crate::domain::services::retry::error_chain_to_string;

/// 配信パス
pub struct DeliveryPass<L: DeliveryLedger, P: PackageRepository> {
    ledger: Arc<L>,
    packages: Arc<P>,
    dispatcher: Dispatcher,
}

impl<L: DeliveryLedger, P: PackageRepository> DeliveryPass<L, P> {
    /// 新しいユースケースを作成
    ///
    /// # Arguments
    ///
    /// * `ledger` - 配信台帳
    /// * `packages` - パッケージの保管庫
    /// * `dispatcher` - 送信
    pub fn new(ledger: Arc<L>, packages: Arc<P>, dispatcher: Dispatcher) -> Self {
        Self {
            ledger,
            packages,
            dispatcher,
        }
    }

    /// 配信待ちのパッケージをすべて処理する
    ///
    /// # Errors
    ///
    /// 出力ディレクトリまたは台帳を読めなかった場合。
    /// ファイルごとの失敗は集計に数えて次へ進む
    pub async fn run(&self) -> Result<DeliverySummary> {
        let mut summary = DeliverySummary::default();

        let pending = self
            .packages
            .list_pending()
            .await
            .context("Failed to list packages waiting for delivery")?;

        if pending.is_empty() {
            println!("No packages waiting for delivery");
            return Ok(summary);
        }

        println!("Found {} packages to deliver", pending.len());

        for path in &pending {
            let name = file_name(path);

            let delivered = self
                .ledger
                .contains(&name)
                .await
                .context("Failed to read the delivery ledger")?;

            if delivered {
                println!("⚠ {} was already delivered, archiving", name);
                match self.archive(path).await {
                    Ok(()) => summary.archived += 1,
                    Err(e) => {
                        error!("{}", error_chain_to_string(&e));
                        summary.failed += 1;
                    }
                }
                continue;
            }

            match self.dispatcher.dispatch(path).await {
                Ok(report) => {
                    println!(
                        "✓ Sent {} ({}/{} recipients)",
                        name, report.delivered, report.attempted
                    );
                    if let Err(e) = self.ledger.record(&name).await {
                        error!(
                            "Sent {} but could not record it: {}",
                            name,
                            error_chain_to_string(&e)
                        );
                    }
                    if let Err(e) = self.archive(path).await {
                        error!("{}", error_chain_to_string(&e));
                    }
                    summary.sent += 1;
                }
                Err(e) => {
                    println!("✗ Failed to send {}: {}", name, e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn archive(&self, path: &Path) -> Result<()> {
        let archived = self
            .packages
            .archive(path)
            .await
            .with_context(|| format!("Failed to archive {}", path.display()))?;
        info!("Archived to {}", archived.display());
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
