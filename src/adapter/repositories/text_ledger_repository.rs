//! Text Ledger Repository Implementation
//!
//! DeliveryLedgerのテキストファイル実装（1行に1ファイル名）

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::entities::delivery::DeliveryHistory;
use crate::domain::repositories::ledger_repository::DeliveryLedger;

/// テキストファイルベースの配信台帳
///
/// ファイルが存在しなければ空の台帳として扱う
pub struct TextLedgerRepository {
    path: PathBuf,
}

impl TextLedgerRepository {
    /// 新しいリポジトリを作成
    ///
    /// # Arguments
    ///
    /// * `path` - 台帳ファイルのパス
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_sync(path: &Path) -> Result<DeliveryHistory> {
        if !path.exists() {
            debug!("Ledger {} does not exist yet", path.display());
            return Ok(DeliveryHistory::new());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger {}", path.display()))?;
        Ok(DeliveryHistory::from_lines(&content))
    }

    fn append_sync(path: &Path, filename: &str) -> Result<()> {
        let existing = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read ledger {}", path.display()))?
        } else {
            String::new()
        };

        if DeliveryHistory::from_lines(&existing).is_delivered(filename) {
            debug!("{} is already in the ledger", filename);
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create ledger directory")?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open ledger {}", path.display()))?;
        // Keep one name per line even if the last write lost its newline
        if !existing.is_empty() && !existing.ends_with('\n') {
            writeln!(file).context("Failed to append to ledger")?;
        }
        writeln!(file, "{}", filename.trim()).context("Failed to append to ledger")?;

        info!("Recorded {} in the delivery ledger", filename);
        Ok(())
    }
}

#[async_trait]
impl DeliveryLedger for TextLedgerRepository {
    async fn history(&self) -> Result<DeliveryHistory> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }

    async fn record(&self, filename: &str) -> Result<()> {
        let path = self.path.clone();
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || Self::append_sync(&path, &filename))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }
}
