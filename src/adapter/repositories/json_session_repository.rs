//! JSON Session Repository Implementation
//!
//! SessionRepositoryのファイル実装（ブラウザの保存状態をJSONファイルで永続化）

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::repositories::session_repository::SessionRepository;

/// JSONファイルベースのセッションリポジトリ
pub struct JsonSessionRepository {
    path: PathBuf,
}

impl JsonSessionRepository {
    /// 新しいリポジトリを作成
    ///
    /// # Arguments
    ///
    /// * `path` - セッション blob の保存先
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// ファイルから blob を読み込む（同期処理）
    fn load_sync(path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            info!("No saved session found at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).context("Failed to read session file")?;
        Ok(Some(content))
    }

    /// ファイルに blob を保存する（同期処理）
    fn save_sync(path: &Path, blob: &str) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create session directory")?;
        }

        // Write next to the target, then swap in
        let temporary = path.with_extension("json.tmp");
        fs::write(&temporary, blob).context("Failed to write session file")?;
        fs::rename(&temporary, path).context("Failed to replace session file")?;

        info!("Saved session to {}", path.display());
        Ok(())
    }

    fn clear_sync(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Removed saved session {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove session file"),
        }
    }
}

#[async_trait]
impl SessionRepository for JsonSessionRepository {
    async fn load(&self) -> Result<Option<String>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }

    async fn save(&self, blob: &str) -> Result<()> {
        let path = self.path.clone();
        let blob = blob.to_string();
        tokio::task::spawn_blocking(move || Self::save_sync(&path, &blob))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }

    async fn clear(&self) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::clear_sync(&path))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }
}
