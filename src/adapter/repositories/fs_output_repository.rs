//! File System Output Repository Implementation
//!
//! 取得結果の保存先（raw）、パッケージの出力先（ebook）、保管先（sent）を扱う

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::entities::artifact_set::ArtifactSet;
use crate::domain::repositories::output_repository::{ArtifactRepository, PackageRepository};
use crate::domain::services::title::{TitleService, PACKAGE_EXTENSION};

const STAGING_SUFFIX: &str = "partial";

/// 出力ディレクトリのレイアウト
#[derive(Debug, Clone)]
pub struct OutputLayout {
    /// 旧形式の出力が置かれていたプロジェクトルート
    pub project_root: PathBuf,
    pub raw_dir: PathBuf,
    pub ebook_dir: PathBuf,
    pub sent_dir: PathBuf,
}

/// ファイルシステムベースの出力リポジトリ
pub struct FsOutputRepository {
    layout: OutputLayout,
}

impl FsOutputRepository {
    /// 新しいリポジトリを作成
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    /// 処理済みとみなす痕跡のパス一覧
    fn processed_markers(&self, slug: &str, packaged_name: &str) -> Vec<PathBuf> {
        let legacy_name = TitleService::legacy_file_name(slug);
        vec![
            self.layout.project_root.join(&legacy_name),
            self.layout.ebook_dir.join(&legacy_name),
            self.layout.ebook_dir.join(packaged_name),
            self.layout.sent_dir.join(packaged_name),
            self.layout.raw_dir.join(slug),
        ]
    }

    fn save_sync(raw_dir: &Path, artifacts: &ArtifactSet) -> Result<PathBuf> {
        let slug = artifacts.item_slug();
        let staging = raw_dir.join(format!("{}.{}", slug, STAGING_SUFFIX));
        let destination = raw_dir.join(slug);

        // Leftover from an interrupted run
        if staging.exists() {
            fs::remove_dir_all(&staging).with_context(|| {
                format!("Failed to remove stale staging dir {}", staging.display())
            })?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;

        for (name, bytes) in artifacts.files() {
            fs::write(staging.join(&name), bytes)
                .with_context(|| format!("Failed to write {}", name))?;
        }

        fs::rename(&staging, &destination).with_context(|| {
            format!(
                "Failed to move {} to {}",
                staging.display(),
                destination.display()
            )
        })?;

        info!(
            "Saved {} files for {} to {}",
            artifacts.files().len(),
            slug,
            destination.display()
        );
        Ok(destination)
    }

    fn list_pending_sync(ebook_dir: &Path) -> Result<Vec<PathBuf>> {
        if !ebook_dir.exists() {
            debug!("{} does not exist yet", ebook_dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(ebook_dir)
            .with_context(|| format!("Failed to read {}", ebook_dir.display()))?
        {
            let path = entry?.path();
            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn archive_sync(sent_dir: &Path, path: &Path) -> Result<PathBuf> {
        let name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?;
        fs::create_dir_all(sent_dir)
            .with_context(|| format!("Failed to create {}", sent_dir.display()))?;

        let destination = sent_dir.join(name);
        if destination.exists() {
            fs::remove_file(&destination)
                .with_context(|| format!("Failed to replace {}", destination.display()))?;
        }

        // rename fails across filesystems; fall back to copy + remove
        if fs::rename(path, &destination).is_err() {
            fs::copy(path, &destination)
                .with_context(|| format!("Failed to copy {}", path.display()))?;
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(destination)
    }
}

#[async_trait]
impl ArtifactRepository for FsOutputRepository {
    async fn is_processed(&self, slug: &str, packaged_name: &str) -> Result<bool> {
        for marker in self.processed_markers(slug, packaged_name) {
            if tokio::fs::try_exists(&marker)
                .await
                .with_context(|| format!("Failed to check {}", marker.display()))?
            {
                debug!("{} is processed ({} exists)", slug, marker.display());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn save(&self, artifacts: &ArtifactSet) -> Result<PathBuf> {
        let raw_dir = self.layout.raw_dir.clone();
        let artifacts = artifacts.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&raw_dir, &artifacts))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }

    fn package_path(&self, packaged_name: &str) -> PathBuf {
        self.layout.ebook_dir.join(packaged_name)
    }
}

#[async_trait]
impl PackageRepository for FsOutputRepository {
    async fn list_pending(&self) -> Result<Vec<PathBuf>> {
        let ebook_dir = self.layout.ebook_dir.clone();
        tokio::task::spawn_blocking(move || Self::list_pending_sync(&ebook_dir))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }

    async fn archive(&self, path: &Path) -> Result<PathBuf> {
        let sent_dir = self.layout.sent_dir.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::archive_sync(&sent_dir, &path))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }
}
