//! Pandoc Packager
//!
//! 成果物ディレクトリを pandoc で EPUB3 にまとめる
//!
//! 作業用ディレクトリ `{成果物}_build_temp` に記事・カバー・スタイルシートを
//! 揃えてから pandoc を実行し、成否にかかわらず作業用ディレクトリを削除する。

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::ffi::OsString;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::domain::entities::artifact_set::{article_sequence, COVER_FILE_NAME};
use crate::domain::repositories::collaborators::{
    AssetDownloader, ImageProcessor, PackageRequest, Packager,
};
use crate::domain::services::deduplication::DeduplicationService;
use crate::domain::services::retry::error_chain_to_string;

const BUILD_SUFFIX: &str = "_build_temp";
const STYLESHEET_NAME: &str = "epub_styles.css";
const WEBP_PATTERN: &str = r"\((https?://[^\s)]+\.webp)\)";

/// pandoc の実行設定
#[derive(Debug, Clone)]
pub struct PandocOptions {
    /// 実行ファイル（`None` なら PATH から探す）
    pub program: Option<PathBuf>,
    /// 任意のスタイルシート
    pub stylesheet: Option<PathBuf>,
    /// pandoc の実行タイムアウト
    pub timeout: Duration,
    /// 画像ダウンロードのタイムアウト
    pub http_timeout: Duration,
}

/// pandoc によるパッケージャ
pub struct PandocPackager {
    options: PandocOptions,
    images: Arc<dyn ImageProcessor>,
    downloader: Arc<dyn AssetDownloader>,
    webp: Regex,
}

impl PandocPackager {
    /// 新しいパッケージャを作成
    ///
    /// # Arguments
    ///
    /// * `options` - 実行設定
    /// * `images` - カバー最適化と画像変換
    /// * `downloader` - 記事内画像の取得
    pub fn new(
        options: PandocOptions,
        images: Arc<dyn ImageProcessor>,
        downloader: Arc<dyn AssetDownloader>,
    ) -> Result<Self> {
        Ok(Self {
            options,
            images,
            downloader,
            webp: Regex::new(WEBP_PATTERN).context("Invalid image pattern")?,
        })
    }

    fn program(&self) -> Result<PathBuf> {
        match &self.options.program {
            Some(program) => Ok(program.clone()),
            None => which::which("pandoc").context("pandoc not found. Please install pandoc"),
        }
    }

    /// 作業用ディレクトリで組み立てて実行する
    async fn build(&self, request: &PackageRequest, build_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(build_dir)
            .await
            .with_context(|| format!("Failed to create {}", build_dir.display()))?;

        let has_cover = self.prepare_cover(&request.source_dir, build_dir).await;
        let articles = self.prepare_articles(&request.source_dir, build_dir).await?;
        if articles.is_empty() {
            bail!(
                "No markdown files to build in {}",
                request.source_dir.display()
            );
        }
        let has_stylesheet = self.prepare_stylesheet(build_dir).await;

        let output = std::path::absolute(&request.output_path)
            .with_context(|| format!("Invalid output path {}", request.output_path.display()))?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if output.exists() {
            warn!("{} already exists and will be overwritten", output.display());
        }

        let args = build_args(
            request,
            &output,
            build_dir,
            &Local::now().format("%Y-%m-%d").to_string(),
            has_stylesheet,
            has_cover,
            &articles,
        );
        self.run_pandoc(build_dir, args).await?;

        if !output.exists() {
            bail!("pandoc finished but {} was not created", output.display());
        }
        Ok(output)
    }

    /// カバーを最適化してコピー（失敗時は元画像をそのまま使う）
    async fn prepare_cover(&self, source_dir: &Path, build_dir: &Path) -> bool {
        let source = source_dir.join(COVER_FILE_NAME);
        if !source.exists() {
            println!("⚠ No cover image found");
            return false;
        }

        let destination = build_dir.join(COVER_FILE_NAME);
        let images = Arc::clone(&self.images);
        let (src, dest) = (source.clone(), destination.clone());
        let optimized = tokio::task::spawn_blocking(move || images.optimize_cover(&src, &dest))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))
            .and_then(|result| result);

        match optimized {
            Ok(()) => {
                println!("✓ Cover optimized");
                true
            }
            Err(e) => {
                warn!(
                    "Cover optimization failed, using the original: {}",
                    error_chain_to_string(&e)
                );
                match tokio::fs::copy(&source, &destination).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Could not copy cover image: {}", e);
                        false
                    }
                }
            }
        }
    }

    /// 記事をコピーし、WebP 画像をローカルの JPEG に置き換える
    ///
    /// # Returns
    ///
    /// 作業用ディレクトリ内の記事ファイル名（名前順）
    async fn prepare_articles(&self, source_dir: &Path, build_dir: &Path) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(source_dir)
            .await
            .with_context(|| format!("Failed to read {}", source_dir.display()))?;

        let mut markdown = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if !path.is_file() || name == COVER_FILE_NAME {
                continue;
            }
            if path.extension().is_some_and(|ext| ext == "md") {
                markdown.push(name);
            } else {
                // Images saved alongside the articles
                tokio::fs::copy(&path, build_dir.join(&name))
                    .await
                    .with_context(|| format!("Failed to copy {}", name))?;
            }
        }
        sort_articles(&mut markdown);

        let mut prepared = Vec::new();
        for name in markdown {
            let content = match tokio::fs::read_to_string(source_dir.join(&name)).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Could not read {}: {}", name, e);
                    continue;
                }
            };
            let content = self.localize_images(&content, build_dir).await;
            tokio::fs::write(build_dir.join(&name), content)
                .await
                .with_context(|| format!("Failed to write {}", name))?;
            println!("✓ Processed: {}", name);
            prepared.push(name);
        }
        Ok(prepared)
    }

    /// リモートの WebP 画像を JPEG に変換して参照を書き換える
    async fn localize_images(&self, content: &str, build_dir: &Path) -> String {
        let urls: Vec<String> = self
            .webp
            .captures_iter(content)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();

        let mut content = content.to_string();
        for url in DeduplicationService::unique_in_order(urls) {
            let local_name = local_image_name(&url);
            match self.fetch_as_jpeg(&url).await {
                Ok(jpeg) => {
                    if let Err(e) = tokio::fs::write(build_dir.join(&local_name), jpeg).await {
                        warn!("Could not write {}: {}", local_name, e);
                        continue;
                    }
                    content = content.replace(&url, &local_name);
                    debug!("Converted {} to {}", url, local_name);
                }
                Err(e) => warn!(
                    "Failed to process image {}: {}",
                    url,
                    error_chain_to_string(&e)
                ),
            }
        }
        content
    }

    async fn fetch_as_jpeg(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .downloader
            .download(url, self.options.http_timeout)
            .await?;
        let images = Arc::clone(&self.images);
        tokio::task::spawn_blocking(move || images.to_jpeg(&bytes))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to spawn blocking task: {}", e))?
    }

    async fn prepare_stylesheet(&self, build_dir: &Path) -> bool {
        let Some(stylesheet) = &self.options.stylesheet else {
            return false;
        };
        if !stylesheet.exists() {
            info!(
                "Stylesheet {} not found, using default pandoc styles",
                stylesheet.display()
            );
            return false;
        }
        match tokio::fs::copy(stylesheet, build_dir.join(STYLESHEET_NAME)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Could not copy stylesheet: {}", e);
                false
            }
        }
    }

    async fn run_pandoc(&self, build_dir: &Path, args: Vec<OsString>) -> Result<()> {
        let program = self.program()?;
        info!("Running {} in {}", program.display(), build_dir.display());

        let child = Command::new(&program)
            .args(&args)
            .current_dir(build_dir)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.options.timeout, child)
            .await
            .with_context(|| {
                format!(
                    "pandoc did not finish within {}s",
                    self.options.timeout.as_secs()
                )
            })?
            .with_context(|| format!("Failed to run {}", program.display()))?;

        if !output.status.success() {
            bail!(
                "pandoc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Packager for PandocPackager {
    async fn package(&self, request: &PackageRequest) -> Result<PathBuf> {
        if !request.source_dir.is_dir() {
            bail!(
                "Artifact directory not found: {}",
                request.source_dir.display()
            );
        }

        let build_dir = build_dir_for(&request.source_dir);
        if build_dir.exists() {
            tokio::fs::remove_dir_all(&build_dir)
                .await
                .with_context(|| format!("Failed to clear {}", build_dir.display()))?;
        }

        let result = self.build(request, &build_dir).await;

        // Always cleanup
        if let Err(e) = tokio::fs::remove_dir_all(&build_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", build_dir.display(), e);
            }
        }

        result
    }
}

/// 成果物ディレクトリに対応する作業用ディレクトリ
/// 発見順（番号順）に並べる。番号の無いファイルは名前順で後ろに置く
fn sort_articles(names: &mut [String]) {
    names.sort_by(|a, b| {
        let key = |name: &str| article_sequence(name).unwrap_or(usize::MAX);
        key(a).cmp(&key(b)).then_with(|| a.cmp(b))
    });
}

fn build_dir_for(source_dir: &Path) -> PathBuf {
    let mut name = source_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(BUILD_SUFFIX);
    source_dir.with_file_name(name)
}

/// URL から決まるローカル画像名
fn local_image_name(url: &str) -> String {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    format!("img_{:08x}.jpg", hasher.finish() & 0xffff_ffff)
}

/// pandoc の引数
fn build_args(
    request: &PackageRequest,
    output: &Path,
    build_dir: &Path,
    date: &str,
    has_stylesheet: bool,
    has_cover: bool,
    articles: &[String],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-f",
        "commonmark",
        "-t",
        "epub3",
        "--toc",
        "--toc-depth=1",
        "--epub-chapter-level=1",
        "--standalone",
    ]
    .iter()
    .map(OsString::from)
    .collect();

    args.push("-o".into());
    args.push(output.as_os_str().to_os_string());
    for (key, value) in [
        ("title", request.title.as_str()),
        ("author", request.author.as_str()),
        ("language", request.language.as_str()),
        ("date", date),
    ] {
        args.push("--metadata".into());
        args.push(format!("{}={}", key, value).into());
    }

    let mut resource_path = OsString::from("--resource-path=");
    resource_path.push(build_dir.as_os_str());
    args.push(resource_path);

    if has_stylesheet {
        args.push("--css".into());
        args.push(STYLESHEET_NAME.into());
    }
    if has_cover {
        args.push(format!("--epub-cover-image={}", COVER_FILE_NAME).into());
    }
    args.extend(articles.iter().map(OsString::from));
    args
}
