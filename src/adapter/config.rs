//! # Configuration
//!
//! JSON 設定ファイルと環境変数から組み立てる、不変の設定値
//!
//! すべての項目に既定値があるため、設定ファイルが無くても起動できる。
//! 認証情報は環境変数（`.env` を含む）で上書きする。

use anyhow::{bail, Context, Result};
use email_address::EmailAddress;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::application::dto::settings::{BookSettings, LoginSettings, MailSettings, ScrapeSettings};
use crate::domain::entities::delivery::DestinationSet;
use crate::domain::repositories::renderer::SubmitStrategy;
use crate::domain::services::retry::RetryPolicy;

pub const ENV_SITE_USER: &str = "COURIER_SITE_USER";
pub const ENV_SITE_PASS: &str = "COURIER_SITE_PASS";
pub const ENV_SMTP_USER: &str = "COURIER_SMTP_USER";
pub const ENV_SMTP_PASS: &str = "COURIER_SMTP_PASS";
pub const ENV_RECIPIENTS: &str = "COURIER_RECIPIENTS";
pub const ENV_CHROME_PATH: &str = "COURIER_CHROME_PATH";

/// サイト
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub index_path: String,
    pub login_path: String,
    pub item_path: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://revistaliberta.com.br/digital".to_string(),
            index_path: "/edicoes/".to_string(),
            login_path: "/login/".to_string(),
            item_path: "/edicao/".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// CSS セレクタ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub edition_links: String,
    pub cover_image: String,
    pub article_links: String,
    pub author_container: String,
    pub author_name: String,
    pub author_bio: String,
    pub login_username: String,
    pub login_password: String,
    pub login_submit: Vec<SubmitStrategy>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            edition_links: "a.text-main-dark".to_string(),
            cover_image: "img.w-100".to_string(),
            article_links: "a.text-main-dark".to_string(),
            author_container: "#author".to_string(),
            author_name: "h6".to_string(),
            author_bio: "p".to_string(),
            login_username: r#"input[name="log"]"#.to_string(),
            login_password: r#"input[name="pwd"]"#.to_string(),
            login_submit: vec![
                SubmitStrategy::Css("#wp-submit".to_string()),
                SubmitStrategy::Css(r#"input[name="wp-submit"]"#.to_string()),
                SubmitStrategy::Text("Acessar".to_string()),
            ],
        }
    }
}

/// タイムアウト（秒）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_secs: u64,
    pub login_click_secs: u64,
    pub settle_secs: u64,
    pub http_secs: u64,
    pub package_secs: u64,
    pub smtp_secs: u64,
    /// ブラウザへの個々の命令（コンテキスト作成・スクリプト実行など）
    pub browser_command_secs: u64,
    /// ブラウザ終了の待ち時間（超えたらプロセスを強制終了）
    pub browser_close_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_secs: 30,
            login_click_secs: 5,
            settle_secs: 30,
            http_secs: 30,
            package_secs: 120,
            smtp_secs: 30,
            browser_command_secs: 30,
            browser_close_secs: 10,
        }
    }
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }

    pub fn package(&self) -> Duration {
        Duration::from_secs(self.package_secs)
    }

    pub fn smtp(&self) -> Duration {
        Duration::from_secs(self.smtp_secs)
    }

    pub fn browser_command(&self) -> Duration {
        Duration::from_secs(self.browser_command_secs)
    }

    pub fn browser_close(&self) -> Duration {
        Duration::from_secs(self.browser_close_secs)
    }
}

/// パス（相対パスは `project_root` 基準）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathConfig {
    pub project_root: String,
    pub raw_dir: String,
    pub ebook_dir: String,
    pub sent_dir: String,
    pub session_file: String,
    pub ledger_file: String,
    pub stylesheet: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            project_root: ".".to_string(),
            raw_dir: "raw".to_string(),
            ebook_dir: "ebook".to_string(),
            sent_dir: "sent".to_string(),
            session_file: "data/auth.json".to_string(),
            ledger_file: "data/sent_history.txt".to_string(),
            stylesheet: "epub_styles.css".to_string(),
        }
    }
}

impl PathConfig {
    /// `~` と環境変数を展開したプロジェクトルート
    pub fn root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.project_root).into_owned())
    }

    /// 設定値をプロジェクトルート基準の絶対/相対パスにする
    pub fn resolve(&self, value: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(value).into_owned());
        if expanded.is_absolute() {
            expanded
        } else {
            self.root().join(expanded)
        }
    }

    pub fn raw(&self) -> PathBuf {
        self.resolve(&self.raw_dir)
    }

    pub fn ebook(&self) -> PathBuf {
        self.resolve(&self.ebook_dir)
    }

    pub fn sent(&self) -> PathBuf {
        self.resolve(&self.sent_dir)
    }

    pub fn session(&self) -> PathBuf {
        self.resolve(&self.session_file)
    }

    pub fn ledger(&self) -> PathBuf {
        self.resolve(&self.ledger_file)
    }

    pub fn stylesheet(&self) -> PathBuf {
        self.resolve(&self.stylesheet)
    }
}

/// 出力ファイル
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BookConfig {
    pub author: String,
    pub language: String,
    pub title_replacements: Vec<(String, String)>,
    pub title_separators: Vec<String>,
    pub title_boilerplate: Vec<String>,
    pub cover_max_width: u32,
    pub cover_max_height: u32,
    pub cover_quality: u8,
    pub image_quality: u8,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            author: "Revista Liberta".to_string(),
            language: "pt-BR".to_string(),
            title_replacements: vec![("Edicao".to_string(), "Edição".to_string())],
            title_separators: vec!["|".to_string(), " - ".to_string()],
            title_boilerplate: vec!["Revista Liberta".to_string(), "–".to_string()],
            cover_max_width: 1200,
            cover_max_height: 1920,
            cover_quality: 85,
            image_quality: 80,
        }
    }
}

/// メール
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub subject: String,
    pub body: String,
    pub sender: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub recipients: Vec<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            max_attempts: 3,
            retry_delay_secs: 5,
            subject: "Liberta Magazine".to_string(),
            body: "Your requested magazine is attached.".to_string(),
            sender: String::new(),
            password: String::new(),
            recipients: Vec::new(),
        }
    }
}

/// セッション
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 再利用したセッションがまだ有効かを確かめる
    pub verify_reused: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verify_reused: true,
        }
    }
}

/// ブラウザ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub executable: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            window_width: 1280,
            window_height: 720,
        }
    }
}

/// 設定全体
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub selectors: SelectorConfig,
    pub timeouts: TimeoutConfig,
    pub paths: PathConfig,
    pub book: BookConfig,
    pub mail: MailConfig,
    pub session: SessionConfig,
    pub browser: BrowserOptions,
}

impl Config {
    /// 設定ファイルを読み込み、環境変数で上書きする
    ///
    /// # Arguments
    ///
    /// * `path` - 設定ファイルのパス（`~` 展開あり）
    ///
    /// # Errors
    ///
    /// ファイルはあるが読めない、または JSON として不正な場合にエラーを返す
    pub fn load(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path).into_owned();
        let mut config = Self::from_file(Path::new(&expanded))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// 環境変数の値で上書きする（空の値は無視）
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(ENV_SITE_USER) {
            self.site.username = value;
        }
        if let Some(value) = get(ENV_SITE_PASS) {
            self.site.password = value;
        }
        if let Some(value) = get(ENV_SMTP_USER) {
            self.mail.sender = value;
        }
        if let Some(value) = get(ENV_SMTP_PASS) {
            self.mail.password = value;
        }
        if let Some(value) = get(ENV_RECIPIENTS) {
            self.mail.recipients = DestinationSet::parse_list(&value).addresses().to_vec();
        }
        if let Some(value) = get(ENV_CHROME_PATH) {
            self.browser.executable = Some(value);
        }
    }

    /// 宛先アドレスの書式を確かめる
    ///
    /// # Errors
    ///
    /// 宛先が無い、または不正なアドレスを含む場合にエラーを返す
    pub fn validate_recipients(&self) -> Result<()> {
        let recipients = self.destinations();
        if recipients.is_empty() {
            bail!("no recipients configured (set {})", ENV_RECIPIENTS);
        }

        let invalid: Vec<&str> = recipients
            .addresses()
            .iter()
            .filter(|address| EmailAddress::from_str(address).is_err())
            .map(String::as_str)
            .collect();

        if !invalid.is_empty() {
            bail!("invalid recipient addresses: {}", invalid.join(", "));
        }
        Ok(())
    }

    pub fn destinations(&self) -> DestinationSet {
        DestinationSet::new(self.mail.recipients.iter().cloned())
    }

    pub fn login_settings(&self) -> LoginSettings {
        LoginSettings {
            login_url: format!("{}{}", self.site.base_url, self.site.login_path),
            username: self.site.username.clone(),
            password: self.site.password.clone(),
            username_selector: self.selectors.login_username.clone(),
            password_selector: self.selectors.login_password.clone(),
            submit_strategies: self.selectors.login_submit.clone(),
            navigation_timeout: self.timeouts.navigation(),
            click_timeout: Duration::from_secs(self.timeouts.login_click_secs),
            settle_timeout: Duration::from_secs(self.timeouts.settle_secs),
            verify_reused: self.session.verify_reused,
        }
    }

    pub fn scrape_settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            base_url: self.site.base_url.clone(),
            index_path: self.site.index_path.clone(),
            item_path: self.site.item_path.clone(),
            edition_link_selector: self.selectors.edition_links.clone(),
            cover_selector: self.selectors.cover_image.clone(),
            article_link_selector: self.selectors.article_links.clone(),
            author_container_selector: self.selectors.author_container.clone(),
            author_name_selector: self.selectors.author_name.clone(),
            author_bio_selector: self.selectors.author_bio.clone(),
            title_separators: self.book.title_separators.clone(),
            title_boilerplate: self.book.title_boilerplate.clone(),
            navigation_timeout: self.timeouts.navigation(),
            http_timeout: self.timeouts.http(),
        }
    }

    pub fn book_settings(&self) -> BookSettings {
        BookSettings {
            author: self.book.author.clone(),
            language: self.book.language.clone(),
            title_replacements: self.book.title_replacements.clone(),
        }
    }

    pub fn mail_settings(&self) -> MailSettings {
        MailSettings {
            sender: self.mail.sender.clone(),
            password: self.mail.password.clone(),
            recipients: self.destinations(),
            subject: self.mail.subject.clone(),
            body: self.mail.body.clone(),
            retry: RetryPolicy::new(
                self.mail.max_attempts,
                Duration::from_secs(self.mail.retry_delay_secs),
            ),
        }
    }
}
