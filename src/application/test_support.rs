//! テスト用のフェイク
//!
//! URL → HTML の表を持つ偽サイトと、それを操作する偽ブラウザ。
//! 起動・クローズなどの出来事はジャーナルに記録される。

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::dto::settings::{LoginSettings, ScrapeSettings};
use crate::domain::entities::session_state::StorageState;
use crate::domain::error::PipelineError;
use crate::domain::repositories::renderer::{
    BrowserContext, Environment, Page, Renderer, SubmitStrategy, WaitPolicy,
};
use crate::domain::repositories::session_repository::SessionRepository;

pub const BASE_URL: &str = "https://mag.test/digital";
pub const LOGIN_URL: &str = "https://mag.test/digital/login/";
pub const INDEX_URL: &str = "https://mag.test/digital/edicoes/";

const LOGIN_FORM: &str = r#"<html><body><form>
<input name="log"><input name="pwd" type="password">
<input id="wp-submit" type="submit" value="Acessar">
</form></body></html>"#;

const WELCOME: &str = "<html><body><p>Bem-vindo</p></body></html>";

/// 偽サイトの状態
pub struct SiteState {
    pub pages: HashMap<String, String>,
    pub timeouts: HashSet<String>,
    pub broken: HashSet<String>,
    pub clickable: Vec<SubmitStrategy>,
    pub accepts_login: bool,
    pub accepts_saved_session: bool,
    pub fail_launch: bool,
    pub fail_context: bool,
    pub fail_context_close: bool,
    pub journal: Vec<String>,
}

impl Default for SiteState {
    fn default() -> Self {
        Self {
            pages: HashMap::new(),
            timeouts: HashSet::new(),
            broken: HashSet::new(),
            clickable: vec![SubmitStrategy::Css("#wp-submit".to_string())],
            accepts_login: true,
            accepts_saved_session: true,
            fail_launch: false,
            fail_context: false,
            fail_context_close: false,
            journal: Vec::new(),
        }
    }
}

/// 偽サイト（テストから状態を操作する）
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// 状態を書き換える
    pub fn configure(&self, f: impl FnOnce(&mut SiteState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn add_page(&self, url: &str, html: &str) {
        self.configure(|s| {
            s.pages.insert(url.to_string(), html.to_string());
        });
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    /// ジャーナル中の出来事の回数
    pub fn count(&self, event: &str) -> usize {
        self.journal().iter().filter(|e| e.as_str() == event).count()
    }

    /// 前方一致する出来事の回数
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.journal().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn renderer(&self) -> Arc<dyn Renderer> {
        Arc::new(FakeRenderer { site: self.clone() })
    }

    fn record(&self, event: impl Into<String>) {
        self.state.lock().unwrap().journal.push(event.into());
    }

    fn with<T>(&self, f: impl FnOnce(&SiteState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }
}

struct FakeRenderer {
    site: FakeSite,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn launch(&self) -> Result<Box<dyn Environment>> {
        if self.site.with(|s| s.fail_launch) {
            bail!("browser executable not found");
        }
        self.site.record("launch");
        Ok(Box::new(FakeEnvironment {
            site: self.site.clone(),
        }))
    }
}

struct FakeEnvironment {
    site: FakeSite,
}

#[async_trait]
impl Environment for FakeEnvironment {
    async fn new_context(&self, state: Option<&StorageState>) -> Result<Box<dyn BrowserContext>> {
        if self.site.with(|s| s.fail_context) {
            bail!("context creation failed");
        }
        let authenticated = match state {
            Some(storage) => {
                !storage.cookies.is_empty() && self.site.with(|s| s.accepts_saved_session)
            }
            None => false,
        };
        self.site.record(if state.is_some() {
            "context-restored"
        } else {
            "context-new"
        });
        Ok(Box::new(FakeContext {
            site: self.site.clone(),
            authenticated: Arc::new(AtomicBool::new(authenticated)),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.site.record("environment-close");
        Ok(())
    }
}

struct FakeContext {
    site: FakeSite,
    authenticated: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        Ok(Box::new(FakePage {
            site: self.site.clone(),
            authenticated: self.authenticated.clone(),
            current: Mutex::new("about:blank".to_string()),
        }))
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let cookies = if self.authenticated.load(Ordering::SeqCst) {
            vec![serde_json::json!({"name": "session", "value": "fresh"})]
        } else {
            vec![]
        };
        Ok(StorageState {
            cookies,
            origins: vec![],
        })
    }

    async fn close(&self) -> Result<()> {
        self.site.record("context-close");
        if self.site.with(|s| s.fail_context_close) {
            bail!("context already gone");
        }
        Ok(())
    }
}

struct FakePage {
    site: FakeSite,
    authenticated: Arc<AtomicBool>,
    current: Mutex<String>,
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _wait: WaitPolicy, timeout: Duration) -> Result<()> {
        self.site.record(format!("goto {}", url));
        if self.site.with(|s| s.timeouts.contains(url)) {
            return Err(PipelineError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
            .into());
        }
        if self.site.with(|s| s.broken.contains(url)) {
            bail!("net::ERR_CONNECTION_RESET");
        }
        *self.current.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        let current = self.current.lock().unwrap().clone();
        if current == LOGIN_URL {
            return Ok(if self.authenticated.load(Ordering::SeqCst) {
                WELCOME.to_string()
            } else {
                LOGIN_FORM.to_string()
            });
        }
        Ok(self
            .site
            .with(|s| s.pages.get(&current).cloned())
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn url(&self) -> Result<String> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn fill(&self, selector: &str, _value: &str) -> Result<()> {
        self.site.record(format!("fill {}", selector));
        Ok(())
    }

    async fn click(&self, strategy: &SubmitStrategy, _timeout: Duration) -> Result<()> {
        self.site.record(format!("click {}", strategy));
        if !self.site.with(|s| s.clickable.contains(strategy)) {
            bail!("timed out waiting for {}", strategy);
        }
        if self.site.with(|s| s.accepts_login) {
            self.authenticated.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn wait_for_settle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.site.record("page-close");
        Ok(())
    }
}

/// メモリ上のセッションリポジトリ
#[derive(Default)]
pub struct MemorySessionRepository {
    pub blob: Mutex<Option<String>>,
    pub saves: Mutex<usize>,
}

impl MemorySessionRepository {
    pub fn with_blob(blob: &str) -> Self {
        Self {
            blob: Mutex::new(Some(blob.to_string())),
            saves: Mutex::new(0),
        }
    }

    pub fn blob(&self) -> Option<String> {
        self.blob.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.blob())
    }

    async fn save(&self, blob: &str) -> Result<()> {
        *self.blob.lock().unwrap() = Some(blob.to_string());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.blob.lock().unwrap() = None;
        Ok(())
    }
}

pub const SAVED_SESSION: &str = r#"{"cookies": [{"name": "session", "value": "saved"}], "origins": []}"#;

pub fn login_settings() -> LoginSettings {
    LoginSettings {
        login_url: LOGIN_URL.to_string(),
        username: "reader".to_string(),
        password: "secret".to_string(),
        username_selector: r#"input[name="log"]"#.to_string(),
        password_selector: r#"input[name="pwd"]"#.to_string(),
        submit_strategies: vec![
            SubmitStrategy::Css("#wp-submit".to_string()),
            SubmitStrategy::Css(r#"input[name="wp-submit"]"#.to_string()),
            SubmitStrategy::Text("Acessar".to_string()),
        ],
        navigation_timeout: Duration::from_secs(30),
        click_timeout: Duration::from_secs(5),
        settle_timeout: Duration::from_secs(30),
        verify_reused: true,
    }
}

pub fn scrape_settings() -> ScrapeSettings {
    ScrapeSettings {
        base_url: BASE_URL.to_string(),
        index_path: "/edicoes/".to_string(),
        item_path: "/edicao/".to_string(),
        edition_link_selector: "a.text-main-dark".to_string(),
        cover_selector: "img.w-100".to_string(),
        article_link_selector: "a.text-main-dark".to_string(),
        author_container_selector: "#author".to_string(),
        author_name_selector: "h6".to_string(),
        author_bio_selector: "p".to_string(),
        title_separators: vec!["|".to_string(), " - ".to_string()],
        title_boilerplate: vec!["Revista Liberta".to_string(), "–".to_string()],
        navigation_timeout: Duration::from_secs(30),
        http_timeout: Duration::from_secs(30),
    }
}

/// 一覧ページの HTML
pub fn index_page(slugs: &[&str]) -> String {
    let links: String = slugs
        .iter()
        .map(|slug| format!(r#"<a class="text-main-dark" href="/digital/edicao/{}/">{}</a>"#, slug, slug))
        .collect();
    format!("<html><body>{}</body></html>", links)
}

/// 処理単位のページ（記事リンクとカバー）
pub fn item_page(articles: &[&str], cover: Option<&str>) -> String {
    let links: String = articles
        .iter()
        .map(|a| format!(r#"<a class="text-main-dark" href="/digital/artigo/{}">{}</a>"#, a, a))
        .collect();
    let cover = cover
        .map(|src| format!(r#"<img class="w-100" src="{}">"#, src))
        .unwrap_or_default();
    format!("<html><body>{}{}</body></html>", cover, links)
}

/// 記事ページ
pub fn article_page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{} | Revista Liberta</title></head><body><article><p>{}</p></article></body></html>",
        title, body
    )
}

pub fn item_url(slug: &str) -> String {
    format!("{}/edicao/{}", BASE_URL, slug)
}

pub fn article_url(name: &str) -> String {
    format!("https://mag.test/digital/artigo/{}", name)
}
