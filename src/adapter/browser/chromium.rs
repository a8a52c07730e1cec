//! Chromium Renderer
//!
//! chromiumoxide による Renderer 実装
//!
//! 1回の起動で1つのブラウザプロセスを持ち、ブラウザコンテキストごとに
//! クッキーを分離する。保存状態はクッキーのみを扱う。

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::storage::{GetCookiesParams, SetCookiesParams};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use futures::StreamExt;
use log::{debug, info, warn};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use crate::domain::entities::session_state::StorageState;
use crate::domain::error::PipelineError;
use crate::domain::repositories::renderer::{
    BrowserContext, Environment, Page, Renderer, SubmitStrategy, WaitPolicy,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
// Quiet period that counts as network idle
const IDLE_WINDOW: Duration = Duration::from_millis(500);

/// PATH 上の Chrome / Chromium を探す
pub fn find_chromium() -> Option<PathBuf> {
    for candidate in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(candidate) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// 制限時間内に終わらなければエラーにする
async fn bounded<T, F>(limit: Duration, what: &str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => bail!("{} timed out after {}ms", what, limit.as_millis()),
    }
}

/// 起動設定
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// CDP 命令1回あたりの制限時間
    pub command_timeout: Duration,
    /// 終了を待つ時間（超えたら子プロセスを kill する）
    pub close_timeout: Duration,
}

/// 起動後の各操作に適用する制限時間
#[derive(Debug, Clone, Copy)]
struct Limits {
    command: Duration,
    close: Duration,
}

/// Chromium の起動を担う Renderer
pub struct ChromiumRenderer {
    options: ChromiumOptions,
}

impl ChromiumRenderer {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    fn config(&self) -> Result<BrowserConfig> {
        let executable = match &self.options.executable {
            Some(path) => path.clone(),
            None => find_chromium().context("Chromium not found. Install Chrome or set COURIER_CHROME_PATH")?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .window_size(self.options.window_width, self.options.window_height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !self.options.headless {
            builder = builder.with_head();
        }

        builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn launch(&self) -> Result<Box<dyn Environment>> {
        let config = self.config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drives the CDP connection until the browser goes away
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Chromium handler: {}", e);
                }
            }
        });

        info!("Chromium launched");
        Ok(Box::new(ChromiumEnvironment {
            browser: Arc::new(Mutex::new(browser)),
            handler: StdMutex::new(Some(handler)),
            limits: Limits {
                command: self.options.command_timeout,
                close: self.options.close_timeout,
            },
        }))
    }
}

/// 起動済みのブラウザプロセス
pub struct ChromiumEnvironment {
    browser: Arc<Mutex<Browser>>,
    handler: StdMutex<Option<JoinHandle<()>>>,
    limits: Limits,
}

impl ChromiumEnvironment {
    /// 子プロセスを強制終了する
    async fn kill(&self) -> Result<()> {
        let limit = self.limits.close;
        bounded(limit, "killing Chromium", async {
            match self.browser.lock().await.kill().await {
                Some(result) => result.context("failed to kill Chromium"),
                None => Ok(()),
            }
        })
        .await
    }

    fn stop_handler(&self) {
        if let Ok(mut handler) = self.handler.lock() {
            if let Some(handler) = handler.take() {
                handler.abort();
            }
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[async_trait]
impl Environment for ChromiumEnvironment {
    async fn new_context(&self, state: Option<&StorageState>) -> Result<Box<dyn BrowserContext>> {
        let limit = self.limits.command;
        let id = bounded(limit, "creating a browser context", async {
            let browser = self.browser.lock().await;
            let created = browser
                .execute(CreateBrowserContextParams::default())
                .await
                .context("failed to create browser context")?;
            Ok::<_, anyhow::Error>(created.result.browser_context_id.clone())
        })
        .await?;

        if let Some(state) = state {
            let cookies = cookie_params(state);
            debug!("Restoring {} cookies", cookies.len());
            let restore = SetCookiesParams {
                cookies,
                browser_context_id: Some(id.clone()),
            };
            let restored = bounded(limit, "restoring cookies", async {
                self.browser
                    .lock()
                    .await
                    .execute(restore)
                    .await
                    .context("failed to restore cookies")?;
                Ok::<_, anyhow::Error>(())
            })
            .await;
            if let Err(e) = restored {
                // Don't leak the half-built context
                let _ = bounded(limit, "disposing a browser context", async {
                    self.browser
                        .lock()
                        .await
                        .execute(DisposeBrowserContextParams::new(id.clone()))
                        .await?;
                    Ok::<_, anyhow::Error>(())
                })
                .await;
                return Err(e);
            }
        }

        Ok(Box::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            id,
            limits: self.limits,
        }))
    }

    async fn close(&self) -> Result<()> {
        let graceful = bounded(self.limits.close, "closing Chromium", async {
            let mut browser = self.browser.lock().await;
            browser.close().await.context("failed to close Chromium")?;
            browser.wait().await.context("failed to wait for Chromium")?;
            Ok::<_, anyhow::Error>(())
        })
        .await;

        let result = match graceful {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Chromium did not exit cleanly, killing it: {}", e);
                self.kill().await
            }
        };
        self.stop_handler();
        result
    }
}

impl Drop for ChromiumEnvironment {
    fn drop(&mut self) {
        self.stop_handler();
    }
}

/// クッキーを分離したブラウザコンテキスト
pub struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    id: BrowserContextId,
    limits: Limits,
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(|e| anyhow!("invalid target params: {e}"))?;

        let page = bounded(self.limits.command, "opening a page", async {
            self.browser
                .lock()
                .await
                .new_page(params)
                .await
                .context("failed to create new page")
        })
        .await?;

        Ok(Box::new(ChromiumPage {
            page,
            command_timeout: self.limits.command,
        }))
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let request = GetCookiesParams {
            browser_context_id: Some(self.id.clone()),
        };
        let response = bounded(self.limits.command, "reading cookies", async {
            self.browser
                .lock()
                .await
                .execute(request)
                .await
                .context("failed to read cookies")
        })
        .await?;

        let cookies = response
            .result
            .cookies
            .iter()
            .map(serde_json::to_value)
            .collect::<serde_json::Result<Vec<_>>>()
            .context("failed to serialize cookies")?;

        Ok(StorageState {
            cookies,
            origins: Vec::new(),
        })
    }

    async fn close(&self) -> Result<()> {
        bounded(self.limits.command, "disposing a browser context", async {
            self.browser
                .lock()
                .await
                .execute(DisposeBrowserContextParams::new(self.id.clone()))
                .await
                .context("failed to dispose browser context")?;
            Ok::<_, anyhow::Error>(())
        })
        .await
    }
}

/// 1つのタブ
pub struct ChromiumPage {
    page: chromiumoxide::Page,
    command_timeout: Duration,
}

impl ChromiumPage {
    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = bounded(self.command_timeout, "script execution", async {
            self.page.evaluate(script).await.context("JS execution failed")
        })
        .await?;
        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn ready_state(&self) -> Result<String> {
        self.evaluate("document.readyState".to_string()).await
    }

    async fn resource_count(&self) -> Result<u64> {
        self.evaluate("performance.getEntriesByType('resource').length".to_string())
            .await
    }

    /// 読み込み状態が条件を満たすまで待つ
    async fn wait_until(&self, wait: WaitPolicy, deadline: Instant) -> Result<bool> {
        loop {
            let state = self.ready_state().await.unwrap_or_default();
            let ready = match wait {
                WaitPolicy::DomContentLoaded => state == "interactive" || state == "complete",
                WaitPolicy::Load | WaitPolicy::NetworkIdle => state == "complete",
            };
            if ready {
                break;
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }

        if wait != WaitPolicy::NetworkIdle {
            return Ok(true);
        }

        // No new resource entries for a full window
        let mut last = self.resource_count().await?;
        let mut quiet_since = Instant::now();
        loop {
            if quiet_since.elapsed() >= IDLE_WINDOW {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
            let current = self.resource_count().await?;
            if current != last {
                last = current;
                quiet_since = Instant::now();
            }
        }
    }
}

fn navigation_timeout(url: &str, limit: Duration) -> anyhow::Error {
    anyhow::Error::from(PipelineError::NavigationTimeout {
        url: url.to_string(),
        timeout_ms: limit.as_millis() as u64,
    })
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[async_trait]
impl Page for ChromiumPage {
    async fn goto(&self, url: &str, wait: WaitPolicy, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        match timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => return Err(navigation_timeout(url, limit)),
        }

        if !self.wait_until(wait, deadline).await? {
            return Err(navigation_timeout(url, limit));
        }
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        bounded(self.command_timeout, "reading page content", async {
            self.page.content().await.context("failed to read page content")
        })
        .await
    }

    async fn url(&self) -> Result<String> {
        let url = bounded(self.command_timeout, "reading page URL", async {
            self.page.url().await.context("failed to read page URL")
        })
        .await?;
        Ok(url.unwrap_or_default())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let filled: bool = self.evaluate(fill_script(selector, value)?).await?;
        if !filled {
            bail!("no element matches {selector}");
        }
        Ok(())
    }

    async fn click(&self, strategy: &SubmitStrategy, limit: Duration) -> Result<()> {
        let script = click_script(strategy)?;
        let deadline = Instant::now() + limit;
        loop {
            if self.evaluate::<bool>(script.clone()).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!(
                    "no element matched {} within {}ms",
                    strategy,
                    limit.as_millis()
                );
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_settle(&self, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        // Clicking may or may not trigger a navigation
        if timeout(limit, self.page.wait_for_navigation()).await.is_err() {
            let url = self.url().await.unwrap_or_default();
            return Err(navigation_timeout(&url, limit));
        }
        if !self.wait_until(WaitPolicy::Load, deadline).await? {
            let url = self.url().await.unwrap_or_default();
            return Err(navigation_timeout(&url, limit));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        bounded(self.command_timeout, "closing a page", async {
            self.page
                .clone()
                .close()
                .await
                .context("failed to close page")
        })
        .await
    }
}

/// 保存状態のクッキーを CDP の形に変換（変換できないものは捨てる）
fn cookie_params(state: &StorageState) -> Vec<CookieParam> {
    state
        .cookies
        .iter()
        .filter_map(|cookie| {
            let mut cookie = cookie.clone();
            // Session cookies carry expires <= 0
            if let Some(object) = cookie.as_object_mut() {
                let expired = object
                    .get("expires")
                    .and_then(|v| v.as_f64())
                    .is_some_and(|expires| expires <= 0.0);
                if expired {
                    object.remove("expires");
                }
            }
            match serde_json::from_value::<CookieParam>(cookie) {
                Ok(param) => Some(param),
                Err(e) => {
                    warn!("Skipping unreadable saved cookie: {}", e);
                    None
                }
            }
        })
        .collect()
}

fn fill_script(selector: &str, value: &str) -> Result<String> {
    let selector = serde_json::to_string(selector)?;
    let value = serde_json::to_string(value)?;
    Ok(format!(
        r#"(() => {{
            const el = document.querySelector({selector});
            if (!el) return false;
            el.focus();
            el.value = {value};
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()"#
    ))
}

fn click_script(strategy: &SubmitStrategy) -> Result<String> {
    let script = match strategy {
        SubmitStrategy::Css(selector) => {
            let selector = serde_json::to_string(selector)?;
            format!(
                r#"(() => {{
                    const el = document.querySelector({selector});
                    if (!el) return false;
                    el.click();
                    return true;
                }})()"#
            )
        }
        SubmitStrategy::Text(text) => {
            let text = serde_json::to_string(text.trim())?;
            format!(
                r#"(() => {{
                    const nodes = document.querySelectorAll(
                        'button, input[type=submit], input[type=button], a, [role=button]');
                    for (const el of nodes) {{
                        const label = (el.innerText || el.value || '').trim();
                        if (label === {text}) {{
                            el.click();
                            return true;
                        }}
                    }}
                    return false;
                }})()"#
            )
        }
    };
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cookie_params_drops_session_expiry_and_bad_entries() {
        let state = StorageState {
            cookies: vec![
                json!({"name": "wordpress_logged_in", "value": "abc", "domain": ".mag.test",
                       "path": "/", "expires": -1, "httpOnly": true, "secure": true,
                       "sameSite": "Lax"}),
                json!({"name": "pref", "value": "1", "domain": "mag.test", "path": "/",
                       "expires": 1893456000.0}),
                json!({"value": "nameless"}),
            ],
            origins: Vec::new(),
        };

        let params = cookie_params(&state);

        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "wordpress_logged_in");
        assert!(params[0].expires.is_none());
        assert!(params[1].expires.is_some());
    }

    #[test]
    fn test_scripts_escape_selectors() {
        let script = fill_script(r#"input[name="log"]"#, "o'brien \"quoted\"").unwrap();
        assert!(script.contains(r#""input[name=\"log\"]""#));
        assert!(script.contains(r#""o'brien \"quoted\"""#));

        let script = click_script(&SubmitStrategy::Text(" Acessar ".to_string())).unwrap();
        assert!(script.contains(r#"label === "Acessar""#));
    }

    #[test]
    fn test_config_uses_explicit_executable() {
        let renderer = ChromiumRenderer::new(ChromiumOptions {
            executable: Some(PathBuf::from("/nonexistent/chrome")),
            headless: true,
            window_width: 1280,
            window_height: 720,
            command_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        });
        assert!(renderer.config().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_gives_up_on_a_hung_call() {
        let result: Result<()> = bounded(
            Duration::from_secs(5),
            "closing Chromium",
            std::future::pending(),
        )
        .await;

        let message = result.unwrap_err().to_string();
        assert!(message.contains("closing Chromium timed out after 5000ms"));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_results() {
        let ok = bounded(Duration::from_secs(1), "noop", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let failed: Result<()> = bounded(Duration::from_secs(1), "noop", async {
            Err(anyhow!("CDP error"))
        })
        .await;
        assert_eq!(failed.unwrap_err().to_string(), "CDP error");
    }

    #[tokio::test]
    #[ignore = "requires a local Chromium"]
    async fn test_launch_and_render_page() {
        let renderer = ChromiumRenderer::new(ChromiumOptions {
            executable: None,
            headless: true,
            window_width: 1280,
            window_height: 720,
            command_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        });
        let environment = renderer.launch().await.unwrap();
        let context = environment.new_context(None).await.unwrap();
        let page = context.new_page().await.unwrap();

        page.goto(
            "data:text/html,<title>t</title><input name=log><button>Acessar</button>",
            WaitPolicy::Load,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        page.fill("input[name=log]", "reader").await.unwrap();
        page.click(
            &SubmitStrategy::Text("Acessar".to_string()),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(page.content().await.unwrap().contains("Acessar"));

        page.close().await.unwrap();
        context.close().await.unwrap();
        environment.close().await.unwrap();
    }
}
