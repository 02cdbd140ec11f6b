use anyhow::Result;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use nlbrowse::{BlockingGate, Driver, DriverError, DriverResult, ElementHandle, Selector};
use serde_json::{Value, json};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::dom;

const DEBUG_PORT_URL: &str = "http://127.0.0.1:9222";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Browser session driven through the DevTools protocol.
///
/// `headless_chrome` is blocking, so every primitive runs on the blocking
/// pool. The gate keeps a timed-out call from overlapping the next one.
pub struct ChromeDriver {
    _browser: Browser,
    tab: BlockingGate<Tab>,
    next_ref: AtomicU64,
}

impl ChromeDriver {
    /// Attach to a Chrome already listening on port 9222, or launch one
    /// with a persistent profile.
    pub fn launch(headless: bool) -> Result<Self> {
        info!("[Hands] Attempting to attach to existing Chrome on port 9222...");
        if let Ok(browser) = Browser::connect(DEBUG_PORT_URL.to_string()) {
            info!("[Hands] Attached to existing Chrome");
            let existing = browser
                .get_tabs()
                .lock()
                .map_err(|_| anyhow::anyhow!("tab list lock poisoned"))?
                .first()
                .cloned();
            let tab = match existing {
                Some(tab) => tab,
                None => browser.new_tab()?,
            };
            return Ok(Self::new(browser, tab));
        }

        let profile = profile_dir()?;
        std::fs::create_dir_all(&profile)?;
        info!("[Hands] Launching Chrome with profile {}", profile.display());

        let options = LaunchOptions {
            headless,
            path: find_chrome(),
            user_data_dir: Some(profile),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        let browser = Browser::new(options)
            .map_err(|e| anyhow::anyhow!("Browser launch failed: {}", e))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        info!("[Hands] Chrome ready");

        Ok(Self::new(browser, tab))
    }

    fn new(browser: Browser, tab: Arc<Tab>) -> Self {
        Self {
            _browser: browser,
            tab: BlockingGate::new(tab),
            next_ref: AtomicU64::new(0),
        }
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> DriverResult<T>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.tab
            .run(f)
            .await
            .map_err(|e| DriverError::failed(format!("{} panicked: {}", op, e)))?
            .map_err(|e| driver_error(op, e))
    }

    async fn script(&self, op: &'static str, script: &str, args: &[Value]) -> DriverResult<Value> {
        let expression = dom::call_expression(script, args);
        self.blocking(op, move |tab| {
            let result = tab.evaluate(&expression, true)?;
            if let Some(details) = result.description.filter(|_| result.subtype.is_some()) {
                anyhow::bail!("script error: {}", details);
            }
            Ok(dom::decode_result(result.value))
        })
        .await
    }
}

fn driver_error(op: &str, err: anyhow::Error) -> DriverError {
    let text = format!("{:#}", err);
    let lower = text.to_ascii_lowercase();
    if lower.contains("connection is closed") || lower.contains("target closed") {
        warn!("[Hands] {} lost the browser: {}", op, text);
        DriverError::SessionLost(text)
    } else {
        debug!("[Hands] {} failed: {}", op, text);
        DriverError::Failed(format!("{}: {}", op, text))
    }
}

fn profile_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("No local data directory"))?;
    Ok(base.join("nlbrowse").join("profile"))
}

/// Well-known install locations; `None` lets headless_chrome search PATH.
fn find_chrome() -> Option<PathBuf> {
    let user = std::env::var("USERNAME").unwrap_or_else(|_| "Default".to_string());
    let candidates = [
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(format!(
            r"C:\Users\{}\AppData\Local\Google\Chrome\Application\chrome.exe",
            user
        )),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
    ];
    candidates.into_iter().find(|p| p.exists())
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let url = url.to_string();
        self.blocking("navigate", move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.blocking("current_url", |tab| Ok(tab.get_url())).await
    }

    async fn locate(&self, selector: &Selector) -> DriverResult<Option<ElementHandle>> {
        let tag = self.next_ref.fetch_add(1, Ordering::Relaxed).to_string();
        let args = [json!(selector.css_part()), json!(selector.text_part()), json!(tag)];
        let found = self.script("locate", dom::LOCATE_JS, &args).await?;
        Ok(found.as_str().map(ElementHandle::new))
    }

    async fn is_visible(&self, handle: &ElementHandle) -> DriverResult<bool> {
        let visible = self
            .script("is_visible", dom::VISIBLE_JS, &[json!(handle.id)])
            .await?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn click(&self, handle: &ElementHandle) -> DriverResult<()> {
        let reference = handle.id.clone();
        self.blocking("click", move |tab| {
            tab.find_element(&reference)?.click()?;
            Ok(())
        })
        .await
    }

    async fn fill(&self, handle: &ElementHandle, text: &str) -> DriverResult<()> {
        self.script("fill", dom::CLEAR_JS, &[json!(handle.id)]).await?;
        if text.is_empty() {
            return Ok(());
        }
        let reference = handle.id.clone();
        let text = text.to_string();
        self.blocking("fill", move |tab| {
            tab.find_element(&reference)?.click()?;
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, handle: &ElementHandle, key: &str) -> DriverResult<()> {
        let reference = handle.id.clone();
        let key = key.to_string();
        self.blocking("press_key", move |tab| {
            tab.find_element(&reference)?.focus()?;
            tab.press_key(&key)?;
            Ok(())
        })
        .await
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> DriverResult<()> {
        self.script("scroll_by", dom::SCROLL_BY_JS, &[json!(dx), json!(dy)])
            .await
            .map(|_| ())
    }

    async fn evaluate(&self, script: &str, args: &[Value]) -> DriverResult<Value> {
        self.script("evaluate", script, args).await
    }

    async fn wait_for_selector(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> DriverResult<Option<ElementHandle>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(handle) = self.locate(selector).await? {
                return Ok(Some(handle));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
