//! Headless Chrome/Chromium driver using chromiumoxide.
//!
//! Each session is its own browser process. Launched browsers stay in a
//! process-local registry keyed by session id so a suspended session keeps
//! its tab, cookies and server-side state until it is resumed or released.
//! A handle restored in another process reconnects through the DevTools
//! websocket endpoint it recorded.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::Handler;
use chromiumoxide::page::Page;
use courtfetch_core::{AppConfig, CaptchaImage, SessionCookie, SessionHandle};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{BrowserDriver, BrowserSession, DriverError};

const DRIVER_NAME: &str = "chromium";

/// Launch options for [`ChromeDriver`].
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub user_agent: String,
    /// Bound for navigation and post-click settling.
    pub step_timeout: Duration,
    /// Viewport dimensions (default: 1280x720).
    pub viewport: (u32, u32),
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ChromeConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            headless: config.headless,
            executable: config.chrome_executable.clone(),
            user_agent: config.user_agent.clone(),
            step_timeout: config.step_timeout(),
            viewport: (1280, 720),
        }
    }
}

struct LiveBrowser<B> {
    browser: Arc<B>,
    handler: JoinHandle<()>,
}

/// Live browsers by session id.
///
/// The lock covers only lookup, insert and removal; callers drive a browser
/// through the `Arc` they get back, so one slow tab never blocks the others.
struct Registry<B> {
    entries: Mutex<HashMap<String, LiveBrowser<B>>>,
}

impl<B> Registry<B> {
    fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    async fn get(&self, session_id: &str) -> Option<Arc<B>> {
        self.entries.lock().await.get(session_id).map(|entry| Arc::clone(&entry.browser))
    }

    async fn insert(&self, session_id: String, browser: B, handler: JoinHandle<()>) -> Arc<B> {
        let browser = Arc::new(browser);
        let previous =
            self.entries.lock().await.insert(session_id, LiveBrowser { browser: Arc::clone(&browser), handler });
        if let Some(previous) = previous {
            previous.handler.abort();
        }
        browser
    }

    async fn remove(&self, session_id: &str) -> Option<LiveBrowser<B>> {
        self.entries.lock().await.remove(session_id)
    }
}

/// Browser driver backed by real Chrome processes.
pub struct ChromeDriver {
    config: ChromeConfig,
    live: Registry<Browser>,
    next_id: AtomicU64,
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("browser handler event error: {e}");
                break;
            }
        }
    })
}

impl ChromeDriver {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config, live: Registry::new(), next_id: AtomicU64::new(1) }
    }

    fn browser_config(&self) -> Result<BrowserConfig, DriverError> {
        let (width, height) = self.config.viewport;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .request_timeout(self.config.step_timeout)
            .arg(format!("--user-agent={}", self.config.user_agent));
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(DriverError::Launch)
    }

    fn session(&self, session_id: String, endpoint: String, page: Page) -> Box<dyn BrowserSession> {
        Box::new(ChromeSession { session_id, endpoint, page, step_timeout: self.config.step_timeout })
    }
}

/// Locate the handle's tab, or rebuild it from the stored cookies and URL.
async fn find_page(browser: &Browser, handle: &SessionHandle) -> Result<Page, DriverError> {
    let pages = browser.pages().await.map_err(|e| DriverError::SessionLost(e.to_string()))?;
    let target = handle.target_id.as_deref();
    if let Some(page) = pages.into_iter().find(|p| Some(p.target_id().inner().as_str()) == target) {
        return Ok(page);
    }

    tracing::warn!(session_id = %handle.session_id, "suspended tab is gone, rebuilding from cookies");
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| DriverError::SessionLost(e.to_string()))?;

    let mut cookies = Vec::with_capacity(handle.cookies.len());
    for cookie in &handle.cookies {
        let mut param = CookieParam::builder()
            .name(cookie.name.clone())
            .value(cookie.value.clone())
            .build()
            .map_err(DriverError::SessionLost)?;
        param.domain = cookie.domain.clone();
        param.path = cookie.path.clone();
        if param.domain.is_none() {
            param.url = handle.url.clone();
        }
        cookies.push(param);
    }
    if !cookies.is_empty() {
        page.set_cookies(cookies).await.map_err(|e| DriverError::SessionLost(e.to_string()))?;
    }

    let url = handle
        .url
        .as_deref()
        .ok_or_else(|| DriverError::SessionLost("handle has no page url".into()))?;
    page.goto(url).await.map_err(|e| DriverError::Navigation(e.to_string()))?;
    Ok(page)
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    async fn open(&self) -> Result<Box<dyn BrowserSession>, DriverError> {
        let (browser, handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        let handler = spawn_handler(handler);

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        let endpoint = browser.websocket_address().clone();
        let session_id = format!("{DRIVER_NAME}-{}-{}", std::process::id(), self.next_id.fetch_add(1, Ordering::SeqCst));

        self.live.insert(session_id.clone(), browser, handler).await;
        tracing::debug!(session_id = %session_id, "browser launched");

        Ok(self.session(session_id, endpoint, page))
    }

    async fn restore(&self, handle: &SessionHandle) -> Result<Box<dyn BrowserSession>, DriverError> {
        if handle.driver != DRIVER_NAME {
            return Err(DriverError::SessionLost(format!("handle belongs to driver {}", handle.driver)));
        }

        if let Some(browser) = self.live.get(&handle.session_id).await {
            let page = find_page(&browser, handle).await?;
            let endpoint = browser.websocket_address().clone();
            return Ok(self.session(handle.session_id.clone(), endpoint, page));
        }

        let endpoint = handle
            .endpoint
            .as_deref()
            .ok_or_else(|| DriverError::SessionLost(handle.session_id.clone()))?;
        let (mut browser, handler) = Browser::connect(endpoint)
            .await
            .map_err(|e| DriverError::SessionLost(e.to_string()))?;
        let handler = spawn_handler(handler);

        if let Err(e) = browser.fetch_targets().await {
            tracing::debug!(session_id = %handle.session_id, "target discovery failed: {e}");
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let page = match find_page(&browser, handle).await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(e);
            }
        };
        self.live.insert(handle.session_id.clone(), browser, handler).await;
        tracing::info!(session_id = %handle.session_id, "reconnected to suspended browser");

        Ok(self.session(handle.session_id.clone(), endpoint.to_string(), page))
    }

    async fn release(&self, handle: &SessionHandle) -> Result<(), DriverError> {
        let Some(entry) = self.live.remove(&handle.session_id).await else {
            return Ok(());
        };

        let closed = match Arc::try_unwrap(entry.browser) {
            Ok(mut browser) => browser.close().await.map(|_| ()),
            Err(_) => {
                tracing::warn!(session_id = %handle.session_id, "browser still in use, dropping connection");
                Ok(())
            }
        };
        entry.handler.abort();
        closed.map_err(|e| DriverError::Script(e.to_string()))?;
        tracing::debug!(session_id = %handle.session_id, "browser released");
        Ok(())
    }
}

struct ChromeSession {
    session_id: String,
    endpoint: String,
    page: Page,
    step_timeout: Duration,
}

impl ChromeSession {
    /// Run a DOM script against the first element matching `selector`.
    async fn on_element(&self, selector: &str, body: &str) -> Result<(), DriverError> {
        let selector_js = serde_json::to_string(selector).map_err(|e| DriverError::Script(e.to_string()))?;
        let script = format!(
            "(() => {{ const el = document.querySelector({selector_js}); if (!el) return false; {body} return true; }})()"
        );
        let found: bool = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| DriverError::Script(e.to_string()))?;

        if found { Ok(()) } else { Err(DriverError::ElementNotFound(selector.to_string())) }
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let value_js = serde_json::to_string(value).map_err(|e| DriverError::Script(e.to_string()))?;
        self.on_element(
            selector,
            &format!(
                "el.focus(); el.value = {value_js}; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }}));"
            ),
        )
        .await
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let ms = self.step_timeout.as_millis() as u64;
        tokio::time::timeout(self.step_timeout, self.page.goto(url))
            .await
            .map_err(|_| DriverError::Timeout { what: format!("navigation to {url}"), ms })?
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page.content().await.map_err(|e| DriverError::SessionLost(e.to_string()))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.set_value(selector, value).await
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.set_value(selector, value).await
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::ElementNotFound(selector.to_string()))?;
        element.click().await.map_err(|e| DriverError::Script(e.to_string()))?;

        // Some portals answer the submit in place without a navigation.
        if tokio::time::timeout(self.step_timeout, self.page.wait_for_navigation()).await.is_err() {
            tracing::debug!(selector, "no navigation after click");
        }
        Ok(())
    }

    async fn screenshot_element(&self, selector: &str) -> Result<CaptchaImage, DriverError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::ElementNotFound(selector.to_string()))?;
        let data = element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| DriverError::Screenshot(e.to_string()))?;
        Ok(CaptchaImage::png(data))
    }

    async fn handle(&self) -> Result<SessionHandle, DriverError> {
        let url = self.page.url().await.map_err(|e| DriverError::SessionLost(e.to_string()))?;
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| DriverError::SessionLost(e.to_string()))?
            .into_iter()
            .map(|c| SessionCookie { name: c.name, value: c.value, domain: Some(c.domain), path: Some(c.path) })
            .collect();

        Ok(SessionHandle {
            driver: DRIVER_NAME.into(),
            session_id: self.session_id.clone(),
            endpoint: Some(self.endpoint.clone()),
            target_id: Some(self.page.target_id().inner().clone()),
            url,
            cookies,
        })
    }
}
