//! Browser engine boundary — the only module that talks CDP.
//!
//! Responsibilities:
//! * Finding a usable Chromium-family executable (env override → PATH scan →
//!   well-known install paths).
//! * Building a headless `BrowserConfig` with stealth defaults.
//! * `BrowserSession` — one browser + one page owned by a single run,
//!   released on every exit path.
//!
//! Components above this module speak in selectors, URLs, and plain data;
//! chromiumoxide types do not escape it (cookies cross as [`CookieRecord`]).

use anyhow::{anyhow, Context, Result as AnyResult};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::credential::CookieRecord;
use crate::error::{Error, Result};
use crate::poll;

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox 133 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Randomly-chosen realistic desktop User-Agent.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a `BrowserConfig` for headless operation with stealth defaults.
///
/// `--disable-blink-features=AutomationControlled` hides `navigator.webdriver`;
/// the challenge widget fails closed for automated contexts without it.
fn build_headless_config(exe: &str, user_agent: &str, width: u32, height: u32) -> AnyResult<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-crash-reporter")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", user_agent))
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

/// One headless browser owned by a single run.
///
/// The CDP event handler runs in a spawned task; `close()` shuts the browser
/// down and aborts it. `Drop` is only a backstop for panicky exits; normal
/// control flow must call `close()`.
pub struct BrowserSession {
    browser: Option<Browser>,
    pub(crate) page: Page,
    handler: JoinHandle<()>,
    user_agent: String,
}

impl BrowserSession {
    /// Launch a fresh headless browser with a blank page.
    ///
    /// `user_agent` pins the UA (session-token replay needs the original
    /// string); `None` draws a random one.
    pub async fn launch(user_agent: Option<&str>) -> Result<Self> {
        let exe = find_chrome_executable().ok_or_else(|| {
            Error::Config(
                "no browser found — install Chrome or Chromium, or set CHROME_EXECUTABLE"
                    .to_string(),
            )
        })?;
        let ua = match user_agent {
            Some(u) => u.to_string(),
            None => random_user_agent().to_string(),
        };

        info!("browser: launching headless {} (ua: {})", exe, ua);
        let config = build_headless_config(&exe, &ua, 1280, 900).map_err(Error::Browser)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Browser(anyhow!("browser launch failed ({}): {}", exe, e)))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser: CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                browser.close().await.ok();
                handle.abort();
                return Err(Error::Browser(anyhow!("failed to open page: {}", e)));
            }
        };

        Ok(Self {
            browser: Some(browser),
            page,
            handler: handle,
            user_agent: ua,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Navigate and wait for `document.readyState == "complete"` within the
    /// budget.
    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        info!("browser: goto {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| Error::Browser(anyhow!("goto({url}) failed: {}", e)))?;
        let page = &self.page;
        poll::until(
            &format!("page load of {url}"),
            timeout,
            poll::DEFAULT_INTERVAL,
            move || async move {
                let ready: String = page
                    .evaluate("document.readyState")
                    .await?
                    .into_value()
                    .unwrap_or_default();
                Ok(ready == "complete")
            },
        )
        .await?;
        Ok(())
    }

    /// URL after any client-side redirects.
    pub async fn current_url(&self) -> AnyResult<String> {
        let url: String = self
            .page
            .evaluate("location.href")
            .await
            .context("location.href eval failed")?
            .into_value()
            .unwrap_or_default();
        Ok(url)
    }

    pub async fn eval_bool(&self, js: &str) -> AnyResult<bool> {
        let v = self.page.evaluate(js).await.context("evaluate failed")?;
        Ok(v.into_value::<bool>().unwrap_or(false))
    }

    pub async fn eval_string(&self, js: &str) -> AnyResult<String> {
        let v = self.page.evaluate(js).await.context("evaluate failed")?;
        Ok(v.into_value::<String>().unwrap_or_default())
    }

    /// Text of the first element matching `selector`, or the full body text
    /// when the selector is empty / matches nothing.
    pub async fn read_text(&self, selector: &str) -> Result<String> {
        let js = format!(
            r#"(() => {{
                const sel = {sel};
                if (sel) {{
                    const el = document.querySelector(sel);
                    if (el) return (el.innerText || el.textContent || '').trim();
                }}
                return document.body ? document.body.innerText : '';
            }})()"#,
            sel = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".into()),
        );
        self.eval_string(&js).await.map_err(Error::Browser)
    }

    /// Scroll the element into view and click it through trusted CDP input.
    pub async fn click(&self, selector: &str) -> Result<()> {
        let elem = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| Error::ElementNotFound(selector.to_string()))?;
        elem.scroll_into_view()
            .await
            .map_err(|e| Error::Browser(anyhow!("scroll_into_view({selector}): {}", e)))?;
        elem.click()
            .await
            .map_err(|e| Error::Browser(anyhow!("click({selector}): {}", e)))?;
        Ok(())
    }

    /// Focus the element and type `text` as individual key events.
    pub async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let elem = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| Error::ElementNotFound(selector.to_string()))?;
        elem.click()
            .await
            .map_err(|e| Error::Browser(anyhow!("focus({selector}): {}", e)))?;
        elem.type_str(text)
            .await
            .map_err(|e| Error::Browser(anyhow!("type into {selector}: {}", e)))?;
        Ok(())
    }

    /// Dispatch a raw mouse click at viewport coordinates. Needed for
    /// cross-origin frames where no same-document element can be targeted.
    pub async fn click_at(&self, x: f64, y: f64) -> AnyResult<()> {
        let press = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|e| anyhow!("mouse press params: {}", e))?;
        let release = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|e| anyhow!("mouse release params: {}", e))?;

        self.page
            .execute(press)
            .await
            .context("dispatch mousePressed")?;
        tokio::time::sleep(Duration::from_millis(60)).await;
        self.page
            .execute(release)
            .await
            .context("dispatch mouseReleased")?;
        Ok(())
    }

    /// Apply a cookie jar to the context. Must happen before the first real
    /// navigation so the initial request already carries the session.
    pub async fn set_cookies(&self, jar: &[CookieRecord]) -> AnyResult<()> {
        let params: Vec<CookieParam> = jar
            .iter()
            .map(|c| {
                let mut p = CookieParam::new(c.name.clone(), c.value.clone());
                p.domain = Some(c.domain.clone());
                p.path = Some(c.path.clone());
                p.secure = Some(c.secure);
                p.http_only = Some(c.http_only);
                p
            })
            .collect();
        if params.is_empty() {
            anyhow::bail!("cookie jar is empty");
        }
        let count = params.len();
        self.page
            .set_cookies(params)
            .await
            .context("Network.setCookies")?;
        info!("browser: injected {} cookies", count);
        Ok(())
    }

    /// Capture the context's current cookie jar as plain records.
    pub async fn export_cookies(&self) -> AnyResult<Vec<CookieRecord>> {
        let cookies = self.page.get_cookies().await.context("Network.getCookies")?;
        Ok(cookies
            .into_iter()
            .map(|c| CookieRecord {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    /// Full-viewport PNG.
    pub async fn screenshot_png(&self) -> AnyResult<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .context("screenshot capture failed")
    }

    /// Shut the browser down. Close errors are non-fatal; the run result
    /// must never be shadowed by teardown.
    pub async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("browser: close error (non-fatal): {}", e);
            }
        }
        self.handler.abort();
        info!("browser: session released");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Backstop only. Drop cannot await; spawn a close so a panicked run
        // doesn't leave a zombie Chromium behind.
        self.handler.abort();
        if let Some(mut browser) = self.browser.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                });
            }
        }
    }
}
