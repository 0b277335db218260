//! Chromium session management
//!
//! A [`ScraperSession`] owns one headless Chromium process plus a single page.
//! The browser launches lazily on the first fetch and is torn down with
//! [`ScraperSession::close`]. Sessions are per-invocation: the tool layer
//! constructs a fresh one for every scrape call and never shares a session
//! across concurrent requests, so no locking is needed here.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::pipeline::MarkupSource;

/// Chrome flags for containerized headless scraping. Rendering extras are
/// disabled because only the DOM markup is consumed.
const CHROME_ARGS: [&str; 13] = [
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
    "--no-zygote",
    "--disable-audio-output",
    "--disable-software-rasterizer",
    "--disable-webgl",
    "--disable-web-security",
    "--disable-features=LazyFrameLoading",
    "--disable-features=IsolateOrigins",
    "--disable-background-networking",
];

/// How often the ready selector is re-probed while waiting for the page.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Browser session failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser start failed: {0}")]
    StartFailed(String),

    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// One headless Chromium instance with a single page
pub struct ScraperSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    headless: bool,
    chrome_path: Option<PathBuf>,
    ready_selector: String,
    selector_timeout: Duration,
    render_grace: Duration,
}

impl ScraperSession {
    /// Create an unstarted session from config. No browser process is
    /// spawned until the first fetch.
    pub fn from_config(config: &Config) -> Self {
        Self {
            browser: None,
            page: None,
            handler_task: None,
            headless: config.headless,
            chrome_path: config.chrome_path.clone(),
            ready_selector: config.ready_selector.clone(),
            selector_timeout: Duration::from_millis(config.selector_timeout_ms),
            render_grace: Duration::from_millis(config.render_grace_ms),
        }
    }

    async fn start(&mut self) -> Result<(), SessionError> {
        let mut builder = BrowserConfig::builder().args(CHROME_ARGS.to_vec());

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(SessionError::StartFailed)?;

        info!("Launching Chromium (headless={})", self.headless);

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SessionError::StartFailed(e.to_string()))?;

        // Drive the CDP websocket until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("CDP handler loop ended");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::StartFailed(e.to_string()))?;

        self.browser = Some(browser);
        self.page = Some(page);
        self.handler_task = Some(handler_task);

        Ok(())
    }

    /// Navigate to `url` and return the rendered page markup.
    ///
    /// Launches the browser on first use. After the load event we poll for
    /// the ready selector; if it never appears within the timeout we sleep a
    /// fixed grace period and take the page as-is. A slow or restructured
    /// page still yields markup, just possibly without listings.
    pub async fn fetch_markup(&mut self, url: &str) -> Result<String, SessionError> {
        if self.page.is_none() {
            self.start().await?;
        }
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| SessionError::StartFailed("no page after browser start".to_string()))?;

        debug!("Navigating to {}", url);

        page.goto(url)
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;

        let selector = self.ready_selector.as_str();
        let found = wait_until(self.selector_timeout, SELECTOR_POLL_INTERVAL, move || {
            async move { page.find_element(selector).await.is_ok() }
        })
        .await;

        if !found {
            debug!(
                "Ready selector {:?} not seen within {:?}, holding {:?} grace",
                self.ready_selector, self.selector_timeout, self.render_grace
            );
            tokio::time::sleep(self.render_grace).await;
        }

        page.content()
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))
    }

    /// Tear down the browser. Safe to call on a session that never started;
    /// a closed session relaunches on the next fetch.
    pub async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Page close returned error: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close returned error: {}", e);
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl MarkupSource for ScraperSession {
    async fn fetch_markup(&mut self, url: &str) -> Result<String, SessionError> {
        ScraperSession::fetch_markup(self, url).await
    }

    async fn close(&mut self) {
        ScraperSession::close(self).await;
    }
}

/// Poll `probe` every `poll_interval` until it returns true or `timeout`
/// elapses. Always probes at least once, including with a zero timeout.
async fn wait_until<F, Fut>(timeout: Duration, poll_interval: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if probe().await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_returns_on_first_success() {
        let found = wait_until(
            Duration::from_millis(1000),
            Duration::from_millis(100),
            || async { true },
        )
        .await;
        assert!(found);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_sees_late_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe_calls = calls.clone();

        let found = wait_until(
            Duration::from_millis(1000),
            Duration::from_millis(100),
            move || {
                let calls = probe_calls.clone();
                async move { calls.fetch_add(1, Ordering::SeqCst) >= 2 }
            },
        )
        .await;

        assert!(found);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_gives_up_at_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe_calls = calls.clone();

        let found = wait_until(
            Duration::from_millis(700),
            Duration::from_millis(100),
            move || {
                let calls = probe_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    false
                }
            },
        )
        .await;

        assert!(!found);
        // Probes at 0ms through 700ms inclusive.
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_zero_timeout_probes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe_calls = calls.clone();

        let found = wait_until(Duration::ZERO, Duration::from_millis(100), move || {
            let calls = probe_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            }
        })
        .await;

        assert!(!found);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chrome_args_cover_container_quirks() {
        assert!(CHROME_ARGS.contains(&"--no-sandbox"));
        assert!(CHROME_ARGS.contains(&"--disable-dev-shm-usage"));
        assert!(CHROME_ARGS.contains(&"--no-zygote"));
    }
}
