//! Configuration management

use anyhow::Result;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI API key (optional - scrape calls fail without it)
    pub openai_api_key: Option<String>,

    /// OpenAI model for listing extraction
    pub model: String,

    /// Listings portal base URL; the search query is appended as a path segment
    pub listings_base_url: String,

    /// Selector that signals the listings page has rendered
    pub ready_selector: String,

    /// Selector for the container holding all listing cards
    pub container_selector: String,

    /// How long to poll for the ready selector before falling back (ms)
    pub selector_timeout_ms: u64,

    /// Fixed grace period when the ready selector never shows up (ms)
    pub render_grace_ms: u64,

    /// Max characters of markup forwarded to the extraction model
    pub truncate_limit: usize,

    /// Timeout for a single OpenAI request (seconds)
    pub openai_timeout_secs: u64,

    /// Bind host for the SSE transport
    pub sse_host: String,

    /// Bind port for the SSE transport
    pub sse_port: u16,

    /// Explicit Chrome/Chromium binary (optional - autodetected otherwise)
    pub chrome_path: Option<PathBuf>,

    /// Run the browser headless
    pub headless: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        let model = std::env::var("SCRAPEBOT_MODEL")
            .unwrap_or_else(|_| "gpt-4o-mini-2024-07-18".to_string());

        let listings_base_url = std::env::var("SCRAPEBOT_LISTINGS_URL")
            .unwrap_or_else(|_| "https://www.fincaraiz.com.co/arriendo/apartamentos".to_string());

        let ready_selector =
            std::env::var("SCRAPEBOT_READY_SELECTOR").unwrap_or_else(|_| "div.title".to_string());

        let container_selector = std::env::var("SCRAPEBOT_CONTAINER_SELECTOR")
            .unwrap_or_else(|_| "section.listingsWrapper".to_string());

        let selector_timeout_ms = std::env::var("SCRAPEBOT_SELECTOR_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7_000);

        let render_grace_ms = std::env::var("SCRAPEBOT_RENDER_GRACE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3_000);

        let truncate_limit = std::env::var("SCRAPEBOT_TRUNCATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100_000);

        let openai_timeout_secs = std::env::var("SCRAPEBOT_OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let sse_host =
            std::env::var("SCRAPEBOT_SSE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let sse_port = std::env::var("SCRAPEBOT_SSE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        let chrome_path = std::env::var("CHROME_PATH").map(PathBuf::from).ok();

        let headless = std::env::var("BROWSER_HEADLESS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            openai_api_key,
            model,
            listings_base_url,
            ready_selector,
            container_selector,
            selector_timeout_ms,
            render_grace_ms,
            truncate_limit,
            openai_timeout_secs,
            sse_host,
            sse_port,
            chrome_path,
            headless,
        })
    }
}
