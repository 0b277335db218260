//! Scrape pipeline orchestration
//!
//! One tool invocation runs one linear pipeline: build the target URL from
//! the search query, fetch rendered markup through a browser session, reduce
//! it to the listings container, extract structured listings through the LLM
//! client, and release the session. The stages are injected behind the
//! [`MarkupSource`] and [`ListingExtractor`] traits so the orchestration is
//! testable without Chromium or the OpenAI API.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::browser::SessionError;
use crate::config::Config;
use crate::listings::ListingResponse;
use crate::openai::ExtractionError;
use crate::reduce::reduce_markup;

/// Provider of rendered page markup
#[async_trait]
pub trait MarkupSource: Send {
    /// Fetch the fully rendered markup behind `url`.
    async fn fetch_markup(&mut self, url: &str) -> Result<String, SessionError>;

    /// Release underlying resources. The pipeline calls this exactly once
    /// per run, on success and on failure alike.
    async fn close(&mut self);
}

/// Schema-constrained structured extraction
#[async_trait]
pub trait ListingExtractor: Send + Sync {
    async fn extract(
        &self,
        markup: &str,
        instructions: &str,
        truncate_limit: usize,
    ) -> Result<ListingResponse, ExtractionError>;
}

/// Pipeline failures, tagged by originating stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),
}

impl PipelineError {
    /// Stage label for log lines
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Session(SessionError::StartFailed(_)) => "session-start",
            PipelineError::Session(SessionError::Navigation(_)) => "navigation",
            PipelineError::Extraction(_) => "extraction",
        }
    }
}

/// Linear scrape-reduce-extract pipeline over injected stages
pub struct Pipeline<S, E> {
    source: S,
    extractor: E,
    base_url: String,
    container_selector: String,
    truncate_limit: usize,
}

impl<S: MarkupSource, E: ListingExtractor> Pipeline<S, E> {
    pub fn new(source: S, extractor: E, config: &Config) -> Self {
        Self {
            source,
            extractor,
            base_url: config.listings_base_url.clone(),
            container_selector: config.container_selector.clone(),
            truncate_limit: config.truncate_limit,
        }
    }

    /// Target URL for a search query. The query is interpolated into the
    /// path as-is, without URL encoding; queries carrying reserved URL
    /// characters will address a different path than the literal text.
    pub fn target_url(&self, query: &str) -> String {
        format!("{}/{}", self.base_url, query)
    }

    /// Run the full pipeline for one query.
    ///
    /// The markup source is closed before this returns, whichever stage
    /// failed. Errors from `close` itself are logged inside the source and
    /// never override the stage result.
    pub async fn run(
        &mut self,
        query: &str,
        instructions: &str,
    ) -> Result<ListingResponse, PipelineError> {
        let url = self.target_url(query);
        info!("Scraping {}", url);

        let result = self.run_stages(&url, instructions).await;
        self.source.close().await;
        result
    }

    async fn run_stages(
        &mut self,
        url: &str,
        instructions: &str,
    ) -> Result<ListingResponse, PipelineError> {
        let markup = self.source.fetch_markup(url).await?;
        let reduced = reduce_markup(&markup, &self.container_selector);
        let listings = self
            .extractor
            .extract(&reduced, instructions, self.truncate_limit)
            .await?;
        Ok(listings)
    }

    /// Run the pipeline, absorbing every failure into an empty response.
    /// Tool callers always receive a valid listings value, never an error.
    pub async fn run_or_empty(&mut self, query: &str, instructions: &str) -> ListingResponse {
        match self.run(query, instructions).await {
            Ok(listings) => {
                info!("Scrape produced {} listings", listings.listings.len());
                listings
            }
            Err(e) => {
                warn!("Scrape failed during {}: {}", e.stage(), e);
                ListingResponse::empty()
            }
        }
    }
}
