//! OpenAI extraction client
//!
//! Sends reduced listing markup to the chat completions API with a strict
//! JSON-schema response format, so the reply deserializes directly into
//! [`ListingResponse`]. No retries: a scrape either produces structured
//! listings or surfaces the failure for the pipeline to absorb.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::listings::ListingResponse;
use crate::pipeline::ListingExtractor;
use crate::schema::ExtractionSchema;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Low sampling temperature so extracted field values stay verbatim.
const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// Extraction failures, from missing configuration through response parsing.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("OpenAI API error: {0}")]
    Api(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// OpenAI chat completions client for schema-constrained extraction
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
}

/// API request
#[derive(Debug, Serialize)]
struct ExtractionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: Value,
}

/// API response
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: Option<&str>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.map(|s| s.to_string()),
            model: model.to_string(),
        })
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Result<Self, ExtractionError> {
        Self::new(
            config.openai_api_key.as_deref(),
            &config.model,
            Duration::from_secs(config.openai_timeout_secs),
        )
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Extract structured listings from page markup.
    ///
    /// `instructions` is caller-supplied free text forwarded into the system
    /// prompt verbatim. Markup longer than `truncate_limit` characters is cut
    /// to exactly that limit before sending; shorter markup passes through
    /// unmodified.
    pub async fn extract_listings(
        &self,
        markup: &str,
        instructions: &str,
        truncate_limit: usize,
    ) -> Result<ListingResponse, ExtractionError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ExtractionError::Config("OPENAI_API_KEY not set - extraction unavailable".to_string())
        })?;

        let markup = truncate_chars(markup, truncate_limit);

        let request = ExtractionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(instructions),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: markup.to_string(),
                },
            ],
            temperature: EXTRACTION_TEMPERATURE,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: ListingResponse::response_format_name(),
                    strict: true,
                    schema: ListingResponse::strict_schema(),
                },
            },
        };

        debug!(
            "Calling OpenAI: model={}, markup_len={}",
            self.model,
            markup.len()
        );

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("OpenAI API error {}: {}", status, text);
            return Err(ExtractionError::Api(format!("{}: {}", status, text)));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractionError::Api("no completion choices returned".to_string()))?;

        let listings: ListingResponse = serde_json::from_str(&content).map_err(|e| {
            ExtractionError::Parse(format!("completion is not valid listing JSON: {}", e))
        })?;

        debug!("Extraction returned {} listings", listings.listings.len());

        Ok(listings)
    }
}

#[async_trait]
impl ListingExtractor for OpenAiClient {
    async fn extract(
        &self,
        markup: &str,
        instructions: &str,
        truncate_limit: usize,
    ) -> Result<ListingResponse, ExtractionError> {
        self.extract_listings(markup, instructions, truncate_limit)
            .await
    }
}

fn system_prompt(instructions: &str) -> String {
    format!(
        "You are an expert web scraping agent. Your task is to extract specific information \
         from the provided HTML and return it as JSON. Follow these instructions carefully: {}\n\n\
         Output ONLY valid JSON that matches the specified model structure. \
         Do not include markdown or extra text.",
        instructions
    )
}

/// Truncate to at most `limit` characters. Counted in characters rather than
/// bytes so multibyte markup never splits mid-character.
fn truncate_chars(markup: &str, limit: usize) -> &str {
    match markup.char_indices().nth(limit) {
        Some((idx, _)) => &markup[..idx],
        None => markup,
    }
}
