//! MCP Tool Registry
//!
//! Defines and executes the tools exposed over MCP. There is one tool:
//! `scrape_listings`, which runs the scrape-reduce-extract pipeline for a
//! search query and returns the structured listings as JSON text.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::browser::ScraperSession;
use crate::config::Config;
use crate::openai::OpenAiClient;
use crate::pipeline::Pipeline;

/// Tool definition for MCP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Tool registry
pub struct ToolRegistry {
    config: Arc<Config>,
    extractor: OpenAiClient,
}

impl ToolRegistry {
    /// Create new tool registry
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let extractor = OpenAiClient::from_config(&config)?;
        Ok(Self { config, extractor })
    }

    /// List all tool definitions
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "scrape_listings".to_string(),
            description: "Scrape rental apartment listings for a search query from the \
                          configured listings portal and return structured records"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "City or search term, interpolated into the listings URL path"
                    },
                    "instructions": {
                        "type": "string",
                        "description": "Natural-language extraction instructions forwarded to the model"
                    }
                },
                "required": ["query", "instructions"]
            }),
        }]
    }

    /// Call a tool by name
    pub async fn call(&self, name: &str, args: serde_json::Value) -> Result<String> {
        info!("Tool call: {} with args: {}", name, args);
        let start = std::time::Instant::now();

        let result = match name {
            "scrape_listings" => {
                let query = args["query"].as_str().unwrap_or("");
                let instructions = args["instructions"].as_str().unwrap_or("");

                // Fresh browser session per invocation so concurrent calls
                // never share Chromium state.
                let session = ScraperSession::from_config(&self.config);
                let mut pipeline = Pipeline::new(session, self.extractor.clone(), &self.config);
                let listings = pipeline.run_or_empty(query, instructions).await;

                Ok(serde_json::to_string(&listings)?)
            }

            _ => anyhow::bail!("Unknown tool: {}", name),
        };

        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(100) {
            info!("Tool {} completed in {}ms", name, elapsed.as_millis());
        }

        result
    }
}
