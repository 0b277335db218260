//! Scrapebot MCP Server
//!
//! All-Rust Model Context Protocol server exposing a real-estate listing
//! scraper as an MCP tool.
//!
//! # Features
//!
//! - **MCP Protocol**: JSON-RPC 2.0 over SSE (HTTP) or stdio
//! - **Headless Browsing**: Chromium via CDP for JavaScript-rendered pages
//! - **Markup Reduction**: CSS-selector slicing down to the listings container
//! - **LLM Extraction**: OpenAI structured outputs with a strict JSON schema
//! - **Typed Results**: Listings as plain serde structs, every field nullable
//!
//! # Architecture
//!
//! ```text
//! MCP Client ──► MCP Protocol ──► Scrapebot ──► fincaraiz.com.co
//!                 (SSE/stdio)        │
//!                                    ├── Session (Chromium + CDP)
//!                                    ├── Reduce (scraper / CSS select)
//!                                    ├── Extract (OpenAI structured output)
//!                                    └── Tools (scrape_listings)
//! ```

pub mod browser;
pub mod config;
pub mod listings;
pub mod mcp;
pub mod openai;
pub mod pipeline;
pub mod reduce;
pub mod schema;
pub mod sse;
pub mod tools;

#[cfg(test)]
mod pipeline_tests;

pub use browser::{ScraperSession, SessionError};
pub use config::Config;
pub use listings::{ListingItem, ListingResponse};
pub use mcp::{McpRequest, McpResponse, McpServer};
pub use openai::{ExtractionError, OpenAiClient};
pub use pipeline::{ListingExtractor, MarkupSource, Pipeline, PipelineError};
pub use reduce::reduce_markup;
pub use schema::ExtractionSchema;
pub use sse::SseServer;
pub use tools::{ToolDefinition, ToolRegistry};
