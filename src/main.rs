//! Scrapebot MCP Server - Entry Point
//!
//! Modes:
//! - Default: MCP server over SSE (HTTP)
//! - --stdio / -s: MCP server over stdio

use scrapebot_mcp::{Config, McpServer, SseServer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let stdio_mode = args.iter().any(|a| a == "--stdio" || a == "-s");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("Scrapebot MCP Server v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: scrapebot-mcp [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --stdio, -s  Run as MCP server over stdio");
        println!("  --help, -h   Show this help");
        println!();
        println!("Default: Run as MCP server over SSE (HTTP)");
        println!();
        println!("Environment variables:");
        println!("  OPENAI_API_KEY                Key for the extraction model");
        println!("  SCRAPEBOT_MODEL               Extraction model name");
        println!("  SCRAPEBOT_LISTINGS_URL        Listings base URL");
        println!("  SCRAPEBOT_SSE_HOST            SSE bind host (default: 127.0.0.1)");
        println!("  SCRAPEBOT_SSE_PORT            SSE bind port (default: 8000)");
        println!("  CHROME_PATH                   Chrome executable (auto-detect if unset)");
        println!("  BROWSER_HEADLESS              Set to 'false' for a visible browser");
        return Ok(());
    }

    // Setup logging based on mode
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if stdio_mode {
        // stdio mode - stdout carries the protocol, log to stderr as JSON
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // SSE mode - log to stdout with colors
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;

    if stdio_mode {
        info!("Scrapebot MCP Server v{} (stdio)", env!("CARGO_PKG_VERSION"));

        let server = McpServer::new(config)?;
        server.run_stdio().await?;
    } else {
        info!("Scrapebot MCP Server v{} (SSE)", env!("CARGO_PKG_VERSION"));

        let server = McpServer::new(config.clone())?;
        SseServer::new(&config, server).run().await?;
    }

    Ok(())
}
