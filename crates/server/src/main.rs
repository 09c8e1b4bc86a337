//! courtfetch server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use courtfetch_client::{BrowserDriver, FixtureOptions, FixturePortal, Orchestrator, PortalProbe};
use courtfetch_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache at {}", config.db_path.display()))?
        .with_ttl(config.cache_ttl(), config.pending_ttl());

    let driver = build_driver(&config)?;
    tracing::info!(driver = driver.name(), demo = config.demo_mode, "Starting courtfetch server on stdio transport");

    let orchestrator = Arc::new(Orchestrator::new(&config, driver, db.clone())?);
    let sweeper = orchestrator.spawn_sweeper(config.sweep_interval());
    let probe = PortalProbe::from_config(&config)?;

    let handler = handler::CourtServer::new(handler::AppState { orchestrator, db, probe, config });
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    sweeper.abort();

    Ok(())
}

fn build_driver(config: &AppConfig) -> Result<Arc<dyn BrowserDriver>> {
    if config.demo_mode {
        let options = FixtureOptions { captcha: config.demo_captcha.clone(), ..Default::default() };
        return Ok(Arc::new(FixturePortal::new(options)));
    }
    chrome_driver(config)
}

#[cfg(feature = "render")]
fn chrome_driver(config: &AppConfig) -> Result<Arc<dyn BrowserDriver>> {
    use courtfetch_client::{ChromeConfig, ChromeDriver};
    Ok(Arc::new(ChromeDriver::new(ChromeConfig::from(config))))
}

#[cfg(not(feature = "render"))]
fn chrome_driver(_config: &AppConfig) -> Result<Arc<dyn BrowserDriver>> {
    anyhow::bail!("built without the `render` feature; set COURTFETCH_DEMO_MODE=true to use the demo portal")
}
