//! fxshim Binary
//!
//! Reads tool calls from stdin, one JSON object per line, and answers each on
//! stdout. Logs go to stderr.

use std::sync::Arc;

use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxshim_fx::FxConfig;
use fxshim_tools::{default_registry, serve};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("pretty") => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting fxshim");

    let config = match FxConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(anyhow::anyhow!("Configuration error: {}", e));
        }
    };

    info!(
        pair = %config.pair,
        cache_ttl_minutes = config.cache_ttl.num_minutes(),
        fallback_rate = %config.fallback_rate,
        "Configuration loaded"
    );

    let service = Arc::new(config.build_service()?);
    let registry = Arc::new(default_registry(service));

    info!(
        tools = ?registry.names(),
        resources = registry.list_resources().len(),
        prompts = registry.list_prompts().len(),
        "Tool registry ready"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = serve(registry, stdin, stdout) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    info!("fxshim shutdown complete");
    Ok(())
}
