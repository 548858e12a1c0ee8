//! Streamgate Server
//!
//! Run with: cargo run -- --config config.toml
//!
//! Configuration is read from `--config`, or the first of
//! `<config_dir>/streamgate/config.toml`, `/etc/streamgate/config.toml` and
//! `./config.toml`. `STREAMGATE_*` environment variables override it and
//! `RUST_LOG` overrides the log level.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use streamgate::api::{serve, AppState};
use streamgate::auth::TokenTable;
use streamgate::config::{generate_default_config, Config, LoggingConfig};
use streamgate::streaming::MemoryHub;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "streamgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Authenticated websocket streaming of live timeline events")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.port {
        config.api.port = port;
    }
    config.validate()?;

    init_tracing(&config.logging);

    tracing::info!("Starting Streamgate v{}", env!("CARGO_PKG_VERSION"));

    let tokens = TokenTable::from_entries(&config.auth.tokens);
    if tokens.is_empty() {
        tracing::warn!("No access tokens configured; every stream request will be rejected");
    } else {
        tracing::info!("Loaded {} access tokens", tokens.len());
    }

    let streaming = &config.streaming;
    tracing::info!(
        keepalive_secs = streaming.keepalive_interval_secs,
        queue_capacity = streaming.queue_capacity,
        overflow_policy = ?streaming.overflow_policy,
        max_sessions = streaming.max_sessions,
        "Streaming configured"
    );

    let hub = Arc::new(MemoryHub::new(streaming.hub_config()));
    let state = AppState::new(
        Arc::new(tokens),
        hub,
        streaming.keepalive_interval(),
        streaming.max_sessions,
    );

    serve(state, &config.api).await?;

    tracing::info!("Streamgate stopped");
    Ok(())
}

/// Install the global tracing subscriber
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("streamgate={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
