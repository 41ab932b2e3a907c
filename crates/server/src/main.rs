//! spool server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use spool_core::config::AppConfig;
use spool_server::{build_state, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// spool - resumable chunked upload server
#[derive(Parser, Debug)]
#[command(name = "spoold")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SPOOL_CONFIG", default_value = "config/server.toml")]
    config: String,
}

/// Merge the optional TOML file with `SPOOL_`-prefixed environment
/// variables. Every field has a default, so neither source is required.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "no config file found, using defaults and environment");
    }

    figment
        .merge(Env::prefixed("SPOOL_").split("__").ignore(&["config"]))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("spool v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    if config.server.metrics_enabled {
        spool_server::metrics::register_metrics();
        tracing::info!("Prometheus metrics registered");
    }

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = build_state(config).await?;
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolve on Ctrl-C so in-flight requests can finish.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
