//! delegated — TCP delegate daemon.
//!
//! ```text
//! delegated [PORT] [--bind ADDR] [--config FILE] [--secret SECRET] [--log-level LEVEL]
//! ```
//!
//! Settings are layered: built-in defaults, then the JSON config file,
//! then command-line flags. The secret may also come from
//! `DELEGATE_SECRET`. Ctrl-C stops accepting and waits for open
//! connections to finish.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use delegate::{DelegateConfig, DelegateServer};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "delegated")]
#[command(about = "TCP delegate with shared-secret handshake and resumable sessions", long_about = None)]
struct Args {
    /// Port to listen on (all interfaces). Overrides --bind's port.
    port: Option<u16>,

    /// Full listen address, e.g. 127.0.0.1:13370.
    #[arg(short, long)]
    bind: Option<String>,

    /// JSON config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shared secret clients must present.
    #[arg(short, long, env = "DELEGATE_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<DelegateConfig> {
    let mut config = match &args.config {
        Some(path) => read_config_file(path)?,
        None => DelegateConfig::default(),
    };

    if let Some(bind) = &args.bind {
        config.bind_addr = bind.clone();
    }
    if let Some(port) = args.port {
        config.bind_addr = match args.bind.as_deref() {
            Some(bind) => with_port(bind, port),
            None => format!("0.0.0.0:{port}"),
        };
    }
    if let Some(secret) = &args.secret {
        config.secret = secret.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<DelegateConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Replaces the port in `host:port`, keeping the host.
fn with_port(bind: &str, port: u16) -> String {
    match bind.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind}:{port}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = load_config(&args)?;
    tracing::info!(
        bind = %config.bind_addr,
        max_auth_attempts = config.max_auth_attempts,
        table_width = config.registry.table_width,
        "delegated starting"
    );

    let server = DelegateServer::builder()
        .config(config)
        .build()
        .await
        .context("failed to start server")?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        })
        .await?;

    Ok(())
}
