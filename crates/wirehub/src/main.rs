//! # wirehub
//!
//! wirehub server binary: loads configuration, installs logging and metrics,
//! registers the built-in handlers and serves until Ctrl-C.

#![deny(unsafe_code)]

mod auth;
mod handlers;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use wirehub_logging::{LogFormat, LoggingConfig};
use wirehub_server::{ServerConfig, WireHubServer};

use crate::auth::TokenInterceptor;

/// wirehub WebSocket messaging server.
#[derive(Parser, Debug)]
#[command(name = "wirehub", about = "wirehub WebSocket messaging server")]
struct Cli {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides configuration).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides configuration).
    #[arg(long)]
    port: Option<u16>,

    /// Upgrade path (overrides configuration).
    #[arg(long)]
    path: Option<String>,

    /// Default log level; `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log output format: json, pretty or compact.
    #[arg(long, default_value = "json")]
    log_format: LogFormat,

    /// Record Prometheus metrics and serve them at `/metrics`.
    #[arg(long)]
    metrics: bool,

    /// Require this token on every handshake.
    #[arg(long)]
    auth_token: Option<String>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ServerConfig) {
        if let Some(ref host) = self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref path) = self.path {
            config.path.clone_from(path);
            config.path = config.upgrade_path();
        }
    }

    fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level,
            format: self.log_format,
            ..LoggingConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    wirehub_logging::init_subscriber(&cli.logging()).context("Failed to initialize logging")?;

    let mut config = ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    let table = handlers::dispatch_table();
    info!(msg_types = ?table.msg_types(), "handlers registered");
    let mut server = WireHubServer::new(config, table);

    if cli.metrics {
        let handle = wirehub_server::metrics::install_recorder()
            .context("Failed to install metrics recorder")?;
        server = server.with_metrics(handle);
    }
    if let Some(token) = cli.auth_token.clone() {
        server = server.with_interceptor(TokenInterceptor::new(token));
        info!("token authentication enabled");
    }

    let (addr, serve) = server.listen().await.context("Failed to start server")?;
    info!(%addr, path = %server.config().upgrade_path(), "wirehub ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    if !server.shutdown().await {
        warn!("shutdown timed out with connections still open");
    }
    serve.await.context("Server task failed")?;
    info!("wirehub stopped");
    Ok(())
}
