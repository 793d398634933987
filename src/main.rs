//! # pulse
//!
//! Server-Sent Events broadcast server binary. Loads configuration, installs
//! logging and metrics, then serves until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_server::{PulseServer, ServerConfig};

/// SSE broadcast server.
#[derive(Parser, Debug)]
#[command(name = "pulse", about = "Server-Sent Events broadcast server")]
struct Cli {
    /// JSON config file; values override the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config and `PULSE_HOST`).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides config and `PULSE_PORT`).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn resolve_config(&self) -> Result<ServerConfig> {
        let mut config = pulse_server::load_config(self.config.as_deref())
            .context("failed to load configuration")?;
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    pulse_telemetry::init_logging(&config.logging).context("failed to initialize logging")?;
    let metrics = pulse_telemetry::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        mailbox_capacity = config.mailbox_capacity,
        heartbeat_interval_secs = config.heartbeat_interval_secs,
        slow_client_drop_limit = ?config.slow_client_drop_limit,
        "starting pulse server"
    );

    let shutdown_timeout = config.shutdown_timeout();
    let server = PulseServer::new(config).with_metrics(metrics);
    let (addr, listener) = server
        .listen()
        .await
        .context("failed to start server")?;
    let heartbeat = server.spawn_heartbeat();

    tracing::info!(%addr, "pulse server ready");

    pulse_server::shutdown::wait_for_signal().await;

    tracing::info!("shutting down");
    let clean = server
        .shutdown()
        .graceful_shutdown(vec![listener, heartbeat], shutdown_timeout)
        .await;
    if !clean {
        tracing::warn!("forced shutdown after timeout");
    }
    tracing::info!("pulse server stopped");
    Ok(())
}
