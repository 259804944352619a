//! Raw TCP echo responder for exercising Modbus TCP clients.

use anyhow::{Context, Result};
use clap::Parser;
use otsim_common::LoggingConfig;
use otsim_modbus_echo::EchoServer;
use tracing::info;

/// Echoes every received byte back to the sender.
#[derive(Parser, Debug)]
#[command(name = "otsim-modbus-echo")]
#[command(about = "Raw TCP echo responder for Modbus TCP clients")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:502")]
    bind: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = LoggingConfig {
        level: args.log_level.clone(),
        ..Default::default()
    };
    otsim_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    let server = EchoServer::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.bind))?;

    tokio::select! {
        result = server.run() => result.context("Echo server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
    }

    Ok(())
}
