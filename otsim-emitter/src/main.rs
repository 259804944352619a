//! Synthetic OT telemetry emitter.
//!
//! Runs generation passes over the selected transports, either on a fixed
//! interval (headless) or on demand from the HTTP control surface.

use anyhow::{Context, Result};
use clap::Parser;
use otsim_common::LoggingConfig;
use otsim_emitter::http::ControlServer;
use otsim_emitter::{Dispatcher, EmitterConfig, PacingPolicy, TransportKind, Transports};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

/// Synthetic OT telemetry emitter (MQTT, Modbus TCP, CoAP).
#[derive(Parser, Debug)]
#[command(name = "otsim-emitter")]
#[command(about = "Emits synthetic OT telemetry over MQTT, Modbus TCP and CoAP")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "otsim.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Select the MQTT transport
    #[arg(long)]
    mqtt: bool,

    /// Select the Modbus TCP transport
    #[arg(long)]
    modbus: bool,

    /// Select the CoAP transport
    #[arg(long)]
    coap: bool,

    /// Milliseconds between passes in headless mode
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Stop after this many passes (headless mode)
    #[arg(long)]
    passes: Option<u64>,

    /// Serve the HTTP control surface instead of running headless
    #[arg(long)]
    serve: bool,
}

impl Args {
    fn selected(&self) -> Vec<TransportKind> {
        [
            (self.mqtt, TransportKind::Mqtt),
            (self.modbus, TransportKind::Modbus),
            (self.coap, TransportKind::Coap),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = EmitterConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    otsim_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting otsim-emitter");
    info!("Loaded configuration from {:?}", args.config);

    let config = Arc::new(config);
    let selected = args.selected();
    let dispatcher = Dispatcher::new(
        Transports::production(),
        PacingPolicy::standard(),
        SmallRng::from_os_rng(),
    );

    if args.serve {
        serve(dispatcher, config, selected).await
    } else {
        headless(dispatcher, &config, &selected, &args).await
    }
}

async fn serve(
    dispatcher: Dispatcher<SmallRng>,
    config: Arc<EmitterConfig>,
    selected: Vec<TransportKind>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = ControlServer::new(Arc::new(Mutex::new(dispatcher)), config, selected);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    server_task
        .await
        .context("Control surface task panicked")??;

    info!("otsim-emitter stopped");
    Ok(())
}

async fn headless(
    mut dispatcher: Dispatcher<SmallRng>,
    config: &EmitterConfig,
    selected: &[TransportKind],
    args: &Args,
) -> Result<()> {
    if selected.is_empty() {
        warn!("No transports selected; pass --mqtt, --modbus or --coap");
    }

    let names: Vec<&str> = selected.iter().map(TransportKind::as_str).collect();
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut completed = 0u64;

    loop {
        if args.passes.is_some_and(|limit| completed >= limit) {
            break;
        }

        tokio::select! {
            _ = interval.tick() => {
                let report = dispatcher.run_pass(config, &names).await;
                for line in report.to_string().lines() {
                    info!("{}", line);
                }
                completed += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!(passes = completed, "otsim-emitter stopped");
    Ok(())
}
