//! TriggerDetector - Main Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trigger_detector::common::channels::create_shutdown_channel;
use trigger_detector::config::load_config;
use trigger_detector::DetectorService;

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level or filter directive; overrides the configured level
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(filter).context("invalid log filter")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(Some(&args.config)).context("failed to load configuration")?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_tracing(&level, args.json_logs)?;

    info!("Starting TriggerDetector");
    info!("Configuration file: {}", args.config);

    let service = DetectorService::from_config(&config)
        .await
        .context("failed to build detector")?;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let mut service_task = tokio::spawn(service.run(shutdown_rx));

    let finished_early = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
        result = &mut service_task => Some(result),
    };

    match finished_early {
        Some(result) => result??,
        None => {
            info!("Received shutdown signal, cleaning up...");
            shutdown_tx.send_replace(true);
            service_task.await??;
        }
    }

    info!("Shutdown complete");
    Ok(())
}
