//! Swope weather monitor
//!
//! Polls the LCO environment API and prints the current conditions.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use swope_instruments::logging::init_logging;
use swope_instruments::{HttpWeatherApi, SwopeConfig, SwopeWeatherStation};
use tokio::sync::oneshot;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "swope-weather")]
#[command(about = "Swope weather and seeing monitor")]
#[command(version)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Keep refreshing on the configured control period until Ctrl-C
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level).map_err(|e| anyhow::anyhow!(e))?;
    info!("swope-weather v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => SwopeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SwopeConfig::default(),
    };

    let api = HttpWeatherApi::new(&config.weather).context("building HTTP client")?;
    let mut station = SwopeWeatherStation::new(Arc::new(api), &config.weather);

    if args.watch {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(());
            }
        });
        station
            .run_control_loop(config.weather.control_period(), rx)
            .await;
    } else {
        station.control().await;
        let summary = station.summary().await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}
