//! cdcx-arb - CoinDCX cross-market arbitrage engine.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cdcx_bot::{AppConfig, Application};
use cdcx_executor::SystemClock;

/// CoinDCX cross-market arbitrage engine
#[derive(Parser, Debug)]
#[command(name = "cdcx-arb", version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via CDCX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover markets and save candidate groups
    Pairs,
    /// Detect top-of-book opportunities in the saved groups
    Detect,
    /// Analyze order-book depth of the saved viable opportunities
    Depth,
    /// Execute the saved opportunities once
    Execute,
    /// Detect and execute continuously until Ctrl-C
    Live {
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    cdcx_telemetry::init_logging()?;
    info!("Starting cdcx-arb v{}", env!("CARGO_PKG_VERSION"));

    let config_path = AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");
    let mut config = AppConfig::load(&config_path)?;
    if let Command::Live {
        max_cycles: Some(max),
    } = args.command
    {
        config.live.max_cycles = Some(max);
    }

    let app = Application::new(config)?;

    let latch = app.latch().clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => latch.trigger("ctrl-c"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    match args.command {
        Command::Pairs => {
            let groups = app.pairs().await?;
            info!(groups = groups.len(), "Pairs saved");
        }
        Command::Detect => {
            app.detect().await?;
        }
        Command::Depth => {
            let analyses = app.depth().await?;
            info!(analyses = analyses.len(), "Depth analysis saved");
        }
        Command::Execute => {
            let client = app.trading_client()?;
            app.execute(client, Arc::new(SystemClock)).await?;
        }
        Command::Live { .. } => {
            let client = app.trading_client()?;
            app.live(client, Arc::new(SystemClock)).await?;
        }
    }

    Ok(())
}
