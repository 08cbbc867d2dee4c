use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use beamline_config::BeamlineConfig;
use beamline_runtime::lifecycle::wait_for_signal;
use beamline_runtime::tracing_init::init_tracing;
use beamline_runtime::Reactor;

#[derive(Parser)]
#[command(name = "beamline-automator", about = "Beamline HPLC/X-ray Automator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Automator from a config file.
    Run {
        /// Path to beamline.toml.
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config_path = config.canonicalize().map_err(|e| anyhow::anyhow!("config path '{}': {e}", config.display()))?;
            let beamline_config = BeamlineConfig::load(&config_path)?;
            let base_dir = config_path.parent().expect("config path must have a parent directory");

            let _guard = init_tracing(&beamline_config.logging, base_dir)?;

            let reactor = Reactor::start(&beamline_config).await?;
            tracing::info!(instruments = beamline_config.instruments.len(), "automator running");

            wait_for_signal(reactor.cancel_token()).await;
            reactor.shutdown();
            reactor.wait().await?;
        }
    }

    Ok(())
}
