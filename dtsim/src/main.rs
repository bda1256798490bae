//! # dtsim — Digital-Twin Simulation Engine CLI
//!
//! Drives a single machine-model simulation end to end: loads a snapshot
//! from a TOML fixture, starts it via [`SimulationManager`], polls status
//! on an interval, and stops it gracefully on Ctrl+C (or when the
//! simulation's own step loop exits).
//!
//! This binary is the standalone demonstration harness for the lifecycle
//! API (§6); the HTTP collaborator this engine is normally paired with
//! drives the same `start`/`status`/`stop` calls over a network instead.
//!
//! # Usage
//!
//! ```bash
//! # Run model 1 in pure mode, using TOML fixtures under ./models
//! dtsim run --models-dir ./models --model-id 1
//!
//! # Hardware-in-the-loop, with a custom status-print interval
//! dtsim run --models-dir ./models --model-id 1 --mode hil --status-interval-secs 5
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dtsim_common::prelude::{ConfigLoader, EngineConfig};
use dtsim_engine::prelude::*;
use dtsim_model::loader::FileSnapshotLoader;
use dtsim_model::types::SimulationMode;
use tracing::{error, info, warn};

/// Digital-twin simulation engine
#[derive(Parser, Debug)]
#[command(name = "dtsim")]
#[command(author = "Digital Twin Engineering")]
#[command(version)]
#[command(about = "Runs a machine-model simulation from TOML fixtures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a simulation and run it until it stops or Ctrl+C is received.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Directory containing `<model_id>.toml` machine-model fixtures.
    #[arg(long, default_value = "./models")]
    models_dir: PathBuf,

    /// Optional `dtsim.toml` engine configuration file; falls back to
    /// defaults (1s tick, 500ms OPC UA publish interval, 10s timeout) if
    /// absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Machine model id to simulate.
    #[arg(long)]
    model_id: u64,

    /// Execution mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Pure)]
    mode: ModeArg,

    /// How often to print a status line while the simulation runs.
    #[arg(long, default_value_t = 1)]
    status_interval_secs: u64,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum ModeArg {
    Pure,
    Hil,
}

impl From<ModeArg> for SimulationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Pure => SimulationMode::Pure,
            ModeArg::Hil => SimulationMode::Hil,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

fn setup_tracing(log_level: dtsim_common::prelude::LogLevel) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.as_filter_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    setup_tracing(config.log_level);

    let loader = Arc::new(FileSnapshotLoader::new(args.models_dir.clone()));
    let manager = Arc::new(SimulationManager::new(loader, config));

    let mode = SimulationMode::from(args.mode);
    info!(model_id = args.model_id, ?mode, "starting simulation");
    let id = manager.start(args.model_id, mode).await?;

    let status_interval = std::time::Duration::from_secs(args.status_interval_secs.max(1));
    let poller = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(status_interval);
            loop {
                ticker.tick().await;
                match manager.status(id).await {
                    Some(status) if status.status.is_terminal() => {
                        info!(simulation_id = id, status = ?status.status, "simulation reached a terminal state");
                        break;
                    }
                    Some(status) => {
                        info!(
                            simulation_id = id,
                            status = ?status.status,
                            elapsed_secs = status.start_time_elapsed_secs,
                            components = status.component_states.len(),
                            "status"
                        );
                    }
                    None => {
                        warn!(simulation_id = id, "simulation disappeared from the registry");
                        break;
                    }
                }
            }
        })
    };

    tokio::select! {
        _ = poller => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "failed to install Ctrl+C handler");
            }
            info!(simulation_id = id, "received shutdown signal, stopping simulation");
            manager.stop(id).await?;
        }
    }

    // Give the step loop a moment to observe `Stopping` and run cleanup,
    // then report the final state.
    loop {
        match manager.status(id).await {
            Some(status) if status.status.is_terminal() => {
                info!(simulation_id = id, status = ?status.status, error = ?status.error, "simulation finished");
                break;
            }
            Some(_) => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
            None => break,
        }
    }

    Ok(())
}
