//! cheche - league training for chess and checkers.
//!
//! Plays self-play generations with the Champion/Alpha/Beta/Wildcard
//! league until the requested number of generations is done or Ctrl-C is
//! pressed. An interrupt lets the current generation finish first.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use rust_cheche::core::{tracing_diagnostics, LeagueConfig};
use rust_cheche::league::LeagueManager;
use rust_cheche::nn::{GameNet, InferenceBackend, NetworkConfig};

#[derive(Debug, Parser)]
#[command(name = "cheche", version, about = "Self-play league training for chess and checkers")]
struct Cli {
    /// Configuration preset
    #[arg(long, default_value = "default", value_parser = clap::builder::PossibleValuesParser::new(LeagueConfig::PRESETS))]
    config: String,

    /// JSON configuration file; overrides the preset
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Generations to train
    #[arg(long, default_value_t = 100)]
    generations: u64,

    /// Resume from the checkpoint of this generation
    #[arg(long)]
    load_checkpoint: Option<u64>,

    /// Fewer simulations and training steps
    #[arg(long)]
    fast: bool,

    /// Compute device (only cpu is available)
    #[arg(long)]
    device: Option<String>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Print build and network information and exit
    #[arg(long)]
    info: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<LeagueConfig> {
    let mut config = match &cli.config_file {
        Some(path) => LeagueConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LeagueConfig::preset(&cli.config)?,
    };
    if cli.fast {
        config = config.fast();
    }
    if let Some(device) = &cli.device {
        config.device = device.clone();
    }
    config.validate()?;
    Ok(config)
}

fn show_info() {
    let network = NetworkConfig::default();
    let device = Default::default();
    let parameters = GameNet::<InferenceBackend>::new(&network, &device).parameter_count();
    println!("cheche {}", env!("CARGO_PKG_VERSION"));
    println!("backend: ndarray (cpu)");
    println!(
        "network: {} channels, {} residual blocks, {} parameters",
        network.channels, network.residual_blocks, parameters
    );
    println!("presets: {}", LeagueConfig::PRESETS.join(", "));
}

/// Sets `flag` on Ctrl-C. Runs on its own thread so the league loop can
/// stay synchronous.
fn watch_interrupt(flag: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    thread::spawn(move || {
        runtime.block_on(async {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, stopping after this generation");
                    flag.store(true, Ordering::SeqCst);
                }
                Err(err) => warn!(%err, "cannot listen for ctrl-c"),
            }
        });
    });
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if cli.info {
        show_info();
        return Ok(());
    }

    let config = load_config(&cli)?;
    if let Some(path) = &cli.save_config {
        config
            .to_json_file(path)
            .with_context(|| format!("saving {}", path.display()))?;
        info!(path = %path.display(), "configuration saved");
        return Ok(());
    }

    info!(
        preset = %cli.config,
        generations = cli.generations,
        simulations = config.mcts_simulations,
        batch_size = config.batch_size,
        device = %config.device,
        checkpoint_dir = %config.checkpoint_dir.display(),
        "starting league"
    );

    let mut league = LeagueManager::new(config, tracing_diagnostics())?;
    if let Some(generation) = cli.load_checkpoint {
        league
            .load_checkpoint(generation)
            .with_context(|| format!("loading checkpoint for generation {generation}"))?;
    }
    watch_interrupt(league.cancel_handle())?;

    let reports = league.run(cli.generations);
    let summary = league.training_summary();
    info!(
        generations_run = reports.len(),
        generation = summary.generation,
        champion_changes = summary.champion_changes,
        defense_rate = summary.champion_defense_rate,
        buffer_utilization = summary.buffer_utilization,
        matches = summary.matches_played,
        "training finished"
    );
    for agent in &summary.agents {
        let wins: u32 = agent.stats.values().map(|s| s.wins).sum();
        let games: u32 = agent.stats.values().map(|s| s.games_played).sum();
        info!(agent = %agent.name, wins, games, "agent summary");
    }
    Ok(())
}
