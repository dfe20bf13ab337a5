use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pool_keeper::keeper::checkpoint::CheckpointStore;
use pool_keeper::keeper::providers::{NullSubmitter, ParityQuoter, ReplayLogSource};
use pool_keeper::{open_replicator, Keeper, KeeperConfig, KeeperError};

#[derive(Parser)]
#[command(name = "keeper", about = "Lending-protocol rebalance and liquidation keeper")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "KEEPER_CONFIG", default_value = "keeper.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync the ledger and run the action loop.
    Run {
        /// Replay a captured JSONL event log instead of a live source;
        /// syncs to the end of the file and exits.
        #[arg(long)]
        replay: Option<PathBuf>,
    },
    /// Write a filled-in sample configuration.
    GenerateConfig {
        #[arg(long, default_value = "keeper.toml")]
        output: PathBuf,
    },
    /// Parse and validate the configuration, then exit.
    ValidateConfig,
    /// Print a summary of the persisted checkpoint.
    ShowState,
}

fn init_logging(config: &KeeperConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn generate_config(output: &PathBuf) -> Result<(), KeeperError> {
    if output.exists() {
        return Err(KeeperError::Config(format!(
            "{} already exists, refusing to overwrite",
            output.display()
        )));
    }
    let sample = KeeperConfig::sample().to_toml()?;
    std::fs::write(output, sample)
        .map_err(|e| KeeperError::Config(format!("write {}: {e}", output.display())))?;
    println!("wrote {}", output.display());
    Ok(())
}

fn show_state(config: &KeeperConfig) -> Result<(), KeeperError> {
    let store = CheckpointStore::new(&config.store_dir);
    let Some(ledger) = store.load()? else {
        println!("no checkpoint at {}", store.path().display());
        return Ok(());
    };
    println!("checkpoint   {}", store.path().display());
    println!("synced to    block {}", ledger.last_sync_at);
    println!("manager      {}", ledger.manager.address);
    println!("rate tokens  {}", ledger.manager.rate_providers.len());
    for (address, pool) in &ledger.pools {
        let occupied = pool.ticks.iter_nonzero().count();
        println!(
            "pool {address}: {} positions, {occupied} occupied ticks, debt index {}, coll index {}",
            pool.positions.len() - 1,
            pool.debt_index,
            pool.coll_index,
        );
    }
    Ok(())
}

async fn run(mut config: KeeperConfig, replay: Option<PathBuf>) -> Result<(), KeeperError> {
    match replay {
        Some(path) => {
            // Replay files are finalized history; no reorg holdback.
            config.reorg_lag = 0;
            let replicator = open_replicator(&config)?;
            let source = ReplayLogSource::from_path(&path)?;
            info!(events = source.len(), path = %path.display(), "Replaying event log");
            let mut keeper = Keeper::new(
                config.clone(),
                replicator,
                Box::new(source),
                Box::new(NoReader),
                Box::new(ParityQuoter),
                Box::new(NullSubmitter),
            );
            let head = keeper.sync_once().await?;
            info!(head = head, "Replay complete");
            show_state(&config)
        }
        None => Err(KeeperError::Config(
            "no live log source is wired in this build; run with --replay, \
             or embed the crate and supply LogSource/AggregateReader/Submitter implementations"
                .into(),
        )),
    }
}

/// Placeholder reader for replay runs, which never reach the cycle phase.
struct NoReader;

#[async_trait::async_trait]
impl pool_keeper::keeper::providers::AggregateReader for NoReader {
    async fn read(
        &self,
        _calls: &[pool_keeper::keeper::readings::ReadCall],
    ) -> Result<Vec<alloy::primitives::U256>, pool_keeper::CycleError> {
        Err(pool_keeper::CycleError::Read(
            "no aggregate reader configured".into(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), KeeperError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Command::GenerateConfig { output } = &cli.command {
        return generate_config(output);
    }

    let config = KeeperConfig::load(&cli.config)?;
    init_logging(&config);

    match cli.command {
        Command::GenerateConfig { .. } => unreachable!(),
        Command::ValidateConfig => {
            println!("{} is valid", cli.config.display());
            Ok(())
        }
        Command::ShowState => show_state(&config),
        Command::Run { replay } => run(config, replay).await,
    }
}
