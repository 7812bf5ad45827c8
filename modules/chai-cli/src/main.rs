use std::sync::Arc;

use anyhow::{Context, Result};
use chai_adapters::{Adapter, CratesAdapter, HomebrewAdapter};
use chai_common::Config;
use chai_dedupe::Deduplicator;
use chai_fetch::Fetcher;
use chai_pipeline::Pipeline;
use chai_scheduler::PipelineScheduler;
use chai_store::Store;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chai", about = "Package ecosystem ingestion and deduplication")]
struct Cli {
    /// Fetch fresh snapshots instead of reusing the last one on disk.
    #[arg(long, env = "FETCH", default_value_t = true)]
    fetch: bool,
    /// Delete fetched artifacts after a successful ingest.
    #[arg(long, env = "NO_CACHE", default_value_t = false)]
    no_cache: bool,
    /// Substitute fixture inputs and skip fetching.
    #[arg(long, env = "TEST", default_value_t = false)]
    test: bool,
    /// Scheduling interval, in hours.
    #[arg(long, env = "FREQUENCY", default_value_t = 24)]
    frequency: u64,
    /// Loop on `frequency` instead of running once and exiting.
    #[arg(long, env = "ENABLE_SCHEDULER", default_value_t = true)]
    enable_scheduler: bool,
    /// Raise the tracing filter from info to debug.
    #[arg(long, env = "DEBUG", default_value_t = false)]
    debug: bool,
    /// Write the deduplicator's computed delta instead of only logging it.
    #[arg(long, env = "LOAD", default_value_t = false)]
    load: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, parse, diff, and ingest one or more package manager pipelines.
    Run {
        #[arg(long, value_enum, default_value = "all")]
        pipeline: PipelineArg,
    },
    /// Recompute canonical-homepage package groupings.
    Dedupe,
    /// Apply pending database migrations and exit.
    Migrate,
}

#[derive(Clone, Copy, ValueEnum)]
enum PipelineArg {
    Crates,
    Homebrew,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    config.fetch = cli.fetch;
    config.no_cache = cli.no_cache;
    config.test = cli.test;
    config.frequency_hours = cli.frequency;
    config.enable_scheduler = cli.enable_scheduler;
    config.debug = cli.debug;
    config.load = cli.load;

    let filter = if config.debug { "chai=debug" } else { "chai=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
    config.log_redacted();

    let store = Store::connect(&config.database_url).await.context("connecting to database")?;
    store.migrate().await.context("running migrations")?;

    match cli.command {
        Commands::Migrate => {
            tracing::info!("Migrations applied");
        }
        Commands::Dedupe => {
            let dedupe = Deduplicator::new(&store);
            let stats = dedupe.run(config.load).await.context("running deduplication pass")?;
            tracing::info!(
                new_canons = stats.new_canons,
                reassigned_packages = stats.reassigned_packages,
                unchanged_packages = stats.unchanged_packages,
                "Dedupe complete"
            );
        }
        Commands::Run { pipeline } => run_pipelines(pipeline, config, store).await?,
    }

    Ok(())
}

async fn run_pipelines(pipeline: PipelineArg, config: Config, store: Store) -> Result<()> {
    let adapters = select_adapters(pipeline);
    let fetcher = Fetcher::new(config.data_root.clone());
    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt, shutting down");
            ctrl_c_cancel.cancel();
        }
    });

    if !config.enable_scheduler {
        for adapter in adapters {
            let name = adapter.name().to_string();
            let pipeline = Pipeline::new(adapter, store.clone(), fetcher.clone(), config.clone());
            match pipeline.run(&cancel).await {
                Ok(report) => tracing::info!(pipeline = %name, state = ?report.state, "Pipeline run complete"),
                Err(e) => tracing::error!(pipeline = %name, error = %e, "Pipeline run failed"),
            }
        }
        return Ok(());
    }

    let schedulers = adapters
        .into_iter()
        .map(|adapter| {
            let pipeline = Pipeline::new(adapter, store.clone(), fetcher.clone(), config.clone());
            PipelineScheduler::new(pipeline, config.frequency_hours)
        })
        .collect();

    chai_scheduler::run_all(schedulers, cancel).await;
    Ok(())
}

fn select_adapters(pipeline: PipelineArg) -> Vec<Arc<dyn Adapter>> {
    match pipeline {
        PipelineArg::Crates => vec![Arc::new(CratesAdapter) as Arc<dyn Adapter>],
        PipelineArg::Homebrew => vec![Arc::new(HomebrewAdapter) as Arc<dyn Adapter>],
        PipelineArg::All => vec![
            Arc::new(CratesAdapter) as Arc<dyn Adapter>,
            Arc::new(HomebrewAdapter) as Arc<dyn Adapter>,
        ],
    }
}
