use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use folio_core::{ConfigLoader, ConfigWatcher, Timeframe};
use folio_orchestrator::{
    ExecutionWrapper, Orchestrator, OrchestratorConfig, PaperExecutionHandler, TickScheduler,
};
use folio_positions::repositories::{
    connect_and_migrate, PgAuditSink, PgMarketDataProvider, PgPhaseProvider, PgPositionStore,
};
use folio_positions::{Position, PositionStore};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Position lifecycle decision engine", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled timeframe jobs until stopped
    Run,
    /// Run one manual tick for a timeframe
    Tick {
        /// Timeframe (1h, 4h, 1d)
        #[arg(long)]
        timeframe: String,
        /// Force dry-run regardless of config
        #[arg(long)]
        dry_run: bool,
    },
    /// Create positions for an approved instrument, one per timeframe
    AddPosition {
        /// Instrument symbol (e.g. "SOL")
        #[arg(long)]
        instrument: String,
        /// Venue/chain the instrument trades on
        #[arg(long)]
        venue: Option<String>,
        /// Total approved allocation, split across timeframes
        #[arg(long)]
        total_allocation: String,
    },
    /// List positions for a timeframe
    Positions {
        /// Timeframe (1h, 4h, 1d)
        #[arg(long)]
        timeframe: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run => run(&cli.config).await,
        Commands::Tick { timeframe, dry_run } => tick(&cli.config, &timeframe, dry_run).await,
        Commands::AddPosition {
            instrument,
            venue,
            total_allocation,
        } => add_position(&cli.config, &instrument, venue, &total_allocation).await,
        Commands::Positions { timeframe } => list_positions(&cli.config, &timeframe).await,
    }
}

async fn build_orchestrator(config_path: &str, dry_run_override: Option<bool>) -> Result<Orchestrator> {
    let config = ConfigLoader::load_from(config_path)?;
    let pool = connect_and_migrate(&config.database).await?;

    let store = Arc::new(PgPositionStore::new(pool.clone()));
    let market = Arc::new(PgMarketDataProvider::new(pool.clone()));
    let phase = Arc::new(PgPhaseProvider::new(pool.clone()));
    let audit = Arc::new(PgAuditSink::new(pool));
    // Live routing plugs in as ExecutionWrapper::Live at deployment time.
    let executor = Arc::new(ExecutionWrapper::Paper(PaperExecutionHandler::new()));

    Ok(Orchestrator::new(
        store,
        market,
        phase,
        executor,
        audit,
        OrchestratorConfig {
            engine: config.engine.clone(),
            sizing: config.sizing.clone(),
            dry_run: dry_run_override.unwrap_or(config.execution.dry_run),
        },
    ))
}

async fn run(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let orchestrator = Arc::new(build_orchestrator(config_path, None).await?);

    let (watcher, config_rx) = ConfigWatcher::new(config);
    let watch_path = config_path.to_string();
    tokio::spawn(async move {
        if let Err(e) = watcher.watch(&watch_path).await {
            error!("Config watcher stopped: {e:#}");
        }
    });

    TickScheduler::new(orchestrator, config_rx).start().await
}

async fn tick(config_path: &str, timeframe: &str, dry_run: bool) -> Result<()> {
    let timeframe =
        Timeframe::parse(timeframe).ok_or_else(|| anyhow!("unknown timeframe {timeframe}"))?;
    let orchestrator =
        build_orchestrator(config_path, dry_run.then_some(true)).await?;

    let summary = orchestrator.tick(timeframe).await?;
    info!(
        evaluated = summary.evaluated,
        executed = summary.executed,
        held = summary.held,
        skipped = summary.skipped_duplicate,
        failed = summary.failed,
        bootstrapped = summary.bootstrapped,
        "Manual tick complete"
    );
    Ok(())
}

async fn add_position(
    config_path: &str,
    instrument: &str,
    venue: Option<String>,
    total_allocation: &str,
) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let pool = connect_and_migrate(&config.database).await?;
    let store = PgPositionStore::new(pool);

    let total = Decimal::from_str(total_allocation)?;
    if total <= Decimal::ZERO {
        return Err(anyhow!("total allocation must be positive"));
    }
    let venue = venue.unwrap_or_else(|| config.execution.venue.clone());

    for timeframe in Timeframe::all() {
        let split = Decimal::try_from(timeframe.allocation_split())?;
        let cap = (total * split).round_dp(2);
        let position = Position::new(instrument, venue.clone(), timeframe, cap);
        store.upsert(position).await?;
        info!(instrument, %timeframe, %cap, "Created position");
    }
    Ok(())
}

async fn list_positions(config_path: &str, timeframe: &str) -> Result<()> {
    let timeframe =
        Timeframe::parse(timeframe).ok_or_else(|| anyhow!("unknown timeframe {timeframe}"))?;
    let config = ConfigLoader::load_from(config_path)?;
    let pool = connect_and_migrate(&config.database).await?;
    let store = PgPositionStore::new(pool);

    let mut positions = store.bootstrap_positions(timeframe).await?;
    positions.extend(store.eligible_positions(timeframe).await?);

    for p in positions {
        println!(
            "{:<12} {:<8} {:<10} qty={} invested={} extracted={} bars={}",
            p.instrument,
            p.timeframe,
            p.status.as_str(),
            p.holdings.quantity,
            p.holdings.invested,
            p.holdings.extracted,
            p.bars_count,
        );
    }
    Ok(())
}
