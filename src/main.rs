use anyhow::{Context, bail};
use api_client::{BitgetClient, Gateway};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use configuration::{Config, init_tracing, load_config};
use core_types::{CommandKind, RunMode};
use database::{DbRepository, MemoryStore, RunStore, connect, run_migrations};
use engine::{RunController, RunScheduler};
use executor::{LegExecutor, LiveExecutor, SimulatedExecutor};
use std::sync::Arc;
use std::time::Duration;
use strategies::{DecisionEngine, DecisionParams};

/// The main entry point for the short-basket trading application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    let config = load_config().context("Failed to load configuration")?;
    let _log_guard = init_tracing(cli.command.service_name()).context("Failed to initialise logging")?;

    // Execute the appropriate command
    match cli.command {
        Commands::Scheduler => handle_scheduler(&config).await,
        Commands::Trade(args) => handle_trade(&config, args).await,
        Commands::Plan(args) => handle_plan(&config, args).await,
        Commands::Command(args) => handle_command(args).await,
        Commands::Set(args) => handle_set(args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Shorts a daily basket of crypto perpetuals, in paper or live mode.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the day's runs and relay operator commands to active runs.
    Scheduler,
    /// Run the controller for one mode until interrupted.
    Trade(TradeArgs),
    /// Print the leg plan the decision engine would open right now.
    Plan(PlanArgs),
    /// Queue an operator command (pause, resume, close_all, set_tp, ...).
    Command(CommandArgs),
    /// Store a runtime override, picked up by the controller on its next tick.
    Set(SetArgs),
}

impl Commands {
    fn service_name(&self) -> &'static str {
        match self {
            Commands::Scheduler => "scheduler",
            Commands::Trade(args) => match args.mode {
                ModeArg::Paper => "paper",
                ModeArg::Live => "live",
            },
            Commands::Plan(_) => "plan",
            Commands::Command(_) => "command",
            Commands::Set(_) => "set",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Paper,
    Live,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Paper => RunMode::Paper,
            ModeArg::Live => RunMode::Live,
        }
    }
}

#[derive(Parser)]
struct TradeArgs {
    #[arg(long, value_enum)]
    mode: ModeArg,

    /// Keep all state in memory instead of PostgreSQL. Paper mode only.
    #[arg(long)]
    memory_store: bool,
}

#[derive(Parser)]
struct PlanArgs {
    /// Whose settings (and overrides from config.toml) to plan with.
    #[arg(long, value_enum, default_value = "paper")]
    mode: ModeArg,
}

#[derive(Parser)]
struct CommandArgs {
    /// pause, resume, close_all, set_tp, set_sl, leg_tp, leg_sl, leg_tp_clear, leg_sl_clear
    kind: String,

    /// Free-form argument recorded with the command.
    #[arg(long)]
    payload: Option<String>,
}

#[derive(Parser)]
struct SetArgs {
    #[arg(long, value_enum)]
    mode: ModeArg,

    /// Setting name, e.g. leverage, num_legs, hold_hours, initial_balance.
    key: String,

    value: String,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn repository() -> anyhow::Result<DbRepository> {
    let pool = connect().await.context("Failed to connect to the database")?;
    run_migrations(&pool).await.context("Failed to run database migrations")?;
    Ok(DbRepository::new(pool))
}

async fn database_store() -> anyhow::Result<Arc<dyn RunStore>> {
    Ok(Arc::new(repository().await?))
}

fn gateway(config: &Config) -> anyhow::Result<Arc<dyn Gateway>> {
    let timeout = Duration::from_secs(config.global.gateway_timeout_secs);
    Ok(Arc::new(BitgetClient::new(&config.api, timeout)?))
}

async fn handle_scheduler(config: &Config) -> anyhow::Result<()> {
    let store = database_store().await?;
    let modes = RunMode::ALL
        .iter()
        .map(|mode| config.runtime(*mode))
        .collect::<Result<Vec<_>, _>>()?;
    let interval = Duration::from_secs(config.global.scheduler_interval_secs);

    RunScheduler::new(store, modes, interval).run().await;
    Ok(())
}

async fn handle_trade(config: &Config, args: TradeArgs) -> anyhow::Result<()> {
    let mode = RunMode::from(args.mode);
    let settings = config.runtime(mode)?;
    if !settings.enabled {
        tracing::warn!(%mode, "Mode status is off: unfinished runs are still managed, no new run will open.");
    }

    let gateway = gateway(config)?;
    let executor: Arc<dyn LegExecutor> = match mode {
        RunMode::Paper => Arc::new(SimulatedExecutor::new()),
        RunMode::Live => {
            let missing = config.api.missing_credentials();
            if !missing.is_empty() {
                bail!("live trading needs exchange credentials; missing: {}", missing.join(", "));
            }
            Arc::new(LiveExecutor::new(gateway.clone()))
        }
    };

    let store: Arc<dyn RunStore> = match (args.memory_store, mode) {
        (true, RunMode::Paper) => {
            tracing::warn!("Using the in-memory store: nothing survives a restart.");
            Arc::new(MemoryStore::new())
        }
        (true, RunMode::Live) => bail!("live trading requires the database store"),
        (false, _) => database_store().await?,
    };

    RunController::new(settings, gateway, executor, store)?.run().await;
    Ok(())
}

async fn handle_plan(config: &Config, args: PlanArgs) -> anyhow::Result<()> {
    let settings = config.runtime(args.mode.into())?;
    let engine = DecisionEngine::new(DecisionParams::from(&settings))?;
    let gateway = gateway(config)?;

    let tickers = gateway.get_tickers().await?;
    let candidates = engine.candidate_symbols(&tickers);
    let specs = gateway.get_contract_specs(&candidates).await?;
    let plan = engine.build_leg_plan(&tickers, &specs)?;

    println!(
        "{} tickers, {} candidates (max pump {}), {} legs:",
        tickers.len(),
        candidates.len(),
        settings.max_pump_pct,
        plan.len()
    );
    println!("{:<16} {:>10} {:>14} {:>14} {:>10}", "symbol", "24h", "price", "size", "margin");
    for leg in &plan {
        println!(
            "{:<16} {:>10} {:>14} {:>14} {:>10}",
            leg.symbol,
            leg.change_24h.round_dp(4),
            leg.reference_price,
            leg.size,
            leg.margin_usdt
        );
    }
    Ok(())
}

async fn handle_command(args: CommandArgs) -> anyhow::Result<()> {
    let kind: CommandKind = args.kind.parse()?;
    let store = database_store().await?;
    let id = store.enqueue_command(kind, args.payload, Utc::now()).await?;
    println!("Queued {} as command {}.", kind, id);
    Ok(())
}

async fn handle_set(args: SetArgs) -> anyhow::Result<()> {
    let mode = RunMode::from(args.mode);
    let repo = repository().await?;
    repo.set_runtime_override(mode, &args.key, &args.value).await?;
    tracing::info!(%mode, key = %args.key, value = %args.value, "Runtime override stored.");
    println!("{} {} = {}", mode, args.key, args.value);
    Ok(())
}
