use anyhow::{Context, Result};
use clap::Parser;
use mmbot::api::DexScreenerClient;
use mmbot::config::{AppConfig, StrategyKind, DEFAULT_CONFIG_PATH};
use mmbot::engine::{EngineState, TracingSink};
use mmbot::venue::PaperVenue;
use mmbot::Supervisor;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Strategy engines for one bonding-curve token")]
struct Cli {
    /// Path to the TOML settings file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Token mint to trade (overrides config/env)
    #[arg(long)]
    mint: Option<String>,

    /// Run only this strategy kind (its configured entries, or its defaults)
    #[arg(long)]
    strategy: Option<String>,

    /// Seconds between status summaries
    #[arg(long, default_value_t = 60)]
    status_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let only = cli
        .strategy
        .as_deref()
        .map(str::parse::<StrategyKind>)
        .transpose()?;

    let mut overrides = Vec::new();
    if let Some(mint) = &cli.mint {
        overrides.push(("mint", mint.clone()));
    }

    let config = AppConfig::load_with(&cli.config, &overrides, only)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    setup_logging(&config.log_filter);
    tracing::info!("🚀 mmbot starting");

    // Market data and (simulated) execution
    let oracle = Arc::new(match &config.dexscreener_url {
        Some(url) => DexScreenerClient::with_base_url(url.clone()),
        None => DexScreenerClient::new(),
    });
    let venue = Arc::new(PaperVenue::new(oracle.clone(), &config.paper));

    let mut supervisor = Supervisor::new(
        venue.clone(),
        oracle,
        config.feed.clone(),
        config.router.clone(),
        Arc::new(TracingSink),
    );

    tracing::info!("📊 Configuration:");
    tracing::info!("  Mint: {}", config.mint);
    tracing::info!("  Paper balance: {} SOL", config.paper.initial_sol);
    tracing::info!("  Gas reserve: {} SOL", config.router.gas_reserve_sol);
    for strategy in &config.strategies {
        let engine = strategy.engine();
        tracing::info!(
            "    - {} (every {} ms, trade {:.0}%, cap {:.0}%)",
            strategy.kind(),
            engine.check_interval_ms,
            engine.trade_fraction * 100.0,
            engine.max_position_fraction * 100.0
        );
    }

    supervisor.launch_all(&config)?;
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let mut summary = interval(Duration::from_secs(cli.status_interval_secs.max(1)));
    summary.set_missed_tick_behavior(MissedTickBehavior::Delay);
    summary.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            _ = summary.tick() => {
                if !log_statuses(&supervisor) {
                    tracing::warn!("All engines have stopped, shutting down");
                    break;
                }
            }
        }
    }

    let reports = supervisor.shutdown().await;
    for report in &reports {
        report
            .stats
            .print_report(&format!("{} on {}", report.strategy, report.mint.short()));
        if let Some(reason) = &report.halt_reason {
            println!("  Halted:                {}", reason);
        }
    }
    println!("\nPaper fills: {}", venue.trade_count());

    tracing::info!("👋 mmbot stopped");
    Ok(())
}

fn setup_logging(log_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Log one line per engine; false once none is running
fn log_statuses(supervisor: &Supervisor) -> bool {
    let statuses = supervisor.statuses();
    for status in &statuses {
        tracing::info!(
            engine = %status.id,
            strategy = status.strategy,
            state = %status.state,
            paused = status.paused,
            tick = status.tick,
            price = ?status.last_price,
            trades = status.stats.total_trades(),
            profit_pct = status.stats.total_profit_pct,
            holding = status.position.is_some(),
            "Engine status"
        );
    }
    statuses.iter().any(|s| s.state != EngineState::Stopped)
}
