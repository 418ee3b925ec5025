//! `optrade` binary: paper trading session and journal inspection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::info;
use tracing_subscriber::EnvFilter;

use optrade_broker::{BrokerGateway, PaperBroker};
use optrade_core::{ConfigLoader, EngineEvents, MarketSnapshot, StrikeSelection};
use optrade_engine::{
    RecoveryProcedure, RiskLimits, ShortStrangleConfig, StrategyConfig, StrategyRegistry,
};
use optrade_executor::JournaledExecutor;
use optrade_store::Store;

#[derive(Parser)]
#[command(name = "optrade", about = "Multi-leg options strategy execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a paper trading session with a demo strangle
    Run {
        #[arg(long, default_value = "config/Config.toml")]
        config: String,
    },
    /// List execution journal entries needing operator attention
    Journal {
        #[arg(long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Journal { config } => journal(&config).await,
    }
}

async fn run(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    if config.broker.mode != "paper" {
        bail!("only the paper broker is wired up; got mode {:?}", config.broker.mode);
    }

    let store = Store::connect(&config.database.url, config.database.max_connections).await?;
    let broker: Arc<dyn BrokerGateway> = Arc::new(PaperBroker::new());
    let events = EngineEvents::default();
    let executor = Arc::new(JournaledExecutor::new(
        store.journal(),
        Arc::clone(&broker),
        events.clone(),
    ));
    let registry = Arc::new(StrategyRegistry::new(
        executor,
        store.clone(),
        events.clone(),
        config.engine.clone(),
    ));

    let recovery = RecoveryProcedure::new(
        store.clone(),
        Arc::clone(&registry),
        Arc::clone(&broker),
        events.clone(),
    );
    let report = recovery.run().await;
    if !report.recovery_groups.is_empty() {
        info!(
            groups = report.recovery_groups.len(),
            "Journal groups need review; run `optrade journal`"
        );
    }

    if registry.ids().await.is_empty() {
        let expiry = (Utc::now() + chrono::Duration::days(28)).date_naive();
        registry
            .deploy(
                "strangle-demo",
                StrategyConfig::ShortStrangle(ShortStrangleConfig {
                    underlying: "NIFTY".to_string(),
                    expiry,
                    quantity: 50,
                    call_strike: StrikeSelection::OffsetFromSpot(Decimal::from(500)),
                    put_strike: StrikeSelection::OffsetFromSpot(Decimal::from(-500)),
                    strike_step: Decimal::from(50),
                    entry_spot_floor: None,
                    entry_spot_cap: None,
                    roll_delta_trigger: Some(0.3),
                    roll_step: Decimal::from(200),
                    risk: RiskLimits {
                        pnl_target: Some(Decimal::from(50_000)),
                        pnl_stop: Some(Decimal::from(-25_000)),
                        auto_pause_pnl_floor: Some(Decimal::from(-15_000)),
                        ..RiskLimits::default()
                    },
                }),
                true,
            )
            .await?;
    }

    // Synthetic tick loop; a market data feed would replace this.
    let mut interval =
        tokio::time::interval(Duration::from_secs(config.engine.min_eval_interval_secs.max(1)));
    let mut tick: u64 = 0;
    let base = Decimal::from(21_000);
    info!("Paper session running; Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = interval.tick() => {
                tick += 1;
                let wobble = Decimal::from_f64(((tick as f64) * 0.7).sin() * 40.0)
                    .unwrap_or(Decimal::ZERO);
                let snapshot = MarketSnapshot::new("NIFTY", base + wobble, Utc::now());
                registry.on_tick(&snapshot).await;
            }
        }
    }

    for (id, result) in registry.pause_all().await {
        match result {
            Ok(()) => info!(strategy_id = id, "Paused for shutdown"),
            Err(e) => info!(strategy_id = id, error = %e, "Pause failed during shutdown"),
        }
    }
    Ok(())
}

async fn journal(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let store = Store::connect(&config.database.url, config.database.max_connections).await?;

    let rows = store.journal().unresolved().await?;
    if rows.is_empty() {
        println!("No journal entries need attention.");
        return Ok(());
    }

    println!("{} journal row(s) need operator attention:\n", rows.len());
    for row in rows {
        println!(
            "{}  {}  {}  leg {}/{}  {} {} x{}  {}{}",
            row.created_at.format("%Y-%m-%d %H:%M:%S"),
            row.group_id,
            row.strategy_id,
            row.leg_index + 1,
            row.total_legs,
            row.side,
            row.instrument,
            row.quantity,
            row.status,
            row.failure_reason
                .map(|r| format!("  ({r})"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}
