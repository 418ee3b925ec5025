//! Startup recovery: rebuild engine state from the store and the
//! broker before any tick is routed.
//!
//! Every step catches and logs its own failure and moves on; recovery
//! always reaches the end and the engine starts with whatever could be
//! restored. Journal rows found REQUIRES_RECOVERY are surfaced for the
//! operator, never resolved automatically.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use optrade_broker::BrokerGateway;
use optrade_core::{
    DecisionCategory, DecisionRecord, EngineEvents, Position, PositionNotice, StrategyStatus,
};
use optrade_store::Store;

use crate::config::StrategyConfig;
use crate::registry::StrategyRegistry;

#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub strategies_restored: usize,
    pub strategies_failed: usize,
    /// Journal groups relabeled REQUIRES_RECOVERY this run.
    pub recovery_groups: Vec<String>,
    pub position_discrepancies: usize,
}

pub struct RecoveryProcedure {
    store: Store,
    registry: Arc<StrategyRegistry>,
    broker: Arc<dyn BrokerGateway>,
    events: EngineEvents,
}

impl RecoveryProcedure {
    pub fn new(
        store: Store,
        registry: Arc<StrategyRegistry>,
        broker: Arc<dyn BrokerGateway>,
        events: EngineEvents,
    ) -> Self {
        Self { store, registry, broker, events }
    }

    /// Runs the full procedure. Infallible by construction; partial
    /// restoration is reported, not raised.
    pub async fn run(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        self.restore_strategies(&mut report).await;

        match self.store.journal().relabel_in_progress().await {
            Ok(groups) => {
                for group_id in &groups {
                    warn!(group_id, "Execution group interrupted by shutdown; needs operator review");
                }
                report.recovery_groups = groups;
            }
            Err(e) => error!(error = %e, "Journal recovery scan failed"),
        }

        self.registry.rebuild_position_index().await;

        match self.reconcile_positions().await {
            Ok(count) => report.position_discrepancies = count,
            Err(e) => error!(error = %e, "Position reconciliation failed"),
        }

        match self.store.pnl().load_day(Utc::now().date_naive()).await {
            Ok(Some(pnl)) => info!(realized_pnl = %pnl, "Daily P&L restored"),
            Ok(None) => info!("No P&L recorded for today"),
            Err(e) => error!(error = %e, "Daily P&L restore failed"),
        }

        info!(
            restored = report.strategies_restored,
            failed = report.strategies_failed,
            recovery_groups = report.recovery_groups.len(),
            discrepancies = report.position_discrepancies,
            "Recovery complete"
        );
        self.events.decision(
            DecisionRecord::new("engine", DecisionCategory::Recovery, "recovery complete")
                .with_context(json!({
                    "strategies_restored": report.strategies_restored,
                    "strategies_failed": report.strategies_failed,
                    "recovery_groups": report.recovery_groups,
                    "position_discrepancies": report.position_discrepancies,
                })),
        );
        report
    }

    /// Re-registers every open strategy at its persisted status. A
    /// strategy that fails to decode is logged and skipped, never a
    /// reason to abort the other restorations.
    async fn restore_strategies(&self, report: &mut RecoveryReport) {
        let records = match self.store.strategies().load_open().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to load open strategies");
                return;
            }
        };

        for record in records {
            let restored = self.restore_one(&record.id, &record.config_json, &record.status).await;
            match restored {
                Ok(_) => report.strategies_restored += 1,
                Err(e) => {
                    error!(strategy_id = record.id, error = %e, "Strategy restore failed");
                    report.strategies_failed += 1;
                }
            }
        }
    }

    async fn restore_one(
        &self,
        id: &str,
        config_json: &str,
        status: &str,
    ) -> Result<StrategyStatus> {
        let config: StrategyConfig =
            serde_json::from_str(config_json).context("decoding strategy config")?;
        let status: StrategyStatus =
            serde_json::from_value(serde_json::Value::String(status.to_string()))
                .context("decoding strategy status")?;
        self.registry.restore(id, config, status).await?;
        Ok(status)
    }

    /// Compares each strategy's cached positions against the broker's
    /// net book and surfaces every mismatch as a `PositionNotice`.
    async fn reconcile_positions(&self) -> Result<usize> {
        let book = self.broker.positions().await.context("fetching broker positions")?;
        let broker_net: HashMap<&str, &Position> = book
            .net
            .iter()
            .map(|p| (p.position_id.as_str(), p))
            .collect();

        let mut discrepancies = 0;
        for id in self.registry.ids().await {
            let Some(handle) = self.registry.handle(&id).await else {
                continue;
            };
            let state = handle.state_snapshot().await;
            for cached in &state.positions {
                match broker_net.get(cached.position_id.as_str()) {
                    None => {
                        discrepancies += 1;
                        self.discrepancy(&cached.position_id, "cached position missing at broker");
                    }
                    Some(live) if live.quantity != cached.quantity => {
                        discrepancies += 1;
                        self.discrepancy(
                            &cached.position_id,
                            &format!(
                                "quantity mismatch: cached {} broker {}",
                                cached.quantity, live.quantity
                            ),
                        );
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(discrepancies)
    }

    fn discrepancy(&self, position_id: &str, detail: &str) {
        warn!(position_id, detail, "Position discrepancy");
        self.events.position_notice(PositionNotice::Discrepancy {
            position_id: position_id.to_string(),
            detail: detail.to_string(),
        });
    }
}
