//! Registry of deployed strategies plus the tick and position routers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use optrade_core::{EngineDefaults, EngineEvents, MarketSnapshot, Position, StrategyStatus};
use optrade_executor::JournaledExecutor;
use optrade_store::{Store, StrategyRecord};

use crate::config::StrategyConfig;
use crate::handle::StrategyHandle;
use crate::strategies::build_logic;

pub struct StrategyRegistry {
    handles: RwLock<HashMap<String, StrategyHandle>>,
    /// position_id -> owning strategy ids. Derived cache, rebuilt from
    /// strategy state; never a source of truth.
    position_index: RwLock<HashMap<String, HashSet<String>>>,
    executor: Arc<JournaledExecutor>,
    store: Store,
    events: EngineEvents,
    defaults: EngineDefaults,
}

impl StrategyRegistry {
    pub fn new(
        executor: Arc<JournaledExecutor>,
        store: Store,
        events: EngineEvents,
        defaults: EngineDefaults,
    ) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            position_index: RwLock::new(HashMap::new()),
            executor,
            store,
            events,
            defaults,
        }
    }

    /// Deploys a new strategy under `id`, persisting its config.
    ///
    /// # Errors
    ///
    /// Returns an error on id collision, persistence failure, or (with
    /// `auto_arm`) an illegal arm transition.
    pub async fn deploy(
        &self,
        id: &str,
        config: StrategyConfig,
        auto_arm: bool,
    ) -> Result<StrategyHandle> {
        let handle = {
            let mut handles = self.handles.write().await;
            if handles.contains_key(id) {
                bail!("strategy {id} already deployed");
            }
            self.store
                .strategies()
                .upsert(&StrategyRecord {
                    id: id.to_string(),
                    strategy_type: config.strategy_type().to_string(),
                    status: StrategyStatus::Created.as_str().to_string(),
                    config_json: serde_json::to_string(&config)
                        .context("encoding strategy config")?,
                    created_at: Utc::now(),
                    closed_at: None,
                })
                .await?;

            let logic = build_logic(&config, &self.defaults);
            let handle = StrategyHandle::new(
                id,
                &config,
                logic,
                Arc::clone(&self.executor),
                self.store.clone(),
                self.events.clone(),
                self.defaults.clone(),
            );
            handles.insert(id.to_string(), handle.clone());
            handle
        };

        info!(strategy_id = id, strategy_type = config.strategy_type(), "Strategy deployed");
        if auto_arm {
            handle.arm().await?;
        }
        Ok(handle)
    }

    /// Re-registers a persisted strategy at its recorded status without
    /// re-running any entry logic. Recovery path.
    pub async fn restore(
        &self,
        id: &str,
        config: StrategyConfig,
        status: StrategyStatus,
    ) -> Result<StrategyHandle> {
        let mut handles = self.handles.write().await;
        if handles.contains_key(id) {
            bail!("strategy {id} already registered");
        }
        let logic = build_logic(&config, &self.defaults);
        let handle = StrategyHandle::with_status(
            id,
            &config,
            status,
            logic,
            Arc::clone(&self.executor),
            self.store.clone(),
            self.events.clone(),
            self.defaults.clone(),
        );
        handles.insert(id.to_string(), handle.clone());
        info!(strategy_id = id, status = %status, "Strategy restored");
        Ok(handle)
    }

    /// Removes a strategy and its position index entries. The handle
    /// stays valid for anyone still holding a clone.
    pub async fn undeploy(&self, id: &str) -> Result<()> {
        let removed = self.handles.write().await.remove(id);
        if removed.is_none() {
            bail!("strategy {id} not deployed");
        }
        let mut index = self.position_index.write().await;
        index.retain(|_, owners| {
            owners.remove(id);
            !owners.is_empty()
        });
        info!(strategy_id = id, "Strategy undeployed");
        Ok(())
    }

    pub async fn handle(&self, id: &str) -> Option<StrategyHandle> {
        self.handles.read().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.handles.read().await.keys().cloned().collect()
    }

    /// Best-effort pause of every ARMED/ACTIVE strategy; one failure
    /// never stops the sweep.
    pub async fn pause_all(&self) -> Vec<(String, Result<()>)> {
        let handles: Vec<StrategyHandle> =
            self.handles.read().await.values().cloned().collect();

        let mut results = Vec::new();
        for handle in handles {
            if !handle.status().await.is_evaluable() {
                continue;
            }
            let result = handle.pause().await;
            if let Err(e) = &result {
                error!(strategy_id = handle.id(), error = %e, "Pause failed");
            }
            results.push((handle.id().to_string(), result));
        }
        results
    }

    /// Routes one market snapshot: spawns an evaluation task per
    /// ARMED/ACTIVE strategy on the snapshot's underlying and waits for
    /// the cycle to finish. A write-locked strategy misses the tick.
    pub async fn on_tick(&self, snapshot: &MarketSnapshot) {
        let targets: Vec<StrategyHandle> = {
            let handles = self.handles.read().await;
            handles
                .values()
                .filter(|h| {
                    h.try_status().is_some_and(StrategyStatus::is_evaluable)
                })
                .cloned()
                .collect()
        };

        let mut set = JoinSet::new();
        for handle in targets {
            let state = handle.clone();
            let snapshot = snapshot.clone();
            set.spawn(async move {
                if state.underlying().await == snapshot.underlying {
                    state.evaluate(&snapshot).await;
                }
            });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Evaluation task panicked");
            }
        }
        debug!(underlying = snapshot.underlying, "Tick cycle complete");
    }

    /// Routes a broker position update to its owning strategies via the
    /// position index.
    pub async fn on_position_update(&self, position: Position) {
        let owners: HashSet<String> = self
            .position_index
            .read()
            .await
            .get(&position.position_id)
            .cloned()
            .unwrap_or_default();

        if owners.is_empty() {
            debug!(position_id = position.position_id, "Position has no registered owner");
            return;
        }
        let handles = self.handles.read().await;
        for owner in owners {
            if let Some(handle) = handles.get(&owner) {
                handle.update_position(position.clone()).await;
            } else {
                warn!(
                    position_id = position.position_id,
                    strategy_id = owner,
                    "Index references an undeployed strategy"
                );
            }
        }
    }

    /// Rebuilds the position index from live strategy state.
    pub async fn rebuild_position_index(&self) {
        let handles: Vec<StrategyHandle> =
            self.handles.read().await.values().cloned().collect();

        let mut index: HashMap<String, HashSet<String>> = HashMap::new();
        for handle in handles {
            let state = handle.state_snapshot().await;
            for position in &state.positions {
                index
                    .entry(position.position_id.clone())
                    .or_default()
                    .insert(state.id.clone());
            }
            for leg in &state.legs {
                if let Some(position_id) = &leg.position_id {
                    index
                        .entry(position_id.clone())
                        .or_default()
                        .insert(state.id.clone());
                }
            }
        }

        let entries = index.len();
        *self.position_index.write().await = index;
        debug!(entries, "Position index rebuilt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optrade_broker::PaperBroker;
    use optrade_core::{OptionInstrument, OptionRight, StrikeSelection};
    use optrade_store::Store;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::config::{RiskLimits, ShortStrangleConfig};

    fn strangle(underlying: &str) -> StrategyConfig {
        StrategyConfig::ShortStrangle(ShortStrangleConfig {
            underlying: underlying.to_string(),
            expiry: NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
            quantity: 50,
            call_strike: StrikeSelection::OffsetFromSpot(dec!(500)),
            put_strike: StrikeSelection::OffsetFromSpot(dec!(-500)),
            strike_step: dec!(50),
            entry_spot_floor: None,
            entry_spot_cap: None,
            roll_delta_trigger: None,
            roll_step: dec!(200),
            risk: RiskLimits::default(),
        })
    }

    async fn rig() -> (Arc<StrategyRegistry>, Store, Arc<PaperBroker>) {
        let store = Store::connect_in_memory().await.unwrap();
        let events = EngineEvents::new(64);
        let broker = Arc::new(PaperBroker::new());
        let executor = Arc::new(JournaledExecutor::new(
            store.journal(),
            broker.clone(),
            events.clone(),
        ));
        let registry = Arc::new(StrategyRegistry::new(
            executor,
            store.clone(),
            events,
            EngineDefaults::default(),
        ));
        (registry, store, broker)
    }

    fn snapshot(underlying: &str, spot: Decimal) -> MarketSnapshot {
        MarketSnapshot::new(underlying, spot, Utc::now())
    }

    #[tokio::test]
    async fn deploy_rejects_duplicate_ids() {
        let (registry, _store, _broker) = rig().await;
        registry.deploy("s1", strangle("NIFTY"), false).await.unwrap();
        assert!(registry.deploy("s1", strangle("NIFTY"), false).await.is_err());
    }

    #[tokio::test]
    async fn deploy_persists_the_config() {
        let (registry, store, _broker) = rig().await;
        registry.deploy("s1", strangle("NIFTY"), false).await.unwrap();

        let open = store.strategies().load_open().await.unwrap();
        assert_eq!(open.len(), 1);
        let decoded: StrategyConfig = serde_json::from_str(&open[0].config_json).unwrap();
        assert_eq!(decoded.strategy_type(), "short_strangle");
    }

    #[tokio::test]
    async fn tick_reaches_only_armed_strategies_on_the_underlying() {
        let (registry, store, broker) = rig().await;
        registry.deploy("armed", strangle("NIFTY"), true).await.unwrap();
        registry.deploy("idle", strangle("NIFTY"), false).await.unwrap();
        registry.deploy("other", strangle("BANKNIFTY"), true).await.unwrap();

        registry.on_tick(&snapshot("NIFTY", dec!(21000))).await;

        let armed = registry.handle("armed").await.unwrap();
        assert_eq!(armed.status().await, StrategyStatus::Active);
        let idle = registry.handle("idle").await.unwrap();
        assert_eq!(idle.status().await, StrategyStatus::Created);
        let other = registry.handle("other").await.unwrap();
        assert_eq!(other.status().await, StrategyStatus::Armed);

        // Only the armed NIFTY strategy traded.
        assert_eq!(broker.accepted_orders().await.len(), 2);
        assert!(store.journal().strategy_rows("idle").await.unwrap().is_empty());
        assert!(store.journal().strategy_rows("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn position_updates_route_through_the_rebuilt_index() {
        let (registry, _store, _broker) = rig().await;
        registry.deploy("s1", strangle("NIFTY"), true).await.unwrap();
        registry.on_tick(&snapshot("NIFTY", dec!(21000))).await;
        registry.rebuild_position_index().await;

        let update = Position {
            position_id: "NIFTY 21500C 2026-09-24".to_string(),
            instrument: OptionInstrument::new(
                "NIFTY",
                NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
                dec!(21500),
                OptionRight::Call,
            ),
            quantity: dec!(-50),
            avg_price: dec!(160),
            realized_pnl: dec!(0),
            unrealized_pnl: dec!(-500),
            greeks: None,
            updated_at: Utc::now(),
            strategy_id: Some("s1".to_string()),
        };
        registry.on_position_update(update).await;

        let state = registry.handle("s1").await.unwrap().state_snapshot().await;
        assert_eq!(state.positions.len(), 1);
        assert_eq!(state.positions[0].unrealized_pnl, dec!(-500));
    }

    #[tokio::test]
    async fn pause_all_sweeps_evaluable_strategies_only() {
        let (registry, _store, _broker) = rig().await;
        registry.deploy("armed", strangle("NIFTY"), true).await.unwrap();
        registry.deploy("created", strangle("NIFTY"), false).await.unwrap();

        let results = registry.pause_all().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "armed");
        assert!(results[0].1.is_ok());

        let armed = registry.handle("armed").await.unwrap();
        assert_eq!(armed.status().await, StrategyStatus::Paused);
        let created = registry.handle("created").await.unwrap();
        assert_eq!(created.status().await, StrategyStatus::Created);
    }

    #[tokio::test]
    async fn undeploy_purges_index_entries() {
        let (registry, _store, _broker) = rig().await;
        registry.deploy("s1", strangle("NIFTY"), true).await.unwrap();
        registry.on_tick(&snapshot("NIFTY", dec!(21000))).await;
        registry.rebuild_position_index().await;

        registry.undeploy("s1").await.unwrap();
        assert!(registry.handle("s1").await.is_none());
        assert!(registry.position_index.read().await.is_empty());
    }
}
