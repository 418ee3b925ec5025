//! Per-strategy handle: one `RwLock`-guarded state machine plus the
//! glue to the executor, the store, and the event channels.
//!
//! Lock discipline: evaluation takes a non-blocking read for its guard
//! checks, drops every lock before calling the executor, and re-acquires
//! a write lock only to commit the resulting transition. Exclusive
//! sections are pure in-memory work; status persistence runs after the
//! guard drops. A strategy that is exclusively locked simply misses the
//! tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use optrade_core::{
    DecisionCategory, DecisionRecord, EngineDefaults, EngineEvents, LegDef, MarketSnapshot,
    OperationPriority, OperationType, OrderKind, OrderRequest, OrderSide, Position,
    PositionNotice, StrategyEvent, StrategyStatus, StrikeSelection,
};
use optrade_executor::{ExecutionPolicy, JournaledExecutor};
use optrade_store::Store;

use crate::config::StrategyConfig;
use crate::logic::{EvalContext, StrategyLogic};
use crate::state::StrategyState;

struct Inner {
    id: String,
    state: RwLock<StrategyState>,
    logic: Arc<dyn StrategyLogic>,
    executor: Arc<JournaledExecutor>,
    store: Store,
    events: EngineEvents,
    defaults: EngineDefaults,
}

#[derive(Clone)]
pub struct StrategyHandle {
    inner: Arc<Inner>,
}

impl StrategyHandle {
    pub fn new(
        id: &str,
        config: &StrategyConfig,
        logic: Arc<dyn StrategyLogic>,
        executor: Arc<JournaledExecutor>,
        store: Store,
        events: EngineEvents,
        defaults: EngineDefaults,
    ) -> Self {
        Self::with_status(id, config, StrategyStatus::Created, logic, executor, store, events, defaults)
    }

    /// Recreates a handle at a known lifecycle point, for startup
    /// recovery. Entry logic is not re-run.
    #[allow(clippy::too_many_arguments)]
    pub fn with_status(
        id: &str,
        config: &StrategyConfig,
        status: StrategyStatus,
        logic: Arc<dyn StrategyLogic>,
        executor: Arc<JournaledExecutor>,
        store: Store,
        events: EngineEvents,
        defaults: EngineDefaults,
    ) -> Self {
        let mut state = StrategyState::new(id, config);
        state.status = status;
        Self {
            inner: Arc::new(Inner {
                id: id.to_string(),
                state: RwLock::new(state),
                logic,
                executor,
                store,
                events,
                defaults,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub async fn status(&self) -> StrategyStatus {
        self.inner.state.read().await.status
    }

    /// Non-blocking status peek; `None` while exclusively locked.
    pub fn try_status(&self) -> Option<StrategyStatus> {
        self.inner.state.try_read().ok().map(|s| s.status)
    }

    pub async fn state_snapshot(&self) -> StrategyState {
        self.inner.state.read().await.clone()
    }

    pub async fn underlying(&self) -> String {
        self.inner.state.read().await.underlying.clone()
    }

    pub async fn arm(&self) -> Result<()> {
        self.transition(StrategyStatus::Armed).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.transition(StrategyStatus::Paused).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.transition(StrategyStatus::Active).await
    }

    async fn transition(&self, next: StrategyStatus) -> Result<()> {
        let old = {
            let mut state = self.inner.state.write().await;
            let old = state.status;
            ensure!(
                old.can_transition_to(next),
                "strategy {}: illegal transition {old} -> {next}",
                self.inner.id
            );
            state.status = next;
            old
        };
        self.inner.store.strategies().set_status(&self.inner.id, next).await?;
        self.lifecycle_event(old, next);
        Ok(())
    }

    pub async fn add_position(&self, position: Position) {
        self.inner.state.write().await.upsert_position(position.clone());
        self.inner.events.position_notice(PositionNotice::Opened(position));
    }

    pub async fn update_position(&self, position: Position) {
        let opened = {
            let mut state = self.inner.state.write().await;
            let known = state
                .positions
                .iter()
                .any(|p| p.position_id == position.position_id);
            state.upsert_position(position.clone());
            !known
        };
        self.inner.events.position_notice(if opened {
            PositionNotice::Opened(position)
        } else {
            PositionNotice::Updated(position)
        });
    }

    pub async fn remove_position(&self, position_id: &str) {
        let removed = self.inner.state.write().await.remove_position(position_id);
        if let Some(position) = removed {
            self.inner.events.position_notice(PositionNotice::Closed(position));
        }
    }

    /// Flattens every live position and drives the strategy to CLOSED.
    ///
    /// Short legs are bought back before long legs are sold (buy-first
    /// ordering), so the close never briefly increases exposure. An
    /// incomplete close leaves the strategy in CLOSING for the operator;
    /// there is no automatic retry.
    ///
    /// # Errors
    ///
    /// Returns an error on an illegal lifecycle transition or if the
    /// journal cannot be written.
    pub async fn initiate_close(&self, reason: &str) -> Result<()> {
        let (old, orders) = {
            let mut state = self.inner.state.write().await;
            let old = state.status;
            ensure!(
                old.can_transition_to(StrategyStatus::Closing),
                "strategy {}: cannot close from {old}",
                self.inner.id
            );
            let orders = state.build_exit_orders();
            state.status = StrategyStatus::Closing;
            (old, orders)
        };
        self.inner.store.strategies().set_status(&self.inner.id, StrategyStatus::Closing).await?;
        self.lifecycle_event(old, StrategyStatus::Closing);

        if orders.is_empty() {
            self.finish_close(reason, None).await?;
            return Ok(());
        }

        let report = self
            .inner
            .executor
            .execute(
                ExecutionPolicy::BuyFirstThenSell {
                    buy_phase_timeout: Duration::from_secs(self.inner.defaults.buy_phase_timeout_secs),
                },
                &self.inner.id,
                OperationType::Exit,
                OperationPriority::Normal,
                orders,
            )
            .await?;

        if report.all_succeeded() {
            self.finish_close(reason, Some(&report.group_id)).await?;
        } else {
            warn!(
                strategy_id = self.inner.id,
                group_id = report.group_id,
                status = %report.status,
                "Close incomplete; strategy stays CLOSING"
            );
            self.inner.events.decision(
                DecisionRecord::new(&self.inner.id, DecisionCategory::Exit, "close incomplete")
                    .with_context(json!({
                        "group_id": report.group_id,
                        "group_status": report.status.as_str(),
                    })),
            );
        }
        Ok(())
    }

    async fn finish_close(&self, reason: &str, group_id: Option<&str>) -> Result<()> {
        let realized = {
            let mut state = self.inner.state.write().await;
            let realized = state.total_pnl();
            state.positions.clear();
            for leg in &mut state.legs {
                leg.position_id = None;
            }
            state.status = StrategyStatus::Closed;
            realized
        };
        self.inner.store.strategies().set_status(&self.inner.id, StrategyStatus::Closed).await?;
        self.fold_into_daily_pnl(realized).await;
        self.lifecycle_event(StrategyStatus::Closing, StrategyStatus::Closed);
        self.inner.events.decision(
            DecisionRecord::new(&self.inner.id, DecisionCategory::Exit, reason)
                .with_context(json!({ "group_id": group_id })),
        );
        info!(strategy_id = self.inner.id, reason, "Strategy closed");
        Ok(())
    }

    /// Folds a closed strategy's P&L into today's counter. Best effort;
    /// the close itself never fails on an accounting write.
    async fn fold_into_daily_pnl(&self, realized: Decimal) {
        let day = Utc::now().date_naive();
        let pnl = self.inner.store.pnl();
        let result = async {
            let previous = pnl.load_day(day).await?.unwrap_or(Decimal::ZERO);
            pnl.record_day(day, previous + realized).await
        }
        .await;
        if let Err(e) = result {
            error!(strategy_id = self.inner.id, error = %e, "Failed to update daily P&L");
        }
    }

    /// One evaluation cycle against a market snapshot.
    ///
    /// Never blocks on the strategy lock and never returns an error;
    /// every outcome, including every skip, is emitted as a
    /// `DecisionRecord`.
    pub async fn evaluate(&self, snapshot: &MarketSnapshot) {
        let now = Utc::now();

        enum FastPath {
            Proceed,
            AutoPause { reason: String, context: serde_json::Value },
        }

        let verdict = {
            // Exclusively locked means some operation is mid-flight; the
            // strategy just misses this tick.
            let Ok(state) = self.inner.state.try_read() else {
                return;
            };

            if let Some(last) = state.last_eval {
                let min = chrono::Duration::seconds(
                    i64::try_from(state.risk.min_eval_interval_secs).unwrap_or(i64::MAX),
                );
                if now.signed_duration_since(last) < min {
                    self.skip("evaluation interval not elapsed");
                    return;
                }
            }

            if !state.status.is_evaluable() {
                self.skip(&format!("status {} not evaluable", state.status));
                return;
            }

            if state.status == StrategyStatus::Active && !state.positions_fresh(now) {
                self.skip("position data stale");
                return;
            }

            let mut verdict = FastPath::Proceed;
            if state.status == StrategyStatus::Active {
                if let Some(floor) = state.risk.auto_pause_pnl_floor {
                    let pnl = state.total_pnl();
                    if pnl < floor {
                        verdict = FastPath::AutoPause {
                            reason: "pnl below auto-pause floor".to_string(),
                            context: json!({ "pnl": pnl.to_string(), "floor": floor.to_string() }),
                        };
                    }
                }
                if matches!(verdict, FastPath::Proceed) {
                    if let (Some(ceiling), Some(delta)) =
                        (state.risk.auto_pause_delta_ceiling, state.net_delta())
                    {
                        if delta.abs() > ceiling {
                            verdict = FastPath::AutoPause {
                                reason: "net delta above auto-pause ceiling".to_string(),
                                context: json!({ "net_delta": delta, "ceiling": ceiling }),
                            };
                        }
                    }
                }
            }
            verdict
        };

        if let FastPath::AutoPause { reason, context } = verdict {
            self.auto_pause(&reason, context).await;
            return;
        }

        let ctx_state = {
            let mut state = self.inner.state.write().await;
            // The fast path ran unlocked; a transition may have landed since.
            if !state.status.is_evaluable() {
                return;
            }
            state.last_eval = Some(now);
            state.clone()
        };

        let ctx = EvalContext {
            strategy_id: self.inner.id.clone(),
            snapshot: snapshot.clone(),
            state: ctx_state,
        };

        match ctx.state.status {
            StrategyStatus::Armed => self.evaluate_armed(&ctx).await,
            StrategyStatus::Active => self.evaluate_active(&ctx).await,
            _ => {}
        }
    }

    async fn evaluate_armed(&self, ctx: &EvalContext) {
        let decision = match self.inner.logic.should_enter(ctx).await {
            Ok(Some(decision)) => decision,
            Ok(None) => {
                self.skip("no entry signal");
                return;
            }
            Err(e) => {
                error!(strategy_id = self.inner.id, error = %e, "Entry check failed");
                self.skip(&format!("entry check failed: {e}"));
                return;
            }
        };

        let orders = match self.inner.logic.build_entry_orders(ctx, &decision) {
            Ok(orders) if !orders.is_empty() => orders,
            Ok(_) => {
                self.skip("entry decision produced no orders");
                return;
            }
            Err(e) => {
                error!(strategy_id = self.inner.id, error = %e, "Entry order construction failed");
                self.skip(&format!("entry order construction failed: {e}"));
                return;
            }
        };

        let legs = legs_from_orders(&orders);
        let entry_premium = premium_from_orders(&orders);

        let report = match self
            .inner
            .executor
            .execute(
                self.inner.logic.entry_policy(),
                &self.inner.id,
                OperationType::Entry,
                OperationPriority::Normal,
                orders,
            )
            .await
        {
            Ok(report) => report,
            Err(e) => {
                error!(strategy_id = self.inner.id, error = %e, "Entry dispatch failed");
                self.inner.events.decision(DecisionRecord::new(
                    &self.inner.id,
                    DecisionCategory::Entry,
                    &format!("entry dispatch failed: {e}"),
                ));
                return;
            }
        };

        let mut state = self.inner.state.write().await;
        if report.all_succeeded() && state.status == StrategyStatus::Armed {
            state.status = StrategyStatus::Active;
            state.entry_time = Some(Utc::now());
            state.entry_premium = entry_premium;
            state.legs = legs;
            drop(state);
            if let Err(e) = self.inner.store.strategies().set_status(&self.inner.id, StrategyStatus::Active).await {
                error!(strategy_id = self.inner.id, error = %e, "Failed to persist ACTIVE status");
            }
            self.lifecycle_event(StrategyStatus::Armed, StrategyStatus::Active);
            self.inner.events.decision(
                DecisionRecord::new(&self.inner.id, DecisionCategory::Entry, &decision.reason)
                    .with_context(json!({ "group_id": report.group_id })),
            );
        } else {
            drop(state);
            self.inner.events.decision(
                DecisionRecord::new(
                    &self.inner.id,
                    DecisionCategory::Entry,
                    "entry incomplete; staying armed",
                )
                .with_context(json!({
                    "group_id": report.group_id,
                    "group_status": report.status.as_str(),
                })),
            );
        }
    }

    async fn evaluate_active(&self, ctx: &EvalContext) {
        let pnl = ctx.state.total_pnl();

        // Target and stop are checked before the logic gets a say.
        if let Some(target) = ctx.state.risk.pnl_target {
            if pnl >= target {
                self.close_from_evaluation(&format!("pnl target reached at {pnl}")).await;
                return;
            }
        }
        if let Some(stop) = ctx.state.risk.pnl_stop {
            if pnl <= stop {
                self.close_from_evaluation(&format!("pnl stop hit at {pnl}")).await;
                return;
            }
        }

        match self.inner.logic.should_exit(ctx).await {
            Ok(Some(exit)) => {
                self.close_from_evaluation(&exit.reason).await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                error!(strategy_id = self.inner.id, error = %e, "Exit check failed");
                self.skip(&format!("exit check failed: {e}"));
                return;
            }
        }

        let cooldown_over = match ctx.state.last_adjustment {
            None => true,
            Some(last) => {
                let cooldown = chrono::Duration::seconds(
                    i64::try_from(ctx.state.risk.adjustment_cooldown_secs).unwrap_or(i64::MAX),
                );
                Utc::now().signed_duration_since(last) >= cooldown
            }
        };

        if cooldown_over {
            match self.inner.logic.adjust(ctx).await {
                Ok(Some(plan)) if !plan.orders.is_empty() => {
                    self.run_adjustment(plan).await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(strategy_id = self.inner.id, error = %e, "Adjustment check failed");
                    self.skip(&format!("adjustment check failed: {e}"));
                    return;
                }
            }
        }

        self.skip("no action");
    }

    async fn run_adjustment(&self, plan: crate::logic::AdjustmentPlan) {
        // Sequential: an adjustment's legs depend on each other (close
        // before re-open), so a failure must stop the rest.
        let report = match self
            .inner
            .executor
            .execute(
                ExecutionPolicy::Sequential,
                &self.inner.id,
                plan.operation,
                OperationPriority::Normal,
                plan.orders,
            )
            .await
        {
            Ok(report) => report,
            Err(e) => {
                error!(strategy_id = self.inner.id, error = %e, "Adjustment dispatch failed");
                return;
            }
        };

        self.inner.state.write().await.last_adjustment = Some(Utc::now());
        self.inner.events.decision(
            DecisionRecord::new(&self.inner.id, DecisionCategory::Adjustment, &plan.reason)
                .with_context(json!({
                    "group_id": report.group_id,
                    "group_status": report.status.as_str(),
                })),
        );
    }

    async fn close_from_evaluation(&self, reason: &str) {
        if let Err(e) = self.initiate_close(reason).await {
            error!(strategy_id = self.inner.id, error = %e, "Close failed");
        }
    }

    async fn auto_pause(&self, reason: &str, context: serde_json::Value) {
        let old = {
            let mut state = self.inner.state.write().await;
            let old = state.status;
            // Re-checked under the write lock; the fast path read raced.
            if !old.can_transition_to(StrategyStatus::Paused) {
                return;
            }
            state.status = StrategyStatus::Paused;
            old
        };
        if let Err(e) = self.inner.store.strategies().set_status(&self.inner.id, StrategyStatus::Paused).await {
            error!(strategy_id = self.inner.id, error = %e, "Failed to persist PAUSED status");
        }
        self.lifecycle_event(old, StrategyStatus::Paused);
        warn!(strategy_id = self.inner.id, reason, "Auto-pause triggered");
        self.inner.events.decision(
            DecisionRecord::new(&self.inner.id, DecisionCategory::AutoPause, reason)
                .with_context(context),
        );
    }

    fn skip(&self, reason: &str) {
        self.inner
            .events
            .decision(DecisionRecord::new(&self.inner.id, DecisionCategory::Skip, reason));
    }

    fn lifecycle_event(&self, old: StrategyStatus, new: StrategyStatus) {
        self.inner.events.strategy_changed(StrategyEvent {
            strategy_id: self.inner.id.clone(),
            old_status: old,
            new_status: new,
            timestamp: Utc::now(),
        });
    }
}

/// Leg definitions derived from a dispatched entry group; the position
/// id anticipates the broker's instrument-keyed book.
fn legs_from_orders(orders: &[OrderRequest]) -> Vec<LegDef> {
    orders
        .iter()
        .map(|order| {
            let signed = i64::from(order.quantity);
            LegDef {
                right: order.instrument.right,
                strike: StrikeSelection::Absolute(order.instrument.strike),
                quantity: match order.side {
                    OrderSide::Buy => signed,
                    OrderSide::Sell => -signed,
                },
                position_id: Some(order.instrument.display_name()),
            }
        })
        .collect()
}

/// Net credit of an all-limit entry; `None` as soon as any leg is a
/// market order, since the fill price is unknown here.
fn premium_from_orders(orders: &[OrderRequest]) -> Option<Decimal> {
    let mut net = Decimal::ZERO;
    for order in orders {
        let OrderKind::Limit { price } = &order.kind else {
            return None;
        };
        let gross = *price * Decimal::from(order.quantity);
        net += match order.side {
            OrderSide::Sell => gross,
            OrderSide::Buy => -gross,
        };
    }
    Some(net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optrade_broker::PaperBroker;
    use optrade_core::{Greeks, JournalStatus, OptionInstrument, OptionRight};
    use optrade_store::Store;
    use rust_decimal_macros::dec;

    use crate::config::{RiskLimits, ShortStrangleConfig};
    use crate::strategies::build_logic;

    fn strangle_config(risk: RiskLimits) -> StrategyConfig {
        StrategyConfig::ShortStrangle(ShortStrangleConfig {
            underlying: "NIFTY".to_string(),
            expiry: NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
            quantity: 50,
            call_strike: StrikeSelection::OffsetFromSpot(dec!(500)),
            put_strike: StrikeSelection::OffsetFromSpot(dec!(-500)),
            strike_step: dec!(50),
            entry_spot_floor: None,
            entry_spot_cap: None,
            roll_delta_trigger: None,
            roll_step: dec!(200),
            risk,
        })
    }

    fn rolling_strangle_config() -> StrategyConfig {
        match strangle_config(RiskLimits::default()) {
            StrategyConfig::ShortStrangle(mut cfg) => {
                cfg.roll_delta_trigger = Some(0.3);
                StrategyConfig::ShortStrangle(cfg)
            }
            other => other,
        }
    }

    async fn rig(
        config: &StrategyConfig,
        broker: Arc<PaperBroker>,
    ) -> (StrategyHandle, Store, EngineEvents) {
        let store = Store::connect_in_memory().await.unwrap();
        let events = EngineEvents::new(64);
        let executor = Arc::new(JournaledExecutor::new(
            store.journal(),
            broker,
            events.clone(),
        ));
        let defaults = EngineDefaults::default();
        let logic = build_logic(config, &defaults);
        let handle = StrategyHandle::new(
            "s1",
            config,
            logic,
            executor,
            store.clone(),
            events.clone(),
            defaults,
        );
        store
            .strategies()
            .upsert(&optrade_store::StrategyRecord {
                id: "s1".to_string(),
                strategy_type: config.strategy_type().to_string(),
                status: StrategyStatus::Created.as_str().to_string(),
                config_json: serde_json::to_string(config).unwrap(),
                created_at: Utc::now(),
                closed_at: None,
            })
            .await
            .unwrap();
        (handle, store, events)
    }

    fn snapshot(spot: Decimal) -> MarketSnapshot {
        MarketSnapshot::new("NIFTY", spot, Utc::now())
    }

    fn short_call_position(pnl: Decimal, delta: f64) -> Position {
        Position {
            position_id: "NIFTY 21500C 2026-09-24".to_string(),
            instrument: OptionInstrument::new(
                "NIFTY",
                NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
                dec!(21500),
                OptionRight::Call,
            ),
            quantity: dec!(-50),
            avg_price: dec!(150),
            realized_pnl: dec!(0),
            unrealized_pnl: pnl,
            greeks: Some(Greeks { delta, gamma: 0.01, theta: -10.0, vega: 9.0 }),
            updated_at: Utc::now(),
            strategy_id: Some("s1".to_string()),
        }
    }

    #[tokio::test]
    async fn armed_strangle_enters_on_tick_with_one_journal_group() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits::default());
        let (handle, store, _events) = rig(&config, broker.clone()).await;

        handle.arm().await.unwrap();
        handle.evaluate(&snapshot(dec!(21000))).await;

        let state = handle.state_snapshot().await;
        assert_eq!(state.status, StrategyStatus::Active);
        assert!(state.entry_time.is_some());
        assert_eq!(state.legs.len(), 2);

        let rows = store.journal().strategy_rows("s1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == JournalStatus::Completed));
        assert_eq!(rows[0].group_id, rows[1].group_id);

        // One SELL per side.
        let accepted = broker.accepted_orders().await;
        assert_eq!(accepted.len(), 2);
        assert!(accepted.iter().all(|(_, o)| o.side == OrderSide::Sell));
    }

    #[tokio::test]
    async fn failed_entry_leg_keeps_strategy_armed() {
        let broker = Arc::new(PaperBroker::new());
        // Put leg resolves to 20500 at spot 21000.
        broker.fail_instrument("NIFTY 20500P 2026-09-24").await;
        let config = strangle_config(RiskLimits::default());
        let (handle, _store, _events) = rig(&config, broker).await;

        handle.arm().await.unwrap();
        handle.evaluate(&snapshot(dec!(21000))).await;

        assert_eq!(handle.status().await, StrategyStatus::Armed);
    }

    #[tokio::test]
    async fn pnl_floor_breach_pauses_instead_of_trading() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits {
            auto_pause_pnl_floor: Some(dec!(-15000)),
            ..RiskLimits::default()
        });
        let (handle, _store, events) = rig(&config, broker.clone()).await;
        let mut decisions = events.subscribe_decisions();

        handle.inner.state.write().await.status = StrategyStatus::Active;
        handle
            .add_position(short_call_position(dec!(-15001), 0.1))
            .await;

        handle.evaluate(&snapshot(dec!(21000))).await;

        assert_eq!(handle.status().await, StrategyStatus::Paused);
        assert!(broker.accepted_orders().await.is_empty());

        let record = decisions.recv().await.unwrap();
        assert_eq!(record.category, DecisionCategory::AutoPause);
    }

    #[tokio::test]
    async fn pnl_at_the_floor_exactly_does_not_pause() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits {
            auto_pause_pnl_floor: Some(dec!(-15000)),
            ..RiskLimits::default()
        });
        let (handle, _store, _events) = rig(&config, broker).await;

        handle.inner.state.write().await.status = StrategyStatus::Active;
        handle
            .add_position(short_call_position(dec!(-15000), 0.1))
            .await;

        handle.evaluate(&snapshot(dec!(21000))).await;
        assert_eq!(handle.status().await, StrategyStatus::Active);
    }

    #[tokio::test]
    async fn paused_strategy_never_trades_on_tick() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits::default());
        let (handle, store, events) = rig(&config, broker.clone()).await;
        let mut decisions = events.subscribe_decisions();

        handle.inner.state.write().await.status = StrategyStatus::Paused;
        handle.evaluate(&snapshot(dec!(21000))).await;

        assert!(broker.accepted_orders().await.is_empty());
        assert!(store.journal().strategy_rows("s1").await.unwrap().is_empty());

        let record = decisions.recv().await.unwrap();
        assert_eq!(record.category, DecisionCategory::Skip);
    }

    #[tokio::test]
    async fn pnl_stop_closes_the_strategy() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits {
            pnl_stop: Some(dec!(-25000)),
            ..RiskLimits::default()
        });
        let (handle, store, _events) = rig(&config, broker.clone()).await;

        handle.inner.state.write().await.status = StrategyStatus::Active;
        handle
            .add_position(short_call_position(dec!(-30000), 0.1))
            .await;

        handle.evaluate(&snapshot(dec!(21000))).await;

        assert_eq!(handle.status().await, StrategyStatus::Closed);

        // The short call was bought back, not sold again.
        let accepted = broker.accepted_orders().await;
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].1.side, OrderSide::Buy);
        assert_eq!(accepted[0].1.quantity, 50);

        // The loss landed in today's P&L counter.
        let day = store.pnl().load_day(Utc::now().date_naive()).await.unwrap();
        assert_eq!(day, Some(dec!(-30000)));
    }

    #[tokio::test]
    async fn illegal_manual_transitions_are_rejected() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits::default());
        let (handle, _store, _events) = rig(&config, broker).await;

        // CREATED cannot resume.
        assert!(handle.resume().await.is_err());
        handle.arm().await.unwrap();
        // ARMED cannot arm again.
        assert!(handle.arm().await.is_err());
    }

    #[tokio::test]
    async fn min_interval_suppresses_back_to_back_evaluation() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits {
            min_eval_interval_secs: 3600,
            ..RiskLimits::default()
        });
        let (handle, _store, _events) = rig(&config, broker.clone()).await;

        handle.arm().await.unwrap();
        handle.inner.state.write().await.last_eval = Some(Utc::now());

        handle.evaluate(&snapshot(dec!(21000))).await;
        assert_eq!(handle.status().await, StrategyStatus::Armed);
        assert!(broker.accepted_orders().await.is_empty());
    }

    #[tokio::test]
    async fn close_with_no_positions_goes_straight_to_closed() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits::default());
        let (handle, store, _events) = rig(&config, broker.clone()).await;

        handle.inner.state.write().await.status = StrategyStatus::Active;
        handle.initiate_close("flattened by operator").await.unwrap();

        assert_eq!(handle.status().await, StrategyStatus::Closed);
        assert!(broker.accepted_orders().await.is_empty());
        assert!(store.strategies().load_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn net_delta_ceiling_breach_pauses_instead_of_trading() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits {
            auto_pause_delta_ceiling: Some(10.0),
            ..RiskLimits::default()
        });
        let (handle, _store, events) = rig(&config, broker.clone()).await;
        let mut decisions = events.subscribe_decisions();

        handle.inner.state.write().await.status = StrategyStatus::Active;
        // Weighted delta 0.5 * -50 = -25; magnitude past the ceiling.
        handle.add_position(short_call_position(dec!(0), 0.5)).await;

        handle.evaluate(&snapshot(dec!(21000))).await;

        assert_eq!(handle.status().await, StrategyStatus::Paused);
        assert!(broker.accepted_orders().await.is_empty());

        let record = decisions.recv().await.unwrap();
        assert_eq!(record.category, DecisionCategory::AutoPause);
    }

    #[tokio::test]
    async fn adjustment_cooldown_suppresses_a_triggered_roll() {
        let broker = Arc::new(PaperBroker::new());
        let config = rolling_strangle_config();
        let (handle, _store, events) = rig(&config, broker.clone()).await;
        let mut decisions = events.subscribe_decisions();

        {
            let mut state = handle.inner.state.write().await;
            state.status = StrategyStatus::Active;
            state.last_adjustment = Some(Utc::now());
        }
        // Delta breach that would roll the call side once the cooldown
        // has passed.
        handle.add_position(short_call_position(dec!(0), 0.5)).await;

        handle.evaluate(&snapshot(dec!(21000))).await;

        assert_eq!(handle.status().await, StrategyStatus::Active);
        assert!(broker.accepted_orders().await.is_empty());
        let record = decisions.recv().await.unwrap();
        assert_eq!(record.category, DecisionCategory::Skip);

        // Same breach with the cooldown elapsed rolls the leg.
        {
            let mut state = handle.inner.state.write().await;
            state.last_adjustment = Some(Utc::now() - chrono::Duration::seconds(3600));
            state.last_eval = None;
        }
        handle.evaluate(&snapshot(dec!(21000))).await;

        let accepted = broker.accepted_orders().await;
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].1.side, OrderSide::Buy);
        assert_eq!(accepted[1].1.side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn stale_position_data_skips_the_tick() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits {
            pnl_stop: Some(dec!(-25000)),
            ..RiskLimits::default()
        });
        let (handle, _store, events) = rig(&config, broker.clone()).await;
        let mut decisions = events.subscribe_decisions();

        handle.inner.state.write().await.status = StrategyStatus::Active;
        let mut position = short_call_position(dec!(-30000), 0.1);
        position.updated_at = Utc::now() - chrono::Duration::seconds(600);
        handle.add_position(position).await;

        handle.evaluate(&snapshot(dec!(21000))).await;

        // Even a stop-level loss is not acted on through stale data.
        assert_eq!(handle.status().await, StrategyStatus::Active);
        assert!(broker.accepted_orders().await.is_empty());
        let record = decisions.recv().await.unwrap();
        assert_eq!(record.category, DecisionCategory::Skip);
        assert!(record.reason.contains("stale"));
    }

    #[tokio::test]
    async fn lifecycle_transitions_persist_the_new_status() {
        let broker = Arc::new(PaperBroker::new());
        let config = strangle_config(RiskLimits::default());
        let (handle, store, _events) = rig(&config, broker).await;

        handle.arm().await.unwrap();
        let open = store.strategies().load_open().await.unwrap();
        assert_eq!(open[0].status, StrategyStatus::Armed.as_str());

        handle.pause().await.unwrap();
        let open = store.strategies().load_open().await.unwrap();
        assert_eq!(open[0].status, StrategyStatus::Paused.as_str());
    }
}
