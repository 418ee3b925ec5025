//! Outbound notification channels.
//!
//! The core emits on four independent broadcast channels, one per
//! consumer category (strategy lifecycle, orders, positions, decision
//! audit). Subscribers attach with `subscribe_*`; emission never blocks
//! and never fails the caller when nobody is listening. No ordering is
//! guaranteed across channels, only within one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::position::Position;
use crate::strategy::StrategyStatus;

/// Strategy lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyEvent {
    pub strategy_id: String,
    pub old_status: StrategyStatus,
    pub new_status: StrategyStatus,
    pub timestamp: DateTime<Utc>,
}

/// Order-level notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderNotice {
    Placed {
        strategy_id: String,
        broker_order_id: String,
        instrument: String,
    },
    Rejected {
        strategy_id: String,
        instrument: String,
        reason: String,
    },
}

/// Position-level notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PositionNotice {
    Opened(Position),
    Updated(Position),
    Closed(Position),
    /// Local cache and broker state disagree; surfaced by reconciliation.
    Discrepancy {
        position_id: String,
        detail: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionCategory {
    Entry,
    Exit,
    Adjustment,
    Skip,
    AutoPause,
    Lifecycle,
    Recovery,
}

/// Audit record for one evaluate-cycle outcome.
///
/// Produced even when no action is taken, so an operator can always
/// answer "why didn't my strategy act".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub strategy_id: String,
    pub category: DecisionCategory,
    pub reason: String,
    pub context: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(strategy_id: &str, category: DecisionCategory, reason: &str) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            category,
            reason: reason.to_string(),
            context: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Bundle of the four outbound channels owned by the core.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    strategy_tx: broadcast::Sender<StrategyEvent>,
    order_tx: broadcast::Sender<OrderNotice>,
    position_tx: broadcast::Sender<PositionNotice>,
    decision_tx: broadcast::Sender<DecisionRecord>,
}

impl EngineEvents {
    pub fn new(capacity: usize) -> Self {
        let (strategy_tx, _) = broadcast::channel(capacity);
        let (order_tx, _) = broadcast::channel(capacity);
        let (position_tx, _) = broadcast::channel(capacity);
        let (decision_tx, _) = broadcast::channel(capacity);
        Self {
            strategy_tx,
            order_tx,
            position_tx,
            decision_tx,
        }
    }

    pub fn subscribe_strategy(&self) -> broadcast::Receiver<StrategyEvent> {
        self.strategy_tx.subscribe()
    }

    pub fn subscribe_orders(&self) -> broadcast::Receiver<OrderNotice> {
        self.order_tx.subscribe()
    }

    pub fn subscribe_positions(&self) -> broadcast::Receiver<PositionNotice> {
        self.position_tx.subscribe()
    }

    pub fn subscribe_decisions(&self) -> broadcast::Receiver<DecisionRecord> {
        self.decision_tx.subscribe()
    }

    pub fn strategy_changed(&self, event: StrategyEvent) {
        tracing::info!(
            strategy_id = event.strategy_id,
            old = %event.old_status,
            new = %event.new_status,
            "Strategy lifecycle transition"
        );
        let _ = self.strategy_tx.send(event);
    }

    pub fn order_notice(&self, notice: OrderNotice) {
        let _ = self.order_tx.send(notice);
    }

    pub fn position_notice(&self, notice: PositionNotice) {
        let _ = self.position_tx.send(notice);
    }

    pub fn decision(&self, record: DecisionRecord) {
        tracing::debug!(
            strategy_id = record.strategy_id,
            category = ?record.category,
            reason = record.reason,
            "Decision"
        );
        let _ = self.decision_tx.send(record);
    }
}

impl Default for EngineEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}
