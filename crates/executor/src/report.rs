//! Execution results returned to the state machine.

use optrade_core::{JournalStatus, OrderSide};

/// Terminal outcome of one leg, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegOutcome {
    /// Broker accepted the order.
    Placed { broker_order_id: String },
    /// Broker rejected the order or the call errored.
    Failed { reason: String },
    /// Never dispatched (earlier leg failed, or buy phase incomplete).
    Skipped { reason: String },
    /// Dispatched but unresolved at the buy-phase deadline. The detached
    /// dispatch task still records the real outcome when it lands.
    TimedOut,
}

impl LegOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Placed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct LegReport {
    pub index: usize,
    pub instrument: String,
    pub side: OrderSide,
    pub outcome: LegOutcome,
}

/// Summary of one multi-leg operation.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Journal `group_id` tying together all legs and broker orders.
    pub group_id: String,
    pub status: JournalStatus,
    pub legs: Vec<LegReport>,
}

impl ExecutionReport {
    pub(crate) fn from_legs(group_id: String, mut legs: Vec<LegReport>) -> Self {
        legs.sort_by_key(|leg| leg.index);
        let successes = legs.iter().filter(|l| l.outcome.is_success()).count();
        let status = if successes == legs.len() {
            JournalStatus::Completed
        } else if successes == 0 {
            JournalStatus::Failed
        } else {
            JournalStatus::PartiallyDone
        };
        Self { group_id, status, legs }
    }

    /// True only when every leg was placed.
    pub fn all_succeeded(&self) -> bool {
        self.status == JournalStatus::Completed
    }

    /// Broker order id for a leg, when it was placed.
    pub fn broker_order_id(&self, index: usize) -> Option<&str> {
        self.legs.iter().find(|l| l.index == index).and_then(|l| match &l.outcome {
            LegOutcome::Placed { broker_order_id } => Some(broker_order_id.as_str()),
            _ => None,
        })
    }
}
