//! The executor protocol and its three ordering policies.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use optrade_broker::BrokerGateway;
use optrade_core::{
    EngineEvents, JournalStatus, OperationPriority, OperationType, OrderNotice, OrderRequest,
    OrderSide, OrderValidationError,
};
use optrade_store::{JournalStore, NewJournalLeg};

use crate::report::{ExecutionReport, LegOutcome, LegReport};

/// How the legs of one operation are ordered against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// All legs concurrently; a failing leg never cancels a sibling.
    Parallel,
    /// Strict list order; the first failure stops dispatch of the rest.
    Sequential,
    /// All BUY legs first, bounded wait for them, then SELL legs.
    /// Buying back short legs frees margin before the offsetting sell
    /// consumes it.
    BuyFirstThenSell { buy_phase_timeout: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("operation has no legs")]
    Empty,
    #[error("leg {index} invalid: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: OrderValidationError,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Drives one multi-leg operation to completion under the journal.
///
/// Holds no strategy lock; callers release theirs before invoking
/// `execute` and re-acquire only to commit the resulting transition.
pub struct JournaledExecutor {
    journal: JournalStore,
    broker: Arc<dyn BrokerGateway>,
    events: EngineEvents,
}

impl JournaledExecutor {
    pub fn new(journal: JournalStore, broker: Arc<dyn BrokerGateway>, events: EngineEvents) -> Self {
        Self { journal, broker, events }
    }

    /// Executes one logical operation.
    ///
    /// Protocol: validate synchronously, persist one PENDING journal row
    /// per leg, flip the group IN_PROGRESS, dispatch per `policy`, record
    /// each leg's outcome durably as it resolves, aggregate the group.
    /// Broker errors never propagate past this boundary; they are encoded
    /// per-leg in the report.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Empty`/`Invalid` for malformed operations
    /// (nothing journaled, no broker call made) and `Internal` if the
    /// journal itself cannot be written.
    pub async fn execute(
        &self,
        policy: ExecutionPolicy,
        strategy_id: &str,
        operation: OperationType,
        priority: OperationPriority,
        legs: Vec<OrderRequest>,
    ) -> Result<ExecutionReport, ExecutorError> {
        if legs.is_empty() {
            return Err(ExecutorError::Empty);
        }
        for (index, leg) in legs.iter().enumerate() {
            leg.validate()
                .map_err(|source| ExecutorError::Invalid { index, source })?;
        }

        let group_id = Uuid::new_v4().to_string();
        let rows: Vec<NewJournalLeg> = legs
            .iter()
            .map(|leg| NewJournalLeg {
                instrument: leg.instrument.display_name(),
                side: leg.side.to_string(),
                quantity: i64::from(leg.quantity),
            })
            .collect();

        // Durability before action: the group must be committed before the
        // first broker call is issued.
        self.journal
            .append_group(&group_id, strategy_id, operation, &rows)
            .await?;
        self.journal.mark_group_in_progress(&group_id).await?;

        info!(
            group_id,
            strategy_id,
            operation = %operation,
            policy = ?policy,
            legs = legs.len(),
            "Dispatching multi-leg operation"
        );

        let leg_reports = match policy {
            ExecutionPolicy::Parallel => {
                self.run_parallel(&group_id, legs.into_iter().enumerate().collect(), priority)
                    .await
            }
            ExecutionPolicy::Sequential => self.run_sequential(&group_id, legs, priority).await,
            ExecutionPolicy::BuyFirstThenSell { buy_phase_timeout } => {
                self.run_buy_first(&group_id, legs, priority, buy_phase_timeout)
                    .await
            }
        };

        let report = ExecutionReport::from_legs(group_id, leg_reports);
        info!(
            group_id = report.group_id,
            status = %report.status,
            "Multi-leg operation resolved"
        );
        Ok(report)
    }

    async fn run_parallel(
        &self,
        group_id: &str,
        legs: Vec<(usize, OrderRequest)>,
        priority: OperationPriority,
    ) -> Vec<LegReport> {
        let mut set = JoinSet::new();
        for (index, req) in legs {
            let journal = self.journal.clone();
            let broker = Arc::clone(&self.broker);
            let events = self.events.clone();
            let group_id = group_id.to_string();
            set.spawn(async move {
                let instrument = req.instrument.display_name();
                let side = req.side;
                let outcome =
                    dispatch_leg(journal, broker, events, group_id, index, req, priority).await;
                LegReport { index, instrument, side, outcome }
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(group_id, error = %e, "Leg dispatch task panicked"),
            }
        }
        reports
    }

    async fn run_sequential(
        &self,
        group_id: &str,
        legs: Vec<OrderRequest>,
        priority: OperationPriority,
    ) -> Vec<LegReport> {
        let mut reports = Vec::new();
        let mut failed_at: Option<usize> = None;

        for (index, req) in legs.into_iter().enumerate() {
            let instrument = req.instrument.display_name();
            let side = req.side;

            let outcome = if let Some(failed_index) = failed_at {
                let reason = format!("not attempted: leg {failed_index} failed");
                self.record_skip(group_id, index, &reason).await;
                LegOutcome::Skipped { reason }
            } else {
                let outcome = dispatch_leg(
                    self.journal.clone(),
                    Arc::clone(&self.broker),
                    self.events.clone(),
                    group_id.to_string(),
                    index,
                    req,
                    priority,
                )
                .await;
                if !outcome.is_success() {
                    failed_at = Some(index);
                }
                outcome
            };

            reports.push(LegReport { index, instrument, side, outcome });
        }
        reports
    }

    async fn run_buy_first(
        &self,
        group_id: &str,
        legs: Vec<OrderRequest>,
        priority: OperationPriority,
        buy_phase_timeout: Duration,
    ) -> Vec<LegReport> {
        let mut buy_handles = Vec::new();
        let mut sell_legs = Vec::new();

        for (index, req) in legs.into_iter().enumerate() {
            match req.side {
                OrderSide::Buy => {
                    let instrument = req.instrument.display_name();
                    // Plain spawn, not a JoinSet: dropping the handle at the
                    // deadline must detach the task, not abort it, so a leg
                    // already at the broker still records its real outcome.
                    let handle = tokio::spawn(dispatch_leg(
                        self.journal.clone(),
                        Arc::clone(&self.broker),
                        self.events.clone(),
                        group_id.to_string(),
                        index,
                        req,
                        priority,
                    ));
                    buy_handles.push((index, instrument, handle));
                }
                OrderSide::Sell => sell_legs.push((index, req)),
            }
        }

        let deadline = tokio::time::Instant::now() + buy_phase_timeout;
        let mut reports = Vec::new();
        let mut buys_complete = true;

        for (index, instrument, handle) in buy_handles {
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => LegOutcome::Failed { reason: format!("dispatch task failed: {e}") },
                Err(_) => {
                    warn!(group_id, leg_index = index, "Buy leg unresolved at deadline");
                    LegOutcome::TimedOut
                }
            };
            buys_complete &= outcome.is_success();
            reports.push(LegReport { index, instrument, side: OrderSide::Buy, outcome });
        }

        if buys_complete {
            reports.extend(self.run_parallel(group_id, sell_legs, priority).await);
        } else {
            // Deliberate fail-safe: the sell phase is skipped, never retried.
            warn!(group_id, "Buy phase incomplete; skipping sell legs");
            for (index, req) in sell_legs {
                let reason = "not attempted: buy phase incomplete".to_string();
                self.record_skip(group_id, index, &reason).await;
                reports.push(LegReport {
                    index,
                    instrument: req.instrument.display_name(),
                    side: OrderSide::Sell,
                    outcome: LegOutcome::Skipped { reason },
                });
            }
        }
        reports
    }

    async fn record_skip(&self, group_id: &str, index: usize, reason: &str) {
        let result = self
            .journal
            .record_leg_result(group_id, index as i64, JournalStatus::Failed, None, Some(reason))
            .await;
        if let Err(e) = result {
            error!(group_id, leg_index = index, error = %e, "Failed to journal skipped leg");
        }
    }
}

/// Places one leg and records its outcome. Runs off any strategy lock;
/// the journal write for the outcome happens before the outcome is
/// reported back.
async fn dispatch_leg(
    journal: JournalStore,
    broker: Arc<dyn BrokerGateway>,
    events: EngineEvents,
    group_id: String,
    index: usize,
    req: OrderRequest,
    priority: OperationPriority,
) -> LegOutcome {
    let placed = match priority {
        OperationPriority::Normal => broker.place_order(&req).await,
        OperationPriority::KillSwitch => broker.place_order_bypass(&req).await,
    };

    match placed {
        Ok(broker_order_id) => {
            let recorded = journal
                .record_leg_result(
                    &group_id,
                    index as i64,
                    JournalStatus::Completed,
                    Some(&broker_order_id),
                    None,
                )
                .await;
            if let Err(e) = recorded {
                error!(group_id, leg_index = index, error = %e, "Failed to journal leg completion");
            }
            events.order_notice(OrderNotice::Placed {
                strategy_id: req.strategy_id.clone(),
                broker_order_id: broker_order_id.clone(),
                instrument: req.instrument.display_name(),
            });
            LegOutcome::Placed { broker_order_id }
        }
        Err(e) => {
            let reason = e.to_string();
            let recorded = journal
                .record_leg_result(
                    &group_id,
                    index as i64,
                    JournalStatus::Failed,
                    None,
                    Some(&reason),
                )
                .await;
            if let Err(e) = recorded {
                error!(group_id, leg_index = index, error = %e, "Failed to journal leg failure");
            }
            events.order_notice(OrderNotice::Rejected {
                strategy_id: req.strategy_id.clone(),
                instrument: req.instrument.display_name(),
                reason: reason.clone(),
            });
            warn!(group_id, leg_index = index, reason, "Leg failed");
            LegOutcome::Failed { reason }
        }
    }
}
