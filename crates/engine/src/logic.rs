//! The capability trait every strategy variant implements.

use anyhow::Result;
use async_trait::async_trait;

use optrade_core::{MarketSnapshot, OperationType, OrderRequest};
use optrade_executor::ExecutionPolicy;

use crate::state::StrategyState;

/// Everything a strategy sees in one evaluate cycle: the triggering
/// snapshot and a point-in-time clone of its own state. Logic never
/// holds the live lock.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub strategy_id: String,
    pub snapshot: MarketSnapshot,
    pub state: StrategyState,
}

#[derive(Debug, Clone)]
pub struct EntryDecision {
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ExitReason {
    pub reason: String,
}

/// A set of orders to run as one journaled group while staying ACTIVE.
#[derive(Debug, Clone)]
pub struct AdjustmentPlan {
    pub reason: String,
    pub operation: OperationType,
    pub orders: Vec<OrderRequest>,
}

/// what/when of a strategy variant. The handle owns lifecycle, locking,
/// journaling and persistence; the logic only answers questions about
/// the market and produces orders.
#[async_trait]
pub trait StrategyLogic: Send + Sync {
    fn name(&self) -> &str;

    /// Entry signal for an ARMED strategy.
    async fn should_enter(&self, ctx: &EvalContext) -> Result<Option<EntryDecision>>;

    /// Orders realizing a positive entry decision.
    fn build_entry_orders(
        &self,
        ctx: &EvalContext,
        decision: &EntryDecision,
    ) -> Result<Vec<OrderRequest>>;

    /// Exit signal for an ACTIVE strategy. The handle checks the P&L
    /// target/stop unconditionally before asking.
    async fn should_exit(&self, ctx: &EvalContext) -> Result<Option<ExitReason>>;

    /// In-flight repair for an ACTIVE strategy, rate-limited by the
    /// adjustment cooldown.
    async fn adjust(&self, ctx: &EvalContext) -> Result<Option<AdjustmentPlan>>;

    /// Strategy types this one can morph into.
    fn supported_morphs(&self) -> &[&str] {
        &[]
    }

    /// Ordering policy for the entry group.
    fn entry_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy::Parallel
    }
}
