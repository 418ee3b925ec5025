//! Iron condor: a short strangle with long wings capping the risk.
//!
//! Entry buys the wings before selling the body, so margin for the
//! short legs is already offset when they go out.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use optrade_core::{
    OptionInstrument, OptionRight, OrderKind, OrderRequest, OrderSide, StrikeSelection,
};
use optrade_executor::ExecutionPolicy;

use crate::config::{resolve_strike, IronCondorConfig};
use crate::logic::{AdjustmentPlan, EntryDecision, EvalContext, ExitReason, StrategyLogic};

pub struct IronCondor {
    cfg: IronCondorConfig,
    buy_phase_timeout: Duration,
}

impl IronCondor {
    pub fn new(cfg: IronCondorConfig, buy_phase_timeout: Duration) -> Self {
        Self { cfg, buy_phase_timeout }
    }

    fn leg(
        &self,
        ctx: &EvalContext,
        right: OptionRight,
        side: OrderSide,
        selection: &StrikeSelection,
    ) -> OrderRequest {
        let strike = resolve_strike(selection, ctx.snapshot.spot, self.cfg.strike_step);
        OrderRequest {
            instrument: OptionInstrument::new(&self.cfg.underlying, self.cfg.expiry, strike, right),
            side,
            kind: OrderKind::Market,
            quantity: self.cfg.quantity,
            strategy_id: ctx.strategy_id.clone(),
            correlation_id: format!("{}-entry", ctx.strategy_id),
        }
    }
}

#[async_trait]
impl StrategyLogic for IronCondor {
    fn name(&self) -> &str {
        "iron_condor"
    }

    async fn should_enter(&self, ctx: &EvalContext) -> Result<Option<EntryDecision>> {
        let today = ctx.snapshot.timestamp.date_naive();
        let dte = ctx.state.days_to_expiry(today);
        if dte < 0 || dte < self.cfg.risk.min_dte {
            return Ok(None);
        }
        if !ctx.state.positions.is_empty() {
            return Ok(None);
        }
        Ok(Some(EntryDecision {
            reason: format!("iron condor entry at spot {}", ctx.snapshot.spot),
        }))
    }

    fn build_entry_orders(
        &self,
        ctx: &EvalContext,
        _decision: &EntryDecision,
    ) -> Result<Vec<OrderRequest>> {
        Ok(vec![
            self.leg(ctx, OptionRight::Call, OrderSide::Buy, &self.cfg.long_call),
            self.leg(ctx, OptionRight::Put, OrderSide::Buy, &self.cfg.long_put),
            self.leg(ctx, OptionRight::Call, OrderSide::Sell, &self.cfg.short_call),
            self.leg(ctx, OptionRight::Put, OrderSide::Sell, &self.cfg.short_put),
        ])
    }

    async fn should_exit(&self, ctx: &EvalContext) -> Result<Option<ExitReason>> {
        let today = ctx.snapshot.timestamp.date_naive();
        let dte = ctx.state.days_to_expiry(today);
        if dte < self.cfg.risk.min_dte {
            return Ok(Some(ExitReason {
                reason: format!("expiry window reached ({dte} days left)"),
            }));
        }
        Ok(None)
    }

    /// The wings already cap the risk; the condor is not adjusted.
    async fn adjust(&self, _ctx: &EvalContext) -> Result<Option<AdjustmentPlan>> {
        Ok(None)
    }

    fn entry_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy::BuyFirstThenSell {
            buy_phase_timeout: self.buy_phase_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optrade_core::{MarketSnapshot, StrategyStatus};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::config::{RiskLimits, StrategyConfig};
    use crate::state::StrategyState;

    fn cfg() -> IronCondorConfig {
        IronCondorConfig {
            underlying: "NIFTY".to_string(),
            expiry: NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
            quantity: 50,
            short_call: StrikeSelection::OffsetFromSpot(dec!(400)),
            short_put: StrikeSelection::OffsetFromSpot(dec!(-400)),
            long_call: StrikeSelection::OffsetFromSpot(dec!(700)),
            long_put: StrikeSelection::OffsetFromSpot(dec!(-700)),
            strike_step: dec!(50),
            risk: RiskLimits::default(),
        }
    }

    fn ctx(spot: Decimal) -> EvalContext {
        let config = StrategyConfig::IronCondor(cfg());
        let mut state = StrategyState::new("c1", &config);
        state.status = StrategyStatus::Armed;
        EvalContext {
            strategy_id: "c1".to_string(),
            snapshot: MarketSnapshot::new(
                "NIFTY",
                spot,
                NaiveDate::from_ymd_opt(2026, 8, 30)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap()
                    .and_utc(),
            ),
            state,
        }
    }

    #[tokio::test]
    async fn entry_builds_four_legs_two_per_side() {
        let logic = IronCondor::new(cfg(), Duration::from_secs(30));
        let ctx = ctx(dec!(21000));
        let decision = logic.should_enter(&ctx).await.unwrap().unwrap();

        let orders = logic.build_entry_orders(&ctx, &decision).unwrap();
        assert_eq!(orders.len(), 4);
        assert_eq!(orders.iter().filter(|o| o.side == OrderSide::Buy).count(), 2);
        assert_eq!(orders.iter().filter(|o| o.side == OrderSide::Sell).count(), 2);

        // Wings sit outside the body.
        let long_call = orders
            .iter()
            .find(|o| o.side == OrderSide::Buy && o.instrument.right == OptionRight::Call)
            .unwrap();
        let short_call = orders
            .iter()
            .find(|o| o.side == OrderSide::Sell && o.instrument.right == OptionRight::Call)
            .unwrap();
        assert!(long_call.instrument.strike > short_call.instrument.strike);
    }

    #[tokio::test]
    async fn condor_entry_buys_wings_first() {
        let logic = IronCondor::new(cfg(), Duration::from_secs(30));
        assert!(matches!(
            logic.entry_policy(),
            ExecutionPolicy::BuyFirstThenSell { .. }
        ));
    }

    #[tokio::test]
    async fn condor_is_never_adjusted() {
        let logic = IronCondor::new(cfg(), Duration::from_secs(30));
        assert!(logic.adjust(&ctx(dec!(21000))).await.unwrap().is_none());
    }
}
