//! Short strangle: sell an OTM call and an OTM put, collect the
//! premium, roll the tested side when delta drifts.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use optrade_core::{
    OperationType, OptionInstrument, OptionRight, OrderKind, OrderRequest, OrderSide,
    StrikeSelection,
};

use crate::config::{resolve_strike, ShortStrangleConfig};
use crate::logic::{AdjustmentPlan, EntryDecision, EvalContext, ExitReason, StrategyLogic};

pub struct ShortStrangle {
    cfg: ShortStrangleConfig,
}

impl ShortStrangle {
    pub fn new(cfg: ShortStrangleConfig) -> Self {
        Self { cfg }
    }

    fn sell_leg(&self, ctx: &EvalContext, right: OptionRight, selection: &StrikeSelection) -> OrderRequest {
        let strike = resolve_strike(selection, ctx.snapshot.spot, self.cfg.strike_step);
        OrderRequest {
            instrument: OptionInstrument::new(&self.cfg.underlying, self.cfg.expiry, strike, right),
            side: OrderSide::Sell,
            kind: OrderKind::Market,
            quantity: self.cfg.quantity,
            strategy_id: ctx.strategy_id.clone(),
            correlation_id: format!("{}-entry", ctx.strategy_id),
        }
    }
}

#[async_trait]
impl StrategyLogic for ShortStrangle {
    fn name(&self) -> &str {
        "short_strangle"
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
        if let Some(floor) = self.cfg.entry_spot_floor {
            if ctx.snapshot.spot < floor {
                return Ok(None);
            }
        }
        if let Some(cap) = self.cfg.entry_spot_cap {
            if ctx.snapshot.spot > cap {
                return Ok(None);
            }
        }
        Ok(Some(EntryDecision {
            reason: format!("short strangle entry at spot {}", ctx.snapshot.spot),
        }))
    }

    fn build_entry_orders(
        &self,
        ctx: &EvalContext,
        _decision: &EntryDecision,
    ) -> Result<Vec<OrderRequest>> {
        Ok(vec![
            self.sell_leg(ctx, OptionRight::Call, &self.cfg.call_strike),
            self.sell_leg(ctx, OptionRight::Put, &self.cfg.put_strike),
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

    /// Rolls the tested side: buy back the threatened short leg and
    /// re-sell it `roll_step` away from spot. Net positive delta means
    /// the put side is under pressure, net negative the call side.
    async fn adjust(&self, ctx: &EvalContext) -> Result<Option<AdjustmentPlan>> {
        let Some(trigger) = self.cfg.roll_delta_trigger else {
            return Ok(None);
        };
        let Some(delta) = ctx.state.net_delta() else {
            return Ok(None);
        };
        if delta.abs() <= trigger {
            return Ok(None);
        }

        let tested = if delta < 0.0 { OptionRight::Call } else { OptionRight::Put };
        let Some(position) = ctx.state.find_position(tested) else {
            debug!(strategy_id = ctx.strategy_id, side = %tested, "No position on tested side");
            return Ok(None);
        };
        let Some(quantity) = position.quantity.abs().to_u32() else {
            return Ok(None);
        };

        let offset = match tested {
            OptionRight::Call => self.cfg.roll_step,
            OptionRight::Put => -self.cfg.roll_step,
        };
        let new_strike = resolve_strike(
            &StrikeSelection::OffsetFromSpot(offset),
            ctx.snapshot.spot,
            self.cfg.strike_step,
        );

        let correlation_id = format!("{}-roll", ctx.strategy_id);
        let orders = vec![
            OrderRequest {
                instrument: position.instrument.clone(),
                side: OrderSide::Buy,
                kind: OrderKind::Market,
                quantity,
                strategy_id: ctx.strategy_id.clone(),
                correlation_id: correlation_id.clone(),
            },
            OrderRequest {
                instrument: OptionInstrument::new(
                    &self.cfg.underlying,
                    self.cfg.expiry,
                    new_strike,
                    tested,
                ),
                side: OrderSide::Sell,
                kind: OrderKind::Market,
                quantity,
                strategy_id: ctx.strategy_id.clone(),
                correlation_id,
            },
        ];

        Ok(Some(AdjustmentPlan {
            reason: format!("rolling {tested} side, net delta {delta:.2}"),
            operation: OperationType::RollLeg,
            orders,
        }))
    }

    fn supported_morphs(&self) -> &[&str] {
        &["iron_condor"]
    }
}
