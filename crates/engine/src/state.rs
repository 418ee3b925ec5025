//! Per-strategy state guarded by the handle's lock.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use optrade_core::{
    LegDef, OptionRight, OrderKind, OrderRequest, OrderSide, Position, StrategyStatus,
};

use crate::config::{RiskLimits, StrategyConfig};

/// Mutable state of one deployed strategy. Cloned out for evaluation;
/// only the handle mutates the live copy, under its write lock.
#[derive(Debug, Clone)]
pub struct StrategyState {
    pub id: String,
    pub strategy_type: String,
    pub status: StrategyStatus,
    pub underlying: String,
    pub expiry: NaiveDate,
    pub legs: Vec<LegDef>,
    /// Cached broker-owned snapshots, keyed by `position_id`.
    pub positions: Vec<Position>,
    /// Net credit captured at entry, when known.
    pub entry_premium: Option<Decimal>,
    pub entry_time: Option<DateTime<Utc>>,
    pub last_eval: Option<DateTime<Utc>>,
    pub last_adjustment: Option<DateTime<Utc>>,
    pub risk: RiskLimits,
}

impl StrategyState {
    pub fn new(id: &str, config: &StrategyConfig) -> Self {
        Self {
            id: id.to_string(),
            strategy_type: config.strategy_type().to_string(),
            status: StrategyStatus::Created,
            underlying: config.underlying().to_string(),
            expiry: config.expiry(),
            legs: Vec::new(),
            positions: Vec::new(),
            entry_premium: None,
            entry_time: None,
            last_eval: None,
            last_adjustment: None,
            risk: config.risk().clone(),
        }
    }

    /// Realized plus unrealized P&L over all cached positions.
    pub fn total_pnl(&self) -> Decimal {
        self.positions.iter().map(Position::total_pnl).sum()
    }

    /// Net delta over positions carrying Greeks, `None` when no position
    /// has them.
    pub fn net_delta(&self) -> Option<f64> {
        let deltas: Vec<f64> = self
            .positions
            .iter()
            .filter_map(Position::weighted_delta)
            .collect();
        if deltas.is_empty() {
            None
        } else {
            Some(deltas.iter().sum())
        }
    }

    /// Whether every cached position was refreshed within the staleness
    /// window. An empty book is fresh.
    pub fn positions_fresh(&self, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::seconds(i64::try_from(self.risk.position_staleness_secs).unwrap_or(i64::MAX));
        self.positions
            .iter()
            .all(|p| now.signed_duration_since(p.updated_at) <= window)
    }

    pub fn upsert_position(&mut self, position: Position) {
        match self
            .positions
            .iter_mut()
            .find(|p| p.position_id == position.position_id)
        {
            Some(existing) => *existing = position,
            None => self.positions.push(position),
        }
    }

    pub fn remove_position(&mut self, position_id: &str) -> Option<Position> {
        let index = self
            .positions
            .iter()
            .position(|p| p.position_id == position_id)?;
        Some(self.positions.remove(index))
    }

    pub fn find_position(&self, right: OptionRight) -> Option<&Position> {
        self.positions.iter().find(|p| p.instrument.right == right)
    }

    /// Flattening orders for every live position: SELL abs(qty) for
    /// longs, BUY abs(qty) for shorts. Market orders; closing is not the
    /// moment to work a limit.
    pub fn build_exit_orders(&self) -> Vec<OrderRequest> {
        self.positions
            .iter()
            .filter(|p| !p.quantity.is_zero())
            .filter_map(|p| {
                let side = if p.quantity > Decimal::ZERO {
                    OrderSide::Sell
                } else {
                    OrderSide::Buy
                };
                let Some(quantity) = p.quantity.abs().to_u32() else {
                    warn!(
                        strategy_id = self.id,
                        position_id = p.position_id,
                        quantity = %p.quantity,
                        "Position quantity not expressible as lots; skipping exit order"
                    );
                    return None;
                };
                Some(OrderRequest {
                    instrument: p.instrument.clone(),
                    side,
                    kind: OrderKind::Market,
                    quantity,
                    strategy_id: self.id.clone(),
                    correlation_id: format!("{}-exit", self.id),
                })
            })
            .collect()
    }

    /// Calendar days until expiry from `today`.
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry - today).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optrade_core::{Greeks, OptionInstrument, StrikeSelection};
    use rust_decimal_macros::dec;

    fn position(id: &str, right: OptionRight, qty: Decimal) -> Position {
        Position {
            position_id: id.to_string(),
            instrument: OptionInstrument::new(
                "NIFTY",
                NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
                dec!(21000),
                right,
            ),
            quantity: qty,
            avg_price: dec!(150),
            realized_pnl: dec!(0),
            unrealized_pnl: dec!(1000),
            greeks: Some(Greeks { delta: 0.4, gamma: 0.01, theta: -12.0, vega: 8.0 }),
            updated_at: Utc::now(),
            strategy_id: Some("s1".to_string()),
        }
    }

    fn state_with(positions: Vec<Position>) -> StrategyState {
        StrategyState {
            id: "s1".to_string(),
            strategy_type: "short_strangle".to_string(),
            status: StrategyStatus::Active,
            underlying: "NIFTY".to_string(),
            expiry: NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
            legs: vec![LegDef {
                right: OptionRight::Call,
                strike: StrikeSelection::Absolute(dec!(21000)),
                quantity: -50,
                position_id: Some("p1".to_string()),
            }],
            positions,
            entry_premium: None,
            entry_time: None,
            last_eval: None,
            last_adjustment: None,
            risk: RiskLimits::default(),
        }
    }

    #[test]
    fn exit_orders_flatten_long_and_short_positions() {
        let state = state_with(vec![
            position("p1", OptionRight::Call, dec!(-50)),
            position("p2", OptionRight::Put, dec!(25)),
        ]);

        let orders = state.build_exit_orders();
        assert_eq!(orders.len(), 2);

        let short_close = orders.iter().find(|o| o.instrument.right == OptionRight::Call).unwrap();
        assert_eq!(short_close.side, OrderSide::Buy);
        assert_eq!(short_close.quantity, 50);

        let long_close = orders.iter().find(|o| o.instrument.right == OptionRight::Put).unwrap();
        assert_eq!(long_close.side, OrderSide::Sell);
        assert_eq!(long_close.quantity, 25);
    }

    #[test]
    fn flat_positions_produce_no_exit_orders() {
        let state = state_with(vec![position("p1", OptionRight::Call, dec!(0))]);
        assert!(state.build_exit_orders().is_empty());
    }

    #[test]
    fn total_pnl_sums_all_positions() {
        let state = state_with(vec![
            position("p1", OptionRight::Call, dec!(-50)),
            position("p2", OptionRight::Put, dec!(25)),
        ]);
        assert_eq!(state.total_pnl(), dec!(2000));
    }

    #[test]
    fn stale_positions_fail_the_freshness_check() {
        let mut old = position("p1", OptionRight::Call, dec!(-50));
        old.updated_at = Utc::now() - chrono::Duration::seconds(600);
        let state = state_with(vec![old]);
        assert!(!state.positions_fresh(Utc::now()));

        let empty = state_with(Vec::new());
        assert!(empty.positions_fresh(Utc::now()));
    }
}
