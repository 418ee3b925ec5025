//! Broker-reported position snapshots.
//!
//! Positions are owned by the broker; the engine only caches the latest
//! snapshot and reacts to updates routed through the registry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::instrument::OptionInstrument;

/// Option greeks snapshot, when the broker provides them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub instrument: OptionInstrument,
    /// Signed quantity: positive = long, negative = short.
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub greeks: Option<Greeks>,
    pub updated_at: DateTime<Utc>,
    /// Owning strategy, if the engine has allocated this position.
    pub strategy_id: Option<String>,
}

impl Position {
    /// Combined realized and unrealized P&L.
    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl
    }

    /// Delta contribution weighted by signed quantity, when greeks exist.
    pub fn weighted_delta(&self) -> Option<f64> {
        let qty: f64 = self.quantity.try_into().ok()?;
        self.greeks.map(|g| g.delta * qty)
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::OptionRight;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn position(quantity: Decimal, delta: f64) -> Position {
        Position {
            position_id: "pos-1".to_string(),
            instrument: OptionInstrument::new(
                "NIFTY",
                NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
                dec!(21000),
                OptionRight::Call,
            ),
            quantity,
            avg_price: dec!(100),
            realized_pnl: dec!(250),
            unrealized_pnl: dec!(-100),
            greeks: Some(Greeks { delta, ..Greeks::default() }),
            updated_at: Utc::now(),
            strategy_id: Some("strangle-1".to_string()),
        }
    }

    #[test]
    fn total_pnl_sums_realized_and_unrealized() {
        assert_eq!(position(dec!(-50), 0.4).total_pnl(), dec!(150));
    }

    #[test]
    fn weighted_delta_uses_signed_quantity() {
        let delta = position(dec!(-50), 0.4).weighted_delta().unwrap();
        assert!((delta - (-20.0)).abs() < 1e-9);
    }

    #[test]
    fn short_detection() {
        assert!(position(dec!(-50), 0.4).is_short());
        assert!(!position(dec!(50), 0.4).is_short());
    }
}
