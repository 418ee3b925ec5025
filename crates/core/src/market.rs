//! Market snapshots delivered to strategy evaluation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Minimal point-in-time market view built by the tick router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub underlying: String,
    pub spot: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Implied volatility, when the feed provides one.
    pub implied_vol: Option<f64>,
}

impl MarketSnapshot {
    pub fn new(underlying: &str, spot: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            underlying: underlying.to_uppercase(),
            spot,
            timestamp,
            implied_vol: None,
        }
    }

    pub fn with_implied_vol(mut self, iv: f64) -> Self {
        self.implied_vol = Some(iv);
        self
    }
}
