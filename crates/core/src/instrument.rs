//! Option instrument identification.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// A single option contract the engine can trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionInstrument {
    pub underlying: String,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub right: OptionRight,
}

impl OptionInstrument {
    pub fn new(underlying: &str, expiry: NaiveDate, strike: Decimal, right: OptionRight) -> Self {
        Self {
            underlying: underlying.to_uppercase(),
            expiry,
            strike,
            right,
        }
    }

    /// Human-readable contract description (e.g., "NIFTY 21000C 2026-09-24").
    pub fn display_name(&self) -> String {
        format!("{} {}{} {}", self.underlying, self.strike, self.right, self.expiry)
    }

    /// Days until expiration, measured from `today`.
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry - today).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn display_name_includes_strike_and_right() {
        let expiry = NaiveDate::from_ymd_opt(2026, 9, 24).unwrap();
        let inst = OptionInstrument::new("nifty", expiry, dec!(21000), OptionRight::Call);
        assert_eq!(inst.display_name(), "NIFTY 21000C 2026-09-24");
    }

    #[test]
    fn days_to_expiry_counts_calendar_days() {
        let expiry = NaiveDate::from_ymd_opt(2026, 9, 24).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 9, 17).unwrap();
        let inst = OptionInstrument::new("NIFTY", expiry, dec!(21000), OptionRight::Put);
        assert_eq!(inst.days_to_expiry(today), 7);
    }
}
