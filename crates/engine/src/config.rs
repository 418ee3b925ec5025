//! Deployable strategy configurations.
//!
//! One tagged enum covers every strategy variant; the `type` field is
//! the discriminator and the whole value is what `strategies.config_json`
//! stores, so a persisted config decodes back to the exact variant.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optrade_core::StrikeSelection;

/// Risk knobs shared by every strategy variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Close the strategy once total P&L reaches this.
    pub pnl_target: Option<Decimal>,
    /// Close the strategy once total P&L falls to this (negative).
    pub pnl_stop: Option<Decimal>,
    /// Auto-pause floor; breach pauses instead of closing.
    pub auto_pause_pnl_floor: Option<Decimal>,
    /// Auto-pause when |net delta| exceeds this.
    pub auto_pause_delta_ceiling: Option<f64>,
    #[serde(default = "default_eval_interval")]
    pub min_eval_interval_secs: u64,
    #[serde(default = "default_staleness")]
    pub position_staleness_secs: u64,
    #[serde(default = "default_cooldown")]
    pub adjustment_cooldown_secs: u64,
    /// Exit once days-to-expiry drops below this.
    #[serde(default)]
    pub min_dte: i64,
}

fn default_eval_interval() -> u64 {
    5
}

fn default_staleness() -> u64 {
    120
}

fn default_cooldown() -> u64 {
    300
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            pnl_target: None,
            pnl_stop: None,
            auto_pause_pnl_floor: None,
            auto_pause_delta_ceiling: None,
            min_eval_interval_secs: default_eval_interval(),
            position_staleness_secs: default_staleness(),
            adjustment_cooldown_secs: default_cooldown(),
            min_dte: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortStrangleConfig {
    pub underlying: String,
    pub expiry: NaiveDate,
    /// Lots per leg.
    pub quantity: u32,
    pub call_strike: StrikeSelection,
    pub put_strike: StrikeSelection,
    /// Strike grid step for ATM/offset resolution.
    #[serde(default = "default_strike_step")]
    pub strike_step: Decimal,
    /// Enter only while spot is inside this band, if set.
    pub entry_spot_floor: Option<Decimal>,
    pub entry_spot_cap: Option<Decimal>,
    /// Roll the tested side once |net delta| exceeds this.
    pub roll_delta_trigger: Option<f64>,
    /// How far the rolled strike moves away from spot.
    #[serde(default = "default_roll_step")]
    pub roll_step: Decimal,
    #[serde(default)]
    pub risk: RiskLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IronCondorConfig {
    pub underlying: String,
    pub expiry: NaiveDate,
    /// Lots per leg.
    pub quantity: u32,
    pub short_call: StrikeSelection,
    pub short_put: StrikeSelection,
    pub long_call: StrikeSelection,
    pub long_put: StrikeSelection,
    #[serde(default = "default_strike_step")]
    pub strike_step: Decimal,
    #[serde(default)]
    pub risk: RiskLimits,
}

fn default_strike_step() -> Decimal {
    Decimal::from(50)
}

fn default_roll_step() -> Decimal {
    Decimal::from(200)
}

/// Tagged union persisted in `strategies.config_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    ShortStrangle(ShortStrangleConfig),
    IronCondor(IronCondorConfig),
}

impl StrategyConfig {
    pub fn strategy_type(&self) -> &'static str {
        match self {
            Self::ShortStrangle(_) => "short_strangle",
            Self::IronCondor(_) => "iron_condor",
        }
    }

    pub fn underlying(&self) -> &str {
        match self {
            Self::ShortStrangle(c) => &c.underlying,
            Self::IronCondor(c) => &c.underlying,
        }
    }

    pub fn expiry(&self) -> NaiveDate {
        match self {
            Self::ShortStrangle(c) => c.expiry,
            Self::IronCondor(c) => c.expiry,
        }
    }

    pub fn risk(&self) -> &RiskLimits {
        match self {
            Self::ShortStrangle(c) => &c.risk,
            Self::IronCondor(c) => &c.risk,
        }
    }
}

/// Resolves a strike selection against spot, snapped to the strike grid.
pub fn resolve_strike(selection: &StrikeSelection, spot: Decimal, step: Decimal) -> Decimal {
    let raw = match selection {
        StrikeSelection::Absolute(strike) => return *strike,
        StrikeSelection::Atm => spot,
        StrikeSelection::OffsetFromSpot(offset) => spot + *offset,
    };
    if step.is_zero() {
        return raw;
    }
    (raw / step).round() * step
}
