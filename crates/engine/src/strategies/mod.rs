//! Concrete strategy variants.

pub mod iron_condor;
pub mod short_strangle;

use std::sync::Arc;
use std::time::Duration;

use optrade_core::EngineDefaults;

use crate::config::StrategyConfig;
use crate::logic::StrategyLogic;

pub use iron_condor::IronCondor;
pub use short_strangle::ShortStrangle;

/// Instantiates the logic for a decoded config.
pub fn build_logic(config: &StrategyConfig, defaults: &EngineDefaults) -> Arc<dyn StrategyLogic> {
    match config {
        StrategyConfig::ShortStrangle(c) => Arc::new(ShortStrangle::new(c.clone())),
        StrategyConfig::IronCondor(c) => Arc::new(IronCondor::new(
            c.clone(),
            Duration::from_secs(defaults.buy_phase_timeout_secs),
        )),
    }
}
