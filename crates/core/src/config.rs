use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub broker: BrokerSettings,
    pub engine: EngineDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// "paper" or "live"; live requires a real gateway behind the trait.
    pub mode: String,
    pub request_timeout_secs: u64,
}

/// Engine-wide evaluation defaults; individual strategies may tighten them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDefaults {
    /// Minimum seconds between evaluations of one strategy.
    pub min_eval_interval_secs: u64,
    /// Position data older than this is considered stale.
    pub position_staleness_secs: u64,
    /// Seconds a strategy must wait between adjustments.
    pub adjustment_cooldown_secs: u64,
    /// Bounded wait for the buy phase of buy-first-then-sell execution.
    pub buy_phase_timeout_secs: u64,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            min_eval_interval_secs: 5,
            position_staleness_secs: 120,
            adjustment_cooldown_secs: 300,
            buy_phase_timeout_secs: 30,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://optrade.db".to_string(),
                max_connections: 5,
            },
            broker: BrokerSettings {
                mode: "paper".to_string(),
                request_timeout_secs: 10,
            },
            engine: EngineDefaults::default(),
        }
    }
}
