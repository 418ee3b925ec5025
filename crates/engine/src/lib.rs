//! Strategy engine: per-strategy state machines, the capability trait
//! concrete strategies implement, the registry that routes market ticks
//! and position updates, and the startup recovery procedure.

pub mod config;
pub mod handle;
pub mod logic;
pub mod recovery;
pub mod registry;
pub mod state;
pub mod strategies;

pub use config::{IronCondorConfig, RiskLimits, ShortStrangleConfig, StrategyConfig};
pub use handle::StrategyHandle;
pub use logic::{AdjustmentPlan, EntryDecision, EvalContext, ExitReason, StrategyLogic};
pub use recovery::{RecoveryProcedure, RecoveryReport};
pub use registry::StrategyRegistry;
pub use state::StrategyState;
pub use strategies::build_logic;
