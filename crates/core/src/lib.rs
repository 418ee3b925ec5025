pub mod config;
pub mod config_loader;
pub mod events;
pub mod instrument;
pub mod market;
pub mod order;
pub mod position;
pub mod strategy;

pub use config::{AppConfig, BrokerSettings, DatabaseConfig, EngineDefaults};
pub use config_loader::ConfigLoader;
pub use events::{
    DecisionCategory, DecisionRecord, EngineEvents, OrderNotice, PositionNotice, StrategyEvent,
};
pub use instrument::{OptionInstrument, OptionRight};
pub use market::MarketSnapshot;
pub use order::{OrderKind, OrderRequest, OrderSide, OrderValidationError, OperationPriority};
pub use position::{Greeks, Position};
pub use strategy::{
    JournalStatus, LegDef, OperationType, StrategyStatus, StrikeSelection,
};
