pub mod gateway;
pub mod paper;

pub use gateway::{BrokerGateway, MarginSummary, PositionBook};
pub use paper::PaperBroker;
