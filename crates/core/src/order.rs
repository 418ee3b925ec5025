//! Order requests submitted to the multi-leg executor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::instrument::OptionInstrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit { price: Decimal },
}

/// Outbound rate policy for an operation. `KillSwitch` routes through the
/// broker's bypass path so a flatten-everything order is never throttled
/// behind normal traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperationPriority {
    #[default]
    Normal,
    KillSwitch,
}

/// A single leg of a multi-leg operation.
///
/// `correlation_id` ties the legs of one logical operation together for
/// the caller; the executor assigns its own durable group id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: OptionInstrument,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Contract quantity in lots; always positive, side carries direction.
    pub quantity: u32,
    pub strategy_id: String,
    pub correlation_id: String,
}

/// Malformed requests are rejected synchronously, before any journal
/// write or broker call.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderValidationError {
    #[error("order quantity must be positive")]
    ZeroQuantity,
    #[error("limit order requires a positive price")]
    MissingLimitPrice,
    #[error("order is missing a strategy id")]
    MissingStrategyId,
}

impl OrderRequest {
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.quantity == 0 {
            return Err(OrderValidationError::ZeroQuantity);
        }
        if let OrderKind::Limit { price } = &self.kind {
            if *price <= Decimal::ZERO {
                return Err(OrderValidationError::MissingLimitPrice);
            }
        }
        if self.strategy_id.is_empty() {
            return Err(OrderValidationError::MissingStrategyId);
        }
        Ok(())
    }
}
