//! Broker gateway contract.
//!
//! The broker is an unreliable, rate-limited remote service. Everything
//! behind this trait performs blocking network I/O and must never be
//! called while a strategy lock is held.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optrade_core::{OrderRequest, Position};

/// Broker-reported positions, split the way most broker APIs report them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionBook {
    /// Positions opened today.
    pub day: Vec<Position>,
    /// Net carried positions.
    pub net: Vec<Position>,
}

impl PositionBook {
    /// All positions, net first.
    pub fn all(&self) -> impl Iterator<Item = &Position> {
        self.net.iter().chain(self.day.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginSummary {
    pub available: Decimal,
    pub used: Decimal,
}

#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Place an order; returns the broker-assigned order id on acceptance.
    async fn place_order(&self, req: &OrderRequest) -> Result<String>;

    /// Cancel a previously placed order. Operator action; the executor
    /// never cancels mid-flight legs itself.
    async fn cancel_order(&self, broker_order_id: &str) -> Result<()>;

    async fn positions(&self) -> Result<PositionBook>;

    async fn margins(&self) -> Result<MarginSummary>;

    /// Kill-switch path: must not be throttled behind normal outbound
    /// rate limiting. Defaults to the normal path for brokers without a
    /// separate lane.
    async fn place_order_bypass(&self, req: &OrderRequest) -> Result<String> {
        self.place_order(req).await
    }
}
