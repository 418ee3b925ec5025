//! Paper trading gateway.
//!
//! Simulates order acceptance and a net position book without touching a
//! real broker. Failure and latency injection are scriptable per
//! instrument so executor policies and partial outcomes can be exercised
//! end to end.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info};

use optrade_core::{OrderKind, OrderRequest, OrderSide, Position};

use crate::gateway::{BrokerGateway, MarginSummary, PositionBook};

#[derive(Debug, Default)]
struct PaperState {
    /// Synthetic marks by instrument display name, used for market orders.
    marks: HashMap<String, Decimal>,
    /// Instruments whose orders are rejected.
    fail_instruments: HashSet<String>,
    /// Injected per-instrument latency before the order resolves.
    latencies: HashMap<String, Duration>,
    /// Net position per instrument display name.
    positions: HashMap<String, Position>,
    /// Accepted orders, in acceptance order.
    accepted: Vec<(String, OrderRequest)>,
    bypass_count: u64,
}

pub struct PaperBroker {
    seq: AtomicU64,
    state: Mutex<PaperState>,
    available_margin: Decimal,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(1),
            state: Mutex::new(PaperState::default()),
            available_margin: Decimal::from(1_000_000),
        }
    }

    /// Set the synthetic mark used to fill market orders for an instrument.
    pub async fn set_mark(&self, instrument: &str, price: Decimal) {
        self.state.lock().await.marks.insert(instrument.to_string(), price);
    }

    /// Reject every order for the given instrument display name.
    pub async fn fail_instrument(&self, instrument: &str) {
        self.state
            .lock()
            .await
            .fail_instruments
            .insert(instrument.to_string());
    }

    /// Delay orders for the given instrument by `latency` before resolving.
    pub async fn set_latency(&self, instrument: &str, latency: Duration) {
        self.state
            .lock()
            .await
            .latencies
            .insert(instrument.to_string(), latency);
    }

    /// Accepted orders so far, in acceptance order.
    pub async fn accepted_orders(&self) -> Vec<(String, OrderRequest)> {
        self.state.lock().await.accepted.clone()
    }

    /// Orders routed through the kill-switch bypass path.
    pub async fn bypass_count(&self) -> u64 {
        self.state.lock().await.bypass_count
    }

    async fn accept(&self, req: &OrderRequest) -> Result<String> {
        let name = req.instrument.display_name();

        let latency = self.state.lock().await.latencies.get(&name).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if state.fail_instruments.contains(&name) {
            bail!("paper broker rejected order for {name}");
        }

        let fill_price = match &req.kind {
            OrderKind::Limit { price } => *price,
            OrderKind::Market => state.marks.get(&name).copied().unwrap_or(Decimal::ZERO),
        };

        let order_id = format!(
            "PAPER-{}-{}",
            Utc::now().timestamp_millis(),
            self.seq.fetch_add(1, Ordering::SeqCst)
        );

        let signed_qty = match req.side {
            OrderSide::Buy => Decimal::from(req.quantity),
            OrderSide::Sell => -Decimal::from(req.quantity),
        };

        let position = state.positions.entry(name.clone()).or_insert_with(|| Position {
            position_id: name.clone(),
            instrument: req.instrument.clone(),
            quantity: Decimal::ZERO,
            avg_price: fill_price,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            greeks: None,
            updated_at: Utc::now(),
            strategy_id: Some(req.strategy_id.clone()),
        });
        position.quantity += signed_qty;
        position.avg_price = fill_price;
        position.updated_at = Utc::now();

        state.accepted.push((order_id.clone(), req.clone()));

        info!(
            order_id,
            instrument = name,
            side = %req.side,
            quantity = req.quantity,
            price = %fill_price,
            "Paper order accepted"
        );

        Ok(order_id)
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn place_order(&self, req: &OrderRequest) -> Result<String> {
        self.accept(req).await
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<()> {
        debug!(broker_order_id, "Paper cancel (no-op)");
        Ok(())
    }

    async fn positions(&self) -> Result<PositionBook> {
        let state = self.state.lock().await;
        let net: Vec<Position> = state
            .positions
            .values()
            .filter(|p| !p.quantity.is_zero())
            .cloned()
            .collect();
        Ok(PositionBook { day: Vec::new(), net })
    }

    async fn margins(&self) -> Result<MarginSummary> {
        Ok(MarginSummary {
            available: self.available_margin,
            used: Decimal::ZERO,
        })
    }

    async fn place_order_bypass(&self, req: &OrderRequest) -> Result<String> {
        self.state.lock().await.bypass_count += 1;
        self.accept(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optrade_core::{OptionInstrument, OptionRight};
    use rust_decimal_macros::dec;

    fn request(side: OrderSide, strike: Decimal) -> OrderRequest {
        OrderRequest {
            instrument: OptionInstrument::new(
                "NIFTY",
                NaiveDate::from_ymd_opt(2026, 9, 24).unwrap(),
                strike,
                OptionRight::Call,
            ),
            side,
            kind: OrderKind::Limit { price: dec!(100) },
            quantity: 50,
            strategy_id: "s1".to_string(),
            correlation_id: "s1-entry".to_string(),
        }
    }

    #[tokio::test]
    async fn accepts_orders_and_tracks_net_positions() {
        let broker = PaperBroker::new();
        let id = broker.place_order(&request(OrderSide::Sell, dec!(21000))).await.unwrap();
        assert!(id.starts_with("PAPER-"));

        let book = broker.positions().await.unwrap();
        assert_eq!(book.net.len(), 1);
        assert_eq!(book.net[0].quantity, dec!(-50));
    }

    #[tokio::test]
    async fn failure_injection_rejects_matching_instrument() {
        let broker = PaperBroker::new();
        let req = request(OrderSide::Buy, dec!(21000));
        broker.fail_instrument(&req.instrument.display_name()).await;

        assert!(broker.place_order(&req).await.is_err());
        assert!(broker.accepted_orders().await.is_empty());
    }

    #[tokio::test]
    async fn bypass_path_is_counted() {
        let broker = PaperBroker::new();
        broker
            .place_order_bypass(&request(OrderSide::Buy, dec!(21000)))
            .await
            .unwrap();
        assert_eq!(broker.bypass_count().await, 1);
    }

    #[tokio::test]
    async fn opposite_orders_flatten_the_position() {
        let broker = PaperBroker::new();
        broker.place_order(&request(OrderSide::Sell, dec!(21000))).await.unwrap();
        broker.place_order(&request(OrderSide::Buy, dec!(21000))).await.unwrap();

        let book = broker.positions().await.unwrap();
        assert!(book.net.is_empty());
    }
}
