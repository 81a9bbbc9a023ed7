//! Execution handlers.
//!
//! The live handler is whatever chain-specific service gets plugged in at
//! wiring time; the paper handler fills locally at the hinted price. The
//! wrapper keeps the two physically separated so a paper configuration can
//! never reach a live endpoint.

use anyhow::Result;
use async_trait::async_trait;
use folio_core::types::{OrderFill, OrderRequest};
use folio_core::ExecutionHandler;
use uuid::Uuid;

/// Simulated execution: fills the full requested quantity at the hinted
/// price, no API calls.
#[derive(Debug, Default)]
pub struct PaperExecutionHandler;

impl PaperExecutionHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionHandler for PaperExecutionHandler {
    async fn execute_order(&self, order: OrderRequest) -> Result<OrderFill> {
        Ok(OrderFill {
            reference: format!("paper-{}", Uuid::new_v4()),
            side: order.side,
            quantity: order.quantity,
            price: order.price_hint,
            notional: (order.quantity * order.price_hint).round_dp(8),
            timestamp: order.timestamp,
        })
    }
}

/// Live or paper execution, chosen at wiring time.
pub enum ExecutionWrapper {
    /// Real order routing to the external execution service.
    Live(Box<dyn ExecutionHandler>),
    /// Local simulated fills.
    Paper(PaperExecutionHandler),
}

#[async_trait]
impl ExecutionHandler for ExecutionWrapper {
    async fn execute_order(&self, order: OrderRequest) -> Result<OrderFill> {
        match self {
            Self::Live(handler) => handler.execute_order(order).await,
            Self::Paper(handler) => handler.execute_order(order).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use folio_core::types::OrderSide;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn paper_fill_matches_request() {
        let handler = PaperExecutionHandler::new();
        let fill = handler
            .execute_order(OrderRequest {
                instrument: "SOL".to_string(),
                venue: "solana".to_string(),
                side: OrderSide::Buy,
                quantity: dec!(30),
                notional: dec!(300),
                price_hint: dec!(10),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(fill.quantity, dec!(30));
        assert_eq!(fill.notional, dec!(300));
        assert!(fill.reference.starts_with("paper-"));
    }
}
