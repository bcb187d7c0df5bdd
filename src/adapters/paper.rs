//! Dry-run account and order gateway
//!
//! Used whenever the engine runs without `--execute`. Every order fills
//! immediately and the most recent orders are kept in memory so a run can be
//! inspected afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{OrderAmount, OrderResult, OrderSide, OrderStatus, OrderType, Symbol};
use crate::error::{GatewayError, Result};
use crate::exchange::{AccountClient, OrderGateway};

/// A simulated order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperOrder {
    pub order_id: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: OrderAmount,
    pub limit_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Orders retained by [`PaperExchange::new`]
pub const DEFAULT_ORDER_HISTORY: usize = 10_000;

/// Simulated venue with a fixed free balance
pub struct PaperExchange {
    free_capital: Decimal,
    history_limit: usize,
    orders: Mutex<VecDeque<PaperOrder>>,
}

impl PaperExchange {
    pub fn new(free_capital: Decimal) -> Self {
        Self::with_history_limit(free_capital, DEFAULT_ORDER_HISTORY)
    }

    /// Keep at most `history_limit` orders; the oldest are evicted first.
    pub fn with_history_limit(free_capital: Decimal, history_limit: usize) -> Self {
        info!("Paper exchange ready with {} free capital", free_capital);
        Self {
            free_capital,
            history_limit: history_limit.max(1),
            orders: Mutex::new(VecDeque::new()),
        }
    }

    /// Retained orders, oldest first
    pub async fn orders(&self) -> Vec<PaperOrder> {
        self.orders.lock().await.iter().cloned().collect()
    }

    async fn record(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        order_type: OrderType,
        amount: OrderAmount,
        limit_price: Option<Decimal>,
    ) -> OrderResult {
        let order = PaperOrder {
            order_id: format!("paper-{}", Uuid::new_v4()),
            symbol: symbol.clone(),
            side,
            order_type,
            amount,
            limit_price,
            created_at: Utc::now(),
        };

        info!(
            "[DRY RUN] {} {} {:?} ({}) -> {}",
            side, symbol, amount, order_type, order.order_id
        );

        let result = OrderResult {
            order_id: order.order_id.clone(),
            order_type,
            status: OrderStatus::Filled,
        };
        let mut orders = self.orders.lock().await;
        if orders.len() >= self.history_limit {
            orders.pop_front();
        }
        orders.push_back(order);
        result
    }

    async fn find(&self, order_id: &str) -> Option<PaperOrder> {
        self.orders
            .lock()
            .await
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
    }
}

#[async_trait]
impl AccountClient for PaperExchange {
    async fn free_capital(&self, currency: &str) -> Result<Decimal> {
        debug!("[DRY RUN] free {} balance {}", currency, self.free_capital);
        Ok(self.free_capital)
    }
}

#[async_trait]
impl OrderGateway for PaperExchange {
    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: OrderAmount,
    ) -> std::result::Result<OrderResult, GatewayError> {
        Ok(self
            .record(symbol, side, OrderType::Market, amount, None)
            .await)
    }

    async fn place_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> std::result::Result<OrderResult, GatewayError> {
        Ok(self
            .record(
                symbol,
                side,
                OrderType::Limit,
                OrderAmount::Quantity(quantity),
                Some(price),
            )
            .await)
    }

    async fn order_status(
        &self,
        _symbol: &Symbol,
        order_id: &str,
    ) -> std::result::Result<OrderStatus, GatewayError> {
        Ok(match self.find(order_id).await {
            Some(_) => OrderStatus::Filled,
            None => OrderStatus::Unknown,
        })
    }

    async fn cancel_order(
        &self,
        _symbol: &Symbol,
        order_id: &str,
    ) -> std::result::Result<(), GatewayError> {
        match self.find(order_id).await {
            Some(_) => Err(GatewayError::Rejected(format!(
                "paper order {order_id} already filled"
            ))),
            None => Err(GatewayError::Rejected(format!(
                "unknown paper order {order_id}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn orders_fill_immediately_and_are_recorded() {
        let exchange = PaperExchange::new(dec!(1000));
        let symbol = Symbol::new("ETH", "USD");

        let market = exchange
            .place_market_order(&symbol, OrderSide::Buy, OrderAmount::Quantity(dec!(2)))
            .await
            .expect("paper market order");
        let limit = exchange
            .place_limit_order(&symbol, OrderSide::Sell, dec!(2), dec!(105))
            .await
            .expect("paper limit order");

        assert_eq!(market.status, OrderStatus::Filled);
        assert!(market.order_id.starts_with("paper-"));
        assert_ne!(market.order_id, limit.order_id);

        let orders = exchange.orders().await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].limit_price, Some(dec!(105)));
        assert_eq!(
            exchange
                .order_status(&symbol, &limit.order_id)
                .await
                .expect("status"),
            OrderStatus::Filled
        );
    }

    #[tokio::test]
    async fn reports_configured_capital_for_any_currency() {
        let exchange = PaperExchange::new(dec!(250));
        assert_eq!(exchange.free_capital("USD").await.expect("balance"), dec!(250));
        assert_eq!(exchange.free_capital("USDC").await.expect("balance"), dec!(250));
    }

    #[tokio::test]
    async fn cancelling_a_filled_order_is_rejected() {
        let exchange = PaperExchange::new(dec!(1000));
        let symbol = Symbol::new("BTC", "USD");
        let order = exchange
            .place_market_order(&symbol, OrderSide::Buy, OrderAmount::Notional(dec!(100)))
            .await
            .expect("paper market order");

        assert!(exchange.cancel_order(&symbol, &order.order_id).await.is_err());
        assert_eq!(
            exchange.order_status(&symbol, "missing").await.expect("status"),
            OrderStatus::Unknown
        );
    }

    #[tokio::test]
    async fn history_keeps_only_the_most_recent_orders() {
        let exchange = PaperExchange::with_history_limit(dec!(1000), 2);
        let symbol = Symbol::new("SOL", "USD");

        let mut ids = Vec::new();
        for qty in [dec!(1), dec!(2), dec!(3)] {
            let order = exchange
                .place_market_order(&symbol, OrderSide::Buy, OrderAmount::Quantity(qty))
                .await
                .expect("paper market order");
            ids.push(order.order_id);
        }

        let orders = exchange.orders().await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].amount, OrderAmount::Quantity(dec!(2)));
        assert_eq!(orders[1].amount, OrderAmount::Quantity(dec!(3)));
        assert_eq!(
            exchange.order_status(&symbol, &ids[0]).await.expect("status"),
            OrderStatus::Unknown
        );
    }
}
