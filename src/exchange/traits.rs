use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{MarketSnapshot, OrderAmount, OrderResult, OrderSide, OrderStatus, Symbol};
use crate::error::{GatewayError, Result};

/// Whether orders reach a real venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Paper,
    Live,
}

impl ExecutionMode {
    pub fn from_execute_flag(execute: bool) -> Self {
        if execute {
            Self::Live
        } else {
            Self::Paper
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source of computed indicator snapshots
#[async_trait]
pub trait IndicatorFeed: Send + Sync {
    /// Latest snapshot for `symbol`, or `DataUnavailable`
    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot>;
}

/// Account balances
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Free (unallocated) capital in `currency`, or `BalanceUnavailable`
    async fn free_capital(&self, currency: &str) -> Result<Decimal>;
}

/// Order placement on a venue
///
/// Quantities are in the base currency, notionals and prices in the quote
/// currency of `symbol`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: OrderAmount,
    ) -> std::result::Result<OrderResult, GatewayError>;

    async fn place_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> std::result::Result<OrderResult, GatewayError>;

    async fn order_status(
        &self,
        symbol: &Symbol,
        order_id: &str,
    ) -> std::result::Result<OrderStatus, GatewayError>;

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: &str,
    ) -> std::result::Result<(), GatewayError>;
}
