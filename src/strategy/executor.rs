use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ExecutionConfig;
use crate::domain::{OrderAmount, OrderResult, OrderSide, OrderStatus, OrderType, Symbol};
use crate::error::{GatewayError, Result};
use crate::exchange::OrderGateway;

/// A single order the cycle wants filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    /// Base-currency quantity
    pub quantity: Decimal,
    /// Reference price (the cycle's close), used as the limit price
    pub price: Decimal,
    /// Bypass the preferred order type and go straight to market
    pub immediate: bool,
}

impl OrderRequest {
    pub fn buy(symbol: Symbol, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol,
            side: OrderSide::Buy,
            quantity,
            price,
            immediate: false,
        }
    }

    pub fn sell(symbol: Symbol, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol,
            side: OrderSide::Sell,
            quantity,
            price,
            immediate: false,
        }
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }
}

/// Routes orders to the gateway using the preferred order type, falling
/// back to a market order when a limit order is rejected, times out, or
/// does not fill within the configured wait.
pub struct OrderRouter {
    gateway: Arc<dyn OrderGateway>,
    config: ExecutionConfig,
}

impl OrderRouter {
    pub fn new(gateway: Arc<dyn OrderGateway>, config: ExecutionConfig) -> Self {
        Self { gateway, config }
    }

    /// Place an order and return the gateway's acknowledgement.
    ///
    /// At most one fallback is attempted. Rate limiting is never retried.
    pub async fn execute(&self, request: &OrderRequest) -> Result<OrderResult> {
        let start = Instant::now();
        let order_type = if request.immediate {
            OrderType::Market
        } else {
            self.config.order_type
        };

        let result = match order_type {
            OrderType::Market => self.place_market(request).await,
            OrderType::Limit => self.place_limit_with_fallback(request).await,
        };

        match result {
            Ok(result) => {
                info!(
                    "{} {} {} @ {} via {} order {} ({:?}, {}ms)",
                    request.side,
                    request.quantity,
                    request.symbol,
                    request.price,
                    result.order_type,
                    result.order_id,
                    result.status,
                    start.elapsed().as_millis()
                );
                Ok(result)
            }
            Err(e) => {
                error!(
                    "{} {} {} failed: {}",
                    request.side, request.quantity, request.symbol, e
                );
                Err(e.into())
            }
        }
    }

    async fn place_limit_with_fallback(
        &self,
        request: &OrderRequest,
    ) -> std::result::Result<OrderResult, GatewayError> {
        let placed = self
            .bounded(self.gateway.place_limit_order(
                &request.symbol,
                request.side,
                request.quantity,
                request.price,
            ))
            .await;

        let order = match placed {
            Ok(order) => order,
            Err(e) if e.allows_fallback() => {
                warn!(
                    "Limit order for {} failed ({}), falling back to market",
                    request.symbol, e
                );
                return self.place_market(request).await;
            }
            Err(e) => return Err(e),
        };

        if order.status == OrderStatus::Filled {
            return Ok(order);
        }

        if self.config.limit_fill_wait_ms > 0 {
            sleep(Duration::from_millis(self.config.limit_fill_wait_ms)).await;
        }

        let status = match self
            .bounded(self.gateway.order_status(&request.symbol, &order.order_id))
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    "Status query for {} order {} failed: {}",
                    request.symbol, order.order_id, e
                );
                OrderStatus::Unknown
            }
        };

        match status {
            OrderStatus::Filled => Ok(OrderResult { status, ..order }),
            OrderStatus::Unknown => {
                warn!(
                    "Fill state of {} order {} is unknown, treating as accepted",
                    request.symbol, order.order_id
                );
                Ok(OrderResult { status, ..order })
            }
            OrderStatus::Open => {
                debug!(
                    "Limit order {} for {} still open after {}ms, cancelling",
                    order.order_id, request.symbol, self.config.limit_fill_wait_ms
                );
                // A failed cancel may still fill; a market order on top would double the exposure.
                self.bounded(self.gateway.cancel_order(&request.symbol, &order.order_id))
                    .await?;
                warn!(
                    "Limit order for {} did not fill, falling back to market",
                    request.symbol
                );
                self.place_market(request).await
            }
        }
    }

    async fn place_market(
        &self,
        request: &OrderRequest,
    ) -> std::result::Result<OrderResult, GatewayError> {
        self.bounded(self.gateway.place_market_order(
            &request.symbol,
            request.side,
            self.market_amount(request),
        ))
        .await
    }

    fn market_amount(&self, request: &OrderRequest) -> OrderAmount {
        if request.side == OrderSide::Buy && self.config.market_entry_by_notional {
            OrderAmount::Notional(request.quantity * request.price)
        } else {
            OrderAmount::Quantity(request.quantity)
        }
    }

    /// Apply the per-call timeout to a gateway future
    async fn bounded<T, F>(&self, call: F) -> std::result::Result<T, GatewayError>
    where
        F: Future<Output = std::result::Result<T, GatewayError>>,
    {
        let limit = self.config.order_timeout_ms;
        match timeout(Duration::from_millis(limit), call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout { elapsed_ms: limit }),
        }
    }
}
