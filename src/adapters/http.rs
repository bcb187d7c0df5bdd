//! HTTP collaborators: indicator feed, account balances, and order gateway
//!
//! Endpoints (all JSON, decimals as strings or numbers):
//! - `GET  {feed}/snapshot/{BASE}-{QUOTE}`
//! - `GET  {account}/balance/{CURRENCY}` -> `{"free": "..."}`
//! - `POST {gateway}/orders`
//! - `GET  {gateway}/orders/{id}?symbol={BASE}-{QUOTE}`
//! - `DELETE {gateway}/orders/{id}?symbol={BASE}-{QUOTE}`

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    MarketSnapshot, OrderAmount, OrderResult, OrderSide, OrderStatus, OrderType, Symbol,
};
use crate::error::{GatewayError, RatchetError, Result};
use crate::exchange::{AccountClient, IndicatorFeed, OrderGateway};

const USER_AGENT: &str = "ratchet/0.1";

fn build_client(timeout_ms: u64) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_millis(timeout_ms))
        .build()?)
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Indicator snapshots served over HTTP
#[derive(Clone)]
pub struct HttpIndicatorFeed {
    http: Client,
    base_url: String,
}

impl HttpIndicatorFeed {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout_ms)?,
            base_url: normalize_base_url(base_url),
        })
    }
}

#[async_trait]
impl IndicatorFeed for HttpIndicatorFeed {
    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot> {
        let url = format!("{}/snapshot/{}", self.base_url, symbol.path_segment());
        let unavailable = |reason: String| RatchetError::DataUnavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {status}: {body}")));
        }

        let snapshot = resp
            .json::<MarketSnapshot>()
            .await
            .map_err(|e| unavailable(format!("invalid snapshot: {e}")))?;
        debug!("Snapshot for {}: {:?}", symbol, snapshot);
        Ok(snapshot)
    }
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    free: Decimal,
}

/// Free balances served over HTTP
#[derive(Clone)]
pub struct HttpAccountClient {
    http: Client,
    base_url: String,
}

impl HttpAccountClient {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout_ms)?,
            base_url: normalize_base_url(base_url),
        })
    }
}

#[async_trait]
impl AccountClient for HttpAccountClient {
    async fn free_capital(&self, currency: &str) -> Result<Decimal> {
        let currency = currency.to_ascii_uppercase();
        let url = format!("{}/balance/{}", self.base_url, currency);
        let unavailable = |reason: String| RatchetError::BalanceUnavailable {
            currency: currency.clone(),
            reason,
        };

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .json::<BalanceBody>()
            .await
            .map_err(|e| unavailable(format!("invalid balance: {e}")))?;
        Ok(body.free)
    }
}

#[derive(Debug, Serialize)]
struct OrderBody {
    client_order_id: String,
    symbol: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<OrderAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct OrderAck {
    id: String,
    #[serde(default)]
    status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: OrderStatus,
}

/// Order placement over HTTP
#[derive(Clone)]
pub struct HttpOrderGateway {
    http: Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpOrderGateway {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout_ms)?,
            base_url: normalize_base_url(base_url),
            timeout_ms,
        })
    }

    fn send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                elapsed_ms: self.timeout_ms,
            }
        } else {
            GatewayError::Rejected(err.to_string())
        }
    }

    /// Map non-success responses onto gateway failures
    async fn check(&self, resp: Response) -> std::result::Result<Response, GatewayError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, body, self.timeout_ms))
    }

    async fn submit(&self, body: OrderBody) -> std::result::Result<OrderResult, GatewayError> {
        let url = format!("{}/orders", self.base_url);
        let order_type = body.order_type;

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let resp = self.check(resp).await?;

        let ack = resp
            .json::<OrderAck>()
            .await
            .map_err(|e| GatewayError::Rejected(format!("invalid order response: {e}")))?;

        Ok(OrderResult {
            order_id: ack.id,
            order_type,
            status: ack.status.unwrap_or(OrderStatus::Unknown),
        })
    }
}

fn classify_status(status: StatusCode, body: String, timeout_ms: u64) -> GatewayError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited(body),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GatewayError::Timeout {
            elapsed_ms: timeout_ms,
        },
        _ => {
            if status.is_server_error() {
                warn!("Order gateway server error {}: {}", status, body);
            }
            GatewayError::Rejected(format!("HTTP {status}: {body}"))
        }
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: OrderAmount,
    ) -> std::result::Result<OrderResult, GatewayError> {
        self.submit(OrderBody {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            amount: Some(amount),
            quantity: None,
            price: None,
        })
        .await
    }

    async fn place_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> std::result::Result<OrderResult, GatewayError> {
        self.submit(OrderBody {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            amount: None,
            quantity: Some(quantity),
            price: Some(price),
        })
        .await
    }

    async fn order_status(
        &self,
        symbol: &Symbol,
        order_id: &str,
    ) -> std::result::Result<OrderStatus, GatewayError> {
        let url = format!("{}/orders/{}", self.base_url, order_id);
        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol.path_segment())])
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let resp = self.check(resp).await?;

        match resp.json::<StatusBody>().await {
            Ok(body) => Ok(body.status),
            Err(e) => {
                warn!("Unreadable status for order {}: {}", order_id, e);
                Ok(OrderStatus::Unknown)
            }
        }
    }

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: &str,
    ) -> std::result::Result<(), GatewayError> {
        let url = format!("{}/orders/{}", self.base_url, order_id);
        let resp = self
            .http
            .delete(&url)
            .query(&[("symbol", symbol.path_segment())])
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        self.check(resp).await?;
        Ok(())
    }
}
