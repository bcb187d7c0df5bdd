//! In-memory collaborators for driving the orchestrator in tests
#![allow(dead_code)]

use async_trait::async_trait;
use ratchet::config::AppConfig;
use ratchet::domain::{
    MarketSnapshot, OrderAmount, OrderResult, OrderSide, OrderStatus, OrderType, Symbol,
};
use ratchet::error::{GatewayError, RatchetError, Result};
use ratchet::exchange::{AccountClient, Collaborators, ExecutionMode, IndicatorFeed, OrderGateway};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn eth() -> Symbol {
    Symbol::new("ETH", "USD")
}

pub fn btc() -> Symbol {
    Symbol::new("BTC", "USD")
}

/// Snapshot that passes every entry filter at `close`
pub fn entry_snapshot(close: Decimal, volatility: Decimal) -> MarketSnapshot {
    MarketSnapshot {
        close,
        trend_average: close / dec!(1.05),
        momentum: dec!(60),
        volatility,
        trend_slope: dec!(1),
        volume_ratio: dec!(1.2),
    }
}

/// Snapshot that fails the momentum filter
pub fn quiet_snapshot(close: Decimal, volatility: Decimal) -> MarketSnapshot {
    MarketSnapshot {
        momentum: dec!(40),
        ..entry_snapshot(close, volatility)
    }
}

/// Feed replaying queued snapshots per symbol; `None` entries and empty
/// queues are reported as unavailable data.
#[derive(Default)]
pub struct ScriptedFeed {
    queues: Mutex<HashMap<Symbol, VecDeque<Option<MarketSnapshot>>>>,
    delay: Option<Duration>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push(&self, symbol: &Symbol, snapshot: MarketSnapshot) {
        self.push_raw(symbol, Some(snapshot));
    }

    pub fn push_missing(&self, symbol: &Symbol) {
        self.push_raw(symbol, None);
    }

    fn push_raw(&self, symbol: &Symbol, snapshot: Option<MarketSnapshot>) {
        self.queues
            .lock()
            .expect("feed lock")
            .entry(symbol.clone())
            .or_default()
            .push_back(snapshot);
    }
}

#[async_trait]
impl IndicatorFeed for ScriptedFeed {
    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .queues
            .lock()
            .expect("feed lock")
            .get_mut(symbol)
            .and_then(|queue| queue.pop_front())
            .flatten();

        next.ok_or_else(|| RatchetError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "no snapshot scripted".to_string(),
        })
    }
}

/// Account returning a fixed balance and counting reads
pub struct CountingAccount {
    free: Mutex<Option<Decimal>>,
    calls: AtomicUsize,
}

impl CountingAccount {
    pub fn new(free: Decimal) -> Self {
        Self {
            free: Mutex::new(Some(free)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_unavailable(&self) {
        *self.free.lock().expect("account lock") = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountClient for CountingAccount {
    async fn free_capital(&self, currency: &str) -> Result<Decimal> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let free = *self.free.lock().expect("account lock");
        free.ok_or_else(|| RatchetError::BalanceUnavailable {
            currency: currency.to_string(),
            reason: "account service down".to_string(),
        })
    }
}

/// A placed order as seen by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: OrderAmount,
}

/// Gateway recording every order; can be switched to reject everything
#[derive(Default)]
pub struct RecordingGateway {
    orders: Mutex<Vec<PlacedOrder>>,
    reject: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().expect("gateway lock").clone()
    }

    fn record(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        order_type: OrderType,
        amount: OrderAmount,
    ) -> std::result::Result<OrderResult, GatewayError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("venue closed".to_string()));
        }

        let mut orders = self.orders.lock().expect("gateway lock");
        orders.push(PlacedOrder {
            symbol: symbol.clone(),
            side,
            order_type,
            amount,
        });
        Ok(OrderResult {
            order_id: format!("order-{}", orders.len()),
            order_type,
            status: OrderStatus::Filled,
        })
    }
}

#[async_trait]
impl OrderGateway for RecordingGateway {
    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: OrderAmount,
    ) -> std::result::Result<OrderResult, GatewayError> {
        self.record(symbol, side, OrderType::Market, amount)
    }

    async fn place_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
        _price: Decimal,
    ) -> std::result::Result<OrderResult, GatewayError> {
        self.record(symbol, side, OrderType::Limit, OrderAmount::Quantity(quantity))
    }

    async fn order_status(
        &self,
        _symbol: &Symbol,
        _order_id: &str,
    ) -> std::result::Result<OrderStatus, GatewayError> {
        Ok(OrderStatus::Filled)
    }

    async fn cancel_order(
        &self,
        _symbol: &Symbol,
        _order_id: &str,
    ) -> std::result::Result<(), GatewayError> {
        Ok(())
    }
}

/// Fakes wired into a test harness
pub struct Harness {
    pub config: AppConfig,
    pub feed: Arc<ScriptedFeed>,
    pub account: Arc<CountingAccount>,
    pub gateway: Arc<RecordingGateway>,
}

impl Harness {
    pub fn new(symbols: Vec<Symbol>, free_capital: Decimal) -> Self {
        Self::with_feed(symbols, free_capital, ScriptedFeed::new())
    }

    pub fn with_feed(symbols: Vec<Symbol>, free_capital: Decimal, feed: ScriptedFeed) -> Self {
        let mut config = AppConfig::default_config(symbols);
        config.execution.limit_fill_wait_ms = 0;
        config.execution.order_timeout_ms = 1_000;

        Self {
            config,
            feed: Arc::new(feed),
            account: Arc::new(CountingAccount::new(free_capital)),
            gateway: Arc::new(RecordingGateway::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            mode: ExecutionMode::Paper,
            feed: self.feed.clone(),
            account: self.account.clone(),
            gateway: self.gateway.clone(),
        }
    }
}
