//! Cycle Orchestrator
//!
//! Drives one decision cycle per tick over every configured symbol, in
//! configuration order. Each symbol owns exactly one [`PositionState`] for the
//! whole run. Errors are caught per symbol and collected in the
//! [`CycleReport`]; they never abort the cycle or the loop.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::entry::{EntryEngine, EntryVerdict};
use super::executor::{OrderRequest, OrderRouter};
use super::exit::PositionMachine;
use super::risk::{RiskAllocator, RiskBudget, Sizing};
use super::volatility::{Classification, VolatilityClassifier};
use crate::config::{AppConfig, RiskConfig};
use crate::coordination::{GracefulShutdown, ShutdownSignal};
use crate::domain::{ExitReason, MarketSnapshot, PositionState, Symbol, SymbolStatus};
use crate::error::{RatchetError, Result};
use crate::exchange::{AccountClient, Collaborators, ExecutionMode, IndicatorFeed};

/// A per-symbol failure caught during a cycle
#[derive(Debug)]
pub struct SymbolFailure {
    pub symbol: Symbol,
    pub error: RatchetError,
}

/// Everything that happened in one cycle
#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub statuses: Vec<SymbolStatus>,
    pub failures: Vec<SymbolFailure>,
    /// Shutdown was requested before every symbol was visited
    pub interrupted: bool,
}

impl CycleReport {
    pub fn status(&self, symbol: &Symbol) -> Option<&SymbolStatus> {
        self.statuses.iter().find(|s| &s.symbol == symbol)
    }

    pub fn failure(&self, symbol: &Symbol) -> Option<&RatchetError> {
        self.failures
            .iter()
            .find(|f| &f.symbol == symbol)
            .map(|f| &f.error)
    }

    /// Exits fired this cycle, including those whose close order failed
    pub fn exits(&self) -> impl Iterator<Item = (&Symbol, ExitReason)> {
        self.statuses
            .iter()
            .filter_map(|s| s.reason_if_closed.map(|reason| (&s.symbol, reason)))
    }
}

/// Balance reads for one tick, keyed by quote currency.
///
/// Failures are cached too so a dead account service costs one call per tick.
#[derive(Debug, Default)]
struct BalanceCache {
    reads: HashMap<String, std::result::Result<Decimal, String>>,
}

/// Result of processing one symbol
struct SymbolOutcome {
    status: Option<SymbolStatus>,
    error: Option<RatchetError>,
}

impl SymbolOutcome {
    fn status(status: SymbolStatus) -> Self {
        Self {
            status: Some(status),
            error: None,
        }
    }

    fn failed(error: RatchetError) -> Self {
        Self {
            status: None,
            error: Some(error),
        }
    }
}

/// Multi-symbol decision loop
pub struct CycleOrchestrator {
    symbols: Vec<Symbol>,
    positions: HashMap<Symbol, PositionState>,
    mode: ExecutionMode,
    feed: Arc<dyn IndicatorFeed>,
    account: Arc<dyn AccountClient>,
    router: OrderRouter,
    entry: EntryEngine,
    classifier: VolatilityClassifier,
    machine: PositionMachine,
    allocator: RiskAllocator,
    risk: RiskConfig,
    check_interval: Duration,
    read_timeout: Duration,
    shutdown: Arc<GracefulShutdown>,
    cycles: u64,
}

impl CycleOrchestrator {
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Self {
        let symbols = config.engine.symbols.clone();
        let positions = symbols
            .iter()
            .map(|symbol| (symbol.clone(), PositionState::flat()))
            .collect();

        Self {
            allocator: RiskAllocator::new(&config.risk, symbols.len()),
            symbols,
            positions,
            mode: collaborators.mode,
            feed: collaborators.feed,
            account: collaborators.account,
            router: OrderRouter::new(collaborators.gateway, config.execution.clone()),
            entry: EntryEngine::new(config.entry.clone()),
            classifier: VolatilityClassifier::new(&config.exit),
            machine: PositionMachine::new(),
            risk: config.risk.clone(),
            check_interval: Duration::from_secs(config.engine.check_interval_secs),
            read_timeout: Duration::from_millis(config.engine.feed_timeout_ms),
            shutdown: Arc::new(GracefulShutdown::new()),
            cycles: 0,
        }
    }

    /// Share a shutdown coordinator with the signal handlers
    pub fn with_shutdown(mut self, shutdown: Arc<GracefulShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&PositionState> {
        self.positions.get(symbol)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Symbols currently holding a position, in configuration order
    pub fn open_positions(&self) -> Vec<(&Symbol, &PositionState)> {
        self.symbols
            .iter()
            .filter_map(|symbol| {
                self.positions
                    .get(symbol)
                    .filter(|state| !state.is_flat())
                    .map(|state| (symbol, state))
            })
            .collect()
    }

    /// Run cycles until shutdown, or until `max_cycles` have completed.
    pub async fn run(&mut self, max_cycles: Option<u64>) {
        let mut signals = self.shutdown.subscribe();
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Decision loop started: {} symbols every {}s ({} mode)",
            self.symbols.len(),
            self.check_interval.as_secs(),
            self.mode
        );

        loop {
            if self.shutdown.is_shutdown_requested() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                signal = signals.recv() => {
                    let signal = signal.unwrap_or(ShutdownSignal::Urgent);
                    info!("Stopping decision loop ({} shutdown)", signal);
                    break;
                }
            }

            let report = self.run_cycle().await;
            if report.interrupted {
                break;
            }

            if max_cycles.is_some_and(|max| self.cycles >= max) {
                info!("Completed {} cycles", self.cycles);
                break;
            }
        }

        self.log_open_positions();
    }

    /// Run a single decision cycle over every symbol
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            started_at: Utc::now(),
            statuses: Vec::with_capacity(self.symbols.len()),
            failures: Vec::new(),
            interrupted: false,
        };
        let mut balances = BalanceCache::default();

        debug!("Cycle {} started", report.cycle);

        for symbol in self.symbols.clone() {
            if self.shutdown.is_shutdown_requested() {
                warn!("Shutdown requested, skipping remaining symbols from {}", symbol);
                report.interrupted = true;
                break;
            }

            let mut state = self.positions.get(&symbol).cloned().unwrap_or_default();
            let outcome = self.process_symbol(&symbol, &mut state, &mut balances).await;
            self.positions.insert(symbol.clone(), state);

            if let Some(status) = outcome.status {
                report.statuses.push(status);
            }
            if let Some(error) = outcome.error {
                report.failures.push(SymbolFailure { symbol, error });
            }
        }

        debug!(
            "Cycle {} finished: {} statuses, {} failures",
            report.cycle,
            report.statuses.len(),
            report.failures.len()
        );
        report
    }

    async fn process_symbol(
        &self,
        symbol: &Symbol,
        state: &mut PositionState,
        balances: &mut BalanceCache,
    ) -> SymbolOutcome {
        let snapshot = match self.fetch_snapshot(symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Skipping {}: {}", symbol, e);
                return SymbolOutcome::failed(e);
            }
        };
        let classification = self.classifier.classify(&snapshot);

        info!(
            "{} | price {} | momentum {} | stop {} | {} ({})",
            symbol,
            snapshot.close,
            snapshot.momentum,
            state.stop_price(),
            state.phase(),
            classification.regime
        );

        if state.is_flat() {
            self.try_enter(symbol, state, &snapshot, &classification, balances)
                .await
        } else {
            self.manage_position(symbol, state, &snapshot, &classification)
                .await
        }
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot> {
        let snapshot = timeout(self.read_timeout, self.feed.snapshot(symbol))
            .await
            .map_err(|_| RatchetError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("feed timed out after {}ms", self.read_timeout.as_millis()),
            })??;

        snapshot
            .check_range()
            .map_err(|reason| RatchetError::DataUnavailable {
                symbol: symbol.to_string(),
                reason,
            })?;
        Ok(snapshot)
    }

    /// Free capital for `currency`, read at most once per tick
    async fn free_capital(&self, currency: &str, balances: &mut BalanceCache) -> Result<Decimal> {
        if let Some(read) = balances.reads.get(currency) {
            return read.clone().map_err(|reason| RatchetError::BalanceUnavailable {
                currency: currency.to_string(),
                reason,
            });
        }

        let read = match timeout(self.read_timeout, self.account.free_capital(currency)).await {
            Ok(Ok(capital)) => Ok(capital),
            Ok(Err(RatchetError::BalanceUnavailable { reason, .. })) => Err(reason),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "balance read timed out after {}ms",
                self.read_timeout.as_millis()
            )),
        };

        match &read {
            Ok(capital) => debug!("Free {} capital for this tick: {}", currency, capital),
            Err(reason) => warn!(
                "Balance unavailable for {}, entries skipped this tick: {}",
                currency, reason
            ),
        }

        balances.reads.insert(currency.to_string(), read.clone());
        read.map_err(|reason| RatchetError::BalanceUnavailable {
            currency: currency.to_string(),
            reason,
        })
    }

    async fn try_enter(
        &self,
        symbol: &Symbol,
        state: &mut PositionState,
        snapshot: &MarketSnapshot,
        classification: &Classification,
        balances: &mut BalanceCache,
    ) -> SymbolOutcome {
        let status_of = |state: &PositionState| SymbolStatus {
            symbol: symbol.clone(),
            phase: state.phase(),
            price: snapshot.close,
            stop_price: state.stop_price(),
            reason_if_closed: None,
        };

        if let EntryVerdict::Reject(filter) = self.entry.evaluate(snapshot) {
            debug!("{} entry rejected by {} filter", symbol, filter);
            return SymbolOutcome::status(status_of(state));
        }

        let free_capital = match self.free_capital(symbol.quote(), balances).await {
            Ok(capital) => capital,
            Err(e) => {
                return SymbolOutcome {
                    status: Some(status_of(state)),
                    error: Some(e),
                }
            }
        };

        let budget = RiskBudget::new(&self.risk, free_capital);
        let allocation = match self.allocator.size(&budget, snapshot.close) {
            Sizing::Sized(allocation) => allocation,
            Sizing::TooSmall { margin_used } => {
                info!(
                    "{} entry signal skipped: margin {} {} below minimum order size {}",
                    symbol,
                    margin_used,
                    symbol.quote(),
                    self.risk.min_order_size
                );
                return SymbolOutcome::status(status_of(state));
            }
        };

        info!(
            "{} ENTRY signal @ {}: qty {} (margin {}, value {} {})",
            symbol,
            snapshot.close,
            allocation.quantity,
            allocation.margin_used,
            allocation.position_value,
            symbol.quote()
        );

        let request = OrderRequest::buy(symbol.clone(), allocation.quantity, snapshot.close);
        match self.router.execute(&request).await {
            Ok(order) => {
                self.machine
                    .open(state, snapshot, classification, allocation.quantity);
                info!(
                    "{} LONG {} {} @ {} (order {}), stop {}",
                    symbol,
                    state.quantity(),
                    symbol.base(),
                    state.entry_price(),
                    order.order_id,
                    state.stop_price()
                );
                SymbolOutcome::status(status_of(state))
            }
            Err(e) => {
                error!("{} entry order failed, staying flat: {}", symbol, e);
                SymbolOutcome {
                    status: Some(status_of(state)),
                    error: Some(e),
                }
            }
        }
    }

    async fn manage_position(
        &self,
        symbol: &Symbol,
        state: &mut PositionState,
        snapshot: &MarketSnapshot,
        classification: &Classification,
    ) -> SymbolOutcome {
        let Some(reason) = self.machine.evaluate(state, snapshot, classification) else {
            debug!(
                "{} holding: peak {} stop {} target {}",
                symbol,
                state.peak_price(),
                state.stop_price(),
                state.trailing_profit_target()
            );
            return SymbolOutcome::status(SymbolStatus {
                symbol: symbol.clone(),
                phase: state.phase(),
                price: snapshot.close,
                stop_price: state.stop_price(),
                reason_if_closed: None,
            });
        };

        let entry_price = state.entry_price();
        info!(
            "{} EXIT ({}) @ {}: entry {}, return {}",
            symbol,
            reason,
            snapshot.close,
            entry_price,
            snapshot.return_from(entry_price)
        );

        let request = OrderRequest::sell(symbol.clone(), state.quantity(), snapshot.close)
            .immediate(reason.requires_immediate_execution());
        let result = self.router.execute(&request).await;

        self.machine.close(state);

        let error = match result {
            Ok(order) => {
                info!("{} closed by order {}", symbol, order.order_id);
                None
            }
            Err(e) => {
                error!(
                    "{} close order failed after {} exit, position state reset anyway: {}",
                    symbol, reason, e
                );
                Some(e)
            }
        };

        SymbolOutcome {
            status: Some(SymbolStatus {
                symbol: symbol.clone(),
                phase: state.phase(),
                price: snapshot.close,
                stop_price: state.stop_price(),
                reason_if_closed: Some(reason),
            }),
            error,
        }
    }

    fn log_open_positions(&self) {
        let open = self.open_positions();
        if open.is_empty() {
            info!("No open positions at exit");
            return;
        }

        for (symbol, state) in open {
            warn!(
                "Open position at exit: {} qty {} entry {} stop {}",
                symbol,
                state.quantity(),
                state.entry_price(),
                state.stop_price()
            );
        }
    }
}
