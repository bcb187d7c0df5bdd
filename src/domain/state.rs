use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Symbol;

/// Position phase for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// No position held
    Flat,
    /// Long position open
    Long,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Flat => "FLAT",
            Phase::Long => "LONG",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-symbol position state.
///
/// Exactly one instance exists per symbol for the whole run. Only the
/// strategy layer mutates it; outside the crate it is read-only.
/// `quantity > 0` iff the phase is `Long`, and the price levels are zero
/// while `Flat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionState {
    pub(crate) phase: Phase,
    pub(crate) entry_price: Decimal,
    pub(crate) quantity: Decimal,
    pub(crate) stop_price: Decimal,
    pub(crate) peak_price: Decimal,
    pub(crate) trailing_profit_target: Decimal,
    pub(crate) breakeven_locked: bool,
}

impl Default for PositionState {
    fn default() -> Self {
        Self::flat()
    }
}

impl PositionState {
    /// Zero-valued flat state
    pub fn flat() -> Self {
        Self {
            phase: Phase::Flat,
            entry_price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            stop_price: Decimal::ZERO,
            peak_price: Decimal::ZERO,
            trailing_profit_target: Decimal::ZERO,
            breakeven_locked: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_flat(&self) -> bool {
        self.phase == Phase::Flat
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn stop_price(&self) -> Decimal {
        self.stop_price
    }

    pub fn peak_price(&self) -> Decimal {
        self.peak_price
    }

    pub fn trailing_profit_target(&self) -> Decimal {
        self.trailing_profit_target
    }

    pub fn breakeven_locked(&self) -> bool {
        self.breakeven_locked
    }

    /// Reset to the zero-valued flat state
    pub(crate) fn reset(&mut self) {
        *self = Self::flat();
    }

    /// Check the phase/quantity invariant
    pub fn is_consistent(&self) -> bool {
        match self.phase {
            Phase::Flat => {
                self.quantity.is_zero()
                    && self.stop_price.is_zero()
                    && self.peak_price.is_zero()
                    && self.trailing_profit_target.is_zero()
            }
            Phase::Long => self.quantity > Decimal::ZERO,
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    SpikeReversal,
    StaticProfitTarget,
    TrailingProfitTarget,
    StopLoss,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::SpikeReversal => "spike_reversal",
            ExitReason::StaticProfitTarget => "static_profit_target",
            ExitReason::TrailingProfitTarget => "trailing_profit_target",
            ExitReason::StopLoss => "stop_loss",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-cycle status record exposed to reporting collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolStatus {
    pub symbol: Symbol,
    pub phase: Phase,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub reason_if_closed: Option<ExitReason>,
}
