//! Volatility regime classification
//!
//! Every cycle the snapshot's `volatility / close` ratio picks one of two exit
//! parameter sets. There is no hysteresis: a symbol hovering around the
//! threshold can flip regime from one cycle to the next.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ExitConfig;
use crate::domain::MarketSnapshot;

/// Ratio above which a symbol is treated as volatile
pub const VOLATILE_RATIO_THRESHOLD: Decimal = dec!(0.02);

/// Volatility regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Normal,
    Volatile,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Normal => write!(f, "normal"),
            Regime::Volatile => write!(f, "volatile"),
        }
    }
}

/// Exit parameters in effect for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitParameters {
    pub stop_multiplier: Decimal,
    pub spike_reversal_fraction: Decimal,
    pub static_profit_target_fraction: Decimal,
    pub min_spike_profit_fraction: Decimal,
}

impl ExitParameters {
    /// Fixed parameter set for the volatile regime
    pub const VOLATILE: ExitParameters = ExitParameters {
        stop_multiplier: dec!(2.0),
        spike_reversal_fraction: dec!(0.008),
        static_profit_target_fraction: dec!(0.015),
        min_spike_profit_fraction: dec!(0.01),
    };

    /// Configured base set used in the normal regime
    pub fn from_config(config: &ExitConfig) -> Self {
        Self {
            stop_multiplier: config.stop_multiplier,
            spike_reversal_fraction: config.spike_reversal_fraction,
            static_profit_target_fraction: config.static_profit_target_fraction,
            min_spike_profit_fraction: config.min_spike_profit_fraction,
        }
    }

    /// Price at which the static profit target is reached
    pub fn static_target_price(&self, entry_price: Decimal) -> Decimal {
        entry_price.saturating_mul(Decimal::ONE + self.static_profit_target_fraction)
    }
}

/// Result of classifying one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub regime: Regime,
    pub volatility_ratio: Decimal,
    pub params: ExitParameters,
}

/// Classifies snapshots into a regime and its exit parameters
#[derive(Debug, Clone)]
pub struct VolatilityClassifier {
    base: ExitParameters,
}

impl VolatilityClassifier {
    pub fn new(config: &ExitConfig) -> Self {
        Self {
            base: ExitParameters::from_config(config),
        }
    }

    pub fn classify(&self, snapshot: &MarketSnapshot) -> Classification {
        let volatility_ratio = if snapshot.close > Decimal::ZERO {
            // Overflow only happens for a vanishing close: as volatile as it gets
            snapshot
                .volatility
                .checked_div(snapshot.close)
                .unwrap_or(Decimal::MAX)
        } else {
            Decimal::ZERO
        };

        let (regime, params) = if volatility_ratio > VOLATILE_RATIO_THRESHOLD {
            (Regime::Volatile, ExitParameters::VOLATILE)
        } else {
            (Regime::Normal, self.base)
        };

        Classification {
            regime,
            volatility_ratio,
            params,
        }
    }
}
