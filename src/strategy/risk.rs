use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::RiskConfig;

/// Capital inputs for one tick, shared read-only by every symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskBudget {
    /// Fraction of free capital risked across all symbols
    pub total_risk_fraction: Decimal,
    pub leverage: Decimal,
    /// Balance snapshot taken once for the tick
    pub free_capital: Decimal,
}

impl RiskBudget {
    pub fn new(config: &RiskConfig, free_capital: Decimal) -> Self {
        Self {
            total_risk_fraction: config.total_risk_fraction,
            leverage: config.leverage,
            free_capital,
        }
    }
}

/// Order size for a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Base-currency quantity
    pub quantity: Decimal,
    /// Margin committed, in quote currency
    pub margin_used: Decimal,
    /// Leveraged exposure, in quote currency
    pub position_value: Decimal,
}

/// Outcome of a sizing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    Sized(Allocation),
    /// Margin is below the minimum order size; skip the symbol this cycle
    TooSmall { margin_used: Decimal },
}

/// Splits the risk budget equally across every configured symbol
#[derive(Debug, Clone)]
pub struct RiskAllocator {
    min_order_size: Decimal,
    symbol_count: usize,
}

impl RiskAllocator {
    pub fn new(config: &RiskConfig, symbol_count: usize) -> Self {
        Self {
            min_order_size: config.min_order_size,
            symbol_count,
        }
    }

    /// Size an entry at `price` out of the tick's budget.
    ///
    /// An allocation that does not fit in a `Decimal` is treated as too small.
    pub fn size(&self, budget: &RiskBudget, price: Decimal) -> Sizing {
        if self.symbol_count == 0 || price <= Decimal::ZERO {
            return Sizing::TooSmall {
                margin_used: Decimal::ZERO,
            };
        }

        let Some(margin_used) = budget
            .total_risk_fraction
            .checked_div(Decimal::from(self.symbol_count))
            .and_then(|share| budget.free_capital.checked_mul(share))
        else {
            warn!("Margin overflowed for free capital {}", budget.free_capital);
            return Sizing::TooSmall {
                margin_used: Decimal::ZERO,
            };
        };

        if margin_used < self.min_order_size || margin_used <= Decimal::ZERO {
            debug!(
                "Margin {} below minimum order size {}",
                margin_used, self.min_order_size
            );
            return Sizing::TooSmall { margin_used };
        }

        let Some((position_value, quantity)) = margin_used
            .checked_mul(budget.leverage)
            .and_then(|value| value.checked_div(price).map(|quantity| (value, quantity)))
        else {
            warn!(
                "Position size overflowed: margin {} leverage {} price {}",
                margin_used, budget.leverage, price
            );
            return Sizing::TooSmall { margin_used };
        };

        Sizing::Sized(Allocation {
            quantity,
            margin_used,
            position_value,
        })
    }
}
