use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tradable pair such as `ETH/USD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_ascii_uppercase(),
            quote: quote.into().to_ascii_uppercase(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// URL-safe form (`ETH-USD`) used by the HTTP adapters
    pub fn path_segment(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Symbol {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let (base, quote) = raw
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("invalid symbol '{raw}'; expected BASE/QUOTE"))?;

        let base = base.trim();
        let quote = quote.trim();
        if base.is_empty() || quote.is_empty() || quote.contains('/') {
            return Err(format!("invalid symbol '{raw}'; expected BASE/QUOTE"));
        }

        Ok(Self::new(base, quote))
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}

/// Smallest close or trend average the engine trades on
pub const MIN_SNAPSHOT_PRICE: Decimal = dec!(0.000000000001);
/// Largest absolute value accepted for any snapshot field
pub const MAX_SNAPSHOT_MAGNITUDE: Decimal = dec!(1000000000000000);

/// Indicator values for one symbol at one cycle.
///
/// Supplied already computed by the indicator feed; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Last close price
    pub close: Decimal,
    /// Short-term moving average (trend baseline)
    pub trend_average: Decimal,
    /// Momentum oscillator, 0-100
    pub momentum: Decimal,
    /// Volatility in absolute price units
    pub volatility: Decimal,
    /// Slope of the moving average
    pub trend_slope: Decimal,
    /// Volume relative to its rolling average (1.0 = average)
    pub volume_ratio: Decimal,
}

impl MarketSnapshot {
    /// Unrealized return of `close` against `entry_price`; zero for a non-positive entry.
    pub fn return_from(&self, entry_price: Decimal) -> Decimal {
        if entry_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        // A non-negative close never loses more than the entry, so only gains overflow
        (self.close - entry_price)
            .checked_div(entry_price)
            .unwrap_or(Decimal::MAX)
    }

    /// Reject values too large or too small for the engine's price arithmetic.
    ///
    /// Close and trend average must lie in `[MIN_SNAPSHOT_PRICE, MAX_SNAPSHOT_MAGNITUDE]`;
    /// every other field must not exceed `MAX_SNAPSHOT_MAGNITUDE` in absolute value.
    pub fn check_range(&self) -> std::result::Result<(), String> {
        for (name, price) in [("close", self.close), ("trend_average", self.trend_average)] {
            if price < MIN_SNAPSHOT_PRICE {
                return Err(format!("{name} {price} below {MIN_SNAPSHOT_PRICE}"));
            }
        }

        for (name, value) in [
            ("close", self.close),
            ("trend_average", self.trend_average),
            ("momentum", self.momentum),
            ("volatility", self.volatility),
            ("trend_slope", self.trend_slope),
            ("volume_ratio", self.volume_ratio),
        ] {
            if value.abs() > MAX_SNAPSHOT_MAGNITUDE {
                return Err(format!("{name} {value} out of range"));
            }
        }

        Ok(())
    }
}
