//! Entry Logic - trend-following entry filters
//!
//! A flat symbol is entered only when every filter passes. There is no
//! scoring: one failing filter is enough to stay out.
//!
//! Filters, in evaluation order:
//! 1. Price above the trend baseline
//! 2. Momentum above the entry threshold
//! 3. Distance from the baseline wide enough to rule out sideways markets
//! 4. Baseline itself rising
//! 5. At least average volume

use rust_decimal::Decimal;
use std::fmt;

use crate::config::EntryConfig;
use crate::domain::MarketSnapshot;

/// The individual entry filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryFilter {
    AboveTrend,
    Momentum,
    TrendStrength,
    RisingTrend,
    Volume,
}

impl EntryFilter {
    pub const ALL: [EntryFilter; 5] = [
        EntryFilter::AboveTrend,
        EntryFilter::Momentum,
        EntryFilter::TrendStrength,
        EntryFilter::RisingTrend,
        EntryFilter::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryFilter::AboveTrend => "ABOVE_TREND",
            EntryFilter::Momentum => "MOMENTUM",
            EntryFilter::TrendStrength => "TREND_STRENGTH",
            EntryFilter::RisingTrend => "RISING_TREND",
            EntryFilter::Volume => "VOLUME",
        }
    }
}

impl fmt::Display for EntryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry verdict for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryVerdict {
    Enter,
    /// First filter that failed
    Reject(EntryFilter),
}

/// Evaluates the entry filters against a snapshot
#[derive(Debug, Clone)]
pub struct EntryEngine {
    config: EntryConfig,
}

impl EntryEngine {
    pub fn new(config: EntryConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> EntryVerdict {
        EntryFilter::ALL
            .into_iter()
            .find(|filter| !self.passes(*filter, snapshot))
            .map_or(EntryVerdict::Enter, EntryVerdict::Reject)
    }

    /// Check a single filter
    pub fn passes(&self, filter: EntryFilter, snapshot: &MarketSnapshot) -> bool {
        match filter {
            EntryFilter::AboveTrend => snapshot.close > snapshot.trend_average,
            EntryFilter::Momentum => snapshot.momentum > self.config.momentum_entry_threshold,
            EntryFilter::TrendStrength => {
                if snapshot.trend_average <= Decimal::ZERO {
                    return false;
                }
                (snapshot.close - snapshot.trend_average)
                    .abs()
                    .checked_div(snapshot.trend_average)
                    .is_some_and(|strength| strength >= self.config.min_trend_strength)
            }
            EntryFilter::RisingTrend => snapshot.trend_slope > Decimal::ZERO,
            EntryFilter::Volume => snapshot.volume_ratio >= self.config.min_volume_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn passing() -> MarketSnapshot {
        MarketSnapshot {
            close: dec!(105),
            trend_average: dec!(100),
            momentum: dec!(60),
            volatility: dec!(1),
            trend_slope: dec!(1),
            volume_ratio: dec!(1.2),
        }
    }

    fn engine() -> EntryEngine {
        EntryEngine::new(EntryConfig::default())
    }

    #[test]
    fn all_filters_pass() {
        assert_eq!(engine().evaluate(&passing()), EntryVerdict::Enter);
    }

    #[test]
    fn weak_momentum_blocks_entry() {
        let snapshot = MarketSnapshot {
            momentum: dec!(40),
            ..passing()
        };
        assert_eq!(
            engine().evaluate(&snapshot),
            EntryVerdict::Reject(EntryFilter::Momentum)
        );
    }

    #[test]
    fn each_filter_alone_blocks_entry() {
        let cases = [
            (
                EntryFilter::AboveTrend,
                MarketSnapshot {
                    close: dec!(99),
                    ..passing()
                },
            ),
            (
                EntryFilter::Momentum,
                MarketSnapshot {
                    momentum: dec!(55),
                    ..passing()
                },
            ),
            (
                EntryFilter::TrendStrength,
                MarketSnapshot {
                    close: dec!(100.5),
                    ..passing()
                },
            ),
            (
                EntryFilter::RisingTrend,
                MarketSnapshot {
                    trend_slope: Decimal::ZERO,
                    ..passing()
                },
            ),
            (
                EntryFilter::Volume,
                MarketSnapshot {
                    volume_ratio: dec!(0.99),
                    ..passing()
                },
            ),
        ];

        for (filter, snapshot) in cases {
            assert_eq!(
                engine().evaluate(&snapshot),
                EntryVerdict::Reject(filter),
                "negating {filter} should prevent entry"
            );
        }
    }

    #[test]
    fn trend_strength_boundary_is_inclusive() {
        // |101 - 100| / 100 = 0.01
        let snapshot = MarketSnapshot {
            close: dec!(101),
            ..passing()
        };
        assert!(engine().passes(EntryFilter::TrendStrength, &snapshot));
        assert_eq!(engine().evaluate(&snapshot), EntryVerdict::Enter);
    }

    #[test]
    fn zero_baseline_never_passes_strength() {
        let snapshot = MarketSnapshot {
            trend_average: Decimal::ZERO,
            ..passing()
        };
        assert!(!engine().passes(EntryFilter::TrendStrength, &snapshot));
    }

    #[test]
    fn trend_strength_that_overflows_does_not_pass() {
        let snapshot = MarketSnapshot {
            close: dec!(1000000000000000),
            trend_average: dec!(0.0000000000000000000000000001),
            ..passing()
        };
        assert_eq!(
            engine().evaluate(&snapshot),
            EntryVerdict::Reject(EntryFilter::TrendStrength)
        );
    }
}
