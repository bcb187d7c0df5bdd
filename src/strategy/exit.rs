//! Exit Logic - per-symbol position state machine
//!
//! `Flat -> Long` happens through [`PositionMachine::open`] once an entry
//! order is accepted. While `Long`, [`PositionMachine::evaluate`] runs the
//! exit rules in strict priority order and reports the first one that fires:
//!
//! 1. Spike-reversal capture
//! 2. Static profit target
//! 3. Trailing profit target
//! 4. Stop-loss (trailing, with breakeven and profit locks)
//!
//! The stop price and trailing profit target only ever move up while a
//! position is open. Closing always resets the state to its flat zero values.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::volatility::{Classification, Regime};
use crate::domain::{ExitReason, MarketSnapshot, Phase, PositionState};

/// Unrealized profit above which the breakeven lock engages
const BREAKEVEN_TRIGGER: Decimal = dec!(0.01);
/// Stop level of the breakeven lock, relative to entry
const BREAKEVEN_LEVEL: Decimal = dec!(1.005);
/// Share of the move past entry added to the trailing profit target
const TRAILING_TARGET_SHARE: Decimal = dec!(0.5);

/// Profit locks per regime: (profit strictly above, stop level relative to entry)
const VOLATILE_LOCKS: [(Decimal, Decimal); 2] = [(dec!(0.01), dec!(1.005)), (dec!(0.02), dec!(1.01))];
const NORMAL_LOCKS: [(Decimal, Decimal); 2] = [(dec!(0.02), dec!(1.015)), (dec!(0.05), dec!(1.03))];

impl ExitReason {
    /// Stop-loss exits bypass the configured order type
    pub fn requires_immediate_execution(&self) -> bool {
        matches!(self, ExitReason::StopLoss)
    }
}

/// Stateless rule set applied to each symbol's [`PositionState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionMachine;

impl PositionMachine {
    pub fn new() -> Self {
        Self
    }

    /// Transition `Flat -> Long` after a successful entry order
    pub fn open(
        &self,
        state: &mut PositionState,
        snapshot: &MarketSnapshot,
        classification: &Classification,
        quantity: Decimal,
    ) {
        let params = &classification.params;
        let entry_price = snapshot.close;

        *state = PositionState {
            phase: Phase::Long,
            entry_price,
            quantity,
            stop_price: stop_below(entry_price, snapshot.volatility, params.stop_multiplier),
            peak_price: entry_price,
            trailing_profit_target: params.static_target_price(entry_price),
            breakeven_locked: false,
        };

        debug!(
            "Opened long @ {} qty {} stop {} target {} ({})",
            entry_price,
            quantity,
            state.stop_price,
            state.trailing_profit_target,
            classification.regime
        );
    }

    /// Transition `Long -> Flat`
    pub fn close(&self, state: &mut PositionState) {
        state.reset();
    }

    /// Update the exit levels for this cycle and return the exit that fires, if any.
    ///
    /// Flat states are left untouched.
    pub fn evaluate(
        &self,
        state: &mut PositionState,
        snapshot: &MarketSnapshot,
        classification: &Classification,
    ) -> Option<ExitReason> {
        if state.phase != Phase::Long {
            return None;
        }

        let params = &classification.params;
        let close = snapshot.close;
        let entry = state.entry_price;
        let new_peak = close > state.peak_price;

        // 1. Spike-reversal capture
        state.peak_price = state.peak_price.max(close);
        let peak_profit = (state.peak_price - entry).checked_div(entry);
        let drop_from_peak = (state.peak_price - close).checked_div(state.peak_price);
        if let (Some(peak_profit), Some(drop_from_peak)) = (peak_profit, drop_from_peak) {
            if entry > Decimal::ZERO
                && peak_profit >= params.min_spike_profit_fraction
                && drop_from_peak >= params.spike_reversal_fraction
            {
                return Some(ExitReason::SpikeReversal);
            }
        }

        // 2. Static profit target
        let static_target = params.static_target_price(entry);
        if close >= static_target {
            return Some(ExitReason::StaticProfitTarget);
        }

        // 3. Trailing profit target
        if new_peak {
            let candidate =
                static_target.saturating_add((close - entry).saturating_mul(TRAILING_TARGET_SHARE));
            state.trailing_profit_target = state.trailing_profit_target.max(candidate);
        }
        if state.trailing_profit_target > Decimal::ZERO && close >= state.trailing_profit_target {
            return Some(ExitReason::TrailingProfitTarget);
        }

        // 4. Stop-loss
        self.raise_stop(state, snapshot, classification);
        if close <= state.stop_price {
            return Some(ExitReason::StopLoss);
        }

        None
    }

    /// Ratchet the stop price for the current close; never lowers it.
    fn raise_stop(
        &self,
        state: &mut PositionState,
        snapshot: &MarketSnapshot,
        classification: &Classification,
    ) {
        let entry = state.entry_price;
        let trailing = stop_below(
            snapshot.close,
            snapshot.volatility,
            classification.params.stop_multiplier,
        );
        state.stop_price = state.stop_price.max(trailing);

        let profit = snapshot.return_from(entry);

        if !state.breakeven_locked && profit > BREAKEVEN_TRIGGER {
            state.stop_price = state.stop_price.max(entry.saturating_mul(BREAKEVEN_LEVEL));
            state.breakeven_locked = true;
            debug!("Breakeven lock engaged, stop {}", state.stop_price);
        }

        let locks = match classification.regime {
            Regime::Volatile => &VOLATILE_LOCKS,
            Regime::Normal => &NORMAL_LOCKS,
        };
        for (threshold, level) in locks {
            if profit > *threshold {
                state.stop_price = state.stop_price.max(entry.saturating_mul(*level));
            }
        }
    }
}

/// `price - volatility * multiplier`, saturating instead of overflowing
fn stop_below(price: Decimal, volatility: Decimal, multiplier: Decimal) -> Decimal {
    price.saturating_sub(volatility.saturating_mul(multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExitConfig;
    use crate::strategy::volatility::VolatilityClassifier;

    fn snapshot(close: Decimal, volatility: Decimal) -> MarketSnapshot {
        MarketSnapshot {
            close,
            trend_average: close,
            momentum: dec!(60),
            volatility,
            trend_slope: dec!(1),
            volume_ratio: dec!(1),
        }
    }

    /// Run one cycle the way the orchestrator does
    fn step(state: &mut PositionState, close: Decimal, volatility: Decimal) -> Option<ExitReason> {
        let classifier = VolatilityClassifier::new(&ExitConfig::default());
        let snap = snapshot(close, volatility);
        let classification = classifier.classify(&snap);
        PositionMachine::new().evaluate(state, &snap, &classification)
    }

    fn open_at(close: Decimal, volatility: Decimal) -> PositionState {
        let classifier = VolatilityClassifier::new(&ExitConfig::default());
        let snap = snapshot(close, volatility);
        let mut state = PositionState::flat();
        PositionMachine::new().open(&mut state, &snap, &classifier.classify(&snap), dec!(1));
        state
    }

    fn long_state(entry: Decimal, peak: Decimal, stop: Decimal, target: Decimal) -> PositionState {
        PositionState {
            phase: Phase::Long,
            entry_price: entry,
            quantity: dec!(1),
            stop_price: stop,
            peak_price: peak,
            trailing_profit_target: target,
            breakeven_locked: false,
        }
    }

    #[test]
    fn open_sets_initial_levels() {
        let state = open_at(dec!(100), dec!(2));

        assert_eq!(state.phase(), Phase::Long);
        assert_eq!(state.entry_price(), dec!(100));
        assert_eq!(state.peak_price(), dec!(100));
        // 100 - 2 * 1.5
        assert_eq!(state.stop_price(), dec!(97));
        assert_eq!(state.trailing_profit_target(), dec!(103));
        assert!(!state.breakeven_locked());
    }

    #[test]
    fn open_in_volatile_regime_uses_wider_stop() {
        // 3 / 100 > 0.02
        let state = open_at(dec!(100), dec!(3));
        assert_eq!(state.stop_price(), dec!(94));
        assert_eq!(state.trailing_profit_target(), dec!(101.5));
    }

    #[test]
    fn breakeven_lock_then_stop_out() {
        let mut state = open_at(dec!(100), dec!(2));

        // 1.5% profit: trailing stop 98.5, breakeven lifts it to 100.5
        assert_eq!(step(&mut state, dec!(101.5), dec!(2)), None);
        assert_eq!(state.stop_price(), dec!(100.5));
        assert!(state.breakeven_locked());

        assert_eq!(step(&mut state, dec!(100.4), dec!(2)), Some(ExitReason::StopLoss));
        assert_eq!(state.stop_price(), dec!(100.5));
    }

    #[test]
    fn normal_regime_profit_lock_above_two_percent() {
        let mut state = open_at(dec!(100), dec!(1));
        state.trailing_profit_target = dec!(110);

        // 2.5% profit in the normal regime locks 1.015 x entry, above the 101 trailing stop
        assert_eq!(step(&mut state, dec!(102.5), dec!(1)), None);
        assert_eq!(state.stop_price(), dec!(101.5));
    }

    #[test]
    fn spike_reversal_fires_before_static_target() {
        let mut state = long_state(dec!(100), dec!(103), dec!(97), dec!(103));

        // (103 - 101.2) / 103 ~ 1.75% >= 1.5%
        assert_eq!(step(&mut state, dec!(101.2), dec!(1)), Some(ExitReason::SpikeReversal));
    }

    #[test]
    fn spike_reversal_wins_over_stop_loss() {
        let mut state = long_state(dec!(100), dec!(103), dec!(101.5), dec!(103));

        assert_eq!(step(&mut state, dec!(101.2), dec!(1)), Some(ExitReason::SpikeReversal));
    }

    #[test]
    fn static_target_hit() {
        let mut state = open_at(dec!(100), dec!(1));
        assert_eq!(
            step(&mut state, dec!(103), dec!(1)),
            Some(ExitReason::StaticProfitTarget)
        );
    }

    #[test]
    fn volatile_regime_uses_tighter_static_target() {
        let mut state = open_at(dec!(100), dec!(1));
        // 3 / 101.6 > 0.02 -> static target 1.5%
        assert_eq!(
            step(&mut state, dec!(101.6), dec!(3)),
            Some(ExitReason::StaticProfitTarget)
        );
    }

    #[test]
    fn trailing_target_fires_when_below_current_static_target() {
        // Target left over from an entry taken in the volatile regime
        let mut state = long_state(dec!(100), dec!(102), dec!(95), dec!(101));

        assert_eq!(
            step(&mut state, dec!(101.5), dec!(1)),
            Some(ExitReason::TrailingProfitTarget)
        );
    }

    #[test]
    fn levels_only_ratchet_up() {
        let mut state = open_at(dec!(100), dec!(1));
        let mut last_stop = state.stop_price();
        let mut last_target = state.trailing_profit_target();

        for close in [dec!(101), dec!(100.8), dec!(102), dec!(101.9)] {
            assert_eq!(step(&mut state, close, dec!(1)), None, "unexpected exit at {close}");
            assert!(state.stop_price() >= last_stop);
            assert!(state.trailing_profit_target() >= last_target);
            last_stop = state.stop_price();
            last_target = state.trailing_profit_target();
        }

        assert_eq!(state.trailing_profit_target(), dec!(104));
        assert_eq!(state.stop_price(), dec!(100.5));
    }

    #[test]
    fn flat_state_is_ignored() {
        let mut state = PositionState::flat();
        assert_eq!(step(&mut state, dec!(50), dec!(1)), None);
        assert_eq!(state, PositionState::flat());
    }

    #[test]
    fn close_resets_to_flat() {
        let mut state = open_at(dec!(100), dec!(2));
        PositionMachine::new().close(&mut state);
        assert!(state.is_flat());
        assert!(state.is_consistent());
    }

    #[test]
    fn only_stop_loss_needs_immediate_execution() {
        assert!(ExitReason::StopLoss.requires_immediate_execution());
        assert!(!ExitReason::SpikeReversal.requires_immediate_execution());
        assert!(!ExitReason::StaticProfitTarget.requires_immediate_execution());
        assert!(!ExitReason::TrailingProfitTarget.requires_immediate_execution());
    }

    #[test]
    fn extreme_levels_saturate_instead_of_overflowing() {
        // Volatility x multiplier saturates at Decimal::MAX
        let state = open_at(dec!(100), Decimal::MAX);
        assert_eq!(state.stop_price(), dec!(100) - Decimal::MAX);

        // Peak profit against a dust entry does not fit in a Decimal; the
        // spike rule is skipped and the static target still fires.
        let mut state = long_state(
            dec!(0.00000000000000000001),
            dec!(0.00000000000000000001),
            Decimal::ZERO,
            dec!(0.00000000000000000002),
        );
        assert_eq!(
            step(&mut state, dec!(100000000000000000000), dec!(1)),
            Some(ExitReason::StaticProfitTarget)
        );
    }
}
