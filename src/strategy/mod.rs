//! Decision engine
//!
//! - `volatility` - regime classification and exit parameters
//! - `entry` - trend-following entry filters
//! - `risk` - equal-split risk allocation
//! - `exit` - per-symbol position state machine
//! - `executor` - order routing with limit-to-market fallback
//! - `orchestrator` - the per-tick loop over all symbols

pub mod entry;
pub mod executor;
pub mod exit;
pub mod orchestrator;
pub mod risk;
pub mod volatility;

pub use entry::{EntryEngine, EntryFilter, EntryVerdict};
pub use executor::{OrderRequest, OrderRouter};
pub use exit::PositionMachine;
pub use orchestrator::{CycleOrchestrator, CycleReport, SymbolFailure};
pub use risk::{Allocation, RiskAllocator, RiskBudget, Sizing};
pub use volatility::{Classification, ExitParameters, Regime, VolatilityClassifier};
