pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod strategy;

pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use error::{GatewayError, RatchetError, Result};
pub use strategy::{CycleOrchestrator, CycleReport};
