use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::io::{stdout, Write};
use std::path::PathBuf;
use tracing::info;

use crate::config::AppConfig;
use crate::exchange::{Collaborators, ExecutionMode};
use crate::strategy::{EntryEngine, EntryVerdict, VolatilityClassifier};

#[derive(Parser, Debug)]
#[command(name = "ratchet")]
#[command(version)]
#[command(about = "Multi-symbol trend-following position engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(long, env = "RATCHET_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Place real orders (paper trading otherwise)
    #[arg(long)]
    pub execute: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the decision loop
    Run {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Check connectivity and print the current signals without trading
    Check,
}

/// Log the startup banner
pub fn log_startup_banner(config: &AppConfig, mode: ExecutionMode) {
    let symbols: Vec<String> = config.engine.symbols.iter().map(|s| s.to_string()).collect();

    info!("Ratchet position engine starting");
    info!("  Mode: {}", mode);
    info!("  Symbols: {}", symbols.join(", "));
    info!(
        "  Risk: {} total, {} per symbol, leverage {}x",
        config.risk.total_risk_fraction,
        config.risk_per_symbol(),
        config.risk.leverage
    );
    info!(
        "  Orders: {} preferred, minimum size {}",
        config.execution.order_type, config.risk.min_order_size
    );
    info!("  Check interval: {}s", config.engine.check_interval_secs);
}

/// One-shot connectivity check: balances per quote currency, then the
/// current snapshot, regime and entry verdict for every symbol. No orders.
///
/// Returns the number of failed reads.
pub async fn check_connectivity(config: &AppConfig, collaborators: &Collaborators) -> usize {
    let classifier = VolatilityClassifier::new(&config.exit);
    let entry = EntryEngine::new(config.entry.clone());
    let mut failures = 0;

    println!("Checking collaborators ({} mode)...\n", collaborators.mode);

    let currencies: BTreeSet<&str> = config.engine.symbols.iter().map(|s| s.quote()).collect();
    for currency in currencies {
        print!("  Balance {:<6} ", currency);
        let _ = stdout().flush();
        match collaborators.account.free_capital(currency).await {
            Ok(free) => println!("\x1b[32mOK\x1b[0m  free {}", free),
            Err(e) => {
                failures += 1;
                println!("\x1b[31mFAILED\x1b[0m  {}", e);
            }
        }
    }

    println!();

    for symbol in &config.engine.symbols {
        print!("  {:<10} ", symbol.to_string());
        let _ = stdout().flush();
        match collaborators.feed.snapshot(symbol).await {
            Ok(snapshot) => {
                let classification = classifier.classify(&snapshot);
                let verdict = match entry.evaluate(&snapshot) {
                    EntryVerdict::Enter => "ENTER".to_string(),
                    EntryVerdict::Reject(filter) => format!("no entry ({filter})"),
                };
                println!(
                    "\x1b[32mOK\x1b[0m  close {} momentum {} regime {} -> {}",
                    snapshot.close, snapshot.momentum, classification.regime, verdict
                );
            }
            Err(e) => {
                failures += 1;
                println!("\x1b[31mFAILED\x1b[0m  {}", e);
            }
        }
    }

    println!();
    failures
}
