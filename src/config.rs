use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::domain::{OrderType, Symbol};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub entry: EntryConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub adapters: AdapterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Tracked pairs, e.g. ["ETH/USD", "BTC/USD"]
    pub symbols: Vec<Symbol>,
    /// Seconds between cycles
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Upper bound for a single feed or balance read
    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_ms: u64,
}

fn default_check_interval() -> u64 {
    60
}

fn default_feed_timeout() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    /// Momentum must be strictly above this (0-100 scale)
    pub momentum_entry_threshold: Decimal,
    /// Minimum |close - average| / average
    pub min_trend_strength: Decimal,
    /// Minimum volume relative to its rolling average
    pub min_volume_ratio: Decimal,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            momentum_entry_threshold: dec!(55),
            min_trend_strength: dec!(0.01),
            min_volume_ratio: dec!(1.0),
        }
    }
}

/// Base exit parameters used in the normal volatility regime
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub stop_multiplier: Decimal,
    pub spike_reversal_fraction: Decimal,
    pub static_profit_target_fraction: Decimal,
    pub min_spike_profit_fraction: Decimal,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_multiplier: dec!(1.5),
            spike_reversal_fraction: dec!(0.015),
            static_profit_target_fraction: dec!(0.03),
            min_spike_profit_fraction: dec!(0.02),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of free capital risked across all symbols (e.g., 0.20 = 20%)
    pub total_risk_fraction: Decimal,
    /// Leverage applied to the margin of each entry
    pub leverage: Decimal,
    /// Minimum margin per order in quote currency
    pub min_order_size: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            total_risk_fraction: dec!(0.20),
            leverage: dec!(5),
            min_order_size: dec!(1.00),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Preferred order type for entries and non-stop exits
    pub order_type: OrderType,
    /// Timeout for a single gateway call in milliseconds
    pub order_timeout_ms: u64,
    /// How long a limit order may rest before it is cancelled and replaced by a market order
    pub limit_fill_wait_ms: u64,
    /// Size market entries by quote notional instead of base quantity
    pub market_entry_by_notional: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_type: OrderType::Market,
            order_timeout_ms: 10_000,
            limit_fill_wait_ms: 2_000,
            market_entry_by_notional: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Base URL of the indicator service
    pub feed_url: Option<String>,
    /// Base URL of the account service (live mode)
    pub account_url: Option<String>,
    /// Base URL of the execution service (live mode)
    pub gateway_url: Option<String>,
    /// Simulated free capital in dry-run mode
    pub paper_capital: Decimal,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            account_url: None,
            gateway_url: None,
            paper_capital: dec!(1000),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from `config_dir`, then `$RATCHET_ENV`, then the environment
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("engine.check_interval_secs", 60)?
            .set_default("logging.level", "info")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("RATCHET_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (RATCHET_ENGINE__SYMBOLS, etc.)
            .add_source(
                Environment::with_prefix("RATCHET")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("engine.symbols")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for the given symbols
    pub fn default_config(symbols: Vec<Symbol>) -> Self {
        Self {
            engine: EngineConfig {
                symbols,
                check_interval_secs: default_check_interval(),
                feed_timeout_ms: default_feed_timeout(),
            },
            entry: EntryConfig::default(),
            exit: ExitConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            adapters: AdapterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.symbols.is_empty() {
            errors.push("engine.symbols must list at least one pair".to_string());
        }

        let mut seen = HashSet::new();
        for symbol in &self.engine.symbols {
            if !seen.insert(symbol) {
                errors.push(format!("engine.symbols contains {symbol} more than once"));
            }
        }

        if self.engine.check_interval_secs == 0 {
            errors.push("engine.check_interval_secs must be positive".to_string());
        }

        let fraction = self.risk.total_risk_fraction;
        if fraction <= Decimal::ZERO || fraction > Decimal::ONE {
            errors.push("risk.total_risk_fraction must be in (0, 1]".to_string());
        }

        if self.risk.leverage <= Decimal::ZERO {
            errors.push("risk.leverage must be positive".to_string());
        }

        if self.risk.min_order_size < Decimal::ZERO {
            errors.push("risk.min_order_size must not be negative".to_string());
        }

        if self.entry.momentum_entry_threshold < Decimal::ZERO
            || self.entry.momentum_entry_threshold > dec!(100)
        {
            errors.push("entry.momentum_entry_threshold must be within 0-100".to_string());
        }

        if self.exit.stop_multiplier <= Decimal::ZERO {
            errors.push("exit.stop_multiplier must be positive".to_string());
        }

        for (name, value) in [
            ("exit.spike_reversal_fraction", self.exit.spike_reversal_fraction),
            (
                "exit.static_profit_target_fraction",
                self.exit.static_profit_target_fraction,
            ),
            ("exit.min_spike_profit_fraction", self.exit.min_spike_profit_fraction),
        ] {
            if value <= Decimal::ZERO || value >= Decimal::ONE {
                errors.push(format!("{name} must be between 0 and 1"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Share of free capital each symbol may commit
    pub fn risk_per_symbol(&self) -> Decimal {
        let count = self.engine.symbols.len();
        if count == 0 {
            return Decimal::ZERO;
        }
        self.risk.total_risk_fraction / Decimal::from(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(raw: &[&str]) -> Vec<Symbol> {
        raw.iter()
            .map(|s| s.parse().expect("test symbol should parse"))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default_config(symbols(&["ETH/USD", "BTC/USD"]));
        assert!(config.validate().is_ok());
        // 0.20 / 2 = 0.10
        assert_eq!(config.risk_per_symbol(), dec!(0.10));
    }

    #[test]
    fn validate_collects_every_violation() {
        let mut config = AppConfig::default_config(symbols(&["ETH/USD", "ETH/USD"]));
        config.risk.total_risk_fraction = dec!(1.5);
        config.risk.leverage = Decimal::ZERO;
        config.exit.spike_reversal_fraction = Decimal::ZERO;

        let errors = config.validate().expect_err("config should be rejected");
        assert_eq!(errors.len(), 4, "unexpected errors: {errors:?}");
        assert!(errors.iter().any(|e| e.contains("more than once")));
    }

    #[test]
    fn empty_symbol_list_is_rejected() {
        let config = AppConfig::default_config(Vec::new());
        assert!(config.validate().is_err());
        assert_eq!(config.risk_per_symbol(), Decimal::ZERO);
    }

    #[test]
    fn load_from_reads_default_toml() {
        let dir = std::env::temp_dir().join(format!("ratchet-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp config dir");
        std::fs::write(
            dir.join("default.toml"),
            r#"
[engine]
symbols = ["ETH/USD", "SOL/USDC"]
check_interval_secs = 30

[risk]
total_risk_fraction = 0.1
leverage = 3

[execution]
order_type = "limit"
"#,
        )
        .expect("write default.toml");

        let config = AppConfig::load_from(&dir).expect("config should load");
        assert_eq!(config.engine.symbols.len(), 2);
        assert_eq!(config.engine.check_interval_secs, 30);
        assert_eq!(config.risk.leverage, dec!(3));
        assert_eq!(config.execution.order_type, OrderType::Limit);
        assert_eq!(config.exit.stop_multiplier, dec!(1.5));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
