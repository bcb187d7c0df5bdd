use thiserror::Error;

/// Main error type for the decision engine
#[derive(Error, Debug)]
pub enum RatchetError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Collaborator errors
    #[error("Market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Balance unavailable for {currency}: {reason}")]
    BalanceUnavailable { currency: String, reason: String },

    // Order execution errors
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Order timeout: {0}")]
    OrderTimeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Transport errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for RatchetError
pub type Result<T> = std::result::Result<T, RatchetError>;

/// Failures reported by an order gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl GatewayError {
    /// Whether the router may retry with the fallback order type.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, GatewayError::Rejected(_) | GatewayError::Timeout { .. })
    }
}

impl From<GatewayError> for RatchetError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(reason) => RatchetError::OrderRejected(reason),
            GatewayError::Timeout { .. } => RatchetError::OrderTimeout(err.to_string()),
            GatewayError::RateLimited(reason) => RatchetError::RateLimited(reason),
        }
    }
}
