use thiserror::Error;

/// Failures reported by an external venue, wallet or price source
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VenueError {
    #[error("network error: {0}")]
    Network(String),

    #[error("venue rejected request: {0}")]
    Rejected(String),

    #[error("slippage exceeded: expected at least {min_out:.6}, got {actual:.6}")]
    SlippageExceeded { min_out: f64, actual: f64 },

    #[error("insufficient funds: need {needed:.6}, have {available:.6}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("invalid price: {0}")]
    InvalidPrice(f64),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Router failure, tagged with the step that failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("balance fetch failed: {0}")]
    Balance(VenueError),

    #[error("venue status fetch failed: {0}")]
    Status(VenueError),

    #[error("submission failed: {0}")]
    Submission(VenueError),
}

/// Fatal construction-time errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid mint address: {0}")]
    InvalidMint(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Engine lifecycle errors
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("cannot {action} engine in state {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("no base price available for {0}")]
    NoBasePrice(String),
}

/// Not enough samples in a rolling window for the requested statistic
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("insufficient data: have {have} samples, need {need}")]
pub struct InsufficientData {
    pub have: usize,
    pub need: usize,
}
