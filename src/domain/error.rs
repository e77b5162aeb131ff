//! Domain error types.

/// Top-level error type for breakout-trader.
///
/// Only collaborator boundaries (data, orders, persistence, config,
/// decision sources) produce these. The position state machine never
/// returns an error: incomplete data degrades to a flat signal and broken
/// invariants panic.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("market data error: {reason}")]
    MarketData { reason: String },

    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("decision source error: {reason}")]
    DecisionSource { reason: String },

    #[error("malformed data: {reason}")]
    DataFormat { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Database { .. } | TraderError::DatabaseQuery { .. } => 3,
            TraderError::MarketData { .. }
            | TraderError::OrderRejected { .. }
            | TraderError::DecisionSource { .. } => 4,
            TraderError::DataFormat { .. }
            | TraderError::NoData { .. }
            | TraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
