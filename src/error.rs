//! Unified error hierarchy for glucotrend
//!
//! Validation errors raised by the pure classification and binning functions
//! indicate contract violations at the call site; degenerate data conditions
//! (empty bins, inverted ranges, zero-length batches) never surface here.

use thiserror::Error;

/// Top-level error type for all glucotrend operations
#[derive(Debug, Error)]
pub enum GlucoTrendError {
    /// Timestamp/timezone normalization errors
    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    /// Glucose classification errors
    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    /// Time-of-day binning errors
    #[error("Binning error: {0}")]
    Bin(#[from] BinError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Background indexing worker unavailable
    #[error("Worker error: {0}")]
    Worker(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalization specific errors
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The UTC instant of a raw reading could not be parsed
    #[error("Invalid timestamp {raw:?}: {source}")]
    InvalidTimestamp {
        raw: String,
        source: chrono::ParseError,
    },

    /// Timezone name is not present in the IANA database
    #[error("Unknown timezone: {name}")]
    UnknownTimezone { name: String },

    /// Record type is not one of the visualized reading types
    #[error("Unsupported reading type: {tag}")]
    UnsupportedType { tag: String },
}

/// Classification specific errors
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Bounds are missing a required threshold or contain a non-finite value
    #[error("Invalid bounds: {reason}")]
    InvalidBounds { reason: String },

    /// Value is non-finite or not strictly positive
    #[error("Invalid glucose value: {value}")]
    InvalidValue { value: f64 },
}

/// Binning specific errors
#[derive(Debug, Error)]
pub enum BinError {
    /// Milliseconds-since-midnight input outside [0, 86400000)
    #[error("Time of day out of range: {ms}ms")]
    OutOfRange { ms: i64 },

    /// Bin width must be positive and divide the 24-hour cycle evenly
    #[error("Invalid bin width: {width}ms")]
    InvalidBinWidth { width: i64 },
}

/// Result type alias for glucotrend operations
pub type Result<T> = std::result::Result<T, GlucoTrendError>;

impl GlucoTrendError {
    /// Whether this error indicates a caller-side contract violation rather
    /// than a runtime data condition. Contract violations are expected to be
    /// caught by tests and must not reach production call sites.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            GlucoTrendError::Classify(_) | GlucoTrendError::Bin(_)
        )
    }
}
