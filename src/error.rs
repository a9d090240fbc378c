// 🚨 Audit Errors - Named failure kinds
// Batch-level availability problems are recovered by the loader (see SkipReason).
// Everything inside the pricing formulas surfaces as one of these.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Rate-source batch was missing or unsuccessful, so no rates exist for the run
    #[error("currency rate table undefined: rate-source batch '{rate_source}' was not loaded ({reason})")]
    UndefinedRateTable { rate_source: String, reason: String },

    /// A record inside a successful batch could not be decoded
    #[error("malformed record #{index} in batch '{batch}': {source}")]
    MalformedRecord {
        batch: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A successful batch whose `data` section does not have the expected shape
    #[error("malformed batch '{batch}': {source}")]
    MalformedBatch {
        batch: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no exchange rate for currency '{0}'")]
    UnknownCurrency(String),

    #[error("exchange rate for '{currency}' must be strictly positive, got {rate}")]
    InvalidRate { currency: String, rate: f64 },

    #[error("invalid {table} table: {message}")]
    InvalidRateTable { table: &'static str, message: String },

    #[error("record not found: {0}")]
    RecordNotFound(String),
}
