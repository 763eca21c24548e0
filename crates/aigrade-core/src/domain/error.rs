//! Error taxonomy for the grading engine.
//!
//! Per-pass oracle failures and scoring heuristics never surface here; they
//! are absorbed where they happen. What remains is exhaustion, configuration
//! and I/O.

/// AIGRADE engine errors.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error(
        "no grading results available: {succeeded} of {attempted} passes succeeded \
         ({required} required); last error: {}",
        last_error.as_deref().unwrap_or("none")
    )]
    InsufficientResults {
        attempted: usize,
        succeeded: usize,
        required: usize,
        last_error: Option<String>,
    },

    #[error("grading exhausted after {attempts} attempts; last error: {last_error}")]
    Exhausted { attempts: usize, last_error: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for GradingError {
    fn from(err: toml::de::Error) -> Self {
        GradingError::Config(err.to_string())
    }
}

/// Result type for grading operations.
pub type Result<T> = std::result::Result<T, GradingError>;
