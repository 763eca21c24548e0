//! Error types for grading-oracle

use thiserror::Error;

/// Errors raised by a single oracle invocation.
///
/// Every variant is recoverable at the pass level: the engine drops the pass
/// and keeps the others.
#[derive(Error, Debug)]
pub enum OracleError {
    /// Transport-level failure talking to the oracle
    #[error("oracle request failed: {0}")]
    Transport(String),

    /// The oracle answered with a non-success status
    #[error("oracle returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response contained no JSON object at all
    #[error("oracle response could not be parsed: {0}")]
    Unparseable(String),

    /// The call exceeded its deadline
    #[error("oracle call timed out after {0} ms")]
    Timeout(u64),

    /// The oracle refused or failed to grade for its own reasons
    #[error("oracle rejected the request: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Transport(format!("timeout: {err}"))
        } else {
            OracleError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        OracleError::Unparseable(err.to_string())
    }
}
