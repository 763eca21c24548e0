//! The grading oracle contract.
//!
//! An oracle turns (submission, context, strictness, approach) into one
//! [`RawGradingResult`]. It is a black box to the engine: results are
//! untrusted and any call may fail or hang.

use async_trait::async_trait;

use crate::error::OracleError;
use crate::schema::{GradingContext, RawGradingResult};

/// Result type for oracle calls.
pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// External grading collaborator, typically an LLM behind some API.
#[async_trait]
pub trait GradingOracle: Send + Sync {
    /// Grade `submission_text` once.
    ///
    /// `strictness` is in `[0, 1]`; `approach` names the evaluation style or
    /// persona (e.g. `"detailed"`, `"strict_evaluator"`).
    async fn grade(
        &self,
        submission_text: &str,
        context: &GradingContext,
        strictness: f64,
        approach: &str,
    ) -> OracleResult<RawGradingResult>;

    /// Short identifier used in logs.
    fn name(&self) -> &str {
        "oracle"
    }
}
