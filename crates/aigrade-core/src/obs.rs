//! Structured lifecycle events for a grading request.
//!
//! - [`GradingSpan`] enters a request-scoped span in synchronous code, and
//!   [`grading_span`] hands the same span to `Instrument` for futures;
//! - `emit_*` functions log the key lifecycle events with an `event` field.
//!
//! Everything logs at `info!` except [`emit_pass_failed`], which warns.

use tracing::{info, warn};

/// RAII guard that tags every log line inside a grade with its request id.
///
/// ```ignore
/// let _span = GradingSpan::enter("5f0c...");
/// ```
pub struct GradingSpan {
    _span: tracing::span::EnteredSpan,
}

impl GradingSpan {
    pub fn enter(request_id: &str) -> Self {
        Self {
            _span: grading_span(request_id).entered(),
        }
    }
}

/// The request-scoped span, for instrumenting futures.
pub fn grading_span(request_id: &str) -> tracing::Span {
    tracing::info_span!("aigrade.grade", request_id = %request_id)
}

/// Emit event: grading started.
pub fn emit_grading_started(request_id: &str, mode: &str, strictness: f64, criteria: usize) {
    info!(
        event = "grading.started",
        request_id = %request_id,
        mode = %mode,
        strictness = strictness,
        criteria = criteria,
    );
}

/// Emit event: one oracle pass was dropped (warning level).
pub fn emit_pass_failed(tag: &str, error: &str) {
    warn!(event = "pass.failed", tag = %tag, error = %error);
}

/// Emit event: consensus reconciled `evaluators` results.
pub fn emit_consensus_computed(evaluators: usize, agreement: f64, confidence: f64, outliers: usize) {
    info!(
        event = "consensus.computed",
        evaluators = evaluators,
        agreement = agreement,
        confidence = confidence,
        outliers = outliers,
    );
}

/// Emit event: accuracy gate evaluated.
pub fn emit_gate_evaluated(overall_confidence: f64, level: &str, accepted: bool) {
    info!(
        event = "gate.evaluated",
        overall_confidence = overall_confidence,
        level = %level,
        accepted = accepted,
    );
}

/// Emit event: the single retry round is starting.
pub fn emit_grading_retry(request_id: &str, reason: &str, variants: &[f64]) {
    info!(
        event = "grading.retry",
        request_id = %request_id,
        reason = %reason,
        variants = ?variants,
    );
}

/// Emit event: grading finished, successfully or not.
pub fn emit_grading_finished(request_id: &str, duration_ms: u64, retried: bool, success: bool) {
    info!(
        event = "grading.finished",
        request_id = %request_id,
        duration_ms = duration_ms,
        retried = retried,
        success = success,
    );
}
