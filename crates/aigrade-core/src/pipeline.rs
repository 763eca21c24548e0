//! End-to-end grading of one submission.
//!
//! passes → validate each → consensus (≥2) → align or repair → gate →
//! accept, or one retry round that is accepted unconditionally.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};
use uuid::Uuid;

use grading_oracle::{FileMetadata, GradingContext, GradingOracle, RawGradingResult, Rubric};

use crate::config::GradingConfig;
use crate::consensus::ConsensusEngine;
use crate::coordinator::{retry_plan, MultiPassCoordinator, PassMode, PassReport};
use crate::domain::{AccuracyReport, ConsensusSummary, FinalResult, GradingError, Result};
use crate::gate::{AccuracyGate, GateDecision};
use crate::obs::{
    emit_gate_evaluated, emit_grading_finished, emit_grading_retry, emit_grading_started,
    grading_span,
};
use crate::reconcile::align_in_place;
use crate::stats::GradingStats;
use crate::validator::{repair_in_place, validate_and_repair};

fn default_strictness() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

/// One submission to grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRequest {
    pub submission_text: String,
    #[serde(default)]
    pub file_metadata: FileMetadata,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub answer_key: Option<String>,
    #[serde(default)]
    pub rubric: Option<Rubric>,
    /// Base strictness in `[0, 1]`.
    #[serde(default = "default_strictness")]
    pub strictness: f64,
    /// Whether a low-confidence result triggers the retry round.
    #[serde(default = "default_true")]
    pub require_high_accuracy: bool,
    #[serde(default)]
    pub mode: PassMode,
}

impl GradingRequest {
    pub fn new(submission_text: impl Into<String>) -> Self {
        Self {
            submission_text: submission_text.into(),
            file_metadata: FileMetadata::default(),
            question_text: String::new(),
            answer_key: None,
            rubric: None,
            strictness: default_strictness(),
            require_high_accuracy: true,
            mode: PassMode::default(),
        }
    }

    pub fn with_rubric(mut self, rubric: Rubric) -> Self {
        self.rubric = Some(rubric);
        self
    }

    pub fn with_question(mut self, question_text: impl Into<String>) -> Self {
        self.question_text = question_text.into();
        self
    }

    pub fn with_answer_key(mut self, answer_key: impl Into<String>) -> Self {
        self.answer_key = Some(answer_key.into());
        self
    }

    pub fn with_strictness(mut self, strictness: f64) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_mode(mut self, mode: PassMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_file_metadata(mut self, file_metadata: FileMetadata) -> Self {
        self.file_metadata = file_metadata;
        self
    }

    pub fn require_high_accuracy(mut self, required: bool) -> Self {
        self.require_high_accuracy = required;
        self
    }

    /// Strictness clamped to `[0, 1]`; non-finite values become the default.
    pub fn effective_strictness(&self) -> f64 {
        if self.strictness.is_finite() {
            self.strictness.clamp(0.0, 1.0)
        } else {
            default_strictness()
        }
    }

    fn context(&self) -> GradingContext {
        GradingContext {
            question_text: self.question_text.clone(),
            answer_key: self.answer_key.clone(),
            rubric: self.rubric.clone(),
        }
    }
}

/// What one round (initial or retry) produced after gating.
#[derive(Debug, Clone)]
struct Round {
    graded: RawGradingResult,
    report: AccuracyReport,
    consensus: Option<ConsensusSummary>,
    pass_tags: Vec<String>,
}

/// Wires coordinator, consensus engine and gate together.
#[derive(Debug, Clone)]
pub struct GradingPipeline {
    coordinator: MultiPassCoordinator,
    consensus: ConsensusEngine,
    gate: AccuracyGate,
    stats: Arc<GradingStats>,
}

impl GradingPipeline {
    pub fn new(oracle: Arc<dyn GradingOracle>, config: GradingConfig, stats: Arc<GradingStats>) -> Self {
        let GradingConfig {
            coordinator,
            consensus,
            quality,
            gate,
        } = config;
        Self {
            coordinator: MultiPassCoordinator::new(oracle, coordinator),
            consensus: ConsensusEngine::new(consensus),
            gate: AccuracyGate::new(gate, quality),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<GradingStats> {
        &self.stats
    }

    /// Grade one submission.
    ///
    /// Only [`GradingError::Exhausted`] is returned for oracle trouble; every
    /// other degradation is absorbed into the report.
    pub async fn grade_with_accuracy(&self, request: GradingRequest) -> Result<FinalResult> {
        let request_id = Uuid::new_v4();
        let span = grading_span(&request_id.to_string());
        let started = Instant::now();

        let outcome = self.grade_inner(request_id, request).instrument(span).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => {
                self.stats.inc_results_accepted();
                emit_grading_finished(&request_id.to_string(), duration_ms, result.retried, true);
            }
            Err(_) => {
                self.stats.inc_requests_failed();
                emit_grading_finished(&request_id.to_string(), duration_ms, true, false);
            }
        }
        outcome
    }

    async fn grade_inner(&self, request_id: Uuid, request: GradingRequest) -> Result<FinalResult> {
        let strictness = request.effective_strictness();
        let rubric = request.rubric.as_ref();
        let submission: Arc<str> = Arc::from(request.submission_text.as_str());
        let context = Arc::new(request.context());

        emit_grading_started(
            &request_id.to_string(),
            &request.mode.to_string(),
            strictness,
            rubric.map(|r| r.criteria.len()).unwrap_or(0),
        );

        let first = self
            .coordinator
            .run_passes(Arc::clone(&submission), Arc::clone(&context), strictness, request.mode)
            .await;

        let (round, retried) = match first {
            Ok(passes) => {
                self.stats.add_passes(passes.attempted(), passes.failures.len());
                let attempts = passes.attempted();
                let round = self.finish_round(passes, rubric)?;
                let decision = self.gate.decide(&round.report, strictness);
                emit_gate_evaluated(
                    round.report.overall_confidence,
                    &round.report.accuracy_level.to_string(),
                    decision.is_accept(),
                );
                match decision {
                    GateDecision::Retry { strictness_variants } if request.require_high_accuracy => {
                        let round = self
                            .retry_round(
                                &request_id,
                                "low confidence",
                                submission,
                                context,
                                rubric,
                                &strictness_variants,
                                attempts,
                                None,
                            )
                            .await?;
                        (round, true)
                    }
                    _ => (round, false),
                }
            }
            Err(GradingError::InsufficientResults {
                attempted,
                succeeded,
                last_error,
                ..
            }) => {
                self.stats.add_passes(attempted, attempted.saturating_sub(succeeded));
                let variants = self.gate.retry_variants(strictness);
                let round = self
                    .retry_round(
                        &request_id,
                        "insufficient results",
                        submission,
                        context,
                        rubric,
                        &variants,
                        attempted,
                        last_error,
                    )
                    .await?;
                (round, true)
            }
            Err(e) => return Err(e),
        };

        Ok(FinalResult {
            request_id,
            score: round.graded.score,
            total: round.graded.total,
            criteria_scores: round.graded.criteria_scores,
            grading_feedback: round.graded.feedback,
            accuracy_metrics: round.report,
            consensus: round.consensus,
            pass_tags: round.pass_tags,
            retried,
            file_metadata: request.file_metadata,
            graded_at: Utc::now(),
        })
    }

    /// The single retry round; its result is never gated again.
    #[allow(clippy::too_many_arguments)]
    async fn retry_round(
        &self,
        request_id: &Uuid,
        reason: &str,
        submission: Arc<str>,
        context: Arc<GradingContext>,
        rubric: Option<&Rubric>,
        variants: &[f64],
        prior_attempts: usize,
        prior_error: Option<String>,
    ) -> Result<Round> {
        self.stats.inc_retries();
        emit_grading_retry(&request_id.to_string(), reason, variants);

        let plan = retry_plan(variants);
        let required = self.coordinator.config().min_results;
        match self.coordinator.run_plan(submission, context, plan, required).await {
            Ok(passes) => {
                self.stats.add_passes(passes.attempted(), passes.failures.len());
                let round = self.finish_round(passes, rubric)?;
                emit_gate_evaluated(
                    round.report.overall_confidence,
                    &round.report.accuracy_level.to_string(),
                    true,
                );
                Ok(round)
            }
            Err(GradingError::InsufficientResults {
                attempted,
                succeeded,
                last_error,
                ..
            }) => {
                self.stats.add_passes(attempted, attempted.saturating_sub(succeeded));
                let last_error = last_error
                    .or(prior_error)
                    .unwrap_or_else(|| "no oracle pass succeeded".to_string());
                Err(GradingError::Exhausted {
                    attempts: prior_attempts + attempted,
                    last_error,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Validate, reconcile, align and gate the passes of one round.
    fn finish_round(&self, passes: PassReport, rubric: Option<&Rubric>) -> Result<Round> {
        let pass_tags: Vec<String> = passes.results.iter().map(|p| p.tag.clone()).collect();
        let validated: Vec<RawGradingResult> = passes
            .results
            .into_iter()
            .map(|p| validate_and_repair(p.result, rubric))
            .collect();

        let (mut graded, consensus) = if validated.len() >= 2 {
            let consensus = self.consensus.reconcile(&validated)?;
            self.stats.inc_consensus_runs();
            let summary = consensus.summary();
            (consensus.into_graded(), Some(summary))
        } else {
            let single = validated.into_iter().next().ok_or(GradingError::InsufficientResults {
                attempted: pass_tags.len(),
                succeeded: 0,
                required: 1,
                last_error: None,
            })?;
            (single, None)
        };

        match rubric {
            Some(rubric) => {
                let alignment = align_in_place(&mut graded, rubric);
                debug!(
                    backfilled = alignment.backfilled.len(),
                    extra = alignment.extra.len(),
                    "aligned graded result"
                );
            }
            None => repair_in_place(&mut graded, None),
        }

        let report = self.gate.evaluate(&graded, rubric);
        self.stats.add_scorer_fallbacks(report.fallbacks.len());

        Ok(Round {
            graded,
            report,
            consensus,
            pass_tags,
        })
    }
}
