//! Heuristic quality signals for a single grading result.
//!
//! Four independent signals, each in `[0, 1]`:
//!
//! | Signal | Measures |
//! |---|---|
//! | `mathematical_accuracy` | reported score vs. criterion sum, plus per-criterion validity |
//! | `feedback_quality` | feedback length, structure, constructiveness, criterion coverage |
//! | `score_reasonableness` | overall percentage range and spread across criteria |
//! | `evidence_quality` | evidence and actionable-suggestion keywords |
//!
//! A signal that cannot be computed never blocks grading: [`guarded`] swaps in
//! the configured neutral default and records a [`ScoreFallback`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use grading_oracle::{RawGradingResult, Rubric};

use crate::config::QualityConfig;
use crate::domain::ScoreFallback;
use crate::math::{clamp_unit, sample_std_dev};

/// Why a signal could not be computed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    /// Expected input is structurally absent (no criteria, no total).
    #[error("insufficient input: {0}")]
    Insufficient(&'static str),

    /// A number needed by the heuristic is NaN or infinite.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// The four signals plus any fallbacks taken while computing them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityScores {
    pub mathematical_accuracy: f64,
    pub feedback_quality: f64,
    pub score_reasonableness: f64,
    pub evidence_quality: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<ScoreFallback>,
}

/// Run `compute`, replacing an error with `default` and recording why.
///
/// Structural absence is expected and logged at `debug`; anything else is a
/// scoring bug and logged at `warn`.
pub fn guarded<F>(signal: &str, default: f64, fallbacks: &mut Vec<ScoreFallback>, compute: F) -> f64
where
    F: FnOnce() -> Result<f64, ScoringError>,
{
    match compute() {
        Ok(value) if value.is_finite() => clamp_unit(value),
        Ok(_) => {
            warn!(signal, default, "quality signal produced a non-finite value");
            fallbacks.push(ScoreFallback {
                signal: signal.to_string(),
                default,
                reason: "non-finite result".to_string(),
            });
            default
        }
        Err(err) => {
            match &err {
                ScoringError::Insufficient(_) => debug!(signal, default, error = %err, "quality signal defaulted"),
                ScoringError::NonFinite(_) => warn!(signal, default, error = %err, "quality signal defaulted"),
            }
            fallbacks.push(ScoreFallback {
                signal: signal.to_string(),
                default,
                reason: err.to_string(),
            });
            default
        }
    }
}

/// Computes [`QualityScores`] from a result.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Score all four signals. Never fails.
    pub fn score(&self, result: &RawGradingResult, rubric: Option<&Rubric>) -> QualityScores {
        let mut fallbacks = Vec::new();
        let cfg = &self.config;

        let mathematical_accuracy = guarded(
            "mathematical_accuracy",
            cfg.math_neutral_default,
            &mut fallbacks,
            || self.mathematical_accuracy(result),
        );
        let feedback_quality = guarded("feedback_quality", cfg.neutral_default, &mut fallbacks, || {
            Ok(self.feedback_quality(result))
        });
        let score_reasonableness = guarded(
            "score_reasonableness",
            cfg.neutral_default,
            &mut fallbacks,
            || self.score_reasonableness(result, rubric),
        );
        let evidence_quality = guarded("evidence_quality", cfg.neutral_default, &mut fallbacks, || {
            Ok(self.evidence_quality(result))
        });

        QualityScores {
            mathematical_accuracy,
            feedback_quality,
            score_reasonableness,
            evidence_quality,
            fallbacks,
        }
    }

    /// 70% agreement between reported and summed score, 30% criterion validity.
    pub fn mathematical_accuracy(&self, result: &RawGradingResult) -> Result<f64, ScoringError> {
        if result.criteria_scores.is_empty() {
            return Err(ScoringError::Insufficient("no criteria scores"));
        }
        let reported = result.reported_score.unwrap_or(result.score);
        let summed = result.criteria_points();
        if !reported.is_finite() || !summed.is_finite() {
            return Err(ScoringError::NonFinite("score"));
        }

        let diff = (reported - summed).abs();
        let total_accuracy = if diff < 0.01 {
            1.0
        } else if diff < 0.5 {
            0.9
        } else if diff < 1.0 {
            0.7
        } else {
            0.4
        };

        let invalid = result
            .criteria_scores
            .iter()
            .filter(|c| c.points > c.max_points || c.points < 0.0)
            .count();
        let validity = 1.0 - invalid as f64 / result.criteria_scores.len() as f64;

        Ok(total_accuracy * 0.7 + validity * 0.3)
    }

    /// Additive length/structure/coverage heuristic, capped at 1.
    pub fn feedback_quality(&self, result: &RawGradingResult) -> f64 {
        let cfg = &self.config;
        let feedback = result.feedback.to_lowercase();
        let len = result.feedback.chars().count();

        let mut score = if len > 150 {
            0.3
        } else if len > 75 {
            0.2
        } else if len > 25 {
            0.1
        } else {
            0.0
        };

        if contains_any(&feedback, &cfg.structure_keywords) {
            score += 0.1;
        }
        if contains_any(&feedback, &cfg.constructive_keywords) {
            score += 0.1;
        }

        if !result.criteria_scores.is_empty() {
            let covered = result
                .criteria_scores
                .iter()
                .filter(|c| c.feedback.chars().count() > cfg.criterion_feedback_min_chars)
                .count();
            score += covered as f64 / result.criteria_scores.len() as f64 * 0.4;
        }

        score.min(1.0)
    }

    /// 60% percentage-in-range, 40% consistency of criterion percentages.
    pub fn score_reasonableness(
        &self,
        result: &RawGradingResult,
        rubric: Option<&Rubric>,
    ) -> Result<f64, ScoringError> {
        let total = if result.total > 0.0 {
            result.total
        } else {
            rubric.map(Rubric::computed_total).unwrap_or(0.0)
        };
        if !result.score.is_finite() || !total.is_finite() {
            return Err(ScoringError::NonFinite("score/total"));
        }
        if total <= 0.0 {
            return Err(ScoringError::Insufficient("non-positive total"));
        }

        let percentage = result.score / total;
        let range = if (0.05..=0.95).contains(&percentage) {
            1.0
        } else if (0.0..=1.0).contains(&percentage) {
            0.8
        } else {
            0.2
        };

        let percentages: Vec<f64> = result
            .criteria_scores
            .iter()
            .filter_map(|c| c.percentage())
            .collect();
        if percentages.iter().any(|p| !p.is_finite()) {
            return Err(ScoringError::NonFinite("criterion percentage"));
        }
        let distribution = match sample_std_dev(&percentages) {
            Some(std) => (1.0 - std * self.config.distribution_penalty).max(0.0),
            None => 1.0,
        };

        Ok(range * 0.6 + distribution * 0.4)
    }

    /// Keyword-density heuristic over the main and per-criterion feedback.
    pub fn evidence_quality(&self, result: &RawGradingResult) -> f64 {
        let cfg = &self.config;
        let feedback = result.feedback.to_lowercase();

        let matches = count_present(&feedback, &cfg.evidence_keywords);
        let mut score = if matches >= 3 {
            0.4
        } else if matches >= 1 {
            0.2
        } else {
            0.0
        };

        let quoted = feedback.contains('"') || feedback.contains('“') || feedback.contains('”');
        if quoted || feedback.contains("example") || feedback.contains("such as") {
            score += 0.2;
        }

        if !result.criteria_scores.is_empty() {
            let with_evidence = result
                .criteria_scores
                .iter()
                .filter(|c| contains_any(&c.feedback.to_lowercase(), &cfg.evidence_keywords))
                .count();
            score += with_evidence as f64 / result.criteria_scores.len() as f64 * 0.3;
        }

        if contains_any(&feedback, &cfg.actionable_keywords) {
            score += 0.1;
        }

        score.min(1.0)
    }
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| haystack.contains(k.as_str()))
}

fn count_present(haystack: &str, keywords: &[String]) -> usize {
    keywords.iter().filter(|k| haystack.contains(k.as_str())).count()
}
