//! Accuracy gate.
//!
//! Folds the four [`QualityScores`] signals into an [`AccuracyReport`] (overall
//! confidence, tier, recommendations) and decides whether a result is
//! accepted or answered with the single retry round.

use serde::{Deserialize, Serialize};

use grading_oracle::{RawGradingResult, Rubric};

use crate::config::{GateConfig, QualityConfig};
use crate::domain::{AccuracyLevel, AccuracyReport};
use crate::math::clamp_unit;
use crate::quality::{QualityScorer, QualityScores};

/// Emitted when no signal falls below its recommendation threshold.
pub const AFFIRMATION: &str = "Grading meets accuracy standards; no corrections recommended.";

/// One of the four quality signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracySignal {
    MathematicalAccuracy,
    FeedbackQuality,
    ScoreReasonableness,
    EvidenceQuality,
}

impl AccuracySignal {
    pub const ALL: [AccuracySignal; 4] = [
        AccuracySignal::MathematicalAccuracy,
        AccuracySignal::FeedbackQuality,
        AccuracySignal::ScoreReasonableness,
        AccuracySignal::EvidenceQuality,
    ];

    fn value(self, scores: &QualityScores) -> f64 {
        match self {
            AccuracySignal::MathematicalAccuracy => scores.mathematical_accuracy,
            AccuracySignal::FeedbackQuality => scores.feedback_quality,
            AccuracySignal::ScoreReasonableness => scores.score_reasonableness,
            AccuracySignal::EvidenceQuality => scores.evidence_quality,
        }
    }

    fn recommendation_threshold(self, config: &GateConfig) -> f64 {
        let r = &config.recommendations;
        match self {
            AccuracySignal::MathematicalAccuracy => r.mathematical,
            AccuracySignal::FeedbackQuality => r.feedback,
            AccuracySignal::ScoreReasonableness => r.reasonableness,
            AccuracySignal::EvidenceQuality => r.evidence,
        }
    }

    /// Advice emitted when this signal is below its threshold.
    pub fn recommendation(self) -> &'static str {
        match self {
            AccuracySignal::MathematicalAccuracy => {
                "Verify mathematical calculations: the score should equal the sum of criterion points."
            }
            AccuracySignal::FeedbackQuality => {
                "Provide more detailed feedback covering each criterion."
            }
            AccuracySignal::ScoreReasonableness => {
                "Review score distribution across criteria for consistency."
            }
            AccuracySignal::EvidenceQuality => {
                "Include more specific evidence from the submission to support the grade."
            }
        }
    }
}

/// Gate outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Accept,
    /// Re-grade with the detailed approach at each strictness.
    Retry { strictness_variants: Vec<f64> },
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }
}

/// Builds accuracy reports and applies the retry threshold.
#[derive(Debug, Clone, Default)]
pub struct AccuracyGate {
    config: GateConfig,
    scorer: QualityScorer,
}

impl AccuracyGate {
    pub fn new(config: GateConfig, quality: QualityConfig) -> Self {
        Self {
            config,
            scorer: QualityScorer::new(quality),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Score `result` and build its report.
    pub fn evaluate(&self, result: &RawGradingResult, rubric: Option<&Rubric>) -> AccuracyReport {
        self.report_from_scores(self.scorer.score(result, rubric))
    }

    /// Build a report from precomputed signals.
    pub fn report_from_scores(&self, scores: QualityScores) -> AccuracyReport {
        let overall_confidence = self.overall_confidence(&scores);
        AccuracyReport {
            mathematical_accuracy: scores.mathematical_accuracy,
            feedback_quality: scores.feedback_quality,
            score_reasonableness: scores.score_reasonableness,
            evidence_quality: scores.evidence_quality,
            overall_confidence,
            accuracy_level: self.classify(overall_confidence),
            recommendations: self.recommendations(&scores),
            fallbacks: scores.fallbacks,
        }
    }

    /// Weighted combination of the four signals, normalised by the weight sum.
    pub fn overall_confidence(&self, scores: &QualityScores) -> f64 {
        let w = &self.config.weights;
        let weighted = scores.mathematical_accuracy * w.mathematical
            + scores.feedback_quality * w.feedback
            + scores.score_reasonableness * w.reasonableness
            + scores.evidence_quality * w.evidence;
        let weight_sum = w.mathematical + w.feedback + w.reasonableness + w.evidence;
        if weight_sum > 0.0 {
            clamp_unit(weighted / weight_sum)
        } else {
            0.0
        }
    }

    /// Map an overall confidence onto its tier.
    pub fn classify(&self, confidence: f64) -> AccuracyLevel {
        let l = &self.config.levels;
        if confidence >= l.excellent {
            AccuracyLevel::Excellent
        } else if confidence >= l.high {
            AccuracyLevel::High
        } else if confidence >= l.good {
            AccuracyLevel::Good
        } else if confidence >= l.moderate {
            AccuracyLevel::Moderate
        } else if confidence >= l.fair {
            AccuracyLevel::Fair
        } else {
            AccuracyLevel::Low
        }
    }

    /// Deterministic advice list; never empty.
    pub fn recommendations(&self, scores: &QualityScores) -> Vec<String> {
        let mut out: Vec<String> = AccuracySignal::ALL
            .iter()
            .filter(|s| s.value(scores) < s.recommendation_threshold(&self.config))
            .map(|s| s.recommendation().to_string())
            .collect();
        if out.is_empty() {
            out.push(AFFIRMATION.to_string());
        }
        out
    }

    /// Accept, or ask for the retry round around `base_strictness`.
    pub fn decide(&self, report: &AccuracyReport, base_strictness: f64) -> GateDecision {
        if report.overall_confidence >= self.config.retry_threshold {
            return GateDecision::Accept;
        }
        GateDecision::Retry {
            strictness_variants: self.retry_variants(base_strictness),
        }
    }

    /// Strictness levels for the retry round, each clamped to `[0, 1]`.
    pub fn retry_variants(&self, base_strictness: f64) -> Vec<f64> {
        self.config
            .retry_strictness_factors
            .iter()
            .map(|f| (base_strictness * f).clamp(0.0, 1.0))
            .collect()
    }
}
