//! Engine-side result types: consensus, accuracy report and the final payload.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use grading_oracle::{CriterionScore, FileMetadata, RawGradingResult};

/// Tag given to a result synthesised from several passes.
pub const CONSENSUS_TAG: &str = "consensus";

/// Statistically reconciled result of two or more passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusResult {
    pub final_score: f64,
    pub final_total: f64,
    pub criteria_scores: Vec<CriterionScore>,
    pub consensus_feedback: String,
    /// In `[0, 1]`.
    pub confidence_score: f64,
    /// In `[0, 1]`.
    pub agent_agreement: f64,
    /// Passes flagged as statistical outliers (excluded from aggregation).
    pub outlier_tags: BTreeSet<String>,
    /// Number of passes that contributed to the aggregate.
    pub evaluator_count: usize,
    /// Per-pass confidence weights, in input order.
    pub evaluator_confidences: Vec<(String, f64)>,
}

impl ConsensusResult {
    /// Convert to a gradable result for reconciliation and scoring.
    ///
    /// The weighted consensus score becomes the `reported_score`, so a later
    /// re-derivation from the averaged criteria shows up as a repair.
    pub fn into_graded(self) -> RawGradingResult {
        RawGradingResult {
            score: self.final_score,
            total: self.final_total,
            criteria_scores: self.criteria_scores,
            feedback: self.consensus_feedback,
            approach_tag: CONSENSUS_TAG.to_string(),
            reported_score: Some(self.final_score),
        }
    }

    pub fn summary(&self) -> ConsensusSummary {
        ConsensusSummary {
            confidence_score: self.confidence_score,
            agent_agreement: self.agent_agreement,
            outlier_tags: self.outlier_tags.clone(),
            evaluator_count: self.evaluator_count,
        }
    }
}

/// The consensus facts attached to a final result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusSummary {
    pub confidence_score: f64,
    pub agent_agreement: f64,
    pub outlier_tags: BTreeSet<String>,
    pub evaluator_count: usize,
}

/// Accuracy tier, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyLevel {
    Low,
    Fair,
    Moderate,
    Good,
    High,
    Excellent,
}

impl std::fmt::Display for AccuracyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccuracyLevel::Low => "low",
            AccuracyLevel::Fair => "fair",
            AccuracyLevel::Moderate => "moderate",
            AccuracyLevel::Good => "good",
            AccuracyLevel::High => "high",
            AccuracyLevel::Excellent => "excellent",
        };
        write!(f, "{s}")
    }
}

/// Why a quality signal fell back to its neutral default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreFallback {
    pub signal: String,
    pub default: f64,
    pub reason: String,
}

/// Confidence breakdown of one result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccuracyReport {
    pub mathematical_accuracy: f64,
    pub feedback_quality: f64,
    pub score_reasonableness: f64,
    pub evidence_quality: f64,
    pub overall_confidence: f64,
    pub accuracy_level: AccuracyLevel,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<ScoreFallback>,
}

/// The payload handed to persistence and API layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalResult {
    pub request_id: Uuid,
    pub score: f64,
    pub total: f64,
    pub criteria_scores: Vec<CriterionScore>,
    pub grading_feedback: String,
    pub accuracy_metrics: AccuracyReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusSummary>,
    /// Tags of the passes that fed this result.
    pub pass_tags: Vec<String>,
    /// Whether the bounded retry round produced this result.
    pub retried: bool,
    #[serde(default)]
    pub file_metadata: FileMetadata,
    pub graded_at: DateTime<Utc>,
}

impl FinalResult {
    /// `score / total`, or 0 when the total is not positive.
    pub fn percentage(&self) -> f64 {
        if self.total > 0.0 {
            self.score / self.total
        } else {
            0.0
        }
    }
}
