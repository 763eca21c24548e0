//! Mathematical consistency checks and deterministic repair.
//!
//! The oracle's self-reported totals are never trusted. After repair:
//!
//! - every criterion has `points >= 0`, and `points <= max_points` whenever
//!   `max_points > 0`;
//! - `score` is the exact sum of criterion points;
//! - `total` is the sum of criterion maxima, or the rubric's total when a
//!   non-empty rubric is supplied.
//!
//! Repair never fails and is idempotent.

use serde::{Deserialize, Serialize};
use tracing::debug;

use grading_oracle::{RawGradingResult, Rubric};

use crate::math::finite_or_zero;

/// What a repair would change, computed without mutating the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssues {
    pub reported_score: f64,
    pub derived_score: f64,
    /// Criteria whose points exceeded their maximum.
    pub clipped: Vec<String>,
    /// Criteria with negative points.
    pub negative: Vec<String>,
}

impl ValidationIssues {
    pub fn score_mismatch(&self) -> f64 {
        (self.reported_score - self.derived_score).abs()
    }

    pub fn is_clean(&self) -> bool {
        self.clipped.is_empty() && self.negative.is_empty() && self.score_mismatch() < 0.01
    }
}

/// Inspect `result` for the violations [`validate_and_repair`] fixes.
pub fn audit(result: &RawGradingResult) -> ValidationIssues {
    let mut issues = ValidationIssues {
        reported_score: finite_or_zero(result.reported_score.unwrap_or(result.score)),
        ..ValidationIssues::default()
    };
    for c in &result.criteria_scores {
        let points = finite_or_zero(c.points);
        let max = finite_or_zero(c.max_points).max(0.0);
        if points < 0.0 {
            issues.negative.push(c.name.clone());
        } else if max > 0.0 && points > max {
            issues.clipped.push(c.name.clone());
        }
        issues.derived_score += clip(points, max);
    }
    issues
}

/// Repair `result` and return it.
pub fn validate_and_repair(mut result: RawGradingResult, rubric: Option<&Rubric>) -> RawGradingResult {
    repair_in_place(&mut result, rubric);
    result
}

/// In-place variant of [`validate_and_repair`].
pub fn repair_in_place(result: &mut RawGradingResult, rubric: Option<&Rubric>) {
    result.score = finite_or_zero(result.score);
    result.total = finite_or_zero(result.total);
    if result.reported_score.is_none() {
        result.reported_score = Some(result.score);
    }

    for c in result.criteria_scores.iter_mut() {
        let max = finite_or_zero(c.max_points).max(0.0);
        let points = clip(finite_or_zero(c.points), max);
        if points != c.points {
            debug!(criterion = %c.name, from = c.points, to = points, "criterion points repaired");
        }
        c.max_points = max;
        c.points = points;
    }

    let derived_score = result.criteria_points();
    let derived_total = match rubric {
        Some(r) if !r.is_empty() => r.computed_total(),
        _ => result.criteria_max(),
    };

    if (derived_score - result.score).abs() >= 0.01 || (derived_total - result.total).abs() >= 0.01 {
        debug!(
            tag = %result.approach_tag,
            reported_score = result.score,
            derived_score,
            reported_total = result.total,
            derived_total,
            "score/total recomputed from criteria"
        );
    }
    result.score = derived_score;
    result.total = derived_total;
}

fn clip(points: f64, max: f64) -> f64 {
    if points < 0.0 {
        0.0
    } else if max > 0.0 && points > max {
        max
    } else {
        points
    }
}
