//! Alignment of a result against the authoritative rubric.
//!
//! - rubric criteria missing from the result are backfilled with zero points;
//! - `max_points` of matching criteria are overwritten from the rubric;
//! - criteria the rubric does not know are kept untouched;
//! - score and total are then re-derived by the validator.

use serde::{Deserialize, Serialize};
use tracing::debug;

use grading_oracle::{CriterionScore, RawGradingResult, Rubric};

use crate::validator::repair_in_place;

/// Feedback attached to backfilled criteria.
pub const MISSING_CRITERION_FEEDBACK: &str = "No evaluation provided for this criterion.";

/// What alignment changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Alignment {
    pub backfilled: Vec<String>,
    pub max_points_overwritten: Vec<String>,
    /// Criteria present in the result but absent from the rubric.
    pub extra: Vec<String>,
}

impl Alignment {
    pub fn is_noop(&self) -> bool {
        self.backfilled.is_empty() && self.max_points_overwritten.is_empty()
    }
}

/// Align `result` to `rubric` and return it.
pub fn align_to_rubric(mut result: RawGradingResult, rubric: &Rubric) -> RawGradingResult {
    align_in_place(&mut result, rubric);
    result
}

/// Align `result` to `rubric` in place, reporting what changed.
pub fn align_in_place(result: &mut RawGradingResult, rubric: &Rubric) -> Alignment {
    let mut alignment = Alignment::default();

    for c in result.criteria_scores.iter_mut() {
        match rubric.get(&c.name) {
            Some(criterion) => {
                if c.max_points != criterion.max_points {
                    alignment.max_points_overwritten.push(c.name.clone());
                    c.max_points = criterion.max_points;
                }
            }
            None => alignment.extra.push(c.name.clone()),
        }
    }

    for criterion in &rubric.criteria {
        let present = result
            .criteria_scores
            .iter()
            .any(|c| c.name == criterion.name);
        if !present {
            alignment.backfilled.push(criterion.name.clone());
            result.criteria_scores.push(
                CriterionScore::new(criterion.name.clone(), 0.0, criterion.max_points)
                    .with_feedback(MISSING_CRITERION_FEEDBACK),
            );
        }
    }

    // Every rubric criterion is now present with the rubric's maximum, so the
    // criteria sum equals the rubric total plus any extra criteria.
    repair_in_place(result, None);

    if !alignment.is_noop() {
        debug!(
            tag = %result.approach_tag,
            backfilled = alignment.backfilled.len(),
            overwritten = alignment.max_points_overwritten.len(),
            extra = alignment.extra.len(),
            "result aligned to rubric"
        );
    }
    alignment
}
