//! Rubric and grading-result schema shared by the oracle and the engine.

use serde::{Deserialize, Serialize};

/// One named criterion of a rubric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criterion {
    /// Unique within the rubric.
    pub name: String,
    pub max_points: f64,
    #[serde(default)]
    pub description: String,
}

impl Criterion {
    pub fn new(name: impl Into<String>, max_points: f64) -> Self {
        Self {
            name: name.into(),
            max_points,
            description: String::new(),
        }
    }
}

/// Authoritative grading rubric.
///
/// `total_points` is advisory; consumers always use [`Rubric::computed_total`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rubric {
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub total_points: f64,
}

impl Rubric {
    /// Build a rubric from its criteria, filling in the advisory total.
    pub fn new(criteria: Vec<Criterion>) -> Self {
        let total_points = criteria.iter().map(|c| c.max_points).sum();
        Self {
            criteria,
            total_points,
        }
    }

    /// Sum of the criteria maxima.
    pub fn computed_total(&self) -> f64 {
        self.criteria.iter().map(|c| c.max_points).sum()
    }

    /// Look up a criterion by exact name.
    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

/// Points awarded for one criterion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionScore {
    pub name: String,
    pub points: f64,
    pub max_points: f64,
    #[serde(default)]
    pub feedback: String,
}

impl CriterionScore {
    pub fn new(name: impl Into<String>, points: f64, max_points: f64) -> Self {
        Self {
            name: name.into(),
            points,
            max_points,
            feedback: String::new(),
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    /// Points as a fraction of the maximum, `None` when the maximum is not positive.
    pub fn percentage(&self) -> Option<f64> {
        (self.max_points > 0.0).then(|| self.points / self.max_points)
    }
}

/// A single grading attempt as produced by the oracle.
///
/// The oracle is untrusted: `score` and `total` are not guaranteed to match
/// `criteria_scores` until the engine's validator has repaired the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawGradingResult {
    pub score: f64,
    pub total: f64,
    #[serde(default)]
    pub criteria_scores: Vec<CriterionScore>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub approach_tag: String,
    /// The score the producer claimed before repair. Filled in on first
    /// validation and never overwritten afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_score: Option<f64>,
}

impl RawGradingResult {
    pub fn new(score: f64, total: f64, criteria_scores: Vec<CriterionScore>) -> Self {
        Self {
            score,
            total,
            criteria_scores,
            ..Self::default()
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.approach_tag = tag.into();
        self
    }

    /// `score / total`, or 0 when the total is not positive.
    pub fn percentage(&self) -> f64 {
        if self.total > 0.0 {
            self.score / self.total
        } else {
            0.0
        }
    }

    /// Sum of awarded criterion points.
    pub fn criteria_points(&self) -> f64 {
        self.criteria_scores.iter().map(|c| c.points).sum()
    }

    /// Sum of criterion maxima.
    pub fn criteria_max(&self) -> f64 {
        self.criteria_scores.iter().map(|c| c.max_points).sum()
    }
}

/// Everything the oracle needs besides the submission itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GradingContext {
    #[serde(default)]
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<Rubric>,
}

impl GradingContext {
    pub fn with_rubric(rubric: Rubric) -> Self {
        Self {
            rubric: Some(rubric),
            ..Self::default()
        }
    }
}

/// Metadata reported by the extraction layer; carried through as an opaque payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FileMetadata {
    pub fn named(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rubric_computed_total_ignores_advisory_total() {
        let mut rubric = Rubric::new(vec![Criterion::new("A", 30.0), Criterion::new("B", 40.0)]);
        rubric.total_points = 999.0;
        assert_eq!(rubric.computed_total(), 70.0);
        assert!(rubric.get("B").is_some());
        assert!(rubric.get("C").is_none());
    }

    #[test]
    fn criterion_percentage_requires_positive_max() {
        assert_eq!(CriterionScore::new("A", 5.0, 10.0).percentage(), Some(0.5));
        assert_eq!(CriterionScore::new("A", 5.0, 0.0).percentage(), None);
    }

    #[test]
    fn raw_result_percentage_guards_zero_total() {
        assert_eq!(RawGradingResult::new(5.0, 0.0, vec![]).percentage(), 0.0);
        assert_eq!(RawGradingResult::new(5.0, 10.0, vec![]).percentage(), 0.5);
    }

    #[test]
    fn file_metadata_keeps_unknown_fields() {
        let meta: FileMetadata = serde_json::from_value(serde_json::json!({
            "file_name": "essay.pdf",
            "ocr_engine": "tesseract"
        }))
        .unwrap();
        assert_eq!(meta.file_name.as_deref(), Some("essay.pdf"));
        assert_eq!(meta.extra["ocr_engine"], "tesseract");
    }
}
