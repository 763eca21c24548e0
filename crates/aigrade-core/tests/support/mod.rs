#![allow(dead_code)]

use std::sync::Arc;

use aigrade_core::{GradingConfig, GradingPipeline, GradingStats};
use grading_oracle::{Criterion, CriterionScore, GradingOracle, RawGradingResult, Rubric};

pub const RICH_FEEDBACK: &str = "Overall a strong answer. Strengths: the essay specifically \
     demonstrates the causal chain, for example the second section shows how tariffs \
     shifted trade. Consider tightening the conclusion; I suggest one more citation.";

pub fn content_style() -> Rubric {
    Rubric::new(vec![
        Criterion::new("Content", 50.0),
        Criterion::new("Style", 50.0),
    ])
}

/// A well-supported 80/100 result that clears the accuracy gate.
pub fn rich(content: f64, style: f64) -> RawGradingResult {
    RawGradingResult::new(
        content + style,
        100.0,
        vec![
            CriterionScore::new("Content", content, 50.0)
                .with_feedback("The argument clearly demonstrates the core mechanism."),
            CriterionScore::new("Style", style, 50.0)
                .with_feedback("Prose is clear; section transitions show good control."),
        ],
    )
    .with_feedback(RICH_FEEDBACK)
}

/// A terse 50/100 result that the gate sends to retry.
pub fn poor() -> RawGradingResult {
    RawGradingResult::new(
        50.0,
        100.0,
        vec![
            CriterionScore::new("Content", 25.0, 50.0),
            CriterionScore::new("Style", 25.0, 50.0),
        ],
    )
    .with_feedback("ok")
}

pub fn pipeline(oracle: Arc<dyn GradingOracle>) -> GradingPipeline {
    GradingPipeline::new(oracle, GradingConfig::default(), Arc::new(GradingStats::new()))
}

pub fn pipeline_with(oracle: Arc<dyn GradingOracle>, config: GradingConfig) -> GradingPipeline {
    GradingPipeline::new(oracle, config, Arc::new(GradingStats::new()))
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
