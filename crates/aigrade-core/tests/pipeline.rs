//! End-to-end grading scenarios against the scripted oracle.

mod support;

use std::sync::Arc;
use std::time::Duration;

use aigrade_core::reconcile::MISSING_CRITERION_FEEDBACK;
use aigrade_core::{
    AccuracyLevel, GradingConfig, GradingError, GradingRequest, PassMode,
};
use grading_oracle::fakes::{ScriptStep, ScriptedOracle};
use grading_oracle::{CriterionScore, OracleError, RawGradingResult, Rubric};

use support::{close, content_style, pipeline, pipeline_with, poor, rich};

fn approaches_responding(result: RawGradingResult) -> ScriptedOracle {
    ScriptedOracle::new().respond("default", result)
}

#[tokio::test]
async fn three_agreeing_passes_are_accepted_without_retry() {
    let oracle = Arc::new(approaches_responding(rich(40.0, 40.0)));
    let pipeline = pipeline(oracle.clone());

    let result = pipeline
        .grade_with_accuracy(GradingRequest::new("essay").with_rubric(content_style()))
        .await
        .unwrap();

    assert!(!result.retried);
    assert_eq!(oracle.calls().len(), 3);
    assert_eq!(result.pass_tags, vec!["standard", "detailed", "holistic"]);
    assert!(close(result.score, 80.0));
    assert!(close(result.total, 100.0));
    let consensus = result.consensus.as_ref().unwrap();
    assert_eq!(consensus.evaluator_count, 3);
    assert!(close(consensus.agent_agreement, 1.0));
    assert!(result.accuracy_metrics.overall_confidence >= 0.7);
    assert!(result.accuracy_metrics.accuracy_level >= AccuracyLevel::High);
    assert_eq!(pipeline.stats().snapshot().results_accepted, 1);
}

#[tokio::test]
async fn scenario_a_mismatched_reported_score_is_repaired() {
    let reported = RawGradingResult::new(
        50.0,
        100.0,
        vec![
            CriterionScore::new("Content", 40.0, 50.0),
            CriterionScore::new("Style", 30.0, 50.0),
        ],
    );
    let oracle = Arc::new(
        ScriptedOracle::new()
            .respond("standard", reported)
            .fail("detailed", "rate limited")
            .fail("holistic", "rate limited"),
    );
    let pipeline = pipeline(oracle);

    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(content_style())
                .require_high_accuracy(false),
        )
        .await
        .unwrap();

    assert!(result.consensus.is_none());
    assert_eq!(result.pass_tags, vec!["standard"]);
    assert!(close(result.score, 70.0));
    assert!(close(result.total, 100.0));
    assert!(close(result.accuracy_metrics.mathematical_accuracy, 0.4 * 0.7 + 0.3));
    assert!(result.accuracy_metrics.recommendations[0].starts_with("Verify mathematical"));
}

#[tokio::test]
async fn scenario_b_over_maximum_points_are_clipped() {
    let oracle = Arc::new(approaches_responding(RawGradingResult::new(
        110.0,
        100.0,
        vec![
            CriterionScore::new("Content", 60.0, 50.0),
            CriterionScore::new("Style", 50.0, 50.0),
        ],
    )));
    let pipeline = pipeline(oracle);

    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(content_style())
                .require_high_accuracy(false),
        )
        .await
        .unwrap();

    assert!(close(result.criteria_scores[0].points, 50.0));
    assert!(close(result.score, 100.0));
    assert!(result.score <= result.total);
}

#[tokio::test]
async fn scenario_d_missing_criterion_is_backfilled() {
    let oracle = Arc::new(approaches_responding(
        RawGradingResult::new(40.0, 50.0, vec![CriterionScore::new("Content", 40.0, 50.0)])
            .with_feedback("Good content."),
    ));
    let pipeline = pipeline(oracle);

    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(content_style())
                .require_high_accuracy(false),
        )
        .await
        .unwrap();

    assert_eq!(result.criteria_scores.len(), 2);
    let style = &result.criteria_scores[1];
    assert_eq!(style.name, "Style");
    assert_eq!(style.points, 0.0);
    assert_eq!(style.feedback, MISSING_CRITERION_FEEDBACK);
    assert!(close(result.total, 100.0));
    assert!(close(result.score, 40.0));
}

#[tokio::test]
async fn scenario_e_low_confidence_triggers_exactly_one_retry() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .respond("standard", poor())
            .respond("holistic", poor())
            .respond("detailed", poor())
            .respond("detailed", rich(45.0, 40.0)),
    );
    let pipeline = pipeline(oracle.clone());

    let result = pipeline
        .grade_with_accuracy(GradingRequest::new("essay").with_rubric(content_style()))
        .await
        .unwrap();

    assert!(result.retried);
    let calls = oracle.calls();
    assert_eq!(calls.len(), 6);
    let retry_calls = &calls[3..];
    assert!(retry_calls.iter().all(|c| c.approach == "detailed"));
    let mut strictness: Vec<f64> = retry_calls.iter().map(|c| c.strictness).collect();
    strictness.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!(close(strictness[0], 0.4));
    assert!(close(strictness[1], 0.5));
    assert!(close(strictness[2], 0.6));

    assert!(close(result.score, 85.0));
    assert!(result.pass_tags.iter().all(|t| t.starts_with("detailed@")));
    assert_eq!(pipeline.stats().snapshot().retries, 1);
}

#[tokio::test]
async fn retry_result_is_accepted_even_when_still_weak() {
    let oracle = Arc::new(approaches_responding(poor()));
    let pipeline = pipeline(oracle.clone());

    let result = pipeline
        .grade_with_accuracy(GradingRequest::new("essay").with_rubric(content_style()))
        .await
        .unwrap();

    assert!(result.retried);
    assert_eq!(oracle.calls().len(), 6);
    assert!(result.accuracy_metrics.overall_confidence < 0.7);
}

#[tokio::test]
async fn low_confidence_is_accepted_when_high_accuracy_not_required() {
    let oracle = Arc::new(approaches_responding(poor()));
    let pipeline = pipeline(oracle.clone());

    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(content_style())
                .require_high_accuracy(false),
        )
        .await
        .unwrap();

    assert!(!result.retried);
    assert_eq!(oracle.calls().len(), 3);
}

#[tokio::test]
async fn total_failure_in_both_rounds_is_exhausted() {
    let oracle = Arc::new(ScriptedOracle::new().fail("default", "upstream 503"));
    let pipeline = pipeline(oracle.clone());

    let err = pipeline
        .grade_with_accuracy(GradingRequest::new("essay"))
        .await
        .unwrap_err();

    match err {
        GradingError::Exhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 6);
            assert!(last_error.contains("upstream 503"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(oracle.calls().len(), 6);
    assert_eq!(pipeline.stats().snapshot().requests_failed, 1);
}

#[tokio::test]
async fn empty_first_round_recovers_through_retry() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .fail("standard", "boom")
            .fail("holistic", "boom")
            .fail("detailed", "boom")
            .respond("detailed", rich(40.0, 40.0)),
    );
    let pipeline = pipeline(oracle.clone());

    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(content_style())
                .require_high_accuracy(false),
        )
        .await
        .unwrap();

    assert!(result.retried);
    assert_eq!(result.pass_tags.len(), 3);
    assert!(close(result.score, 80.0));
}

#[tokio::test]
async fn multi_agent_mode_requires_two_successes() {
    let oracle = Arc::new(ScriptedOracle::from_fn(|approach, _| {
        if approach == "strict_evaluator" {
            Ok(rich(40.0, 40.0))
        } else {
            Err(OracleError::Rejected(format!("{approach} unavailable")))
        }
    }));
    let pipeline = pipeline(oracle.clone());

    let err = pipeline
        .grade_with_accuracy(GradingRequest::new("essay").with_mode(PassMode::MultiAgent))
        .await
        .unwrap_err();

    match err {
        GradingError::Exhausted { attempts, last_error } => {
            assert_eq!(attempts, 8);
            assert!(last_error.contains("detailed unavailable"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn multi_agent_mode_reconciles_personas() {
    let oracle = Arc::new(ScriptedOracle::from_fn(|_, strictness| {
        let content = 45.0 - strictness * 10.0;
        Ok(rich(content, 40.0))
    }));
    let pipeline = pipeline(oracle.clone());

    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(content_style())
                .with_mode(PassMode::MultiAgent)
                .require_high_accuracy(false),
        )
        .await
        .unwrap();

    let consensus = result.consensus.unwrap();
    assert_eq!(consensus.evaluator_count, 5);
    assert!(consensus.outlier_tags.is_empty());
    assert!(consensus.agent_agreement > 0.9);
    assert_eq!(result.pass_tags[0], "strict_evaluator");
    assert!(close(result.score, result.criteria_scores.iter().map(|c| c.points).sum()));
}

#[tokio::test(start_paused = true)]
async fn slow_pass_is_dropped_after_timeout() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .respond("standard", rich(40.0, 40.0))
            .respond("detailed", rich(42.0, 40.0))
            .push(
                "holistic",
                ScriptStep::Delay(Duration::from_secs(30), rich(10.0, 10.0)),
            ),
    );
    let mut config = GradingConfig::default();
    config.coordinator.oracle_timeout_ms = 1_000;
    let pipeline = pipeline_with(oracle, config);

    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(content_style())
                .require_high_accuracy(false),
        )
        .await
        .unwrap();

    assert_eq!(result.pass_tags, vec!["standard", "detailed"]);
    assert_eq!(result.consensus.unwrap().evaluator_count, 2);
    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.passes_attempted, 3);
    assert_eq!(stats.passes_failed, 1);
}

#[tokio::test]
async fn degenerate_rubric_yields_neutral_defaults() {
    let oracle = Arc::new(approaches_responding(RawGradingResult::default()));
    let pipeline = pipeline(oracle);

    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(Rubric::default())
                .require_high_accuracy(false),
        )
        .await
        .unwrap();

    assert_eq!(result.total, 0.0);
    assert_eq!(result.score, 0.0);
    assert_eq!(result.percentage(), 0.0);
    let metrics = &result.accuracy_metrics;
    assert!(close(metrics.mathematical_accuracy, 0.7));
    assert!(close(metrics.score_reasonableness, 0.5));
    assert!(metrics.overall_confidence.is_finite());
    assert!((0.0..=1.0).contains(&metrics.overall_confidence));
    let signals: Vec<&str> = metrics.fallbacks.iter().map(|f| f.signal.as_str()).collect();
    assert!(signals.contains(&"mathematical_accuracy"));
    assert!(signals.contains(&"score_reasonableness"));
}

#[tokio::test]
async fn out_of_range_strictness_is_clamped_before_planning() {
    let oracle = Arc::new(approaches_responding(rich(40.0, 40.0)));
    let pipeline = pipeline(oracle.clone());

    pipeline
        .grade_with_accuracy(GradingRequest::new("essay").with_strictness(3.0))
        .await
        .unwrap();

    assert!(oracle.calls().iter().all(|c| (0.0..=1.0).contains(&c.strictness)));
}
