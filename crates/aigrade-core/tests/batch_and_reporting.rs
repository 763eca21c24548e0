//! Batch isolation and persisted result artifacts.

mod support;

use std::sync::Arc;

use aigrade_core::{
    grade_batch, read_result_artifact, render_result_md, write_result_artifact, BatchSummary,
    GradingError, GradingRequest,
};
use grading_oracle::fakes::ScriptedOracle;
use grading_oracle::{FileMetadata, OracleError};

use support::{content_style, pipeline, rich};

#[tokio::test]
async fn failing_submission_does_not_affect_its_neighbours() {
    // Base strictness 0 keeps every pass, retry included, at 0.
    let oracle = Arc::new(ScriptedOracle::from_fn(|_, strictness| {
        if strictness < 0.01 {
            Err(OracleError::Rejected("refused".to_string()))
        } else {
            Ok(rich(40.0, 40.0))
        }
    }));
    let pipeline = pipeline(oracle);

    let requests = vec![
        (
            "a".to_string(),
            GradingRequest::new("first").with_rubric(content_style()),
        ),
        (
            "b".to_string(),
            GradingRequest::new("second").with_strictness(0.0),
        ),
        (
            "c".to_string(),
            GradingRequest::new("third").with_rubric(content_style()),
        ),
    ];

    let outcomes = grade_batch(&pipeline, requests, 2).await;

    let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(
        outcomes[1].result,
        Err(GradingError::Exhausted { .. })
    ));
    assert!(outcomes[2].result.is_ok());

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.graded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_ids, vec!["b".to_string()]);
    assert!(summary.mean_confidence > 0.7);
}

#[tokio::test]
async fn result_artifact_roundtrips_and_detects_tampering() {
    let oracle = Arc::new(ScriptedOracle::new().respond("default", rich(40.0, 40.0)));
    let pipeline = pipeline(oracle);
    let result = pipeline
        .grade_with_accuracy(
            GradingRequest::new("essay")
                .with_rubric(content_style())
                .with_file_metadata(FileMetadata::named("essay.pdf")),
        )
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = write_result_artifact(dir.path(), &result).unwrap();
    assert!(path.ends_with("result.json"));

    let id = result.request_id.to_string();
    let loaded = read_result_artifact(dir.path(), &id).unwrap();
    assert_eq!(loaded.request_id, result.request_id);
    assert_eq!(loaded.score, result.score);
    assert_eq!(loaded.criteria_scores.len(), 2);
    assert_eq!(
        loaded.accuracy_metrics.accuracy_level,
        result.accuracy_metrics.accuracy_level
    );
    assert_eq!(loaded.graded_at, result.graded_at);
    assert_eq!(loaded.file_metadata.file_name.as_deref(), Some("essay.pdf"));

    let mut json = std::fs::read_to_string(&path).unwrap();
    json.push('\n');
    std::fs::write(&path, json).unwrap();
    assert!(matches!(
        read_result_artifact(dir.path(), &id),
        Err(GradingError::DigestMismatch { .. })
    ));
}

#[tokio::test]
async fn markdown_report_lists_criteria_and_consensus() {
    let oracle = Arc::new(ScriptedOracle::new().respond("default", rich(40.0, 40.0)));
    let pipeline = pipeline(oracle);
    let result = pipeline
        .grade_with_accuracy(GradingRequest::new("essay").with_rubric(content_style()))
        .await
        .unwrap();

    let md = render_result_md(&result);
    assert!(md.starts_with("# Grading Result"));
    assert!(md.contains("80.0 / 100.0"));
    assert!(md.contains("| Content |"));
    assert!(md.contains("## Consensus"));
    assert!(md.contains("- Evaluators: 3"));
    assert!(md.contains("## Recommendations"));
}
