//! Grading many independent submissions through one pipeline.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{FinalResult, GradingError};
use crate::pipeline::{GradingPipeline, GradingRequest};

/// The outcome of one submission in a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub id: String,
    pub result: Result<FinalResult, GradingError>,
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub graded: usize,
    pub failed: usize,
    pub retried: usize,
    pub mean_confidence: f64,
    /// Ids of failed submissions, sorted.
    pub failed_ids: Vec<String>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            ..Self::default()
        };
        let mut confidence_sum = 0.0;
        for outcome in outcomes {
            match &outcome.result {
                Ok(result) => {
                    summary.graded += 1;
                    if result.retried {
                        summary.retried += 1;
                    }
                    confidence_sum += result.accuracy_metrics.overall_confidence;
                }
                Err(_) => {
                    summary.failed += 1;
                    summary.failed_ids.push(outcome.id.clone());
                }
            }
        }
        if summary.graded > 0 {
            summary.mean_confidence = confidence_sum / summary.graded as f64;
        }
        summary.failed_ids.sort();
        summary
    }
}

/// Grade `requests` with at most `concurrency` pipelines in flight.
///
/// Outcomes come back in input order; a failed submission never affects the
/// others.
pub async fn grade_batch(
    pipeline: &GradingPipeline,
    requests: Vec<(String, GradingRequest)>,
    concurrency: usize,
) -> Vec<BatchOutcome> {
    let total = requests.len();
    let mut indexed: Vec<(usize, BatchOutcome)> = stream::iter(requests.into_iter().enumerate())
        .map(|(index, (id, request))| async move {
            let result = pipeline.grade_with_accuracy(request).await;
            (index, BatchOutcome { id, result })
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    indexed.sort_by_key(|(index, _)| *index);
    let outcomes: Vec<BatchOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

    let summary = BatchSummary::from_outcomes(&outcomes);
    info!(
        event = "batch.finished",
        total = total,
        graded = summary.graded,
        failed = summary.failed,
        retried = summary.retried,
    );
    pipeline.stats().flush();
    outcomes
}
