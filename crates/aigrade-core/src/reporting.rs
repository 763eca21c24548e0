//! Persisted grading artifacts and their human-readable rendering.
//!
//! Layout: `<dir>/<request_id>/result.json` plus `result.digest`, the
//! SHA-256 hex digest of the JSON bytes.

use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::domain::{FinalResult, GradingError, Result};

const RESULT_FILE: &str = "result.json";
const DIGEST_FILE: &str = "result.digest";

/// SHA-256 hex digest of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `<dir>/<request_id>/result.json` and its digest, returning the JSON path.
pub fn write_result_artifact(dir: &Path, result: &FinalResult) -> Result<PathBuf> {
    let run_dir = dir.join(result.request_id.to_string());
    std::fs::create_dir_all(&run_dir)?;

    let path = run_dir.join(RESULT_FILE);
    let json = serde_json::to_vec_pretty(result)?;
    std::fs::write(&path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), content_digest(&json).as_bytes())?;
    Ok(path)
}

/// Read `<dir>/<request_id>/result.json`, verifying its digest.
pub fn read_result_artifact(dir: &Path, request_id: &str) -> Result<FinalResult> {
    let run_dir = dir.join(request_id);
    let json = std::fs::read(run_dir.join(RESULT_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?;
    let actual = content_digest(&json);
    if expected.trim() != actual {
        return Err(GradingError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

/// Write a result as pretty JSON to an arbitrary path.
pub fn write_result_json(path: &Path, result: &FinalResult) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(result).context("serialize grading result")?;
    std::fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Render a markdown summary of a graded result.
pub fn render_result_md(result: &FinalResult) -> String {
    let metrics = &result.accuracy_metrics;
    let mut out = String::new();
    out.push_str("# Grading Result\n\n");
    out.push_str(&format!(
        "**Score:** {:.1} / {:.1} ({:.1}%)\n\n",
        result.score,
        result.total,
        result.percentage() * 100.0
    ));
    out.push_str(&format!(
        "**Accuracy:** {} (confidence {:.2})",
        metrics.accuracy_level, metrics.overall_confidence
    ));
    if result.retried {
        out.push_str(" after one retry round");
    }
    out.push_str("\n\n");

    if !result.criteria_scores.is_empty() {
        out.push_str("## Criteria\n\n");
        out.push_str("| Criterion | Points | Max | Feedback |\n");
        out.push_str("|---|---:|---:|---|\n");
        for c in &result.criteria_scores {
            out.push_str(&format!(
                "| {} | {:.1} | {:.1} | {} |\n",
                c.name,
                c.points,
                c.max_points,
                c.feedback.replace('|', "\\|").replace('\n', " ")
            ));
        }
        out.push('\n');
    }

    out.push_str("## Quality Signals\n\n");
    out.push_str(&format!("- Mathematical accuracy: {:.2}\n", metrics.mathematical_accuracy));
    out.push_str(&format!("- Feedback quality: {:.2}\n", metrics.feedback_quality));
    out.push_str(&format!("- Score reasonableness: {:.2}\n", metrics.score_reasonableness));
    out.push_str(&format!("- Evidence quality: {:.2}\n", metrics.evidence_quality));
    for fallback in &metrics.fallbacks {
        out.push_str(&format!(
            "- _{} fell back to {:.2}: {}_\n",
            fallback.signal, fallback.default, fallback.reason
        ));
    }
    out.push('\n');

    if let Some(consensus) = &result.consensus {
        out.push_str("## Consensus\n\n");
        out.push_str(&format!("- Evaluators: {}\n", consensus.evaluator_count));
        out.push_str(&format!("- Agreement: {:.2}\n", consensus.agent_agreement));
        out.push_str(&format!("- Confidence: {:.2}\n", consensus.confidence_score));
        if !consensus.outlier_tags.is_empty() {
            let tags: Vec<&str> = consensus.outlier_tags.iter().map(String::as_str).collect();
            out.push_str(&format!("- Outliers: {}\n", tags.join(", ")));
        }
        out.push('\n');
    }

    out.push_str("## Recommendations\n\n");
    for rec in &metrics.recommendations {
        out.push_str(&format!("- {rec}\n"));
    }

    if !result.grading_feedback.is_empty() {
        out.push_str("\n## Feedback\n\n");
        out.push_str(result.grading_feedback.trim());
        out.push('\n');
    }
    out
}
