//! Statistical reconciliation of several grading passes into one result.
//!
//! When independent passes disagree their outputs must be reconciled before
//! the result is aligned and gated. This module defines the weighting,
//! agreement and outlier rules.
//!
//! **Per-pass confidence weight** is the mean of up to three signals:
//! - overall percentage in `[0.2, 0.9]` → 0.8, otherwise 0.4;
//! - criterion consistency `max(0, 1 - k·σ)` over criterion percentages
//!   (only with ≥2 scorable criteria);
//! - feedback length tier: >100 chars → 0.9, >50 → 0.7, else 0.5.
//!
//! **Agreement** is `1 - k·CV` of the pass percentages, clamped to `[0, 1]`.
//!
//! **Outliers** (≥4 passes) deviate from the mean by more than `n·σ`; they
//! are excluded from aggregation but reported. σ is the population standard
//! deviation throughout this module.

use std::collections::{BTreeSet, HashMap};

use grading_oracle::{CriterionScore, RawGradingResult};

use crate::config::ConsensusConfig;
use crate::domain::{ConsensusResult, GradingError, Result};
use crate::math::{clamp_unit, mean, negligible_spread, population_std_dev};
use crate::obs::emit_consensus_computed;

/// Prefix of synthesised per-criterion feedback when several evaluators commented.
pub const MULTI_EVALUATOR_PREFIX: &str = "Multiple evaluators noted:";

/// Agreement of a set of score percentages: `clamp(1 - penalty · σ/μ)`.
///
/// Fewer than two values agree trivially. A zero mean agrees only when every
/// value is zero.
pub fn agreement_score(percentages: &[f64], penalty: f64) -> f64 {
    if percentages.len() < 2 {
        return 1.0;
    }
    let (Some(m), Some(std)) = (mean(percentages), population_std_dev(percentages)) else {
        return 1.0;
    };
    if negligible_spread(std, m) {
        return 1.0;
    }
    if m <= 0.0 {
        return 0.0;
    }
    clamp_unit(1.0 - penalty * (std / m))
}

/// Reconciles passes into a [`ConsensusResult`].
#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Reconcile validated, not yet rubric-aligned passes.
    ///
    /// Each result's `approach_tag` identifies it in `outlier_tags` and
    /// `evaluator_confidences`.
    pub fn reconcile(&self, results: &[RawGradingResult]) -> Result<ConsensusResult> {
        if results.is_empty() {
            return Err(GradingError::InsufficientResults {
                attempted: 0,
                succeeded: 0,
                required: 1,
                last_error: None,
            });
        }

        let weights: Vec<f64> = results.iter().map(|r| self.result_confidence(r)).collect();
        let percentages: Vec<f64> = results.iter().map(RawGradingResult::percentage).collect();

        let outliers = self.detect_outliers(&percentages);
        let outlier_tags: BTreeSet<String> = outliers
            .iter()
            .map(|&i| results[i].approach_tag.clone())
            .collect();

        let mut survivors: Vec<usize> = (0..results.len())
            .filter(|i| !outliers.contains(i))
            .collect();
        if survivors.is_empty() {
            survivors = (0..results.len()).collect();
        }

        let surviving_pcts: Vec<f64> = survivors.iter().map(|&i| percentages[i]).collect();
        let agent_agreement = agreement_score(&surviving_pcts, self.config.agreement_cv_penalty);

        let (final_score, final_total) = weighted_totals(results, &weights, &survivors);
        let surviving: Vec<&RawGradingResult> = survivors.iter().map(|&i| &results[i]).collect();
        let criteria_scores = self.consensus_criteria(&surviving);
        let consensus_feedback = self.consensus_feedback(&surviving, agent_agreement);

        let surviving_weights: Vec<f64> = survivors.iter().map(|&i| weights[i]).collect();
        let mean_weight = mean(&surviving_weights).unwrap_or(0.0);
        let confidence_score = clamp_unit(mean_weight * agent_agreement.sqrt());

        emit_consensus_computed(
            survivors.len(),
            agent_agreement,
            confidence_score,
            outlier_tags.len(),
        );

        Ok(ConsensusResult {
            final_score,
            final_total,
            criteria_scores,
            consensus_feedback,
            confidence_score,
            agent_agreement,
            outlier_tags,
            evaluator_count: survivors.len(),
            evaluator_confidences: results
                .iter()
                .zip(&weights)
                .map(|(r, w)| (r.approach_tag.clone(), *w))
                .collect(),
        })
    }

    /// Confidence weight of a single pass.
    pub fn result_confidence(&self, result: &RawGradingResult) -> f64 {
        let pct = result.percentage();
        let range = if (0.2..=0.9).contains(&pct) { 0.8 } else { 0.4 };

        let criterion_pcts: Vec<f64> = result
            .criteria_scores
            .iter()
            .filter_map(CriterionScore::percentage)
            .collect();
        let consistency = if criterion_pcts.len() >= 2 {
            population_std_dev(&criterion_pcts)
                .map(|std| (1.0 - self.config.consistency_penalty * std).max(0.0))
        } else {
            None
        };

        let len = result.feedback.chars().count();
        let feedback = if len > 100 {
            0.9
        } else if len > 50 {
            0.7
        } else {
            0.5
        };

        let signals: Vec<f64> = [Some(range), consistency, Some(feedback)]
            .into_iter()
            .flatten()
            .collect();
        clamp_unit(mean(&signals).unwrap_or(0.0))
    }

    /// Indices of passes whose percentage lies more than `outlier_sigma`
    /// standard deviations from the mean.
    pub fn detect_outliers(&self, percentages: &[f64]) -> Vec<usize> {
        if percentages.len() < self.config.outlier_min_samples.max(2) {
            return Vec::new();
        }
        let (Some(m), Some(std)) = (mean(percentages), population_std_dev(percentages)) else {
            return Vec::new();
        };
        if negligible_spread(std, m) {
            return Vec::new();
        }
        percentages
            .iter()
            .enumerate()
            .filter(|(_, p)| (*p - m).abs() > self.config.outlier_sigma * std)
            .map(|(i, _)| i)
            .collect()
    }

    /// Union of criteria in first-seen order with averaged points.
    fn consensus_criteria(&self, results: &[&RawGradingResult]) -> Vec<CriterionScore> {
        let mut order: Vec<String> = Vec::new();
        let mut scored: HashMap<&str, Vec<&CriterionScore>> = HashMap::new();
        for r in results {
            for c in &r.criteria_scores {
                let entry = scored.entry(c.name.as_str()).or_default();
                if entry.is_empty() {
                    order.push(c.name.clone());
                }
                entry.push(c);
            }
        }

        order
            .into_iter()
            .map(|name| {
                let scores = scored.get(name.as_str()).cloned().unwrap_or_default();
                let points: Vec<f64> = scores.iter().map(|c| c.points).collect();
                let max_points = scores
                    .iter()
                    .map(|c| c.max_points)
                    .find(|m| *m != 0.0)
                    .unwrap_or(0.0);
                let feedback = self.criterion_feedback(&scores);
                CriterionScore {
                    points: mean(&points).unwrap_or(0.0),
                    max_points,
                    feedback,
                    name,
                }
            })
            .collect()
    }

    fn criterion_feedback(&self, scores: &[&CriterionScore]) -> String {
        if let [only] = scores {
            return only.feedback.clone();
        }
        let mut distinct: Vec<&str> = Vec::new();
        for c in scores {
            let text = c.feedback.trim();
            if !text.is_empty() && !distinct.contains(&text) {
                distinct.push(text);
                if distinct.len() == self.config.max_feedback_snippets {
                    break;
                }
            }
        }
        if distinct.is_empty() {
            String::new()
        } else {
            format!("{MULTI_EVALUATOR_PREFIX} {}", distinct.join("; "))
        }
    }

    fn consensus_feedback(&self, results: &[&RawGradingResult], agreement: f64) -> String {
        let opening = if agreement > self.config.strong_agreement {
            "Multiple evaluators showed strong agreement in this assessment."
        } else if agreement > self.config.moderate_agreement {
            "Multiple evaluators showed moderate agreement in this assessment."
        } else {
            "Multiple evaluators offered varied perspectives on this assessment."
        };

        let longest = results
            .iter()
            .map(|r| r.feedback.trim())
            .max_by_key(|f| f.chars().count())
            .unwrap_or("");

        let n = results.len();
        let disclosure = if n == 1 {
            "This consensus reflects 1 independent evaluator.".to_string()
        } else {
            format!("This consensus reflects {n} independent evaluators.")
        };

        let mut out = String::from(opening);
        if !longest.is_empty() {
            out.push_str("\n\n");
            out.push_str(longest);
        }
        out.push_str("\n\n");
        out.push_str(&disclosure);
        out
    }
}

/// Confidence-weighted `(score, total)` over `survivors`, with an unweighted
/// fallback when the weights sum to zero.
fn weighted_totals(results: &[RawGradingResult], weights: &[f64], survivors: &[usize]) -> (f64, f64) {
    let weight_sum: f64 = survivors.iter().map(|&i| weights[i]).sum();
    if weight_sum > 0.0 {
        let score = survivors
            .iter()
            .map(|&i| results[i].score * weights[i])
            .sum::<f64>()
            / weight_sum;
        let total = survivors
            .iter()
            .map(|&i| results[i].total * weights[i])
            .sum::<f64>()
            / weight_sum;
        (score, total)
    } else {
        let scores: Vec<f64> = survivors.iter().map(|&i| results[i].score).collect();
        let totals: Vec<f64> = survivors.iter().map(|&i| results[i].total).collect();
        (mean(&scores).unwrap_or(0.0), mean(&totals).unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(tag: &str, score: f64, total: f64) -> RawGradingResult {
        RawGradingResult::new(score, total, vec![]).with_tag(tag)
    }

    fn engine() -> ConsensusEngine {
        ConsensusEngine::default()
    }

    #[test]
    fn empty_input_is_insufficient() {
        let err = engine().reconcile(&[]).unwrap_err();
        assert!(matches!(err, GradingError::InsufficientResults { .. }));
    }

    #[test]
    fn single_pass_is_identity_with_full_agreement() {
        let only = RawGradingResult::new(
            42.0,
            50.0,
            vec![
                CriterionScore::new("Content", 30.0, 35.0).with_feedback("Thorough analysis."),
                CriterionScore::new("Style", 12.0, 15.0),
            ],
        )
        .with_tag("standard")
        .with_feedback("Solid work.");
        let c = engine().reconcile(std::slice::from_ref(&only)).unwrap();
        assert_eq!(c.agent_agreement, 1.0);
        assert_eq!(c.criteria_scores, only.criteria_scores);
        assert_eq!(c.final_score, 42.0);
        assert_eq!(c.final_total, 50.0);
        assert_eq!(c.evaluator_count, 1);
        assert!(c.outlier_tags.is_empty());
    }

    #[test]
    fn tight_percentages_agree_strongly() {
        let results = vec![
            pass("standard", 85.0, 100.0),
            pass("detailed", 87.0, 100.0),
            pass("holistic", 83.0, 100.0),
        ];
        let c = engine().reconcile(&results).unwrap();
        assert!(c.agent_agreement >= 0.9, "agreement {}", c.agent_agreement);
        assert!(c.consensus_feedback.starts_with("Multiple evaluators showed strong agreement"));
        assert!(c.consensus_feedback.contains("3 independent evaluators"));
    }

    #[test]
    fn agreement_tiers_select_feedback_prefix() {
        let spread = vec![pass("a", 40.0, 100.0), pass("b", 90.0, 100.0)];
        let c = engine().reconcile(&spread).unwrap();
        assert!(c.agent_agreement <= 0.6);
        assert!(c.consensus_feedback.starts_with("Multiple evaluators offered varied perspectives"));
    }

    #[test]
    fn agreement_score_edge_cases() {
        assert_eq!(agreement_score(&[0.5], 2.0), 1.0);
        assert_eq!(agreement_score(&[0.0, 0.0], 2.0), 1.0);
        assert_eq!(agreement_score(&[0.7, 0.7, 0.7], 2.0), 1.0);
        assert_eq!(agreement_score(&[0.1, 0.9], 2.0), 0.0);
    }

    #[test]
    fn identical_passes_agree_fully_and_have_no_outliers() {
        let e = engine();
        assert!(e.detect_outliers(&[0.7; 6]).is_empty());
        let results: Vec<RawGradingResult> =
            (0..3).map(|i| pass(&format!("p{i}"), 7.0, 10.0)).collect();
        let c = e.reconcile(&results).unwrap();
        assert_eq!(c.agent_agreement, 1.0);
        assert!(c.outlier_tags.is_empty());
    }

    #[test]
    fn outliers_need_minimum_sample_count() {
        let e = engine();
        assert!(e.detect_outliers(&[0.8, 0.8, 0.1]).is_empty());
        let six = [0.8, 0.8, 0.8, 0.8, 0.8, 0.2];
        assert_eq!(e.detect_outliers(&six), vec![5]);
    }

    #[test]
    fn outlier_is_excluded_but_reported() {
        let mut results: Vec<RawGradingResult> =
            (0..5).map(|i| pass(&format!("p{i}"), 80.0, 100.0)).collect();
        results.push(pass("rogue", 20.0, 100.0));
        let c = engine().reconcile(&results).unwrap();
        assert!(c.outlier_tags.contains("rogue"));
        assert_eq!(c.evaluator_count, 5);
        assert!((c.final_score - 80.0).abs() < 1e-9);
        assert_eq!(c.agent_agreement, 1.0);
        assert_eq!(c.evaluator_confidences.len(), 6);
    }

    #[test]
    fn excluding_outliers_never_lowers_agreement() {
        let mut results: Vec<RawGradingResult> = [78.0, 80.0, 82.0, 79.0, 81.0]
            .iter()
            .enumerate()
            .map(|(i, s)| pass(&format!("p{i}"), *s, 100.0))
            .collect();
        results.push(pass("rogue", 10.0, 100.0));
        let all_pcts: Vec<f64> = results.iter().map(RawGradingResult::percentage).collect();
        let with_outlier = agreement_score(&all_pcts, 2.0);

        let c = engine().reconcile(&results).unwrap();
        assert!(!c.outlier_tags.is_empty());
        assert!(c.agent_agreement >= with_outlier);
    }

    #[test]
    fn weighted_average_favours_confident_passes() {
        // In-range pass with long feedback outweighs an out-of-range terse one.
        let confident = pass("a", 80.0, 100.0).with_feedback("x".repeat(120));
        let doubtful = pass("b", 100.0, 100.0);
        let c = engine().reconcile(&[confident, doubtful]).unwrap();
        assert!(c.final_score < 90.0);
        assert!(c.final_score > 80.0);
    }

    #[test]
    fn zero_weights_fall_back_to_plain_mean() {
        let results = [pass("a", 10.0, 20.0), pass("b", 20.0, 40.0)];
        let (score, total) = weighted_totals(&results, &[0.0, 0.0], &[0, 1]);
        assert_eq!(score, 15.0);
        assert_eq!(total, 30.0);
    }

    #[test]
    fn criteria_union_averages_points_and_synthesises_feedback() {
        let a = RawGradingResult::new(
            0.0,
            0.0,
            vec![
                CriterionScore::new("Content", 40.0, 50.0).with_feedback("Good depth."),
                CriterionScore::new("Style", 10.0, 0.0).with_feedback("Only in A."),
            ],
        )
        .with_tag("a");
        let b = RawGradingResult::new(
            0.0,
            0.0,
            vec![
                CriterionScore::new("Content", 30.0, 50.0).with_feedback("Lacks sources."),
                CriterionScore::new("Style", 20.0, 25.0).with_feedback(""),
            ],
        )
        .with_tag("b");
        let c = engine().reconcile(&[a, b]).unwrap();

        assert_eq!(c.criteria_scores.len(), 2);
        let content = &c.criteria_scores[0];
        assert_eq!(content.name, "Content");
        assert_eq!(content.points, 35.0);
        assert_eq!(
            content.feedback,
            "Multiple evaluators noted: Good depth.; Lacks sources."
        );
        let style = &c.criteria_scores[1];
        assert_eq!(style.points, 15.0);
        assert_eq!(style.max_points, 25.0);
        assert_eq!(style.feedback, "Multiple evaluators noted: Only in A.");
    }

    #[test]
    fn criterion_scored_once_keeps_its_feedback() {
        let a = RawGradingResult::new(0.0, 0.0, vec![CriterionScore::new("Only", 3.0, 5.0).with_feedback("raw")])
            .with_tag("a");
        let b = RawGradingResult::new(0.0, 0.0, vec![]).with_tag("b");
        let c = engine().reconcile(&[a, b]).unwrap();
        assert_eq!(c.criteria_scores[0].feedback, "raw");
    }

    #[test]
    fn feedback_synthesis_keeps_at_most_three_distinct() {
        let results: Vec<RawGradingResult> = ["one", "two", "two", "three", "four"]
            .iter()
            .enumerate()
            .map(|(i, fb)| {
                RawGradingResult::new(0.0, 0.0, vec![CriterionScore::new("A", 1.0, 2.0).with_feedback(*fb)])
                    .with_tag(format!("p{i}"))
            })
            .collect();
        let c = engine().reconcile(&results).unwrap();
        assert_eq!(
            c.criteria_scores[0].feedback,
            "Multiple evaluators noted: one; two; three"
        );
    }

    #[test]
    fn consensus_feedback_embeds_longest_individual_feedback() {
        let a = pass("a", 8.0, 10.0).with_feedback("Short.");
        let b = pass("b", 8.0, 10.0).with_feedback("A much longer and more detailed explanation.");
        let c = engine().reconcile(&[a, b]).unwrap();
        assert!(c.consensus_feedback.contains("A much longer and more detailed explanation."));
        assert!(!c.consensus_feedback.contains("Short."));
    }

    #[test]
    fn confidence_is_discounted_by_disagreement() {
        let e = engine();
        let agree = e
            .reconcile(&[pass("a", 70.0, 100.0), pass("b", 70.0, 100.0)])
            .unwrap();
        let split = e
            .reconcile(&[pass("a", 50.0, 100.0), pass("b", 80.0, 100.0)])
            .unwrap();
        assert!(agree.confidence_score > split.confidence_score);
        assert!((0.0..=1.0).contains(&split.confidence_score));
    }

    #[test]
    fn result_confidence_uses_consistency_when_available() {
        let e = engine();
        let consistent = RawGradingResult::new(
            16.0,
            20.0,
            vec![CriterionScore::new("A", 8.0, 10.0), CriterionScore::new("B", 8.0, 10.0)],
        );
        // range 0.8, consistency 1.0, feedback 0.5
        assert!((e.result_confidence(&consistent) - (0.8 + 1.0 + 0.5) / 3.0).abs() < 1e-9);
        let bare = RawGradingResult::new(5.0, 10.0, vec![]);
        assert!((e.result_confidence(&bare) - (0.8 + 0.5) / 2.0).abs() < 1e-9);
    }
}
