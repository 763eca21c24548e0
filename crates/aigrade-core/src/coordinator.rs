//! Concurrent multi-pass fan-out to the grading oracle.
//!
//! Each pass is an isolated oracle call in a bounded task group: a
//! [`JoinSet`] whose tasks acquire a permit from a shared [`Semaphore`]
//! before calling out. A failed, timed-out or panicked pass is logged and
//! dropped; it never cancels its siblings. The call fails only when fewer
//! passes succeed than the mode requires.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{instrument, warn};

use grading_oracle::{GradingContext, GradingOracle, OracleError, RawGradingResult};

use crate::config::CoordinatorConfig;
use crate::domain::{GradingError, Result};
use crate::obs::emit_pass_failed;

/// Evaluation style used in approach mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    Standard,
    Detailed,
    Holistic,
}

impl Approach {
    pub const ALL: [Approach; 3] = [Approach::Standard, Approach::Detailed, Approach::Holistic];

    /// Strictness this approach grades at, derived from the caller's base.
    pub fn strictness(self, base: f64) -> f64 {
        let base = base.clamp(0.0, 1.0);
        match self {
            Approach::Standard => base,
            Approach::Detailed => (base * 1.1).min(1.0),
            Approach::Holistic => (base * 0.9).max(0.0),
        }
    }
}

impl std::fmt::Display for Approach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Approach::Standard => "standard",
            Approach::Detailed => "detailed",
            Approach::Holistic => "holistic",
        };
        write!(f, "{s}")
    }
}

/// Evaluator persona used in multi-agent mode. Strictness is fixed per persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    StrictEvaluator,
    BalancedEvaluator,
    LenientEvaluator,
    SubjectSpecialist,
    CommunicationExpert,
}

impl Persona {
    pub const ALL: [Persona; 5] = [
        Persona::StrictEvaluator,
        Persona::BalancedEvaluator,
        Persona::LenientEvaluator,
        Persona::SubjectSpecialist,
        Persona::CommunicationExpert,
    ];

    pub fn strictness(self) -> f64 {
        match self {
            Persona::StrictEvaluator => 0.8,
            Persona::BalancedEvaluator => 0.5,
            Persona::LenientEvaluator => 0.3,
            Persona::SubjectSpecialist => 0.6,
            Persona::CommunicationExpert => 0.5,
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Persona::StrictEvaluator => "strict_evaluator",
            Persona::BalancedEvaluator => "balanced_evaluator",
            Persona::LenientEvaluator => "lenient_evaluator",
            Persona::SubjectSpecialist => "subject_specialist",
            Persona::CommunicationExpert => "communication_expert",
        };
        write!(f, "{s}")
    }
}

/// Which set of passes to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassMode {
    /// standard / detailed / holistic
    #[default]
    Approaches,
    /// the five evaluator personas
    MultiAgent,
}

impl std::fmt::Display for PassMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassMode::Approaches => write!(f, "approaches"),
            PassMode::MultiAgent => write!(f, "multi_agent"),
        }
    }
}

/// One planned oracle call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSpec {
    /// Unique within one plan; becomes the result's `approach_tag`.
    pub tag: String,
    /// What the oracle is told to do.
    pub approach: String,
    pub strictness: f64,
}

/// Build the default plan for `mode` around `base_strictness`.
pub fn plan_passes(mode: PassMode, base_strictness: f64) -> Vec<PassSpec> {
    match mode {
        PassMode::Approaches => Approach::ALL
            .iter()
            .map(|a| PassSpec {
                tag: a.to_string(),
                approach: a.to_string(),
                strictness: a.strictness(base_strictness),
            })
            .collect(),
        PassMode::MultiAgent => Persona::ALL
            .iter()
            .map(|p| PassSpec {
                tag: p.to_string(),
                approach: p.to_string(),
                strictness: p.strictness(),
            })
            .collect(),
    }
}

/// Plan for the retry round: the detailed approach at each strictness variant.
///
/// Variants that clamp to the same strictness get a `#n` suffix so tags stay
/// unique within the plan.
pub fn retry_plan(strictness_variants: &[f64]) -> Vec<PassSpec> {
    let mut plan: Vec<PassSpec> = Vec::with_capacity(strictness_variants.len());
    for &variant in strictness_variants {
        let strictness = variant.clamp(0.0, 1.0);
        let mut tag = format!("{}@{:.2}", Approach::Detailed, strictness);
        let seen = plan
            .iter()
            .filter(|p| p.tag.starts_with(tag.as_str()))
            .count();
        if seen > 0 {
            tag = format!("{tag}#{}", seen + 1);
        }
        plan.push(PassSpec {
            tag,
            approach: Approach::Detailed.to_string(),
            strictness,
        });
    }
    plan
}

/// A successful pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedResult {
    pub tag: String,
    pub strictness: f64,
    pub result: RawGradingResult,
}

/// A dropped pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassFailure {
    pub tag: String,
    pub error: String,
}

/// Everything one fan-out produced, in plan order.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub results: Vec<TaggedResult>,
    pub failures: Vec<PassFailure>,
}

impl PassReport {
    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.failures.last().map(|f| f.error.as_str())
    }
}

/// Owns the oracle handle and the task-group sizing.
#[derive(Clone)]
pub struct MultiPassCoordinator {
    oracle: Arc<dyn GradingOracle>,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for MultiPassCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiPassCoordinator")
            .field("oracle", &self.oracle.name())
            .field("config", &self.config)
            .finish()
    }
}

impl MultiPassCoordinator {
    pub fn new(oracle: Arc<dyn GradingOracle>, config: CoordinatorConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Minimum successes required for `mode`.
    pub fn required_results(&self, mode: PassMode) -> usize {
        match mode {
            PassMode::Approaches => self.config.min_results,
            PassMode::MultiAgent => self.config.multi_agent_min_results,
        }
    }

    /// Run the default plan for `mode`.
    pub async fn run_passes(
        &self,
        submission: Arc<str>,
        context: Arc<GradingContext>,
        strictness: f64,
        mode: PassMode,
    ) -> Result<PassReport> {
        let plan = plan_passes(mode, strictness);
        self.run_plan(submission, context, plan, self.required_results(mode))
            .await
    }

    /// Run an arbitrary plan concurrently and collect whichever passes succeed.
    ///
    /// Returns [`GradingError::InsufficientResults`] when fewer than
    /// `required` (at least 1) passes succeed.
    #[instrument(skip_all, fields(oracle = self.oracle.name(), passes = plan.len()))]
    pub async fn run_plan(
        &self,
        submission: Arc<str>,
        context: Arc<GradingContext>,
        plan: Vec<PassSpec>,
        required: usize,
    ) -> Result<PassReport> {
        let sem = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let timeout = self.config.oracle_timeout();
        let mut tasks = JoinSet::new();

        for (index, spec) in plan.iter().cloned().enumerate() {
            let oracle = Arc::clone(&self.oracle);
            let submission = Arc::clone(&submission);
            let context = Arc::clone(&context);
            let sem = Arc::clone(&sem);

            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let call = oracle.grade(&submission, &context, spec.strictness, &spec.approach);
                let outcome = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(OracleError::Timeout(timeout.as_millis() as u64)),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<std::result::Result<RawGradingResult, String>>> =
            vec![None; plan.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    slots[index] = Some(outcome.map_err(|e| e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "oracle pass task aborted");
                }
            }
        }

        let mut report = PassReport::default();
        for (spec, slot) in plan.into_iter().zip(slots) {
            match slot {
                Some(Ok(mut result)) => {
                    result.approach_tag = spec.tag.clone();
                    report.results.push(TaggedResult {
                        tag: spec.tag,
                        strictness: spec.strictness,
                        result,
                    });
                }
                Some(Err(error)) => {
                    emit_pass_failed(&spec.tag, &error);
                    report.failures.push(PassFailure {
                        tag: spec.tag,
                        error,
                    });
                }
                None => {
                    let error = "pass task panicked or was cancelled".to_string();
                    emit_pass_failed(&spec.tag, &error);
                    report.failures.push(PassFailure {
                        tag: spec.tag,
                        error,
                    });
                }
            }
        }

        let required = required.max(1);
        if report.results.len() < required {
            return Err(GradingError::InsufficientResults {
                attempted: report.attempted(),
                succeeded: report.results.len(),
                required,
                last_error: report.last_error().map(str::to_string),
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approach_plan_scales_strictness() {
        let plan = plan_passes(PassMode::Approaches, 0.5);
        let tags: Vec<&str> = plan.iter().map(|p| p.tag.as_str()).collect();
        assert_eq!(tags, vec!["standard", "detailed", "holistic"]);
        assert!((plan[0].strictness - 0.5).abs() < 1e-9);
        assert!((plan[1].strictness - 0.55).abs() < 1e-9);
        assert!((plan[2].strictness - 0.45).abs() < 1e-9);
    }

    #[test]
    fn detailed_strictness_is_capped_at_one() {
        assert_eq!(Approach::Detailed.strictness(0.95), 1.0);
        assert_eq!(Approach::Holistic.strictness(0.0), 0.0);
    }

    #[test]
    fn personas_ignore_base_strictness() {
        let plan = plan_passes(PassMode::MultiAgent, 0.99);
        assert_eq!(plan.len(), 5);
        assert_eq!(plan[0].tag, "strict_evaluator");
        assert_eq!(plan[0].strictness, 0.8);
        assert_eq!(plan[2].strictness, 0.3);
        assert_eq!(plan[4].tag, "communication_expert");
    }

    #[test]
    fn retry_plan_clamps_and_tags_uniquely() {
        let plan = retry_plan(&[0.72, 0.9, 1.3]);
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|p| p.approach == "detailed"));
        assert!((plan[0].strictness - 0.72).abs() < 1e-9);
        assert_eq!(plan[2].strictness, 1.0);
        assert_eq!(plan[0].tag, "detailed@0.72");
        assert_ne!(plan[0].tag, plan[1].tag);
    }

    #[test]
    fn retry_plan_disambiguates_clamped_duplicates() {
        let plan = retry_plan(&[0.8, 1.0, 1.2]);
        assert_eq!(plan[1].tag, "detailed@1.00");
        assert_eq!(plan[2].tag, "detailed@1.00#2");
    }
}
