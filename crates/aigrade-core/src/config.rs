//! Immutable engine configuration.
//!
//! Every component receives its section at construction; nothing reads
//! module-level thresholds. All sections deserialize with defaults, so a TOML
//! file only needs the keys it overrides:
//!
//! ```toml
//! [gate]
//! retry_threshold = 0.65
//!
//! [consensus]
//! outlier_sigma = 2.5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{GradingError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GradingConfig {
    pub coordinator: CoordinatorConfig,
    pub consensus: ConsensusConfig,
    pub quality: QualityConfig,
    pub gate: GateConfig,
}

impl GradingConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: GradingConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would make the statistics meaningless.
    pub fn validate(&self) -> Result<()> {
        let c = &self.coordinator;
        if c.max_concurrent == 0 {
            return Err(GradingError::Config(
                "coordinator.max_concurrent must be at least 1".to_string(),
            ));
        }
        if c.oracle_timeout_ms == 0 {
            return Err(GradingError::Config(
                "coordinator.oracle_timeout_ms must be positive".to_string(),
            ));
        }
        if c.min_results == 0 || c.multi_agent_min_results == 0 {
            return Err(GradingError::Config(
                "coordinator minimum result counts must be at least 1".to_string(),
            ));
        }

        let w = &self.gate.weights;
        let parts = [w.mathematical, w.feedback, w.reasonableness, w.evidence];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) || parts.iter().sum::<f64>() <= 0.0 {
            return Err(GradingError::Config(
                "gate.weights must be non-negative with a positive sum".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.gate.retry_threshold) {
            return Err(GradingError::Config(
                "gate.retry_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.gate.retry_strictness_factors.is_empty() {
            return Err(GradingError::Config(
                "gate.retry_strictness_factors must not be empty".to_string(),
            ));
        }
        let sigma = self.consensus.outlier_sigma;
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(GradingError::Config(
                "consensus.outlier_sigma must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Multi-pass fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum oracle calls in flight for one submission.
    pub max_concurrent: usize,
    /// Per-call deadline; a timed-out call counts as a failed pass.
    pub oracle_timeout_ms: u64,
    /// Successful passes required in approach mode.
    pub min_results: usize,
    /// Successful passes required in multi-agent mode.
    pub multi_agent_min_results: usize,
}

impl CoordinatorConfig {
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            oracle_timeout_ms: 120_000,
            min_results: 1,
            multi_agent_min_results: 2,
        }
    }
}

/// Consensus statistics. The constants are empirical, not derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Outlier detection only runs with at least this many results.
    pub outlier_min_samples: usize,
    /// Deviation from the mean, in standard deviations, that marks an outlier.
    pub outlier_sigma: f64,
    /// Agreement = 1 - penalty * coefficient of variation.
    pub agreement_cv_penalty: f64,
    /// Per-result consistency = 1 - penalty * stddev of criterion percentages.
    pub consistency_penalty: f64,
    pub strong_agreement: f64,
    pub moderate_agreement: f64,
    /// Distinct criterion feedback strings kept when several evaluators commented.
    pub max_feedback_snippets: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            outlier_min_samples: 4,
            outlier_sigma: 2.0,
            agreement_cv_penalty: 2.0,
            consistency_penalty: 2.0,
            strong_agreement: 0.8,
            moderate_agreement: 0.6,
            max_feedback_snippets: 3,
        }
    }
}

/// Heuristic quality signals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    pub evidence_keywords: Vec<String>,
    pub structure_keywords: Vec<String>,
    pub constructive_keywords: Vec<String>,
    pub actionable_keywords: Vec<String>,
    /// Distribution score = 1 - penalty * stddev of criterion percentages.
    pub distribution_penalty: f64,
    /// Criterion feedback longer than this counts as covered.
    pub criterion_feedback_min_chars: usize,
    /// Neutral value for mathematical accuracy when no structure is present.
    pub math_neutral_default: f64,
    /// Neutral value for the other signals when they cannot be computed.
    pub neutral_default: f64,
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            evidence_keywords: words(&[
                "specifically",
                "example",
                "demonstrates",
                "shows",
                "evident",
                "clear",
                "quote",
                "line",
                "section",
                "code",
                "implementation",
            ]),
            structure_keywords: words(&["overall", "strengths", "improvement"]),
            constructive_keywords: words(&[
                "suggest",
                "recommend",
                "consider",
                "could improve",
                "should",
                "improve",
            ]),
            actionable_keywords: words(&["next time", "consider", "to improve"]),
            distribution_penalty: 1.5,
            criterion_feedback_min_chars: 20,
            math_neutral_default: 0.7,
            neutral_default: 0.5,
        }
    }
}

/// Weights of the four quality signals in the overall confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccuracyWeights {
    pub mathematical: f64,
    pub feedback: f64,
    pub reasonableness: f64,
    pub evidence: f64,
}

impl Default for AccuracyWeights {
    fn default() -> Self {
        Self {
            mathematical: 0.35,
            feedback: 0.25,
            reasonableness: 0.25,
            evidence: 0.15,
        }
    }
}

/// Lower bounds of each accuracy tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LevelThresholds {
    pub excellent: f64,
    pub high: f64,
    pub good: f64,
    pub moderate: f64,
    pub fair: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            excellent: 0.9,
            high: 0.8,
            good: 0.7,
            moderate: 0.6,
            fair: 0.5,
        }
    }
}

/// Signal values below which a recommendation is emitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecommendationThresholds {
    pub mathematical: f64,
    pub feedback: f64,
    pub reasonableness: f64,
    pub evidence: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            mathematical: 0.8,
            feedback: 0.7,
            reasonableness: 0.7,
            evidence: 0.6,
        }
    }
}

/// Accuracy gate and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub weights: AccuracyWeights,
    pub levels: LevelThresholds,
    pub recommendations: RecommendationThresholds,
    /// Overall confidence below this triggers the retry round.
    pub retry_threshold: f64,
    /// Multipliers applied to the base strictness for the retry passes.
    pub retry_strictness_factors: Vec<f64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            weights: AccuracyWeights::default(),
            levels: LevelThresholds::default(),
            recommendations: RecommendationThresholds::default(),
            retry_threshold: 0.70,
            retry_strictness_factors: vec![0.8, 1.0, 1.2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GradingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.gate.retry_threshold, 0.70);
        assert_eq!(config.consensus.outlier_min_samples, 4);
        assert_eq!(config.quality.evidence_keywords.len(), 11);
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let config = GradingConfig::from_toml_str(
            r#"
            [gate]
            retry_threshold = 0.65

            [consensus]
            outlier_sigma = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.gate.retry_threshold, 0.65);
        assert_eq!(config.gate.weights.mathematical, 0.35);
        assert_eq!(config.consensus.outlier_sigma, 2.5);
        assert_eq!(config.coordinator.max_concurrent, 5);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = GradingConfig::from_toml_str("[coordinator]\nmax_concurrent = 0\n").unwrap_err();
        assert!(matches!(err, GradingError::Config(_)));
    }

    #[test]
    fn zero_oracle_timeout_is_rejected() {
        let err = GradingConfig::from_toml_str("[coordinator]\noracle_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, GradingError::Config(_)));
    }

    #[test]
    fn non_finite_outlier_sigma_is_rejected() {
        let mut config = GradingConfig::default();
        config.consensus.outlier_sigma = f64::NAN;
        assert!(config.validate().is_err());
        config.consensus.outlier_sigma = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = GradingConfig::default();
        config.gate.weights.evidence = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_maps_to_config_error() {
        let err = GradingConfig::from_toml_str("[gate\nretry_threshold = ").unwrap_err();
        assert!(matches!(err, GradingError::Config(_)));
    }
}
