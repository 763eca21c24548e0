//! AIGRADE Core Library
//!
//! Multi-pass grading consensus: run several oracle passes over one
//! submission, reconcile them, repair the result against its rubric, score
//! its accuracy and accept it or retry once.

pub mod batch;
pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod domain;
pub mod gate;
pub mod math;
pub mod obs;
pub mod pipeline;
pub mod quality;
pub mod reconcile;
pub mod reporting;
pub mod stats;
pub mod telemetry;
pub mod validator;

pub use batch::{grade_batch, BatchOutcome, BatchSummary};
pub use config::{
    AccuracyWeights, ConsensusConfig, CoordinatorConfig, GateConfig, GradingConfig,
    LevelThresholds, QualityConfig, RecommendationThresholds,
};
pub use consensus::ConsensusEngine;
pub use coordinator::{
    plan_passes, retry_plan, Approach, MultiPassCoordinator, PassMode, PassReport, PassSpec,
    Persona, TaggedResult,
};
pub use domain::{
    AccuracyLevel, AccuracyReport, ConsensusResult, ConsensusSummary, FinalResult, GradingError,
    Result, ScoreFallback,
};
pub use gate::{AccuracyGate, GateDecision};
pub use pipeline::{GradingPipeline, GradingRequest};
pub use quality::{QualityScorer, QualityScores};
pub use reconcile::{align_to_rubric, Alignment};
pub use reporting::{read_result_artifact, render_result_md, write_result_artifact};
pub use stats::GradingStats;
pub use validator::validate_and_repair;

/// AIGRADE version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
