//! Domain models for AIGRADE.
//!
//! - `GradingError`: engine error taxonomy
//! - `ConsensusResult`: reconciled multi-pass result
//! - `AccuracyReport`: confidence breakdown and tier
//! - `FinalResult`: what callers persist or return

pub mod error;
pub mod result;

pub use error::{GradingError, Result};
pub use result::{
    AccuracyLevel, AccuracyReport, ConsensusResult, ConsensusSummary, FinalResult, ScoreFallback,
    CONSENSUS_TAG,
};
