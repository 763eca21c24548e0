//! Grading-Oracle: the external grading contract for AIGRADE
//!
//! This crate owns everything on the oracle side of the boundary: the
//! rubric/result schema, the [`GradingOracle`] trait, the lenient parser that
//! turns free-text model replies into typed results, and adapters.
//!
//! ## Key Components
//!
//! - `schema`: `Rubric`, `CriterionScore`, `RawGradingResult`, `GradingContext`
//! - `GradingOracle`: async trait implemented by every oracle
//! - `parse_raw_result`: boundary defaulting for malformed replies
//! - `HttpOracle`: JSON-over-HTTP adapter
//! - `fakes::ScriptedOracle`: canned responses for tests and replay

mod error;
pub mod fakes;
pub mod http;
pub mod oracle_traits;
pub mod parse;
mod schema;

pub use error::OracleError;
pub use http::{HttpOracle, HttpOracleConfig, OracleRequest};
pub use oracle_traits::{GradingOracle, OracleResult};
pub use parse::{parse_raw_result, raw_result_from_value};
pub use schema::{
    Criterion, CriterionScore, FileMetadata, GradingContext, RawGradingResult, Rubric,
};
