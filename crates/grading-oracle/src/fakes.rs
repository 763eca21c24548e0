//! Scripted in-memory oracle (testing and offline replay)
//!
//! `ScriptedOracle` answers per approach from a queue of canned steps. The
//! last step of a queue repeats forever, so a single response per approach
//! is enough for most tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OracleError;
use crate::oracle_traits::{GradingOracle, OracleResult};
use crate::parse::raw_result_from_value;
use crate::schema::{GradingContext, RawGradingResult};

/// Key used for the fallback script when no approach-specific one exists.
pub const DEFAULT_SCRIPT_KEY: &str = "default";

/// One canned oracle behaviour.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Respond(RawGradingResult),
    Fail(String),
    /// Sleep, then respond. Used to exercise per-pass timeouts.
    Delay(Duration, RawGradingResult),
}

/// A call observed by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub approach: String,
    pub strictness: f64,
}

type Responder = dyn Fn(&str, f64) -> OracleResult<RawGradingResult> + Send + Sync;

/// Programmable oracle.
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<String, VecDeque<ScriptStep>>>,
    responder: Option<Box<Responder>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl std::fmt::Debug for ScriptedOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedOracle")
            .field("calls", &self.calls())
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call by invoking `responder(approach, strictness)`.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&str, f64) -> OracleResult<RawGradingResult> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queue a step for `approach` (or [`DEFAULT_SCRIPT_KEY`]).
    pub fn push(self, approach: &str, step: ScriptStep) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(approach.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn respond(self, approach: &str, result: RawGradingResult) -> Self {
        self.push(approach, ScriptStep::Respond(result))
    }

    pub fn fail(self, approach: &str, message: &str) -> Self {
        self.push(approach, ScriptStep::Fail(message.to_string()))
    }

    /// Load a replay file: `{ "<approach>": <raw result> | {"error": "..."}, ... }`.
    pub fn from_json(value: &Value) -> OracleResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            OracleError::Unparseable("replay script must be a JSON object".to_string())
        })?;
        let mut oracle = Self::new();
        for (approach, entry) in map {
            let steps: Vec<&Value> = match entry {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for step in steps {
                oracle = match step.get("error").and_then(Value::as_str) {
                    Some(message) => oracle.fail(approach, message),
                    None => oracle.respond(approach, raw_result_from_value(step)),
                };
            }
        }
        Ok(oracle)
    }

    /// Read and load a replay file from disk.
    pub fn from_json_file(path: &Path) -> OracleResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| OracleError::Rejected(format!("cannot read {}: {e}", path.display())))?;
        let value: Value = serde_json::from_slice(&bytes)?;
        Self::from_json(&value)
    }

    /// Calls observed so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_step(&self, approach: &str) -> Option<ScriptStep> {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = match scripts.get_mut(approach) {
            Some(q) if !q.is_empty() => q,
            _ => scripts.get_mut(DEFAULT_SCRIPT_KEY)?,
        };
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl GradingOracle for ScriptedOracle {
    async fn grade(
        &self,
        _submission_text: &str,
        _context: &GradingContext,
        strictness: f64,
        approach: &str,
    ) -> OracleResult<RawGradingResult> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                approach: approach.to_string(),
                strictness,
            });

        if let Some(responder) = &self.responder {
            return responder(approach, strictness);
        }

        match self.next_step(approach) {
            Some(ScriptStep::Respond(raw)) => Ok(raw),
            Some(ScriptStep::Fail(message)) => Err(OracleError::Rejected(message)),
            Some(ScriptStep::Delay(delay, raw)) => {
                tokio::time::sleep(delay).await;
                Ok(raw)
            }
            None => Err(OracleError::Rejected(format!(
                "no script for approach {approach}"
            ))),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
