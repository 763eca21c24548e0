//! Lenient boundary parsing of oracle output.
//!
//! Oracle replies are free text that usually contains a JSON object. This is
//! the single place where the defaulting policy applies: absent or
//! non-numeric numbers become `0`, absent text becomes `""`. Downstream code
//! never sees a partially-typed result.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::OracleError;
use crate::oracle_traits::OracleResult;
use crate::schema::{CriterionScore, RawGradingResult};

fn leading_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("static regex"))
}

/// Parse an oracle reply into a [`RawGradingResult`].
///
/// Accepts a bare JSON object or one embedded in surrounding prose or a
/// fenced code block. The first complete object wins; anything after it is
/// ignored. Fails only when no JSON object can be found.
pub fn parse_raw_result(text: &str) -> OracleResult<RawGradingResult> {
    let trimmed = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(raw_result_from_map(&map));
    }

    let mut last_err = None;
    for (start, _) in trimmed.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => return Ok(raw_result_from_map(&map)),
            // A truncated reply has no later object worth trying.
            Some(Err(err)) if err.is_eof() => return Err(OracleError::Unparseable(err.to_string())),
            Some(Err(err)) => last_err = Some(err.to_string()),
            _ => {}
        }
    }

    Err(OracleError::Unparseable(
        last_err.unwrap_or_else(|| "no JSON object in response".to_string()),
    ))
}

/// Build a result from an arbitrary JSON value, defaulting everything missing.
///
/// Non-object values yield an empty result rather than an error.
pub fn raw_result_from_value(value: &Value) -> RawGradingResult {
    match value {
        Value::Object(map) => raw_result_from_map(map),
        _ => RawGradingResult::default(),
    }
}

fn raw_result_from_map(map: &Map<String, Value>) -> RawGradingResult {
    let criteria_scores = match first_present(map, &["criteria_scores", "criteria"]) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_object().map(|obj| criterion_from_map(None, obj)))
            .collect(),
        // `{"Content": {"points": 3, ...}, ...}`
        Some(Value::Object(named)) => named
            .iter()
            .filter_map(|(name, item)| {
                item.as_object()
                    .map(|obj| criterion_from_map(Some(name.as_str()), obj))
            })
            .collect(),
        _ => Vec::new(),
    };

    RawGradingResult {
        score: number_field(map, &["score", "total_score"]),
        total: number_field(map, &["total", "max_score", "total_points"]),
        criteria_scores,
        feedback: text_field(map, &["feedback", "grading_feedback"]),
        approach_tag: text_field(map, &["approach_tag", "approach"]),
        reported_score: None,
    }
}

fn criterion_from_map(name: Option<&str>, map: &Map<String, Value>) -> CriterionScore {
    let name = match name {
        Some(n) => n.to_string(),
        None => text_field(map, &["name", "criterion"]),
    };
    CriterionScore {
        name,
        points: number_field(map, &["points", "score"]),
        max_points: number_field(map, &["max_points", "max_score", "max"]),
        feedback: text_field(map, &["feedback", "comment"]),
    }
}

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k).filter(|v| !v.is_null()))
}

fn number_field(map: &Map<String, Value>, keys: &[&str]) -> f64 {
    first_present(map, keys).map(as_number).unwrap_or(0.0)
}

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> String {
    match first_present(map, keys) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Numbers may arrive as JSON numbers or as strings like `"42"` or `"42/50"`.
fn as_number(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => leading_number_re()
            .find(s)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}
