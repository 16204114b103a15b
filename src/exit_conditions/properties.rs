//! Built-in properties available through copula clauses.
//!
//! - `x is defined`
//! - `<duration> has passed since <timestamp>`
//! - `x is in <collection>`

use super::error::EvaluationError;
use super::evaluator::{type_name, values_equal};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};
use serde_json::Value;

/// Answer a `PROPERTY` instruction with the built-in properties.
pub fn standard_property(
    adjectives: &[String],
    subject: Value,
    arguments: &[(String, Value)],
    now: DateTime<FixedOffset>,
) -> Result<Value, EvaluationError> {
    let adjective_words: Vec<&str> = adjectives.iter().map(String::as_str).collect();
    let preposition_words: Vec<&str> = arguments.iter().map(|(word, _)| word.as_str()).collect();

    match (adjective_words.as_slice(), preposition_words.as_slice()) {
        (["defined"], []) => Ok(Value::Bool(!subject.is_null())),
        (["passed"], ["since"]) => has_passed_since(&subject, &arguments[0].1, now).map(Value::Bool),
        ([], ["in"]) => contains(&arguments[0].1, &subject).map(Value::Bool),
        _ => Err(EvaluationError::UnknownProperty(
            adjective_words
                .iter()
                .chain(&preposition_words)
                .copied()
                .collect::<Vec<_>>()
                .join(" "),
        )),
    }
}

fn has_passed_since(
    duration: &Value,
    epoch: &Value,
    now: DateTime<FixedOffset>,
) -> Result<bool, EvaluationError> {
    let seconds = duration
        .as_f64()
        .ok_or_else(|| EvaluationError::InvalidDuration(duration.to_string()))?;

    let epoch = match epoch {
        Value::Null => return Ok(false),
        Value::String(text) => parse_timestamp(text)?,
        other => return Err(EvaluationError::InvalidTimestamp(other.to_string())),
    };

    let millis = seconds * 1000.0;
    let delta = (millis.is_finite() && millis.abs() < i64::MAX as f64)
        .then(|| Duration::try_milliseconds(millis as i64))
        .flatten()
        .ok_or_else(|| EvaluationError::InvalidDuration(duration.to_string()))?;
    Ok(epoch
        .checked_add_signed(delta)
        .is_some_and(|deadline| now >= deadline))
}

/// Parse an RFC 3339 timestamp, reading offset-less ISO timestamps as UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>, EvaluationError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(timestamp);
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| DateTime::<FixedOffset>::from(naive.and_utc()))
        .ok_or_else(|| EvaluationError::InvalidTimestamp(text.to_string()))
}

fn contains(container: &Value, item: &Value) -> Result<bool, EvaluationError> {
    match (container, item) {
        (Value::Array(items), _) => Ok(items.iter().any(|candidate| values_equal(candidate, item))),
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(EvaluationError::NotAContainer(type_name(container).to_string())),
    }
}
