//! Build errors for state machine builders.

use super::validation::ConfigViolation;
use crate::exit_conditions::CompileError;
use thiserror::Error;

/// Errors that can occur when building state machines.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Gate '{0}' has no exit condition. Call .exit_condition(source)")]
    MissingExitCondition(String),

    #[error("Action '{0}' has no webhook. Call .webhook(url)")]
    MissingWebhook(String),

    #[error("Invalid exit condition on gate '{gate}':\n{error}")]
    InvalidExitCondition { gate: String, error: CompileError },

    #[error("Invalid webhook URL pattern '{pattern}': {error}")]
    InvalidWebhookPattern { pattern: String, error: regex::Error },

    #[error("State machine '{name}' is invalid: {}", describe(.violations))]
    Invalid {
        name: String,
        violations: Vec<ConfigViolation>,
    },
}

fn describe(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
