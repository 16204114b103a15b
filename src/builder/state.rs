//! Builders for gates and actions.

use crate::builder::error::BuildError;
use crate::core::{Action, Gate, NextStates};
use crate::exit_conditions::ExitConditionProgram;
use crate::triggers::Trigger;
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde_json::Value;
use std::time::Duration;

/// Builder for a gate with a fluent API.
#[derive(Debug, Clone)]
pub struct GateBuilder {
    name: String,
    exit_condition: Option<String>,
    triggers: Vec<Trigger>,
    next_states: NextStates,
}

impl GateBuilder {
    /// Create a gate with no exit condition, triggers or next states.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exit_condition: None,
            triggers: Vec::new(),
            next_states: NextStates::None,
        }
    }

    /// Set the exit condition source (required).
    pub fn exit_condition(mut self, source: impl Into<String>) -> Self {
        self.exit_condition = Some(source.into());
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Re-evaluate whenever a metadata update touches `path`.
    pub fn on_metadata(self, path: impl Into<String>) -> Self {
        self.trigger(Trigger::Metadata { path: path.into() })
    }

    pub fn every(self, interval: Duration) -> Self {
        self.trigger(Trigger::Interval { interval })
    }

    /// Re-evaluate daily at `time` UTC.
    pub fn daily_at(self, time: NaiveTime) -> Self {
        self.trigger(Trigger::SystemTime { time })
    }

    /// Re-evaluate daily at `time` in `timezone`.
    pub fn daily_at_in(self, time: NaiveTime, timezone: Tz) -> Self {
        self.trigger(Trigger::Timezone { time, timezone })
    }

    /// Re-evaluate daily at `time` in the timezone each label names at
    /// `path`.
    pub fn daily_at_label_timezone(self, time: NaiveTime, path: impl Into<String>) -> Self {
        self.trigger(Trigger::MetadataTimezone {
            time,
            path: path.into(),
        })
    }

    pub fn next(mut self, next_states: NextStates) -> Self {
        self.next_states = next_states;
        self
    }

    /// Always move to `state` when the exit condition holds.
    pub fn next_state(self, state: impl Into<String>) -> Self {
        self.next(NextStates::constant(state))
    }

    /// Pick the next state by the value at `path`.
    pub fn route<I, S>(self, path: impl Into<String>, destinations: I) -> Self
    where
        I: IntoIterator<Item = (Value, S)>,
        S: Into<String>,
    {
        self.next(NextStates::context(path, destinations))
    }

    /// Compile the exit condition and build the gate.
    pub fn build(self) -> Result<Gate, BuildError> {
        let source = self
            .exit_condition
            .ok_or_else(|| BuildError::MissingExitCondition(self.name.clone()))?;
        let exit_condition =
            ExitConditionProgram::compile(&source).map_err(|error| BuildError::InvalidExitCondition {
                gate: self.name.clone(),
                error,
            })?;

        Ok(Gate {
            name: self.name,
            exit_condition,
            triggers: self.triggers,
            next_states: self.next_states,
        })
    }
}

/// Builder for an action with a fluent API.
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    name: String,
    webhook: Option<String>,
    next_states: NextStates,
}

impl ActionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            webhook: None,
            next_states: NextStates::None,
        }
    }

    /// Set the webhook URL (required).
    pub fn webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook = Some(url.into());
        self
    }

    pub fn next(mut self, next_states: NextStates) -> Self {
        self.next_states = next_states;
        self
    }

    pub fn next_state(self, state: impl Into<String>) -> Self {
        self.next(NextStates::constant(state))
    }

    /// Pick the next state by the metadata value at `path`.
    pub fn route<I, S>(self, path: impl Into<String>, destinations: I) -> Self
    where
        I: IntoIterator<Item = (Value, S)>,
        S: Into<String>,
    {
        self.next(NextStates::context(path, destinations))
    }

    pub fn build(self) -> Result<Action, BuildError> {
        let webhook = self
            .webhook
            .ok_or_else(|| BuildError::MissingWebhook(self.name.clone()))?;

        Ok(Action {
            name: self.name,
            webhook,
            next_states: self.next_states,
        })
    }
}
