//! State definitions: gates, actions and their next-state rules.

use super::metadata::split_path;
use crate::exit_conditions::{values_equal, ExitConditionProgram, Variables};
use crate::triggers::Trigger;
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NextStateError {
    #[error("State is terminal and has no next state")]
    NoNextStates,

    #[error("No destination matches {value} at '{path}'")]
    NoMatchingNextState { path: String, value: Value },
}

/// One arm of a context-driven next-state rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub value: Value,
    pub state: String,
}

/// How a state chooses where a label goes when it leaves.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NextStates {
    /// Always the same destination.
    Constant(String),
    /// The destination whose value equals the context value at `path`.
    Context {
        path: String,
        destinations: Vec<Destination>,
    },
    /// Terminal: labels never leave.
    #[default]
    None,
}

impl NextStates {
    pub fn constant(state: impl Into<String>) -> Self {
        NextStates::Constant(state.into())
    }

    pub fn context<I, S>(path: impl Into<String>, destinations: I) -> Self
    where
        I: IntoIterator<Item = (Value, S)>,
        S: Into<String>,
    {
        NextStates::Context {
            path: path.into(),
            destinations: destinations
                .into_iter()
                .map(|(value, state)| Destination {
                    value,
                    state: state.into(),
                })
                .collect(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NextStates::None)
    }

    /// Every state this rule can lead to.
    pub fn destinations(&self) -> Vec<&str> {
        match self {
            NextStates::Constant(state) => vec![state.as_str()],
            NextStates::Context { destinations, .. } => {
                destinations.iter().map(|d| d.state.as_str()).collect()
            }
            NextStates::None => Vec::new(),
        }
    }

    /// Context paths the rule reads.
    pub fn accessed_variables(&self) -> BTreeSet<String> {
        match self {
            NextStates::Context { path, .. } => BTreeSet::from([path.clone()]),
            _ => BTreeSet::new(),
        }
    }

    /// Pick the destination for a label described by `context`.
    pub fn next_state<V>(&self, context: &V) -> Result<&str, NextStateError>
    where
        V: Variables + ?Sized,
    {
        match self {
            NextStates::Constant(state) => Ok(state),
            NextStates::Context { path, destinations } => {
                let value = context.lookup(&split_path(path));
                destinations
                    .iter()
                    .find(|destination| values_equal(&destination.value, &value))
                    .map(|destination| destination.state.as_str())
                    .ok_or_else(|| NextStateError::NoMatchingNextState {
                        path: path.clone(),
                        value,
                    })
            }
            NextStates::None => Err(NextStateError::NoNextStates),
        }
    }
}

/// A state that waits for its exit condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub name: String,
    pub exit_condition: ExitConditionProgram,
    pub triggers: Vec<Trigger>,
    pub next_states: NextStates,
}

/// A state that delivers a webhook, then moves on once it succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub webhook: String,
    pub next_states: NextStates,
}

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Gate(Gate),
    Action(Action),
}

impl State {
    pub fn name(&self) -> &str {
        match self {
            State::Gate(gate) => &gate.name,
            State::Action(action) => &action.name,
        }
    }

    pub fn next_states(&self) -> &NextStates {
        match self {
            State::Gate(gate) => &gate.next_states,
            State::Action(action) => &action.next_states,
        }
    }

    /// Terminal states have no way out and are never processed.
    pub fn is_terminal(&self) -> bool {
        self.next_states().is_terminal()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            State::Gate(_) => "gate",
            State::Action(_) => "action",
        }
    }

    pub fn as_gate(&self) -> Option<&Gate> {
        match self {
            State::Gate(gate) => Some(gate),
            State::Action(_) => None,
        }
    }

    pub fn as_action(&self) -> Option<&Action> {
        match self {
            State::Action(action) => Some(action),
            State::Gate(_) => None,
        }
    }
}
