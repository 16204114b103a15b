//! Builder for constructing state machines.

use crate::builder::error::BuildError;
use crate::builder::state::{ActionBuilder, GateBuilder};
use crate::builder::validation::validate;
use crate::core::{State, StateMachine};
use crate::feeds::Feed;
use crate::webhooks::WebhookConfig;
use std::collections::BTreeMap;
use stillwater::validation::Validation;

#[derive(Debug, Clone)]
enum StateBuilder {
    Gate(GateBuilder),
    Action(ActionBuilder),
}

/// Builder for constructing state machines with a fluent API.
///
/// States are kept in the order they are added and the first one is the
/// initial state.
///
/// # Example
///
/// ```
/// use labelflow::builder::{action, gate, StateMachineBuilder};
///
/// let machine = StateMachineBuilder::new("onboarding")
///     .gate(gate("waiting", "metadata.signed_up").next_state("welcome"))
///     .action(action("welcome", "https://example.com/welcome").next_state("done"))
///     .gate(gate("done", "false"))
///     .build()
///     .unwrap();
///
/// assert_eq!(machine.initial_state().map(|s| s.name()), Some("waiting"));
/// ```
#[derive(Debug, Clone)]
pub struct StateMachineBuilder {
    name: String,
    states: Vec<StateBuilder>,
    feeds: Vec<Feed>,
    webhooks: Vec<(String, BTreeMap<String, String>)>,
}

impl StateMachineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            feeds: Vec::new(),
            webhooks: Vec::new(),
        }
    }

    pub fn gate(mut self, gate: GateBuilder) -> Self {
        self.states.push(StateBuilder::Gate(gate));
        self
    }

    pub fn action(mut self, action: ActionBuilder) -> Self {
        self.states.push(StateBuilder::Action(action));
        self
    }

    /// Declare a feed readable from exit conditions as `feeds.<name>.*`.
    ///
    /// `{label}` in the URL is replaced with the label's name.
    pub fn feed(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.feeds.push(Feed::new(name, url));
        self
    }

    /// Send `headers` with every webhook whose URL matches `pattern`.
    pub fn webhook_headers(
        mut self,
        pattern: impl Into<String>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        self.webhooks.push((pattern.into(), headers));
        self
    }

    /// Build and validate the state machine.
    ///
    /// Per-state problems fail fast; whole-machine problems are collected
    /// and reported together in [`BuildError::Invalid`].
    pub fn build(self) -> Result<StateMachine, BuildError> {
        let states = self
            .states
            .into_iter()
            .map(|builder| match builder {
                StateBuilder::Gate(gate) => gate.build().map(State::Gate),
                StateBuilder::Action(action) => action.build().map(State::Action),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let webhooks = self
            .webhooks
            .into_iter()
            .map(|(pattern, headers)| {
                WebhookConfig::new(&pattern, headers)
                    .map_err(|error| BuildError::InvalidWebhookPattern { pattern, error })
            })
            .collect::<Result<Vec<_>, _>>()?;

        match validate(&states, &self.feeds) {
            Validation::Success(_) => Ok(StateMachine::from_parts(
                self.name, states, self.feeds, webhooks,
            )),
            Validation::Failure(errors) => Err(BuildError::Invalid {
                name: self.name,
                violations: errors.iter().cloned().collect(),
            }),
        }
    }
}
