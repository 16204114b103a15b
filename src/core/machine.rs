use super::state::{Action, Gate, State};
use crate::feeds::Feed;
use crate::webhooks::WebhookConfig;

/// A validated state machine.
///
/// Built with [`StateMachineBuilder`](crate::builder::StateMachineBuilder),
/// which guarantees at least one state, unique state names and known
/// destinations. The first state is where new labels start.
#[derive(Debug, Clone)]
pub struct StateMachine {
    name: String,
    states: Vec<State>,
    feeds: Vec<Feed>,
    webhooks: Vec<WebhookConfig>,
}

impl StateMachine {
    pub(crate) fn from_parts(
        name: String,
        states: Vec<State>,
        feeds: Vec<Feed>,
        webhooks: Vec<WebhookConfig>,
    ) -> Self {
        Self {
            name,
            states,
            feeds,
            webhooks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// The state new labels are created in, if the machine has any states.
    pub fn initial_state(&self) -> Option<&State> {
        self.states.first()
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|state| state.name() == name)
    }

    pub fn gates(&self) -> impl Iterator<Item = &Gate> {
        self.states.iter().filter_map(State::as_gate)
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.states.iter().filter_map(State::as_action)
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn feed(&self, name: &str) -> Option<&Feed> {
        self.feeds.iter().find(|feed| feed.name == name)
    }

    pub fn webhooks(&self) -> &[WebhookConfig] {
        &self.webhooks
    }
}
