use crate::core::StateMachine;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The set of state machines an application runs.
#[derive(Debug, Clone, Default)]
pub struct Config {
    state_machines: BTreeMap<String, Arc<StateMachine>>,
}

impl Config {
    pub fn new(state_machines: impl IntoIterator<Item = StateMachine>) -> Self {
        Self {
            state_machines: state_machines
                .into_iter()
                .map(|machine| (machine.name().to_string(), Arc::new(machine)))
                .collect(),
        }
    }

    pub fn state_machine(&self, name: &str) -> Option<&Arc<StateMachine>> {
        self.state_machines.get(name)
    }

    pub fn state_machines(&self) -> impl Iterator<Item = &Arc<StateMachine>> {
        self.state_machines.values()
    }
}
