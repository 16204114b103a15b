//! Whole-machine checks, accumulated with `Validation` so every problem is
//! reported at once.

use crate::core::metadata::split_path;
use crate::core::State;
use crate::feeds::{referenced_feeds, Feed};
use crate::triggers::Trigger;
use std::collections::{BTreeSet, HashSet, VecDeque};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigViolation {
    #[error("State machine has no states")]
    NoStates,

    #[error("State '{0}' is defined more than once")]
    DuplicateState(String),

    #[error("Feed '{0}' is declared more than once")]
    DuplicateFeed(String),

    #[error("State '{state}' leads to undefined state '{destination}'")]
    UnknownDestination { state: String, destination: String },

    #[error("State '{0}' can never be reached from the initial state")]
    UnreachableState(String),

    #[error("State '{state}' reads undeclared feed '{feed}'")]
    UndeclaredFeed { state: String, feed: String },

    #[error("Action '{state}' routes on '{path}', but actions only see metadata")]
    ActionReadsFeed { state: String, path: String },

    #[error("Gate '{0}' has an interval trigger of zero")]
    ZeroInterval(String),
}

pub type Check = Validation<(), NonEmptyVec<ConfigViolation>>;

fn check(violation: Option<ConfigViolation>) -> Check {
    match violation {
        Some(violation) => Validation::fail(violation),
        None => Validation::success(()),
    }
}

/// Validate a machine's states and feeds.
pub fn validate(states: &[State], feeds: &[Feed]) -> Check {
    if states.is_empty() {
        return Validation::fail(ConfigViolation::NoStates);
    }

    let mut checks: Vec<Check> = Vec::new();
    checks.extend(duplicate_states(states));
    checks.extend(duplicate_feeds(feeds));
    checks.extend(unknown_destinations(states));
    checks.extend(unreachable_states(states));
    checks.extend(feed_references(states, feeds));
    checks.extend(zero_intervals(states));

    // Accumulate every failure rather than stopping at the first.
    Validation::all_vec(checks).map(|_| ())
}

fn duplicate_states(states: &[State]) -> Vec<Check> {
    let mut seen = HashSet::new();
    states
        .iter()
        .map(|state| {
            check((!seen.insert(state.name())).then(|| ConfigViolation::DuplicateState(state.name().to_string())))
        })
        .collect()
}

fn duplicate_feeds(feeds: &[Feed]) -> Vec<Check> {
    let mut seen = HashSet::new();
    feeds
        .iter()
        .map(|feed| {
            check((!seen.insert(feed.name.as_str())).then(|| ConfigViolation::DuplicateFeed(feed.name.clone())))
        })
        .collect()
}

fn unknown_destinations(states: &[State]) -> Vec<Check> {
    let names: HashSet<&str> = states.iter().map(State::name).collect();
    states
        .iter()
        .flat_map(|state| {
            state
                .next_states()
                .destinations()
                .into_iter()
                .filter(|destination| !names.contains(destination))
                .map(|destination| {
                    check(Some(ConfigViolation::UnknownDestination {
                        state: state.name().to_string(),
                        destination: destination.to_string(),
                    }))
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn unreachable_states(states: &[State]) -> Vec<Check> {
    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&State> = states.first().into_iter().collect();

    while let Some(state) = queue.pop_front() {
        if !reached.insert(state.name()) {
            continue;
        }
        for destination in state.next_states().destinations() {
            if let Some(next) = states.iter().find(|s| s.name() == destination) {
                queue.push_back(next);
            }
        }
    }

    states
        .iter()
        .map(|state| {
            check(
                (!reached.contains(state.name()))
                    .then(|| ConfigViolation::UnreachableState(state.name().to_string())),
            )
        })
        .collect()
}

fn feed_references(states: &[State], feeds: &[Feed]) -> Vec<Check> {
    let declared: HashSet<&str> = feeds.iter().map(|feed| feed.name.as_str()).collect();
    let mut checks = Vec::new();

    for state in states {
        match state {
            State::Gate(gate) => {
                let mut accessed = gate.exit_condition.accessed_variables();
                accessed.extend(gate.next_states.accessed_variables());
                for feed in referenced_feeds(&accessed) {
                    checks.push(check((!declared.contains(feed.as_str())).then(|| {
                        ConfigViolation::UndeclaredFeed {
                            state: gate.name.clone(),
                            feed,
                        }
                    })));
                }
            }
            State::Action(action) => {
                let accessed: BTreeSet<String> = action.next_states.accessed_variables();
                for path in accessed {
                    let reads_feed = split_path(&path).first().is_some_and(|ns| ns == "feeds");
                    checks.push(check(reads_feed.then(|| ConfigViolation::ActionReadsFeed {
                        state: action.name.clone(),
                        path,
                    })));
                }
            }
        }
    }
    checks
}

fn zero_intervals(states: &[State]) -> Vec<Check> {
    states
        .iter()
        .filter_map(State::as_gate)
        .map(|gate| {
            let zero = gate
                .triggers
                .iter()
                .any(|trigger| matches!(trigger, Trigger::Interval { interval } if interval.is_zero()));
            check(zero.then(|| ConfigViolation::ZeroInterval(gate.name.clone())))
        })
        .collect()
}
