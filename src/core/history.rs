//! Label history tracking.
//!
//! History is append-only. A label's current state is the new state of its
//! most recent entry, and a deleted label's final entry has no new state.

use super::label::LabelRef;
use super::machine::StateMachine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A committed history entry.
///
/// The first entry of every label has no old state; deletion writes an
/// entry with no new state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic per store. Ordering by id is ordering by time.
    pub id: i64,
    pub label: LabelRef,
    pub created: DateTime<Utc>,
    /// Set when the move was requested explicitly rather than earned.
    pub forced: bool,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
}

/// An entry waiting for the store to assign its id and timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub label: LabelRef,
    pub forced: bool,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
}

impl NewHistoryEntry {
    pub fn creation(label: &LabelRef, initial_state: &str) -> Self {
        Self {
            label: label.clone(),
            forced: false,
            old_state: None,
            new_state: Some(initial_state.to_string()),
        }
    }

    pub fn transition(label: &LabelRef, from: &str, to: &str) -> Self {
        Self {
            label: label.clone(),
            forced: false,
            old_state: Some(from.to_string()),
            new_state: Some(to.to_string()),
        }
    }

    pub fn forced(label: &LabelRef, from: Option<&str>, to: &str) -> Self {
        Self {
            label: label.clone(),
            forced: true,
            old_state: from.map(str::to_string),
            new_state: Some(to.to_string()),
        }
    }

    pub fn deletion(label: &LabelRef, from: Option<&str>) -> Self {
        Self {
            label: label.clone(),
            forced: false,
            old_state: from.map(str::to_string),
            new_state: None,
        }
    }

    /// Stamp the entry as committed.
    pub fn into_entry(self, id: i64, created: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            id,
            label: self.label,
            created,
            forced: self.forced,
            old_state: self.old_state,
            new_state: self.new_state,
        }
    }
}

/// Inconsistencies found by [`LabelHistory::check_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryViolation {
    #[error("History is empty")]
    Empty,

    #[error("Entry {id} is a second creation entry")]
    DuplicateCreation { id: i64 },

    #[error("Entry {id} starts from {found:?} but the label was in {expected:?}")]
    Discontinuous {
        id: i64,
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("Entry {id} moves {from} -> {to}, which is not a transition of the state machine")]
    InvalidEdge { id: i64, from: String, to: String },

    #[error("Entry {id} follows the deletion of the label")]
    AfterDeletion { id: i64 },
}

/// Ordered history of a single label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelHistory {
    entries: Vec<HistoryEntry>,
}

impl LabelHistory {
    /// Build a history from entries in any order.
    pub fn new(mut entries: Vec<HistoryEntry>) -> Self {
        entries.sort_by_key(|entry| entry.id);
        Self { entries }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry that moved the label into its current state.
    pub fn current_entry(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// The label's current state, or `None` when deleted or unknown.
    pub fn current_state(&self) -> Option<&str> {
        self.current_entry()?.new_state.as_deref()
    }

    /// The states visited, in order.
    pub fn get_path(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|entry| entry.new_state.as_deref())
            .collect()
    }

    /// Check that the history describes a legal walk of `machine`.
    ///
    /// Exactly one creation entry comes first, each entry starts where the
    /// previous one ended, nothing follows a deletion, and unforced moves
    /// follow the machine's declared transitions.
    pub fn check_consistency(&self, machine: &StateMachine) -> Result<(), HistoryViolation> {
        let Some((first, rest)) = self.entries.split_first() else {
            return Err(HistoryViolation::Empty);
        };
        if first.old_state.is_some() {
            return Err(HistoryViolation::Discontinuous {
                id: first.id,
                expected: None,
                found: first.old_state.clone(),
            });
        }

        let mut current = first.new_state.clone();
        for entry in rest {
            if entry.old_state.is_none() && entry.new_state.is_some() {
                return Err(HistoryViolation::DuplicateCreation { id: entry.id });
            }
            let Some(from) = current.as_deref() else {
                return Err(HistoryViolation::AfterDeletion { id: entry.id });
            };
            if entry.old_state.as_deref() != Some(from) {
                return Err(HistoryViolation::Discontinuous {
                    id: entry.id,
                    expected: current.clone(),
                    found: entry.old_state.clone(),
                });
            }
            if let (false, Some(to)) = (entry.forced, entry.new_state.as_deref()) {
                let allowed = machine
                    .state(from)
                    .is_some_and(|state| state.next_states().destinations().contains(&to));
                if !allowed {
                    return Err(HistoryViolation::InvalidEdge {
                        id: entry.id,
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
            }
            current = entry.new_state.clone();
        }
        Ok(())
    }
}
