//! Labels: named instances travelling through a state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies a label within a state machine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelRef {
    pub name: String,
    pub state_machine: String,
}

impl LabelRef {
    pub fn new(name: impl Into<String>, state_machine: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state_machine: state_machine.into(),
        }
    }
}

impl fmt::Display for LabelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.state_machine, self.name)
    }
}

/// Stored state of a label, apart from its history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub label: LabelRef,
    pub metadata: Value,
    pub deleted: bool,
    /// False while a metadata update still needs its gate re-evaluated.
    pub metadata_triggers_processed: bool,
    pub updated: DateTime<Utc>,
}

impl LabelRecord {
    pub fn new(label: LabelRef, metadata: Value) -> Self {
        Self {
            label,
            metadata,
            deleted: false,
            metadata_triggers_processed: true,
            updated: Utc::now(),
        }
    }
}
