//! Core state machine types.
//!
//! - States: gates with exit conditions, actions with webhooks
//! - Labels and their stored records
//! - Append-only label history
//! - Metadata document helpers
//!
//! Nothing in this module performs I/O.

mod history;
mod label;
mod machine;
pub mod metadata;
mod state;

pub use history::{HistoryEntry, HistoryViolation, LabelHistory, NewHistoryEntry};
pub use label::{LabelRecord, LabelRef};
pub use machine::StateMachine;
pub use state::{Action, Destination, Gate, NextStateError, NextStates, State};
