//! The transition engine.
//!
//! Moves labels between states:
//! - gates move when their exit condition holds
//! - actions move once their webhook is delivered
//!
//! Every step locks the label's row for the length of its transaction, so
//! steps for one label never interleave while different labels proceed in
//! parallel.

mod batch;
mod error;
mod step;
mod transitions;

pub use batch::{
    process_action_retries, process_cron, process_gate_metadata_retries, process_gate_timezone_trigger,
    process_gate_trigger, CronSummary, LabelFilter,
};
pub(crate) use batch::process_label;
pub use error::TransitionError;
pub(crate) use step::lock_existing;
pub use step::{finish, process_action, process_gate, process_state, StepResult};
pub use transitions::{process_transitions, TransitionSummary};
