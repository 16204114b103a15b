//! Builder API for state machine construction.
//!
//! Gates and actions are described with fluent builders, then
//! [`StateMachineBuilder::build`] compiles exit conditions and validates the
//! machine as a whole.

pub mod error;
pub mod machine;
pub mod state;
pub mod validation;

pub use error::BuildError;
pub use machine::StateMachineBuilder;
pub use state::{ActionBuilder, GateBuilder};
pub use validation::ConfigViolation;

/// Start a gate with an exit condition.
///
/// # Example
///
/// ```
/// use labelflow::builder::gate;
///
/// let review = gate("review", "metadata.approved").next_state("done").build().unwrap();
/// assert_eq!(review.exit_condition.source(), "metadata.approved");
/// ```
pub fn gate(name: impl Into<String>, exit_condition: impl Into<String>) -> GateBuilder {
    GateBuilder::new(name).exit_condition(exit_condition)
}

/// Start an action that delivers to `webhook`.
pub fn action(name: impl Into<String>, webhook: impl Into<String>) -> ActionBuilder {
    ActionBuilder::new(name).webhook(webhook)
}
