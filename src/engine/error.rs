use crate::core::{LabelRef, NextStateError};
use crate::exit_conditions::EvaluationError;
use crate::feeds::FeedError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while creating, updating or moving labels.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Label {0} does not exist")]
    UnknownLabel(LabelRef),

    #[error("Label {0} has been deleted")]
    DeletedLabel(LabelRef),

    #[error("Label {0} already exists")]
    LabelAlreadyExists(LabelRef),

    #[error("State machine '{0}' does not exist")]
    UnknownStateMachine(String),

    #[error("State '{state}' does not exist in state machine '{state_machine}'")]
    UnknownState {
        state_machine: String,
        state: String,
    },

    #[error("Metadata for label {0} must be a JSON object")]
    InvalidMetadata(LabelRef),

    #[error("Exit condition of gate '{gate}' failed: {source}")]
    Evaluation {
        gate: String,
        #[source]
        source: EvaluationError,
    },

    #[error(transparent)]
    NextState(#[from] NextStateError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("No webhook runner is configured for state machine '{0}'")]
    NoWebhookRunner(String),

    #[error("Failed to encode webhook payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
