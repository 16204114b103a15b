use super::error::TransitionError;
use super::step::{finish, process_current_state, StepResult};
use crate::app::App;
use crate::core::LabelRef;
use tracing::{debug, warn};

/// What a [`process_transitions`] run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionSummary {
    pub steps: usize,
    /// The run stopped at the transition limit rather than at rest.
    pub capped: bool,
}

/// Move a label through as many states as it can go.
///
/// Each step runs in its own transaction. Stops when a step makes no
/// progress, when the label is deleted, or after the configured maximum
/// number of transitions, which guards against cycles of gates that are
/// always open.
pub async fn process_transitions(
    app: &App,
    label: &LabelRef,
) -> Result<TransitionSummary, TransitionError> {
    let machine = app.state_machine(&label.state_machine)?;
    let limit = app.settings().max_transitions;
    let mut summary = TransitionSummary::default();

    while summary.steps < limit {
        let mut txn = app.store().begin().await?;
        let result = process_current_state(app, &machine, txn.as_mut(), label).await;
        match finish(txn, result).await {
            Ok(StepResult::Transitioned { .. }) => summary.steps += 1,
            Ok(StepResult::NoProgress) => return Ok(summary),
            Err(TransitionError::DeletedLabel(_)) => {
                debug!(label = %label, "Label deleted while processing transitions");
                return Ok(summary);
            }
            Err(error) => return Err(error),
        }
    }

    warn!(
        label = %label,
        limit,
        "Label reached the transition limit; the state machine may contain a cycle"
    );
    summary.capped = true;
    Ok(summary)
}
