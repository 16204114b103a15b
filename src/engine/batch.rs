//! Batch processing of every label in a state, as run by cron jobs.
//!
//! Errors for individual labels are logged and counted, never propagated,
//! so one bad label cannot stall a batch.

use super::error::TransitionError;
use super::step::{finish, process_state, StepResult};
use super::transitions::process_transitions;
use crate::app::App;
use crate::core::metadata::{get_path, metadata_relative, split_path};
use crate::core::{LabelRecord, LabelRef, State, StateMachine};
use std::collections::BTreeSet;
use tracing::{debug, error, info};

/// Which labels in a state a batch considers.
#[derive(Debug, Clone, Copy)]
pub enum LabelFilter<'a> {
    All,
    /// Labels whose latest metadata update has not been evaluated yet.
    MetadataUnprocessed,
    /// Labels whose metadata holds one of `values` at `path`.
    MetadataIn {
        path: &'a str,
        values: &'a BTreeSet<&'static str>,
    },
}

impl LabelFilter<'_> {
    pub fn matches(&self, record: &LabelRecord) -> bool {
        match self {
            LabelFilter::All => true,
            LabelFilter::MetadataUnprocessed => !record.metadata_triggers_processed,
            LabelFilter::MetadataIn { path, values } => {
                get_path(&record.metadata, &split_path(metadata_relative(path)))
                    .and_then(|value| value.as_str())
                    .is_some_and(|value| values.contains(value))
            }
        }
    }
}

/// What a batch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CronSummary {
    pub processed: usize,
    pub progressed: usize,
    pub failed: usize,
    /// The batch stopped early because termination was requested.
    pub interrupted: bool,
}

/// Process every label in `state` that passes `filter`.
///
/// Each label gets its own transaction. Labels that move on are then
/// driven through [`process_transitions`]. `should_terminate` is polled
/// between labels.
pub async fn process_cron<F>(
    app: &App,
    machine: &StateMachine,
    state: &State,
    filter: LabelFilter<'_>,
    should_terminate: F,
) -> Result<CronSummary, TransitionError>
where
    F: Fn() -> bool,
{
    let mut summary = CronSummary::default();
    if state.is_terminal() {
        return Ok(summary);
    }

    let candidates: Vec<String> = app
        .store()
        .labels_in_state(machine.name(), state.name())
        .await?
        .into_iter()
        .filter(|record| filter.matches(record))
        .map(|record| record.label.name)
        .collect();

    for name in candidates {
        if should_terminate() {
            info!(state = state.name(), "Terminating batch early");
            summary.interrupted = true;
            break;
        }

        let label = LabelRef::new(name, machine.name());
        summary.processed += 1;

        match process_label(app, machine, state, &label).await {
            Ok(StepResult::Transitioned { .. }) => {
                summary.progressed += 1;
                match process_transitions(app, &label).await {
                    Ok(_) | Err(TransitionError::DeletedLabel(_)) => {}
                    Err(err) => {
                        error!(label = %label, error = %err, "Failed to process transitions");
                        summary.failed += 1;
                    }
                }
            }
            Ok(StepResult::NoProgress) => {}
            Err(TransitionError::DeletedLabel(_) | TransitionError::UnknownLabel(_)) => {
                debug!(label = %label, "Label vanished before it was processed");
            }
            Err(err) => {
                error!(label = %label, state = state.name(), error = %err, "Failed to process label");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Process one label in `state` in its own transaction.
pub(crate) async fn process_label(
    app: &App,
    machine: &StateMachine,
    state: &State,
    label: &LabelRef,
) -> Result<StepResult, TransitionError> {
    let mut txn = app.store().begin().await?;
    let result = process_state(app, machine, state, txn.as_mut(), label).await;
    finish(txn, result).await
}

/// Retry webhook delivery for every label waiting in an action.
pub async fn process_action_retries<F>(
    app: &App,
    machine: &StateMachine,
    action: &State,
    should_terminate: F,
) -> Result<CronSummary, TransitionError>
where
    F: Fn() -> bool,
{
    process_cron(app, machine, action, LabelFilter::All, should_terminate).await
}

/// Re-evaluate a gate for every label in it.
pub async fn process_gate_trigger<F>(
    app: &App,
    machine: &StateMachine,
    gate: &State,
    should_terminate: F,
) -> Result<CronSummary, TransitionError>
where
    F: Fn() -> bool,
{
    process_cron(app, machine, gate, LabelFilter::All, should_terminate).await
}

/// Re-evaluate a gate for labels whose metadata timezone is in `timezones`.
pub async fn process_gate_timezone_trigger<F>(
    app: &App,
    machine: &StateMachine,
    gate: &State,
    path: &str,
    timezones: &BTreeSet<&'static str>,
    should_terminate: F,
) -> Result<CronSummary, TransitionError>
where
    F: Fn() -> bool,
{
    let filter = LabelFilter::MetadataIn {
        path,
        values: timezones,
    };
    process_cron(app, machine, gate, filter, should_terminate).await
}

/// Re-evaluate a gate for labels with unprocessed metadata updates.
pub async fn process_gate_metadata_retries<F>(
    app: &App,
    machine: &StateMachine,
    gate: &State,
    should_terminate: F,
) -> Result<CronSummary, TransitionError>
where
    F: Fn() -> bool,
{
    process_cron(
        app,
        machine,
        gate,
        LabelFilter::MetadataUnprocessed,
        should_terminate,
    )
    .await
}
