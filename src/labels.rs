//! Label operations.
//!
//! Creation and forced moves drive the label as far as it can go before
//! returning. Metadata updates try the current gate once and leave anything
//! that fails to the metadata retry cron job.

use crate::app::App;
use crate::core::metadata::merge;
use crate::core::{LabelHistory, LabelRecord, LabelRef, NewHistoryEntry, State, StateMachine};
use crate::engine::{finish, lock_existing, process_label, process_transitions, TransitionError};
use crate::store::Transaction;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Create a label in its machine's initial state and process it.
///
/// Fails with [`TransitionError::LabelAlreadyExists`] if the name was ever
/// used in the machine, including by a deleted label. Once the label is
/// stored, failures while processing it are logged and the label stays
/// where it stopped.
pub async fn create_label(
    app: &App,
    label: &LabelRef,
    metadata: Value,
) -> Result<Value, TransitionError> {
    let machine = app.state_machine(&label.state_machine)?;
    if !metadata.is_object() {
        return Err(TransitionError::InvalidMetadata(label.clone()));
    }
    let initial = machine
        .initial_state()
        .ok_or_else(|| TransitionError::UnknownStateMachine(machine.name().to_string()))?;

    let mut txn = app.store().begin().await?;
    let result = insert_label(txn.as_mut(), label, &metadata, initial.name()).await;
    finish(txn, result).await?;
    info!(label = %label, state = initial.name(), "Label created");

    match process_transitions(app, label).await {
        Ok(_) => {}
        Err(TransitionError::DeletedLabel(_)) => {
            debug!(label = %label, "Label deleted before its first transitions ran");
        }
        Err(err) => {
            warn!(label = %label, error = %err, "Failed to process transitions after creating label");
        }
    }
    Ok(metadata)
}

async fn insert_label(
    txn: &mut dyn Transaction,
    label: &LabelRef,
    metadata: &Value,
    initial_state: &str,
) -> Result<(), TransitionError> {
    if txn.lock_label(label).await?.is_some() {
        return Err(TransitionError::LabelAlreadyExists(label.clone()));
    }
    txn.save_label(LabelRecord::new(label.clone(), metadata.clone()))
        .await?;
    txn.append_history(NewHistoryEntry::creation(label, initial_state))
        .await?;
    Ok(())
}

/// Merge `patch` into a label's metadata.
///
/// When the label sits in a gate whose metadata triggers fire, the gate is
/// evaluated straight away. Failures there are logged and left for the
/// metadata retry job; the update itself still succeeds.
pub async fn update_metadata_for_label(
    app: &App,
    label: &LabelRef,
    patch: Value,
) -> Result<Value, TransitionError> {
    let machine = app.state_machine(&label.state_machine)?;
    if !patch.is_object() {
        return Err(TransitionError::InvalidMetadata(label.clone()));
    }

    let mut txn = app.store().begin().await?;
    let result = merge_metadata(txn.as_mut(), &machine, label, &patch).await;
    let (merged, triggered_gate) = finish(txn, result).await?;

    if let Some(gate) = triggered_gate {
        match process_label(app, &machine, gate, label).await {
            Ok(step) if step.progressed() => {
                if let Err(err) = process_transitions(app, label).await {
                    warn!(label = %label, error = %err, "Failed to process transitions after metadata update");
                }
            }
            Ok(_) => {}
            Err(TransitionError::DeletedLabel(_)) => {
                debug!(label = %label, "Label deleted before its metadata triggers ran");
            }
            Err(err) => {
                warn!(
                    label = %label,
                    gate = gate.name(),
                    error = %err,
                    "Metadata trigger failed; leaving it to the retry job"
                );
            }
        }
    }

    Ok(merged)
}

/// Merge the patch and report the gate whose metadata triggers it fired.
async fn merge_metadata<'m>(
    txn: &mut dyn Transaction,
    machine: &'m StateMachine,
    label: &LabelRef,
    patch: &Value,
) -> Result<(Value, Option<&'m State>), TransitionError> {
    let (mut record, history) = lock_existing(txn, label).await?;
    let merged = merge(&record.metadata, patch);

    let triggered_gate = history
        .current_state()
        .and_then(|current| machine.state(current))
        .filter(|state| {
            state.as_gate().is_some_and(|gate| {
                gate.triggers
                    .iter()
                    .any(|trigger| trigger.fires_on_update(&record.metadata, patch, &merged))
            })
        });

    record.metadata = merged.clone();
    record.updated = Utc::now();
    if triggered_gate.is_some() {
        record.metadata_triggers_processed = false;
    }
    txn.save_label(record).await?;
    Ok((merged, triggered_gate))
}

pub async fn get_label_metadata(app: &App, label: &LabelRef) -> Result<Value, TransitionError> {
    app.state_machine(&label.state_machine)?;
    let record = live_record(app, label).await?;
    Ok(record.metadata)
}

pub async fn get_label_state(app: &App, label: &LabelRef) -> Result<String, TransitionError> {
    app.state_machine(&label.state_machine)?;
    live_record(app, label).await?;
    let history = LabelHistory::new(app.store().history(label).await?);
    history
        .current_state()
        .map(str::to_string)
        .ok_or_else(|| TransitionError::DeletedLabel(label.clone()))
}

/// History of a label. Deleted labels keep their history.
pub async fn get_label_history(
    app: &App,
    label: &LabelRef,
) -> Result<LabelHistory, TransitionError> {
    app.state_machine(&label.state_machine)?;
    if app.store().label(label).await?.is_none() {
        return Err(TransitionError::UnknownLabel(label.clone()));
    }
    Ok(LabelHistory::new(app.store().history(label).await?))
}

/// Names of the machine's live labels, sorted.
pub async fn list_labels(app: &App, state_machine: &str) -> Result<Vec<String>, TransitionError> {
    app.state_machine(state_machine)?;
    Ok(app.store().label_names(state_machine).await?)
}

/// Delete a label: its metadata is cleared and its history ends.
///
/// Deleting an already deleted label does nothing.
pub async fn delete_label(app: &App, label: &LabelRef) -> Result<(), TransitionError> {
    app.state_machine(&label.state_machine)?;

    let mut txn = app.store().begin().await?;
    let result = mark_deleted(txn.as_mut(), label).await;
    if finish(txn, result).await? {
        info!(label = %label, "Label deleted");
    }
    Ok(())
}

async fn mark_deleted(txn: &mut dyn Transaction, label: &LabelRef) -> Result<bool, TransitionError> {
    let mut record = txn
        .lock_label(label)
        .await?
        .ok_or_else(|| TransitionError::UnknownLabel(label.clone()))?;
    if record.deleted {
        return Ok(false);
    }

    let history = LabelHistory::new(txn.history(label).await?);
    let current = history.current_state().map(str::to_string);

    record.deleted = true;
    record.metadata = json!({});
    record.updated = Utc::now();
    txn.save_label(record).await?;
    txn.append_history(NewHistoryEntry::deletion(label, current.as_deref()))
        .await?;
    Ok(true)
}

/// Move a label to `state` regardless of exit conditions, then process it.
pub async fn force_transition(
    app: &App,
    label: &LabelRef,
    state: &str,
) -> Result<(), TransitionError> {
    let machine = app.state_machine(&label.state_machine)?;
    if machine.state(state).is_none() {
        return Err(TransitionError::UnknownState {
            state_machine: machine.name().to_string(),
            state: state.to_string(),
        });
    }

    let mut txn = app.store().begin().await?;
    let result = append_forced(txn.as_mut(), label, state).await;
    finish(txn, result).await?;
    info!(label = %label, to = state, "Label forced into state");

    process_transitions(app, label).await?;
    Ok(())
}

async fn append_forced(
    txn: &mut dyn Transaction,
    label: &LabelRef,
    state: &str,
) -> Result<(), TransitionError> {
    let (_, history) = lock_existing(txn, label).await?;
    txn.append_history(NewHistoryEntry::forced(label, history.current_state(), state))
        .await?;
    Ok(())
}

async fn live_record(app: &App, label: &LabelRef) -> Result<LabelRecord, TransitionError> {
    match app.store().label(label).await? {
        None => Err(TransitionError::UnknownLabel(label.clone())),
        Some(record) if record.deleted => Err(TransitionError::DeletedLabel(label.clone())),
        Some(record) => Ok(record),
    }
}
