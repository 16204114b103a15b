//! Single processing steps for gates and actions.
//!
//! Each step runs inside a caller-provided transaction and starts by taking
//! the label's row lock and re-reading it, so decisions are made on fresh
//! state.

use super::error::TransitionError;
use crate::app::App;
use crate::context::Context;
use crate::core::{Action, Gate, LabelHistory, LabelRecord, LabelRef, NewHistoryEntry, State, StateMachine};
use crate::store::Transaction;
use crate::webhooks::{build_payload, idempotency_token, WebhookResult};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info, warn};

const PAYLOAD_CONTENT_TYPE: &str = "application/json";

/// Outcome of a single processing step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// The label moved and a history entry was written.
    Transitioned { from: String, to: String },
    /// The label stays where it is for now.
    NoProgress,
}

impl StepResult {
    pub fn progressed(&self) -> bool {
        matches!(self, StepResult::Transitioned { .. })
    }
}

/// Commit on success, roll back on failure.
pub async fn finish<T>(
    txn: Box<dyn Transaction>,
    result: Result<T, TransitionError>,
) -> Result<T, TransitionError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = txn.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(error)
        }
    }
}

/// Lock a live label and read its record and history.
pub(crate) async fn lock_existing(
    txn: &mut dyn Transaction,
    label: &LabelRef,
) -> Result<(LabelRecord, LabelHistory), TransitionError> {
    let record = txn
        .lock_label(label)
        .await?
        .ok_or_else(|| TransitionError::UnknownLabel(label.clone()))?;
    if record.deleted {
        return Err(TransitionError::DeletedLabel(label.clone()));
    }
    let history = LabelHistory::new(txn.history(label).await?);
    Ok((record, history))
}

/// Evaluate a gate for a label sitting in it.
///
/// Marks the label's metadata triggers as processed whether or not the exit
/// condition holds. Labels not currently in the gate are left alone.
pub async fn process_gate(
    app: &App,
    machine: &StateMachine,
    gate: &Gate,
    txn: &mut dyn Transaction,
    label: &LabelRef,
) -> Result<StepResult, TransitionError> {
    let (mut record, history) = lock_existing(txn, label).await?;
    if history.current_state() != Some(gate.name.as_str()) {
        return Ok(StepResult::NoProgress);
    }

    if !record.metadata_triggers_processed {
        record.metadata_triggers_processed = true;
        txn.save_label(record.clone()).await?;
    }
    if gate.next_states.is_terminal() {
        return Ok(StepResult::NoProgress);
    }

    let mut accessed = gate.exit_condition.accessed_variables();
    accessed.extend(gate.next_states.accessed_variables());

    let now = Utc::now();
    let context = Context::build(
        app,
        machine,
        label,
        record.metadata,
        history.current_entry(),
        &accessed,
        now,
    )
    .await?;

    let passed = gate
        .exit_condition
        .run(&context, now)
        .map_err(|source| TransitionError::Evaluation {
            gate: gate.name.clone(),
            source,
        })?;
    if !passed {
        debug!(label = %label, gate = %gate.name, "Exit condition not met");
        return Ok(StepResult::NoProgress);
    }

    let destination = gate.next_states.next_state(&context)?.to_string();
    txn.append_history(NewHistoryEntry::transition(label, &gate.name, &destination))
        .await?;
    info!(label = %label, from = %gate.name, to = %destination, "Label left gate");

    Ok(StepResult::Transitioned {
        from: gate.name.clone(),
        to: destination,
    })
}

/// Deliver an action's webhook for a label sitting in it.
///
/// Only a successful delivery moves the label on. Failed and retryable
/// deliveries leave it in place for the retry cron job.
pub async fn process_action(
    app: &App,
    machine: &StateMachine,
    action: &Action,
    txn: &mut dyn Transaction,
    label: &LabelRef,
) -> Result<StepResult, TransitionError> {
    let (record, history) = lock_existing(txn, label).await?;
    let Some(entry) = history
        .current_entry()
        .filter(|entry| entry.new_state.as_deref() == Some(action.name.as_str()))
    else {
        return Ok(StepResult::NoProgress);
    };
    if action.next_states.is_terminal() {
        return Ok(StepResult::NoProgress);
    }

    let runner = app
        .webhook_runner(machine.name())
        .ok_or_else(|| TransitionError::NoWebhookRunner(machine.name().to_string()))?;
    let body = build_payload(label, &record.metadata)?;
    let token = idempotency_token(label, entry);

    app.hooks()
        .on_webhook_start(machine.name(), &action.name, &action.webhook);
    let started = Instant::now();
    let result = runner
        .run(&action.webhook, PAYLOAD_CONTENT_TYPE, &body, &token)
        .await;
    app.hooks().on_webhook_finish(
        machine.name(),
        &action.name,
        &action.webhook,
        result,
        started.elapsed(),
    );

    if result != WebhookResult::Success {
        debug!(label = %label, action = %action.name, ?result, "Webhook not accepted");
        return Ok(StepResult::NoProgress);
    }

    let context = Context::new(label.clone(), record.metadata, Utc::now()).with_current_entry(Some(entry));
    let destination = action.next_states.next_state(&context)?.to_string();
    txn.append_history(NewHistoryEntry::transition(label, &action.name, &destination))
        .await?;
    info!(label = %label, from = %action.name, to = %destination, "Label left action");

    Ok(StepResult::Transitioned {
        from: action.name.clone(),
        to: destination,
    })
}

/// Process `state` for a label expected to be in it.
pub async fn process_state(
    app: &App,
    machine: &StateMachine,
    state: &State,
    txn: &mut dyn Transaction,
    label: &LabelRef,
) -> Result<StepResult, TransitionError> {
    match state {
        State::Gate(gate) => process_gate(app, machine, gate, txn, label).await,
        State::Action(action) => process_action(app, machine, action, txn, label).await,
    }
}

/// Process whatever state the label is currently in.
pub(crate) async fn process_current_state(
    app: &App,
    machine: &StateMachine,
    txn: &mut dyn Transaction,
    label: &LabelRef,
) -> Result<StepResult, TransitionError> {
    let (_, history) = lock_existing(txn, label).await?;
    let current = history
        .current_state()
        .ok_or_else(|| TransitionError::DeletedLabel(label.clone()))?;
    let state = machine
        .state(current)
        .ok_or_else(|| TransitionError::UnknownState {
            state_machine: machine.name().to_string(),
            state: current.to_string(),
        })?;

    process_state(app, machine, state, txn, label).await
}
