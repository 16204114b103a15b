//! The jobs a configuration implies and how each one runs.

use super::schedule::{Rule, Schedule};
use crate::app::App;
use crate::config::Config;
use crate::core::State;
use crate::engine::{
    process_action_retries, process_gate_metadata_retries, process_gate_timezone_trigger,
    process_gate_trigger, CronSummary, TransitionError,
};
use crate::settings::Settings;
use crate::triggers::{where_is_this_the_time, CheckWindow, Trigger};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    /// Retry webhook delivery for labels waiting in an action.
    ActionRetry,
    /// Re-evaluate a gate when one of its time triggers fires.
    Trigger(Trigger),
    /// Re-evaluate a gate for labels whose metadata update is unprocessed.
    MetadataRetry,
}

/// One recurring piece of cron work, bound to a state.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub state_machine: String,
    pub state: String,
    pub kind: JobKind,
}

impl Job {
    pub fn new(state_machine: impl Into<String>, state: impl Into<String>, kind: JobKind) -> Self {
        Self {
            state_machine: state_machine.into(),
            state: state.into(),
            kind,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::ActionRetry => write!(f, "action retry"),
            JobKind::MetadataRetry => write!(f, "metadata retry"),
            JobKind::Trigger(Trigger::SystemTime { time }) => write!(f, "daily at {time} UTC"),
            JobKind::Trigger(Trigger::Timezone { time, timezone }) => {
                write!(f, "daily at {time} {}", timezone.name())
            }
            JobKind::Trigger(Trigger::MetadataTimezone { time, path }) => {
                write!(f, "daily at {time} in {path}")
            }
            JobKind::Trigger(Trigger::Interval { interval }) => write!(f, "every {interval:?}"),
            JobKind::Trigger(trigger) => write!(f, "{trigger:?}"),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.state_machine, self.state, self.kind)
    }
}

/// The rule a gate trigger is polled on. Event triggers have none.
fn trigger_rule(trigger: &Trigger, settings: &Settings) -> Option<Rule> {
    match trigger {
        Trigger::SystemTime { time } => Some(Rule::DailyAt(*time)),
        Trigger::Timezone { .. } | Trigger::MetadataTimezone { .. } => {
            Some(Rule::Every(settings.timezone_check()))
        }
        Trigger::Interval { interval } => Some(Rule::Every(*interval)),
        Trigger::Metadata { .. } | Trigger::OnEntry => None,
    }
}

/// Build the schedule for every machine in `config`.
///
/// Terminal states get no jobs since nothing can leave them.
pub fn configure_schedule(config: &Config, settings: &Settings, now: DateTime<Utc>) -> Schedule<Job> {
    let mut schedule = Schedule::new();

    for machine in config.state_machines() {
        for state in machine.states().iter().filter(|state| !state.is_terminal()) {
            match state {
                State::Action(action) => schedule.add(
                    Job::new(machine.name(), &action.name, JobKind::ActionRetry),
                    Rule::Every(settings.action_retry()),
                    now,
                ),
                State::Gate(gate) => {
                    for trigger in &gate.triggers {
                        if let Some(rule) = trigger_rule(trigger, settings) {
                            schedule.add(
                                Job::new(machine.name(), &gate.name, JobKind::Trigger(trigger.clone())),
                                rule,
                                now,
                            );
                        }
                    }
                    let metadata_triggered = gate
                        .triggers
                        .iter()
                        .any(|trigger| matches!(trigger, Trigger::Metadata { .. }));
                    if metadata_triggered {
                        schedule.add(
                            Job::new(machine.name(), &gate.name, JobKind::MetadataRetry),
                            Rule::Every(settings.metadata_retry()),
                            now,
                        );
                    }
                }
            }
        }
    }

    schedule
}

/// Run one job over `window`.
///
/// Time triggers only process their gate when they fired inside the
/// window. Timezone-per-label triggers process just the labels whose zone
/// reached the time.
pub async fn run_job<F>(
    app: &App,
    job: &Job,
    window: CheckWindow,
    should_terminate: F,
) -> Result<CronSummary, TransitionError>
where
    F: Fn() -> bool,
{
    let machine = app.state_machine(&job.state_machine)?;
    let state = machine
        .state(&job.state)
        .ok_or_else(|| TransitionError::UnknownState {
            state_machine: job.state_machine.clone(),
            state: job.state.clone(),
        })?;

    match &job.kind {
        JobKind::ActionRetry => process_action_retries(app, &machine, state, should_terminate).await,
        JobKind::MetadataRetry => {
            process_gate_metadata_retries(app, &machine, state, should_terminate).await
        }
        JobKind::Trigger(Trigger::MetadataTimezone { time, path }) => {
            let timezones = where_is_this_the_time(*time, &window);
            if timezones.is_empty() {
                return Ok(CronSummary::default());
            }
            process_gate_timezone_trigger(app, &machine, state, path, &timezones, should_terminate)
                .await
        }
        JobKind::Trigger(trigger) => {
            if !trigger.is_due(&window) {
                return Ok(CronSummary::default());
            }
            process_gate_trigger(app, &machine, state, should_terminate).await
        }
    }
}

/// How often a job recurs, for logging.
pub fn period(rule: &Rule) -> Duration {
    match rule {
        Rule::Every(period) => *period,
        Rule::DailyAt(_) => Duration::from_secs(24 * 60 * 60),
    }
}
