//! Cron orchestration.
//!
//! The configuration implies a set of recurring [`Job`]s: webhook retries
//! for actions, and re-evaluation of gates when their time triggers fire or
//! their metadata updates went unprocessed. [`CronRunner`] polls the
//! [`Schedule`] on a fixed tick and hands due jobs to the engine.

mod jobs;
mod runner;
mod schedule;

pub use jobs::{configure_schedule, run_job, Job, JobKind};
pub use runner::CronRunner;
pub use schedule::{DueJob, Rule, Schedule};
