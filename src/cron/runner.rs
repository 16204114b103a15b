//! The cron loop.

use super::jobs::{configure_schedule, period, run_job, Job};
use super::schedule::{DueJob, Schedule};
use crate::app::App;
use crate::engine::{CronSummary, TransitionError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Polls a [`Schedule`] and runs due jobs on a bounded pool of workers.
pub struct CronRunner {
    app: App,
    schedule: Schedule<Job>,
}

impl CronRunner {
    /// A runner for every job the app's configuration implies.
    pub fn new(app: App) -> Self {
        let schedule = configure_schedule(app.config(), app.settings(), Utc::now());
        Self::with_schedule(app, schedule)
    }

    pub fn with_schedule(app: App, schedule: Schedule<Job>) -> Self {
        Self { app, schedule }
    }

    pub fn schedule(&self) -> &Schedule<Job> {
        &self.schedule
    }

    /// Run every job due at `now`, one after another.
    pub async fn run_due(&mut self, now: DateTime<Utc>) -> Vec<(Job, Result<CronSummary, TransitionError>)> {
        let mut results = Vec::new();
        for DueJob { job, window } in self.schedule.due(now) {
            let result = run_job(&self.app, &job, window, || false).await;
            results.push((job, result));
        }
        results
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    ///
    /// Running batches see the shutdown between labels and stop early. The
    /// loop returns once they have all finished.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let settings = self.app.settings();
        let workers = Arc::new(Semaphore::new(settings.cron_workers));
        let mut interval = tokio::time::interval(settings.cron_tick());
        let mut running = JoinSet::new();

        for (job, rule) in self.schedule.jobs() {
            debug!(job = %job, period_secs = period(rule).as_secs(), "Job scheduled");
        }
        info!(jobs = self.schedule.len(), workers = settings.cron_workers, "Cron runner started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                    continue;
                }
            }

            while let Some(joined) = running.try_join_next() {
                if let Err(err) = joined {
                    error!(error = %err, "Cron worker panicked");
                }
            }

            for due in self.schedule.due(Utc::now()) {
                let Ok(permit) = workers.clone().acquire_owned().await else {
                    break;
                };
                let app = self.app.clone();
                let shutdown = shutdown.clone();
                running.spawn(async move {
                    run_worker(&app, due, &shutdown).await;
                    drop(permit);
                });
            }
        }

        info!(running = running.len(), "Cron runner stopping");
        while let Some(joined) = running.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Cron worker panicked");
            }
        }
    }
}

async fn run_worker(app: &App, due: DueJob<Job>, shutdown: &watch::Receiver<bool>) {
    let name = due.job.to_string();
    app.hooks().on_cron_start(&name);
    let started = Instant::now();

    match run_job(app, &due.job, due.window, || *shutdown.borrow()).await {
        Ok(summary) if summary.processed > 0 => info!(
            job = %name,
            processed = summary.processed,
            progressed = summary.progressed,
            failed = summary.failed,
            interrupted = summary.interrupted,
            "Cron batch finished"
        ),
        Ok(_) => {}
        Err(err) => error!(job = %name, error = %err, "Cron job failed"),
    }

    app.hooks().on_cron_finish(&name, started.elapsed());
}
