//! A polled schedule of recurring jobs.
//!
//! Each entry remembers when it last ran, so a delayed poll hands the job
//! the whole window it missed instead of skipping it.

use crate::triggers::CheckWindow;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use std::time::Duration;

/// When a job recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Every(Duration),
    /// Daily at a UTC wall-clock time.
    DailyAt(NaiveTime),
}

impl Rule {
    /// The first time strictly after `after` that the rule fires.
    ///
    /// `None` when that time cannot be represented.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Rule::Every(period) => {
                let period = chrono::Duration::from_std(*period).ok()?;
                after.checked_add_signed(period)
            }
            Rule::DailyAt(time) => {
                let today = Utc.from_utc_datetime(&after.date_naive().and_time(*time));
                if today > after {
                    Some(today)
                } else {
                    today.checked_add_signed(chrono::Duration::days(1))
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<J> {
    job: J,
    rule: Rule,
    last_run: DateTime<Utc>,
    next_due: Option<DateTime<Utc>>,
}

/// A job that is due, with the window of time its run covers.
#[derive(Debug, Clone, PartialEq)]
pub struct DueJob<J> {
    pub job: J,
    pub window: CheckWindow,
}

#[derive(Debug, Clone)]
pub struct Schedule<J> {
    entries: Vec<Entry<J>>,
}

impl<J> Default for Schedule<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> Schedule<J> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a job whose first window starts at `now`.
    pub fn add(&mut self, job: J, rule: Rule, now: DateTime<Utc>) {
        self.entries.push(Entry {
            job,
            rule,
            last_run: now,
            next_due: rule.next_after(now),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn jobs(&self) -> impl Iterator<Item = (&J, &Rule)> {
        self.entries.iter().map(|entry| (&entry.job, &entry.rule))
    }

    /// The earliest time any job is due.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().filter_map(|entry| entry.next_due).min()
    }
}

impl<J: Clone> Schedule<J> {
    /// Take every job due at `now` and reschedule it.
    ///
    /// Each returned window runs from the job's previous run to `now`.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<DueJob<J>> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if !entry.next_due.is_some_and(|next| next <= now) {
                continue;
            }
            due.push(DueJob {
                job: entry.job.clone(),
                window: CheckWindow::new(entry.last_run, now),
            });
            entry.last_run = now;
            entry.next_due = entry.rule.next_after(now);
        }
        due
    }
}
