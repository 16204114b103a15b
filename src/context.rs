//! Evaluation context for exit conditions and next-state rules.
//!
//! Variables are namespaced:
//!
//! - `metadata.<path>` reads the label's metadata
//! - `feeds.<name>.<path>` reads a fetched feed
//! - `history.entered_state` is when the label entered its current state
//! - `history.previous_state` is the state it came from
//!
//! Paths without a known namespace read the metadata.

use crate::app::App;
use crate::core::metadata::get_path;
use crate::core::{HistoryEntry, LabelRef, StateMachine};
use crate::exit_conditions::Variables;
use crate::feeds::{referenced_feeds, FeedError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Context {
    label: LabelRef,
    metadata: Value,
    feeds: HashMap<String, Value>,
    entered_state: Option<DateTime<Utc>>,
    previous_state: Option<String>,
    now: DateTime<Utc>,
}

impl Context {
    /// A context over metadata alone.
    pub fn new(label: LabelRef, metadata: Value, now: DateTime<Utc>) -> Self {
        Self {
            label,
            metadata,
            feeds: HashMap::new(),
            entered_state: None,
            previous_state: None,
            now,
        }
    }

    /// Record the entry that moved the label into its current state.
    pub fn with_current_entry(mut self, entry: Option<&HistoryEntry>) -> Self {
        if let Some(entry) = entry {
            self.entered_state = Some(entry.created);
            self.previous_state = entry.old_state.clone();
        }
        self
    }

    pub fn with_feed(mut self, name: impl Into<String>, data: Value) -> Self {
        self.feeds.insert(name.into(), data);
        self
    }

    /// Build a context, fetching every feed that `accessed` reads.
    ///
    /// Feeds are fetched once per evaluation.
    pub async fn build(
        app: &App,
        machine: &StateMachine,
        label: &LabelRef,
        metadata: Value,
        current_entry: Option<&HistoryEntry>,
        accessed: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, FeedError> {
        let mut context = Self::new(label.clone(), metadata, now).with_current_entry(current_entry);

        for name in referenced_feeds(accessed) {
            let feed = machine
                .feed(&name)
                .ok_or_else(|| FeedError::Undeclared(name.clone()))?;
            let url = feed.url_for(label);

            app.hooks().on_feed_start(machine.name(), &name, &url);
            let started = Instant::now();
            let result = app.feed_fetcher().fetch(&url).await;
            app.hooks().on_feed_finish(
                machine.name(),
                &name,
                &url,
                result.as_ref().err(),
                started.elapsed(),
            );

            context.feeds.insert(name, result?);
        }

        Ok(context)
    }

    pub fn label(&self) -> &LabelRef {
        &self.label
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

impl Variables for Context {
    fn lookup(&self, path: &[String]) -> Value {
        let found = match path.split_first() {
            Some((namespace, rest)) if namespace == "metadata" => get_path(&self.metadata, rest).cloned(),
            Some((namespace, rest)) if namespace == "feeds" => rest
                .split_first()
                .and_then(|(feed, rest)| get_path(self.feeds.get(feed)?, rest))
                .cloned(),
            Some((namespace, rest)) if namespace == "history" => match rest {
                [field] if field == "entered_state" => self
                    .entered_state
                    .map(|at| Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))),
                [field] if field == "previous_state" => {
                    self.previous_state.clone().map(Value::String)
                }
                _ => None,
            },
            _ => get_path(&self.metadata, path).cloned(),
        };
        found.unwrap_or(Value::Null)
    }
}
