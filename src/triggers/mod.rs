//! Triggers decide when a gate's exit condition is re-evaluated.
//!
//! Gates are always evaluated when a label enters them. Time-based triggers
//! are checked by the cron orchestrator over a window of time; metadata
//! triggers fire when a metadata update touches their path.

mod time;

pub use time::{is_time_in_window, where_is_this_the_time};

use crate::core::metadata::{metadata_relative, path_exists, split_path};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::time::Duration;

/// The span of time a scheduled check covers: `(since, now]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckWindow {
    pub since: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl CheckWindow {
    pub fn new(since: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self { since, now }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Daily at a wall-clock time in UTC.
    SystemTime { time: NaiveTime },
    /// Daily at a wall-clock time in a named timezone.
    Timezone { time: NaiveTime, timezone: Tz },
    /// Daily at a wall-clock time in each label's own timezone, read from
    /// the metadata path.
    MetadataTimezone { time: NaiveTime, path: String },
    /// Every time the interval elapses.
    Interval { interval: Duration },
    /// Whenever a metadata update touches the path.
    Metadata { path: String },
    /// On entry to the gate. Entry evaluation always happens, so this only
    /// documents intent.
    OnEntry,
}

impl Trigger {
    /// Whether a time-based trigger fired within `window`.
    ///
    /// Event-driven triggers never fire on time.
    pub fn is_due(&self, window: &CheckWindow) -> bool {
        match self {
            Trigger::SystemTime { time } => is_time_in_window(*time, &Utc, window),
            Trigger::Timezone { time, timezone } => is_time_in_window(*time, timezone, window),
            Trigger::MetadataTimezone { time, .. } => {
                !where_is_this_the_time(*time, window).is_empty()
            }
            Trigger::Interval { interval } => (window.now - window.since)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= *interval),
            Trigger::Metadata { .. } | Trigger::OnEntry => false,
        }
    }

    /// Whether a metadata update fires this trigger.
    ///
    /// Fires when the patch contains the path, or when the path existed
    /// before the update but not after, or the other way round.
    pub fn fires_on_update(&self, old: &Value, patch: &Value, new: &Value) -> bool {
        let Trigger::Metadata { path } = self else {
            return false;
        };
        let path = split_path(metadata_relative(path));
        path_exists(patch, &path) || path_exists(old, &path) != path_exists(new, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn window(seconds: i64) -> CheckWindow {
        let now = Utc::now();
        CheckWindow::new(now - chrono::Duration::seconds(seconds), now)
    }

    #[test]
    fn interval_is_due_once_elapsed() {
        let trigger = Trigger::Interval {
            interval: Duration::from_secs(60),
        };
        assert!(trigger.is_due(&window(60)));
        assert!(trigger.is_due(&window(90)));
        assert!(!trigger.is_due(&window(30)));
    }

    #[test]
    fn event_triggers_are_never_due() {
        assert!(!Trigger::OnEntry.is_due(&window(86_400)));
        assert!(!Trigger::Metadata { path: "a".into() }.is_due(&window(86_400)));
    }

    #[test]
    fn metadata_trigger_fires_on_patched_path() {
        let trigger = Trigger::Metadata {
            path: "metadata.profile.email".into(),
        };
        let old = json!({"profile": {"email": "a@example.com"}});
        let patch = json!({"profile": {"email": "b@example.com"}});
        let new = crate::core::metadata::merge(&old, &patch);

        assert!(trigger.fires_on_update(&old, &patch, &new));
    }

    #[test]
    fn metadata_trigger_ignores_other_paths() {
        let trigger = Trigger::Metadata {
            path: "profile.email".into(),
        };
        let old = json!({"profile": {"email": "a@example.com"}});
        let patch = json!({"profile": {"name": "A"}});
        let new = crate::core::metadata::merge(&old, &patch);

        assert!(!trigger.fires_on_update(&old, &patch, &new));
    }

    #[test]
    fn metadata_trigger_fires_when_presence_changes() {
        let trigger = Trigger::Metadata {
            path: "profile.email".into(),
        };
        let old = json!({"profile": {"email": "a@example.com"}});
        let patch = json!({"profile": "gone"});
        let new = crate::core::metadata::merge(&old, &patch);

        assert!(trigger.fires_on_update(&old, &patch, &new));
    }

    #[test]
    fn empty_parent_in_patch_does_not_fire() {
        let trigger = Trigger::Metadata {
            path: "profile.email".into(),
        };
        let old = json!({"profile": {"email": "a@example.com"}});
        let patch = json!({"profile": {}});
        let new = crate::core::metadata::merge(&old, &patch);

        assert!(!trigger.fires_on_update(&old, &patch, &new));
    }

    #[test]
    fn losing_the_key_fires_without_it_in_the_patch() {
        let trigger = Trigger::Metadata {
            path: "profile.email".into(),
        };
        let old = json!({"profile": {"email": "a@example.com"}});
        let patch = json!({"profile": {}});
        let new = json!({"profile": {}});

        assert!(trigger.fires_on_update(&old, &patch, &new));
    }

    #[test]
    fn null_leaf_in_patch_fires() {
        let trigger = Trigger::Metadata {
            path: "profile.email".into(),
        };
        let old = json!({"profile": {"email": "a@example.com"}});
        let patch = json!({"profile": {"email": null}});
        let new = crate::core::metadata::merge(&old, &patch);

        assert!(trigger.fires_on_update(&old, &patch, &new));
    }

    #[test]
    fn gaining_the_key_under_an_empty_parent_fires() {
        let trigger = Trigger::Metadata {
            path: "profile.email".into(),
        };
        let old = json!({"profile": {}});
        let patch = json!({"profile": {"email": "a@example.com"}});
        let new = crate::core::metadata::merge(&old, &patch);

        assert!(trigger.fires_on_update(&old, &patch, &new));
        // Presence changing alone is enough.
        assert!(trigger.fires_on_update(&old, &json!({}), &new));
    }

    #[test]
    fn only_metadata_triggers_fire_on_update() {
        let value = json!({"a": 1});
        assert!(!Trigger::OnEntry.fires_on_update(&value, &value, &value));
    }
}
