//! Runtime settings, loadable from TOML.
//!
//! ```toml
//! cron_tick_secs = 1
//! webhook_timeout_secs = 10
//! max_transitions = 50
//! log_filter = "labelflow=debug"
//! ```
//!
//! Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// How often the cron runner checks for due jobs.
    #[serde(default = "default_cron_tick_secs")]
    pub cron_tick_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub webhook_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub feed_timeout_secs: u64,

    /// Transitions one label may make in a single processing run.
    #[serde(default = "default_max_transitions")]
    pub max_transitions: usize,

    #[serde(default = "default_retry_secs")]
    pub action_retry_secs: u64,

    #[serde(default = "default_retry_secs")]
    pub metadata_retry_secs: u64,

    /// How often timezone triggers look for labels whose local time has come.
    #[serde(default = "default_retry_secs")]
    pub timezone_check_secs: u64,

    /// Cron jobs allowed to run at once.
    #[serde(default = "default_cron_workers")]
    pub cron_workers: usize,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_cron_tick_secs() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_transitions() -> usize {
    50
}

fn default_retry_secs() -> u64 {
    60
}

fn default_cron_workers() -> usize {
    4
}

fn default_log_filter() -> String {
    "labelflow=info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cron_tick_secs: default_cron_tick_secs(),
            webhook_timeout_secs: default_timeout_secs(),
            feed_timeout_secs: default_timeout_secs(),
            max_transitions: default_max_transitions(),
            action_retry_secs: default_retry_secs(),
            metadata_retry_secs: default_retry_secs(),
            timezone_check_secs: default_retry_secs(),
            cron_workers: default_cron_workers(),
            log_filter: default_log_filter(),
        }
    }
}

fn positive(name: &'static str, value: u64) -> Validation<(), NonEmptyVec<String>> {
    if value > 0 {
        Validation::success(())
    } else {
        Validation::fail(format!("{name} must be greater than zero"))
    }
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Check every setting, reporting all problems at once.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let checks = vec![
            positive("cron_tick_secs", self.cron_tick_secs),
            positive("webhook_timeout_secs", self.webhook_timeout_secs),
            positive("feed_timeout_secs", self.feed_timeout_secs),
            positive("max_transitions", self.max_transitions as u64),
            positive("action_retry_secs", self.action_retry_secs),
            positive("metadata_retry_secs", self.metadata_retry_secs),
            positive("timezone_check_secs", self.timezone_check_secs),
            positive("cron_workers", self.cron_workers as u64),
        ];

        match Validation::all_vec(checks) {
            Validation::Success(_) => Ok(()),
            Validation::Failure(errors) => {
                Err(SettingsError::Invalid(errors.iter().cloned().collect()))
            }
        }
    }

    pub fn cron_tick(&self) -> Duration {
        Duration::from_secs(self.cron_tick_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn action_retry(&self) -> Duration {
        Duration::from_secs(self.action_retry_secs)
    }

    pub fn metadata_retry(&self) -> Duration {
        Duration::from_secs(self.metadata_retry_secs)
    }

    pub fn timezone_check(&self) -> Duration {
        Duration::from_secs(self.timezone_check_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
        assert_eq!(Settings::default().max_transitions, 50);
    }

    #[test]
    fn keys_override_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            max_transitions = 10
            log_filter = "labelflow=debug"
            "#,
        )
        .unwrap();

        assert_eq!(settings.max_transitions, 10);
        assert_eq!(settings.log_filter, "labelflow=debug");
        assert_eq!(settings.action_retry(), Duration::from_secs(60));
    }

    #[test]
    fn all_zero_values_are_reported() {
        let error = Settings::from_toml_str("cron_tick_secs = 0\ncron_workers = 0").unwrap_err();
        match error {
            SettingsError::Invalid(problems) => {
                assert_eq!(problems.len(), 2);
                assert!(problems[0].contains("cron_tick_secs"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            Settings::from_toml_str("max_transitions = \"many\""),
            Err(SettingsError::Parse(_))
        ));
    }
}
