//! External data feeds that exit conditions can read.
//!
//! A state machine declares feeds by name with a URL template. An exit
//! condition that reads `feeds.<name>.<path>` causes the feed to be fetched
//! for the label before evaluation.

use crate::core::LabelRef;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

pub const LABEL_PLACEHOLDER: &str = "{label}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub name: String,
    /// URL template; `{label}` is replaced by the label name.
    pub url: String,
}

impl Feed {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn url_for(&self, label: &LabelRef) -> String {
        self.url.replace(LABEL_PLACEHOLDER, &label.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("Feed '{0}' is not declared by the state machine")]
    Undeclared(String),

    #[error("Feed request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Feed {url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("Feed {url} returned invalid JSON: {message}")]
    InvalidBody { url: String, message: String },
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, FeedError>;
}

/// Fetches feeds over HTTP with reqwest.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeedFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FeedError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| FeedError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| FeedError::InvalidBody {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

/// Names of the feeds read by a set of dotted variable paths.
pub fn referenced_feeds<'a, I>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    paths
        .into_iter()
        .filter_map(|path| {
            let mut segments = path.split('.');
            match (segments.next(), segments.next()) {
                (Some("feeds"), Some(name)) => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_substitutes_label_name() {
        let feed = Feed::new("billing", "https://billing.example.com/accounts/{label}");
        assert_eq!(
            feed.url_for(&LabelRef::new("alice", "flow")),
            "https://billing.example.com/accounts/alice"
        );
    }

    #[test]
    fn referenced_feeds_reads_namespace() {
        let paths: Vec<String> = ["feeds.billing.balance", "feeds.crm", "metadata.feeds.x", "feeds"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let feeds = referenced_feeds(&paths);
        assert_eq!(feeds.into_iter().collect::<Vec<_>>(), vec!["billing", "crm"]);
    }
}
