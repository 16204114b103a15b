//! Webhook delivery for action states.
//!
//! Actions POST the label's metadata to their webhook and only move on once
//! the receiver accepts it. Deliveries carry an idempotency token that stays
//! the same for every retry of the same visit to the action.

use crate::core::{HistoryEntry, LabelRef};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Token";

/// Outcome of a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookResult {
    /// Delivered. The label may move on.
    Success,
    /// Not delivered this time. Try again later.
    Retry,
    /// The receiver is gone for good.
    Fail,
}

/// Map an HTTP status to a delivery outcome.
///
/// `410 Gone` fails permanently, any 2xx succeeds, and everything else is
/// retried.
pub fn classify_status(status: u16) -> WebhookResult {
    match status {
        410 => WebhookResult::Fail,
        200..=299 => WebhookResult::Success,
        _ => WebhookResult::Retry,
    }
}

#[async_trait]
pub trait WebhookRunner: Send + Sync {
    async fn run(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
        idempotency_token: &str,
    ) -> WebhookResult;
}

/// Extra headers sent to webhooks whose URL matches a pattern.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub match_url: Regex,
    pub headers: BTreeMap<String, String>,
}

impl WebhookConfig {
    pub fn new(pattern: &str, headers: BTreeMap<String, String>) -> Result<Self, regex::Error> {
        Ok(Self {
            match_url: Regex::new(pattern)?,
            headers,
        })
    }
}

/// Headers from every config matching `url`. Later configs win.
pub fn headers_for_url(configs: &[WebhookConfig], url: &str) -> BTreeMap<String, String> {
    configs
        .iter()
        .filter(|config| config.match_url.is_match(url))
        .flat_map(|config| config.headers.clone())
        .collect()
}

/// Every header sent with a webhook request.
///
/// Configured headers replace the defaults of the same name. Names or
/// values that are not valid HTTP are skipped with a warning.
pub fn request_headers(
    configs: &[WebhookConfig],
    url: &str,
    content_type: &str,
    idempotency_token: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let defaults = [
        (CONTENT_TYPE.as_str(), content_type),
        (IDEMPOTENCY_HEADER, idempotency_token),
    ];
    let configured = headers_for_url(configs, url);
    let all = defaults
        .into_iter()
        .chain(configured.iter().map(|(name, value)| (name.as_str(), value.as_str())));

    for (name, value) in all {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(url, header = name, "Skipping invalid webhook header"),
        }
    }
    headers
}

/// JSON body sent to an action's webhook.
pub fn build_payload(label: &LabelRef, metadata: &Value) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&json!({
        "label": label.name,
        "metadata": metadata,
    }))
}

/// Deterministic token identifying one visit of a label to an action.
///
/// `entry` is the history entry that moved the label into the action.
pub fn idempotency_token(label: &LabelRef, entry: &HistoryEntry) -> String {
    let key = format!("{}:{}:{}", label.state_machine, label.name, entry.id);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// Delivers webhooks over HTTP with reqwest.
pub struct HttpWebhookRunner {
    client: reqwest::Client,
    timeout: Duration,
    configs: Vec<WebhookConfig>,
}

impl HttpWebhookRunner {
    pub fn new(client: reqwest::Client, timeout: Duration, configs: Vec<WebhookConfig>) -> Self {
        Self {
            client,
            timeout,
            configs,
        }
    }
}

#[async_trait]
impl WebhookRunner for HttpWebhookRunner {
    async fn run(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
        idempotency_token: &str,
    ) -> WebhookResult {
        let request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .headers(request_headers(&self.configs, url, content_type, idempotency_token))
            .body(body.to_vec());

        match request.send().await {
            Ok(response) => classify_status(response.status().as_u16()),
            Err(err) => {
                tracing::warn!(url, error = %err, "Webhook request failed");
                WebhookResult::Retry
            }
        }
    }
}
