//! Observation hooks around I/O.
//!
//! The engine reports webhook deliveries, feed fetches and cron jobs through
//! [`Hooks`]. The default implementation logs with `tracing`.

use crate::feeds::FeedError;
use crate::webhooks::WebhookResult;
use std::time::Duration;

pub trait Hooks: Send + Sync {
    fn on_webhook_start(&self, _state_machine: &str, _state: &str, _url: &str) {}

    fn on_webhook_finish(
        &self,
        _state_machine: &str,
        _state: &str,
        _url: &str,
        _result: WebhookResult,
        _elapsed: Duration,
    ) {
    }

    fn on_feed_start(&self, _state_machine: &str, _feed: &str, _url: &str) {}

    fn on_feed_finish(
        &self,
        _state_machine: &str,
        _feed: &str,
        _url: &str,
        _error: Option<&FeedError>,
        _elapsed: Duration,
    ) {
    }

    fn on_cron_start(&self, _job: &str) {}

    fn on_cron_finish(&self, _job: &str, _elapsed: Duration) {}
}

/// Hooks that emit `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl Hooks for TracingHooks {
    fn on_webhook_start(&self, state_machine: &str, state: &str, url: &str) {
        tracing::debug!(state_machine, state, url, "Delivering webhook");
    }

    fn on_webhook_finish(
        &self,
        state_machine: &str,
        state: &str,
        url: &str,
        result: WebhookResult,
        elapsed: Duration,
    ) {
        tracing::info!(
            state_machine,
            state,
            url,
            ?result,
            elapsed_ms = elapsed.as_millis() as u64,
            "Webhook delivered"
        );
    }

    fn on_feed_start(&self, state_machine: &str, feed: &str, url: &str) {
        tracing::debug!(state_machine, feed, url, "Fetching feed");
    }

    fn on_feed_finish(
        &self,
        state_machine: &str,
        feed: &str,
        url: &str,
        error: Option<&FeedError>,
        elapsed: Duration,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match error {
            Some(error) => {
                tracing::warn!(state_machine, feed, url, %error, elapsed_ms, "Feed fetch failed")
            }
            None => tracing::debug!(state_machine, feed, url, elapsed_ms, "Feed fetched"),
        }
    }

    fn on_cron_start(&self, job: &str) {
        tracing::debug!(job, "Cron job starting");
    }

    fn on_cron_finish(&self, job: &str, elapsed: Duration) {
        tracing::debug!(job, elapsed_ms = elapsed.as_millis() as u64, "Cron job finished");
    }
}
