//! Application wiring: configuration, store, and I/O collaborators.

use crate::config::Config;
use crate::core::StateMachine;
use crate::engine::TransitionError;
use crate::feeds::{FeedFetcher, HttpFeedFetcher};
use crate::hooks::{Hooks, TracingHooks};
use crate::settings::Settings;
use crate::store::Store;
use crate::webhooks::{HttpWebhookRunner, WebhookRunner};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything the engine needs to process labels.
///
/// Cloning is cheap; clones share the same store and collaborators.
#[derive(Clone)]
pub struct App {
    config: Arc<Config>,
    settings: Arc<Settings>,
    store: Arc<dyn Store>,
    webhook_runners: Arc<HashMap<String, Arc<dyn WebhookRunner>>>,
    webhook_override: Option<Arc<dyn WebhookRunner>>,
    feed_fetcher: Arc<dyn FeedFetcher>,
    hooks: Arc<dyn Hooks>,
}

impl App {
    /// Wire up HTTP webhooks and feeds, with tracing hooks.
    pub fn new(config: Config, settings: Settings, store: Arc<dyn Store>) -> Self {
        let client = reqwest::Client::new();
        let webhook_runners = config
            .state_machines()
            .map(|machine| {
                let runner: Arc<dyn WebhookRunner> = Arc::new(HttpWebhookRunner::new(
                    client.clone(),
                    settings.webhook_timeout(),
                    machine.webhooks().to_vec(),
                ));
                (machine.name().to_string(), runner)
            })
            .collect();
        let feed_fetcher = Arc::new(HttpFeedFetcher::new(client, settings.feed_timeout()));

        Self {
            config: Arc::new(config),
            settings: Arc::new(settings),
            store,
            webhook_runners: Arc::new(webhook_runners),
            webhook_override: None,
            feed_fetcher,
            hooks: Arc::new(TracingHooks),
        }
    }

    /// Deliver every machine's webhooks through `runner`.
    pub fn with_webhook_runner(mut self, runner: Arc<dyn WebhookRunner>) -> Self {
        self.webhook_override = Some(runner);
        self
    }

    pub fn with_feed_fetcher(mut self, fetcher: Arc<dyn FeedFetcher>) -> Self {
        self.feed_fetcher = fetcher;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn feed_fetcher(&self) -> &dyn FeedFetcher {
        self.feed_fetcher.as_ref()
    }

    pub fn hooks(&self) -> &dyn Hooks {
        self.hooks.as_ref()
    }

    pub fn state_machine(&self, name: &str) -> Result<Arc<StateMachine>, TransitionError> {
        self.config
            .state_machine(name)
            .cloned()
            .ok_or_else(|| TransitionError::UnknownStateMachine(name.to_string()))
    }

    pub fn webhook_runner(&self, state_machine: &str) -> Option<Arc<dyn WebhookRunner>> {
        self.webhook_override
            .clone()
            .or_else(|| self.webhook_runners.get(state_machine).cloned())
    }
}
