//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use labelflow::feeds::{FeedError, FeedFetcher};
use labelflow::store::MemoryStore;
use labelflow::webhooks::{WebhookResult, WebhookRunner};
use labelflow::{App, Config, Settings, StateMachine};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookCall {
    pub url: String,
    pub body: Value,
    pub idempotency_token: String,
}

/// Records deliveries and answers with a configurable result.
pub struct StubWebhookRunner {
    result: Mutex<WebhookResult>,
    delay: Mutex<Option<Duration>>,
    barrier: Mutex<Option<Arc<Barrier>>>,
    calls: Mutex<Vec<WebhookCall>>,
}

impl StubWebhookRunner {
    pub fn new(result: WebhookResult) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(result),
            delay: Mutex::new(None),
            barrier: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn respond_with(&self, result: WebhookResult) {
        *self.result.lock().unwrap() = result;
    }

    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Make every delivery wait at `barrier` before answering.
    pub fn rendezvous_at(&self, barrier: Arc<Barrier>) {
        *self.barrier.lock().unwrap() = Some(barrier);
    }

    pub fn calls(&self) -> Vec<WebhookCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookRunner for StubWebhookRunner {
    async fn run(
        &self,
        url: &str,
        _content_type: &str,
        body: &[u8],
        idempotency_token: &str,
    ) -> WebhookResult {
        self.calls.lock().unwrap().push(WebhookCall {
            url: url.to_string(),
            body: serde_json::from_slice(body).unwrap(),
            idempotency_token: idempotency_token.to_string(),
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let barrier = self.barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        *self.result.lock().unwrap()
    }
}

/// Serves canned feed documents by URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct StubFeedFetcher {
    documents: Mutex<HashMap<String, Value>>,
    fetches: Mutex<Vec<String>>,
}

impl StubFeedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, document: Value) {
        self.documents.lock().unwrap().insert(url.to_string(), document);
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedFetcher for StubFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FeedError> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FeedError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

pub struct Harness {
    pub app: App,
    pub webhooks: Arc<StubWebhookRunner>,
    pub feeds: Arc<StubFeedFetcher>,
}

pub fn harness(machines: Vec<StateMachine>) -> Harness {
    harness_with(machines, Settings::default())
}

pub fn harness_with(machines: Vec<StateMachine>, settings: Settings) -> Harness {
    let webhooks = StubWebhookRunner::new(WebhookResult::Success);
    let feeds = StubFeedFetcher::new();
    let app = App::new(Config::new(machines), settings, Arc::new(MemoryStore::new()))
        .with_webhook_runner(webhooks.clone())
        .with_feed_fetcher(feeds.clone());
    Harness {
        app,
        webhooks,
        feeds,
    }
}

/// Counts events at a level whose message contains some text.
#[derive(Clone)]
pub struct CountingLayer {
    level: Level,
    needle: &'static str,
    count: Arc<AtomicUsize>,
}

impl CountingLayer {
    pub fn new(level: Level, needle: &'static str) -> Self {
        Self {
            level,
            needle,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != self.level {
            return;
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        if visitor.0.contains(self.needle) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
