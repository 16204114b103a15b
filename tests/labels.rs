//! End-to-end label scenarios against the in-memory store.

mod common;

use common::{harness, harness_with, CountingLayer};
use labelflow::builder::{action, gate, StateMachineBuilder};
use labelflow::labels::{
    create_label, delete_label, force_transition, get_label_history, get_label_metadata,
    get_label_state, list_labels, update_metadata_for_label,
};
use labelflow::webhooks::WebhookResult;
use labelflow::{LabelRef, Settings, StateMachine, TransitionError};
use serde_json::json;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn start_end() -> StateMachine {
    StateMachineBuilder::new("flow")
        .gate(
            gate("start", "metadata.done")
                .on_metadata("metadata.done")
                .next_state("end"),
        )
        .gate(gate("end", "false"))
        .build()
        .unwrap()
}

fn with_action() -> StateMachine {
    StateMachineBuilder::new("flow")
        .gate(gate("start", "metadata.ready").next_state("notify"))
        .action(action("notify", "https://example.com/hook").next_state("end"))
        .gate(gate("end", "false"))
        .build()
        .unwrap()
}

fn alice() -> LabelRef {
    LabelRef::new("alice", "flow")
}

fn moves(history: &labelflow::LabelHistory) -> Vec<(Option<&str>, Option<&str>)> {
    history
        .entries()
        .iter()
        .map(|entry| (entry.old_state.as_deref(), entry.new_state.as_deref()))
        .collect()
}

#[tokio::test]
async fn open_gate_moves_label_on_creation() {
    let h = harness(vec![start_end()]);

    create_label(&h.app, &alice(), json!({"done": true})).await.unwrap();

    let history = get_label_history(&h.app, &alice()).await.unwrap();
    assert_eq!(
        moves(&history),
        vec![(None, Some("start")), (Some("start"), Some("end"))]
    );
    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "end");
}

#[tokio::test]
async fn closed_gate_holds_label() {
    let h = harness(vec![start_end()]);

    let metadata = create_label(&h.app, &alice(), json!({})).await.unwrap();

    assert_eq!(metadata, json!({}));
    let history = get_label_history(&h.app, &alice()).await.unwrap();
    assert_eq!(moves(&history), vec![(None, Some("start"))]);
}

#[tokio::test]
async fn creating_twice_fails() {
    let h = harness(vec![start_end()]);
    create_label(&h.app, &alice(), json!({})).await.unwrap();

    let err = create_label(&h.app, &alice(), json!({})).await.unwrap_err();
    assert!(matches!(err, TransitionError::LabelAlreadyExists(_)));
}

#[tokio::test]
async fn non_object_metadata_is_rejected() {
    let h = harness(vec![start_end()]);

    let err = create_label(&h.app, &alice(), json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, TransitionError::InvalidMetadata(_)));
    assert!(matches!(
        get_label_state(&h.app, &alice()).await,
        Err(TransitionError::UnknownLabel(_))
    ));
}

#[tokio::test]
async fn unknown_state_machine_is_reported() {
    let h = harness(vec![start_end()]);

    let err = create_label(&h.app, &LabelRef::new("alice", "other"), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::UnknownStateMachine(name) if name == "other"));
}

#[tokio::test]
async fn metadata_trigger_moves_label() {
    let h = harness(vec![start_end()]);
    create_label(&h.app, &alice(), json!({"name": "Alice"})).await.unwrap();

    let merged = update_metadata_for_label(&h.app, &alice(), json!({"done": true}))
        .await
        .unwrap();

    assert_eq!(merged, json!({"name": "Alice", "done": true}));
    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "end");
    assert_eq!(
        get_label_metadata(&h.app, &alice()).await.unwrap(),
        json!({"name": "Alice", "done": true})
    );
}

#[tokio::test]
async fn untriggered_update_only_merges() {
    let h = harness(vec![with_action()]);
    create_label(&h.app, &alice(), json!({})).await.unwrap();

    update_metadata_for_label(&h.app, &alice(), json!({"ready": true}))
        .await
        .unwrap();

    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "start");
    assert!(h.webhooks.calls().is_empty());
}

#[tokio::test]
async fn successful_webhook_moves_label_through_action() {
    let h = harness(vec![with_action()]);

    create_label(&h.app, &alice(), json!({"ready": true})).await.unwrap();

    let calls = h.webhooks.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, "https://example.com/hook");
    assert_eq!(
        calls[0].body,
        json!({"label": "alice", "metadata": {"ready": true}})
    );
    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "end");
}

#[tokio::test]
async fn failed_and_retried_webhooks_leave_label_in_action() {
    for result in [WebhookResult::Fail, WebhookResult::Retry] {
        let h = harness(vec![with_action()]);
        h.webhooks.respond_with(result);

        create_label(&h.app, &alice(), json!({"ready": true})).await.unwrap();

        assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "notify");
        let history = get_label_history(&h.app, &alice()).await.unwrap();
        assert_eq!(history.entries().len(), 2);
    }
}

#[tokio::test]
async fn retries_reuse_the_idempotency_token() {
    let h = harness(vec![with_action()]);
    h.webhooks.respond_with(WebhookResult::Retry);
    create_label(&h.app, &alice(), json!({"ready": true})).await.unwrap();

    h.webhooks.respond_with(WebhookResult::Success);
    labelflow::engine::process_transitions(&h.app, &alice())
        .await
        .unwrap();

    let calls = h.webhooks.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].idempotency_token, calls[1].idempotency_token);
    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "end");
}

#[tokio::test]
async fn cycles_stop_at_the_transition_limit_with_one_warning() {
    let machine = StateMachineBuilder::new("flow")
        .gate(gate("ping", "true").next_state("pong"))
        .gate(gate("pong", "true").next_state("ping"))
        .build()
        .unwrap();
    let h = harness(vec![machine]);

    let warnings = CountingLayer::new(Level::WARN, "transition limit");
    let subscriber = tracing_subscriber::registry().with(warnings.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    create_label(&h.app, &alice(), json!({})).await.unwrap();

    let history = get_label_history(&h.app, &alice()).await.unwrap();
    assert_eq!(history.entries().len(), 51);
    assert_eq!(warnings.count(), 1);
}

#[tokio::test]
async fn transition_limit_follows_settings() {
    let machine = StateMachineBuilder::new("flow")
        .gate(gate("ping", "true").next_state("pong"))
        .gate(gate("pong", "true").next_state("ping"))
        .build()
        .unwrap();
    let settings = Settings {
        max_transitions: 3,
        ..Settings::default()
    };
    let h = harness_with(vec![machine], settings);

    create_label(&h.app, &alice(), json!({})).await.unwrap();
    let summary = labelflow::engine::process_transitions(&h.app, &alice())
        .await
        .unwrap();

    assert!(summary.capped);
    assert_eq!(summary.steps, 3);
    let history = get_label_history(&h.app, &alice()).await.unwrap();
    assert_eq!(history.entries().len(), 7);
}

#[tokio::test]
async fn stopping_just_short_of_the_limit_is_not_a_cycle() {
    let machine = StateMachineBuilder::new("flow")
        .gate(gate("start", "metadata.go").next_state("middle"))
        .gate(gate("middle", "true").next_state("end"))
        .gate(gate("end", "false"))
        .build()
        .unwrap();
    let settings = Settings {
        max_transitions: 3,
        ..Settings::default()
    };
    let h = harness_with(vec![machine], settings);

    let warnings = CountingLayer::new(Level::WARN, "transition limit");
    let subscriber = tracing_subscriber::registry().with(warnings.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    create_label(&h.app, &alice(), json!({})).await.unwrap();
    update_metadata_for_label(&h.app, &alice(), json!({"go": true}))
        .await
        .unwrap();
    let summary = labelflow::engine::process_transitions(&h.app, &alice())
        .await
        .unwrap();

    assert_eq!(summary.steps, 2);
    assert!(!summary.capped);
    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "end");
    assert_eq!(warnings.count(), 0);
}

#[tokio::test]
async fn deleted_labels_keep_history_but_nothing_else() {
    let h = harness(vec![start_end()]);
    create_label(&h.app, &alice(), json!({"secret": 1})).await.unwrap();

    delete_label(&h.app, &alice()).await.unwrap();
    delete_label(&h.app, &alice()).await.unwrap();

    assert!(matches!(
        get_label_state(&h.app, &alice()).await,
        Err(TransitionError::DeletedLabel(_))
    ));
    assert!(matches!(
        get_label_metadata(&h.app, &alice()).await,
        Err(TransitionError::DeletedLabel(_))
    ));
    assert!(matches!(
        update_metadata_for_label(&h.app, &alice(), json!({"done": true})).await,
        Err(TransitionError::DeletedLabel(_))
    ));
    assert!(list_labels(&h.app, "flow").await.unwrap().is_empty());

    let history = get_label_history(&h.app, &alice()).await.unwrap();
    assert_eq!(
        moves(&history),
        vec![(None, Some("start")), (Some("start"), None)]
    );

    let err = create_label(&h.app, &alice(), json!({})).await.unwrap_err();
    assert!(matches!(err, TransitionError::LabelAlreadyExists(_)));
}

#[tokio::test]
async fn deleting_an_unknown_label_fails() {
    let h = harness(vec![start_end()]);
    assert!(matches!(
        delete_label(&h.app, &alice()).await,
        Err(TransitionError::UnknownLabel(_))
    ));
}

#[tokio::test]
async fn labels_are_listed_by_name() {
    let h = harness(vec![start_end()]);
    for name in ["carol", "alice", "bob"] {
        create_label(&h.app, &LabelRef::new(name, "flow"), json!({}))
            .await
            .unwrap();
    }

    assert_eq!(
        list_labels(&h.app, "flow").await.unwrap(),
        vec!["alice", "bob", "carol"]
    );
}

#[tokio::test]
async fn forced_transitions_are_marked_and_processed() {
    let h = harness(vec![start_end()]);
    create_label(&h.app, &alice(), json!({"done": true})).await.unwrap();

    force_transition(&h.app, &alice(), "start").await.unwrap();

    let history = get_label_history(&h.app, &alice()).await.unwrap();
    let forced: Vec<bool> = history.entries().iter().map(|entry| entry.forced).collect();
    assert_eq!(forced, vec![false, false, true, false]);
    assert_eq!(history.get_path(), vec!["start", "end", "start", "end"]);
}

#[tokio::test]
async fn forcing_into_an_unknown_state_fails() {
    let h = harness(vec![start_end()]);
    create_label(&h.app, &alice(), json!({})).await.unwrap();

    let err = force_transition(&h.app, &alice(), "limbo").await.unwrap_err();
    assert!(matches!(err, TransitionError::UnknownState { state, .. } if state == "limbo"));
}

#[tokio::test]
async fn gates_read_declared_feeds() {
    let machine = StateMachineBuilder::new("flow")
        .gate(gate("start", "feeds.crm.score > 10").next_state("end"))
        .gate(gate("end", "false"))
        .feed("crm", "https://crm.example.com/{label}")
        .build()
        .unwrap();
    let h = harness(vec![machine]);
    h.feeds.serve("https://crm.example.com/alice", json!({"score": 42}));

    create_label(&h.app, &alice(), json!({})).await.unwrap();

    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "end");
    assert_eq!(h.feeds.fetches(), vec!["https://crm.example.com/alice"]);
}

#[tokio::test]
async fn gates_read_history() {
    let machine = StateMachineBuilder::new("flow")
        .gate(gate("start", "true").next_state("middle"))
        .gate(gate("middle", "history.previous_state = \"start\"").next_state("end"))
        .gate(gate("end", "false"))
        .build()
        .unwrap();
    let h = harness(vec![machine]);

    create_label(&h.app, &alice(), json!({})).await.unwrap();

    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "end");
}

#[tokio::test]
async fn routing_picks_destination_from_metadata() {
    let machine = StateMachineBuilder::new("flow")
        .gate(
            gate("start", "metadata.tier is defined")
                .route("metadata.tier", [(json!("gold"), "vip"), (json!("basic"), "standard")]),
        )
        .gate(gate("vip", "false"))
        .gate(gate("standard", "false"))
        .build()
        .unwrap();
    let h = harness(vec![machine]);

    create_label(&h.app, &alice(), json!({"tier": "gold"})).await.unwrap();
    let bob = LabelRef::new("bob", "flow");
    create_label(&h.app, &bob, json!({"tier": "basic"})).await.unwrap();

    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "vip");
    assert_eq!(get_label_state(&h.app, &bob).await.unwrap(), "standard");
}

#[tokio::test]
async fn unmatched_route_leaves_the_label_in_place() {
    let machine = StateMachineBuilder::new("flow")
        .gate(gate("start", "true").route("metadata.tier", [(json!("gold"), "vip")]))
        .gate(gate("vip", "false"))
        .build()
        .unwrap();
    let h = harness(vec![machine]);

    let metadata = create_label(&h.app, &alice(), json!({"tier": "tin"})).await.unwrap();
    assert_eq!(metadata, json!({"tier": "tin"}));
    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "start");

    // The label exists, so creating it again is refused rather than retried.
    let err = create_label(&h.app, &alice(), json!({"tier": "gold"})).await.unwrap_err();
    assert!(matches!(err, TransitionError::LabelAlreadyExists(_)));
}

#[tokio::test]
async fn history_is_consistent_with_the_machine() {
    let machine = with_action();
    let h = harness(vec![machine.clone()]);
    create_label(&h.app, &alice(), json!({"ready": true})).await.unwrap();

    let history = get_label_history(&h.app, &alice()).await.unwrap();
    assert_eq!(history.check_consistency(&machine), Ok(()));
    assert_eq!(history.get_path(), vec!["start", "notify", "end"]);
}

#[tokio::test]
async fn slow_webhooks_do_not_block_reads() {
    let h = harness(vec![with_action()]);
    h.webhooks.delay_by(Duration::from_millis(20));

    create_label(&h.app, &alice(), json!({"ready": true})).await.unwrap();
    assert_eq!(get_label_state(&h.app, &alice()).await.unwrap(), "end");
}
