//! Title reconciliation with the editor.

use crate::helpers::{Harness, drain_events, settle, test_config};
use editor_bridge::test_utils::StaticAuth;
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn unanswered_title_request_falls_back_to_placeholder() {
    let h = Harness::new(StaticAuth::anonymous());
    let started = tokio::time::Instant::now();

    let title = h.bridge.request_title().await.expect("fallback");

    assert_eq!(title, "Untitled");
    assert_eq!(started.elapsed(), Duration::from_millis(2000));
    assert_eq!(h.sent("REQUEST_PROJECT_TITLE").len(), 1);
    assert_eq!(h.bridge.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn configured_placeholder_and_timeout_apply() {
    let mut config = test_config();
    config.project.placeholder_title = "Sans titre".into();
    config.timeouts.title_ms = 250;
    let h = Harness::with_config(StaticAuth::anonymous(), config);
    let started = tokio::time::Instant::now();

    assert_eq!(h.bridge.title(), "Sans titre");
    let title = h.bridge.request_title().await.expect("fallback");
    assert_eq!(title, "Sans titre");
    assert_eq!(started.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn answered_title_request_resolves_immediately() {
    let h = Harness::new(StaticAuth::anonymous());

    let bridge = h.bridge.clone();
    let request = tokio::spawn(async move { bridge.request_title().await });
    settle().await;
    h.reply("PROJECT_TITLE_RESPONSE", "REQUEST_PROJECT_TITLE", json!("Space Race"))
        .expect("title reply");

    let started = tokio::time::Instant::now();
    let title = request.await.expect("join").expect("title");
    assert_eq!(title, "Space Race");
    assert_eq!(started.elapsed(), Duration::ZERO);
    // Asking is not adopting.
    assert_eq!(h.bridge.title(), "Untitled");
}

#[tokio::test(start_paused = true)]
async fn unsolicited_title_update_is_normalized_and_idempotent() {
    let h = Harness::new(StaticAuth::anonymous());
    let mut events = h.bridge.subscribe_events();

    h.inbound(json!({"v": 1, "type": "TITLE_UPDATE", "payload": "  Space Race  "}))
        .expect("accepted");
    h.inbound(json!({"v": 1, "type": "TITLE_UPDATE", "payload": "Space Race"}))
        .expect("accepted");

    assert_eq!(h.bridge.title(), "Space Race");
    assert_eq!(h.bridge.record().title, "Space Race");
    let updates = drain_events(&mut events)
        .into_iter()
        .filter(|e| e.event == "title.updated")
        .count();
    assert_eq!(updates, 1);
}

#[tokio::test(start_paused = true)]
async fn blank_title_update_becomes_placeholder() {
    let h = Harness::new(StaticAuth::anonymous());
    h.bridge.set_title("Maze");

    h.inbound(json!({"v": 1, "type": "TITLE_UPDATE", "payload": "   "}))
        .expect("accepted");
    assert_eq!(h.bridge.title(), "Untitled");
}

#[tokio::test(start_paused = true)]
async fn set_title_pushes_normalized_title() {
    let h = Harness::new(StaticAuth::anonymous());

    let title = h.bridge.set_title("  Maze  ");

    assert_eq!(title, "Maze");
    assert_eq!(h.bridge.record().title, "Maze");
    let pushed = h.sent("SET_PROJECT_TITLE");
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].payload, json!("Maze"));
    assert!(pushed[0].correlation_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn title_request_falls_back_to_last_known_title() {
    let h = Harness::new(StaticAuth::anonymous());
    h.bridge.set_title("Maze");

    let title = h.bridge.request_title().await.expect("fallback");
    assert_eq!(title, "Maze");
}
