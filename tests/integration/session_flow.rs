//! Tri-state session propagation and logout.

use crate::helpers::{Harness, settle};
use editor_bridge::BridgeError;
use editor_bridge::host::session::AuthState;
use editor_bridge::test_utils::StaticAuth;
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn unknown_session_is_not_pushed_on_readiness() {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.make_ready();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.sent("USER_INFO_UPDATE").is_empty());
    assert_eq!(h.bridge.session().state, AuthState::Unknown);

    h.bridge.check_session().await;
    let pushes = h.sent("USER_INFO_UPDATE");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].payload["authenticated"], true);
    assert_eq!(pushes[0].payload["displayName"], "ada");
}

#[tokio::test(start_paused = true)]
async fn resolved_session_waits_for_transport() {
    let h = Harness::new(StaticAuth::anonymous());
    h.bridge.check_session().await;
    assert!(h.sent("USER_INFO_UPDATE").is_empty());

    h.signal("TRANSPORT_READY");
    assert!(h.sent("USER_INFO_UPDATE").is_empty(), "push is delayed");

    tokio::time::sleep(Duration::from_millis(299)).await;
    assert!(h.sent("USER_INFO_UPDATE").is_empty());
    tokio::time::sleep(Duration::from_millis(2)).await;
    settle().await;

    let pushes = h.sent("USER_INFO_UPDATE");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].payload["authenticated"], false);
}

#[tokio::test(start_paused = true)]
async fn each_readiness_signal_schedules_a_push() {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.bridge.check_session().await;

    h.make_ready();
    tokio::time::sleep(Duration::from_millis(400)).await;
    settle().await;

    // Transport was attached by the first signal, so both delayed pushes go out.
    assert_eq!(h.sent("USER_INFO_UPDATE").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_delayed_push() {
    let h = Harness::new(StaticAuth::anonymous());
    h.bridge.check_session().await;
    h.signal("TRANSPORT_READY");

    h.bridge.dispose();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    settle().await;
    assert!(h.sent("USER_INFO_UPDATE").is_empty());
}

#[tokio::test(start_paused = true)]
async fn logout_pushes_anonymous_even_while_title_request_pending() {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.bridge.check_session().await;
    h.make_ready();
    h.bridge.set_title("Maze");

    let bridge = h.bridge.clone();
    let title = tokio::spawn(async move { bridge.request_title().await });
    settle().await;
    assert_eq!(h.bridge.pending_requests(), 1);

    h.bridge.logout().await.expect("logout");
    let last_push = h
        .sent("USER_INFO_UPDATE")
        .pop()
        .expect("anonymous push");
    assert_eq!(last_push.payload["authenticated"], false);
    assert_eq!(h.bridge.session().state, AuthState::Anonymous);
    assert_eq!(h.bridge.pending_requests(), 1, "title request unaffected");

    let resolved = title.await.expect("join").expect("fallback");
    assert_eq!(resolved, "Maze");
}

#[tokio::test(start_paused = true)]
async fn failed_logout_keeps_session() {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.bridge.check_session().await;
    h.signal("TRANSPORT_READY");
    h.auth.fail_logout(true);

    let err = h.bridge.logout().await.expect_err("logout fails");
    assert!(matches!(err, BridgeError::Api(_)));
    assert_eq!(h.bridge.session().state, AuthState::Authenticated);
    assert_eq!(h.auth.logouts(), 1);
}

#[tokio::test(start_paused = true)]
async fn logout_requested_by_editor_runs_in_background() {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.bridge.check_session().await;
    h.signal("TRANSPORT_READY");

    h.inbound(json!({"v": 1, "type": "LOGOUT_REQUESTED"}))
        .expect("accepted");
    settle().await;

    assert_eq!(h.auth.logouts(), 1);
    assert_eq!(h.bridge.session().state, AuthState::Anonymous);
}

#[tokio::test(start_paused = true)]
async fn user_info_ack_is_only_logged() {
    let h = Harness::new(StaticAuth::anonymous());
    let mut events = h.bridge.subscribe_events();

    h.inbound(json!({"v": 1, "type": "USER_INFO_UPDATE_ACK", "payload": {"authenticated": false}}))
        .expect("accepted");

    let acks: Vec<_> = crate::helpers::drain_events(&mut events)
        .into_iter()
        .filter(|e| e.event == "session.ack")
        .collect();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].payload["authenticated"], false);
}

#[tokio::test(start_paused = true)]
async fn slow_failed_logout_leaves_editor_authenticated() {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.bridge.check_session().await;
    h.auth.fail_logout(true);
    h.auth.set_logout_delay(Duration::from_millis(1000));
    h.signal("TRANSPORT_READY");

    let err = h.bridge.logout().await.expect_err("logout fails");
    assert!(matches!(err, BridgeError::Api(_)));
    settle().await;

    let pushes = h.sent("USER_INFO_UPDATE");
    assert!(!pushes.is_empty(), "delayed push fired during logout");
    assert!(
        pushes.iter().all(|p| p.payload["authenticated"] == true),
        "editor never saw an anonymous session"
    );
    assert_eq!(h.bridge.session().state, AuthState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn slow_logout_publishes_anonymous_only_after_confirmation() {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.bridge.check_session().await;
    h.auth.set_logout_delay(Duration::from_millis(1000));
    h.signal("TRANSPORT_READY");

    let bridge = h.bridge.clone();
    let logout = tokio::spawn(async move { bridge.logout().await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    settle().await;
    assert_eq!(h.bridge.session().state, AuthState::Authenticated);
    assert!(
        h.sent("USER_INFO_UPDATE")
            .iter()
            .all(|p| p.payload["authenticated"] == true)
    );

    logout.await.expect("join").expect("logout");
    let last = h.sent("USER_INFO_UPDATE").pop().expect("anonymous push");
    assert_eq!(last.payload["authenticated"], false);
}
