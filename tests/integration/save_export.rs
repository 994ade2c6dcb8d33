//! Save, export and settings flows against a scripted editor.

use crate::helpers::{Harness, drain_events, settle, stored_project};
use editor_bridge::BridgeError;
use editor_bridge::host::contract::{EventLevel, RequestKind};
use editor_bridge::host::project::LoadState;
use editor_bridge::host::record::{ProjectId, ProjectPatch};
use editor_bridge::test_utils::StaticAuth;
use serde_json::json;
use std::time::Duration;

async fn logged_in_and_ready() -> Harness {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.bridge.check_session().await;
    h.make_ready();
    h
}

/// Answer the title, export and thumbnail requests of one save in order.
async fn answer_save_requests(h: &Harness, title: &str, document: serde_json::Value) {
    settle().await;
    h.reply("PROJECT_TITLE_RESPONSE", "REQUEST_PROJECT_TITLE", json!(title))
        .expect("title reply");
    settle().await;
    h.reply("EXPORT_PROJECT_RESPONSE", "EXPORT_PROJECT_REQUEST", document)
        .expect("export reply");
    settle().await;
    h.reply("THUMBNAIL_RESPONSE", "GET_THUMBNAIL", json!("AQID"))
        .expect("thumbnail reply");
}

#[tokio::test(start_paused = true)]
async fn first_save_creates_and_adopts_new_identity() {
    let h = logged_in_and_ready().await;

    let bridge = h.bridge.clone();
    let save = tokio::spawn(async move { bridge.save().await });
    answer_save_requests(&h, "  Racer ", json!({"targets": [1]})).await;
    let saved = save.await.expect("join").expect("save");

    let id = ProjectId::from(100_u64);
    assert_eq!(saved.id, Some(id.clone()));
    assert_eq!(saved.title, "Racer");
    assert_eq!(saved.cover_thumbnail, Some(vec![1, 2, 3]));
    assert_eq!(h.gateway.creates(), 1);
    assert_eq!(h.gateway.get(&id).expect("stored").document, json!({"targets": [1]}));
    assert_eq!(h.bridge.last_sent_id(), Some(id.clone()));
    assert_eq!(h.bridge.record().id, Some(id.clone()));

    // Navigating to the freshly assigned id must not re-transfer.
    h.bridge.load_project(id).await.expect("load");
    assert_eq!(h.gateway.fetches(), 0);
    assert!(h.sent("LOAD_PROJECT").is_empty());
}

#[tokio::test(start_paused = true)]
async fn saving_a_loaded_project_updates_it() {
    let h = logged_in_and_ready().await;
    h.gateway.insert(7_u64, stored_project("Maze"));
    h.bridge.load_project(7_u64).await.expect("load");

    let bridge = h.bridge.clone();
    let save = tokio::spawn(async move { bridge.save().await });
    answer_save_requests(&h, "Maze", json!({"targets": [2]})).await;
    let saved = save.await.expect("join").expect("save");

    assert_eq!(saved.id, Some(ProjectId::from(7_u64)));
    assert_eq!(saved.description, "stored");
    assert_eq!(h.gateway.updates(), 1);
    assert_eq!(h.gateway.creates(), 0);
    assert_eq!(h.sent("LOAD_PROJECT").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn save_requires_login_before_any_traffic() {
    let h = Harness::new(StaticAuth::anonymous());
    h.bridge.check_session().await;
    h.make_ready();
    let mut events = h.bridge.subscribe_events();

    let err = h.bridge.save().await.expect_err("anonymous save");
    assert!(matches!(err, BridgeError::NotAuthenticated));
    assert!(err.needs_login());
    assert!(h.sent("REQUEST_PROJECT_TITLE").is_empty());
    assert!(h.sent("EXPORT_PROJECT_REQUEST").is_empty());
    assert_eq!(h.gateway.creates(), 0);

    let notice = drain_events(&mut events)
        .into_iter()
        .find(|e| e.event == "notice")
        .expect("login notice");
    assert_eq!(notice.level, EventLevel::Warn);
}

#[tokio::test(start_paused = true)]
async fn export_without_reply_fails_after_deadline() {
    let h = logged_in_and_ready().await;
    let mut events = h.bridge.subscribe_events();
    let started = tokio::time::Instant::now();

    let bridge = h.bridge.clone();
    let save = tokio::spawn(async move { bridge.save().await });
    settle().await;
    h.reply("PROJECT_TITLE_RESPONSE", "REQUEST_PROJECT_TITLE", json!("Maze"))
        .expect("title reply");

    let err = save.await.expect("join").expect_err("export times out");
    assert!(matches!(
        err,
        BridgeError::Timeout {
            kind: RequestKind::Export,
            after_ms: 5000
        }
    ));
    assert_eq!(started.elapsed(), Duration::from_millis(5000));
    assert_eq!(h.bridge.pending_requests(), 0);
    assert!(h.sent("GET_THUMBNAIL").is_empty());
    assert_eq!(h.gateway.creates(), 0);

    let events = drain_events(&mut events);
    assert!(events.iter().any(|e| e.event == "rpc.timeout"));
    assert!(
        events
            .iter()
            .any(|e| e.event == "notice" && e.level == EventLevel::Error)
    );
}

#[tokio::test(start_paused = true)]
async fn missing_thumbnail_does_not_block_save() {
    let h = logged_in_and_ready().await;

    let bridge = h.bridge.clone();
    let save = tokio::spawn(async move { bridge.save().await });
    settle().await;
    h.reply("PROJECT_TITLE_RESPONSE", "REQUEST_PROJECT_TITLE", json!("Maze"))
        .expect("title reply");
    settle().await;
    h.reply("EXPORT_PROJECT_RESPONSE", "EXPORT_PROJECT_REQUEST", json!({"targets": []}))
        .expect("export reply");

    let saved = save.await.expect("join").expect("save");
    assert_eq!(saved.cover_thumbnail, None);
    assert_eq!(h.gateway.creates(), 1);
}

#[tokio::test(start_paused = true)]
async fn serialized_document_is_never_forwarded() {
    let h = logged_in_and_ready().await;
    let mut events = h.bridge.subscribe_events();

    let bridge = h.bridge.clone();
    let save = tokio::spawn(async move { bridge.save().await });
    settle().await;
    h.reply("PROJECT_TITLE_RESPONSE", "REQUEST_PROJECT_TITLE", json!("Maze"))
        .expect("title reply");
    settle().await;
    h.reply(
        "EXPORT_PROJECT_RESPONSE",
        "EXPORT_PROJECT_REQUEST",
        json!("{\"targets\":[]}"),
    )
    .expect("export reply");

    let err = save.await.expect("join").expect_err("serialized document");
    assert!(matches!(err, BridgeError::DocumentSerialized));
    assert_eq!(h.gateway.creates(), 0);
    assert!(
        drain_events(&mut events)
            .iter()
            .any(|e| e.event == "project.document_rejected" && e.level == EventLevel::Error)
    );
}

#[tokio::test(start_paused = true)]
async fn failed_save_leaves_record_untouched_and_can_retry() {
    let h = logged_in_and_ready().await;
    h.gateway.insert(7_u64, stored_project("Maze"));
    h.bridge.load_project(7_u64).await.expect("load");
    let before = h.bridge.record();
    h.gateway.fail_writes(true);

    let bridge = h.bridge.clone();
    let save = tokio::spawn(async move { bridge.save().await });
    answer_save_requests(&h, "Maze", json!({"targets": ["changed"]})).await;
    let err = save.await.expect("join").expect_err("store down");
    assert!(matches!(err, BridgeError::Api(_)));
    assert_eq!(h.bridge.record(), before);
    assert_eq!(
        h.bridge.load_state(),
        LoadState::Transferred(ProjectId::from(7_u64))
    );

    h.gateway.fail_writes(false);
    let bridge = h.bridge.clone();
    let retry = tokio::spawn(async move { bridge.save().await });
    answer_save_requests(&h, "Maze", json!({"targets": ["changed"]})).await;
    let saved = retry.await.expect("join").expect("retry");
    assert_eq!(saved.document, json!({"targets": ["changed"]}));
}

#[tokio::test(start_paused = true)]
async fn concurrent_save_is_rejected() {
    let h = logged_in_and_ready().await;

    let bridge = h.bridge.clone();
    let first = tokio::spawn(async move { bridge.save().await });
    settle().await;

    let err = h.bridge.save().await.expect_err("second save");
    assert!(matches!(err, BridgeError::SaveInProgress));

    answer_save_requests(&h, "Maze", json!({"targets": []})).await;
    first.await.expect("join").expect("first save");
}

#[tokio::test(start_paused = true)]
async fn save_requested_by_editor_saves_in_background() {
    let h = logged_in_and_ready().await;

    h.inbound(json!({"v": 1, "type": "SAVE_REQUESTED"}))
        .expect("accepted");
    answer_save_requests(&h, "From Editor", json!({"targets": []})).await;
    settle().await;

    assert_eq!(h.gateway.creates(), 1);
    assert_eq!(h.bridge.title(), "From Editor");
}

#[tokio::test(start_paused = true)]
async fn export_to_file_writes_pretty_json_named_after_title() {
    let h = logged_in_and_ready().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let document = json!({"targets": [{"name": "Stage"}]});

    let bridge = h.bridge.clone();
    let target = dir.path().to_path_buf();
    let export = tokio::spawn(async move { bridge.export_to_file(Some(&target)).await });
    settle().await;
    h.reply("PROJECT_TITLE_RESPONSE", "REQUEST_PROJECT_TITLE", json!("My/Game"))
        .expect("title reply");
    settle().await;
    h.reply("EXPORT_PROJECT_RESPONSE", "EXPORT_PROJECT_REQUEST", document.clone())
        .expect("export reply");

    let path = export.await.expect("join").expect("export");
    assert_eq!(path, dir.path().join("My_Game.json"));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read export"))
            .expect("valid json");
    assert_eq!(written, document);
    assert_eq!(h.bridge.title(), "My/Game");
}

#[tokio::test(start_paused = true)]
async fn settings_patch_saved_project_and_push_title() {
    let h = logged_in_and_ready().await;
    h.gateway.insert(7_u64, stored_project("Maze"));
    h.bridge.load_project(7_u64).await.expect("load");

    let settings = h
        .bridge
        .update_settings(ProjectPatch {
            title: Some(" Maze Deluxe ".into()),
            is_public: Some(true),
            ..ProjectPatch::default()
        })
        .await
        .expect("patch");

    assert_eq!(settings.title, "Maze Deluxe");
    assert!(settings.is_public);
    assert_eq!(h.gateway.patches(), 1);
    let stored = h.gateway.get(&ProjectId::from(7_u64)).expect("stored");
    assert_eq!(stored.title, "Maze Deluxe");
    let pushed = h.sent("SET_PROJECT_TITLE");
    assert_eq!(pushed.last().expect("title push").payload, json!("Maze Deluxe"));
}

#[tokio::test(start_paused = true)]
async fn failed_settings_patch_changes_nothing() {
    let h = logged_in_and_ready().await;
    h.gateway.insert(7_u64, stored_project("Maze"));
    h.bridge.load_project(7_u64).await.expect("load");
    h.gateway.fail_writes(true);

    let err = h
        .bridge
        .update_settings(ProjectPatch {
            title: Some("Renamed".into()),
            ..ProjectPatch::default()
        })
        .await
        .expect_err("patch fails");
    assert!(matches!(err, BridgeError::Api(_)));
    assert_eq!(h.bridge.title(), "Maze");
    assert_eq!(h.bridge.record().title, "Maze");
    assert!(h.sent("SET_PROJECT_TITLE").is_empty());
}

#[tokio::test(start_paused = true)]
async fn settings_of_unsaved_project_stay_local() {
    let h = logged_in_and_ready().await;

    let settings = h
        .bridge
        .update_settings(ProjectPatch {
            description: Some("draft".into()),
            ..ProjectPatch::default()
        })
        .await
        .expect("local update");

    assert_eq!(settings.description, "draft");
    assert_eq!(h.gateway.patches(), 0);
}

#[tokio::test(start_paused = true)]
async fn open_settings_reconciles_title_first() {
    let h = logged_in_and_ready().await;

    let bridge = h.bridge.clone();
    let open = tokio::spawn(async move { bridge.open_settings().await });
    settle().await;
    h.reply("PROJECT_TITLE_RESPONSE", "REQUEST_PROJECT_TITLE", json!("Typed In Editor"))
        .expect("title reply");

    let settings = open.await.expect("join").expect("settings");
    assert_eq!(settings.title, "Typed In Editor");
    assert_eq!(settings.id, None);
}

#[tokio::test(start_paused = true)]
async fn save_is_refused_while_project_waits_for_editor() {
    let h = Harness::new(StaticAuth::logged_in("ada"));
    h.bridge.check_session().await;
    h.gateway.insert(7_u64, stored_project("Maze"));
    h.signal("TRANSPORT_READY");
    h.bridge.load_project(7_u64).await.expect("load");
    assert!(matches!(h.bridge.load_state(), LoadState::HoldingUnsent { .. }));

    let err = h.bridge.save().await.expect_err("editor still shows something else");
    assert!(matches!(err, BridgeError::NoProject(_)));
    assert!(h.sent("REQUEST_PROJECT_TITLE").is_empty());
    assert!(h.sent("EXPORT_PROJECT_REQUEST").is_empty());
    assert_eq!(h.gateway.updates(), 0);
    assert_eq!(
        h.gateway.get(&ProjectId::from(7_u64)).expect("stored").document,
        stored_project("Maze").document
    );

    h.signal("RUNTIME_READY");
    let transfers = h.sent("LOAD_PROJECT");
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].payload, stored_project("Maze").document);
    assert_eq!(
        h.bridge.load_state(),
        LoadState::Transferred(ProjectId::from(7_u64))
    );
}

#[tokio::test(start_paused = true)]
async fn export_is_refused_while_project_is_fetching() {
    let h = logged_in_and_ready().await;
    h.gateway.insert(7_u64, stored_project("Maze"));
    h.gateway.set_fetch_delay(Duration::from_millis(100));
    let dir = tempfile::tempdir().expect("tempdir");

    let bridge = h.bridge.clone();
    let load = tokio::spawn(async move { bridge.load_project(7_u64).await });
    settle().await;

    let err = h
        .bridge
        .export_to_file(Some(dir.path()))
        .await
        .expect_err("still loading");
    assert!(matches!(err, BridgeError::NoProject(_)));
    assert!(h.sent("EXPORT_PROJECT_REQUEST").is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);

    load.await.expect("join").expect("load");
    assert_eq!(h.sent("LOAD_PROJECT").len(), 1);
}
