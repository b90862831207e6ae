use std::collections::BTreeMap;

use persona_sync::config::ResourceConfig;
use persona_sync::core::{DocPath, Document, Timestamp};
use persona_sync::daemon::{ActorKind, TickOutcome, run_once};
use persona_sync::reconcile::SyncAction;
use persona_sync::store::stream_entry_path;
use serde_json::json;

use super::actor_context;
use crate::fixtures::git::file_at_head;
use crate::fixtures::rig::GitRig;

fn board_resource() -> ResourceConfig {
    let mut board = ResourceConfig::new(DocPath::new("whiteboard.json").expect("doc path"));
    board.reconcile_interval_secs = Some(30);
    board
}

#[test]
fn reconcile_bootstraps_then_settles() {
    let rig = GitRig::new();
    let ctx = actor_context(&rig, BTreeMap::from([("board".to_string(), board_resource())]));
    let doc = Document::json(
        DocPath::new("whiteboard.json").expect("doc path"),
        json!({"summary": "today", "body": "ship the sync engine"}),
    )
    .with_timestamp("2025-06-11T10:00:00Z");
    ctx.ephemeral().write(&doc).expect("write ephemeral");

    let first = run_once(&ctx, "board", ActorKind::Reconcile);
    match &first {
        TickOutcome::Published(result) => assert!(result.is_published(), "{result:?}"),
        other => panic!("expected bootstrap publish, got {other:?}"),
    }
    assert_eq!(
        file_at_head(&rig.remote, "whiteboard.json").as_deref(),
        Some(&doc.encode()[..])
    );

    let second = run_once(&ctx, "board", ActorKind::Reconcile);
    assert!(
        matches!(
            second,
            TickOutcome::Reconciled {
                action: SyncAction::NoOp
            }
        ),
        "{second:?}"
    );
    assert!(ctx.locks().inspect("board").expect("inspect").is_none());
}

#[test]
fn persist_bootstraps_then_reconcile_is_noop() {
    let rig = GitRig::new();
    let ctx = actor_context(&rig, BTreeMap::from([("board".to_string(), board_resource())]));
    let doc = Document::json(
        DocPath::new("whiteboard.json").expect("doc path"),
        json!({"summary": "today", "body": "first write"}),
    )
    .with_timestamp("2025-06-11T10:00:00Z");
    ctx.ephemeral().write(&doc).expect("write ephemeral");

    let persisted = run_once(&ctx, "board", ActorKind::Persist);
    match &persisted {
        TickOutcome::Published(result) => assert!(result.is_published(), "{result:?}"),
        other => panic!("expected first publish, got {other:?}"),
    }
    assert_eq!(
        file_at_head(&rig.remote, "whiteboard.json").as_deref(),
        Some(&doc.encode()[..])
    );

    let reconciled = run_once(&ctx, "board", ActorKind::Reconcile);
    assert!(
        matches!(
            reconciled,
            TickOutcome::Reconciled {
                action: SyncAction::NoOp
            }
        ),
        "{reconciled:?}"
    );
    assert!(ctx.locks().inspect("board").expect("inspect").is_none());
}

#[test]
fn stream_resource_dedups_against_latest_entry() {
    let rig = GitRig::new();
    let dir = DocPath::new("memos").expect("doc path");
    let mut memos = ResourceConfig::new(dir.clone());
    memos.stream = true;
    let ctx = actor_context(&rig, BTreeMap::from([("memos".to_string(), memos)]));

    let entry = |stamp: &str| {
        let at = Timestamp::parse(stamp).expect("timestamp");
        let path = stream_entry_path(&dir, Some("alice"), at).expect("entry path");
        Document::json(path, json!({"summary": "standup", "body": "no blockers"}))
            .with_owner("alice")
            .with_timestamp(stamp)
    };

    let first = entry("2025-06-11T09:00:00Z");
    ctx.ephemeral().write(&first).expect("write memo");
    let outcome = run_once(&ctx, "memos", ActorKind::Persist);
    assert!(outcome.is_delivery(), "{outcome:?}");
    assert!(file_at_head(&rig.remote, first.path().as_str()).is_some());

    ctx.ephemeral()
        .write(&entry("2025-06-11T10:00:00Z"))
        .expect("write memo");
    let outcome = run_once(&ctx, "memos", ActorKind::Persist);
    assert!(matches!(outcome, TickOutcome::DuplicateSuppressed), "{outcome:?}");
}

#[test]
fn unknown_resource_is_a_failed_tick() {
    let rig = GitRig::new();
    let ctx = actor_context(&rig, BTreeMap::new());
    let outcome = run_once(&ctx, "missing", ActorKind::Persist);
    assert!(outcome.is_failure());
}
