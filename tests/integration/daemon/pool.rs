use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use persona_sync::config::ResourceConfig;
use persona_sync::core::{DocPath, Document};
use persona_sync::daemon::{ActorKey, ActorKind, ActorRegistry, ActorSpec, run_pool};
use serde_json::json;

use super::actor_context;
use crate::fixtures::git::file_at_head;
use crate::fixtures::rig::GitRig;

#[test]
fn pool_publishes_and_stops_on_shutdown() {
    let rig = GitRig::new();
    let path = DocPath::new("whiteboard.json").expect("doc path");
    let board = ResourceConfig::new(path.clone());
    let registry = ActorRegistry::from_specs(vec![ActorSpec::persist("board", &board)]);
    let ctx = Arc::new(actor_context(
        &rig,
        BTreeMap::from([("board".to_string(), board)]),
    ));
    ctx.ephemeral()
        .write(
            &Document::json(path, json!({"summary": "pool", "body": "running"}))
                .with_timestamp("2025-06-11T10:00:00Z"),
        )
        .expect("write ephemeral");

    let shutdown = Arc::new(AtomicBool::new(false));
    let stopper = {
        let shutdown = Arc::clone(&shutdown);
        let remote = rig.remote.clone();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(20);
            while Instant::now() < deadline && file_at_head(&remote, "whiteboard.json").is_none() {
                thread::sleep(Duration::from_millis(50));
            }
            shutdown.store(true, Ordering::Relaxed);
        })
    };

    let stats = run_pool(ctx, &registry, 2, Arc::clone(&shutdown)).expect("pool");
    stopper.join().expect("stopper thread");

    let board = stats
        .get(&ActorKey::new("board", ActorKind::Persist))
        .expect("board stats");
    assert!(board.ticks >= 1);
    assert_eq!(board.published, 1);
    assert_eq!(board.failures, 0);
    assert!(file_at_head(&rig.remote, "whiteboard.json").is_some());
}
