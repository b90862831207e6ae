use persona_sync::core::DocPath;
use persona_sync::git::{Delivery, PushOutcome};

use crate::fixtures::git::{advance_remote, branch_head, commit_local, file_at_head};
use crate::fixtures::rig::GitRig;

fn path(raw: &str) -> DocPath {
    DocPath::new(raw).expect("doc path")
}

#[test]
fn publish_lands_on_remote_and_working_tree() {
    let rig = GitRig::new();
    let engine = rig.engine();

    let result = engine.publish(&path("whiteboard.json"), b"{\"content\":\"hi\"}\n", "alice", "save board");
    let PushOutcome::Success {
        delivery: Delivery::Pushed { commit },
    } = &result.outcome
    else {
        panic!("expected push, got {result:?}");
    };
    assert_eq!(result.retries(), 0);
    assert_eq!(branch_head(&rig.remote).map(|oid| oid.to_string()).as_ref(), Some(commit));
    assert_eq!(
        file_at_head(&rig.remote, "whiteboard.json").as_deref(),
        Some(&b"{\"content\":\"hi\"}\n"[..])
    );
    assert_eq!(
        std::fs::read(rig.clone.join("whiteboard.json")).expect("working tree file"),
        b"{\"content\":\"hi\"}\n"
    );
}

#[test]
fn identical_content_is_noop_and_keeps_remote() {
    let rig = GitRig::new();
    let engine = rig.engine();
    let p = path("memos/a.json");
    assert!(engine.publish(&p, b"{}\n", "alice", "first").is_published());
    let head = branch_head(&rig.remote);

    let again = engine.publish(&p, b"{}\n", "alice", "again");
    assert!(matches!(again.outcome, PushOutcome::NoOp), "{again:?}");
    assert!(!again.is_failure());
    assert_eq!(branch_head(&rig.remote), head);
}

#[test]
fn unrelated_remote_change_is_folded_in() {
    let rig = GitRig::new();
    let engine = rig.engine();
    assert!(engine.publish(&path("a.json"), b"{\"v\":1}\n", "alice", "first").is_published());
    advance_remote(&rig.remote, "b.json", b"{\"other\":true}\n").expect("advance remote");

    let result = engine.publish(&path("a.json"), b"{\"v\":2}\n", "alice", "second");
    assert!(result.is_published(), "{result:?}");
    assert_eq!(
        file_at_head(&rig.remote, "b.json").as_deref(),
        Some(&b"{\"other\":true}\n"[..])
    );
    assert_eq!(
        file_at_head(&rig.remote, "a.json").as_deref(),
        Some(&b"{\"v\":2}\n"[..])
    );
}

#[test]
fn local_only_commits_are_replayed_onto_remote() {
    let rig = GitRig::new();
    let engine = rig.engine();
    assert!(engine.publish(&path("seed.json"), b"{}\n", "alice", "seed").is_published());

    commit_local(&rig.clone, "local.txt", b"local note\n").expect("local commit");
    advance_remote(&rig.remote, "remote.txt", b"remote note\n").expect("advance remote");

    let result = engine.publish(&path("a.json"), b"{\"v\":1}\n", "alice", "after divergence");
    assert!(result.is_published(), "{result:?}");
    for (file, content) in [
        ("local.txt", &b"local note\n"[..]),
        ("remote.txt", &b"remote note\n"[..]),
        ("a.json", &b"{\"v\":1}\n"[..]),
    ] {
        assert_eq!(file_at_head(&rig.remote, file).as_deref(), Some(content), "{file}");
    }
    assert_eq!(branch_head(&rig.clone), branch_head(&rig.remote));
}

#[test]
fn refresh_fast_forwards_after_other_writer() {
    let rig = GitRig::new();
    let engine = rig.engine();
    assert!(engine.publish(&path("a.json"), b"{}\n", "alice", "seed").is_published());
    let theirs = advance_remote(&rig.remote, "b.json", b"{\"v\":9}\n").expect("advance remote");

    let outcome = engine.refresh().expect("refresh");
    assert_eq!(
        outcome,
        persona_sync::git::RefreshOutcome::FastForwarded {
            to: theirs.to_string()
        }
    );
    assert_eq!(
        std::fs::read(rig.clone.join("b.json")).expect("checked out"),
        b"{\"v\":9}\n"
    );
    assert_eq!(
        engine.refresh().expect("refresh"),
        persona_sync::git::RefreshOutcome::UpToDate
    );
}
