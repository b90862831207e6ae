use persona_sync::core::DocPath;
use persona_sync::git::PushOutcome;

use crate::fixtures::git::{advance_remote, branch_head, file_at_head};
use crate::fixtures::rig::GitRig;

#[test]
fn concurrent_edit_of_same_path_is_a_conflict() {
    let rig = GitRig::new();
    let engine = rig.engine();
    let p = DocPath::new("whiteboard.json").expect("doc path");
    assert!(engine.publish(&p, b"{\"v\":1}\n", "alice", "first").is_published());

    let theirs = advance_remote(&rig.remote, "whiteboard.json", b"{\"v\":\"theirs\"}\n")
        .expect("advance remote");
    let result = engine.publish(&p, b"{\"v\":2}\n", "alice", "second");

    assert!(
        matches!(result.outcome, PushOutcome::Conflict { ref detail } if detail.contains("whiteboard.json")),
        "{result:?}"
    );
    assert!(result.is_failure());
    assert_eq!(branch_head(&rig.remote), Some(theirs));
    assert_eq!(
        file_at_head(&rig.remote, "whiteboard.json").as_deref(),
        Some(&b"{\"v\":\"theirs\"}\n"[..])
    );
}

#[test]
fn remote_already_holding_new_content_is_not_a_conflict() {
    let rig = GitRig::new();
    let engine = rig.engine();
    let p = DocPath::new("whiteboard.json").expect("doc path");
    assert!(engine.publish(&p, b"{\"v\":1}\n", "alice", "first").is_published());
    let theirs = advance_remote(&rig.remote, "whiteboard.json", b"{\"v\":2}\n").expect("advance");

    let result = engine.publish(&p, b"{\"v\":2}\n", "alice", "same edit");
    assert!(matches!(result.outcome, PushOutcome::NoOp), "{result:?}");
    assert_eq!(branch_head(&rig.remote), Some(theirs));
    assert_eq!(branch_head(&rig.clone), Some(theirs));
}
