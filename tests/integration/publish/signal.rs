use persona_sync::core::DocPath;
use persona_sync::git::{Delivery, PushOutcome, SignalStatus};

use crate::fixtures::git::branch_head;
use crate::fixtures::rig::GitRig;

#[test]
fn signal_only_records_intent_and_leaves_remote() {
    let rig = GitRig::new();
    let engine = rig.engine();
    let p = DocPath::new("whiteboard.json").expect("doc path");
    assert!(engine.publish(&p, b"{\"v\":1}\n", "alice", "first").is_published());
    let remote = branch_head(&rig.remote);
    let local = branch_head(&rig.clone);

    let result = engine.signal_only(&p, b"{\"v\":2}\n", "alice", "proposed edit");
    let PushOutcome::Success {
        delivery: Delivery::Signaled { record },
    } = &result.outcome
    else {
        panic!("expected signal, got {result:?}");
    };
    assert_eq!(record.status, SignalStatus::LoggedOnly);
    assert_eq!(record.base_commit, remote.map(|oid| oid.to_string()));
    assert!(!result.is_published());
    assert_eq!(branch_head(&rig.remote), remote);
    assert_eq!(branch_head(&rig.clone), local);

    let logged = engine.signal_log().read_all().expect("signal log");
    assert_eq!(logged.len(), 1);
    assert_eq!(&logged[0], record);
}

#[test]
fn approval_path_is_downgraded_to_pending_signal() {
    let rig = GitRig::new();
    let engine = rig.engine();
    let p = DocPath::new("persona/value_constitution.yaml").expect("doc path");

    let result = engine.publish(&p, b"values: []\n", "alice", "edit values");
    let PushOutcome::Success {
        delivery: Delivery::Signaled { record },
    } = &result.outcome
    else {
        panic!("expected signal, got {result:?}");
    };
    assert_eq!(record.status, SignalStatus::PendingApproval);
    assert_eq!(branch_head(&rig.remote), None);
    assert_eq!(rig.signals.parent().map(|dir| dir.exists()), Some(true));
}
