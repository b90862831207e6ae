use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use git2::Oid;
use persona_sync::core::DocPath;
use persona_sync::git::{Delivery, Git2Transport, PushOutcome, RemoteTransport, TransportError};

use crate::fixtures::git::{advance_remote, branch_head, file_at_head};
use crate::fixtures::rig::GitRig;

/// A remote that never answers.
struct Unreachable {
    fetches: AtomicU32,
}

impl RemoteTransport for Unreachable {
    fn fetch(&self, _repo: &Path, remote: &str, _branch: &str) -> Result<Option<Oid>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Unreachable {
            remote: remote.to_string(),
            message: "connection refused".into(),
        })
    }

    fn push(
        &self,
        _repo: &Path,
        remote: &str,
        _branch: &str,
        _expected: Option<Oid>,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unreachable {
            remote: remote.to_string(),
            message: "connection refused".into(),
        })
    }
}

/// Lets another writer land an unrelated commit between fetch and push,
/// `races` times.
struct Racing {
    inner: Git2Transport,
    remote_dir: PathBuf,
    races: AtomicU32,
}

impl RemoteTransport for Racing {
    fn fetch(&self, repo: &Path, remote: &str, branch: &str) -> Result<Option<Oid>, TransportError> {
        self.inner.fetch(repo, remote, branch)
    }

    fn push(
        &self,
        repo: &Path,
        remote: &str,
        branch: &str,
        expected: Option<Oid>,
    ) -> Result<(), TransportError> {
        if let Ok(n) = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            advance_remote(&self.remote_dir, &format!("other/{n}.txt"), b"raced\n")
                .map_err(TransportError::Worker)?;
        }
        self.inner.push(repo, remote, branch, expected)
    }
}

/// Delivers the first push but reports it as timed out.
struct LateLanding {
    inner: Git2Transport,
    pushes: AtomicU32,
}

impl RemoteTransport for LateLanding {
    fn fetch(&self, repo: &Path, remote: &str, branch: &str) -> Result<Option<Oid>, TransportError> {
        self.inner.fetch(repo, remote, branch)
    }

    fn push(
        &self,
        repo: &Path,
        remote: &str,
        branch: &str,
        expected: Option<Oid>,
    ) -> Result<(), TransportError> {
        self.inner.push(repo, remote, branch, expected)?;
        if self.pushes.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(TransportError::Timeout {
                op: "push",
                after: Duration::from_millis(1),
            });
        }
        Ok(())
    }
}

#[test]
fn unreachable_remote_fails_after_retry_budget() {
    let rig = GitRig::new();
    let engine = rig.engine_with(
        Unreachable {
            fetches: AtomicU32::new(0),
        },
        2,
    );
    let p = DocPath::new("a.json").expect("doc path");

    let result = engine.publish(&p, b"{}\n", "alice", "save");
    assert!(
        matches!(result.outcome, PushOutcome::Failed { ref error } if error.contains("unreachable")),
        "{result:?}"
    );
    assert_eq!(result.retries(), 2);
    assert!(result.is_failure());
    assert_eq!(branch_head(&rig.clone), None);
}

#[test]
fn raced_pushes_are_rebuilt_and_retried() {
    let rig = GitRig::new();
    let engine = rig.engine_with(
        Racing {
            inner: Git2Transport::new(Duration::from_secs(10)),
            remote_dir: rig.remote.clone(),
            races: AtomicU32::new(2),
        },
        3,
    );
    let p = DocPath::new("whiteboard.json").expect("doc path");

    let result = engine.publish(&p, b"{\"v\":1}\n", "alice", "save");
    assert!(result.is_published(), "{result:?}");
    assert_eq!(result.retries(), 2);
    assert_eq!(
        file_at_head(&rig.remote, "whiteboard.json").as_deref(),
        Some(&b"{\"v\":1}\n"[..])
    );
    assert!(file_at_head(&rig.remote, "other/1.txt").is_some());
    assert!(file_at_head(&rig.remote, "other/0.txt").is_some());
    assert_eq!(branch_head(&rig.clone), branch_head(&rig.remote));
}

#[test]
fn exhausted_budget_leaves_local_branch_unmoved() {
    let rig = GitRig::new();
    let engine = rig.engine_with(
        Racing {
            inner: Git2Transport::new(Duration::from_secs(10)),
            remote_dir: rig.remote.clone(),
            races: AtomicU32::new(5),
        },
        1,
    );
    let p = DocPath::new("whiteboard.json").expect("doc path");

    let result = engine.publish(&p, b"{\"v\":1}\n", "alice", "save");
    assert!(matches!(result.outcome, PushOutcome::Failed { .. }), "{result:?}");
    assert_eq!(result.retries(), 1);
    assert_eq!(branch_head(&rig.clone), None);
    assert!(file_at_head(&rig.remote, "whiteboard.json").is_none());
}

#[test]
fn push_landing_after_timeout_is_reported_as_pushed() {
    let rig = GitRig::new();
    let engine = rig.engine_with(
        LateLanding {
            inner: Git2Transport::new(Duration::from_secs(10)),
            pushes: AtomicU32::new(0),
        },
        2,
    );
    let p = DocPath::new("whiteboard.json").expect("doc path");

    let result = engine.publish(&p, b"{\"v\":1}\n", "alice", "save");
    let PushOutcome::Success {
        delivery: Delivery::Pushed { commit },
    } = &result.outcome
    else {
        panic!("expected a push, got {result:?}");
    };
    assert_eq!(result.retries(), 1);
    let remote = branch_head(&rig.remote).expect("remote head");
    assert_eq!(commit, &remote.to_string());
    assert_eq!(branch_head(&rig.clone), Some(remote));
    assert_eq!(
        std::fs::read(rig.clone.join("whiteboard.json")).expect("worktree copy"),
        b"{\"v\":1}\n"
    );
}
