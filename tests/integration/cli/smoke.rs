//! Runs the `psync` binary against temp repositories.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use persona_sync::lock::{DEFAULT_STALE_AFTER, LockManager};
use predicates::prelude::*;

use crate::fixtures::git::file_at_head;
use crate::fixtures::rig::GitRig;

fn psync(workdir: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("psync");
    cmd.current_dir(workdir);
    cmd.env("PSYNC_DATA_DIR", workdir.join("data"));
    cmd.env("PSYNC_CONFIG_DIR", workdir.join("config"));
    cmd.env("PSYNC_TESTING", "1");
    cmd.env_remove("PSYNC_REPO");
    cmd.env_remove("PSYNC_LOG");
    cmd
}

#[test]
fn score_prints_verdict() {
    let rig = GitRig::new();
    let file = rig.tmp.path().join("candidate.json");
    fs::write(
        &file,
        serde_json::json!({"content": {"summary": "x".repeat(100), "body": ""}}).to_string(),
    )
    .expect("write candidate");

    psync(rig.tmp.path())
        .arg("score")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("score 1.0000").and(predicate::str::contains("persist")));
}

#[test]
fn publish_pushes_file() {
    let rig = GitRig::new();
    let src = rig.tmp.path().join("board.json");
    fs::write(&src, "{\"content\":\"plans\"}\n").expect("write source");

    psync(rig.tmp.path())
        .arg("--repo")
        .arg(&rig.clone)
        .args(["publish", "whiteboard.json", "--reason", "save board", "--file"])
        .arg(&src)
        .assert()
        .success()
        .stdout(predicate::str::contains("Published whiteboard.json"));

    assert_eq!(
        file_at_head(&rig.remote, "whiteboard.json").as_deref(),
        Some(&b"{\"content\":\"plans\"}\n"[..])
    );
}

#[test]
fn publish_with_empty_reason_exits_nonzero() {
    let rig = GitRig::new();
    let src = rig.tmp.path().join("board.json");
    fs::write(&src, "{}\n").expect("write source");

    psync(rig.tmp.path())
        .arg("--repo")
        .arg(&rig.clone)
        .args(["--json", "publish", "whiteboard.json", "--reason", " ", "--file"])
        .arg(&src)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\": \"failed\""));
    assert!(file_at_head(&rig.remote, "whiteboard.json").is_none());
}

#[test]
fn lock_status_reports_unlocked() {
    let rig = GitRig::new();
    psync(rig.tmp.path())
        .args(["lock", "status", "board"])
        .assert()
        .success()
        .stdout(predicate::str::contains("board: unlocked"));
}

#[test]
fn tick_unknown_resource_fails() {
    let rig = GitRig::new();
    psync(rig.tmp.path())
        .arg("--repo")
        .arg(&rig.clone)
        .args(["tick", "nope"])
        .assert()
        .code(1);
}

#[test]
fn publish_refuses_while_resource_is_locked() {
    let rig = GitRig::new();
    let work = rig.tmp.path();
    let config = work.join("psync.toml");
    fs::write(&config, "[resources.board]\npath = \"whiteboard.json\"\n").expect("write config");
    let src = work.join("board.json");
    fs::write(&src, "{\"content\":\"cli\"}\n").expect("write source");

    let locks = LockManager::new(work.join("data").join("locks"), DEFAULT_STALE_AFTER, "pool-actor");
    let held = locks.acquire("board").expect("hold board");

    let publish = || {
        let mut cmd = psync(work);
        cmd.arg("--repo")
            .arg(&rig.clone)
            .arg("--config")
            .arg(&config)
            .args(["publish", "whiteboard.json", "--reason", "cli write", "--file"])
            .arg(&src);
        cmd
    };
    publish()
        .assert()
        .code(1)
        .stdout(predicate::str::contains("board: locked by pool-actor"));
    assert!(file_at_head(&rig.remote, "whiteboard.json").is_none());

    drop(held);
    publish().assert().success();
    assert_eq!(
        file_at_head(&rig.remote, "whiteboard.json").as_deref(),
        Some(&b"{\"content\":\"cli\"}\n"[..])
    );
}
