use std::path::PathBuf;
use std::time::Duration;

use persona_sync::git::{
    Git2Transport, Identity, PublishConfig, RemoteTransport, RetryPolicy, SafePushEngine,
};
use tempfile::TempDir;

use super::git::{BRANCH, init_bare_repo, init_repo_with_origin};

/// A bare remote plus one working clone, all under a temp dir.
pub struct GitRig {
    pub tmp: TempDir,
    pub remote: PathBuf,
    pub clone: PathBuf,
    pub signals: PathBuf,
}

impl GitRig {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let remote = tmp.path().join("remote.git");
        let clone = tmp.path().join("clone");
        init_bare_repo(&remote).expect("init remote");
        init_repo_with_origin(&clone, &remote).expect("init clone");
        let signals = tmp.path().join("signals").join("push_signals.jsonl");
        Self {
            tmp,
            remote,
            clone,
            signals,
        }
    }

    pub fn publish_config(&self, max_retries: u32) -> PublishConfig {
        PublishConfig {
            remote: "origin".into(),
            branch: BRANCH.into(),
            identity: Identity {
                name: "persona".into(),
                email: "persona@test.com".into(),
            },
            retry: RetryPolicy::immediate(max_retries),
            approval_required: vec!["value_constitution.yaml".into()],
            signal_log: self.signals.clone(),
        }
    }

    pub fn engine(&self) -> SafePushEngine {
        self.engine_with(Git2Transport::new(Duration::from_secs(10)), 2)
    }

    pub fn engine_with<T: RemoteTransport>(&self, transport: T, max_retries: u32) -> SafePushEngine<T> {
        SafePushEngine::new(&self.clone, self.publish_config(max_retries), transport)
    }
}
