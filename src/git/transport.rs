//! Remote transport capability.
//!
//! The publish engine only ever talks to the remote through
//! [`RemoteTransport`], so retry and conflict handling can be exercised
//! against a scripted remote.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use git2::{ErrorCode, Oid, Repository};

use super::error::TransportError;

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

pub trait RemoteTransport: Send + Sync {
    /// Fetch `branch` into `refs/remotes/<remote>/<branch>` and return the
    /// remote head, or `None` when the remote has no such branch.
    fn fetch(&self, repo_path: &Path, remote: &str, branch: &str)
    -> Result<Option<Oid>, TransportError>;

    /// Push the local `branch`. Refuses with `NonFastForward` unless the
    /// remote head still equals `expected`.
    fn push(
        &self,
        repo_path: &Path,
        remote: &str,
        branch: &str,
        expected: Option<Oid>,
    ) -> Result<(), TransportError>;
}

pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

pub fn tracking_ref(remote: &str, branch: &str) -> String {
    format!("refs/remotes/{remote}/{branch}")
}

/// libgit2-backed transport. Each operation runs on its own thread with its
/// own repository handle and is abandoned after `timeout`.
#[derive(Clone, Debug)]
pub struct Git2Transport {
    timeout: Duration,
}

impl Default for Git2Transport {
    fn default() -> Self {
        Self::new(DEFAULT_REMOTE_TIMEOUT)
    }
}

impl Git2Transport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl RemoteTransport for Git2Transport {
    fn fetch(
        &self,
        repo_path: &Path,
        remote: &str,
        branch: &str,
    ) -> Result<Option<Oid>, TransportError> {
        let (repo_path, remote, branch) = owned(repo_path, remote, branch);
        run_bounded("fetch", self.timeout, move || {
            fetch_blocking(&repo_path, &remote, &branch)
        })
    }

    fn push(
        &self,
        repo_path: &Path,
        remote: &str,
        branch: &str,
        expected: Option<Oid>,
    ) -> Result<(), TransportError> {
        let (repo_path, remote, branch) = owned(repo_path, remote, branch);
        run_bounded("push", self.timeout, move || {
            push_blocking(&repo_path, &remote, &branch, expected)
        })
    }
}

fn owned(repo_path: &Path, remote: &str, branch: &str) -> (PathBuf, String, String) {
    (repo_path.to_path_buf(), remote.to_string(), branch.to_string())
}

/// Run `op` on a helper thread and wait at most `timeout` for it. A thread
/// that overruns is left to finish on its own; its result is discarded.
pub(crate) fn run_bounded<T, F>(
    op: &'static str,
    timeout: Duration,
    f: F,
) -> Result<T, TransportError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
{
    let (tx, rx) = channel::bounded(1);
    std::thread::Builder::new()
        .name(format!("psync-{op}"))
        .spawn(move || {
            let _ = tx.send(f());
        })
        .map_err(|e| TransportError::Worker(e.to_string()))?;
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(op, timeout_ms = timeout.as_millis() as u64, "remote operation timed out");
            Err(TransportError::Timeout { op, after: timeout })
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(TransportError::Worker(format!("{op} worker exited without a result")))
        }
    }
}

fn remote_callbacks<'a>(repo: &Repository) -> git2::RemoteCallbacks<'a> {
    let cfg = repo.config().ok();
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        if allowed.is_ssh_key()
            && let Some(user) = username_from_url
        {
            return git2::Cred::ssh_key_from_agent(user);
        }
        if allowed.is_user_pass_plaintext()
            && let Some(ref cfg) = cfg
            && let Ok(cred) = git2::Cred::credential_helper(cfg, url, username_from_url)
        {
            return Ok(cred);
        }
        git2::Cred::default()
    });
    callbacks
}

fn unreachable(remote: &str) -> impl FnOnce(git2::Error) -> TransportError + '_ {
    move |err| TransportError::Unreachable {
        remote: remote.to_string(),
        message: err.message().to_string(),
    }
}

fn fetch_blocking(
    repo_path: &Path,
    remote_name: &str,
    branch: &str,
) -> Result<Option<Oid>, TransportError> {
    let repo = Repository::open(repo_path)?;
    let mut remote = repo
        .find_remote(remote_name)
        .map_err(unreachable(remote_name))?;
    let refname = branch_ref(branch);
    let tracking = tracking_ref(remote_name, branch);

    // The fetch recreates the tracking ref only if the remote has the branch.
    let previous = refname_to_id_optional(&repo, &tracking)?;
    if previous.is_some() {
        repo.find_reference(&tracking)?.delete()?;
    }

    let mut fo = git2::FetchOptions::new();
    fo.remote_callbacks(remote_callbacks(&repo));
    fo.prune(git2::FetchPrune::On);
    let refspec = format!("+{refname}:{tracking}");
    if let Err(err) = remote.fetch(&[refspec.as_str()], Some(&mut fo), None) {
        if let Some(oid) = previous
            && let Err(restore) = repo.reference(&tracking, oid, true, "psync: fetch failed")
        {
            tracing::warn!(tracking = %tracking, error = %restore, "failed to restore tracking ref");
        }
        return Err(unreachable(remote_name)(err));
    }

    let head = refname_to_id_optional(&repo, &tracking)?;
    tracing::debug!(remote = remote_name, branch, head = ?head, "fetched");
    Ok(head)
}

fn push_blocking(
    repo_path: &Path,
    remote_name: &str,
    branch: &str,
    expected: Option<Oid>,
) -> Result<(), TransportError> {
    let repo = Repository::open(repo_path)?;
    let mut remote = repo
        .find_remote(remote_name)
        .map_err(unreachable(remote_name))?;
    let refname = branch_ref(branch);
    let refspec = format!("{refname}:{refname}");

    // `Some(current)` once negotiation saw the remote somewhere unexpected.
    let moved: RefCell<Option<Option<Oid>>> = RefCell::new(None);
    let push_error: RefCell<Option<String>> = RefCell::new(None);
    let pushed = {
        let mut callbacks = remote_callbacks(&repo);
        callbacks.push_negotiation(|updates| {
            for update in updates {
                if update.dst_refname() != Some(refname.as_str()) {
                    continue;
                }
                let current = Some(update.src()).filter(|oid| !oid.is_zero());
                if current != expected {
                    *moved.borrow_mut() = Some(current);
                    return Err(git2::Error::from_str("remote moved since fetch"));
                }
            }
            Ok(())
        });
        callbacks.push_update_reference(|_ref_name, status| {
            if let Some(msg) = status {
                *push_error.borrow_mut() = Some(msg.to_string());
            }
            Ok(())
        });
        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(callbacks);
        remote.push(&[refspec.as_str()], Some(&mut push_options))
    };

    if let Some(current) = moved.into_inner() {
        tracing::debug!(
            branch,
            expected = ?expected,
            current = ?current,
            "remote moved since fetch"
        );
        return Err(TransportError::NonFastForward { refname });
    }
    if let Err(e) = pushed {
        if is_non_fast_forward(e.message()) {
            return Err(TransportError::NonFastForward { refname });
        }
        return Err(unreachable(remote_name)(e));
    }
    if let Some(err) = push_error.into_inner() {
        if is_non_fast_forward(&err) {
            return Err(TransportError::NonFastForward { refname });
        }
        return Err(TransportError::Rejected { message: err });
    }
    Ok(())
}

pub(crate) fn refname_to_id_optional(
    repo: &Repository,
    name: &str,
) -> Result<Option<Oid>, git2::Error> {
    match repo.refname_to_id(name) {
        Ok(oid) => Ok(Some(oid)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_non_fast_forward(message: &str) -> bool {
    message.contains("non-fast-forward")
        || message.contains("fetch first")
        || message.contains("cannot lock ref")
        || message.contains("failed to update ref")
}
