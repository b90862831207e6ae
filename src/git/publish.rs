//! Safe push engine.
//!
//! One attempt is fetch → pick a base → compare → commit → push. Each
//! attempt rebuilds the change on top of whatever the remote holds at fetch
//! time, so a rejected push is retried by simply running another attempt.
//!
//! Invariants:
//! - The blob the caller's change was based on is captured once, before the
//!   first attempt. If the remote has since changed that path to anything
//!   other than the new content, the outcome is `Conflict` and nothing moves.
//! - Commits that only exist locally are replayed onto the remote head. A
//!   replay that does not apply cleanly is a `Conflict`.
//! - The local branch only moves to a commit that is being pushed, and is
//!   put back if the push fails.
//! - Signal-only publishes never move a ref.
//! - With a clone lock configured, every attempt and every refresh holds the
//!   clone's token file, so other processes sharing the clone wait their turn.
//! - A commit this call created that turns up on the remote (a push that
//!   timed out but still landed) is reported as pushed, not as a no-op.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use git2::build::{CheckoutBuilder, TreeUpdateBuilder};
use git2::{Commit, ErrorCode, FileMode, ObjectType, Oid, Repository, Signature, Sort};
use serde::{Deserialize, Serialize};

use super::error::PublishError;
use super::message::commit_message;
use super::retry::RetryPolicy;
use super::signal::{SignalLog, SignalRecord, SignalStatus};
use super::transport::{
    Git2Transport, RemoteTransport, branch_ref, refname_to_id_optional, tracking_ref,
};
use crate::core::{ContentHash, DocPath, Timestamp};
use crate::lock::{LockHandle, LockManager};
use crate::store::FsContentStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct PublishConfig {
    pub remote: String,
    pub branch: String,
    pub identity: Identity,
    pub retry: RetryPolicy,
    /// Path fragments that downgrade a live publish to a pending signal.
    pub approval_required: Vec<String>,
    pub signal_log: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    Live,
    SignalOnly,
}

#[derive(Clone, Debug, Serialize)]
pub struct PushAttempt {
    pub path: DocPath,
    pub content_hash: ContentHash,
    pub retries: u32,
    pub mode: PublishMode,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    Pushed { commit: String },
    Signaled { record: SignalRecord },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    Success { delivery: Delivery },
    NoOp,
    Conflict { detail: String },
    Failed { error: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct PushResult {
    pub outcome: PushOutcome,
    pub attempt: PushAttempt,
}

impl PushResult {
    /// True only when the remote actually received the change.
    pub fn is_published(&self) -> bool {
        matches!(
            self.outcome,
            PushOutcome::Success {
                delivery: Delivery::Pushed { .. }
            }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            PushOutcome::Failed { .. } | PushOutcome::Conflict { .. }
        )
    }

    pub fn retries(&self) -> u32 {
        self.attempt.retries
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    RemoteEmpty,
    UpToDate,
    FastForwarded { to: String },
    LocalAhead,
    Diverged,
}

struct Request<'a> {
    path: &'a DocPath,
    content: &'a [u8],
    author: &'a str,
    reason: &'a str,
    mode: PublishMode,
    status: SignalStatus,
}

enum Base {
    Commit(Option<Oid>),
    Diverged { local: Oid, remote: Oid },
}

pub struct SafePushEngine<T = Git2Transport> {
    repo_path: PathBuf,
    config: PublishConfig,
    transport: T,
    signals: SignalLog,
    /// Serializes ref and worktree updates between actors sharing the clone.
    repo_guard: Mutex<()>,
    clone_lock: Option<LockManager>,
}

impl<T: RemoteTransport> SafePushEngine<T> {
    pub fn new(repo_path: impl Into<PathBuf>, config: PublishConfig, transport: T) -> Self {
        let signals = SignalLog::new(config.signal_log.clone());
        Self {
            repo_path: repo_path.into(),
            config,
            transport,
            signals,
            repo_guard: Mutex::new(()),
            clone_lock: None,
        }
    }

    /// Guard ref and worktree updates with a token file in `locks`, visible
    /// to every process that shares the lock directory.
    pub fn with_clone_lock(mut self, locks: LockManager) -> Self {
        self.clone_lock = Some(locks);
        self
    }

    /// Name of the clone's token in the lock directory.
    pub fn clone_lock_name(&self) -> String {
        format!("clone-{}", self.repo_path.display())
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    pub fn signal_log(&self) -> &SignalLog {
        &self.signals
    }

    /// The durable replica as seen through the working tree.
    pub fn durable_store(&self) -> FsContentStore {
        FsContentStore::new(&self.repo_path)
    }

    pub fn publish(&self, path: &DocPath, content: &[u8], author: &str, reason: &str) -> PushResult {
        self.publish_with(path, content, author, reason, PublishMode::Live)
    }

    pub fn signal_only(
        &self,
        path: &DocPath,
        content: &[u8],
        author: &str,
        reason: &str,
    ) -> PushResult {
        self.publish_with(path, content, author, reason, PublishMode::SignalOnly)
    }

    pub fn publish_with(
        &self,
        path: &DocPath,
        content: &[u8],
        author: &str,
        reason: &str,
        mode: PublishMode,
    ) -> PushResult {
        let _repo = self.lock_repo();
        let (mode, status) = self.effective_mode(path, mode);
        let span = tracing::info_span!("publish", path = %path, mode = ?mode);
        let _guard = span.enter();

        let mut attempt = PushAttempt {
            path: path.clone(),
            content_hash: ContentHash::of_bytes(content),
            retries: 0,
            mode,
        };
        let request = Request {
            path,
            content,
            author,
            reason,
            mode,
            status,
        };
        let outcome = match self.run(&request, &mut attempt) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    retries = attempt.retries,
                    effect = err.effect().as_str(),
                    error = %err,
                    "publish failed"
                );
                let error = if attempt.retries > 0 {
                    format!("gave up after {} retries: {err}", attempt.retries)
                } else {
                    err.to_string()
                };
                PushOutcome::Failed { error }
            }
        };
        PushResult { outcome, attempt }
    }

    /// Fetch and fast-forward the local branch and working tree.
    pub fn refresh(&self) -> Result<RefreshOutcome, PublishError> {
        let _repo = self.lock_repo();
        let _clone = self.lock_clone()?;
        let repo = self.open_repo()?;
        let remote_head =
            self.transport
                .fetch(&self.repo_path, &self.config.remote, &self.config.branch)?;
        let local_head = refname_to_id_optional(&repo, &branch_ref(&self.config.branch))?;
        let Some(remote) = remote_head else {
            return Ok(RefreshOutcome::RemoteEmpty);
        };
        let outcome = match local_head {
            Some(local) if local == remote => RefreshOutcome::UpToDate,
            Some(local) if repo.graph_descendant_of(local, remote)? => RefreshOutcome::LocalAhead,
            Some(local) if !repo.graph_descendant_of(remote, local)? => RefreshOutcome::Diverged,
            _ => {
                self.fast_forward_local(&repo, local_head, remote)?;
                RefreshOutcome::FastForwarded {
                    to: remote.to_string(),
                }
            }
        };
        tracing::debug!(outcome = ?outcome, "refresh");
        Ok(outcome)
    }

    fn lock_repo(&self) -> MutexGuard<'_, ()> {
        self.repo_guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_clone(&self) -> Result<Option<LockHandle>, PublishError> {
        match &self.clone_lock {
            Some(locks) => Ok(Some(locks.acquire(&self.clone_lock_name())?)),
            None => Ok(None),
        }
    }

    fn effective_mode(&self, path: &DocPath, mode: PublishMode) -> (PublishMode, SignalStatus) {
        let needs_approval = self
            .config
            .approval_required
            .iter()
            .any(|fragment| !fragment.is_empty() && path.as_str().contains(fragment.as_str()));
        match mode {
            PublishMode::Live if needs_approval => {
                tracing::info!(path = %path, "path requires approval; recording intent only");
                (PublishMode::SignalOnly, SignalStatus::PendingApproval)
            }
            mode => (mode, SignalStatus::LoggedOnly),
        }
    }

    fn open_repo(&self) -> Result<Repository, PublishError> {
        let repo = Repository::open(&self.repo_path)
            .map_err(|e| PublishError::OpenRepo(self.repo_path.clone(), e))?;
        if repo.workdir().is_none() {
            return Err(PublishError::BareRepo(self.repo_path.clone()));
        }
        Ok(repo)
    }

    fn run(&self, req: &Request<'_>, attempt: &mut PushAttempt) -> Result<PushOutcome, PublishError> {
        if req.reason.trim().is_empty() {
            return Err(PublishError::EmptyReason);
        }
        let repo = self.open_repo()?;
        let base_blob = match refname_to_id_optional(&repo, &branch_ref(&self.config.branch))? {
            Some(head) => blob_at_commit(&repo, head, req.path)?,
            None => None,
        };

        let mut created = Vec::new();
        loop {
            let started = Instant::now();
            let result = self
                .lock_clone()
                .and_then(|_clone| self.attempt_once(&repo, req, base_blob, &mut created));
            match result {
                Ok(outcome) => {
                    tracing::info!(
                        retries = attempt.retries,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        outcome = outcome_label(&outcome),
                        "publish finished"
                    );
                    return Ok(outcome);
                }
                Err(err)
                    if err.transience().is_retryable()
                        && self.config.retry.allows(attempt.retries) =>
                {
                    attempt.retries += 1;
                    let delay = self.config.retry.delay_for(attempt.retries);
                    tracing::warn!(
                        retry = attempt.retries,
                        max_retries = self.config.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "publish attempt failed; retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn attempt_once(
        &self,
        repo: &Repository,
        req: &Request<'_>,
        base_blob: Option<Oid>,
        created: &mut Vec<Oid>,
    ) -> Result<PushOutcome, PublishError> {
        let remote_head =
            self.transport
                .fetch(&self.repo_path, &self.config.remote, &self.config.branch)?;
        let local_head = refname_to_id_optional(repo, &branch_ref(&self.config.branch))?;

        if let Some(remote) = remote_head
            && let Some(commit) = landed(repo, remote, created)?
        {
            tracing::info!(commit = %commit, "earlier push attempt reached the remote");
            self.fast_forward_local(repo, local_head, remote)?;
            return Ok(PushOutcome::Success {
                delivery: Delivery::Pushed {
                    commit: commit.to_string(),
                },
            });
        }

        let parent = match resolve_base(repo, local_head, remote_head)? {
            Base::Commit(parent) => parent,
            Base::Diverged { local, remote } => match replay_local(repo, local, remote)? {
                Some(replayed) => {
                    tracing::info!(onto = %remote, head = %replayed, "replayed local commits onto remote head");
                    Some(replayed)
                }
                None => {
                    return Ok(self.conflict(format!(
                        "local commits on {} do not apply cleanly onto {}/{}",
                        self.config.branch, self.config.remote, self.config.branch
                    )));
                }
            },
        };

        let new_blob = Oid::hash_object(ObjectType::Blob, req.content)?;
        if let Some(remote) = remote_head {
            let remote_blob = blob_at_commit(repo, remote, req.path)?;
            if remote_blob != base_blob && remote_blob != Some(new_blob) {
                return Ok(self.conflict(format!(
                    "{} changed on {}/{} since this change was prepared",
                    req.path, self.config.remote, self.config.branch
                )));
            }
        }

        let parent_blob = match parent {
            Some(parent) => blob_at_commit(repo, parent, req.path)?,
            None => None,
        };
        if parent_blob == Some(new_blob) && parent == remote_head {
            if req.mode == PublishMode::Live
                && let Some(remote) = remote_head
            {
                self.fast_forward_local(repo, local_head, remote)?;
            }
            return Ok(PushOutcome::NoOp);
        }

        if req.mode == PublishMode::SignalOnly {
            let record = SignalRecord {
                signal_type: "push_intent".to_string(),
                path: req.path.clone(),
                content_hash: ContentHash::of_bytes(req.content),
                author: req.author.to_string(),
                reason: req.reason.to_string(),
                branch: self.config.branch.clone(),
                base_commit: parent.map(|oid| oid.to_string()),
                status: req.status,
                created_at: Timestamp::now().to_rfc3339(),
            };
            self.signals
                .append(&record)
                .map_err(|source| PublishError::SignalLog {
                    path: self.signals.path().to_path_buf(),
                    source,
                })?;
            return Ok(PushOutcome::Success {
                delivery: Delivery::Signaled { record },
            });
        }

        // Local commits already carry the content; push them as they are.
        let commit = match parent {
            Some(parent) if parent_blob == Some(new_blob) => parent,
            _ => self.commit_change(repo, parent, parent_blob, req)?,
        };
        if let Err(err) = self.push_commit(repo, local_head, commit, remote_head) {
            created.push(commit);
            return Err(err);
        }
        Ok(PushOutcome::Success {
            delivery: Delivery::Pushed {
                commit: commit.to_string(),
            },
        })
    }

    fn conflict(&self, detail: String) -> PushOutcome {
        tracing::warn!(detail = %detail, "publish conflict");
        PushOutcome::Conflict { detail }
    }

    fn commit_change(
        &self,
        repo: &Repository,
        parent: Option<Oid>,
        parent_blob: Option<Oid>,
        req: &Request<'_>,
    ) -> Result<Oid, PublishError> {
        let blob = repo.blob(req.content)?;
        let parent_commit = parent.map(|oid| repo.find_commit(oid)).transpose()?;
        let base_tree = match &parent_commit {
            Some(commit) => commit.tree()?,
            None => repo.find_tree(repo.treebuilder(None)?.write()?)?,
        };
        let mut update = TreeUpdateBuilder::new();
        update.upsert(req.path.as_str(), blob, FileMode::Blob);
        let tree = repo.find_tree(update.create_updated(repo, &base_tree)?)?;

        let before = parent_blob
            .map(|oid| repo.find_blob(oid).map(|b| b.content().to_vec()))
            .transpose()?;
        let message = commit_message(
            req.author,
            req.reason,
            req.path,
            before.as_deref(),
            req.content,
        );
        let sig = Signature::now(&self.config.identity.name, &self.config.identity.email)?;
        let parents: Vec<&Commit<'_>> = parent_commit.iter().collect();
        let oid = repo.commit(None, &sig, &sig, &message, &tree, &parents)?;
        tracing::debug!(commit = %oid, parent = ?parent, "created commit");
        Ok(oid)
    }

    fn push_commit(
        &self,
        repo: &Repository,
        local_head: Option<Oid>,
        commit: Oid,
        remote_head: Option<Oid>,
    ) -> Result<(), PublishError> {
        let refname = branch_ref(&self.config.branch);
        repo.reference(&refname, commit, true, "psync: publish")?;
        if let Err(err) =
            self.transport
                .push(&self.repo_path, &self.config.remote, &self.config.branch, remote_head)
        {
            restore_local(repo, &refname, local_head, commit);
            return Err(err.into());
        }
        repo.reference(
            &tracking_ref(&self.config.remote, &self.config.branch),
            commit,
            true,
            "psync: publish",
        )?;
        self.sync_worktree(repo)
    }

    /// Move the local branch forward to `target` if that is a fast-forward.
    fn fast_forward_local(
        &self,
        repo: &Repository,
        local_head: Option<Oid>,
        target: Oid,
    ) -> Result<(), PublishError> {
        match local_head {
            Some(local) if local == target => return Ok(()),
            Some(local) if !repo.graph_descendant_of(target, local)? => return Ok(()),
            _ => {}
        }
        repo.reference(
            &branch_ref(&self.config.branch),
            target,
            true,
            "psync: fast-forward",
        )?;
        self.sync_worktree(repo)
    }

    /// Check out the branch head into the working tree, if HEAD is on the
    /// branch (or unborn, in which case HEAD is pointed at the branch).
    fn sync_worktree(&self, repo: &Repository) -> Result<(), PublishError> {
        let refname = branch_ref(&self.config.branch);
        let head_target = repo
            .find_reference("HEAD")?
            .symbolic_target()
            .map(str::to_owned);
        let unborn = matches!(repo.head(), Err(ref e) if e.code() == ErrorCode::UnbornBranch);
        match head_target {
            Some(target) if target == refname => {}
            Some(_) if unborn => repo.set_head(&refname)?,
            _ => {
                tracing::warn!(
                    branch = %self.config.branch,
                    "HEAD is not on the publish branch; working tree left as is"
                );
                return Ok(());
            }
        }
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_head(Some(&mut checkout))?;
        Ok(())
    }
}

impl SafePushEngine<Git2Transport> {
    pub fn with_git2(
        repo_path: impl Into<PathBuf>,
        config: PublishConfig,
        timeout: std::time::Duration,
    ) -> Self {
        Self::new(repo_path, config, Git2Transport::new(timeout))
    }
}

fn outcome_label(outcome: &PushOutcome) -> &'static str {
    match outcome {
        PushOutcome::Success {
            delivery: Delivery::Pushed { .. },
        } => "pushed",
        PushOutcome::Success {
            delivery: Delivery::Signaled { .. },
        } => "signaled",
        PushOutcome::NoOp => "no_op",
        PushOutcome::Conflict { .. } => "conflict",
        PushOutcome::Failed { .. } => "failed",
    }
}

fn resolve_base(
    repo: &Repository,
    local: Option<Oid>,
    remote: Option<Oid>,
) -> Result<Base, git2::Error> {
    Ok(match (local, remote) {
        (None, remote) => Base::Commit(remote),
        (Some(local), None) => Base::Commit(Some(local)),
        (Some(local), Some(remote)) if local == remote => Base::Commit(Some(remote)),
        (Some(local), Some(remote)) => {
            if repo.graph_descendant_of(local, remote)? {
                Base::Commit(Some(local))
            } else if repo.graph_descendant_of(remote, local)? {
                Base::Commit(Some(remote))
            } else {
                Base::Diverged { local, remote }
            }
        }
    })
}

/// Cherry-pick the commits only `local` has onto `onto`. Returns `None` when
/// a commit conflicts or is a merge.
fn replay_local(repo: &Repository, local: Oid, onto: Oid) -> Result<Option<Oid>, git2::Error> {
    let mut walk = repo.revwalk()?;
    walk.push(local)?;
    walk.hide(onto)?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

    let mut head = repo.find_commit(onto)?;
    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        if commit.parent_count() > 1 {
            return Ok(None);
        }
        let mut index = repo.cherrypick_commit(&commit, &head, 0, None)?;
        if index.has_conflicts() {
            return Ok(None);
        }
        let tree = repo.find_tree(index.write_tree_to(repo)?)?;
        let message = String::from_utf8_lossy(commit.message_bytes()).into_owned();
        let replayed = repo.commit(
            None,
            &commit.author(),
            &commit.committer(),
            &message,
            &tree,
            &[&head],
        )?;
        head = repo.find_commit(replayed)?;
    }
    Ok(Some(head.id()))
}

/// The first of `created` that `remote` is or descends from.
fn landed(repo: &Repository, remote: Oid, created: &[Oid]) -> Result<Option<Oid>, git2::Error> {
    for &commit in created {
        if commit == remote || repo.graph_descendant_of(remote, commit)? {
            return Ok(Some(commit));
        }
    }
    Ok(None)
}

fn restore_local(repo: &Repository, refname: &str, previous: Option<Oid>, ours: Oid) {
    match refname_to_id_optional(repo, refname) {
        Ok(Some(current)) if current == ours => {}
        _ => return,
    }
    let result = match previous {
        Some(prev) => repo
            .reference(refname, prev, true, "psync: push rejected")
            .map(|_| ()),
        None => repo
            .find_reference(refname)
            .and_then(|mut reference| reference.delete()),
    };
    if let Err(err) = result {
        tracing::warn!(refname, error = %err, "failed to restore local branch after rejected push");
    }
}

fn blob_at_commit(
    repo: &Repository,
    commit: Oid,
    path: &DocPath,
) -> Result<Option<Oid>, git2::Error> {
    let tree = repo.find_commit(commit)?.tree()?;
    match tree.get_path(Path::new(path.as_str())) {
        Ok(entry) if entry.kind() == Some(ObjectType::Blob) => Ok(Some(entry.id())),
        Ok(_) => Ok(None),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
