//! File-visible resource locks.
//!
//! A lock is a token file `<dir>/<resource>.lock` created with `O_EXCL`.
//! Any process that can see the directory can check it by existence and age.
//! A token older than the staleness window is reclaimed by the next
//! `acquire`; the reclaim is logged.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::WallClock;
use crate::error::Transience;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub resource: String,
    pub holder: String,
    pub token: Uuid,
    pub pid: u32,
    pub hostname: String,
    pub acquired_at_ms: u64,
}

impl LockMeta {
    fn new(resource: &str, holder: &str) -> Self {
        Self {
            resource: resource.to_string(),
            holder: holder.to_string(),
            token: Uuid::new_v4(),
            pid: std::process::id(),
            hostname: hostname(),
            acquired_at_ms: WallClock::now().0,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LockError {
    #[error(
        "resource {resource} is locked by {} ({age_ms} ms old)",
        .holder.as_deref().unwrap_or("unknown holder")
    )]
    Held {
        resource: String,
        holder: Option<String>,
        age_ms: u64,
    },

    #[error("lock path is a symlink: {path:?}")]
    Symlink { path: PathBuf },

    #[error("lock io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    pub fn transience(&self) -> Transience {
        match self {
            LockError::Held { .. } => Transience::Retryable,
            LockError::Symlink { .. } => Transience::Permanent,
            LockError::Io { .. } => Transience::Unknown,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LockError + '_ {
    move |source| LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What a caller sees when it inspects a lock without taking it.
#[derive(Clone, Debug, Serialize)]
pub struct LockStatus {
    pub resource: String,
    pub path: PathBuf,
    pub meta: Option<LockMeta>,
    pub age_ms: u64,
    pub stale: bool,
}

#[derive(Clone, Debug)]
pub struct LockManager {
    dir: PathBuf,
    stale_after: Duration,
    holder: String,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>, stale_after: Duration, holder: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stale_after,
            holder: holder.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn lock_path(&self, resource: &str) -> PathBuf {
        let name: String = resource
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.lock"))
    }

    /// Take the lock, reclaiming it first if the current token is stale.
    pub fn acquire(&self, resource: &str) -> Result<LockHandle, LockError> {
        ensure_dir(&self.dir)?;
        let path = self.lock_path(resource);
        reject_symlink(&path)?;

        let mut reclaimed = false;
        loop {
            match open_new_lock_file(&path) {
                Ok(mut file) => {
                    let meta = LockMeta::new(resource, &self.holder);
                    fill_token(&path, || write_metadata(&mut file, &path, &meta))?;
                    tracing::debug!(resource, holder = %meta.holder, "lock acquired");
                    return Ok(LockHandle {
                        path,
                        meta,
                        released: false,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    let Some(current) = observe(&path)? else {
                        // Released between our create and our read.
                        continue;
                    };
                    let age = Duration::from_millis(current.age_ms);
                    if age < self.stale_after || reclaimed {
                        return Err(LockError::Held {
                            resource: resource.to_string(),
                            holder: current.meta.map(|m| m.holder),
                            age_ms: current.age_ms,
                        });
                    }
                    reclaim(resource, &path, &current)?;
                    tracing::warn!(
                        resource,
                        previous_holder = current
                            .meta
                            .as_ref()
                            .map(|m| m.holder.as_str())
                            .unwrap_or("unknown"),
                        age_ms = current.age_ms,
                        stale_after_ms = self.stale_after.as_millis() as u64,
                        "recovering stale lock"
                    );
                    reclaimed = true;
                }
                Err(err) => return Err(io_err(&path)(err)),
            }
        }
    }

    /// False when no token exists.
    pub fn is_stale(&self, resource: &str) -> Result<bool, LockError> {
        Ok(self.inspect(resource)?.is_some_and(|status| status.stale))
    }

    pub fn inspect(&self, resource: &str) -> Result<Option<LockStatus>, LockError> {
        let path = self.lock_path(resource);
        reject_symlink(&path)?;
        Ok(observe(&path)?.map(|current| LockStatus {
            resource: resource.to_string(),
            path: path.clone(),
            stale: Duration::from_millis(current.age_ms) >= self.stale_after,
            age_ms: current.age_ms,
            meta: current.meta,
        }))
    }

    /// Remove the token regardless of holder. Returns whether one existed.
    pub fn force_release(&self, resource: &str) -> Result<bool, LockError> {
        let path = self.lock_path(resource);
        reject_symlink(&path)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::warn!(resource, "lock force-released");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(&path)(err)),
        }
    }
}

/// A held lock. Released explicitly or on drop.
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    meta: LockMeta,
    released: bool,
}

impl LockHandle {
    pub fn meta(&self) -> &LockMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether the token on disk is still this handle's. False once released
    /// or after another acquirer displaced it.
    pub fn still_held(&self) -> Result<bool, LockError> {
        if self.released {
            return Ok(false);
        }
        Ok(observe(&self.path)?
            .and_then(|current| current.meta)
            .is_some_and(|meta| meta.token == self.meta.token))
    }

    /// Idempotent. A token that was reclaimed by someone else is left alone.
    pub fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        match observe(&self.path)? {
            Some(current) if current.meta.as_ref().map(|m| m.token) == Some(self.meta.token) => {
                match fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(io_err(&self.path)(err)),
                }
                tracing::debug!(resource = %self.meta.resource, "lock released");
            }
            Some(_) => {
                tracing::debug!(
                    resource = %self.meta.resource,
                    "lock was reclaimed by another holder; leaving it"
                );
            }
            None => {}
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if !self.released
            && let Err(err) = self.release()
        {
            tracing::warn!(path = ?self.path, error = %err, "failed to release lock on drop");
        }
    }
}

struct Observed {
    raw: Vec<u8>,
    meta: Option<LockMeta>,
    age_ms: u64,
}

fn observe(path: &Path) -> Result<Option<Observed>, LockError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path)(err)),
    };
    let meta: Option<LockMeta> = serde_json::from_slice(&raw).ok();
    let now = WallClock::now();
    let age_ms = match &meta {
        Some(meta) => now.0.saturating_sub(meta.acquired_at_ms),
        None => mtime_age_ms(path, now)?,
    };
    Ok(Some(Observed { raw, meta, age_ms }))
}

fn mtime_age_ms(path: &Path, now: WallClock) -> Result<u64, LockError> {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(io_err(path)(err)),
    };
    let modified_ms = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    Ok(now.0.saturating_sub(modified_ms))
}

/// Move the stale token aside and delete it. If what we moved is no longer
/// the token we judged stale, put it back and report it as held.
fn reclaim(resource: &str, path: &Path, stale: &Observed) -> Result<(), LockError> {
    let aside = path.with_extension(format!("lock.stale-{}", Uuid::new_v4().simple()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(io_err(path)(err)),
    }
    let moved = fs::read(&aside).map_err(io_err(&aside))?;
    if moved == stale.raw {
        return fs::remove_file(&aside).map_err(io_err(&aside));
    }
    // Lost a race with another reclaimer; its fresh token goes back.
    let restored = restore_token(resource, path, &aside, &moved);
    fs::remove_file(&aside).map_err(io_err(&aside))?;
    restored
}

/// Put a fresh token moved to `aside` back at `path`. Always `Held` for the
/// caller: either the token is back, or a third acquirer took `path` in the
/// meantime and the restored holder no longer owns the resource.
fn restore_token(resource: &str, path: &Path, aside: &Path, moved: &[u8]) -> Result<(), LockError> {
    let meta: Option<LockMeta> = serde_json::from_slice(moved).ok();
    match fs::hard_link(aside, path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            tracing::warn!(
                resource,
                displaced_holder = meta.as_ref().map(|m| m.holder.as_str()).unwrap_or("unknown"),
                "fresh lock token was displaced by a concurrent acquirer"
            );
        }
        Err(err) => return Err(io_err(path)(err)),
    }
    let age_ms = meta
        .as_ref()
        .map(|m| WallClock::now().0.saturating_sub(m.acquired_at_ms))
        .unwrap_or(0);
    Err(LockError::Held {
        resource: resource.to_string(),
        holder: meta.map(|m| m.holder),
        age_ms,
    })
}

/// Run `write` against a token that was just created. A token that could not
/// be filled is removed rather than left to block the resource until stale.
fn fill_token(path: &Path, write: impl FnOnce() -> Result<(), LockError>) -> Result<(), LockError> {
    let result = write();
    if result.is_err()
        && let Err(err) = fs::remove_file(path)
        && err.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = ?path, error = %err, "failed to remove unwritten lock token");
    }
    result
}

pub fn default_holder() -> String {
    format!("{}@{}:{}", whoami::username(), hostname(), std::process::id())
}

fn hostname() -> String {
    whoami::fallible::hostname().unwrap_or_else(|_| "unknown".into())
}

fn ensure_dir(path: &Path) -> Result<(), LockError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(LockError::Symlink {
            path: path.to_path_buf(),
        }),
        Ok(meta) if !meta.is_dir() => Err(LockError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "expected a directory"),
        }),
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(io_err(path))
        }
        Err(err) => Err(io_err(path)(err)),
    }
}

fn reject_symlink(path: &Path) -> Result<(), LockError> {
    if let Ok(meta) = fs::symlink_metadata(path)
        && meta.file_type().is_symlink()
    {
        return Err(LockError::Symlink {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn open_new_lock_file(path: &Path) -> io::Result<fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
    }
    #[cfg(not(unix))]
    {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
    }
}

fn write_metadata(file: &mut fs::File, path: &Path, meta: &LockMeta) -> Result<(), LockError> {
    serde_json::to_writer(&mut *file, meta).map_err(|err| io_err(path)(io::Error::other(err)))?;
    file.sync_all().map_err(io_err(path))
}
