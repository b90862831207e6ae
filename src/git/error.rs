//! Git publish error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::error::{Effect, Transience};
use crate::lock::LockError;

/// Errors raised by a remote transport.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("remote {remote} unreachable: {message}")]
    Unreachable { remote: String, message: String },

    #[error("remote {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("push rejected (non-fast-forward) for {refname}")]
    NonFastForward { refname: String },

    #[error("push rejected: {message}")]
    Rejected { message: String },

    #[error("transport worker failed: {0}")]
    Worker(String),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl TransportError {
    pub fn transience(&self) -> Transience {
        match self {
            TransportError::Unreachable { .. }
            | TransportError::Timeout { .. }
            | TransportError::NonFastForward { .. } => Transience::Retryable,
            TransportError::Rejected { .. } => Transience::Permanent,
            TransportError::Worker(_) | TransportError::Git(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            // Rejections and connect failures leave the remote untouched.
            TransportError::Unreachable { .. }
            | TransportError::NonFastForward { .. }
            | TransportError::Rejected { .. } => Effect::None,
            TransportError::Timeout { .. }
            | TransportError::Worker(_)
            | TransportError::Git(_) => Effect::Unknown,
        }
    }
}

/// Errors that end a single publish attempt.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PublishError {
    #[error("publish reason must not be empty")]
    EmptyReason,

    #[error("failed to open repository at {0:?}: {1}")]
    OpenRepo(PathBuf, #[source] git2::Error),

    #[error("repository at {0:?} has no working tree")]
    BareRepo(PathBuf),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to append signal record to {path:?}: {source}")]
    SignalLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl PublishError {
    pub fn transience(&self) -> Transience {
        match self {
            PublishError::Transport(e) => e.transience(),
            PublishError::Lock(e) => e.transience(),
            PublishError::Git(e) if e.code() == git2::ErrorCode::Locked => Transience::Retryable,
            PublishError::SignalLog { .. } => Transience::Unknown,
            PublishError::EmptyReason
            | PublishError::OpenRepo(_, _)
            | PublishError::BareRepo(_)
            | PublishError::Git(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            PublishError::Transport(e) => e.effect(),
            PublishError::Lock(LockError::Held { .. }) => Effect::None,
            PublishError::Lock(_) => Effect::Unknown,
            PublishError::Git(_) | PublishError::SignalLog { .. } => Effect::Unknown,
            PublishError::EmptyReason | PublishError::OpenRepo(_, _) | PublishError::BareRepo(_) => {
                Effect::None
            }
        }
    }
}
