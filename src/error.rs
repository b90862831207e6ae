use thiserror::Error;

use crate::config::ConfigError;
use crate::core::DocumentError;
use crate::git::{PublishError, TransportError};
use crate::lock::LockError;
use crate::store::StoreError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred (locally or remotely).
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// A thin wrapper over the capability errors of each layer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Document(e) => e.transience(),
            Error::Store(e) => e.transience(),
            Error::Lock(e) => e.transience(),
            Error::Publish(e) => e.transience(),
            Error::Transport(e) => e.transience(),
            Error::Config(_) | Error::Json(_) => Transience::Permanent,
            Error::Io(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Publish(e) => e.effect(),
            Error::Transport(e) => e.effect(),
            Error::Store(_) | Error::Io(_) => Effect::Unknown,
            Error::Document(_) | Error::Lock(_) | Error::Config(_) | Error::Json(_) => {
                Effect::None
            }
        }
    }
}
