//! Publishing documents to a git remote.
//!
//! Provides:
//! - `RemoteTransport` capability with a libgit2 implementation
//! - `SafePushEngine`: fetch, compare, commit and push with bounded retries
//! - Signal-only publishing into an append-only intent log

pub mod error;
pub mod message;
pub mod publish;
pub mod retry;
pub mod signal;
pub mod transport;

pub use error::{PublishError, TransportError};
pub use message::{commit_message, diff_summary};
pub use publish::{
    Delivery, Identity, PublishConfig, PublishMode, PushAttempt, PushOutcome, PushResult,
    RefreshOutcome, SafePushEngine,
};
pub use retry::RetryPolicy;
pub use signal::{SignalLog, SignalRecord, SignalStatus};
pub use transport::{DEFAULT_REMOTE_TIMEOUT, Git2Transport, RemoteTransport, branch_ref, tracking_ref};
