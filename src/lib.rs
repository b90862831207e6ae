#![forbid(unsafe_code)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod core;
pub mod daemon;
pub mod error;
pub mod gate;
pub mod git;
pub mod lock;
pub mod paths;
pub mod reconcile;
pub mod store;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

pub use crate::core::{DocPath, Document, StreamKey, Timestamp};
