//! Core domain types.
//!
//! - time: document timestamps and wall clock readings
//! - hash: content addressing
//! - document: paths, documents, stream keys

pub mod document;
pub mod hash;
pub mod time;

pub use document::{DocPath, Document, DocumentError, DocumentFormat, StreamKey};
pub use hash::ContentHash;
pub use time::{Timestamp, TimestampError, WallClock};
