//! Time primitives.
//!
//! `Timestamp` is the instant embedded in a document and the only thing the
//! reconciler orders by. `WallClock` is a plain millisecond reading used for
//! lock ages; it never orders documents.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const NAIVE_ISO: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const NAIVE_ISO_FRACTIONAL: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
const NAIVE_ISO_SPACED: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const COMPACT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");
const COMPACT_ZULU: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unparseable timestamp {raw:?}")]
pub struct TimestampError {
    pub raw: String,
}

/// A parsed document timestamp, normalized to UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Parse any of the accepted document timestamp forms.
    ///
    /// RFC 3339 is tried first; offset-less ISO and compact file-name stamps
    /// are read as UTC.
    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        let trimmed = raw.trim();
        if let Ok(at) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            return Ok(Self(at.to_offset(UtcOffset::UTC)));
        }
        for format in [
            NAIVE_ISO,
            NAIVE_ISO_FRACTIONAL,
            NAIVE_ISO_SPACED,
            COMPACT,
            COMPACT_ZULU,
        ] {
            if let Ok(at) = PrimitiveDateTime::parse(trimmed, format) {
                return Ok(Self(at.assume_utc()));
            }
        }
        Err(TimestampError {
            raw: raw.to_string(),
        })
    }

    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn from_offset(at: OffsetDateTime) -> Self {
        Self(at.to_offset(UtcOffset::UTC))
    }

    pub fn as_offset(&self) -> OffsetDateTime {
        self.0
    }

    pub fn to_rfc3339(&self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }

    /// `YYYYMMDD_HHMMSS`, the stamp used in stream file names.
    pub fn compact(&self) -> String {
        self.0
            .format(COMPACT)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Wall clock reading in milliseconds since the epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WallClock(pub u64);

impl WallClock {
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn saturating_elapsed_since(self, earlier: WallClock) -> std::time::Duration {
        std::time::Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}
