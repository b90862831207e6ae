//! Push intent log for signal-only publishes.
//!
//! One JSON object per line. Nothing here touches the repository.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{ContentHash, DocPath};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// Recorded for audit; a later actor may publish it.
    LoggedOnly,
    /// The path needs approval before a live publish.
    PendingApproval,
}

impl SignalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalStatus::LoggedOnly => "logged_only",
            SignalStatus::PendingApproval => "pending_approval",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal_type: String,
    pub path: DocPath,
    pub content_hash: ContentHash,
    pub author: String,
    pub reason: String,
    pub branch: String,
    /// Commit the change would have been built on.
    pub base_commit: Option<String>,
    pub status: SignalStatus,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct SignalLog {
    path: PathBuf,
}

impl SignalLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &SignalRecord) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.sync_data()
    }

    /// All records, oldest first. Malformed lines are skipped.
    pub fn read_all(&self) -> io::Result<Vec<SignalRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
