//! Duplicate suppression.
//!
//! Equality is by content hash, which covers owner, category, content and
//! extension keys but not the timestamp. Re-saving identical content with a
//! fresh timestamp is therefore a duplicate.

use serde::Serialize;

use crate::core::{ContentHash, Document};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DedupVerdict {
    pub candidate: ContentHash,
    pub last: Option<ContentHash>,
    pub duplicate: bool,
}

impl DedupVerdict {
    pub fn check(candidate: &Document, last_persisted: Option<&Document>) -> Self {
        let candidate = candidate.content_hash();
        let last = last_persisted.map(Document::content_hash);
        Self {
            candidate,
            last,
            duplicate: last == Some(candidate),
        }
    }
}

pub fn is_duplicate(candidate: &Document, last_persisted: Option<&Document>) -> bool {
    DedupVerdict::check(candidate, last_persisted).duplicate
}
