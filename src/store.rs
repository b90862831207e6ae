//! Flat-file content store.
//!
//! Documents live at `root/<doc path>`. Writes go through a temp file in the
//! target directory and are renamed into place, so readers never observe a
//! half-written document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::{DocPath, Document, DocumentError, StreamKey, Timestamp};
use crate::error::Transience;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to persist {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl StoreError {
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::Io { .. } | StoreError::Persist { .. } => Transience::Unknown,
            StoreError::Document(e) => e.transience(),
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Clone, Debug)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fs_path(&self, path: &DocPath) -> PathBuf {
        path.to_fs_path(&self.root)
    }

    pub fn load(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let fs_path = self.fs_path(path);
        let bytes = match fs::read(&fs_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&fs_path)(err)),
        };
        Ok(Some(Document::decode(path.clone(), &bytes)?))
    }

    pub fn write(&self, doc: &Document) -> Result<(), StoreError> {
        let target = self.fs_path(doc.path());
        let dir = target.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err(&dir))?;
        temp.write_all(&doc.encode()).map_err(io_err(&target))?;
        temp.as_file().sync_all().map_err(io_err(&target))?;
        temp.persist(&target).map_err(|source| StoreError::Persist {
            path: target.clone(),
            source,
        })?;
        tracing::trace!(path = %doc.path(), "document written");
        Ok(())
    }

    pub fn remove(&self, path: &DocPath) -> Result<(), StoreError> {
        let fs_path = self.fs_path(path);
        match fs::remove_file(&fs_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&fs_path)(err)),
        }
    }

    /// Files directly under `dir`, sorted. A missing directory is empty.
    pub fn list(&self, dir: &DocPath) -> Result<Vec<DocPath>, StoreError> {
        let fs_dir = self.fs_path(dir);
        let entries = match fs::read_dir(&fs_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(&fs_dir)(err)),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&fs_dir))?;
            let file_type = entry.file_type().map_err(io_err(&fs_dir))?;
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            out.push(dir.join(&name)?);
        }
        out.sort();
        Ok(out)
    }

    /// Most recent document in `dir` belonging to `key`.
    ///
    /// Documents with a parseable timestamp rank above those without; ties
    /// fall back to the file name. Undecodable files are skipped.
    pub fn latest_in_stream(
        &self,
        dir: &DocPath,
        key: &StreamKey,
    ) -> Result<Option<Document>, StoreError> {
        self.latest_matching(dir, |doc| &doc.stream_key() == key)
    }

    /// Most recent document in `dir` regardless of owner or category.
    pub fn latest_in_dir(&self, dir: &DocPath) -> Result<Option<Document>, StoreError> {
        self.latest_matching(dir, |_| true)
    }

    fn latest_matching(
        &self,
        dir: &DocPath,
        keep: impl Fn(&Document) -> bool,
    ) -> Result<Option<Document>, StoreError> {
        let mut best: Option<(Option<Timestamp>, Document)> = None;
        for path in self.list(dir)? {
            let doc = match self.load(&path) {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(StoreError::Document(err)) => {
                    tracing::debug!(path = %path, error = %err, "skipping undecodable stream entry");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if !keep(&doc) {
                continue;
            }
            let at = doc.parsed_timestamp().and_then(Result::ok);
            let replace = match &best {
                None => true,
                Some((best_at, best_doc)) => {
                    (at, doc.path()) > (*best_at, best_doc.path())
                }
            };
            if replace {
                best = Some((at, doc));
            }
        }
        Ok(best.map(|(_, doc)| doc))
    }
}

/// `<dir>/<owner>_<YYYYMMDD_HHMMSS>.json` for a stream entry.
pub fn stream_entry_path(
    dir: &DocPath,
    owner: Option<&str>,
    at: Timestamp,
) -> Result<DocPath, DocumentError> {
    let owner: String = owner
        .unwrap_or("anon")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(&format!("{owner}_{}.json", at.compact()))
}
