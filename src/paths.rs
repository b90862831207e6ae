//! XDG directory helpers for config/data locations.

use std::cell::RefCell;
use std::path::PathBuf;

const APP_DIR: &str = "persona-sync";

/// Base directory for persistent data (locks, signal log, logs).
///
/// Uses `PSYNC_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/persona-sync` or
/// the platform data directory.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = thread_local_data_dir_override() {
        return dir;
    }

    if let Ok(dir) = std::env::var("PSYNC_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| fallback_home().join(".local").join("share"))
        .join(APP_DIR)
}

/// Base directory for configuration files.
///
/// Uses `PSYNC_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/persona-sync`
/// or the platform config directory.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PSYNC_CONFIG_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .unwrap_or_else(|| fallback_home().join(".config"))
        .join(APP_DIR)
}

fn fallback_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

pub fn locks_dir() -> PathBuf {
    data_dir().join("locks")
}

pub fn signal_log_path() -> PathBuf {
    data_dir().join("signals").join("push_signals.jsonl")
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

#[doc(hidden)]
pub struct DataDirOverride {
    prev: Option<PathBuf>,
}

impl DataDirOverride {
    pub fn new(path: Option<PathBuf>) -> Self {
        let prev = DATA_DIR_OVERRIDE.with(|cell| cell.replace(path));
        Self { prev }
    }
}

impl Drop for DataDirOverride {
    fn drop(&mut self) {
        let prev = self.prev.take();
        DATA_DIR_OVERRIDE.with(|cell| {
            cell.replace(prev);
        });
    }
}

/// Point `data_dir()` at `path` on this thread until the guard drops.
#[doc(hidden)]
pub fn override_data_dir_for_tests(path: Option<PathBuf>) -> DataDirOverride {
    DataDirOverride::new(path)
}

fn thread_local_data_dir_override() -> Option<PathBuf> {
    DATA_DIR_OVERRIDE.with(|cell| cell.borrow().clone())
}

thread_local! {
    static DATA_DIR_OVERRIDE: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}
