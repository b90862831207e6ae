use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::merge::{apply_env_overrides, merge_layers};
use super::{Config, ConfigLayer};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{field} is not configured")]
    Missing { field: &'static str },

    #[error("unknown resource {0:?}")]
    UnknownResource(String),
}

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

pub fn repo_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join("persona-sync.toml")
}

pub fn discover_repo_root() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let repo = git2::Repository::discover(cwd).ok()?;
    repo.workdir().map(|path| path.to_path_buf())
}

/// Read one layer, or `None` if the file does not exist.
pub fn load_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn load_user_config() -> Result<Option<ConfigLayer>, ConfigError> {
    load_layer(&config_path())
}

pub fn load_repo_config(repo_root: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    load_layer(&repo_config_path(repo_root))
}

pub fn load() -> Result<Config, ConfigError> {
    load_for_repo(None, discover_repo_root().as_deref())
}

/// Defaults, then the user file (or `user_path`), then the repository file,
/// then `PSYNC_*` environment overrides.
pub fn load_for_repo(
    user_path: Option<&Path>,
    repo_root: Option<&Path>,
) -> Result<Config, ConfigError> {
    let user = match user_path {
        Some(path) => load_layer(path)?,
        None => load_user_config()?,
    };
    let repo = match repo_root {
        Some(root) => load_repo_config(root)?,
        None => None,
    };
    let mut config = merge_layers(user, repo);
    if config.repo.path.is_none() {
        config.repo.path = repo_root.map(Path::to_path_buf);
    }
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    let contents = toml::to_string_pretty(cfg)?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(data).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{LogFormat, LogRotation, ResourceConfig};
    use crate::core::DocPath;
    use crate::git::PublishMode;
    use crate::reconcile::AmbiguityPolicy;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/config.toml");

        let mut cfg = Config::default();
        cfg.repo.path = Some(PathBuf::from("/srv/persona"));
        cfg.identity.name = "heartbeat".into();
        cfg.quality.threshold = 0.5;
        cfg.logging.stdout_format = LogFormat::Compact;
        cfg.logging.file.enabled = true;
        cfg.logging.file.rotation = LogRotation::Hourly;
        let mut memos = ResourceConfig::new(DocPath::new("memos").unwrap());
        memos.stream = true;
        memos.quality_gate = true;
        memos.publish = PublishMode::SignalOnly;
        memos.ambiguity = AmbiguityPolicy::Skip;
        cfg.resources.insert("memos".into(), memos.clone());

        write_config(&path, &cfg).expect("write config");
        let contents = fs::read_to_string(&path).expect("read config");
        let loaded: Config = toml::from_str(&contents).expect("parse config");

        assert_eq!(loaded.repo.path, cfg.repo.path);
        assert_eq!(loaded.identity.name, "heartbeat");
        assert_eq!(loaded.quality.threshold, 0.5);
        assert!(matches!(loaded.logging.stdout_format, LogFormat::Compact));
        assert!(matches!(loaded.logging.file.rotation, LogRotation::Hourly));
        assert_eq!(loaded.resources["memos"], memos);
    }

    #[test]
    fn repo_layer_overrides_user_layer() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        fs::write(&user, "[push]\nmax_retries = 1\n[pool]\nworkers = 2\n").unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(
            repo_config_path(&repo),
            "[push]\nmax_retries = 6\n[resources.board]\npath = \"whiteboard.json\"\n",
        )
        .unwrap();

        let cfg = load_for_repo(Some(&user), Some(&repo)).unwrap();
        assert_eq!(cfg.pool.workers, 2);
        assert!(cfg.resources.contains_key("board"));
        if std::env::var_os("PSYNC_MAX_RETRIES").is_none() {
            assert_eq!(cfg.push.max_retries, 6);
        }
        if std::env::var_os("PSYNC_REPO").is_none() {
            assert_eq!(cfg.repo.path.as_deref(), Some(repo.as_path()));
        }
    }

    #[test]
    fn missing_file_is_no_layer() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_layer(&dir.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[push\n").unwrap();
        let err = load_layer(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }
}
