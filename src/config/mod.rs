//! Config loading and persistence.

mod load;
mod merge;
mod schema;

use std::path::PathBuf;

pub use load::{
    ConfigError, config_path, discover_repo_root, load, load_for_repo, load_layer,
    load_repo_config, load_user_config, repo_config_path, write_config,
};
pub use merge::{apply_env_overrides, apply_env_overrides_from, merge_layers};
pub use schema::{
    Config, ConfigLayer, FileLoggingConfig, FileLoggingConfigOverride, IdentityConfig,
    IdentityConfigOverride, LockConfig, LockConfigOverride, LogFormat, LogRotation, LoggingConfig,
    LoggingConfigOverride, PoolConfig, PoolConfigOverride, PushConfig, PushConfigOverride,
    QualityPolicyOverride, RepoConfig, RepoConfigOverride, ResourceConfig,
};

use crate::core::DocPath;
use crate::git::{PublishConfig, SafePushEngine};
use crate::lock::{LockManager, default_holder};

impl Config {
    pub fn repo_path(&self) -> Result<PathBuf, ConfigError> {
        self.repo
            .path
            .clone()
            .ok_or(ConfigError::Missing { field: "repo.path" })
    }

    pub fn ephemeral_dir(&self) -> Result<PathBuf, ConfigError> {
        self.repo.ephemeral_dir.clone().ok_or(ConfigError::Missing {
            field: "repo.ephemeral_dir",
        })
    }

    pub fn resource(&self, name: &str) -> Result<&ResourceConfig, ConfigError> {
        self.resources
            .get(name)
            .ok_or_else(|| ConfigError::UnknownResource(name.to_string()))
    }

    /// Names of the configured resources that `path` belongs to.
    pub fn resources_for(&self, path: &DocPath) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, resource)| resource.owns(path))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn lock_manager(&self) -> LockManager {
        LockManager::new(
            self.lock.dir_or_default(),
            self.lock.stale_after(),
            default_holder(),
        )
    }

    /// Publish engine for the durable clone, serialized across processes
    /// through the clone lock.
    pub fn push_engine(&self) -> Result<SafePushEngine, ConfigError> {
        Ok(SafePushEngine::with_git2(
            self.repo_path()?,
            self.publish_config(),
            self.push.remote_timeout(),
        )
        .with_clone_lock(self.lock_manager()))
    }

    pub fn publish_config(&self) -> PublishConfig {
        PublishConfig {
            remote: self.repo.remote.clone(),
            branch: self.repo.branch.clone(),
            identity: self.identity.identity(),
            retry: self.push.retry_policy(),
            approval_required: self.push.approval_required.clone(),
            signal_log: crate::paths::signal_log_path(),
        }
    }
}
