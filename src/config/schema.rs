use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::DocPath;
use crate::gate::QualityPolicy;
use crate::git::{Identity, PublishMode, RetryPolicy};
use crate::reconcile::AmbiguityPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repo: RepoConfig,
    pub identity: IdentityConfig,
    pub push: PushConfig,
    pub lock: LockConfig,
    pub quality: QualityPolicy,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
    pub resources: BTreeMap<String, ResourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Working tree of the durable clone.
    pub path: Option<PathBuf>,
    pub remote: String,
    pub branch: String,
    /// Root of the ephemeral replica.
    pub ephemeral_dir: Option<PathBuf>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: None,
            remote: "origin".to_string(),
            branch: "main".to_string(),
            ephemeral_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RepoConfigOverride {
    pub path: Option<PathBuf>,
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub ephemeral_dir: Option<PathBuf>,
}

impl RepoConfigOverride {
    pub fn apply_to(&self, target: &mut RepoConfig) {
        if let Some(path) = self.path.as_ref() {
            target.path = Some(path.clone());
        }
        if let Some(remote) = self.remote.as_ref() {
            target.remote = remote.clone();
        }
        if let Some(branch) = self.branch.as_ref() {
            target.branch = branch.clone();
        }
        if let Some(dir) = self.ephemeral_dir.as_ref() {
            target.ephemeral_dir = Some(dir.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub email: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "persona-sync".to_string(),
            email: "persona-sync@localhost".to_string(),
        }
    }
}

impl IdentityConfig {
    pub fn identity(&self) -> Identity {
        Identity {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfigOverride {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl IdentityConfigOverride {
    pub fn apply_to(&self, target: &mut IdentityConfig) {
        if let Some(name) = self.name.as_ref() {
            target.name = name.clone();
        }
        if let Some(email) = self.email.as_ref() {
            target.email = email.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub remote_timeout_ms: u64,
    pub approval_required: Vec<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            remote_timeout_ms: 30_000,
            approval_required: vec![
                "api/".to_string(),
                "utils/".to_string(),
                "value_constitution.yaml".to_string(),
            ],
        }
    }
}

impl PushConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base: Duration::from_millis(self.backoff_base_ms),
            max: Duration::from_millis(self.backoff_max_ms),
            jitter: true,
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PushConfigOverride {
    pub max_retries: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub remote_timeout_ms: Option<u64>,
    pub approval_required: Option<Vec<String>>,
}

impl PushConfigOverride {
    pub fn apply_to(&self, target: &mut PushConfig) {
        if let Some(retries) = self.max_retries {
            target.max_retries = retries;
        }
        if let Some(base) = self.backoff_base_ms {
            target.backoff_base_ms = base;
        }
        if let Some(max) = self.backoff_max_ms {
            target.backoff_max_ms = max;
        }
        if let Some(timeout) = self.remote_timeout_ms {
            target.remote_timeout_ms = timeout;
        }
        if let Some(paths) = self.approval_required.as_ref() {
            target.approval_required = paths.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Defaults to `<data_dir>/locks`.
    pub dir: Option<PathBuf>,
    pub stale_after_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            dir: None,
            stale_after_secs: crate::lock::DEFAULT_STALE_AFTER.as_secs(),
        }
    }
}

impl LockConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn dir_or_default(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(crate::paths::locks_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LockConfigOverride {
    pub dir: Option<PathBuf>,
    pub stale_after_secs: Option<u64>,
}

impl LockConfigOverride {
    pub fn apply_to(&self, target: &mut LockConfig) {
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(secs) = self.stale_after_secs {
            target.stale_after_secs = secs;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QualityPolicyOverride {
    pub threshold: Option<f64>,
    pub summary_field: Option<String>,
    pub body_field: Option<String>,
    pub summary_full_chars: Option<usize>,
    pub body_full_chars: Option<usize>,
    pub summary_weight: Option<f64>,
    pub standout: Option<f64>,
}

impl QualityPolicyOverride {
    pub fn apply_to(&self, target: &mut QualityPolicy) {
        if let Some(threshold) = self.threshold {
            target.threshold = threshold;
        }
        if let Some(field) = self.summary_field.as_ref() {
            target.summary_field = field.clone();
        }
        if let Some(field) = self.body_field.as_ref() {
            target.body_field = field.clone();
        }
        if let Some(chars) = self.summary_full_chars {
            target.summary_full_chars = chars;
        }
        if let Some(chars) = self.body_full_chars {
            target.body_full_chars = chars;
        }
        if let Some(weight) = self.summary_weight {
            target.summary_weight = weight;
        }
        if let Some(standout) = self.standout {
            target.standout = standout;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PoolConfigOverride {
    pub workers: Option<usize>,
}

impl PoolConfigOverride {
    pub fn apply_to(&self, target: &mut PoolConfig) {
        if let Some(workers) = self.workers {
            target.workers = workers;
        }
    }
}

/// One monitored document (or stream directory) and its actors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub path: DocPath,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub quality_gate: bool,
    #[serde(default = "default_true")]
    pub dedup: bool,
    /// `path` names a directory of timestamped documents.
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_publish_mode")]
    pub publish: PublishMode,
    /// Registers a reconcile actor on this cadence.
    #[serde(default)]
    pub reconcile_interval_secs: Option<u64>,
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
    /// Commit author; defaults to the identity name.
    #[serde(default)]
    pub author: Option<String>,
}

impl ResourceConfig {
    pub fn new(path: DocPath) -> Self {
        Self {
            path,
            interval_secs: default_interval_secs(),
            quality_gate: false,
            dedup: true,
            stream: false,
            publish: PublishMode::Live,
            reconcile_interval_secs: None,
            ambiguity: AmbiguityPolicy::default(),
            author: None,
        }
    }

    /// Whether a document at `path` is this resource's (or, for a stream,
    /// an entry of it).
    pub fn owns(&self, path: &DocPath) -> bool {
        *path == self.path || (self.stream && path.starts_with(&self.path))
    }
}

fn default_interval_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_publish_mode() -> PublishMode {
    PublishMode::Live
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Tree,
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Minutely,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Tree,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Daily,
            retention_max_age_days: Some(7),
            retention_max_files: Some(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub stdout_format: Option<LogFormat>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(format) = self.stdout_format {
            target.stdout_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
    pub rotation: Option<LogRotation>,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
        if let Some(days) = self.retention_max_age_days {
            target.retention_max_age_days = Some(days);
        }
        if let Some(files) = self.retention_max_files {
            target.retention_max_files = Some(files);
        }
    }
}

/// One config file. Unset fields leave the lower layer alone; resources
/// replace same-named resources wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub repo: RepoConfigOverride,
    pub identity: IdentityConfigOverride,
    pub push: PushConfigOverride,
    pub lock: LockConfigOverride,
    pub quality: QualityPolicyOverride,
    pub pool: PoolConfigOverride,
    pub logging: LoggingConfigOverride,
    pub resources: BTreeMap<String, ResourceConfig>,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        self.repo.apply_to(&mut base.repo);
        self.identity.apply_to(&mut base.identity);
        self.push.apply_to(&mut base.push);
        self.lock.apply_to(&mut base.lock);
        self.quality.apply_to(&mut base.quality);
        self.pool.apply_to(&mut base.pool);
        self.logging.apply_to(&mut base.logging);
        for (name, resource) in &self.resources {
            base.resources.insert(name.clone(), resource.clone());
        }
    }
}
