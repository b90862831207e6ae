use std::path::PathBuf;
use std::str::FromStr;

use super::{Config, ConfigLayer};

pub fn merge_layers(user: Option<ConfigLayer>, repo: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = repo {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_env_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply `PSYNC_*` overrides read through `lookup`.
pub fn apply_env_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    if let Some(path) = get("PSYNC_REPO") {
        config.repo.path = Some(PathBuf::from(path));
    }
    if let Some(branch) = get("PSYNC_BRANCH") {
        config.repo.branch = branch;
    }
    if let Some(remote) = get("PSYNC_REMOTE") {
        config.repo.remote = remote;
    }
    if let Some(dir) = get("PSYNC_EPHEMERAL_DIR") {
        config.repo.ephemeral_dir = Some(PathBuf::from(dir));
    }
    if let Some(actor) = get("PSYNC_ACTOR") {
        config.identity.name = actor;
    }
    if let Some(retries) = parse_env(&get, "PSYNC_MAX_RETRIES") {
        config.push.max_retries = retries;
    }
    if let Some(secs) = parse_env(&get, "PSYNC_STALE_AFTER_SECS") {
        config.lock.stale_after_secs = secs;
    }
}

fn parse_env<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {key}, ignoring: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use crate::config::ResourceConfig;
    use crate::core::DocPath;

    #[test]
    fn merge_layers_respects_precedence() {
        let mut user = ConfigLayer::default();
        user.repo.branch = Some("user-branch".into());
        user.push.max_retries = Some(9);
        user.resources.insert(
            "board".into(),
            ResourceConfig::new(DocPath::new("user/board.json").unwrap()),
        );

        let mut repo = ConfigLayer::default();
        repo.repo.branch = Some("repo-branch".into());
        repo.resources.insert(
            "board".into(),
            ResourceConfig::new(DocPath::new("repo/board.json").unwrap()),
        );

        let config = merge_layers(Some(user), Some(repo));
        assert_eq!(config.repo.branch, "repo-branch");
        assert_eq!(config.push.max_retries, 9);
        assert_eq!(config.repo.remote, "origin");
        assert_eq!(config.resources["board"].path.as_str(), "repo/board.json");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("PSYNC_REPO", "/srv/persona"),
            ("PSYNC_BRANCH", "memories"),
            ("PSYNC_ACTOR", "heartbeat"),
            ("PSYNC_MAX_RETRIES", "7"),
            ("PSYNC_STALE_AFTER_SECS", " 90 "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides_from(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.repo.path, Some(PathBuf::from("/srv/persona")));
        assert_eq!(config.repo.branch, "memories");
        assert_eq!(config.identity.name, "heartbeat");
        assert_eq!(config.push.max_retries, 7);
        assert_eq!(config.lock.stale_after_secs, 90);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = Config::default();
        apply_env_overrides_from(&mut config, |key| match key {
            "PSYNC_MAX_RETRIES" => Some("lots".into()),
            "PSYNC_BRANCH" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(config.push.max_retries, 3);
        assert_eq!(config.repo.branch, "main");
    }
}
