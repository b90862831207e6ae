//! Actor registry: the fixed set of (resource, kind, interval, capabilities)
//! built once from config.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::{Config, ResourceConfig};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// Moves the ephemeral candidate into the durable store.
    Persist,
    /// Folds durable changes back and resolves direction by timestamp.
    Reconcile,
}

impl ActorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorKind::Persist => "persist",
            ActorKind::Reconcile => "reconcile",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActorKey {
    pub resource: String,
    pub kind: ActorKind,
}

impl ActorKey {
    pub fn new(resource: impl Into<String>, kind: ActorKind) -> Self {
        Self {
            resource: resource.into(),
            kind,
        }
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.kind.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub quality_gate: bool,
    pub dedup: bool,
    pub reconcile: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorSpec {
    pub key: ActorKey,
    pub interval: Duration,
    pub capabilities: Capabilities,
}

impl ActorSpec {
    pub fn persist(resource: &str, config: &ResourceConfig) -> Self {
        Self {
            key: ActorKey::new(resource, ActorKind::Persist),
            interval: interval(config.interval_secs),
            capabilities: Capabilities {
                quality_gate: config.quality_gate,
                dedup: config.dedup,
                reconcile: false,
            },
        }
    }

    pub fn reconcile(resource: &str, config: &ResourceConfig, every_secs: u64) -> Self {
        Self {
            key: ActorKey::new(resource, ActorKind::Reconcile),
            interval: interval(every_secs),
            capabilities: Capabilities {
                quality_gate: false,
                dedup: config.dedup,
                reconcile: true,
            },
        }
    }
}

fn interval(secs: u64) -> Duration {
    Duration::from_secs(secs).max(MIN_INTERVAL)
}

#[derive(Clone, Debug, Default)]
pub struct ActorRegistry {
    specs: Vec<ActorSpec>,
}

impl ActorRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut specs = Vec::new();
        for (name, resource) in &config.resources {
            specs.push(ActorSpec::persist(name, resource));
            if let Some(every) = resource.reconcile_interval_secs {
                specs.push(ActorSpec::reconcile(name, resource, every));
            }
        }
        Self { specs }
    }

    pub fn from_specs(specs: Vec<ActorSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[ActorSpec] {
        &self.specs
    }

    pub fn get(&self, key: &ActorKey) -> Option<&ActorSpec> {
        self.specs.iter().find(|spec| &spec.key == key)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
