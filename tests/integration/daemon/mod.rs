mod pool;
mod ticks;

use std::collections::BTreeMap;
use std::time::Duration;

use persona_sync::config::ResourceConfig;
use persona_sync::daemon::ActorContext;
use persona_sync::gate::{QualityGate, QualityPolicy};
use persona_sync::git::Git2Transport;
use persona_sync::lock::{DEFAULT_STALE_AFTER, LockManager};
use persona_sync::store::FsContentStore;

use crate::fixtures::rig::GitRig;

pub fn actor_context(rig: &GitRig, resources: BTreeMap<String, ResourceConfig>) -> ActorContext {
    let locks = LockManager::new(rig.tmp.path().join("locks"), DEFAULT_STALE_AFTER, "itest");
    let engine = rig
        .engine_with(Git2Transport::new(Duration::from_secs(10)), 2)
        .with_clone_lock(locks.clone());
    ActorContext::new(
        engine,
        FsContentStore::new(rig.tmp.path().join("ephemeral")),
        locks,
        QualityGate::new(QualityPolicy::default()),
        resources,
    )
}
