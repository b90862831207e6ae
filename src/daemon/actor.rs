//! One actor tick.
//!
//! Persist: candidate → quality gate → lock → dedup → publish → release.
//! Reconcile: lock → refresh → compare replicas → push, pull or nothing →
//! release.
//!
//! Expected outcomes (lock busy, rejected, duplicate, nothing to do) are
//! values, never errors. Only local failures such as an unreadable store end
//! in `TickOutcome::Failed`.

use std::collections::BTreeMap;

use serde::Serialize;

use super::registry::{ActorKey, ActorKind, ActorSpec};
use crate::config::{Config, ConfigError, ResourceConfig};
use crate::core::Document;
use crate::gate::{DedupVerdict, QualityGate, QualityScore};
use crate::git::{Git2Transport, PushOutcome, PushResult, RemoteTransport, SafePushEngine};
use crate::lock::{LockError, LockHandle, LockManager};
use crate::reconcile::{Reconciler, SyncAction};
use crate::store::FsContentStore;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorPhase {
    Idle,
    Locking,
    Comparing,
    Persisting,
    Skipping,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    LockUnavailable { holder: Option<String> },
    NoCandidate,
    QualityRejected { score: QualityScore },
    DuplicateSuppressed,
    /// Reconciliation found nothing to move.
    Reconciled { action: SyncAction },
    /// The durable copy was written to the ephemeral replica.
    Pulled,
    Published(PushResult),
    Failed { error: String },
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::LockUnavailable { .. } => "lock_unavailable",
            TickOutcome::NoCandidate => "no_candidate",
            TickOutcome::QualityRejected { .. } => "quality_rejected",
            TickOutcome::DuplicateSuppressed => "duplicate_suppressed",
            TickOutcome::Reconciled { .. } => "reconciled",
            TickOutcome::Pulled => "pulled",
            TickOutcome::Published(_) => "published",
            TickOutcome::Failed { .. } => "failed",
        }
    }

    /// A reported failure: local error, conflict, or exhausted retries.
    pub fn is_failure(&self) -> bool {
        match self {
            TickOutcome::Failed { .. } => true,
            TickOutcome::Published(result) => result.is_failure(),
            _ => false,
        }
    }

    /// Something reached the durable store or the signal log.
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            TickOutcome::Published(PushResult {
                outcome: PushOutcome::Success { .. },
                ..
            })
        )
    }
}

/// Everything a tick needs, shared by all actors and workers.
pub struct ActorContext<T = Git2Transport> {
    engine: SafePushEngine<T>,
    ephemeral: FsContentStore,
    locks: LockManager,
    gate: QualityGate,
    resources: BTreeMap<String, ResourceConfig>,
}

impl ActorContext<Git2Transport> {
    pub fn from_config(config: &Config) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(
            config.push_engine()?,
            FsContentStore::new(config.ephemeral_dir()?),
            config.lock_manager(),
            QualityGate::new(config.quality.clone()),
            config.resources.clone(),
        ))
    }
}

impl<T: RemoteTransport> ActorContext<T> {
    pub fn new(
        engine: SafePushEngine<T>,
        ephemeral: FsContentStore,
        locks: LockManager,
        gate: QualityGate,
        resources: BTreeMap<String, ResourceConfig>,
    ) -> Self {
        Self {
            engine,
            ephemeral,
            locks,
            gate,
            resources,
        }
    }

    pub fn engine(&self) -> &SafePushEngine<T> {
        &self.engine
    }

    pub fn ephemeral(&self) -> &FsContentStore {
        &self.ephemeral
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    pub fn resource(&self, name: &str) -> std::result::Result<&ResourceConfig, ConfigError> {
        self.resources
            .get(name)
            .ok_or_else(|| ConfigError::UnknownResource(name.to_string()))
    }

    /// Run one tick for `spec`. Never panics the caller on failure.
    pub fn tick(&self, spec: &ActorSpec) -> TickOutcome {
        match Actor::new(self, spec) {
            Ok(mut actor) => actor.tick(),
            Err(err) => {
                tracing::error!(actor = %spec.key, error = %err, "actor misconfigured");
                TickOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }
}

pub struct Actor<'a, T> {
    ctx: &'a ActorContext<T>,
    spec: &'a ActorSpec,
    resource: &'a ResourceConfig,
    phase: ActorPhase,
    trail: Vec<ActorPhase>,
}

impl<'a, T: RemoteTransport> Actor<'a, T> {
    pub fn new(
        ctx: &'a ActorContext<T>,
        spec: &'a ActorSpec,
    ) -> std::result::Result<Self, ConfigError> {
        let resource = ctx.resource(&spec.key.resource)?;
        Ok(Self {
            ctx,
            spec,
            resource,
            phase: ActorPhase::Idle,
            trail: Vec::new(),
        })
    }

    pub fn key(&self) -> &ActorKey {
        &self.spec.key
    }

    pub fn phase(&self) -> ActorPhase {
        self.phase
    }

    /// Phases visited during the last tick, ending in `Idle`.
    pub fn trail(&self) -> &[ActorPhase] {
        &self.trail
    }

    pub fn tick(&mut self) -> TickOutcome {
        let span = tracing::info_span!(
            "actor_tick",
            resource = %self.spec.key.resource,
            kind = self.spec.key.kind.as_str()
        );
        let _guard = span.enter();

        self.trail.clear();
        let result = match self.spec.key.kind {
            ActorKind::Persist => self.persist_tick(),
            ActorKind::Reconcile => self.reconcile_tick(),
        };
        self.enter(ActorPhase::Idle);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "tick failed");
                TickOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        if outcome.is_failure() {
            tracing::warn!(outcome = outcome.label(), "tick reported failure");
        } else {
            tracing::debug!(outcome = outcome.label(), "tick finished");
        }
        outcome
    }

    fn enter(&mut self, phase: ActorPhase) {
        self.phase = phase;
        self.trail.push(phase);
    }

    fn persist_tick(&mut self) -> Result<TickOutcome> {
        self.enter(ActorPhase::Comparing);
        let Some(candidate) = self.current(&self.ctx.ephemeral)? else {
            self.enter(ActorPhase::Skipping);
            return Ok(TickOutcome::NoCandidate);
        };

        if self.spec.capabilities.quality_gate {
            let verdict = self.ctx.gate.evaluate(&candidate);
            if !verdict.persist {
                tracing::info!(
                    score = verdict.score.value(),
                    threshold = verdict.threshold,
                    "quality gate rejected candidate"
                );
                self.enter(ActorPhase::Skipping);
                return Ok(TickOutcome::QualityRejected {
                    score: verdict.score,
                });
            }
            tracing::debug!(score = verdict.score.value(), "quality gate passed");
        }

        let mut lock = match self.acquire()? {
            Ok(lock) => lock,
            Err(outcome) => return Ok(outcome),
        };
        self.enter(ActorPhase::Comparing);
        let outcome = self.deliver(&lock, &candidate);
        release(&mut lock);
        outcome
    }

    fn reconcile_tick(&mut self) -> Result<TickOutcome> {
        let mut lock = match self.acquire()? {
            Ok(lock) => lock,
            Err(outcome) => return Ok(outcome),
        };
        self.enter(ActorPhase::Comparing);
        let outcome = self.reconcile_locked(&lock);
        release(&mut lock);
        outcome
    }

    fn reconcile_locked(&mut self, lock: &LockHandle) -> Result<TickOutcome> {
        match self.ctx.engine.refresh() {
            Ok(refresh) => tracing::debug!(refresh = ?refresh, "durable clone refreshed"),
            Err(err) => tracing::warn!(error = %err, "refresh failed; comparing against local clone"),
        }

        let durable_store = self.ctx.engine.durable_store();
        let ephemeral = self.current(&self.ctx.ephemeral)?;
        let durable = self.current(&durable_store)?;
        let decision = Reconciler::new(self.resource.ambiguity)
            .reconcile_explained(ephemeral.as_ref(), durable.as_ref());
        tracing::info!(action = %decision.action, basis = ?decision.basis, "reconcile decision");

        match (decision.action, ephemeral, durable) {
            (SyncAction::PushToDurable, Some(doc), _) => self.deliver(lock, &doc),
            (SyncAction::PullToEphemeral, _, Some(doc)) => {
                self.enter(ActorPhase::Persisting);
                self.ctx.ephemeral.write(&doc)?;
                tracing::info!(path = %doc.path(), "pulled durable copy into ephemeral replica");
                Ok(TickOutcome::Pulled)
            }
            (action, _, _) => {
                self.enter(ActorPhase::Skipping);
                Ok(TickOutcome::Reconciled { action })
            }
        }
    }

    /// Lock the resource, or the outcome to report when someone else has it.
    fn acquire(&mut self) -> Result<std::result::Result<LockHandle, TickOutcome>> {
        self.enter(ActorPhase::Locking);
        match self.ctx.locks.acquire(&self.spec.key.resource) {
            Ok(lock) => Ok(Ok(lock)),
            Err(LockError::Held { holder, age_ms, .. }) => {
                tracing::debug!(holder = ?holder, age_ms, "resource locked; skipping tick");
                Ok(Err(TickOutcome::LockUnavailable { holder }))
            }
            Err(err) => Err(Error::from(err)),
        }
    }

    /// Dedup against the durable replica, then publish while the token is
    /// still ours.
    fn deliver(&mut self, lock: &LockHandle, candidate: &Document) -> Result<TickOutcome> {
        if self.spec.capabilities.dedup {
            let durable_store = self.ctx.engine.durable_store();
            let last = self.last_persisted(&durable_store, candidate)?;
            let verdict = DedupVerdict::check(candidate, last.as_ref());
            if verdict.duplicate {
                tracing::info!(hash = %verdict.candidate.short(), "duplicate suppressed");
                self.enter(ActorPhase::Skipping);
                return Ok(TickOutcome::DuplicateSuppressed);
            }
        }

        if !lock.still_held()? {
            tracing::warn!("resource lock was displaced; not publishing");
            self.enter(ActorPhase::Skipping);
            return Ok(TickOutcome::LockUnavailable { holder: None });
        }

        self.enter(ActorPhase::Persisting);
        let author = self
            .resource
            .author
            .clone()
            .unwrap_or_else(|| self.ctx.engine.config().identity.name.clone());
        let reason = format!(
            "scheduled {} of {}",
            self.spec.key.kind.as_str(),
            self.spec.key.resource
        );
        let result = self.ctx.engine.publish_with(
            candidate.path(),
            &candidate.encode(),
            &author,
            &reason,
            self.resource.publish,
        );
        Ok(TickOutcome::Published(result))
    }

    /// The resource's current document in `store`: the fixed path, or the
    /// newest entry of a stream directory.
    fn current(&self, store: &FsContentStore) -> Result<Option<Document>> {
        let doc = if self.resource.stream {
            store.latest_in_dir(&self.resource.path)?
        } else {
            store.load(&self.resource.path)?
        };
        Ok(doc)
    }

    fn last_persisted(
        &self,
        durable: &FsContentStore,
        candidate: &Document,
    ) -> Result<Option<Document>> {
        let doc = if self.resource.stream {
            durable.latest_in_stream(&self.resource.path, &candidate.stream_key())?
        } else {
            durable.load(candidate.path())?
        };
        Ok(doc)
    }
}

fn release(lock: &mut LockHandle) {
    if let Err(err) = lock.release() {
        tracing::warn!(path = ?lock.path(), error = %err, "lock release failed");
    }
}
