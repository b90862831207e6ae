//! Actor pool runner.
//!
//! The scheduler lives on the calling thread. Due ticks go to a fixed set of
//! worker threads over a channel and outcomes come back on another, so a
//! slow publish never delays the other actors' deadlines.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use serde::Serialize;

use super::actor::{ActorContext, TickOutcome};
use super::registry::{ActorKey, ActorKind, ActorRegistry, ActorSpec};
use super::scheduler::ActorScheduler;
use crate::git::RemoteTransport;

/// Longest the loop sleeps before re-checking the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActorStats {
    pub ticks: u64,
    pub published: u64,
    pub skipped: u64,
    pub failures: u64,
}

impl ActorStats {
    pub fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        if outcome.is_failure() {
            self.failures += 1;
        } else if outcome.is_delivery() || matches!(outcome, TickOutcome::Pulled) {
            self.published += 1;
        } else {
            self.skipped += 1;
        }
    }
}

pub type PoolStats = BTreeMap<ActorKey, ActorStats>;

/// Install SIGINT/SIGTERM handlers that set `shutdown`.
pub fn install_signal_handlers(shutdown: &Arc<AtomicBool>) -> io::Result<()> {
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(shutdown))?;
    Ok(())
}

/// Run every registered actor on its interval until `shutdown` is set, then
/// wait for in-flight ticks and return per-actor stats.
pub fn run_pool<T>(
    ctx: Arc<ActorContext<T>>,
    registry: &ActorRegistry,
    workers: usize,
    shutdown: Arc<AtomicBool>,
) -> io::Result<PoolStats>
where
    T: RemoteTransport + 'static,
{
    let workers = workers.max(1);
    let (job_tx, job_rx) = channel::unbounded::<ActorSpec>();
    let (done_tx, done_rx) = channel::unbounded::<(ActorKey, TickOutcome)>();

    let mut handles = Vec::with_capacity(workers);
    for idx in 0..workers {
        let job_rx = job_rx.clone();
        let done_tx = done_tx.clone();
        let ctx = Arc::clone(&ctx);
        let handle = thread::Builder::new()
            .name(format!("psync-worker-{idx}"))
            .spawn(move || {
                for spec in job_rx.iter() {
                    let outcome = ctx.tick(&spec);
                    if done_tx.send((spec.key, outcome)).is_err() {
                        break;
                    }
                }
            })?;
        handles.push(handle);
    }
    drop(done_tx);

    let mut scheduler = ActorScheduler::new();
    let started = Instant::now();
    for spec in registry.specs() {
        scheduler.register(spec.key.clone(), spec.interval, started);
    }
    tracing::info!(actors = registry.len(), workers, "actor pool started");

    let mut stats = PoolStats::new();
    let mut in_flight = 0usize;
    while !shutdown.load(Ordering::Relaxed) {
        for key in scheduler.drain_due(Instant::now()) {
            let Some(spec) = registry.get(&key) else {
                continue;
            };
            scheduler.start_in_flight(&key);
            if job_tx.send(spec.clone()).is_err() {
                tracing::error!(actor = %key, "worker pool gone; stopping");
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
            in_flight += 1;
        }

        let wait = scheduler
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(SHUTDOWN_POLL)
            .min(SHUTDOWN_POLL);
        match done_rx.recv_timeout(wait) {
            Ok((key, outcome)) => {
                in_flight = in_flight.saturating_sub(1);
                stats.entry(key.clone()).or_default().record(&outcome);
                scheduler.complete(&key, Instant::now());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!(in_flight, "shutdown requested; draining in-flight ticks");
    drop(job_tx);
    while in_flight > 0 {
        match done_rx.recv() {
            Ok((key, outcome)) => {
                in_flight -= 1;
                stats.entry(key).or_default().record(&outcome);
            }
            Err(_) => break,
        }
    }
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }
    tracing::info!("actor pool stopped");
    Ok(stats)
}

/// One tick for `resource`, synchronously.
pub fn run_once<T: RemoteTransport>(
    ctx: &ActorContext<T>,
    resource: &str,
    kind: ActorKind,
) -> TickOutcome {
    let spec = match ctx.resource(resource) {
        Ok(config) => match kind {
            ActorKind::Persist => ActorSpec::persist(resource, config),
            ActorKind::Reconcile => ActorSpec::reconcile(
                resource,
                config,
                config.reconcile_interval_secs.unwrap_or(config.interval_secs),
            ),
        },
        Err(err) => {
            return TickOutcome::Failed {
                error: err.to_string(),
            };
        }
    };
    ctx.tick(&spec)
}
