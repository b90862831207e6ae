//! Actor pool.
//!
//! - registry: the actors built from config, one per resource and cadence
//! - scheduler: per-actor deadlines with single-flight ticks
//! - actor: one persist or reconcile tick
//! - run: worker threads, signal handling and the scheduling loop

pub mod actor;
pub mod registry;
pub mod run;
pub mod scheduler;

pub use actor::{Actor, ActorContext, ActorPhase, TickOutcome};
pub use registry::{ActorKey, ActorKind, ActorRegistry, ActorSpec, Capabilities};
pub use run::{ActorStats, PoolStats, install_signal_handlers, run_once, run_pool};
pub use scheduler::ActorScheduler;
