use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::super::{Ctx, Status, render};
use crate::Result;
use crate::daemon::{ActorContext, ActorRegistry, install_signal_handlers, run_pool};

pub(crate) fn handle(ctx: &Ctx) -> Result<Status> {
    let registry = ActorRegistry::from_config(&ctx.config);
    if registry.is_empty() {
        tracing::warn!("no resources configured; nothing to run");
        ctx.print(&BTreeMap::<String, ()>::new(), || {
            "no resources configured".to_string()
        })?;
        return Ok(Status::Ok);
    }

    let actors = Arc::new(ActorContext::from_config(&ctx.config)?);
    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(&shutdown)?;
    let stats = run_pool(actors, &registry, ctx.config.pool.workers, shutdown)?;

    let by_name: BTreeMap<String, _> = stats
        .iter()
        .map(|(key, stats)| (key.to_string(), stats.clone()))
        .collect();
    ctx.print(&by_name, || render::render_stats(&stats))?;
    Ok(Status::Ok)
}
