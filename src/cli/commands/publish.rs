use super::super::{Ctx, PublishArgs, Status, read_source, render};
use crate::Result;
use crate::core::{DocPath, Document};
use crate::daemon::TickOutcome;
use crate::git::PublishMode;
use crate::lock::{LockError, LockHandle};

pub(crate) fn handle(ctx: &Ctx, args: PublishArgs) -> Result<Status> {
    let path = DocPath::new(args.path)?;
    let content = read_source(&args.file)?;
    // Refuse content that would not load back from the durable store.
    Document::decode(path.clone(), &content)?;

    let config = &ctx.config;
    let engine = config.push_engine()?;

    // Same locks the actors take, so a manual publish never races a tick.
    let locks = config.lock_manager();
    let mut held: Vec<LockHandle> = Vec::new();
    for resource in config.resources_for(&path) {
        match locks.acquire(resource) {
            Ok(handle) => held.push(handle),
            Err(LockError::Held { holder, .. }) => {
                let outcome = TickOutcome::LockUnavailable { holder };
                ctx.print(&outcome, || render::render_tick(resource, &outcome))?;
                return Ok(Status::Failed);
            }
            Err(err) => return Err(err.into()),
        }
    }

    let author = args
        .author
        .unwrap_or_else(|| config.identity.name.clone());
    let mode = if args.signal_only {
        PublishMode::SignalOnly
    } else {
        PublishMode::Live
    };

    let result = engine.publish_with(&path, &content, &author, &args.reason, mode);
    for handle in &mut held {
        if let Err(err) = handle.release() {
            tracing::warn!(path = ?handle.path(), error = %err, "lock release failed");
        }
    }
    ctx.print(&result, || render::render_push(&result))?;
    Ok(if result.is_failure() {
        Status::Failed
    } else {
        Status::Ok
    })
}
