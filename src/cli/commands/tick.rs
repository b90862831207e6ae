use super::super::{Ctx, Status, TickArgs, render};
use crate::Result;
use crate::daemon::{ActorContext, ActorKind, run_once};

pub(crate) fn handle(ctx: &Ctx, args: TickArgs) -> Result<Status> {
    // Fail on an unknown name before touching the repository.
    ctx.config.resource(&args.resource)?;
    let actors = ActorContext::from_config(&ctx.config)?;
    let kind = if args.reconcile {
        ActorKind::Reconcile
    } else {
        ActorKind::Persist
    };
    let outcome = run_once(&actors, &args.resource, kind);
    ctx.print(&outcome, || render::render_tick(&args.resource, &outcome))?;
    Ok(if outcome.is_failure() {
        Status::Failed
    } else {
        Status::Ok
    })
}
