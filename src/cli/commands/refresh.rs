use super::super::{Ctx, Status, render};
use crate::Result;
use crate::git::RefreshOutcome;

pub(crate) fn handle(ctx: &Ctx) -> Result<Status> {
    let engine = ctx.config.push_engine()?;
    let outcome = engine.refresh()?;
    ctx.print(&outcome, || render::render_refresh(&outcome))?;
    Ok(match outcome {
        RefreshOutcome::Diverged => Status::Failed,
        _ => Status::Ok,
    })
}
