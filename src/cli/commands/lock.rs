use serde::Serialize;

use super::super::{Ctx, LockCmd, Status, render};
use crate::Result;

#[derive(Serialize)]
struct Released<'a> {
    resource: &'a str,
    released: bool,
}

pub(crate) fn handle(ctx: &Ctx, cmd: LockCmd) -> Result<Status> {
    let locks = ctx.config.lock_manager();
    match cmd {
        LockCmd::Status { resource } => {
            let status = locks.inspect(&resource)?;
            ctx.print(&status, || render::render_lock(&resource, status.as_ref()))?;
            Ok(Status::Ok)
        }
        LockCmd::Release { resource, force } => {
            if !force {
                tracing::error!(resource = %resource, "refusing to release a lock without --force");
                return Ok(Status::Failed);
            }
            let released = locks.force_release(&resource)?;
            ctx.print(
                &Released {
                    resource: &resource,
                    released,
                },
                || {
                    if released {
                        format!("released lock on {resource}")
                    } else {
                        format!("{resource} was not locked")
                    }
                },
            )?;
            Ok(Status::Ok)
        }
    }
}
