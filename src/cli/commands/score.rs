use super::super::{Ctx, ScoreArgs, Status, read_source, render};
use crate::Result;
use crate::core::{DocPath, Document};
use crate::gate::QualityGate;

pub(crate) fn handle(ctx: &Ctx, args: ScoreArgs) -> Result<Status> {
    let bytes = read_source(&args.file)?;
    let name = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("candidate.json");
    let doc = Document::decode(DocPath::new(name)?, &bytes)?;

    let verdict = QualityGate::new(ctx.config.quality.clone()).evaluate(&doc);
    ctx.print(&verdict, || render::render_verdict(&verdict))?;
    Ok(Status::Ok)
}
