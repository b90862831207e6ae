//! Human renderer for CLI output. Pure formatting.

use crate::daemon::{PoolStats, TickOutcome};
use crate::gate::QualityVerdict;
use crate::git::{Delivery, PushOutcome, PushResult, RefreshOutcome};
use crate::lock::LockStatus;

pub fn render_push(result: &PushResult) -> String {
    let path = &result.attempt.path;
    let mut out = match &result.outcome {
        PushOutcome::Success {
            delivery: Delivery::Pushed { commit },
        } => format!("✓ Published {path} ({})", short(commit)),
        PushOutcome::Success {
            delivery: Delivery::Signaled { record },
        } => format!("✓ Signaled {path} ({})", record.status.as_str()),
        PushOutcome::NoOp => format!("{path} already up to date"),
        PushOutcome::Conflict { detail } => format!("✗ Conflict on {path}: {detail}"),
        PushOutcome::Failed { error } => format!("✗ Publish of {path} failed: {error}"),
    };
    if result.attempt.retries > 0 {
        out.push_str(&format!("\n  Retries: {}", result.attempt.retries));
    }
    out
}

pub fn render_tick(resource: &str, outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::LockUnavailable { holder } => format!(
            "{resource}: locked by {}",
            holder.as_deref().unwrap_or("unknown holder")
        ),
        TickOutcome::NoCandidate => format!("{resource}: nothing to persist"),
        TickOutcome::QualityRejected { score } => {
            format!("{resource}: rejected by quality gate (score {score})")
        }
        TickOutcome::DuplicateSuppressed => format!("{resource}: unchanged, skipped"),
        TickOutcome::Reconciled { action } => format!("{resource}: reconciled ({action})"),
        TickOutcome::Pulled => format!("{resource}: pulled durable copy"),
        TickOutcome::Published(result) => format!("{resource}: {}", render_push(result)),
        TickOutcome::Failed { error } => format!("✗ {resource}: {error}"),
    }
}

pub fn render_verdict(verdict: &QualityVerdict) -> String {
    let decision = if verdict.persist { "persist" } else { "reject" };
    format!(
        "score {} (threshold {:.4}): {decision}",
        verdict.score, verdict.threshold
    )
}

pub fn render_lock(resource: &str, status: Option<&LockStatus>) -> String {
    let Some(status) = status else {
        return format!("{resource}: unlocked");
    };
    let holder = status
        .meta
        .as_ref()
        .map(|meta| format!("{} (pid {} on {})", meta.holder, meta.pid, meta.hostname))
        .unwrap_or_else(|| "unreadable token".to_string());
    let stale = if status.stale { ", stale" } else { "" };
    format!(
        "{resource}: held by {holder}\n  Age: {}s{stale}\n  Path: {}",
        status.age_ms / 1000,
        status.path.display()
    )
}

pub fn render_refresh(outcome: &RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::RemoteEmpty => "remote branch does not exist yet".into(),
        RefreshOutcome::UpToDate => "already up to date".into(),
        RefreshOutcome::FastForwarded { to } => format!("fast-forwarded to {}", short(to)),
        RefreshOutcome::LocalAhead => "local branch is ahead of the remote".into(),
        RefreshOutcome::Diverged => "✗ local and remote have diverged".into(),
    }
}

pub fn render_stats(stats: &PoolStats) -> String {
    if stats.is_empty() {
        return "no ticks ran".into();
    }
    let mut out = String::new();
    for (key, s) in stats {
        out.push_str(&format!(
            "{key}: {} ticks, {} published, {} skipped, {} failed\n",
            s.ticks, s.published, s.skipped, s.failures
        ));
    }
    out.truncate(out.trim_end().len());
    out
}

fn short(oid: &str) -> &str {
    oid.get(..8).unwrap_or(oid)
}
