//! Replica reconciliation.
//!
//! Whole-document last-writer-wins by embedded timestamp. There is no
//! field-level merge: concurrent edits inside one reconcile window lose to
//! whichever side carries the later timestamp.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{Document, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    PushToDurable,
    PullToEphemeral,
    NoOp,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncAction::PushToDurable => "push_to_durable",
            SyncAction::PullToEphemeral => "pull_to_ephemeral",
            SyncAction::NoOp => "no_op",
        })
    }
}

/// Direction to take when either timestamp is missing or unparseable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// The live copy wins.
    #[default]
    PreferEphemeral,
    PreferDurable,
    Skip,
}

impl AmbiguityPolicy {
    fn action(self) -> SyncAction {
        match self {
            AmbiguityPolicy::PreferEphemeral => SyncAction::PushToDurable,
            AmbiguityPolicy::PreferDurable => SyncAction::PullToEphemeral,
            AmbiguityPolicy::Skip => SyncAction::NoOp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    Bootstrap,
    OnlyDurable,
    BothAbsent,
    Ambiguous,
    EphemeralNewer,
    DurableNewer,
    Equal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcileDecision {
    pub action: SyncAction,
    pub basis: DecisionBasis,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Reconciler {
    ambiguity: AmbiguityPolicy,
}

impl Reconciler {
    pub fn new(ambiguity: AmbiguityPolicy) -> Self {
        Self { ambiguity }
    }

    pub fn ambiguity(&self) -> AmbiguityPolicy {
        self.ambiguity
    }

    pub fn reconcile(&self, ephemeral: Option<&Document>, durable: Option<&Document>) -> SyncAction {
        self.reconcile_explained(ephemeral, durable).action
    }

    pub fn reconcile_explained(
        &self,
        ephemeral: Option<&Document>,
        durable: Option<&Document>,
    ) -> ReconcileDecision {
        let decide = |action, basis| ReconcileDecision { action, basis };
        let (ephemeral, durable) = match (ephemeral, durable) {
            (None, None) => return decide(SyncAction::NoOp, DecisionBasis::BothAbsent),
            (Some(_), None) => return decide(SyncAction::PushToDurable, DecisionBasis::Bootstrap),
            (None, Some(_)) => {
                return decide(SyncAction::PullToEphemeral, DecisionBasis::OnlyDurable);
            }
            (Some(e), Some(d)) => (e, d),
        };

        let (Some(e_at), Some(d_at)) = (parsed(ephemeral), parsed(durable)) else {
            return decide(self.ambiguity.action(), DecisionBasis::Ambiguous);
        };
        match e_at.cmp(&d_at) {
            Ordering::Greater => decide(SyncAction::PushToDurable, DecisionBasis::EphemeralNewer),
            Ordering::Less => decide(SyncAction::PullToEphemeral, DecisionBasis::DurableNewer),
            Ordering::Equal => decide(SyncAction::NoOp, DecisionBasis::Equal),
        }
    }
}

fn parsed(doc: &Document) -> Option<Timestamp> {
    doc.parsed_timestamp().and_then(Result::ok)
}

/// Reconcile with the default policy (ephemeral wins on ambiguity).
pub fn reconcile(ephemeral: Option<&Document>, durable: Option<&Document>) -> SyncAction {
    Reconciler::default().reconcile(ephemeral, durable)
}
