//! Quality scoring.
//!
//! A candidate is scored from the trimmed length of a short-form field and a
//! long-form field, each normalized against the length at which it counts as
//! complete. The weighted average decides, except that a field reaching the
//! standout mark on its own lifts the score to that field's value.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Document, DocumentFormat};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub threshold: f64,
    pub summary_field: String,
    pub body_field: String,
    pub summary_full_chars: usize,
    pub body_full_chars: usize,
    pub summary_weight: f64,
    pub standout: f64,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            summary_field: "summary".to_string(),
            body_field: "body".to_string(),
            summary_full_chars: 100,
            body_full_chars: 500,
            summary_weight: 0.3,
            standout: 1.0,
        }
    }
}

/// Score in `[0, 1]`, rounded to four decimals.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityScore(f64);

impl QualityScore {
    pub const ZERO: QualityScore = QualityScore(0.0);

    fn new(raw: f64) -> Self {
        let clamped = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
        Self((clamped * 10_000.0).round() / 10_000.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QualityVerdict {
    pub score: QualityScore,
    pub threshold: f64,
    pub persist: bool,
}

#[derive(Clone, Debug)]
pub struct QualityGate {
    policy: QualityPolicy,
}

enum Field<'a> {
    Missing,
    Text(&'a str),
    Invalid,
}

impl QualityGate {
    pub fn new(policy: QualityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &QualityPolicy {
        &self.policy
    }

    /// Pure and total: malformed fields score zero instead of failing.
    pub fn score(&self, doc: &Document) -> QualityScore {
        let (summary, body) = match doc.format() {
            DocumentFormat::Text => (Field::Missing, text_field(doc.content())),
            DocumentFormat::Json => (
                lookup(doc, &self.policy.summary_field),
                lookup(doc, &self.policy.body_field),
            ),
        };
        let (summary, body) = match (summary, body) {
            (Field::Invalid, _) | (_, Field::Invalid) => return QualityScore::ZERO,
            (s, b) => (
                normalized(&s, self.policy.summary_full_chars),
                normalized(&b, self.policy.body_full_chars),
            ),
        };

        let weight = self.policy.summary_weight.clamp(0.0, 1.0);
        let average = weight * summary + (1.0 - weight) * body;
        let best = summary.max(body);
        if best >= self.policy.standout {
            QualityScore::new(average.max(best))
        } else {
            QualityScore::new(average)
        }
    }

    pub fn evaluate(&self, doc: &Document) -> QualityVerdict {
        let score = self.score(doc);
        QualityVerdict {
            score,
            threshold: self.policy.threshold,
            persist: score.value() >= self.policy.threshold,
        }
    }

    pub fn persist(&self, doc: &Document) -> bool {
        self.evaluate(doc).persist
    }
}

fn text_field(value: &Value) -> Field<'_> {
    match value {
        Value::String(s) => Field::Text(s),
        Value::Null => Field::Missing,
        _ => Field::Invalid,
    }
}

/// `content.<name>` first, then a top-level key of the same name.
fn lookup<'a>(doc: &'a Document, name: &str) -> Field<'a> {
    if let Value::Object(content) = doc.content()
        && let Some(value) = content.get(name)
    {
        return text_field(value);
    }
    match doc.extra().get(name) {
        Some(value) => text_field(value),
        None => Field::Missing,
    }
}

fn normalized(field: &Field<'_>, full_chars: usize) -> f64 {
    let Field::Text(text) = field else {
        return 0.0;
    };
    let len = text.trim().chars().count();
    if full_chars == 0 {
        return if len > 0 { 1.0 } else { 0.0 };
    }
    (len as f64 / full_chars as f64).min(1.0)
}
