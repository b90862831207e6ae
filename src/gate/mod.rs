//! Write gates: decide whether a candidate is worth persisting at all.

pub mod dedup;
pub mod quality;

pub use dedup::{DedupVerdict, is_duplicate};
pub use quality::{QualityGate, QualityPolicy, QualityScore, QualityVerdict};
