//! Dual-pipeline cross-checking and the verdict that gates commits

pub mod engine;
pub mod report;

pub use engine::{active_by_state, compare, confidence_score, evaluate, ValidationEngine};
pub use report::{
    Discrepancy, DiscrepancyField, FailReason, Severity, StateActiveCounts, ValidationReport, Verdict,
};
