use crate::pipeline::PipelineResult;
use crate::types::StateCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Record field a discrepancy was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyField {
    /// Reference id produced by only one of the two pipelines
    Presence,
    Status,
    /// Nullness of the expiry date only
    ExpiryDate,
    StateCode,
    /// Cardinality only
    AffectedAreas,
}

impl DiscrepancyField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyField::Presence => "presence",
            DiscrepancyField::Status => "status",
            DiscrepancyField::ExpiryDate => "expiry_date",
            DiscrepancyField::StateCode => "state_code",
            DiscrepancyField::AffectedAreas => "affected_areas",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Changes an eligibility decision
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub reference_id: String,
    pub field: DiscrepancyField,
    pub value_a: Option<String>,
    pub value_b: Option<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
        }
    }
}

/// Why a run failed. A failing run can carry several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailReason {
    BelowThreshold { score: f64, threshold: f64 },
    /// High-severity discrepancies on records either side reports active
    ActiveRecordMismatch { reference_ids: Vec<String> },
    NoRecords,
    PartialCrawl { strategies: Vec<String> },
}

/// Outcome of one validation run. Written once to the audit log and never
/// updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub source_snapshot_time: DateTime<Utc>,
    pub result_a: PipelineResult,
    pub result_b: PipelineResult,
    pub discrepancies: Vec<Discrepancy>,
    pub records_compared: usize,
    pub high_severity_records: usize,
    pub confidence_score: f64,
    pub threshold: f64,
    pub verdict: Verdict,
    pub fail_reasons: Vec<FailReason>,
    /// Ids flagged for manual review by either pipeline
    pub needs_review: Vec<String>,
    pub active_count_a: usize,
    pub active_count_b: usize,
    /// Active declarations per jurisdiction as each side saw them
    #[serde(default)]
    pub active_by_state: BTreeMap<StateCode, StateActiveCounts>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateActiveCounts {
    pub a: usize,
    pub b: usize,
}

impl StateActiveCounts {
    pub fn differs(&self) -> bool {
        self.a != self.b
    }
}

impl ValidationReport {
    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn high_severity_count(&self) -> usize {
        self.discrepancies
            .iter()
            .filter(|d| d.severity == Severity::High)
            .count()
    }

    pub fn discrepancies_for<'a>(&'a self, reference_id: &'a str) -> impl Iterator<Item = &'a Discrepancy> {
        self.discrepancies
            .iter()
            .filter(move |d| d.reference_id == reference_id)
    }
}
