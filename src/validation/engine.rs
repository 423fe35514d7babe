use super::report::{
    Discrepancy, DiscrepancyField, FailReason, Severity, StateActiveCounts, ValidationReport, Verdict,
};
use crate::config::ValidationConfig;
use crate::metrics::ValidationMetrics;
use crate::pipeline::{CancelToken, Pipeline, PipelineResult};
use crate::types::{DisasterRecord, StateCode};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Cross-checks two independently configured pipelines over the same source
pub struct ValidationEngine {
    pipeline_a: Pipeline,
    pipeline_b: Pipeline,
    threshold: f64,
    allow_partial: bool,
}

impl ValidationEngine {
    pub fn new(pipeline_a: Pipeline, pipeline_b: Pipeline, config: &ValidationConfig) -> Self {
        Self {
            pipeline_a,
            pipeline_b,
            threshold: config.confidence_threshold,
            allow_partial: config.allow_partial,
        }
    }

    /// Both pipelines run concurrently and are compared once both finish
    #[instrument(skip_all, fields(a = self.pipeline_a.strategy_name(), b = self.pipeline_b.strategy_name()))]
    pub async fn run(&self, cancel: CancelToken) -> ValidationReport {
        let (result_a, result_b) = tokio::join!(
            self.pipeline_a.run(cancel.clone()),
            self.pipeline_b.run(cancel)
        );
        evaluate(result_a, result_b, self.threshold, self.allow_partial)
    }
}

/// Per-record comparison of two result sets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comparison {
    pub discrepancies: Vec<Discrepancy>,
    pub records_compared: usize,
    /// Ids with at least one high-severity discrepancy
    pub high_severity_ids: BTreeSet<String>,
    /// High-severity ids where either side reports the record active
    pub active_high_ids: BTreeSet<String>,
}

/// Score in 0..=100: the share of compared records free of high-severity
/// discrepancies. Zero records scores zero.
pub fn confidence_score(high_severity_records: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let clean = total.saturating_sub(high_severity_records);
    (100.0 * clean as f64 / total as f64).max(0.0)
}

pub fn compare(a: &PipelineResult, b: &PipelineResult) -> Comparison {
    let ids: BTreeSet<&str> = a
        .records
        .iter()
        .chain(b.records.iter())
        .map(|r| r.reference_id.as_str())
        .collect();

    let mut comparison = Comparison {
        records_compared: ids.len(),
        ..Comparison::default()
    };

    for id in ids {
        let found = match (a.get(id), b.get(id)) {
            (Some(ra), Some(rb)) => compare_pair(ra, rb),
            (Some(ra), None) => vec![presence(id, Some(ra), None)],
            (None, Some(rb)) => vec![presence(id, None, Some(rb))],
            (None, None) => continue,
        };

        if found.iter().any(|d| d.severity == Severity::High) {
            comparison.high_severity_ids.insert(id.to_string());
            let active = a.get(id).map(DisasterRecord::is_active).unwrap_or(false)
                || b.get(id).map(DisasterRecord::is_active).unwrap_or(false);
            if active {
                comparison.active_high_ids.insert(id.to_string());
            }
        }
        comparison.discrepancies.extend(found);
    }

    comparison
}

fn presence(id: &str, a: Option<&DisasterRecord>, b: Option<&DisasterRecord>) -> Discrepancy {
    let describe = |r: Option<&DisasterRecord>| r.map(|r| r.status.as_str().to_string());
    Discrepancy {
        reference_id: id.to_string(),
        field: DiscrepancyField::Presence,
        value_a: describe(a),
        value_b: describe(b),
        severity: Severity::High,
    }
}

fn compare_pair(a: &DisasterRecord, b: &DisasterRecord) -> Vec<Discrepancy> {
    let id = &a.reference_id;
    let mut found = Vec::new();
    let mut push = |field, value_a: String, value_b: String, severity| {
        found.push(Discrepancy {
            reference_id: id.clone(),
            field,
            value_a: Some(value_a),
            value_b: Some(value_b),
            severity,
        })
    };

    if a.status != b.status {
        push(
            DiscrepancyField::Status,
            a.status.to_string(),
            b.status.to_string(),
            Severity::High,
        );
    } else if a.expiry_date.is_none() != b.expiry_date.is_none() {
        // Reported separately only when status agrees; a status mismatch
        // already implies differing expiry nullness.
        let show = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "null".to_string());
        push(
            DiscrepancyField::ExpiryDate,
            show(a.expiry_date),
            show(b.expiry_date),
            Severity::High,
        );
    }

    if a.state_code != b.state_code {
        let show = |s: Option<crate::types::StateCode>| s.map(|s| s.to_string()).unwrap_or_default();
        push(
            DiscrepancyField::StateCode,
            show(a.state_code),
            show(b.state_code),
            Severity::Low,
        );
    }

    if a.affected_areas.len() != b.affected_areas.len() {
        push(
            DiscrepancyField::AffectedAreas,
            a.affected_areas.len().to_string(),
            b.affected_areas.len().to_string(),
            Severity::Low,
        );
    }

    found
}

/// Active declarations per jurisdiction on each side. Records without a
/// jurisdiction are left out.
pub fn active_by_state(result_a: &PipelineResult, result_b: &PipelineResult) -> BTreeMap<StateCode, StateActiveCounts> {
    let mut counts: BTreeMap<StateCode, StateActiveCounts> = BTreeMap::new();
    for record in result_a.records.iter().filter(|r| r.is_active()) {
        if let Some(state) = record.state_code {
            counts.entry(state).or_default().a += 1;
        }
    }
    for record in result_b.records.iter().filter(|r| r.is_active()) {
        if let Some(state) = record.state_code {
            counts.entry(state).or_default().b += 1;
        }
    }
    counts
}

/// Compare two results and reach a verdict
pub fn evaluate(
    result_a: PipelineResult,
    result_b: PipelineResult,
    threshold: f64,
    allow_partial: bool,
) -> ValidationReport {
    let comparison = compare(&result_a, &result_b);
    let high = comparison.high_severity_ids.len();
    let score = confidence_score(high, comparison.records_compared);

    let mut fail_reasons = Vec::new();
    if comparison.records_compared == 0 {
        fail_reasons.push(FailReason::NoRecords);
    }
    if score < threshold {
        fail_reasons.push(FailReason::BelowThreshold { score, threshold });
    }
    if !comparison.active_high_ids.is_empty() {
        fail_reasons.push(FailReason::ActiveRecordMismatch {
            reference_ids: comparison.active_high_ids.iter().cloned().collect(),
        });
    }
    let partial: Vec<String> = [&result_a, &result_b]
        .iter()
        .filter(|r| r.partial)
        .map(|r| r.strategy.clone())
        .collect();
    if !partial.is_empty() && !allow_partial {
        fail_reasons.push(FailReason::PartialCrawl { strategies: partial });
    }

    let verdict = if fail_reasons.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail
    };

    let needs_review: Vec<String> = result_a
        .records
        .iter()
        .chain(result_b.records.iter())
        .filter(|r| r.needs_review)
        .map(|r| r.reference_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if verdict == Verdict::Fail {
        warn!(score, threshold, reasons = ?fail_reasons, "Validation failed");
    } else {
        info!(score, threshold, compared = comparison.records_compared, "Validation passed");
    }
    ValidationMetrics::run_completed(verdict.as_str(), score, comparison.discrepancies.len());

    ValidationReport {
        run_id: Uuid::new_v4(),
        source_snapshot_time: result_a.started_at.min(result_b.started_at),
        active_count_a: result_a.active_count(),
        active_count_b: result_b.active_count(),
        active_by_state: active_by_state(&result_a, &result_b),
        discrepancies: comparison.discrepancies,
        records_compared: comparison.records_compared,
        high_severity_records: high,
        confidence_score: score,
        threshold,
        verdict,
        fail_reasons,
        needs_review,
        result_a,
        result_b,
        completed_at: Utc::now(),
    }
}
