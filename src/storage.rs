use crate::app::ports::{RecordStore, UpsertOutcome, ValidationRunSummary, ValidationSink};
use crate::error::StoreError;
use crate::metrics::StoreMetrics;
use crate::types::DisasterRecord;
use crate::validation::ValidationReport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Hash of a record's canonical JSON. Every field counts, `extractedAt`
/// included, so a re-extraction replaces the stored row.
pub fn content_hash(record: &DisasterRecord) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(record)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// In-memory store implementation for development/testing
#[derive(Default)]
pub struct InMemoryStore {
    records: Arc<Mutex<HashMap<String, (String, DisasterRecord)>>>,
    runs: Arc<Mutex<Vec<ValidationReport>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn upsert(&self, record: &DisasterRecord) -> Result<UpsertOutcome, StoreError> {
        let hash = content_hash(record)?;
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let outcome = match records.get(&record.reference_id) {
            Some((existing, _)) if *existing == hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        records.insert(record.reference_id.clone(), (hash, record.clone()));
        Ok(outcome)
    }

    async fn get(&self, reference_id: &str) -> Result<Option<DisasterRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(reference_id).map(|(_, r)| r.clone()))
    }

    async fn list_active(&self) -> Result<Vec<DisasterRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let mut active: Vec<DisasterRecord> = records
            .values()
            .filter(|(_, r)| r.is_active())
            .map(|(_, r)| r.clone())
            .collect();
        active.sort_by(|a, b| a.reference_id.cmp(&b.reference_id));
        Ok(active)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().map_err(|_| StoreError::Poisoned)?.len())
    }
}

#[async_trait]
impl ValidationSink for InMemoryStore {
    async fn record_validation_run(&self, report: &ValidationReport) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().map_err(|_| StoreError::Poisoned)?;
        if runs.iter().any(|r| r.run_id == report.run_id) {
            return Err(StoreError::DuplicateRun(report.run_id));
        }
        runs.push(report.clone());
        Ok(())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<ValidationRunSummary>, StoreError> {
        let runs = self.runs.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(runs
            .iter()
            .rev()
            .take(limit)
            .map(|r| ValidationRunSummary {
                run_id: r.run_id,
                created_at: r.completed_at,
                verdict: r.verdict.as_str().to_string(),
                confidence_score: r.confidence_score,
            })
            .collect())
    }
}

/// Counts from one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

impl UpsertSummary {
    fn add(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Replaced => self.replaced += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.replaced + self.unchanged
    }
}

/// Commits validated records to the canonical store. Only a passing
/// report is ever committed; the records written are pipeline A's.
pub struct Upserter {
    store: Arc<dyn RecordStore>,
}

impl Upserter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn commit(&self, report: &ValidationReport) -> Result<UpsertSummary, StoreError> {
        if !report.is_pass() {
            StoreMetrics::commit_withheld();
            warn!(run_id = %report.run_id, "Commit withheld for failing run");
            return Err(StoreError::CommitWithheld { run_id: report.run_id });
        }
        let summary = self.upsert_all(&report.result_a.records).await?;
        info!(
            run_id = %report.run_id,
            inserted = summary.inserted,
            replaced = summary.replaced,
            unchanged = summary.unchanged,
            "💾 Committed validated records"
        );
        Ok(summary)
    }

    async fn upsert_all(&self, records: &[DisasterRecord]) -> Result<UpsertSummary, StoreError> {
        let mut summary = UpsertSummary::default();
        for record in records {
            let outcome = self.store.upsert(record).await?;
            debug!(reference_id = %record.reference_id, outcome = outcome.as_str(), "Upserted record");
            StoreMetrics::upsert(outcome.as_str());
            summary.add(outcome);
        }
        Ok(summary)
    }
}
