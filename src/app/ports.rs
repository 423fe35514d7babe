use crate::error::{FetchError, StoreError};
use crate::types::DisasterRecord;
use crate::validation::report::ValidationReport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A fetched source document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// Final URL after redirects; relative links resolve against it
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Document {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            body: body.into(),
        }
    }

    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(self.body.as_bytes()))
    }
}

// Source registry port: "fetch URL -> document". The transport behind it
// (plain HTTP, a rendering browser, fixtures) is swappable.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError>;
}

/// What an upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Replaced => "replaced",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }
}

// Canonical store port
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Idempotent upsert keyed by reference id. Identical content is a no-op;
    /// changed content replaces the prior row in full.
    async fn upsert(&self, record: &DisasterRecord) -> Result<UpsertOutcome, StoreError>;
    async fn get(&self, reference_id: &str) -> Result<Option<DisasterRecord>, StoreError>;
    async fn list_active(&self) -> Result<Vec<DisasterRecord>, StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
}

/// Summary row for a recorded validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRunSummary {
    pub run_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub verdict: String,
    pub confidence_score: f64,
}

// Append-only audit log of validation runs
#[async_trait]
pub trait ValidationSink: Send + Sync {
    async fn record_validation_run(&self, report: &ValidationReport) -> Result<(), StoreError>;
    async fn recent_runs(&self, limit: usize) -> Result<Vec<ValidationRunSummary>, StoreError>;
}
