use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown extraction strategy: {0}")]
    UnknownStrategy(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure to turn a URL into a document. Retried by the fetch policy,
/// then recorded; never fatal to a run on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("fetch of {url} abandoned after cancellation")]
    Cancelled { url: String },
}

impl FetchError {
    /// Client errors (4xx other than 408/429) will not change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            FetchError::Cancelled { .. } => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Transport { .. } => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Per-record failures. These are collected on the pipeline result and
/// never abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("no reference id recoverable from {url}")]
    IdentityMissing { url: String },

    #[error("detail fetch failed for {url}: {error}")]
    DetailFetch { url: String, error: FetchError },

    #[error("listing page fetch failed: {error}")]
    ListingFetch { error: FetchError },
}

impl ExtractionError {
    pub fn is_identity_missing(&self) -> bool {
        matches!(self, ExtractionError::IdentityMissing { .. })
    }

    /// A detail unit abandoned because the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ExtractionError::DetailFetch {
                error: FetchError::Cancelled { .. },
                ..
            }
        )
    }
}

/// Errors at the canonical store and audit log boundary
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation run {0} is already recorded")]
    DuplicateRun(Uuid),

    #[error("commit withheld: validation run {run_id} did not pass")]
    CommitWithheld { run_id: Uuid },

    #[error("store lock poisoned")]
    Poisoned,
}
