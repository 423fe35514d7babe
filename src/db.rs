use crate::app::ports::{RecordStore, UpsertOutcome, ValidationRunSummary, ValidationSink};
use crate::error::StoreError;
use crate::storage::content_hash;
use crate::types::DisasterRecord;
use crate::validation::ValidationReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS disaster_declarations (
        reference_id     TEXT PRIMARY KEY,
        content_hash     TEXT NOT NULL,
        status           TEXT NOT NULL,
        expiry_date      TEXT,
        state_code       TEXT,
        document_sha256  TEXT NOT NULL,
        record_json      TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_declarations_status ON disaster_declarations(status);

    CREATE TABLE IF NOT EXISTS validation_runs (
        run_id             TEXT PRIMARY KEY,
        created_at         TEXT NOT NULL,
        verdict            TEXT NOT NULL,
        confidence_score   REAL NOT NULL,
        records_compared   INTEGER NOT NULL,
        discrepancy_count  INTEGER NOT NULL,
        report_json        TEXT NOT NULL
    );
    CREATE TRIGGER IF NOT EXISTS validation_runs_no_update
        BEFORE UPDATE ON validation_runs
        BEGIN SELECT RAISE(ABORT, 'validation_runs is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS validation_runs_no_delete
        BEFORE DELETE ON validation_runs
        BEGIN SELECT RAISE(ABORT, 'validation_runs is append-only'); END;
"#;

/// SQLite-backed canonical store and validation audit log
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!(path = %path.display(), "Opened declaration store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn decode(json: String) -> Result<DisasterRecord, StoreError> {
    Ok(serde_json::from_str(&json)?)
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert(&self, record: &DisasterRecord) -> Result<UpsertOutcome, StoreError> {
        let hash = content_hash(record)?;
        let conn = self.conn()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM disaster_declarations WHERE reference_id = ?1",
                params![record.reference_id],
                |row| row.get(0),
            )
            .optional()?;
        let outcome = match existing {
            Some(h) if h == hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };

        conn.execute(
            "INSERT INTO disaster_declarations
                 (reference_id, content_hash, status, expiry_date, state_code, document_sha256, record_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(reference_id) DO UPDATE SET
                 content_hash=excluded.content_hash,
                 status=excluded.status,
                 expiry_date=excluded.expiry_date,
                 state_code=excluded.state_code,
                 document_sha256=excluded.document_sha256,
                 record_json=excluded.record_json,
                 updated_at=excluded.updated_at",
            params![
                record.reference_id,
                hash,
                record.status.as_str(),
                record.expiry_date.map(|d| d.to_string()),
                record.state_code.map(|s| s.as_str()),
                record.document_sha256,
                serde_json::to_string(record)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(outcome)
    }

    async fn get(&self, reference_id: &str) -> Result<Option<DisasterRecord>, StoreError> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM disaster_declarations WHERE reference_id = ?1",
                params![reference_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(decode).transpose()
    }

    async fn list_active(&self) -> Result<Vec<DisasterRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT record_json FROM disaster_declarations WHERE status = 'active' ORDER BY reference_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for json in rows {
            records.push(decode(json?)?);
        }
        Ok(records)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM disaster_declarations", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl ValidationSink for SqliteStore {
    async fn record_validation_run(&self, report: &ValidationReport) -> Result<(), StoreError> {
        let report_json = serde_json::to_string(report)?;
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO validation_runs
                 (run_id, created_at, verdict, confidence_score, records_compared, discrepancy_count, report_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.run_id.to_string(),
                report.completed_at.to_rfc3339(),
                report.verdict.as_str(),
                report.confidence_score,
                report.records_compared as i64,
                report.discrepancies.len() as i64,
                report_json,
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateRun(report.run_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<ValidationRunSummary>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, created_at, verdict, confidence_score FROM validation_runs
             ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (run_id, created_at, verdict, confidence_score) = row?;
            runs.push(ValidationRunSummary {
                run_id: Uuid::parse_str(&run_id).unwrap_or_default(),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
                verdict,
                confidence_score,
            });
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeclarationStatus;
    use crate::validation::engine::tests::{record, result};
    use crate::validation::evaluate;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_upsert_roundtrip_and_idempotency() {
        let store = SqliteStore::open_in_memory().unwrap();
        let active = record("AGRN-1", DeclarationStatus::Active, None);
        let expired = record("AGRN-2", DeclarationStatus::Expired, NaiveDate::from_ymd_opt(2024, 1, 1));

        assert_eq!(store.upsert(&active).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&expired).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&active).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.get("AGRN-1").await.unwrap(), Some(active.clone()));
        assert_eq!(store.list_active().await.unwrap(), vec![active]);
        assert_eq!(store.get("AGRN-9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_changed_record_replaces_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&record("AGRN-1", DeclarationStatus::Active, None))
            .await
            .unwrap();
        let changed = record("AGRN-1", DeclarationStatus::Expired, NaiveDate::from_ymd_opt(2024, 1, 1));

        assert_eq!(store.upsert(&changed).await.unwrap(), UpsertOutcome::Replaced);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("AGRN-1").await.unwrap(), Some(changed));
    }

    #[tokio::test]
    async fn test_validation_runs_persist_and_reject_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        let report = evaluate(
            result("a", vec![record("AGRN-1", DeclarationStatus::Active, None)]),
            result("b", vec![record("AGRN-1", DeclarationStatus::Active, None)]),
            90.0,
            false,
        );

        {
            let store = SqliteStore::open(&path).unwrap();
            store.record_validation_run(&report).await.unwrap();
            assert!(matches!(
                store.record_validation_run(&report).await,
                Err(StoreError::DuplicateRun(_))
            ));
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let runs = reopened.recent_runs(5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, report.run_id);
        assert_eq!(runs[0].verdict, "pass");
        assert_eq!(runs[0].confidence_score, 100.0);
    }

    #[test]
    fn test_audit_rows_cannot_be_rewritten() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.conn().unwrap();
        conn.execute(
            "INSERT INTO validation_runs VALUES ('r1', '2025-01-01T00:00:00Z', 'pass', 100.0, 1, 0, '{}')",
            [],
        )
        .unwrap();
        assert!(conn
            .execute("UPDATE validation_runs SET verdict = 'fail'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM validation_runs", []).is_err());
    }
}
