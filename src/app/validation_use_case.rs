use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::ports::{DocumentFetcher, RecordStore, ValidationSink};
use crate::config::Config;
use crate::pipeline::{CancelToken, Pipeline};
use crate::storage::{UpsertSummary, Upserter};
use crate::strategies::create_strategy;
use crate::validation::{ValidationEngine, ValidationReport};

/// What a validation run ended in. A failing verdict is an outcome, not an
/// error.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Committed {
        report: ValidationReport,
        summary: UpsertSummary,
    },
    /// The verdict failed; nothing was written to the canonical store
    DiscrepancyThresholdExceeded { report: ValidationReport },
}

impl RunOutcome {
    pub fn report(&self) -> &ValidationReport {
        match self {
            RunOutcome::Committed { report, .. } | RunOutcome::DiscrepancyThresholdExceeded { report } => report,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, RunOutcome::Committed { .. })
    }
}

/// Operator trigger: validate, record the run, and commit on pass
pub struct ValidationUseCase {
    engine: ValidationEngine,
    sink: Arc<dyn ValidationSink>,
    upserter: Upserter,
}

impl ValidationUseCase {
    pub fn new(engine: ValidationEngine, sink: Arc<dyn ValidationSink>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            engine,
            sink,
            upserter: Upserter::new(store),
        }
    }

    /// Wire both pipelines from configuration over one fetcher and one
    /// store serving as both canonical store and audit log.
    pub fn from_config<S>(config: &Config, fetcher: Arc<dyn DocumentFetcher>, store: Arc<S>) -> Result<Self>
    where
        S: RecordStore + ValidationSink + 'static,
    {
        let strategy_a = create_strategy(&config.validation.strategy_a)?;
        let strategy_b = create_strategy(&config.validation.strategy_b)?;
        let pipeline_a = Pipeline::new(
            strategy_a,
            Arc::clone(&fetcher),
            config.source.listing_url.clone(),
            config.pipeline.clone(),
        );
        let pipeline_b = Pipeline::new(
            strategy_b,
            fetcher,
            config.source.listing_url.clone(),
            config.pipeline.clone(),
        );
        let engine = ValidationEngine::new(pipeline_a, pipeline_b, &config.validation);
        Ok(Self::new(engine, store.clone(), store))
    }

    pub async fn run_validation(&self, cancel: CancelToken) -> Result<RunOutcome> {
        let report = self.engine.run(cancel).await;

        // The audit record is written before any commit; without it nothing is committed
        self.sink
            .record_validation_run(&report)
            .await
            .with_context(|| format!("recording validation run {}", report.run_id))?;

        if !report.is_pass() {
            warn!(
                run_id = %report.run_id,
                score = report.confidence_score,
                discrepancies = report.discrepancies.len(),
                "Validation did not pass, commit withheld"
            );
            return Ok(RunOutcome::DiscrepancyThresholdExceeded { report });
        }

        let summary = self
            .upserter
            .commit(&report)
            .await
            .with_context(|| format!("committing records for run {}", report.run_id))?;
        info!(run_id = %report.run_id, records = summary.total(), "Validation run committed");
        Ok(RunOutcome::Committed { report, summary })
    }
}
