use super::cancel::{cancellation, CancelToken};
use super::crawler::{CrawlEnd, Crawler};
use super::fetch::{fetch_with_retry, FetchPolicy};
use crate::app::ports::DocumentFetcher;
use crate::config::PipelineConfig;
use crate::error::ExtractionError;
use crate::infra::{PacedFetcher, PacingLimits, RequestPacer};
use crate::metrics::ExtractionMetrics;
use crate::parser::RecordExtractor;
use crate::strategies::ExtractionStrategy;
use crate::types::{CrawlCandidate, DisasterRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Result of one complete pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub strategy: String,
    pub extractor_version: String,
    /// One record per reference id, ordered by id
    pub records: Vec<DisasterRecord>,
    pub errors: Vec<ExtractionError>,
    pub pages_crawled: u32,
    pub partial: bool,
    pub crawl_end: CrawlEnd,
    pub identity_missing: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_active()).count()
    }

    pub fn needs_review_count(&self) -> usize {
        self.records.iter().filter(|r| r.needs_review).count()
    }

    pub fn get(&self, reference_id: &str) -> Option<&DisasterRecord> {
        self.records
            .binary_search_by(|r| r.reference_id.as_str().cmp(reference_id))
            .ok()
            .map(|i| &self.records[i])
    }
}

enum WorkOutcome {
    Record(DisasterRecord),
    Failed(ExtractionError),
}

struct CrawlSummary {
    end: CrawlEnd,
    pages: u32,
    queued: usize,
}

/// One parameterized pipeline: crawl, then extract detail pages over a
/// bounded worker pool. Instantiated once per extraction strategy.
pub struct Pipeline {
    strategy: Arc<dyn ExtractionStrategy>,
    fetcher: Arc<dyn DocumentFetcher>,
    listing_url: String,
    config: PipelineConfig,
    extractor: Arc<RecordExtractor>,
}

impl Pipeline {
    pub fn new(
        strategy: Arc<dyn ExtractionStrategy>,
        fetcher: Arc<dyn DocumentFetcher>,
        listing_url: impl Into<String>,
        config: PipelineConfig,
    ) -> Self {
        let extractor = Arc::new(RecordExtractor::new(strategy.name()));
        Self {
            strategy,
            fetcher,
            listing_url: listing_url.into(),
            config,
            extractor,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn extractor_version(&self) -> &str {
        self.extractor.extractor_version()
    }

    /// Run to completion. Never fails: listing and record errors are
    /// collected and an early stop is reported through `partial`.
    #[instrument(skip_all, fields(strategy = self.strategy.name()))]
    pub async fn run(&self, cancel: CancelToken) -> PipelineResult {
        let started_at = Utc::now();
        let t_run = std::time::Instant::now();
        let strategy_name = self.strategy.name();
        info!(listing_url = %self.listing_url, concurrency = self.config.concurrency, "🚀 Starting pipeline run");

        // Run-local token tripped by the external token or the wall-clock budget
        let (run_handle, run_token) = cancellation();
        let budget = self.config.run_budget();
        let watchdog = tokio::spawn(async move {
            match budget {
                Some(budget) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(budget) => {
                            warn!(budget_secs = budget.as_secs(), "Run budget exceeded, cancelling");
                        }
                    }
                }
                None => cancel.cancelled().await,
            }
            run_handle.cancel();
        });

        let pacer = RequestPacer::new(PacingLimits {
            requests_per_min: self.config.requests_per_min,
            min_delay: self.config.min_delay(),
            max_delay: self.config.max_delay(),
        });
        let fetcher: Arc<dyn DocumentFetcher> = Arc::new(PacedFetcher::new(self.fetcher.clone(), pacer));
        let policy = FetchPolicy::from_config(&self.config);
        let workers = self.config.concurrency.max(1);

        let (work_tx, work_rx) = mpsc::channel::<CrawlCandidate>(workers * 4);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<WorkOutcome>();

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let strategy = Arc::clone(&self.strategy);
            let fetcher = Arc::clone(&fetcher);
            let extractor = Arc::clone(&self.extractor);
            let policy = policy.clone();
            let token = run_token.clone();
            pool.spawn(async move {
                loop {
                    let next = { work_rx.lock().await.recv().await };
                    let Some(candidate) = next else { break };
                    if token.is_cancelled() {
                        debug!(worker_id, "Worker stopping after cancellation");
                        break;
                    }
                    let outcome =
                        process_candidate(&candidate, strategy.as_ref(), fetcher.as_ref(), &extractor, &policy, &token)
                            .await;
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);
        drop(work_rx);

        let mut crawler = Crawler::new(
            Arc::clone(&self.strategy),
            Arc::clone(&fetcher),
            self.listing_url.clone(),
            self.config.max_pages,
            policy.clone(),
            run_token.clone(),
        );
        let crawl_token = run_token.clone();
        let crawl = tokio::spawn(async move {
            let mut queued = 0usize;
            'pages: while let Some(batch) = crawler.next_page().await {
                for candidate in batch {
                    if crawl_token.is_cancelled() {
                        break 'pages;
                    }
                    tokio::select! {
                        sent = work_tx.send(candidate) => {
                            if sent.is_err() {
                                break 'pages;
                            }
                        }
                        _ = crawl_token.cancelled() => break 'pages,
                    }
                    queued += 1;
                }
            }
            // The crawler records cancellation on its next call
            if crawler.end().is_none() {
                crawler.next_page().await;
            }
            CrawlSummary {
                end: crawler.end().cloned().unwrap_or(CrawlEnd::Cancelled),
                pages: crawler.pages_crawled(),
                queued,
            }
        });

        // Single writer: only this loop touches the accumulated results
        let mut records: BTreeMap<String, DisasterRecord> = BTreeMap::new();
        let mut errors = Vec::new();
        let mut identity_missing = 0;
        let mut processed = 0usize;
        let mut abandoned = 0usize;
        while let Some(outcome) = result_rx.recv().await {
            processed += 1;
            match outcome {
                WorkOutcome::Record(record) => {
                    ExtractionMetrics::record_extracted(strategy_name, record.needs_review);
                    if records.contains_key(&record.reference_id) {
                        warn!(reference_id = %record.reference_id, url = %record.source_url, "Duplicate reference id, keeping first");
                        continue;
                    }
                    records.insert(record.reference_id.clone(), record);
                }
                WorkOutcome::Failed(error) => {
                    if error.is_identity_missing() {
                        identity_missing += 1;
                        ExtractionMetrics::record_failed(strategy_name, "identity_missing");
                    } else if error.is_cancelled() {
                        abandoned += 1;
                        ExtractionMetrics::record_failed(strategy_name, "cancelled");
                    } else {
                        ExtractionMetrics::record_failed(strategy_name, "detail_fetch");
                    }
                    warn!(error = %error, "Record skipped");
                    errors.push(error);
                }
            }
        }

        let summary = match crawl.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Crawl task did not complete");
                CrawlSummary {
                    end: CrawlEnd::Aborted,
                    pages: 0,
                    queued: processed,
                }
            }
        };
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker task did not complete");
            }
        }
        let cancelled = run_token.is_cancelled();
        watchdog.abort();

        if let CrawlEnd::FetchFailed { error } = &summary.end {
            errors.push(ExtractionError::ListingFetch { error: error.clone() });
        }

        // Units abandoned to cancellation leave the record set incomplete even
        // when the listing crawl itself finished
        let partial = summary.end.is_partial() || processed < summary.queued || abandoned > 0 || cancelled;
        let finished_at = Utc::now();
        ExtractionMetrics::run_duration(strategy_name, t_run.elapsed().as_secs_f64());
        info!(
            records = records.len(),
            errors = errors.len(),
            pages = summary.pages,
            queued = summary.queued,
            processed,
            abandoned,
            partial,
            crawl_end = summary.end.as_str(),
            "✅ Pipeline run finished"
        );

        PipelineResult {
            strategy: strategy_name.to_string(),
            extractor_version: self.extractor.extractor_version().to_string(),
            records: records.into_values().collect(),
            errors,
            pages_crawled: summary.pages,
            partial,
            crawl_end: summary.end,
            identity_missing,
            started_at,
            finished_at,
        }
    }
}

async fn process_candidate(
    candidate: &CrawlCandidate,
    strategy: &dyn ExtractionStrategy,
    fetcher: &dyn DocumentFetcher,
    extractor: &RecordExtractor,
    policy: &FetchPolicy,
    cancel: &CancelToken,
) -> WorkOutcome {
    let document = match fetch_with_retry(fetcher, &candidate.detail_url, policy, cancel).await {
        Ok(document) => document,
        Err(error) => {
            return WorkOutcome::Failed(ExtractionError::DetailFetch {
                url: candidate.detail_url.clone(),
                error,
            })
        }
    };
    let detail = strategy.parse_detail(&document);
    match extractor.extract(candidate, &detail, &document, Utc::now()) {
        Ok(record) => WorkOutcome::Record(record),
        Err(error) => WorkOutcome::Failed(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::infra::FixtureFetcher;
    use crate::strategies::table_rows::TableRowStrategy;
    use crate::types::DeclarationStatus;
    use std::time::{Duration, Instant};

    const ROOT: &str = "https://registry.test/list";

    fn config() -> PipelineConfig {
        PipelineConfig {
            concurrency: 2,
            min_delay_ms: 0,
            max_delay_ms: 0,
            request_timeout_secs: 1,
            max_pages: 10,
            max_retries: 1,
            retry_backoff_ms: 1,
            requests_per_min: None,
            run_budget_secs: None,
        }
    }

    fn listing(rows: &[(&str, &str)]) -> String {
        let rows: String = rows
            .iter()
            .map(|(id, end)| {
                format!(
                    r#"<tr><td>1 March 2025</td><td>{end}</td><td>QLD</td><td>Flood</td><td><a href="/disasters/{id}">Event {id}</a></td><td>{id}</td></tr>"#
                )
            })
            .collect();
        format!("<table>{rows}</table>")
    }

    fn detail() -> &'static str {
        "<h1>Event</h1><ul><li>Brisbane</li></ul>"
    }

    fn pipeline(fetcher: FixtureFetcher) -> Pipeline {
        Pipeline::new(Arc::new(TableRowStrategy::new()), Arc::new(fetcher), ROOT, config())
    }

    fn detail_url(id: &str) -> String {
        format!("https://registry.test/disasters/{id}")
    }

    /// A registry of `count` active declarations, every detail page served
    fn registry(count: usize) -> FixtureFetcher {
        let ids: Vec<String> = (1..=count).map(|n| format!("AGRN-{n}")).collect();
        let rows: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), "-")).collect();
        ids.iter()
            .fold(FixtureFetcher::new().with_page(ROOT, listing(&rows)), |f, id| {
                f.with_page(detail_url(id), detail())
            })
    }

    #[tokio::test]
    async fn test_run_collects_records_and_errors() {
        let fetcher = FixtureFetcher::new()
            .with_page(ROOT, listing(&[("AGRN-1", "-"), ("AGRN-2", "1 January 2020"), ("AGRN-3", "-")]))
            .with_page("https://registry.test/disasters/AGRN-1", detail())
            .with_page("https://registry.test/disasters/AGRN-2", detail());

        let result = pipeline(fetcher).run(CancelToken::never()).await;

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.get("AGRN-1").unwrap().status, DeclarationStatus::Active);
        assert_eq!(result.get("AGRN-2").unwrap().status, DeclarationStatus::Expired);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], ExtractionError::DetailFetch { .. }));
        assert_eq!(result.crawl_end, CrawlEnd::Exhausted);
        assert!(!result.partial);
        assert_eq!(result.pages_crawled, 1);
        assert!(result.extractor_version.starts_with("table_rows/"));
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_partial() {
        let result = pipeline(FixtureFetcher::new()).run(CancelToken::never()).await;

        assert!(result.partial);
        assert!(result.records.is_empty());
        assert!(matches!(result.errors[0], ExtractionError::ListingFetch { .. }));
    }

    #[tokio::test]
    async fn test_external_cancel_yields_partial_result() {
        let fetcher = FixtureFetcher::new()
            .with_page(ROOT, listing(&[("AGRN-1", "-"), ("AGRN-2", "-"), ("AGRN-3", "-")]))
            .with_page("https://registry.test/disasters/AGRN-1", detail())
            .with_page("https://registry.test/disasters/AGRN-2", detail())
            .with_page("https://registry.test/disasters/AGRN-3", detail())
            .with_latency(Duration::from_millis(50));
        let (handle, token) = cancellation();
        let pipeline = pipeline(fetcher);

        let run = pipeline.run(token);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        };
        let (result, _) = tokio::join!(run, cancel);

        assert!(result.partial);
        assert!(result.records.len() < 3);
    }

    #[tokio::test]
    async fn test_cancel_during_detail_backoff_is_partial() {
        let fetcher = registry(1).with_failure(
            detail_url("AGRN-1"),
            FetchError::Status {
                url: detail_url("AGRN-1"),
                status: 503,
            },
        );
        let config = PipelineConfig {
            max_retries: 3,
            retry_backoff_ms: 2000,
            ..config()
        };
        let pipeline = Pipeline::new(Arc::new(TableRowStrategy::new()), Arc::new(fetcher), ROOT, config);
        let (handle, token) = cancellation();

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        };
        let (result, _) = tokio::join!(pipeline.run(token), cancel);

        // The listing was fully crawled; only the detail unit was lost
        assert_eq!(result.crawl_end, CrawlEnd::Exhausted);
        assert!(result.records.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].is_cancelled());
        assert!(result.partial);
    }

    #[tokio::test]
    async fn test_detail_fetches_never_exceed_concurrency() {
        let fetcher = Arc::new(registry(8).with_latency(Duration::from_millis(30)));
        let pipeline = Pipeline::new(Arc::new(TableRowStrategy::new()), fetcher.clone(), ROOT, config());

        let result = pipeline.run(CancelToken::never()).await;

        assert_eq!(result.records.len(), 8);
        assert!(!result.partial);
        assert_eq!(fetcher.fetch_count(), 9);
        assert_eq!(fetcher.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_single_worker_fetches_one_at_a_time() {
        let fetcher = Arc::new(registry(4).with_latency(Duration::from_millis(10)));
        let config = PipelineConfig {
            concurrency: 1,
            ..config()
        };
        let pipeline = Pipeline::new(Arc::new(TableRowStrategy::new()), fetcher.clone(), ROOT, config);

        let result = pipeline.run(CancelToken::never()).await;

        assert_eq!(result.records.len(), 4);
        assert_eq!(fetcher.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_run_budget_expiry_cancels_run() {
        let fetcher = registry(6).with_latency(Duration::from_millis(400));
        let config = PipelineConfig {
            concurrency: 1,
            run_budget_secs: Some(1),
            ..config()
        };
        let pipeline = Pipeline::new(Arc::new(TableRowStrategy::new()), Arc::new(fetcher), ROOT, config);

        let started = Instant::now();
        let result = pipeline.run(CancelToken::never()).await;

        // Unbudgeted the run needs 7 x 400ms
        assert!(started.elapsed() < Duration::from_millis(2500));
        assert!(result.partial);
        assert!(result.records.len() < 6);
    }
}
