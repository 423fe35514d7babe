//! Prometheus metrics for crawl, extraction, validation and store phases.
//!
//! Recording is always on; the exporter is only installed when
//! `PIPELINE_METRICS_ADDR` is set, so without it the calls are no-ops.

use std::net::SocketAddr;
use tracing::{info, warn};

pub const METRICS_ADDR_ENV: &str = "PIPELINE_METRICS_ADDR";

/// Install the Prometheus exporter if an address is configured
pub fn init_metrics() -> Option<SocketAddr> {
    let raw = std::env::var(METRICS_ADDR_ENV).ok()?;
    let addr: SocketAddr = match raw.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(value = %raw, error = %e, "Ignoring invalid metrics address");
            return None;
        }
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => {
            info!(%addr, "Prometheus exporter listening");
            Some(addr)
        }
        Err(e) => {
            warn!(%addr, error = %e, "Prometheus exporter install failed");
            None
        }
    }
}

pub struct CrawlMetrics;

impl CrawlMetrics {
    pub fn page_fetched(strategy: &'static str) {
        ::metrics::counter!("crawl_pages_total", "strategy" => strategy).increment(1);
    }

    pub fn candidates_queued(strategy: &'static str, count: usize) {
        ::metrics::counter!("crawl_candidates_total", "strategy" => strategy).increment(count as u64);
    }

    pub fn crawl_ended(strategy: &'static str, reason: &'static str) {
        ::metrics::counter!("crawl_ends_total", "strategy" => strategy, "reason" => reason).increment(1);
    }
}

pub struct FetchMetrics;

impl FetchMetrics {
    pub fn retry(kind: &'static str) {
        ::metrics::counter!("fetch_retries_total", "kind" => kind).increment(1);
    }

    pub fn failed(kind: &'static str) {
        ::metrics::counter!("fetch_failures_total", "kind" => kind).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!("fetch_duration_seconds").record(secs);
    }
}

pub struct ExtractionMetrics;

impl ExtractionMetrics {
    pub fn record_extracted(strategy: &'static str, needs_review: bool) {
        ::metrics::counter!("records_extracted_total", "strategy" => strategy).increment(1);
        if needs_review {
            ::metrics::counter!("records_needs_review_total", "strategy" => strategy).increment(1);
        }
    }

    pub fn record_failed(strategy: &'static str, kind: &'static str) {
        ::metrics::counter!("records_failed_total", "strategy" => strategy, "kind" => kind).increment(1);
    }

    pub fn run_duration(strategy: &'static str, secs: f64) {
        ::metrics::histogram!("pipeline_run_duration_seconds", "strategy" => strategy).record(secs);
    }
}

pub struct ValidationMetrics;

impl ValidationMetrics {
    pub fn run_completed(verdict: &'static str, confidence: f64, discrepancies: usize) {
        ::metrics::counter!("validation_runs_total", "verdict" => verdict).increment(1);
        ::metrics::gauge!("validation_confidence_score").set(confidence);
        ::metrics::gauge!("validation_discrepancies").set(discrepancies as f64);
    }
}

pub struct StoreMetrics;

impl StoreMetrics {
    pub fn upsert(outcome: &'static str) {
        ::metrics::counter!("store_upserts_total", "outcome" => outcome).increment(1);
    }

    pub fn commit_withheld() {
        ::metrics::counter!("store_commits_withheld_total").increment(1);
    }
}
