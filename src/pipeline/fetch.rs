use super::cancel::CancelToken;
use crate::app::ports::{Document, DocumentFetcher};
use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::metrics::FetchMetrics;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Ceiling on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Timeout and bounded retry applied to every page and detail fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl FetchPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        }
    }

    /// Exponential: backoff, 2x, 4x, ... capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Fetch with a per-attempt timeout, retrying retryable failures. The
/// attempt in flight is never interrupted by cancellation, but no new
/// attempt starts once the token is cancelled.
pub async fn fetch_with_retry(
    fetcher: &dyn DocumentFetcher,
    url: &str,
    policy: &FetchPolicy,
    cancel: &CancelToken,
) -> Result<Document, FetchError> {
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: url.to_string() });
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(policy.timeout, fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: policy.timeout.as_millis() as u64,
            }),
        };
        FetchMetrics::duration(started.elapsed().as_secs_f64());

        let error = match result {
            Ok(document) => return Ok(document),
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= policy.max_retries {
            FetchMetrics::failed(error.kind());
            debug!(url, attempts = attempt + 1, error = %error, "Giving up on fetch");
            return Err(error);
        }

        let delay = policy.delay_for(attempt);
        warn!(url, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %error, "Retrying fetch");
        FetchMetrics::retry(error.kind());
        attempt += 1;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
        }
    }
}
