use crate::app::ports::{Document, DocumentFetcher};
use crate::error::FetchError;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacingLimits {
    pub requests_per_min: Option<u64>,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

/// Per-run request pacing: a requests-per-minute token bucket plus a
/// jittered minimum gap between consecutive requests. Clones share state.
#[derive(Clone, Debug)]
pub struct RequestPacer {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    limits: PacingLimits,
    // token bucket modeled by the current tokens and the time of last refill
    rpm_tokens: Mutex<(f64, Instant)>,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(limits: PacingLimits) -> Self {
        let capacity = limits.requests_per_min.unwrap_or(0) as f64;
        Self {
            inner: Arc::new(Inner {
                limits,
                rpm_tokens: Mutex::new((capacity, Instant::now())),
                last_request: Mutex::new(None),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(PacingLimits::default())
    }

    /// Wait until the next request may be issued
    pub async fn acquire(&self) {
        if let Some(rpm) = self.inner.limits.requests_per_min {
            if rpm > 0 {
                self.consume_token(rpm as f64, 60.0).await;
            }
        }
        self.space_out().await;
    }

    async fn consume_token(&self, capacity: f64, period_secs: f64) {
        loop {
            let mut guard = self.inner.rpm_tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let refill_rate = capacity / period_secs;
            *tokens = (*tokens + now.duration_since(*last).as_secs_f64() * refill_rate).min(capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                break;
            }
            let secs = (1.0 - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.001))).await;
        }
    }

    // The lock is held across the sleep so concurrent callers queue up
    async fn space_out(&self) {
        let mut last = self.inner.last_request.lock().await;
        let gap = self.jitter();
        if let Some(prev) = *last {
            let ready_at = prev + gap;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn jitter(&self) -> Duration {
        let PacingLimits { min_delay, max_delay, .. } = self.inner.limits;
        if max_delay <= min_delay {
            return min_delay;
        }
        let ms = rand::thread_rng()
            .gen_range(min_delay.as_millis() as u64..=max_delay.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

/// Applies a [`RequestPacer`] in front of another fetcher
pub struct PacedFetcher {
    inner: Arc<dyn DocumentFetcher>,
    pacer: RequestPacer,
}

impl PacedFetcher {
    pub fn new(inner: Arc<dyn DocumentFetcher>, pacer: RequestPacer) -> Self {
        Self { inner, pacer }
    }
}

#[async_trait]
impl DocumentFetcher for PacedFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        self.pacer.acquire().await;
        self.inner.fetch(url).await
    }
}
