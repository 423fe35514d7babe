use crate::app::ports::{Document, DocumentFetcher};
use crate::error::FetchError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Serves documents from memory. Used to replay captured pages and to
/// script transient failures in tests.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    failures: Mutex<HashMap<String, VecDeque<FetchError>>>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    /// Queue an error returned before the page is served. Errors are
    /// consumed one per fetch, in order.
    pub fn with_failure(self, url: impl Into<String>, error: FetchError) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.entry(url.into()).or_default().push_back(error);
        }
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Loads a JSON object of `url -> html` captured from an earlier run
    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let pages: HashMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self {
            pages,
            ..Self::default()
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn serve(&self, url: &str) -> Result<Document, FetchError> {
        let scripted = self
            .failures
            .lock()
            .ok()
            .and_then(|mut f| f.get_mut(url).and_then(|q| q.pop_front()));
        if let Some(error) = scripted {
            return Err(error);
        }

        self.pages
            .get(url)
            .map(|body| Document::new(url, body.clone()))
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[async_trait]
impl DocumentFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let _slot = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.serve(url)
    }
}

// Released on drop so a fetch abandoned by a timeout still leaves the count
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let running = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(running, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failure_then_page() {
        let fetcher = FixtureFetcher::new()
            .with_page("https://registry.test/a", "<p>a</p>")
            .with_failure(
                "https://registry.test/a",
                FetchError::Status {
                    url: "https://registry.test/a".to_string(),
                    status: 503,
                },
            );

        assert!(fetcher.fetch("https://registry.test/a").await.is_err());
        let doc = fetcher.fetch("https://registry.test/a").await.unwrap();
        assert_eq!(doc.body, "<p>a</p>");
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_peak_in_flight_counts_overlapping_fetches() {
        let fetcher = FixtureFetcher::new()
            .with_page("https://registry.test/a", "a")
            .with_latency(Duration::from_millis(20));
        let (a, b, c) = tokio::join!(
            fetcher.fetch("https://registry.test/a"),
            fetcher.fetch("https://registry.test/a"),
            fetcher.fetch("https://registry.test/a"),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(fetcher.peak_in_flight(), 3);

        fetcher.fetch("https://registry.test/a").await.unwrap();
        assert_eq!(fetcher.peak_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_unknown_url_is_not_found() {
        let err = FixtureFetcher::new().fetch("https://registry.test/missing").await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Status {
                url: "https://registry.test/missing".to_string(),
                status: 404
            }
        );
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");
        std::fs::write(&path, r#"{"https://registry.test/a": "<p>a</p>"}"#).unwrap();
        let fetcher = FixtureFetcher::from_json_file(&path).unwrap();
        assert_eq!(fetcher.pages.len(), 1);
    }
}
