use super::cancel::CancelToken;
use super::fetch::{fetch_with_retry, FetchPolicy};
use crate::app::ports::DocumentFetcher;
use crate::error::FetchError;
use crate::metrics::CrawlMetrics;
use crate::strategies::ExtractionStrategy;
use crate::types::CrawlCandidate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a crawl stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CrawlEnd {
    /// The last page had no next control
    Exhausted,
    /// A page yielded nothing not already seen, e.g. a listing that wraps
    NoNewIds,
    /// The next control pointed at a page already visited
    Revisited,
    PageLimit,
    Cancelled,
    FetchFailed { error: FetchError },
    /// The crawl task itself did not complete
    Aborted,
}

impl CrawlEnd {
    /// Whether listing pages may remain unread
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            CrawlEnd::PageLimit | CrawlEnd::Cancelled | CrawlEnd::FetchFailed { .. } | CrawlEnd::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlEnd::Exhausted => "exhausted",
            CrawlEnd::NoNewIds => "no_new_ids",
            CrawlEnd::Revisited => "revisited",
            CrawlEnd::PageLimit => "page_limit",
            CrawlEnd::Cancelled => "cancelled",
            CrawlEnd::FetchFailed { .. } => "fetch_failed",
            CrawlEnd::Aborted => "aborted",
        }
    }
}

/// Per-run crawl bookkeeping. Owned by one crawler; nothing is shared
/// between runs.
#[derive(Debug, Default)]
struct CrawlState {
    next_url: Option<String>,
    pages: u32,
    seen_ids: HashSet<String>,
    seen_urls: HashSet<String>,
    visited: HashSet<String>,
    end: Option<CrawlEnd>,
}

/// Walks listing pages one at a time. Each call to [`Crawler::next_page`]
/// fetches at most one page and yields only candidates not seen earlier in
/// the run.
pub struct Crawler {
    strategy: Arc<dyn ExtractionStrategy>,
    fetcher: Arc<dyn DocumentFetcher>,
    root_url: String,
    max_pages: u32,
    policy: FetchPolicy,
    cancel: CancelToken,
    state: CrawlState,
}

impl Crawler {
    pub fn new(
        strategy: Arc<dyn ExtractionStrategy>,
        fetcher: Arc<dyn DocumentFetcher>,
        root_url: impl Into<String>,
        max_pages: u32,
        policy: FetchPolicy,
        cancel: CancelToken,
    ) -> Self {
        let root_url = root_url.into();
        Self {
            strategy,
            fetcher,
            state: CrawlState {
                next_url: Some(root_url.clone()),
                ..CrawlState::default()
            },
            root_url,
            max_pages,
            policy,
            cancel,
        }
    }

    /// Start over from the root with fresh dedup state
    pub fn restart(&mut self) {
        self.state = CrawlState {
            next_url: Some(self.root_url.clone()),
            ..CrawlState::default()
        };
    }

    pub fn pages_crawled(&self) -> u32 {
        self.state.pages
    }

    /// `None` while the crawl can still advance
    pub fn end(&self) -> Option<&CrawlEnd> {
        self.state.end.as_ref()
    }

    /// Next batch of new candidates, or `None` once the crawl has ended
    pub async fn next_page(&mut self) -> Option<Vec<CrawlCandidate>> {
        if self.state.end.is_some() {
            return None;
        }
        if self.cancel.is_cancelled() {
            return self.finish(CrawlEnd::Cancelled);
        }
        let Some(url) = self.state.next_url.take() else {
            return self.finish(CrawlEnd::Exhausted);
        };
        if self.state.visited.contains(&url) {
            return self.finish(CrawlEnd::Revisited);
        }
        if self.state.pages >= self.max_pages {
            warn!(url = %url, max_pages = self.max_pages, "Page ceiling reached with pages remaining");
            return self.finish(CrawlEnd::PageLimit);
        }

        let document = match fetch_with_retry(self.fetcher.as_ref(), &url, &self.policy, &self.cancel).await {
            Ok(document) => document,
            Err(FetchError::Cancelled { .. }) => return self.finish(CrawlEnd::Cancelled),
            Err(error) => {
                warn!(url = %url, error = %error, "Listing page unavailable, ending crawl early");
                return self.finish(CrawlEnd::FetchFailed { error });
            }
        };

        self.state.visited.insert(url.clone());
        self.state.pages += 1;
        CrawlMetrics::page_fetched(self.strategy.name());

        let listing = self.strategy.parse_listing(&document, self.state.pages);
        let found = listing.candidates.len();
        let fresh: Vec<CrawlCandidate> = listing
            .candidates
            .into_iter()
            .filter(|c| self.admit(c))
            .collect();

        debug!(page = self.state.pages, url = %url, found, new = fresh.len(), "Crawled listing page");

        if fresh.is_empty() {
            return self.finish(CrawlEnd::NoNewIds);
        }

        CrawlMetrics::candidates_queued(self.strategy.name(), fresh.len());
        self.state.next_url = listing.next_url;
        Some(fresh)
    }

    /// Drain the whole crawl into one list
    pub async fn collect_all(&mut self) -> Vec<CrawlCandidate> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_page().await {
            all.extend(batch);
        }
        all
    }

    // Candidates with an id dedupe by id; the rest by detail URL
    fn admit(&mut self, candidate: &CrawlCandidate) -> bool {
        let new_url = self.state.seen_urls.insert(candidate.detail_url.clone());
        match &candidate.reference_id {
            Some(id) => self.state.seen_ids.insert(id.clone()),
            None => new_url,
        }
    }

    fn finish(&mut self, end: CrawlEnd) -> Option<Vec<CrawlCandidate>> {
        info!(
            strategy = self.strategy.name(),
            pages = self.state.pages,
            candidates = self.state.seen_urls.len(),
            reason = end.as_str(),
            "Crawl finished"
        );
        CrawlMetrics::crawl_ended(self.strategy.name(), end.as_str());
        self.state.end = Some(end);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::FixtureFetcher;
    use crate::pipeline::cancel::cancellation;
    use crate::strategies::table_rows::TableRowStrategy;
    use std::time::Duration;

    const ROOT: &str = "https://registry.test/list";

    fn row(id: u32) -> String {
        format!(
            r#"<tr><td>1 March 2025</td><td>-</td><td>QLD</td><td>Flood</td><td><a href="/disasters/{id}">Event {id}</a></td><td>AGRN-{id}</td></tr>"#
        )
    }

    fn page(ids: &[u32], next: Option<&str>) -> String {
        let rows: String = ids.iter().map(|id| row(*id)).collect();
        let next = next
            .map(|href| format!(r#"<a rel="next" href="{href}">Next</a>"#))
            .unwrap_or_default();
        format!("<table>{rows}</table>{next}")
    }

    fn policy() -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_millis(200),
            max_retries: 1,
            backoff: Duration::from_millis(1),
        }
    }

    fn crawler(fetcher: FixtureFetcher, max_pages: u32, cancel: CancelToken) -> Crawler {
        Crawler::new(
            Arc::new(TableRowStrategy::new()),
            Arc::new(fetcher),
            ROOT,
            max_pages,
            policy(),
            cancel,
        )
    }

    fn ids(candidates: &[CrawlCandidate]) -> Vec<String> {
        candidates.iter().filter_map(|c| c.reference_id.clone()).collect()
    }

    #[tokio::test]
    async fn test_walks_pages_and_dedupes_repeated_rows() {
        let fetcher = FixtureFetcher::new()
            .with_page(ROOT, page(&[1, 2], Some("?page=1")))
            .with_page(format!("{ROOT}?page=1"), page(&[2, 3], None));
        let mut crawler = crawler(fetcher, 10, CancelToken::never());

        let all = crawler.collect_all().await;
        assert_eq!(ids(&all), vec!["AGRN-1", "AGRN-2", "AGRN-3"]);
        assert_eq!(crawler.pages_crawled(), 2);
        assert_eq!(crawler.end(), Some(&CrawlEnd::Exhausted));
    }

    #[tokio::test]
    async fn test_wrapping_listing_stops_on_no_new_ids() {
        let fetcher = FixtureFetcher::new()
            .with_page(ROOT, page(&[1, 2], Some("?page=1")))
            .with_page(format!("{ROOT}?page=1"), page(&[1, 2], Some("?page=2")));
        let mut crawler = crawler(fetcher, 10, CancelToken::never());

        assert_eq!(crawler.collect_all().await.len(), 2);
        assert_eq!(crawler.end(), Some(&CrawlEnd::NoNewIds));
        assert!(!crawler.end().unwrap().is_partial());
    }

    #[tokio::test]
    async fn test_page_ceiling_marks_partial() {
        let fetcher = FixtureFetcher::new()
            .with_page(ROOT, page(&[1], Some("?page=1")))
            .with_page(format!("{ROOT}?page=1"), page(&[2], Some("?page=2")));
        let mut crawler = crawler(fetcher, 1, CancelToken::never());

        assert_eq!(crawler.collect_all().await.len(), 1);
        assert_eq!(crawler.end(), Some(&CrawlEnd::PageLimit));
        assert!(crawler.end().unwrap().is_partial());
    }

    #[tokio::test]
    async fn test_listing_failure_ends_early() {
        let fetcher = FixtureFetcher::new().with_page(ROOT, page(&[1], Some("?page=1")));
        let mut crawler = crawler(fetcher, 10, CancelToken::never());

        assert_eq!(crawler.collect_all().await.len(), 1);
        assert!(matches!(crawler.end(), Some(CrawlEnd::FetchFailed { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_crawl_fetches_nothing() {
        let (handle, token) = cancellation();
        handle.cancel();
        let mut crawler = crawler(FixtureFetcher::new().with_page(ROOT, page(&[1], None)), 10, token);

        assert!(crawler.next_page().await.is_none());
        assert_eq!(crawler.end(), Some(&CrawlEnd::Cancelled));
    }

    #[tokio::test]
    async fn test_restart_replays_from_root() {
        let fetcher = FixtureFetcher::new().with_page(ROOT, page(&[1, 2], None));
        let mut crawler = crawler(fetcher, 10, CancelToken::never());

        assert_eq!(crawler.collect_all().await.len(), 2);
        crawler.restart();
        assert!(crawler.end().is_none());
        assert_eq!(crawler.collect_all().await.len(), 2);
    }
}
