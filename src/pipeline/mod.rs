//! Crawl and extraction orchestration

pub mod cancel;
pub mod crawler;
pub mod fetch;
pub mod runner;

pub use cancel::{cancellation, CancelHandle, CancelToken};
pub use crawler::{CrawlEnd, Crawler};
pub use fetch::{fetch_with_retry, FetchPolicy};
pub use runner::{Pipeline, PipelineResult};
