pub mod fixture_fetcher;
pub mod http_client;
pub mod rate_limiter;

pub use fixture_fetcher::FixtureFetcher;
pub use http_client::ReqwestFetcher;
pub use rate_limiter::{PacedFetcher, PacingLimits, RequestPacer};
