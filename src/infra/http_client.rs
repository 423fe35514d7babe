use crate::app::ports::{Document, DocumentFetcher};
use crate::error::{FetchError, PipelineError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Plain-HTTP document fetcher. Redirects are followed; the document URL
/// is the final one so relative links resolve correctly.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .deflate(true)
            .build()?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl DocumentFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(|e| self.classify(url, e))?;
        debug!(url = %final_url, bytes = body.len(), "Fetched document");

        Ok(Document {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}
