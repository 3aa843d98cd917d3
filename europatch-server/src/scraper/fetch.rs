//! HTTP fetch client
//!
//! Single GET per call with a browser-like user agent and one fixed timeout.
//! No retry: a failure is terminal for that fetch attempt.

use async_trait::async_trait;
use europatch_common::config::ScraperConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Fetch client errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connect, TLS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Response body could not be read as text
    #[error("Body error: {0}")]
    Body(String),
}

/// Source of raw page HTML
///
/// The rack parser, module refresh and knowledge cache all go through this
/// seam so tests can substitute a recording stub.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher used in production
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }
}
