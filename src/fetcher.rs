// Upstream GTFS-RT fetching
// One GET per call with a hard timeout; no retries at this layer.

use crate::error::{FeedError, FetchError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;

/// Raw payload of a successful (2xx) upstream response.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub status: u16,
    pub body: Bytes,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedFeed, FetchError>;
}

// ============================================================================
// HTTP Source
// ============================================================================

pub struct HttpFeedSource {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFeedSource {
    pub fn new(user_agent: impl Into<String>) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FeedError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, user_agent))
    }

    pub fn with_client(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }

    fn classify(url: &str, timeout: Duration, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                after: timeout,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedFeed, FetchError> {
        tracing::debug!(url, timeout_ms = timeout.as_millis() as u64, "Fetching feed");

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, "application/x-protobuf")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "Upstream returned error status");
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                code: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(url, timeout, e))?;

        tracing::debug!(url, bytes = body.len(), "Received feed data");
        Ok(FetchedFeed {
            status: status.as_u16(),
            body,
        })
    }
}
