//! HTTP fetcher for the locator form of `load`.

use anyhow::Context;
use classforge_core::Fetch;
use std::time::Duration;
use tracing::debug;

/// Fetches JSON payloads over HTTP(S).
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Fetch for HttpFetcher {
    async fn fetch_json(&self, locator: &str) -> anyhow::Result<serde_json::Value> {
        debug!(locator, "Fetching payload");
        let payload = self
            .client
            .get(locator)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("Failed to fetch {locator}"))?
            .json()
            .await
            .with_context(|| format!("Payload at {locator} is not JSON"))?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_locator_is_an_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch_json("not a url").await.unwrap_err();
        assert!(err.to_string().contains("not a url"));
    }
}
