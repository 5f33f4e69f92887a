//! Reference asset fetching.

use async_trait::async_trait;
use std::time::Duration;
use tryon_core::reference::{AssetFetcher, FetchError};

/// Loads reference image bytes. `http://` and `https://` locators are
/// fetched with GET; anything else is read as a local path.
#[derive(Clone, Default)]
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpAssetFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut request = self.client.get(url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                locator: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        if is_remote(locator) {
            tracing::debug!(url = locator, "fetching reference asset");
            return self.get(locator).await;
        }
        let path = locator.strip_prefix("file://").unwrap_or(locator);
        tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::Transport(format!("{path}: {e}")))
    }
}

fn is_remote(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
