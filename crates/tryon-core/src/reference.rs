//! Shade reference assets: fetched once per session, bound to a region.

use crate::types::Region;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("status {status} fetching {locator}")]
    Status { locator: String, status: u16 },
    #[error("empty asset at {0}")]
    Empty(String),
}

/// Failure to resolve a reference asset. Nothing is cached; selecting the
/// shade again retries the fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not load reference for shade {shade:?}: {source}")]
pub struct ResolutionError {
    pub shade: String,
    #[source]
    pub source: FetchError,
}

/// Injected fetcher for reference image bytes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError>;
}

/// A selectable shade of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeDescriptor {
    pub id: String,
    pub name: String,
    /// Where the reference image lives (usually a URL).
    pub source: String,
    /// Category of the owning product, e.g. "lipstick".
    #[serde(default)]
    pub category: Option<String>,
}

/// A resolved reference image bound to its region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceAsset {
    id: String,
    name: String,
    source: String,
    region: Region,
    payload: Arc<[u8]>,
}

impl ReferenceAsset {
    /// Bind already-loaded bytes to a shade, classifying its category.
    pub fn from_bytes(shade: &ShadeDescriptor, bytes: Vec<u8>) -> Self {
        Self {
            id: shade.id.clone(),
            name: shade.name.clone(),
            source: shade.source.clone(),
            region: Region::from_category(shade.category.as_deref()),
            payload: bytes.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Resolves shades into [`ReferenceAsset`]s, caching by shade id for the
/// lifetime of the session.
pub struct ReferenceResolver {
    fetcher: Arc<dyn AssetFetcher>,
    cache: HashMap<String, ReferenceAsset>,
}

impl ReferenceResolver {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            cache: HashMap::new(),
        }
    }

    pub async fn resolve(&mut self, shade: &ShadeDescriptor) -> Result<ReferenceAsset, ResolutionError> {
        if let Some(asset) = self.cache.get(&shade.id) {
            tracing::debug!(shade = %shade.id, "reference asset cache hit");
            return Ok(asset.clone());
        }

        let bytes = self
            .fetcher
            .fetch(&shade.source)
            .await
            .and_then(|b| {
                if b.is_empty() {
                    Err(FetchError::Empty(shade.source.clone()))
                } else {
                    Ok(b)
                }
            })
            .map_err(|source| {
                tracing::warn!(shade = %shade.id, error = %source, "reference asset fetch failed");
                ResolutionError {
                    shade: shade.name.clone(),
                    source,
                }
            })?;

        let asset = ReferenceAsset::from_bytes(shade, bytes);
        tracing::info!(
            shade = %shade.id,
            region = %asset.region,
            len = asset.payload.len(),
            "reference asset resolved"
        );
        self.cache.insert(shade.id.clone(), asset.clone());
        Ok(asset)
    }

    pub fn cached(&self, id: &str) -> Option<&ReferenceAsset> {
        self.cache.get(id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached asset (session teardown).
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
