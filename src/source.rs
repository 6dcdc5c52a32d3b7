//! Where desired endpoints come from.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::endpoint::Endpoint;

#[async_trait]
pub trait Source: Send + Sync {
    async fn endpoints(&self) -> anyhow::Result<Vec<Endpoint>>;
}

/// A fixed list of endpoints.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    endpoints: Vec<Endpoint>,
}

impl StaticSource {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl Source for StaticSource {
    async fn endpoints(&self) -> anyhow::Result<Vec<Endpoint>> {
        Ok(self.endpoints.clone())
    }
}

/// A JSON array of endpoints in webhook form, re-read on every cycle.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Source for FileSource {
    async fn endpoints(&self) -> anyhow::Result<Vec<Endpoint>> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let endpoints: Vec<Endpoint> = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing endpoints from {}", self.path.display()))?;
        debug!("read {} endpoint(s) from {}", endpoints.len(), self.path.display());
        Ok(endpoints)
    }
}
