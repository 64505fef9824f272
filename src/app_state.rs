use crate::source::{Fetch, HttpFetcher};
use crate::storage::{ObjectSink, StorageManager};
use crate::{Config, Uploader};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub uploader: Arc<Uploader>,
}

impl AppState {
    pub fn new(uploader: Uploader) -> Self {
        Self {
            uploader: Arc::new(uploader),
        }
    }

    /// Wire the HTTP fetcher and the configured storage backend together
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = StorageManager::new(config.storage_config()?)
            .context("Failed to initialize storage manager")?;
        info!(remote = storage.is_remote(), "Storage ready");

        let fetcher = HttpFetcher::new(config.connect_timeout())
            .context("Failed to build HTTP client")?;

        let fetcher: Arc<dyn Fetch> = Arc::new(fetcher);
        let sink: Arc<dyn ObjectSink> = Arc::new(storage);
        Ok(Self::new(Uploader::new(fetcher, sink, config.upload_policy())))
    }
}
