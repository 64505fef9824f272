use crate::UploadError;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use opendal::layers::{RetryLayer, TimeoutLayer};
use opendal::services::{Fs, S3};
use opendal::{Operator, Writer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Part size for multipart writes (S3 minimum is 5MiB)
const CHUNK_SIZE: usize = 8 * 1024 * 1024;
const CONCURRENT_PARTS: usize = 8;
const PARTIAL_DIR: &str = ".partial";

/// Where uploaded objects go
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Open a write session for `key`; nothing is visible under the key until
    /// the returned writer completes.
    async fn begin_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Box<dyn SinkWriter>, UploadError>;
}

/// One in-flight object write
#[async_trait]
pub trait SinkWriter: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<(), UploadError>;

    /// Finalize the object, e.g. complete the multipart upload
    async fn complete(&mut self) -> Result<(), UploadError>;

    /// Discard everything written so far
    async fn abort(&mut self) -> Result<(), UploadError>;
}

/// Storage configuration
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub io_timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: Option<String>,
        access_key_id: String,
        secret_access_key: String,
    },
}

/// Object sink backed by an opendal operator
#[derive(Clone)]
pub struct StorageManager {
    operator: Operator,
    config: StorageConfig,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let operator = match &config.backend {
            StorageBackend::Local { root } => build_fs_operator(root)?,
            StorageBackend::S3 {
                bucket,
                endpoint,
                region,
                access_key_id,
                secret_access_key,
            } => build_s3_operator(
                bucket,
                endpoint.as_deref(),
                region.as_deref(),
                access_key_id,
                secret_access_key,
            )?,
        };

        let operator = match config.io_timeout {
            Some(timeout) => operator.layer(
                TimeoutLayer::default()
                    .with_timeout(timeout)
                    .with_io_timeout(timeout),
            ),
            None => operator,
        };

        Ok(Self { operator, config })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.config.backend, StorageBackend::S3 { .. })
    }
}

#[async_trait]
impl ObjectSink for StorageManager {
    async fn begin_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Box<dyn SinkWriter>, UploadError> {
        let capability = self.operator.info().full_capability();

        let mut writer = self
            .operator
            .writer_with(key)
            .concurrent(CONCURRENT_PARTS)
            .chunk(CHUNK_SIZE);
        if capability.write_with_content_type {
            writer = writer.content_type(content_type);
        } else {
            debug!(%key, %content_type, "Backend does not store content type");
        }

        let writer = writer.await.map_err(UploadError::sink)?;
        debug!(%key, remote = self.is_remote(), "Upload session started");

        Ok(Box::new(OpendalWriter {
            key: key.to_string(),
            writer,
        }))
    }
}

struct OpendalWriter {
    key: String,
    writer: Writer,
}

#[async_trait]
impl SinkWriter for OpendalWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), UploadError> {
        self.writer.write(chunk).await.map_err(UploadError::sink)
    }

    async fn complete(&mut self) -> Result<(), UploadError> {
        self.writer.close().await.map_err(UploadError::sink)?;
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), UploadError> {
        warn!(key = %self.key, "Aborting upload session");
        self.writer.abort().await.map_err(UploadError::sink)
    }
}

fn build_fs_operator(root: &Path) -> Result<Operator> {
    info!(root = ?root, "Building filesystem operator");

    let partial = root.join(PARTIAL_DIR);
    let mut builder = Fs::default();
    builder = builder.root(
        root.to_str()
            .ok_or_else(|| anyhow!("Invalid root path: {:?}", root))?,
    );
    builder = builder.atomic_write_dir(
        partial
            .to_str()
            .ok_or_else(|| anyhow!("Invalid root path: {:?}", root))?,
    );

    Ok(Operator::new(builder)?
        .layer(RetryLayer::new().with_max_times(3))
        .finish())
}

fn build_s3_operator(
    bucket: &str,
    endpoint: Option<&str>,
    region: Option<&str>,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    info!(
        bucket = %bucket,
        endpoint = ?endpoint,
        region = ?region,
        "Building S3 operator"
    );

    let mut builder = S3::default();
    builder = builder.bucket(bucket);
    builder = builder.access_key_id(access_key_id);
    builder = builder.secret_access_key(secret_access_key);

    if let Some(region) = region {
        builder = builder.region(region);
    }

    if let Some(endpoint) = endpoint {
        builder = builder.endpoint(endpoint);
    }

    Ok(Operator::new(builder)?
        .layer(RetryLayer::new().with_max_times(3))
        .finish())
}
