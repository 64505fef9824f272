use crate::UploadError;
use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::io::Error as IoError;
use std::time::Duration;
use tracing::debug;

pub type ByteStream = BoxStream<'static, Result<Bytes, IoError>>;

/// Response of the remote resource, before any validation
pub struct SourceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the response carries no body at all
    pub body: Option<ByteStream>,
}

impl SourceResponse {
    /// Reason phrase for the status, as reported in fetch failures
    pub fn status_text(&self) -> &str {
        self.status
            .canonical_reason()
            .unwrap_or_else(|| self.status.as_str())
    }
}

/// Retrieves remote resources
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<SourceResponse, UploadError>;
}

/// `Fetch` over a shared reqwest client
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(connect_timeout: Option<Duration>) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<SourceResponse, UploadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| UploadError::FetchFailed(error.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(%url, %status, "Source responded");

        let body = if has_null_body(status) {
            None
        } else {
            Some(
                response
                    .bytes_stream()
                    .map_err(IoError::other)
                    .boxed(),
            )
        };

        Ok(SourceResponse {
            status,
            headers,
            body,
        })
    }
}

fn has_null_body(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
    )
}
