use crate::relay::{RelayLimits, UploadTarget, relay};
use crate::source::Fetch;
use crate::storage::ObjectSink;
use crate::validator::{self, ContentPolicy};
use crate::{UploadError, UploadFailed};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

pub const DEFAULT_BUFFER_CHUNKS: usize = 16;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub source_url: String,
    pub destination_dir: String,
}

impl UploadRequest {
    pub fn new(source_url: impl Into<String>, destination_dir: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_dir: destination_dir.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub storage_key: String,
    pub bytes_written: u64,
}

/// Limits fixed at startup and shared by every upload
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub content: ContentPolicy,
    pub buffer_chunks: usize,
    pub stall_timeout: Option<Duration>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            content: ContentPolicy::default(),
            buffer_chunks: DEFAULT_BUFFER_CHUNKS,
            stall_timeout: None,
        }
    }
}

impl UploadPolicy {
    fn relay_limits(&self) -> RelayLimits {
        RelayLimits {
            max_bytes: self.content.max_file_size,
            buffer_chunks: self.buffer_chunks,
            stall_timeout: self.stall_timeout,
        }
    }
}

/// Fetches remote resources and streams them into object storage
#[derive(Clone)]
pub struct Uploader {
    fetcher: Arc<dyn Fetch>,
    sink: Arc<dyn ObjectSink>,
    policy: UploadPolicy,
}

impl Uploader {
    pub fn new(fetcher: Arc<dyn Fetch>, sink: Arc<dyn ObjectSink>, policy: UploadPolicy) -> Self {
        Self {
            fetcher,
            sink,
            policy,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Download `source_url` and store it under `destination_dir`.
    ///
    /// Not idempotent: every call writes a new object named after the
    /// current time in milliseconds.
    pub async fn upload_from_url(
        &self,
        request: &UploadRequest,
    ) -> Result<UploadResult, UploadFailed> {
        let started = Instant::now();

        match self.try_upload(request).await {
            Ok(result) => {
                info!(
                    key = %result.storage_key,
                    bytes = result.bytes_written,
                    elapsed_ms = %started.elapsed().as_millis(),
                    "Upload completed"
                );
                Ok(result)
            }
            Err(reason) => {
                error!(
                    source_url = %request.source_url,
                    destination_dir = %request.destination_dir,
                    status = %reason.status_code(),
                    %reason,
                    "Upload failed"
                );
                Err(reason.into())
            }
        }
    }

    async fn try_upload(&self, request: &UploadRequest) -> Result<UploadResult, UploadError> {
        if request.source_url.is_empty() || request.destination_dir.is_empty() {
            return Err(UploadError::InvalidRequest);
        }

        let response = self.fetcher.fetch(&request.source_url).await?;
        if !response.status.is_success() {
            return Err(UploadError::FetchFailed(response.status_text().to_string()));
        }

        let metadata = validator::validate(&response.headers, &self.policy.content)?;

        let file_name = format!("{}.{}", timestamp_millis(), metadata.file_extension);
        let target = UploadTarget {
            key: destination_key(&request.destination_dir, &file_name),
            content_type: metadata.content_type,
        };
        info!(
            source_url = %request.source_url,
            key = %target.key,
            content_type = %target.content_type,
            declared_size = ?metadata.declared_size,
            "Relaying source into storage"
        );

        let bytes_written = relay(
            response.body,
            self.sink.as_ref(),
            &target,
            &self.policy.relay_limits(),
        )
        .await?;

        Ok(UploadResult {
            storage_key: target.key,
            bytes_written,
        })
    }
}

fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Join `dir` and `file_name` with POSIX semantics, whatever the host.
///
/// Empty and `.` segments collapse and `..` pops the previous segment, so
/// `uploads/./a/../b/` joined with `1.png` gives `uploads/b/1.png`. A `..`
/// with nothing left to pop is dropped: keys never climb above the bucket
/// root.
pub fn destination_key(dir: &str, file_name: &str) -> String {
    let absolute = dir.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in dir.split('/').chain(file_name.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_key_simple() {
        assert_eq!(destination_key("uploads", "1.jpeg"), "uploads/1.jpeg");
        assert_eq!(destination_key("uploads/", "1.jpeg"), "uploads/1.jpeg");
        assert_eq!(
            destination_key("media/images", "1.png"),
            "media/images/1.png"
        );
    }

    #[test]
    fn test_destination_key_normalizes() {
        assert_eq!(destination_key("./a//b/", "1.png"), "a/b/1.png");
        assert_eq!(destination_key("uploads/./a/../b/", "1.png"), "uploads/b/1.png");
        assert_eq!(destination_key("../up", "1.png"), "up/1.png");
        assert_eq!(destination_key("a/../../../up", "1.png"), "up/1.png");
        assert_eq!(destination_key("..", "1.png"), "1.png");
        assert_eq!(destination_key("/abs/dir", "1.png"), "/abs/dir/1.png");
        assert_eq!(destination_key("/../x", "1.png"), "/x/1.png");
    }

    #[test]
    fn test_destination_key_uses_forward_slashes() {
        let key = destination_key("a\\b", "1.txt");
        assert_eq!(key, "a\\b/1.txt");
    }

    #[test]
    fn test_request_wire_names() {
        let request: UploadRequest = serde_json::from_str(
            r#"{"sourceUrl":"http://example.com/a.jpg","destinationDir":"uploads"}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            UploadRequest::new("http://example.com/a.jpg", "uploads")
        );
    }
}
