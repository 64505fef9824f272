use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong while relaying a remote resource into storage
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum UploadError {
    #[error("Missing required parameters: sourceUrl and destinationDir are required")]
    InvalidRequest,

    #[error("Failed to fetch file: {0}")]
    FetchFailed(String),

    #[error("Response body is empty")]
    EmptyResponseBody,

    #[error("File exceeds maximum size limit")]
    PayloadTooLarge,

    #[error("Unable to determine content type")]
    UnknownContentType,

    #[error("Unsupported file type")]
    UnsupportedFileType,

    #[error("Unsupported content type")]
    UnsupportedContentType,

    #[error("Failed to read source body: {0}")]
    SourceStream(String),

    #[error("Source stalled for {}ms", .0.as_millis())]
    SourceStalled(Duration),

    #[error("Storage write failed: {0}")]
    SinkFailure(String),
}

impl UploadError {
    pub fn sink(error: impl ToString) -> Self {
        UploadError::SinkFailure(error.to_string())
    }

    /// Status class the failure belongs to, used when logging
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::InvalidRequest => StatusCode::BAD_REQUEST,
            UploadError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::UnknownContentType
            | UploadError::UnsupportedFileType
            | UploadError::UnsupportedContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::FetchFailed(_)
            | UploadError::EmptyResponseBody
            | UploadError::SourceStream(_) => StatusCode::BAD_GATEWAY,
            UploadError::SourceStalled(_) => StatusCode::GATEWAY_TIMEOUT,
            UploadError::SinkFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The single error surfaced by [`crate::Uploader::upload_from_url`]
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("Upload failed: {reason}")]
pub struct UploadFailed {
    #[source]
    reason: UploadError,
}

impl UploadFailed {
    pub fn reason(&self) -> &UploadError {
        &self.reason
    }
}

impl From<UploadError> for UploadFailed {
    fn from(reason: UploadError) -> Self {
        Self { reason }
    }
}
