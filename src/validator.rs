use crate::UploadError;
use axum::http::{HeaderMap, header};
use tracing::warn;

/// 200 GB, decimal
pub const DEFAULT_MAX_FILE_SIZE: u64 = 200 * 1000 * 1000 * 1000;

pub const DEFAULT_ALLOWED_CONTENT_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/png",
    "video/mp4",
    "video/mkv",
    "application/pdf",
    "text/plain",
    "text/plain; charset=UTF-8",
];

/// Extensions picked when the registry lists several and none matches the subtype
const CONVENTIONAL_EXTENSIONS: [(&str, &str); 3] = [
    ("text/plain", "txt"),
    ("audio/mpeg", "mp3"),
    ("video/quicktime", "mov"),
];

/// What a source response is allowed to be
#[derive(Clone, Debug)]
pub struct ContentPolicy {
    pub max_file_size: u64,
    pub allowed_content_types: Vec<String>,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl ContentPolicy {
    pub fn is_allowed(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed == content_type)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceMetadata {
    pub declared_size: Option<u64>,
    pub content_type: String,
    pub file_extension: String,
}

/// Check response headers against the policy.
///
/// The order of the checks decides which error a caller sees: declared size,
/// then content-type presence, then extension, then allow-list membership.
pub fn validate(headers: &HeaderMap, policy: &ContentPolicy) -> Result<SourceMetadata, UploadError> {
    let declared_size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    match declared_size {
        None => warn!("Content-Length is missing, file size will be checked while streaming"),
        Some(size) if size > policy.max_file_size => {
            return Err(UploadError::PayloadTooLarge);
        }
        Some(_) => {}
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(UploadError::UnknownContentType)?;

    let file_extension = file_extension(content_type).ok_or(UploadError::UnsupportedFileType)?;

    if !policy.is_allowed(content_type) {
        return Err(UploadError::UnsupportedContentType);
    }

    Ok(SourceMetadata {
        declared_size,
        content_type: content_type.to_string(),
        file_extension,
    })
}

/// Derive a file extension from a content type, ignoring parameters
pub fn file_extension(content_type: &str) -> Option<String> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let (_, subtype) = essence.split_once('/')?;

    let extensions = mime_guess::get_mime_extensions_str(&essence)?;

    let preferred = extensions
        .iter()
        .find(|ext| ext.eq_ignore_ascii_case(subtype))
        .or_else(|| {
            CONVENTIONAL_EXTENSIONS
                .iter()
                .find(|(mime, _)| *mime == essence)
                .map(|(_, ext)| ext)
        })
        .or_else(|| extensions.first())?;

    Some(preferred.to_string())
}
