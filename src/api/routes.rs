use crate::{AppState, UploadRequest};
use axum::extract::Extension;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Body of `POST /upload-url`; fields are optional so that a missing one
/// yields the dedicated 400 instead of a deserialization error
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlBody {
    pub source_url: Option<String>,
    pub destination_dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub success: bool,
    pub message: String,
    pub file_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

impl UploadUrlBody {
    fn into_request(self) -> Option<UploadRequest> {
        let source_url = self.source_url.filter(|url| !url.is_empty())?;
        let destination_dir = self.destination_dir.filter(|dir| !dir.is_empty())?;
        Some(UploadRequest {
            source_url,
            destination_dir,
        })
    }
}

pub async fn upload_url(
    Extension(state): Extension<AppState>,
    payload: Result<Json<UploadUrlBody>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        // a body that is not declared as JSON carries no fields
        Err(JsonRejection::MissingJsonContentType(_)) => UploadUrlBody::default(),
        Err(rejection) => {
            debug!(%rejection, "Rejected upload request body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let Some(request) = body.into_request() else {
        return error_response(StatusCode::BAD_REQUEST, "Missing required fields");
    };

    info!(
        source_url = %request.source_url,
        destination_dir = %request.destination_dir,
        "Upload requested"
    );

    match state.uploader.upload_from_url(&request).await {
        Ok(result) => (
            StatusCode::OK,
            Json(UploadUrlResponse {
                success: true,
                message: "File uploaded successfully".into(),
                file_path: result.storage_key,
            }),
        )
            .into_response(),
        Err(failed) => error_response(StatusCode::INTERNAL_SERVER_ERROR, failed.to_string()),
    }
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
