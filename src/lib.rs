pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod relay;
pub mod source;
pub mod storage;
pub mod uploader;
pub mod validator;

use axum::Router;
use axum::extract::Extension;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

//
// Re-export
//
pub use api::{API_DOCS_PATH, health, log_request_errors, upload_url};
pub use app_state::AppState;
pub use config::Config;
pub use error::{UploadError, UploadFailed};
pub use relay::{RelayLimits, UploadTarget, relay};
pub use source::{ByteStream, Fetch, HttpFetcher, SourceResponse};
pub use storage::{ObjectSink, SinkWriter, StorageBackend, StorageConfig, StorageManager};
pub use uploader::{UploadPolicy, UploadRequest, UploadResult, Uploader, destination_key};
pub use validator::{ContentPolicy, SourceMetadata};

/// All HTTP routes over the given state
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload-url", post(upload_url))
        .route("/health", get(health))
        .route(API_DOCS_PATH, get(api::api_docs))
        .route(
            &format!("{API_DOCS_PATH}/openapi.yaml"),
            get(api::openapi_descriptor),
        )
        .layer(axum::middleware::from_fn(log_request_errors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.listen_on_port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server running on {addr}");

    if config.is_local_environment() {
        info!(
            "Access the API docs at http://localhost:{}{API_DOCS_PATH}",
            config.listen_on_port
        );
    }

    axum::serve(listener, app).await?;
    Ok(())
}
