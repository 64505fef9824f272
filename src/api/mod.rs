pub mod docs;
pub mod middleware;
pub mod routes;

// Re-export public types and functions
pub use docs::{API_DOCS_PATH, api_docs, openapi_descriptor};
pub use middleware::log_request_errors;
pub use routes::{health, upload_url};
