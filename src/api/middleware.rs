use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Log every finished request; failures are raised to warn/error by status class
pub async fn log_request_errors(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri().clone();
    let method = req.method().clone();
    let started = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    let latency_ms = started.elapsed().as_millis() as u64;

    match status {
        status if status.is_server_error() => {
            error!(%method, %uri, %status, latency_ms, "Server error")
        }
        status if status.is_client_error() => {
            warn!(%method, %uri, %status, latency_ms, "Client error")
        }
        _ => debug!(%method, %uri, %status, latency_ms, "Request served"),
    }

    response
}
