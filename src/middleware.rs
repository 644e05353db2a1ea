//! Request middleware: CORS preflight answers and per-request logging.

use axum::extract::Request;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use tracing::info;

/// Answer CORS preflight requests before routing.
///
/// A preflight is an OPTIONS request carrying both `Origin` and
/// `Access-Control-Request-Method`; anything else goes through untouched.
pub async fn preflight(request: Request, next: Next) -> Response {
    if is_preflight(request.method(), request.headers()) {
        return (
            StatusCode::NO_CONTENT,
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
                (
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    "Content-Type, Authorization",
                ),
            ],
        )
            .into_response();
    }
    next.run(request).await
}

fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    let present = |name: header::HeaderName| {
        headers
            .get(name)
            .is_some_and(|value| !value.is_empty())
    };
    method == Method::OPTIONS
        && present(header::ORIGIN)
        && present(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// One line per request once the response head is ready.
pub async fn log_request(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let received_bytes = content_length(request.headers());

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        code = response.status().as_u16(),
        received_bytes,
        sent_bytes = content_length(response.headers()),
        duration_ms = started.elapsed().as_millis() as u64,
        "Request processed"
    );
    response
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}
