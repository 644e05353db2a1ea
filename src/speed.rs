//! Speed test endpoints: payload downloads and upload sinks.
//!
//! Downloads are sliced from the shared [`PayloadSource`]; uploads are read
//! and discarded, except for the `0-0` round-trip probe whose body is never
//! read.

use crate::payload::PayloadSource;
use crate::range::{RangeSpec, PROBE_TOKEN};
use crate::transfer::{Chunks, TRANSFER_CHUNK};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error};

const OCTET_STREAM: &str = "application/octet-stream";

/// Builds download responses over the shared payload.
#[derive(Debug, Clone)]
pub struct ContentServer {
    payload: Arc<PayloadSource>,
    chunk_size: u64,
}

impl ContentServer {
    pub fn new(payload: Arc<PayloadSource>) -> Self {
        Self {
            chunk_size: TRANSFER_CHUNK.min(payload.len()),
            payload,
        }
    }

    pub fn max_payload_bytes(&self) -> u64 {
        self.payload.max_payload_bytes()
    }

    /// The full maximum payload.
    pub fn serve_full(&self) -> Response {
        self.serve_bytes(self.max_payload_bytes())
    }

    /// `N + 1` bytes for the token `0-N`.
    ///
    /// Malformed or oversized tokens get a bodiless 400; `0-0` gets an empty 200.
    pub fn serve_range(&self, token: &str) -> Response {
        match RangeSpec::parse(token, self.max_payload_bytes()) {
            Ok(RangeSpec::Probe) => StatusCode::OK.into_response(),
            Ok(range) => self.serve_bytes(range.byte_count()),
            Err(e) => {
                debug!(token, error = %e, "Rejected range request");
                StatusCode::BAD_REQUEST.into_response()
            }
        }
    }

    fn serve_bytes(&self, count: u64) -> Response {
        let chunks = match Chunks::new(self.payload.open(), count, self.chunk_size) {
            Ok(chunks) => chunks,
            Err(e) => {
                error!(count, error = %e, "Download exceeds payload");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, OCTET_STREAM)
            .header(header::CONTENT_LENGTH, count)
            .body(chunks.into_body())
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

/// Read and discard a request body, returning how many bytes arrived.
pub async fn drain(body: Body) -> u64 {
    let mut stream = body.into_data_stream();
    let mut received = 0u64;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(bytes) => received += bytes.len() as u64,
            Err(e) => {
                debug!(received, error = %e, "Upload ended early");
                break;
            }
        }
    }
    received
}

/// GET /speedtest
pub async fn download(State(content): State<ContentServer>) -> Response {
    content.serve_full()
}

/// GET /speedtest/range/{token}
pub async fn download_range(
    State(content): State<ContentServer>,
    Path(token): Path<String>,
) -> Response {
    content.serve_range(&token)
}

/// POST /speedtest: drain the body, reply 200.
pub async fn upload(body: Body) -> StatusCode {
    let received = drain(body).await;
    debug!(received, "Upload drained");
    StatusCode::OK
}

/// POST /speedtest/range/{token}: like [`upload`], but a `0-0` probe is
/// answered without reading the body.
pub async fn upload_range(Path(token): Path<String>, body: Body) -> StatusCode {
    if token != PROBE_TOKEN {
        let received = drain(body).await;
        debug!(token = %token, received, "Upload drained");
    }
    StatusCode::OK
}
