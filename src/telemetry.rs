//! Client telemetry sink.
//!
//! The webapp posts telemetry after each test. The body is drained and
//! dropped; the response carries the header set clients expect.

use crate::speed;
use axum::body::Body;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::debug;

const ALLOW_HEADERS: &str = "Accept,Accept-Language,Authorization,Content-Type,Content-Encoding,\
Cookie,debugRequest,X-Netflix.application.name,X-Netflix.application.version,\
X-Netflix.certification.version,X-Netflix.Client.Request.Name,X-Netflix.client.request.sendtime,\
X-Netflix.client.request.sendtimemono,X-Netflix.client.request.transport,X-Netflix.device.type,\
X-Netflix.esn,X-Netflix.ichnaea.request.type,X-Netflix.oauth.consumer.key,X-Netflix.oauth.token,\
X-Netflix.request.uuid,X-Netflix.user.id,X-Netflix.request.attempt,X-Netflix.request.id,\
X-Netflix.request.client.context,X-Netflix.request.client.sendtime,\
X-Netflix.request.client.sendtimemono";

const RESPONSE_HEADERS: [(&str, &str); 11] = [
    ("Access-Control-Allow-Credentials", "true"),
    ("Access-Control-Allow-Headers", ALLOW_HEADERS),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Allow", "GET, POST, OPTIONS"),
    ("X-Ichnaea", "~0=true~RL=382"),
    ("X-Content-Type-Options", "nosniff"),
    ("X-XSS-Protection", "0"),
    ("Cache-Control", "no-cache, no-store, max-age=0, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
    ("X-Frame-Options", "DENY"),
];

/// POST /telemetry/cl2
pub async fn handle(body: Body) -> impl IntoResponse {
    let received = speed::drain(body).await;
    debug!(received, "Telemetry discarded");
    (StatusCode::OK, RESPONSE_HEADERS)
}
