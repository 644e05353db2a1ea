//! OCA directory endpoint.
//!
//! The webapp asks this endpoint for the list of test targets; this server
//! always points it back at itself.

use axum::extract::ConnectInfo;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::net::SocketAddr;
use tracing::error;

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub name: String,
    pub url: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub ip: String,
    pub asn: String,
    pub location: Location,
}

/// Response shape for GET /netflix/speedtest/v2
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryResponse {
    pub targets: Vec<Target>,
    pub client: ClientInfo,
}

impl DirectoryResponse {
    pub fn new(peer: SocketAddr, now_millis: i64) -> Self {
        let url = format!("/speedtest?e={}", now_millis);
        let location = Location {
            city: "LocalCity".to_string(),
            country: "LC".to_string(),
        };

        Self {
            targets: vec![Target {
                name: url.clone(),
                url,
                location: location.clone(),
            }],
            client: ClientInfo {
                ip: peer.to_string(),
                asn: "65535".to_string(),
                location,
            },
        }
    }
}

/// GET /netflix/speedtest/v2
pub async fn handle(ConnectInfo(peer): ConnectInfo<SocketAddr>) -> Response {
    let directory = DirectoryResponse::new(peer, chrono::Utc::now().timestamp_millis());
    match serde_json::to_vec(&directory) {
        Ok(mut json) => {
            json.push(b'\n');
            ([(header::CONTENT_TYPE, "application/json")], json).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode directory response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
