//! fastclone: a self-hosted bandwidth test server
//!
//! Serves the endpoints a fast.com style client uses to measure throughput:
//! - Full and ranged downloads of a pseudo-random payload
//! - Full and ranged uploads that are drained and discarded
//! - The OCA directory and telemetry endpoints
//! - The webapp's static files
//!
//! The payload is generated once at startup, before the listener is bound,
//! and every download is sliced from that one block.

mod config;
mod directory;
mod middleware;
mod payload;
mod range;
mod router;
mod server;
mod speed;
mod telemetry;
mod transfer;

use config::Config;
use server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        workers = ?config.workers,
        max_connections = config.max_connections,
        static_dir = %config.static_dir.display(),
        max_payload_bytes = config.payload.max_payload_bytes,
        read_buffer_size = config.payload.read_buffer_size,
        http_logging = config.http_logging,
        "Starting fastclone server"
    );

    // Nothing may be served before the payload exists
    let payload = payload::initialize(&config.payload).map_err(|e| {
        error!(error = %e, "Payload initialization failed");
        e
    })?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    let server = Server::new(config, payload);
    runtime.block_on(server.run()).map_err(|e| {
        error!(error = %e, "Server error");
        e as Box<dyn std::error::Error>
    })
}
