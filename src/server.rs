//! TCP server for the speedtest HTTP endpoints.
//!
//! Accepts connections and hands each one to hyper's HTTP/1.1 connection
//! driver in its own task. Requests on a connection are served in order;
//! keep-alive, pipelining, chunked bodies and `Expect: 100-continue` are
//! handled by the driver.

use crate::config::Config;
use crate::payload::PayloadSource;
use crate::router;
use crate::speed::ContentServer;
use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tower::Service;
use tracing::{debug, error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server instance
pub struct Server {
    config: Config,
    app: Router,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server over an initialized payload
    pub fn new(config: Config, payload: Arc<PayloadSource>) -> Self {
        let app = router::build(
            ContentServer::new(payload),
            &config.static_dir,
            config.http_logging,
        );

        Server {
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            app,
            config,
        }
    }

    /// Bind the configured address and serve until an error occurs
    pub async fn run(&self) -> Result<(), BoxError> {
        let addr: SocketAddr = self.config.listen.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid listen address '{}': {}", self.config.listen, e),
            )
        })?;
        let listener = TcpListener::from_std(create_listener(addr)?)?;
        info!(
            address = %addr,
            static_dir = %self.config.static_dir.display(),
            "Server listening"
        );
        self.serve(listener).await
    }

    /// Accept connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let app = self.app.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, app).await {
                            debug!(peer = %addr, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Create the listening socket.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

/// Serve every request on one client connection.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
) -> Result<(), BoxError> {
    stream.set_nodelay(true)?;

    let service = service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        app.clone().call(request)
    });

    http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(stream), service)
        .await?;

    debug!(peer = %peer, "Connection closed");
    Ok(())
}
