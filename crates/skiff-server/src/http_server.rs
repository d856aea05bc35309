//! HTTP Server for skiff
//!
//! This module hosts an [`HttpApp`] on hyper's HTTP/1.1 server. The app
//! itself is synchronous, so each request body is collected first and the
//! call runs on tokio's blocking pool.
//!
//! # Architecture
//!
//! The HTTP server:
//! - Listens on a TCP socket for incoming HTTP connections
//! - Spawns a tokio task for each connection
//! - Collects the request body and hands the request to the app
//! - Writes the app's response back, or drops the connection when the app
//!   returns an error (propagating mode)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skiff_server::{make_http_app, HttpServer, Processor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let processor = Arc::new(Processor::builder(Arc::new(())).build());
//!     let server = HttpServer::bind("127.0.0.1:8080", make_http_app(processor))
//!         .await
//!         .unwrap();
//!     server.serve().await.unwrap();
//! }
//! ```

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use skiff_common::protocol::{Result, SkiffError};
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::http_app::HttpApp;

/// HTTP host for an [`HttpApp`].
pub struct HttpServer {
    app: Arc<HttpApp>,
    listener: TcpListener,
}

impl HttpServer {
    /// Wraps an already bound listener.
    pub fn new(app: HttpApp, listener: TcpListener) -> Self {
        Self {
            app: Arc::new(app),
            listener,
        }
    }

    pub async fn bind<A: ToSocketAddrs + std::fmt::Display>(addr: A, app: HttpApp) -> Result<Self> {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| SkiffError::Connection(format!("Failed to bind to {}: {}", addr, e)))?;
        Ok(Self::new(app, listener))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SkiffError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Binds to `addr` and serves forever.
    pub async fn run<A: ToSocketAddrs + std::fmt::Display>(addr: A, app: HttpApp) -> Result<()> {
        Self::bind(addr, app).await?.serve().await
    }

    /// Accepts connections forever, one tokio task per connection.
    pub async fn serve(self) -> Result<()> {
        tracing::info!("HTTP server listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let app = Arc::clone(&self.app);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let app = Arc::clone(&app);
                    async move { handle_request(app, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!(%peer, "Error serving connection: {}", err);
                }
            });
        }
    }
}

async fn handle_request(
    app: Arc<HttpApp>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| SkiffError::Http(format!("Failed to read request body: {}", e)))?
        .to_bytes();
    let request = Request::from_parts(parts, Cursor::new(body));

    let response = tokio::task::spawn_blocking(move || app.handle(request))
        .await
        .map_err(|e| SkiffError::Http(format!("Request worker failed: {}", e)))?;

    match response {
        Ok(response) => Ok(response.map(Full::new)),
        Err(e) => {
            tracing::error!(error = %e, "Request failed; dropping connection");
            Err(e)
        }
    }
}
