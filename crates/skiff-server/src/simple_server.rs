//! Sequential socket server.
//!
//! One connection at a time: a connection is served until the peer hangs up
//! (or the server is stopped) before the next one is accepted. A slow client
//! holds up every other client, so this shape suits tests and low-traffic
//! tools.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use skiff_common::protocol::{Result, SkiffError};
use skiff_common::transport::{BufferedTransportFactory, TcpTransport, TransportFactory};

use crate::processor::Processor;
use crate::server::{serve_connection, ServerConfig, ServerHandle};

pub struct SimpleServer<T = BufferedTransportFactory> {
    listener: TcpListener,
    processor: Arc<Processor>,
    config: ServerConfig<T>,
    stopped: Arc<AtomicBool>,
}

impl SimpleServer {
    /// Binds with buffered transports and the binary protocol.
    pub fn bind(bind_addr: &str, processor: Arc<Processor>) -> Result<Self> {
        Self::with_config(bind_addr, processor, ServerConfig::default())
    }
}

impl<T: TransportFactory> SimpleServer<T> {
    pub fn with_config(
        bind_addr: &str,
        processor: Arc<Processor>,
        config: ServerConfig<T>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .map_err(|e| SkiffError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self {
            listener,
            processor,
            config,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SkiffError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Returns a handle that can stop [`serve`](Self::serve) from another thread.
    pub fn handle(&self) -> Result<ServerHandle> {
        Ok(ServerHandle::new(Arc::clone(&self.stopped), self.local_addr()?))
    }

    /// Accepts and serves connections until stopped.
    ///
    /// A failed connection is logged and closed; the server moves on to the
    /// next one.
    pub fn serve(&self) -> Result<()> {
        tracing::info!("Sequential server listening on {}", self.local_addr()?);

        for conn in self.listener.incoming() {
            if self.stopped.load(Ordering::SeqCst) {
                if let Ok(stream) = &conn {
                    TcpTransport::close(stream);
                }
                break;
            }

            let stream = match conn {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            let peer = match stream.peer_addr() {
                Ok(peer) => peer,
                Err(e) => {
                    tracing::debug!(error = %e, "Peer left before being served");
                    TcpTransport::close(&stream);
                    continue;
                }
            };

            serve_connection(&self.processor, &self.config, stream, peer, Some(&self.stopped));
        }

        tracing::info!("Sequential server stopped");
        Ok(())
    }
}
