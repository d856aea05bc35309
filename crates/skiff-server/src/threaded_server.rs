//! Thread-per-connection socket server.
//!
//! Every accepted connection gets its own OS thread running a `process` loop
//! until the peer hangs up. Nothing caps the number of threads; a flood of
//! idle connections will exhaust the host. Put admission control in front of
//! this server if it faces untrusted clients.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use skiff_common::protocol::{Result, SkiffError};
use skiff_common::transport::{BufferedTransportFactory, TcpTransport, TransportFactory};

use crate::processor::Processor;
use crate::server::{serve_connection, ServerConfig, ServerHandle};

pub struct ThreadedServer<T = BufferedTransportFactory> {
    listener: TcpListener,
    processor: Arc<Processor>,
    config: Arc<ServerConfig<T>>,
    stopped: Arc<AtomicBool>,
}

impl ThreadedServer {
    /// Binds with buffered transports and the binary protocol.
    pub fn bind(bind_addr: &str, processor: Arc<Processor>) -> Result<Self> {
        Self::with_config(bind_addr, processor, ServerConfig::default())
    }
}

impl<T: TransportFactory> ThreadedServer<T> {
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
            config: Arc::new(config),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SkiffError::Connection(format!("Failed to get local addr: {}", e)))
    }

    pub fn handle(&self) -> Result<ServerHandle> {
        Ok(ServerHandle::new(Arc::clone(&self.stopped), self.local_addr()?))
    }

    /// Accepts connections until stopped, spawning one worker thread each.
    ///
    /// Stopping only ends the accept loop. Workers keep serving their
    /// connections until the peers hang up.
    pub fn serve(&self) -> Result<()> {
        tracing::info!("Threaded server listening on {}", self.local_addr()?);

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

            let processor = Arc::clone(&self.processor);
            let config = Arc::clone(&self.config);
            let spawned = thread::Builder::new()
                .name(format!("skiff-conn-{}", peer))
                .spawn(move || serve_connection(&processor, config.as_ref(), stream, peer, None));

            if let Err(e) = spawned {
                tracing::error!(%peer, error = %e, "Failed to spawn connection worker");
            }
        }

        tracing::info!("Threaded server stopped");
        Ok(())
    }
}
