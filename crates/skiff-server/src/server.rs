//! Pieces shared by the socket servers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use skiff_common::protocol::ProtocolFactory;
use skiff_common::transport::{BufferedTransportFactory, TcpTransport, TransportFactory};

use crate::processor::Processor;

/// Transport and protocol factories a socket server binds to every
/// accepted connection.
///
/// The output side defaults to the input side. Both ends of a connection
/// must agree on the factories; nothing is negotiated.
#[derive(Debug, Clone)]
pub struct ServerConfig<T = BufferedTransportFactory> {
    pub input_transport: T,
    pub output_transport: T,
    pub input_protocol: ProtocolFactory,
    pub output_protocol: ProtocolFactory,
}

impl<T: TransportFactory + Clone> ServerConfig<T> {
    pub fn new(transport: T, protocol: ProtocolFactory) -> Self {
        Self {
            input_transport: transport.clone(),
            output_transport: transport,
            input_protocol: protocol,
            output_protocol: protocol,
        }
    }
}

impl<T: TransportFactory> ServerConfig<T> {
    pub fn with_output_transport(mut self, transport: T) -> Self {
        self.output_transport = transport;
        self
    }

    pub fn with_output_protocol(mut self, protocol: ProtocolFactory) -> Self {
        self.output_protocol = protocol;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(BufferedTransportFactory::new(), ProtocolFactory::binary())
    }
}

/// Asks a running socket server to stop.
///
/// The flag is checked once per accept. [`stop`](Self::stop) opens a
/// throwaway connection so a server blocked in `accept` notices right away.
/// Connections already being served are not interrupted.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    stopped: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ServerHandle {
    pub(crate) fn new(stopped: Arc<AtomicBool>, addr: SocketAddr) -> Self {
        Self { stopped, addr }
    }

    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        match TcpStream::connect_timeout(&wake_addr(self.addr), Duration::from_secs(1)) {
            Ok(stream) => TcpTransport::close(&stream),
            Err(e) => tracing::debug!(error = %e, "Wake-up connection failed"),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Wildcard binds are not connectable; reach them through loopback.
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

/// Runs `process` on one connection until the peer hangs up, a call fails,
/// or `stopped` is raised between calls. The socket is shut down on every
/// path before returning.
pub(crate) fn serve_connection<T: TransportFactory>(
    processor: &Processor,
    config: &ServerConfig<T>,
    stream: TcpStream,
    peer: SocketAddr,
    stopped: Option<&AtomicBool>,
) {
    tracing::debug!(%peer, "Connection established");

    {
        let mut iprot = config
            .input_protocol
            .input(config.input_transport.input(&stream));
        let mut oprot = config
            .output_protocol
            .output(config.output_transport.output(&stream));

        loop {
            if stopped.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                tracing::debug!(%peer, "Server stopping; closing connection");
                break;
            }
            match processor.process(&mut iprot, &mut oprot) {
                Ok(()) => {}
                Err(e) if e.is_closed() => {
                    tracing::debug!(%peer, "Connection closed by peer");
                    break;
                }
                Err(e) => {
                    tracing::error!(%peer, error = %e, "Connection aborted");
                    break;
                }
            }
        }
    }

    TcpTransport::close(&stream);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_addr_maps_wildcards_to_loopback() {
        let v4: SocketAddr = "0.0.0.0:9090".parse().unwrap();
        assert_eq!(wake_addr(v4), "127.0.0.1:9090".parse().unwrap());

        let v6: SocketAddr = "[::]:9090".parse().unwrap();
        assert_eq!(wake_addr(v6), "[::1]:9090".parse().unwrap());

        let bound: SocketAddr = "10.1.2.3:80".parse().unwrap();
        assert_eq!(wake_addr(bound), bound);
    }

    #[test]
    fn test_output_defaults_to_input() {
        let config = ServerConfig::new(BufferedTransportFactory::with_capacity(64), ProtocolFactory::json());
        assert_eq!(config.output_transport.capacity(), 64);
        assert_eq!(config.output_protocol, ProtocolFactory::json());

        let config = config.with_output_protocol(ProtocolFactory::binary());
        assert_eq!(config.input_protocol, ProtocolFactory::json());
        assert_eq!(config.output_protocol, ProtocolFactory::binary());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let handle = ServerHandle::new(Arc::new(AtomicBool::new(false)), listener.local_addr().unwrap());

        handle.stop();
        handle.stop();

        assert!(handle.is_stopped());
    }
}
