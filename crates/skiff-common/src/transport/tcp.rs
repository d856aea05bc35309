use std::io::ErrorKind;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::protocol::error::{Result, SkiffError};

/// Default timeout for establishing TCP connections (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking TCP helpers shared by the socket servers and the
/// connection-oriented client.
pub struct TcpTransport;

impl TcpTransport {
    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried in
    /// turn until one accepts. `timeout` bounds every attempt and is also set
    /// as the read/write timeout of the returned stream.
    pub fn connect(addr: &str, timeout: Option<Duration>) -> Result<TcpStream> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| SkiffError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let connect_timeout = timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect_timeout(&socket_addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(timeout)?;
                    stream.set_write_timeout(timeout)?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(SkiffError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Splits a stream into independently owned read and write halves.
    pub fn split(stream: TcpStream) -> Result<(TcpStream, TcpStream)> {
        let reader = stream.try_clone()?;
        Ok((reader, stream))
    }

    /// Shuts both directions down, ignoring sockets that are already gone.
    pub fn close(stream: &TcpStream) {
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                tracing::debug!(error = %e, "Failed to shut down stream");
            }
        }
    }
}
