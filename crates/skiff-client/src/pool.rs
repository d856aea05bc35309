use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use skiff_common::protocol::{Result, SkiffError};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_rustls::TlsConnector;

use crate::endpoint::{Endpoint, Scheme};

/// A pooled HTTP/1.1 connection.
///
/// Holds one of the pool's slots for as long as it lives. Hand it back with
/// [`ConnectionPool::release`] to keep the connection for reuse; dropping it
/// closes the connection and frees the slot.
pub struct PooledConnection {
    sender: SendRequest<Full<Bytes>>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub async fn send(&mut self, request: Request<Full<Bytes>>) -> Result<Response<Incoming>> {
        self.sender
            .send_request(request)
            .await
            .map_err(|e| SkiffError::Http(format!("Request failed: {}", e)))
    }
}

/// Connection pool configuration.
///
/// # Default Configuration
///
/// - `max_connections`: 10
/// - `acquire_timeout`: 3 seconds
/// - `connect_timeout`: 3 seconds
///
/// `None` disables a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of simultaneously open connections
    pub max_connections: usize,
    /// Maximum time to wait for a free slot
    pub acquire_timeout: Option<Duration>,
    /// Maximum time to establish a new connection, TLS included
    pub connect_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Some(Duration::from_secs(3)),
            connect_timeout: Some(Duration::from_secs(3)),
        }
    }
}

/// Bounded pool of HTTP/1.1 connections to a single endpoint.
///
/// At most `max_connections` connections exist at once. Callers beyond
/// that wait for a slot up to `acquire_timeout` and then fail with
/// [`SkiffError::PoolTimeout`]. Idle connections are reused last-in,
/// first-out; connections the server has closed are discarded on the way
/// out.
pub struct ConnectionPool {
    endpoint: Endpoint,
    tls: Option<TlsConnector>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<SendRequest<Full<Bytes>>>>,
    config: PoolConfig,
}

impl ConnectionPool {
    pub(crate) fn new(endpoint: Endpoint, config: PoolConfig) -> Result<Self> {
        let tls = match endpoint.scheme {
            Scheme::Https => Some(tls_connector()?),
            Scheme::Http => None,
        };

        Ok(Self {
            endpoint,
            tls,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            idle: Mutex::new(Vec::new()),
            config,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of connections that could be handed out without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Takes a slot and returns an idle connection or a freshly opened one.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self.acquire_permit().await?;

        loop {
            let Some(mut sender) = self.idle.lock().await.pop() else {
                break;
            };
            if !sender.is_closed() && sender.ready().await.is_ok() {
                return Ok(PooledConnection {
                    sender,
                    _permit: permit,
                });
            }
            tracing::debug!(endpoint = %self.endpoint, "Discarding closed connection");
        }

        let sender = self.connect().await?;
        Ok(PooledConnection {
            sender,
            _permit: permit,
        })
    }

    /// Returns a connection for reuse and frees its slot.
    pub async fn release(&self, conn: PooledConnection) {
        if conn.sender.is_closed() || self.permits.is_closed() {
            return;
        }
        self.idle.lock().await.push(conn.sender);
    }

    /// Closes every idle connection and fails all waiting and future
    /// acquisitions.
    pub async fn close(&self) {
        self.permits.close();
        self.idle.lock().await.clear();
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        let acquire = Arc::clone(&self.permits).acquire_owned();
        let permit = match self.config.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| SkiffError::PoolTimeout(timeout.as_millis() as u64))?,
            None => acquire.await,
        };
        permit.map_err(|_| SkiffError::Connection("connection pool is closed".to_string()))
    }

    async fn connect(&self) -> Result<SendRequest<Full<Bytes>>> {
        let connect = self.open();
        match self.config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| SkiffError::Timeout(timeout.as_millis() as u64))?,
            None => connect.await,
        }
    }

    async fn open(&self) -> Result<SendRequest<Full<Bytes>>> {
        let host = self.endpoint.host.as_str();
        let stream = TcpStream::connect((host, self.endpoint.port))
            .await
            .map_err(|e| SkiffError::Connection(format!("Failed to connect to {}: {}", self.endpoint, e)))?;
        stream.set_nodelay(true)?;
        tracing::debug!(endpoint = %self.endpoint, "Opened connection");

        match &self.tls {
            Some(tls) => {
                let server_name = ServerName::try_from(host.to_string())
                    .map_err(|e| SkiffError::InvalidUrl(format!("{}: {}", host, e)))?;
                let stream = tls
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| SkiffError::Connection(format!("TLS handshake with {} failed: {}", self.endpoint, e)))?;
                handshake(TokioIo::new(stream)).await
            }
            None => handshake(TokioIo::new(stream)).await,
        }
    }
}

async fn handshake<T>(io: T) -> Result<SendRequest<Full<Bytes>>>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(io)
        .await
        .map_err(|e| SkiffError::Http(format!("HTTP handshake failed: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("Connection closed with error: {}", e);
        }
    });

    Ok(sender)
}

fn tls_connector() -> Result<TlsConnector> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| SkiffError::Connection(format!("Failed to configure TLS: {}", e)))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    async fn accepting_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        (url, accepted)
    }

    fn pool(url: &str, config: PoolConfig) -> ConnectionPool {
        ConnectionPool::new(Endpoint::parse(url).unwrap(), config).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_acquire_without_server_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let result = pool(&url, PoolConfig::default()).acquire().await;
        assert!(matches!(result, Err(SkiffError::Connection(_))));
    }

    #[tokio::test]
    async fn test_pool_timeout_when_exhausted() {
        let (url, _) = accepting_server().await;
        let config = PoolConfig {
            max_connections: 1,
            acquire_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let pool = pool(&url, config);

        let _held = pool.acquire().await.unwrap();
        let result = pool.acquire().await;

        assert!(matches!(result, Err(SkiffError::PoolTimeout(100))));
    }

    #[tokio::test]
    async fn test_released_connection_is_reused() {
        let (url, accepted) = accepting_server().await;
        let pool = pool(&url, PoolConfig::default());

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;
        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 10);
    }

    #[tokio::test]
    async fn test_dropped_connection_frees_slot() {
        let (url, accepted) = accepting_server().await;
        let config = PoolConfig {
            max_connections: 1,
            acquire_timeout: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let pool = pool(&url, config);

        drop(pool.acquire().await.unwrap());
        let _again = pool.acquire().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let (url, _) = accepting_server().await;
        let pool = pool(&url, PoolConfig::default());

        pool.close().await;

        assert!(matches!(pool.acquire().await, Err(SkiffError::Connection(_))));
    }
}
