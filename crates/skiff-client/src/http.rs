//! Pooled HTTP client.
//!
//! Every call is one `POST` carrying one request message. Connections come
//! from a bounded [`ConnectionPool`]; a failed request is returned to the
//! caller and never retried.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::{Request, StatusCode};
use serde_json::{Map, Value};
use skiff_common::protocol::{
    bind_args, decode_reply, encode_call, void_success, CallError, Method, ProtocolFactory,
    Result, SkiffError,
};
use skiff_common::transport::SKIFF_CONTENT_TYPE;

use crate::endpoint::Endpoint;
use crate::pool::{ConnectionPool, PoolConfig};

/// Configuration for [`HttpClient`].
///
/// # Default Configuration
///
/// - `max_size`: 10 connections
/// - `read_timeout`: 3000 ms
/// - `connect_timeout`: unset, falls back to `read_timeout`
/// - `pool_timeout`: unset, falls back to `read_timeout`
///
/// A zero duration disables the timeout.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use skiff_client::HttpClientConfig;
///
/// let config = HttpClientConfig::new()
///     .with_max_size(4)
///     .with_read_timeout(Duration::from_secs(10));
/// assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub max_size: usize,
    read_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_timeout: Option<Duration>,
    pub input_protocol: ProtocolFactory,
    pub output_protocol: ProtocolFactory,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            read_timeout: Some(Duration::from_millis(3000)),
            connect_timeout: None,
            pool_timeout: None,
            input_protocol: ProtocolFactory::binary(),
            output_protocol: ProtocolFactory::binary(),
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = non_zero(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// How long a call waits for a pooled connection when all are busy.
    pub fn with_pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = Some(timeout);
        self
    }

    /// Sets both the input and the output protocol.
    pub fn with_protocol(mut self, protocol: ProtocolFactory) -> Self {
        self.input_protocol = protocol;
        self.output_protocol = protocol;
        self
    }

    pub fn with_output_protocol(mut self, protocol: ProtocolFactory) -> Self {
        self.output_protocol = protocol;
        self
    }

    /// How long a call waits for the response once the request is sent.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout {
            Some(timeout) => non_zero(timeout),
            None => self.read_timeout,
        }
    }

    pub fn pool_timeout(&self) -> Option<Duration> {
        match self.pool_timeout {
            Some(timeout) => non_zero(timeout),
            None => self.read_timeout,
        }
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_size,
            acquire_timeout: self.pool_timeout(),
            connect_timeout: self.connect_timeout(),
        }
    }
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

/// Pooled HTTP client for one skiff endpoint.
///
/// Safe to share between tasks: up to `max_size` calls run at once and the
/// rest queue for a connection. Sequence ids start at 0 and grow by one per
/// call; they are written for wire compatibility only and never checked,
/// since every call has its own HTTP exchange.
///
/// # Example
///
/// ```rust,no_run
/// use skiff_client::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new("http://127.0.0.1:6080/")?;
/// // client.call::<SomeMethod>(&args).await ...
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct HttpClient {
    endpoint: Endpoint,
    pool: ConnectionPool,
    config: HttpClientConfig,
    seqid: AtomicI32,
}

impl HttpClient {
    /// Creates a client with the default configuration.
    ///
    /// Fails right away with [`SkiffError::InvalidUrl`] unless `url` is an
    /// `http` or `https` URL.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, HttpClientConfig::default())
    }

    pub fn with_config(url: &str, config: HttpClientConfig) -> Result<Self> {
        let endpoint = Endpoint::parse(url)?;
        let pool = ConnectionPool::new(endpoint.clone(), config.pool_config())?;

        Ok(Self {
            endpoint,
            pool,
            config,
            seqid: AtomicI32::new(0),
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Calls `M` with an already built argument struct.
    ///
    /// Oneway calls still wait for the HTTP response but ignore its body.
    pub async fn call<M: Method>(
        &self,
        args: &M::Args,
    ) -> std::result::Result<M::Success, CallError<M::Exception>> {
        let seqid = self.seqid.fetch_add(1, Ordering::SeqCst);
        let request = encode_call::<M>(&self.config.output_protocol, seqid, args)?;

        tracing::debug!(method = M::NAME, seqid, endpoint = %self.endpoint, "Sending call");
        let reply = self.post(request).await?;

        if M::ONEWAY {
            return Ok(void_success::<M>()?);
        }
        decode_reply::<M>(&self.config.input_protocol, &reply)
    }

    /// Calls `M` with positional and keyword arguments, bound to the
    /// argument struct before any I/O.
    pub async fn call_with<M: Method>(
        &self,
        positional: Vec<Value>,
        keyword: Map<String, Value>,
    ) -> std::result::Result<M::Success, CallError<M::Exception>> {
        let args = bind_args::<M>(positional, keyword)?;
        self.call::<M>(&args).await
    }

    /// Releases every pooled connection. The client is consumed.
    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn post(&self, body: Vec<u8>) -> Result<Bytes> {
        let request = Request::post(self.endpoint.path.as_str())
            .header(HOST, self.endpoint.authority.as_str())
            .header(CONTENT_TYPE, SKIFF_CONTENT_TYPE)
            .header(CONTENT_LENGTH, body.len())
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| SkiffError::Http(format!("Failed to build request: {}", e)))?;

        let mut conn = self.pool.acquire().await?;

        let exchange = async {
            let response = conn.send(request).await?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| SkiffError::Http(format!("Failed to read response body: {}", e)))?
                .to_bytes();
            Ok::<_, SkiffError>((status, body))
        };

        let (status, body) = match self.config.read_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| SkiffError::Timeout(timeout.as_millis() as u64))??,
            None => exchange.await?,
        };

        self.pool.release(conn).await;

        if status != StatusCode::OK {
            tracing::debug!(status = status.as_u16(), endpoint = %self.endpoint, "Call rejected");
            return Err(SkiffError::HttpStatus(status.as_u16()));
        }
        Ok(body)
    }
}
