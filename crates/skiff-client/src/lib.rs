//! Skiff Client
//!
//! - [`Client`]: connection-oriented client for the socket servers; one
//!   stream pair, one call at a time
//! - [`HttpClient`]: async client issuing one `POST` per call over a bounded
//!   [`ConnectionPool`]

mod endpoint;

pub mod client;
pub mod http;
pub mod pool;

pub use client::{Client, TcpClient};
pub use http::{HttpClient, HttpClientConfig};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
