//! Skiff transport layer
//!
//! Byte-level plumbing underneath the protocol:
//!
//! - **[`Codec`]**: encodes payload structs (postcard or JSON)
//! - **[`TransportFactory`]** / **[`BufferedTransportFactory`]**: wrap a
//!   connection's byte channels in buffered streams
//! - **[`TcpTransport`]**: blocking TCP connect/split/close helpers used by the
//!   socket servers and the connection-oriented client
//!
//! The HTTP transport lives with the HTTP server and client crates, since it
//! needs an async runtime.

pub mod buffered;
pub mod codec;
pub mod tcp;

/// Content type of every skiff request and reply body sent over HTTP.
pub const SKIFF_CONTENT_TYPE: &str = "application/x-skiff";

pub use buffered::{BufferedTransportFactory, TransportFactory, DEFAULT_BUFFER_SIZE};
pub use codec::{Codec, JsonCodec, PostcardCodec};
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};
