//! Skiff Common Types and Transport
//!
//! This crate provides the message envelope, the exception-as-field
//! convention and the byte transports shared by the skiff server and client.
//!
//! # Overview
//!
//! Skiff is a schema-driven RPC runtime. A service is described by a set of
//! [`Method`] descriptors (normally emitted by a schema compiler); this crate
//! turns calls on those methods into messages and back:
//!
//! - **Protocol Layer**: message headers, application exceptions, method
//!   descriptors and the result-struct convention for declared exceptions
//! - **Transport Layer**: payload codecs, buffered stream factories and TCP
//!   helpers
//!
//! # Wire Format
//!
//! - **Header**: `[0x8001_0000 | type] [name length] [name] [seqid]`, big-endian
//! - **Payload**: `[4-byte length prefix as u32 big-endian] + [codec bytes]`
//! - **Max Message Size**: 100 MB
//!
//! # Components
//!
//! - [`protocol`] - Envelope, exceptions, method descriptors, reply resolution
//! - [`transport`] - Codecs, transport factories and TCP helpers
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use skiff_common::protocol::*;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct EchoArgs { text: String }
//!
//! struct Echo;
//! impl Method for Echo {
//!     const NAME: &'static str = "echo";
//!     const ARG_FIELDS: &'static [&'static str] = &["text"];
//!     type Args = EchoArgs;
//!     type Success = String;
//!     type Exception = NoException;
//! }
//!
//! let protocol = ProtocolFactory::binary();
//! let call = encode_call::<Echo>(&protocol, 0, &EchoArgs { text: "hi".into() }).unwrap();
//!
//! let mut input = protocol.input(&call[..]);
//! let header = input.read_message_begin().unwrap();
//! assert_eq!((header.name.as_str(), header.kind), ("echo", MessageType::Call));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
