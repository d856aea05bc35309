//! Skiff Server
//!
//! This crate provides the request [`Processor`] and the three server shapes
//! that drive it:
//!
//! - [`SimpleServer`]: one connection at a time
//! - [`ThreadedServer`]: one OS thread per connection
//! - [`HttpApp`] / [`HttpServer`]: one call per HTTP request, hosted on hyper

pub mod http_app;
pub mod http_server;
pub mod processor;
pub mod server;
pub mod simple_server;
pub mod threaded_server;

pub use http_app::{make_http_app, HttpApp, HttpAppConfig};
pub use http_server::HttpServer;
pub use processor::{Processor, ProcessorBuilder};
pub use server::{ServerConfig, ServerHandle};
pub use simple_server::SimpleServer;
pub use threaded_server::ThreadedServer;
