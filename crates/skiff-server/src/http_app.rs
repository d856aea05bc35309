//! Hosting-agnostic HTTP application.
//!
//! [`HttpApp`] turns one HTTP request into exactly one `process` cycle. It
//! never touches a socket: a hosting layer hands it a request whose body can
//! be read synchronously and writes the returned response back.
//! [`HttpServer`](crate::HttpServer) is the hyper-based host shipped with
//! this crate.

use std::io::Read;
use std::sync::Arc;

use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use skiff_common::protocol::{ProtocolFactory, Result, MAX_MESSAGE_SIZE};
use skiff_common::transport::{
    BufferedTransportFactory, TransportFactory, DEFAULT_BUFFER_SIZE, SKIFF_CONTENT_TYPE,
};

use crate::processor::Processor;

pub(crate) const METHOD_NOT_ALLOWED_BODY: &str =
    "<h1>Error</h1><p>Skiff HTTP API only accepts POST</p>";
pub(crate) const INTERNAL_ERROR_BODY: &str = "500 Internal server error";

/// Configuration for [`HttpApp`].
///
/// # Example
///
/// ```
/// use skiff_common::protocol::ProtocolFactory;
/// use skiff_server::HttpAppConfig;
///
/// let config = HttpAppConfig::new()
///     .with_suppress_internal_errors(true)
///     .with_protocol(ProtocolFactory::json());
/// assert!(config.suppress_internal_errors);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpAppConfig {
    /// Answer failed calls with a generic 500 instead of returning the error
    /// to the hosting layer.
    pub suppress_internal_errors: bool,
    pub input_protocol: ProtocolFactory,
    pub output_protocol: ProtocolFactory,
}

impl Default for HttpAppConfig {
    fn default() -> Self {
        Self {
            suppress_internal_errors: false,
            input_protocol: ProtocolFactory::binary(),
            output_protocol: ProtocolFactory::binary(),
        }
    }
}

impl HttpAppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suppress_internal_errors(mut self, suppress: bool) -> Self {
        self.suppress_internal_errors = suppress;
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
}

/// One-call-per-request RPC endpoint.
///
/// Stateless apart from the shared processor, so one app can serve any
/// number of concurrent requests.
#[derive(Debug, Clone)]
pub struct HttpApp {
    processor: Arc<Processor>,
    config: HttpAppConfig,
}

impl HttpApp {
    /// Creates an app that returns failed calls to the hosting layer.
    pub fn new(processor: Arc<Processor>) -> Self {
        Self::with_config(processor, HttpAppConfig::default())
    }

    pub fn with_config(processor: Arc<Processor>, config: HttpAppConfig) -> Self {
        Self { processor, config }
    }

    pub fn config(&self) -> &HttpAppConfig {
        &self.config
    }

    /// Handles one request.
    ///
    /// Anything but `POST` gets `405` and the processor is not invoked. A
    /// `POST` body is run through the processor once and the reply bytes come
    /// back with `200`. When the call fails, the error is returned unless
    /// internal errors are suppressed, in which case the answer is a `500`.
    pub fn handle<B: Read>(&self, request: Request<B>) -> Result<Response<Bytes>> {
        if request.method() != Method::POST {
            tracing::debug!(method = %request.method(), "Rejecting non-POST request");
            return Ok(html_response(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_BODY));
        }

        let transport = BufferedTransportFactory::with_capacity(input_buffer_size(request.headers()));
        let mut iprot = self.config.input_protocol.input(transport.input(request.into_body()));
        let mut reply = Vec::new();

        let result = self
            .processor
            .process(&mut iprot, &mut self.config.output_protocol.output(&mut reply));

        match result {
            Ok(()) => Ok(reply_response(reply)),
            Err(e) if self.config.suppress_internal_errors => {
                tracing::error!(error = %e, "Request failed; answering 500");
                Ok(html_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY))
            }
            Err(e) => Err(e),
        }
    }
}

/// Creates the app the CLI serves: default factories, internal errors
/// answered with `500`.
pub fn make_http_app(processor: Arc<Processor>) -> HttpApp {
    HttpApp::with_config(
        processor,
        HttpAppConfig::default().with_suppress_internal_errors(true),
    )
}

/// Sizes the read buffer from `Content-Length`, falling back to the default
/// when the header is missing or unusable.
fn input_buffer_size(headers: &HeaderMap) -> usize {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|&len| len > 0)
        .map(|len| len.min(MAX_MESSAGE_SIZE))
        .unwrap_or(DEFAULT_BUFFER_SIZE)
}

fn reply_response(reply: Vec<u8>) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(reply));
    let len = response.body().len();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(SKIFF_CONTENT_TYPE));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    response
}

fn html_response(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    response
}
