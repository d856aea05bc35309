use std::fmt;

use thiserror::Error;

use super::exception::ApplicationException;

/// Errors that abort a call or a connection.
///
/// Declared exceptions are never represented here: they travel inside the
/// result struct and surface as [`CallError::Declared`] on the client.
#[derive(Error, Debug)]
pub enum SkiffError {
    #[error("Transport closed by peer")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Application exception: {0}")]
    Application(#[from] ApplicationException),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Timed out after {0}ms waiting for a pooled connection")]
    PoolTimeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl SkiffError {
    /// True when the error only means the peer went away between messages.
    pub fn is_closed(&self) -> bool {
        matches!(self, SkiffError::Closed)
    }
}

pub type Result<T> = std::result::Result<T, SkiffError>;

/// Failure of a typed call: either one of the method's declared exceptions
/// or anything that went wrong below the result struct.
#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error("declared exception: {0:?}")]
    Declared(E),

    #[error(transparent)]
    Rpc(#[from] SkiffError),
}

impl<E> CallError<E> {
    /// Returns the declared exception, if that is what the call raised.
    pub fn declared(self) -> Option<E> {
        match self {
            CallError::Declared(e) => Some(e),
            CallError::Rpc(_) => None,
        }
    }

    /// Returns the application exception sent by the peer, if any.
    pub fn application(&self) -> Option<&ApplicationException> {
        match self {
            CallError::Rpc(SkiffError::Application(x)) => Some(x),
            _ => None,
        }
    }
}

/// What a handler method can raise besides returning normally.
///
/// `Declared` is routed into the result struct; `Failure` is treated as a
/// transport-level failure and ends the connection.
#[derive(Debug)]
pub enum Raised<E> {
    Declared(E),
    Failure(String),
}

impl<E> Raised<E> {
    pub fn failure(err: impl fmt::Display) -> Self {
        Raised::Failure(err.to_string())
    }
}

impl<E> From<E> for Raised<E> {
    fn from(err: E) -> Self {
        Raised::Declared(err)
    }
}
