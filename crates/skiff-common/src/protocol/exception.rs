//! Application exceptions: undeclared, transport-level call failures.
//!
//! These are sent as an `EXCEPTION` message instead of a result struct, so a
//! peer can report a failed call without knowing the method's result shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric failure codes, shared with other implementations of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum ApplicationExceptionKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
}

impl From<ApplicationExceptionKind> for i32 {
    fn from(kind: ApplicationExceptionKind) -> i32 {
        match kind {
            ApplicationExceptionKind::Unknown => 0,
            ApplicationExceptionKind::UnknownMethod => 1,
            ApplicationExceptionKind::InvalidMessageType => 2,
            ApplicationExceptionKind::WrongMethodName => 3,
            ApplicationExceptionKind::BadSequenceId => 4,
            ApplicationExceptionKind::MissingResult => 5,
            ApplicationExceptionKind::InternalError => 6,
            ApplicationExceptionKind::ProtocolError => 7,
        }
    }
}

impl From<i32> for ApplicationExceptionKind {
    fn from(code: i32) -> Self {
        match code {
            1 => ApplicationExceptionKind::UnknownMethod,
            2 => ApplicationExceptionKind::InvalidMessageType,
            3 => ApplicationExceptionKind::WrongMethodName,
            4 => ApplicationExceptionKind::BadSequenceId,
            5 => ApplicationExceptionKind::MissingResult,
            6 => ApplicationExceptionKind::InternalError,
            7 => ApplicationExceptionKind::ProtocolError,
            _ => ApplicationExceptionKind::Unknown,
        }
    }
}

impl fmt::Display for ApplicationExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplicationExceptionKind::Unknown => "UNKNOWN",
            ApplicationExceptionKind::UnknownMethod => "UNKNOWN_METHOD",
            ApplicationExceptionKind::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            ApplicationExceptionKind::WrongMethodName => "WRONG_METHOD_NAME",
            ApplicationExceptionKind::BadSequenceId => "BAD_SEQUENCE_ID",
            ApplicationExceptionKind::MissingResult => "MISSING_RESULT",
            ApplicationExceptionKind::InternalError => "INTERNAL_ERROR",
            ApplicationExceptionKind::ProtocolError => "PROTOCOL_ERROR",
        };
        f.write_str(name)
    }
}

/// A transport-level RPC failure with a code and a human-readable message.
///
/// # Example
///
/// ```
/// use skiff_common::protocol::{ApplicationException, ApplicationExceptionKind};
///
/// let x = ApplicationException::unknown_method("frobnicate");
/// assert_eq!(x.kind, ApplicationExceptionKind::UnknownMethod);
/// assert!(x.message.contains("frobnicate"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ApplicationException {
    pub message: String,
    pub kind: ApplicationExceptionKind,
}

impl ApplicationException {
    pub fn new(kind: ApplicationExceptionKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn unknown_method(name: &str) -> Self {
        Self::new(
            ApplicationExceptionKind::UnknownMethod,
            format!("Unknown method '{}'", name),
        )
    }

    pub fn missing_result(name: &str) -> Self {
        Self::new(
            ApplicationExceptionKind::MissingResult,
            format!("{} failed: unknown result", name),
        )
    }
}
