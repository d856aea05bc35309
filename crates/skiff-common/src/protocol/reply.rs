//! The exception-as-field convention.
//!
//! On the wire a reply carries a result struct with an optional `success`
//! field and one optional field for the declared exceptions. Decoding turns
//! it into an [`Outcome`], and [`resolve`] maps the outcome to the value or
//! error the caller sees.

use std::io::{Read, Write};

use serde::de::IntoDeserializer;
use serde::{Deserialize, Serialize};

use super::binary::{InputProtocol, OutputProtocol, ProtocolFactory};
use super::error::{CallError, Result, SkiffError};
use super::exception::ApplicationException;
use super::message::{MessageHeader, MessageType, SeqId};
use super::method::Method;

/// Wire shape of a method's result struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFields<T, E> {
    pub success: Option<T>,
    pub exception: Option<E>,
}

impl<T, E> ResultFields<T, E> {
    /// Result struct for a normal return. Void methods leave `success` unset.
    pub fn returned<M>(value: T) -> Self
    where
        M: Method<Success = T, Exception = E>,
    {
        Self {
            success: if M::VOID { None } else { Some(value) },
            exception: None,
        }
    }

    pub fn raised(exception: E) -> Self {
        Self {
            success: None,
            exception: Some(exception),
        }
    }

    /// `success` wins over `exception` even when a malformed peer sets both.
    pub fn into_outcome(self) -> Outcome<T, E> {
        match (self.success, self.exception) {
            (Some(value), _) => Outcome::Success(value),
            (None, Some(exception)) => Outcome::Declared(exception),
            (None, None) => Outcome::Empty,
        }
    }
}

/// Decoded result struct: exactly one of the three states.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E> {
    Success(T),
    Declared(E),
    Empty,
}

/// Maps a decoded outcome to the call's return value or failure.
///
/// An empty result is a normal return for void methods and a
/// `MISSING_RESULT` application exception for everything else.
pub fn resolve<M: Method>(
    outcome: Outcome<M::Success, M::Exception>,
) -> std::result::Result<M::Success, CallError<M::Exception>> {
    match outcome {
        Outcome::Success(value) => Ok(value),
        Outcome::Declared(exception) => Err(CallError::Declared(exception)),
        Outcome::Empty if M::VOID => Ok(void_success::<M>()?),
        Outcome::Empty => {
            let missing = ApplicationException::missing_result(M::NAME);
            Err(SkiffError::Application(missing).into())
        }
    }
}

/// The value a void method "returns".
///
/// Void methods use `()` as their success type, which deserializes from a
/// unit value.
pub fn void_success<M: Method>() -> Result<M::Success> {
    <M::Success as Deserialize>::deserialize(().into_deserializer()).map_err(
        |e: serde::de::value::Error| {
            SkiffError::Protocol(format!(
                "{} is void but its success type is not unit: {}",
                M::NAME,
                e
            ))
        },
    )
}

/// Writes a request message for `M` to an output protocol: `ONEWAY` for
/// oneway methods, `CALL` for everything else.
pub fn write_call<M: Method, W: Write>(
    oprot: &mut OutputProtocol<W>,
    seqid: SeqId,
    args: &M::Args,
) -> Result<()> {
    let kind = if M::ONEWAY {
        MessageType::Oneway
    } else {
        MessageType::Call
    };
    oprot.write_message_begin(&MessageHeader::new(M::NAME, kind, seqid))?;
    oprot.write_struct(args)?;
    oprot.write_message_end()
}

/// Encodes a complete request message for `M` into a byte buffer.
pub fn encode_call<M: Method>(
    protocol: &ProtocolFactory,
    seqid: SeqId,
    args: &M::Args,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_call::<M, _>(&mut protocol.output(&mut buf), seqid, args)?;
    Ok(buf)
}

/// Reads a reply to a call of `M` and resolves it.
///
/// An `EXCEPTION` message fails the call with the decoded application
/// exception. Returns the reply's seqid next to the resolved result so
/// connection-oriented callers can check it.
pub fn recv_reply<M: Method, R: Read>(
    iprot: &mut InputProtocol<R>,
) -> Result<(SeqId, std::result::Result<M::Success, CallError<M::Exception>>)> {
    let header = iprot.read_message_begin()?;
    match header.kind {
        MessageType::Exception => {
            let exception: ApplicationException = iprot.read_struct()?;
            iprot.read_message_end()?;
            Ok((header.seqid, Err(SkiffError::Application(exception).into())))
        }
        MessageType::Reply => {
            let fields: ResultFields<M::Success, M::Exception> = iprot.read_struct()?;
            iprot.read_message_end()?;
            Ok((header.seqid, resolve::<M>(fields.into_outcome())))
        }
        other => Err(SkiffError::Protocol(format!(
            "expected a reply to '{}', got a {} message",
            M::NAME,
            other
        ))),
    }
}

/// Decodes a complete reply message held in memory.
pub fn decode_reply<M: Method>(
    protocol: &ProtocolFactory,
    data: &[u8],
) -> std::result::Result<M::Success, CallError<M::Exception>> {
    let (_, result) = recv_reply::<M, _>(&mut protocol.input(data))?;
    result
}
