//! Call envelope types.

use std::fmt;

use super::error::SkiffError;

/// Sequence id carried by every message.
pub type SeqId = i32;

/// Envelope tag distinguishing the four message shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl MessageType {
    /// True for the kinds a server accepts as requests.
    pub fn is_request(self) -> bool {
        matches!(self, MessageType::Call | MessageType::Oneway)
    }
}

impl TryFrom<i32> for MessageType {
    type Error = SkiffError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Call),
            2 => Ok(MessageType::Reply),
            3 => Ok(MessageType::Exception),
            4 => Ok(MessageType::Oneway),
            other => Err(SkiffError::Protocol(format!("unknown message type {}", other))),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Call => "CALL",
            MessageType::Reply => "REPLY",
            MessageType::Exception => "EXCEPTION",
            MessageType::Oneway => "ONEWAY",
        };
        f.write_str(name)
    }
}

/// The `{name, kind, seqid}` header that precedes every payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub kind: MessageType,
    pub seqid: SeqId,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, kind: MessageType, seqid: SeqId) -> Self {
        Self {
            name: name.into(),
            kind,
            seqid,
        }
    }

    /// Header for the answer to this message, keeping name and seqid.
    pub fn answer(&self, kind: MessageType) -> Self {
        Self::new(self.name.clone(), kind, self.seqid)
    }
}
