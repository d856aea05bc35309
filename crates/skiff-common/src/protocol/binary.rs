//! Strict binary message framing.
//!
//! Wire format of one message:
//!
//! ```text
//! [i32 0x8001_0000 | kind] [i32 name length] [name bytes] [i32 seqid]
//! [u32 payload length] [payload bytes]
//! ```
//!
//! All integers are big-endian. The payload is one struct encoded with the
//! factory's [`Codec`]. Because the payload is length-prefixed, a reader can
//! drain a struct it has no descriptor for and stay aligned on the stream.

use std::io::{self, ErrorKind, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{Result, SkiffError};
use super::message::{MessageHeader, MessageType};
use crate::transport::codec::Codec;

/// Maximum message size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xFFFF_0000;
const TYPE_MASK: u32 = 0x0000_00FF;

/// Builds input and output protocols bound to a byte stream.
///
/// # Example
///
/// ```
/// use skiff_common::protocol::{MessageHeader, MessageType, ProtocolFactory};
///
/// let factory = ProtocolFactory::binary();
/// let mut buf = Vec::new();
/// let mut out = factory.output(&mut buf);
/// out.write_message_begin(&MessageHeader::new("ping", MessageType::Call, 0)).unwrap();
/// out.write_struct(&()).unwrap();
/// out.write_message_end().unwrap();
///
/// let mut input = factory.input(&buf[..]);
/// let header = input.read_message_begin().unwrap();
/// assert_eq!(header.name, "ping");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolFactory {
    codec: Codec,
}

impl ProtocolFactory {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }

    /// Binary framing with postcard payloads
    pub fn binary() -> Self {
        Self::new(Codec::binary())
    }

    /// Binary framing with JSON payloads
    pub fn json() -> Self {
        Self::new(Codec::json())
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn input<R: Read>(&self, reader: R) -> InputProtocol<R> {
        InputProtocol {
            reader,
            codec: self.codec,
        }
    }

    pub fn output<W: Write>(&self, writer: W) -> OutputProtocol<W> {
        OutputProtocol {
            writer,
            codec: self.codec,
        }
    }
}

/// Decoder for messages arriving on a stream.
pub struct InputProtocol<R> {
    reader: R,
    codec: Codec,
}

impl<R: Read> InputProtocol<R> {
    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads a message header.
    ///
    /// Returns [`SkiffError::Closed`] when the stream ends cleanly before the
    /// first byte, which is how a peer hangs up between calls.
    pub fn read_message_begin(&mut self) -> Result<MessageHeader> {
        let word = self.read_first_word()?;
        if word & VERSION_MASK != VERSION_1 {
            return Err(SkiffError::Protocol(format!(
                "bad version in message header: {:#010x}",
                word
            )));
        }
        let kind = MessageType::try_from((word & TYPE_MASK) as i32)?;

        let name_len = self.read_i32()?;
        if name_len < 0 || name_len as usize > MAX_MESSAGE_SIZE {
            return Err(SkiffError::Protocol(format!(
                "invalid method name length {}",
                name_len
            )));
        }
        let mut name = vec![0u8; name_len as usize];
        self.reader.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|e| SkiffError::Protocol(format!("method name is not UTF-8: {}", e)))?;

        let seqid = self.read_i32()?;

        Ok(MessageHeader { name, kind, seqid })
    }

    /// Reads one length-prefixed struct and decodes it.
    pub fn read_struct<T: DeserializeOwned>(&mut self) -> Result<T> {
        let payload = self.read_payload()?;
        self.codec.decode(&payload)
    }

    /// Reads one length-prefixed struct as raw bytes.
    pub fn read_payload(&mut self) -> Result<Vec<u8>> {
        let len = self.read_payload_len()?;
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Consumes one struct without decoding it.
    pub fn skip_struct(&mut self) -> Result<()> {
        let len = self.read_payload_len()?;
        let skipped = io::copy(&mut (&mut self.reader).take(len as u64), &mut io::sink())?;
        if skipped != len as u64 {
            return Err(SkiffError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "stream ended inside a struct",
            )));
        }
        Ok(())
    }

    pub fn read_message_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_payload_len(&mut self) -> Result<usize> {
        let mut buf = [0u8; 4];
        self.reader.read_exact(&mut buf)?;
        let len = u32::from_be_bytes(buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(SkiffError::Protocol(format!(
                "Message too large: {} bytes (max {} bytes)",
                len, MAX_MESSAGE_SIZE
            )));
        }
        Ok(len)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.reader.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_first_word(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Err(SkiffError::Closed),
                Ok(0) => {
                    return Err(SkiffError::Io(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "stream ended inside a message header",
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(e)),
            }
        }
        Ok(u32::from_be_bytes(buf))
    }
}

/// Encoder for messages leaving on a stream.
pub struct OutputProtocol<W> {
    writer: W,
    codec: Codec,
}

impl<W: Write> OutputProtocol<W> {
    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn write_message_begin(&mut self, header: &MessageHeader) -> Result<()> {
        let word = VERSION_1 | header.kind as u32;
        self.writer.write_all(&word.to_be_bytes())?;
        self.writer
            .write_all(&(header.name.len() as i32).to_be_bytes())?;
        self.writer.write_all(header.name.as_bytes())?;
        self.writer.write_all(&header.seqid.to_be_bytes())?;
        Ok(())
    }

    /// Encodes one struct and writes it with its length prefix.
    pub fn write_struct<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let payload = self.codec.encode(value)?;
        self.write_payload(&payload)
    }

    pub fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(SkiffError::Protocol(format!(
                "Message too large: {} bytes (max {} bytes)",
                payload.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        self.writer
            .write_all(&(payload.len() as u32).to_be_bytes())?;
        self.writer.write_all(payload)?;
        Ok(())
    }

    /// Ends the message and flushes it to the underlying stream.
    pub fn write_message_end(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Resets and aborts mean the peer is gone; everything else stays an IO error.
fn map_io_error(err: io::Error) -> SkiffError {
    match err.kind() {
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            SkiffError::Closed
        }
        _ => SkiffError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(header: &MessageHeader, body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut out = ProtocolFactory::binary().output(&mut buf);
        out.write_message_begin(header).unwrap();
        out.write_struct(&body.to_string()).unwrap();
        out.write_message_end().unwrap();
        buf
    }

    #[test]
    fn test_header_layout() {
        let buf = encode(&MessageHeader::new("add", MessageType::Call, 7), "");

        assert_eq!(&buf[0..4], &[0x80, 0x01, 0x00, 0x01]);
        assert_eq!(&buf[4..8], &3i32.to_be_bytes());
        assert_eq!(&buf[8..11], b"add");
        assert_eq!(&buf[11..15], &7i32.to_be_bytes());
    }

    #[test]
    fn test_read_header_and_body() {
        let header = MessageHeader::new("get", MessageType::Reply, -3);
        let buf = encode(&header, "Dennis");

        let mut input = ProtocolFactory::binary().input(&buf[..]);
        assert_eq!(input.read_message_begin().unwrap(), header);
        let body: String = input.read_struct().unwrap();
        input.read_message_end().unwrap();
        assert_eq!(body, "Dennis");
    }

    #[test]
    fn test_empty_stream_is_closed() {
        let mut input = ProtocolFactory::binary().input(std::io::empty());
        assert!(input.read_message_begin().unwrap_err().is_closed());
    }

    #[test]
    fn test_truncated_header_is_not_closed() {
        let mut input = ProtocolFactory::binary().input(&[0x80, 0x01][..]);
        let err = input.read_message_begin().unwrap_err();
        assert!(matches!(err, SkiffError::Io(_)));
    }

    #[test]
    fn test_bad_version_is_protocol_error() {
        let mut input = ProtocolFactory::binary().input(&[0, 0, 0, 1, 0, 0, 0, 0][..]);
        let err = input.read_message_begin().unwrap_err();
        assert!(matches!(err, SkiffError::Protocol(_)));
    }

    #[test]
    fn test_unknown_message_type_is_protocol_error() {
        let mut input = ProtocolFactory::binary().input(&[0x80, 0x01, 0x00, 0x09][..]);
        let err = input.read_message_begin().unwrap_err();
        assert!(matches!(err, SkiffError::Protocol(_)));
    }

    #[test]
    fn test_skip_struct_keeps_stream_aligned() {
        let mut buf = encode(&MessageHeader::new("a", MessageType::Call, 1), "first");
        buf.extend(encode(&MessageHeader::new("b", MessageType::Call, 2), "second"));

        let mut input = ProtocolFactory::binary().input(&buf[..]);
        input.read_message_begin().unwrap();
        input.skip_struct().unwrap();
        let header = input.read_message_begin().unwrap();
        let body: String = input.read_struct().unwrap();

        assert_eq!(header.name, "b");
        assert_eq!(body, "second");
    }

    #[test]
    fn test_skip_struct_detects_truncation() {
        let mut buf = encode(&MessageHeader::new("a", MessageType::Call, 1), "truncated");
        buf.truncate(buf.len() - 2);

        let mut input = ProtocolFactory::binary().input(&buf[..]);
        input.read_message_begin().unwrap();
        assert!(input.skip_struct().is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes());
        let mut input = ProtocolFactory::binary().input(&buf[..]);
        assert!(matches!(input.read_payload(), Err(SkiffError::Protocol(_))));
    }
}
