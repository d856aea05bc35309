use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;

/// Struct encoder used for message payloads.
///
/// The envelope framing is fixed; only the bytes of argument, result and
/// exception structs depend on the codec. Both ends of a connection must
/// agree on it out of band.
///
/// # Example
///
/// ```
/// use skiff_common::transport::Codec;
///
/// let codec = Codec::binary();
/// let encoded = codec.encode(&("Dennis".to_string(), 42u32)).unwrap();
/// let decoded: (String, u32) = codec.decode(&encoded).unwrap();
/// assert_eq!(decoded, ("Dennis".to_string(), 42));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Compact binary encoding; the reference encoding
    Binary(PostcardCodec),
    /// JSON encoding, handy when inspecting traffic
    Json(JsonCodec),
}

impl Codec {
    pub fn binary() -> Self {
        Codec::Binary(PostcardCodec)
    }

    pub fn json() -> Self {
        Codec::Json(JsonCodec)
    }

    /// Encode a struct to bytes
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Binary(_) => PostcardCodec::encode(value),
            Codec::Json(_) => JsonCodec::encode(value),
        }
    }

    /// Decode a struct from bytes
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Binary(_) => PostcardCodec::decode(data),
            Codec::Json(_) => JsonCodec::decode(data),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::binary()
    }
}

/// Postcard codec for payload structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostcardCodec;

impl PostcardCodec {
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_stdvec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}

/// JSON codec for payload structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
