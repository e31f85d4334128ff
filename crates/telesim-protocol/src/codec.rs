//! Codecs turning wire types into bytes and back.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes and decodes serde types for the transport.
///
/// The server is generic over this trait so a binary codec can replace
/// JSON without touching connection handling.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Parses a frame back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON [`Codec`]. Browser and script subscribers read these frames as-is.
///
/// ```rust
/// use telesim_protocol::{Codec, Envelope, JsonCodec, Payload, Request};
///
/// let codec = JsonCodec;
/// let env = Envelope { seq: 1, timestamp: 0, payload: Payload::Request(Request::Status) };
/// let bytes = codec.encode(&env).unwrap();
/// let back: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(env, back);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
