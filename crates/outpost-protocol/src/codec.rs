//! Codec trait and implementations for serializing/deserializing frames.
//!
//! Frames travel as text, so [`Codec::encode`] produces a `String` that can
//! be handed to the transport as-is, and [`Codec::decode`] accepts the raw
//! bytes of whatever frame arrived.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that encodes Rust types to text frames and decodes raw frames
/// back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a raw frame back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use outpost_protocol::{ClientFrame, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame: ClientFrame = codec.decode(br#"{"type":"move","dx":3}"#).unwrap();
/// assert_eq!(frame, ClientFrame::Move { dx: 3, dy: 0 });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientFrame, ServerFrame};

    #[test]
    fn test_decode_malformed_json_is_decode_error() {
        let result: Result<ClientFrame, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_missing_field_is_decode_error() {
        let result: Result<ClientFrame, _> =
            JsonCodec.decode(br#"{"type":"collect"}"#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("id"), "got: {err}");
    }

    #[test]
    fn test_decode_rejects_every_bad_frame_as_decode_error() {
        let bad: [&[u8]; 4] = [
            br#"{"type":"move","dx":"far"}"#,
            br#"{"type":"move","dx":1.5}"#,
            br#"{"dx":1}"#,
            br#""move""#,
        ];
        for raw in bad {
            let result: Result<ClientFrame, _> = JsonCodec.decode(raw);
            assert!(
                matches!(result, Err(ProtocolError::Decode(_))),
                "{}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn test_encode_server_ping() {
        let text = JsonCodec.encode(&ServerFrame::Ping).unwrap();
        assert_eq!(text, r#"{"type":"ping"}"#);
    }
}
