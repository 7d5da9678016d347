//! Codec module - envelope serialization.
//!
//! Two interchangeable encodings of [`RpcMessage`](crate::message::RpcMessage),
//! selected per frame by the header's codec byte:
//!
//! - [`JsonCodec`] - human-readable, easy to debug.
//! - [`BinaryCodec`] - compact length-prefixed layout, single-allocation
//!   encode.
//!
//! Codecs are marker structs with static methods; [`Codec`] is the runtime
//! dispatch over the codec byte carried in each frame header. A server reply
//! always echoes the request's codec so the client decodes with the same one.

mod binary;
mod json;

pub use binary::BinaryCodec;
pub use json::JsonCodec;

use crate::error::Result;
use crate::message::RpcMessage;
use crate::protocol::CodecKind;

/// Runtime codec selection, driven by the frame header's codec byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// JSON envelope encoding.
    Json,
    /// Length-prefixed binary envelope encoding.
    Binary,
}

impl Codec {
    /// Select the codec for a frame header's codec kind.
    pub fn for_kind(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Json => Codec::Json,
            CodecKind::Binary => Codec::Binary,
        }
    }

    /// The codec kind to stamp into outgoing frame headers.
    pub fn kind(&self) -> CodecKind {
        match self {
            Codec::Json => CodecKind::Json,
            Codec::Binary => CodecKind::Binary,
        }
    }

    /// Encode an envelope to body bytes.
    pub fn encode(&self, msg: &RpcMessage) -> Result<Vec<u8>> {
        match self {
            Codec::Json => JsonCodec::encode(msg),
            Codec::Binary => Ok(BinaryCodec::encode(msg)),
        }
    }

    /// Decode body bytes back into an envelope.
    pub fn decode(&self, data: &[u8]) -> Result<RpcMessage> {
        match self {
            Codec::Json => JsonCodec::decode(data),
            Codec::Binary => BinaryCodec::decode(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RpcMessage {
        RpcMessage {
            service_method: "Arith.Add".to_string(),
            error: String::new(),
            payload: br#"{"a":1,"b":2}"#.to_vec(),
        }
    }

    #[test]
    fn both_codecs_roundtrip() {
        for codec in [Codec::Json, Codec::Binary] {
            let encoded = codec.encode(&sample()).unwrap();
            let decoded = codec.decode(&encoded).unwrap();
            assert_eq!(decoded, sample());
        }
    }

    #[test]
    fn roundtrip_preserves_empty_fields() {
        let msg = RpcMessage::default();
        for codec in [Codec::Json, Codec::Binary] {
            let decoded = codec.decode(&codec.encode(&msg).unwrap()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn roundtrip_preserves_non_ascii_method() {
        let msg = RpcMessage {
            service_method: "算术.加法".to_string(),
            error: "übel".to_string(),
            payload: vec![0x00, 0xFF, 0x80],
        };
        for codec in [Codec::Json, Codec::Binary] {
            let decoded = codec.decode(&codec.encode(&msg).unwrap()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn kind_matches_for_kind() {
        assert_eq!(Codec::for_kind(CodecKind::Json).kind(), CodecKind::Json);
        assert_eq!(Codec::for_kind(CodecKind::Binary).kind(), CodecKind::Binary);
    }
}
