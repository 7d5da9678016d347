//! Wire format encoding and decoding for the fixed 14-byte frame header.

use crate::error::{Result, RpcError};

/// Header size in bytes (fixed, exactly 14).
pub const HEADER_SIZE: usize = 14;

/// Magic bytes `"mrp"` identifying a mini-rpc frame.
///
/// Lets the decoder reject non-protocol traffic (e.g. an HTTP client hitting
/// the wrong port) on the first three bytes.
pub const MAGIC: [u8; 3] = [0x6d, 0x72, 0x70];

/// Protocol version carried in byte 3 of every header.
pub const VERSION: u8 = 0x01;

/// Serialization format of the frame body, 1 byte in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecKind {
    /// JSON envelope encoding.
    Json = 0,
    /// Length-prefixed binary envelope encoding.
    Binary = 1,
}

impl CodecKind {
    /// Parse the codec byte, rejecting unknown values.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CodecKind::Json),
            1 => Ok(CodecKind::Binary),
            other => Err(RpcError::UnsupportedCodec(other)),
        }
    }
}

/// Distinguishes request, response, and heartbeat frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Client → server RPC request.
    Request = 0,
    /// Server → client RPC response.
    Response = 1,
    /// Keep-alive probe; carries no body and is never surfaced to callers.
    Heartbeat = 2,
}

impl MsgType {
    /// Parse the message-type byte, rejecting unknown values.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MsgType::Request),
            1 => Ok(MsgType::Response),
            2 => Ok(MsgType::Heartbeat),
            other => Err(RpcError::UnsupportedMsgType(other)),
        }
    }
}

/// Decoded frame header.
///
/// `seq` is assigned by the sending transport and echoed by the server; it is
/// the key that routes a response back to the caller that is waiting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Serialization format of the body.
    pub codec: CodecKind,
    /// Request, Response, or Heartbeat.
    pub msg_type: MsgType,
    /// Sequence id (matches request ↔ response).
    pub seq: u32,
    /// Body length in bytes.
    pub body_len: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(codec: CodecKind, msg_type: MsgType, seq: u32, body_len: u32) -> Self {
        Self {
            codec,
            msg_type,
            seq,
            body_len,
        }
    }

    /// Create a heartbeat header. Heartbeats always have an empty body.
    pub fn heartbeat(codec: CodecKind) -> Self {
        Self::new(codec, MsgType::Heartbeat, 0, 0)
    }

    /// Encode the header to bytes (big endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than `HEADER_SIZE` (14 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..3].copy_from_slice(&MAGIC);
        buf[3] = VERSION;
        buf[4] = self.codec as u8;
        buf[5] = self.msg_type as u8;
        buf[6..10].copy_from_slice(&self.seq.to_be_bytes());
        buf[10..14].copy_from_slice(&self.body_len.to_be_bytes());
    }

    /// Decode and validate a header from exactly 14 bytes.
    ///
    /// Validates magic, version, codec, and message type; each failure is a
    /// distinct error kind and is fatal for the connection.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..3] != MAGIC {
            return Err(RpcError::InvalidMagic([buf[0], buf[1], buf[2]]));
        }
        if buf[3] != VERSION {
            return Err(RpcError::UnsupportedVersion(buf[3]));
        }
        let codec = CodecKind::from_u8(buf[4])?;
        let msg_type = MsgType::from_u8(buf[5])?;
        let seq = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        let body_len = u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]);
        Ok(Self {
            codec,
            msg_type,
            seq,
            body_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_encode_decode_roundtrip() {
        let original = Header::new(CodecKind::Binary, MsgType::Response, 42, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn header_big_endian_byte_order() {
        let header = Header::new(CodecKind::Json, MsgType::Request, 0x04050607, 0x08090A0B);
        let bytes = header.encode();

        assert_eq!(&bytes[0..3], b"mrp");
        assert_eq!(bytes[3], 0x01);
        assert_eq!(bytes[4], 0);
        assert_eq!(bytes[5], 0);

        // Seq: 0x04050607 in BE
        assert_eq!(&bytes[6..10], &[0x04, 0x05, 0x06, 0x07]);
        // Body length: 0x08090A0B in BE
        assert_eq!(&bytes[10..14], &[0x08, 0x09, 0x0A, 0x0B]);
    }

    #[test]
    fn header_size_is_exactly_14() {
        assert_eq!(HEADER_SIZE, 14);
        let header = Header::new(CodecKind::Json, MsgType::Request, 1, 0);
        assert_eq!(header.encode().len(), 14);
    }

    #[test]
    fn decode_rejects_invalid_magic() {
        let mut buf = Header::new(CodecKind::Json, MsgType::Request, 1, 0).encode();
        buf[0] = 0x00;
        buf[1] = 0x00;
        buf[2] = 0x00;
        let err = Header::decode(&buf).unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }

    #[test]
    fn decode_rejects_unsupported_version() {
        let mut buf = Header::new(CodecKind::Json, MsgType::Request, 1, 0).encode();
        buf[3] = 0xFF;
        let err = Header::decode(&buf).unwrap_err();
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn decode_rejects_unsupported_codec() {
        let mut buf = Header::new(CodecKind::Json, MsgType::Request, 1, 0).encode();
        buf[4] = 7;
        let err = Header::decode(&buf).unwrap_err();
        assert!(err.to_string().contains("unsupported codec"));
    }

    #[test]
    fn decode_rejects_unsupported_msg_type() {
        let mut buf = Header::new(CodecKind::Json, MsgType::Request, 1, 0).encode();
        buf[5] = 9;
        let err = Header::decode(&buf).unwrap_err();
        assert!(err.to_string().contains("unsupported message type"));
    }

    #[test]
    fn heartbeat_header_has_empty_body() {
        let header = Header::heartbeat(CodecKind::Json);
        assert_eq!(header.msg_type, MsgType::Heartbeat);
        assert_eq!(header.body_len, 0);
        assert_eq!(header.seq, 0);
    }

    #[test]
    fn encode_into_matches_encode() {
        let header = Header::new(CodecKind::Binary, MsgType::Response, 7, 3);
        let mut buf = [0u8; HEADER_SIZE];
        header.encode_into(&mut buf);
        assert_eq!(buf, header.encode());
    }
}
