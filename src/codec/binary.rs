//! Length-prefixed binary envelope codec.
//!
//! Layout, all integers big endian:
//!
//! ```text
//! ┌──────────────┬──────────────┬────────────────┬─────────┬─────────────┬───────┐
//! │ method_len u16│ method bytes│ payload_len u32│ payload │ error_len u16│ error │
//! └──────────────┴──────────────┴────────────────┴─────────┴─────────────┴───────┘
//! ```
//!
//! The payload itself stays JSON-encoded; the win over the JSON codec is
//! avoiding field names and byte-array escaping on the outer envelope.

use crate::error::{Result, RpcError};
use crate::message::RpcMessage;

/// Binary codec for the RPC envelope.
pub struct BinaryCodec;

impl BinaryCodec {
    /// Encode an envelope into a single pre-sized buffer.
    pub fn encode(msg: &RpcMessage) -> Vec<u8> {
        let method = msg.service_method.as_bytes();
        let error = msg.error.as_bytes();

        // Total size is known upfront, one allocation.
        let total = 2 + method.len() + 4 + msg.payload.len() + 2 + error.len();
        let mut buf = Vec::with_capacity(total);

        buf.extend_from_slice(&(method.len() as u16).to_be_bytes());
        buf.extend_from_slice(method);
        buf.extend_from_slice(&(msg.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&msg.payload);
        buf.extend_from_slice(&(error.len() as u16).to_be_bytes());
        buf.extend_from_slice(error);
        buf
    }

    /// Decode an envelope, bounds-checking every length prefix before
    /// slicing.
    pub fn decode(data: &[u8]) -> Result<RpcMessage> {
        let mut cursor = Cursor::new(data);

        let method_len = cursor.read_u16()? as usize;
        let method = cursor.read_bytes(method_len)?;
        let payload_len = cursor.read_u32()? as usize;
        let payload = cursor.read_bytes(payload_len)?;
        let error_len = cursor.read_u16()? as usize;
        let error = cursor.read_bytes(error_len)?;

        Ok(RpcMessage {
            service_method: String::from_utf8(method.to_vec())?,
            error: String::from_utf8(error.to_vec())?,
            payload: payload.to_vec(),
        })
    }
}

/// Minimal forward-only reader over the envelope bytes.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(RpcError::Truncated)?;
        if end > self.data.len() {
            return Err(RpcError::Truncated);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let msg = RpcMessage {
            service_method: "Arith.Add".to_string(),
            error: "division by zero".to_string(),
            payload: vec![1, 2, 3, 4, 5],
        };
        let decoded = BinaryCodec::decode(&BinaryCodec::encode(&msg)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn exact_byte_layout() {
        let msg = RpcMessage {
            service_method: "A.B".to_string(),
            error: "e".to_string(),
            payload: vec![0xAA, 0xBB],
        };
        let buf = BinaryCodec::encode(&msg);

        assert_eq!(&buf[0..2], &[0x00, 0x03]); // method_len
        assert_eq!(&buf[2..5], b"A.B");
        assert_eq!(&buf[5..9], &[0x00, 0x00, 0x00, 0x02]); // payload_len
        assert_eq!(&buf[9..11], &[0xAA, 0xBB]);
        assert_eq!(&buf[11..13], &[0x00, 0x01]); // error_len
        assert_eq!(&buf[13..14], b"e");
        assert_eq!(buf.len(), 14);
    }

    #[test]
    fn empty_fields_roundtrip() {
        let msg = RpcMessage::default();
        let buf = BinaryCodec::encode(&msg);
        assert_eq!(buf.len(), 2 + 4 + 2);
        let decoded = BinaryCodec::decode(&buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let msg = RpcMessage {
            service_method: "Arith.Add".to_string(),
            error: String::new(),
            payload: vec![9; 32],
        };
        let buf = BinaryCodec::encode(&msg);

        for cut in [0, 1, 5, buf.len() - 1] {
            let err = BinaryCodec::decode(&buf[..cut]).unwrap_err();
            assert!(err.to_string().contains("truncated"), "cut at {cut}");
        }
    }

    #[test]
    fn large_payload_roundtrip() {
        let msg = RpcMessage {
            service_method: "Blob.Put".to_string(),
            error: String::new(),
            payload: vec![0x5A; 1024 * 1024],
        };
        let decoded = BinaryCodec::decode(&BinaryCodec::encode(&msg)).unwrap();
        assert_eq!(decoded.payload, msg.payload);
    }
}
