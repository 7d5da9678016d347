//! JSON envelope codec using `serde_json`.

use crate::error::Result;
use crate::message::RpcMessage;

/// JSON codec for the RPC envelope.
///
/// Pros: human-readable, cross-language, easy to debug.
/// Cons: slower and larger than the binary layout (field names repeated,
/// payload bytes spelled out as a number array).
pub struct JsonCodec;

impl JsonCodec {
    /// Encode an envelope to JSON bytes.
    #[inline]
    pub fn encode(msg: &RpcMessage) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(msg)?)
    }

    /// Decode JSON bytes back into an envelope.
    #[inline]
    pub fn decode(data: &[u8]) -> Result<RpcMessage> {
        Ok(serde_json::from_slice(data)?)
    }
}
