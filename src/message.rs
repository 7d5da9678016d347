//! The RPC envelope exchanged between client and server.
//!
//! [`RpcMessage`] is the body of every request and response frame. The codec
//! layer serializes it, the protocol layer wraps it in a frame.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// Carries the data for a single RPC request or response.
///
/// - On request: `service_method` is set, `payload` contains the serialized
///   args, `error` is empty.
/// - On response: `payload` contains the serialized reply, `error` is
///   non-empty iff the call failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcMessage {
    /// Format `"ServiceName.MethodName"`, e.g. `"Arith.Add"`.
    pub service_method: String,
    /// Non-empty if the server-side handler failed.
    pub error: String,
    /// Serialized args (request) or reply (response) as JSON bytes.
    pub payload: Vec<u8>,
}

impl RpcMessage {
    /// Build a request envelope.
    pub fn request(service_method: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            service_method: service_method.into(),
            error: String::new(),
            payload,
        }
    }

    /// Build a successful response envelope.
    pub fn reply(service_method: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::request(service_method, payload)
    }

    /// Build a failed response envelope carrying only an error string.
    pub fn error_reply(error: impl Into<String>) -> Self {
        Self {
            service_method: String::new(),
            error: error.into(),
            payload: Vec::new(),
        }
    }

    /// Whether this envelope reports a failed call.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Split `"Service.Method"` into its two halves.
///
/// Anything other than exactly one dot separating two non-empty names is
/// rejected.
pub fn split_service_method(service_method: &str) -> Result<(&str, &str)> {
    let mut parts = service_method.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(service), Some(method), None) if !service.is_empty() && !method.is_empty() => {
            Ok((service, method))
        }
        _ => Err(RpcError::InvalidServiceMethod(service_method.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_has_no_error() {
        let msg = RpcMessage::request("Arith.Add", vec![1, 2, 3]);
        assert_eq!(msg.service_method, "Arith.Add");
        assert!(!msg.is_error());
        assert_eq!(msg.payload, vec![1, 2, 3]);
    }

    #[test]
    fn error_reply_is_error() {
        let msg = RpcMessage::error_reply("boom");
        assert!(msg.is_error());
        assert_eq!(msg.error, "boom");
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn split_accepts_exactly_one_dot() {
        assert_eq!(split_service_method("Arith.Add").unwrap(), ("Arith", "Add"));
        for bad in ["Arith", "Arith.Add.Extra", ".Add", "Arith.", "", "."] {
            assert!(split_service_method(bad).is_err(), "{bad:?} should fail");
        }
    }
}
