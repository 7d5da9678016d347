//! Error types for mini-rpc.

use thiserror::Error;

/// Main error type for all mini-rpc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Frame did not start with the `mrp` magic bytes.
    #[error("invalid magic number: {0:02x?}")]
    InvalidMagic([u8; 3]),

    /// Frame carried a protocol version this build does not speak.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Frame header named an unknown codec.
    #[error("unsupported codec type: {0}")]
    UnsupportedCodec(u8),

    /// Frame header named an unknown message type.
    #[error("unsupported message type: {0}")]
    UnsupportedMsgType(u8),

    /// Frame body length exceeds the configured maximum.
    #[error("frame body of {0} bytes exceeds maximum {1}")]
    BodyTooLarge(u32, u32),

    /// Binary envelope ended before its length prefixes were satisfied.
    #[error("truncated envelope")]
    Truncated,

    /// Envelope string field was not valid UTF-8.
    #[error("invalid UTF-8 in envelope: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (envelope or payload).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response envelope carried a non-empty error string.
    #[error("server error: {0}")]
    Call(String),

    /// Service method was not of the form `"Service.Method"`.
    #[error("invalid service method format: {0}")]
    InvalidServiceMethod(String),

    /// No service with this name is registered.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The service exists but has no such method.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Discovery or balancing found no usable instance.
    #[error("no instances available")]
    NoInstances,

    /// Business-level failure inside a registered method.
    #[error("{0}")]
    Handler(String),

    /// Connection terminated before the operation completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// In-flight requests did not drain within the shutdown deadline.
    #[error("timeout waiting for ongoing requests to finish")]
    ShutdownTimeout,
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
