//! Error types for homegear-ipc.
//!
//! The taxonomy is split by where a failure originates:
//!
//! - [`ConnError`] - the connection itself (cannot open, timed out, dropped, shut down)
//! - [`CodecError`] - bytes on the wire that cannot be framed or decoded
//! - [`RpcFault`] - a method error reported by the remote side
//!
//! [`IpcError`] wraps all of them for the public API.

use thiserror::Error;

/// Connection-level failures.
#[derive(Debug, Error)]
pub enum ConnError {
    /// The address could not be opened.
    #[error("cannot reach {address}: {source}")]
    Unreachable {
        /// Target that was dialed.
        address: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// No connection or response within the configured bound.
    #[error("timed out")]
    Timeout,

    /// The connection dropped while the operation was in flight.
    #[error("connection lost")]
    Lost,

    /// The client was shut down explicitly.
    #[error("client closed")]
    Closed,
}

/// Framing and payload decoding failures.
///
/// A `Malformed` error always compromises the connection: the stream is
/// closed rather than resynchronized.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Structurally invalid frame or payload.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A value could not be serialized.
    #[error("MsgPack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

impl From<rmp_serde::decode::Error> for CodecError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        CodecError::Malformed(err.to_string())
    }
}

/// A fault returned by the remote method, or by a local method handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fault {code}: {message}")]
pub struct RpcFault {
    /// Fault code (`faultCode` on the wire).
    pub code: i64,
    /// Human readable message (`faultString` on the wire).
    pub message: String,
}

impl RpcFault {
    /// Create a new fault.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Connection failure.
    #[error(transparent)]
    Conn(#[from] ConnError),

    /// Framing or payload failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Remote method failure.
    #[error(transparent)]
    Fault(#[from] RpcFault),

    /// Method name was empty.
    #[error("method is not a string or empty")]
    InvalidMethod,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IpcError {
    /// The connection error, if this is one.
    pub fn as_conn(&self) -> Option<&ConnError> {
        match self {
            IpcError::Conn(e) => Some(e),
            _ => None,
        }
    }

    /// The remote fault, if this is one.
    pub fn as_fault(&self) -> Option<&RpcFault> {
        match self {
            IpcError::Fault(f) => Some(f),
            _ => None,
        }
    }
}

/// Result type alias using IpcError.
pub type Result<T> = std::result::Result<T, IpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display() {
        let fault = RpcFault::new(-1, "Wrong parameter count.");
        assert_eq!(fault.to_string(), "fault -1: Wrong parameter count.");
    }

    #[test]
    fn test_conn_error_is_transparent() {
        let err: IpcError = ConnError::Lost.into();
        assert_eq!(err.to_string(), "connection lost");
        assert!(matches!(err.as_conn(), Some(ConnError::Lost)));
        assert!(err.as_fault().is_none());
    }

    #[test]
    fn test_decode_error_maps_to_malformed() {
        let decode_err = rmp_serde::from_slice::<String>(&[0xc1]).unwrap_err();
        let err: CodecError = decode_err.into();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
