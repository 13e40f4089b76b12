//! Kind-tagged error values shared across the SDK.
//!
//! Every failure the SDK can surface is one of the variants below; callers
//! match on the kind rather than parsing message strings. Setup failures
//! (`TransportInit`, `Dial`, `Bind`) carry the underlying socket error,
//! while `Io` carries stream failures that happen mid-call.

use thiserror::Error;

/// Convenient result alias used throughout the SDK
pub type Result<T> = std::result::Result<T, SdkError>;

/// Failure reported by a user-supplied function handler.
///
/// Handler errors never cross the wire; the reply server logs them and
/// answers the peer with an empty body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error taxonomy for the SDK core
#[derive(Debug, Error)]
pub enum SdkError {
    /// Caller violated a precondition (empty function id, oversize msg id)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation issued on a transport or client that is not ready
    #[error("transport is not connected")]
    NotConnected,

    /// Socket creation or configuration failed during setup
    #[error("failed to initialize socket: {0}")]
    TransportInit(#[source] std::io::Error),

    /// Connecting to the peer failed
    #[error("failed to dial peer: {0}")]
    Dial(#[source] std::io::Error),

    /// Binding the listen address failed
    #[error("failed to bind listen address: {0}")]
    Bind(#[source] std::io::Error),

    /// A send or receive exceeded its deadline; the payload names the phase
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Frame too short or payload undecodable
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Reply message type does not match the pair expected for the request
    #[error("protocol violation: expected reply type {expected:#08x}, got {actual:#08x}")]
    ProtocolViolation { expected: u32, actual: u32 },

    /// A user handler returned an error
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// Stream-level I/O failure outside of setup
    #[error("stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_violation_formats_both_types() {
        let err = SdkError::ProtocolViolation {
            expected: 0x030102,
            actual: 0x010104,
        };
        let text = err.to_string();
        assert!(text.contains("0x030102"), "missing expected type: {text}");
        assert!(text.contains("0x010104"), "missing actual type: {text}");
    }

    #[test]
    fn handler_error_converts_into_sdk_error() {
        let err: SdkError = HandlerError::new("boom").into();
        assert!(matches!(err, SdkError::Handler(_)));
    }
}
