//! Error types for tinyrpc.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by business handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Wire-level contract violations.
///
/// Every variant is session-ending when it reaches the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// String longer than the single-byte length prefix allows.
    #[error("string of {0} bytes exceeds the 255-byte limit")]
    StringTooLong(usize),

    /// Sequence longer than the 4-byte count allows.
    #[error("sequence of {0} elements exceeds the u32 count limit")]
    SequenceTooLong(usize),

    /// String payload is not UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// Boolean byte other than 0 or 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// Enumeration ordinal with no declared enumerator.
    #[error("ordinal {ordinal} is not a declared {type_name} value")]
    InvalidEnumOrdinal {
        /// Enumeration type name.
        type_name: &'static str,
        /// Ordinal read from the wire.
        ordinal: i32,
    },

    /// Timestamp outside the representable tick range.
    #[error("timestamp is outside the representable tick range")]
    TimestampOutOfRange,

    /// Request selector matches no declared method.
    #[error("no method with ordinal {0}")]
    UnknownOrdinal(u8),

    /// Request selector matches no declared method.
    #[error("no method named '{0}'")]
    UnknownName(String),

    /// Event selector matches no declared event.
    #[error("no event with ordinal {0}")]
    UnknownEvent(u8),

    /// Leading frame byte is not a known frame kind.
    #[error("unexpected frame kind {0:#04x}")]
    UnexpectedFrameKind(u8),

    /// Response frame arrived with no call outstanding.
    #[error("response frame without a pending call")]
    UnsolicitedResponse,

    /// A complete buffer ended in the middle of a value.
    #[error("frame truncated, {0} more bytes expected")]
    Truncated(usize),
}

/// Codec-level outcome of a decode or encode step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Not enough buffered bytes; `needed` more are required at minimum.
    #[error("need {needed} more bytes")]
    Incomplete {
        /// Additional bytes required before the step can succeed.
        needed: usize,
    },

    /// The bytes (or the value being encoded) break the wire contract.
    #[error(transparent)]
    Violation(#[from] ProtocolViolation),
}

/// Result type for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Main error type for all tinyrpc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The transport could not be opened.
    #[error("cannot open transport '{name}': {source}")]
    Connect {
        /// Transport name that was requested.
        name: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The peer closed the transport.
    #[error("transport disconnected")]
    Disconnected,

    /// Any other transport I/O failure.
    #[error("transport I/O error: {0}")]
    Io(io::Error),

    /// Wire contract violation.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// A business handler failed.
    #[error("handler for '{method}' failed: {source}")]
    Handler {
        /// Name of the invoked method.
        method: String,
        /// Error raised by the handler.
        #[source]
        source: HandlerError,
    },

    /// The server answered the call with a fault frame.
    #[error("remote fault: {0}")]
    RemoteFault(String),

    /// A transport read did not complete in time.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid method/event table or mismatched signature.
    #[error("configuration error: {0}")]
    Config(String),

    /// The background task panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl RpcError {
    /// Classify an I/O error, separating disconnection from other faults.
    pub fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => RpcError::Disconnected,
            _ => RpcError::Io(e),
        }
    }

    /// Process exit status for a fault that ends the process.
    ///
    /// Status 1 (missing argument) is decided by the binary itself.
    pub fn exit_code(&self) -> i32 {
        match self {
            RpcError::Connect { .. } => 2,
            RpcError::Disconnected => 4,
            _ => 5,
        }
    }

    /// Whether the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, RpcError::Disconnected)
    }
}

impl From<io::Error> for RpcError {
    fn from(e: io::Error) -> Self {
        RpcError::from_io(e)
    }
}

impl From<CodecError> for RpcError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Incomplete { needed } => {
                RpcError::Protocol(ProtocolViolation::Truncated(needed))
            }
            CodecError::Violation(v) => RpcError::Protocol(v),
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_kinds_are_classified() {
        for kind in [
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::UnexpectedEof,
        ] {
            let err = RpcError::from(io::Error::from(kind));
            assert!(err.is_disconnect(), "{kind:?} should be a disconnect");
        }

        let err = RpcError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, RpcError::Io(_)));
    }

    #[test]
    fn test_exit_codes() {
        let connect = RpcError::Connect {
            name: "pipe".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(connect.exit_code(), 2);
        assert_eq!(RpcError::Disconnected.exit_code(), 4);
        assert_eq!(RpcError::Timeout(Duration::from_secs(1)).exit_code(), 5);
    }

    #[test]
    fn test_incomplete_maps_to_truncated() {
        let err = RpcError::from(CodecError::Incomplete { needed: 3 });
        assert!(matches!(
            err,
            RpcError::Protocol(ProtocolViolation::Truncated(3))
        ));
    }

    #[test]
    fn test_display_messages() {
        let err = RpcError::Protocol(ProtocolViolation::UnknownOrdinal(9));
        assert_eq!(err.to_string(), "protocol violation: no method with ordinal 9");

        let err = CodecError::from(ProtocolViolation::StringTooLong(256));
        assert_eq!(err.to_string(), "string of 256 bytes exceeds the 255-byte limit");
    }
}
