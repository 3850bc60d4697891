//! Error types for respwire.

use thiserror::Error;

/// Main error type for all protocol and connection operations.
#[derive(Debug, Error)]
pub enum RedisError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed wire data: bad length/count line, terminator mismatch,
    /// or an invalid payload for the declared type.
    #[error("parse error: {0}")]
    Parse(String),

    /// Unrecognized leading type-tag byte. The stream is desynchronized and
    /// the connection must be torn down.
    #[error("unknown type header: {0:?}")]
    UnknownHeader(char),

    /// Byte payload is not valid UTF-8 where text was required.
    #[error("string payload is not valid UTF-8")]
    StringDecoding,

    /// Typed accessor used on a value of a different variant.
    #[error("value variant does not match the requested type")]
    TypeMismatch,

    /// HELLO/AUTH handshake reply was missing, malformed, or negative.
    #[error("authentication handshake rejected")]
    AuthenticationFailure,

    /// The server confirmed a different channel set than was requested.
    #[error("subscription confirmations did not match the requested channels")]
    PartialSubscribe,

    /// A value arrived where a push message was required.
    #[error("expected a push message on the subscriber stream")]
    MessageReceiveFailure,

    /// Operation is invalid for the connection's current state or mode.
    #[error("connection is in the wrong state for this operation")]
    UnexpectedState,

    /// Connection closed by the peer or used after teardown.
    #[error("connection closed")]
    ConnectionClosed,

    /// The variant has no documented client-originated wire form.
    #[error("encoding {0} values is not supported on the outbound path")]
    UnsupportedEncoding(&'static str),
}

/// Result type alias using RedisError.
pub type Result<T> = std::result::Result<T, RedisError>;
