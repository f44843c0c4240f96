//! Transport-level error taxonomy.

use thiserror::Error;

/// Errors raised by the transport engine itself (as opposed to the
/// dispatcher, which has its own error type the engine never inspects
/// beyond deciding whether to tear the session down).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session owned by a different user")]
    SessionUserMismatch,

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results produced by the transport engine.
pub type TransportResult<T> = Result<T, TransportError>;
