//! Error types for the modem session.

use thiserror::Error;

/// Errors raised by a modem transport.
///
/// The session itself never returns these from an exchange; they are logged
/// and the exchange is counted as failed.
#[derive(Debug, Error)]
pub enum ModemError {
    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The far end of the byte stream went away.
    #[error("transport disconnected")]
    Disconnected,

    /// Invalid session configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for modem operations.
pub type ModemResult<T> = Result<T, ModemError>;
