//! Error types for firenet-packet.

use thiserror::Error;

/// Errors that can occur during packet operations.
///
/// Field values are never rejected at decode time; an out-of-range value is
/// reported through [`DecodedPacket::valid`](crate::DecodedPacket) instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The buffer is shorter than the layout requires.
    #[error("Packet too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required by the layout.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },

    /// Invalid hex string.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

impl PacketError {
    /// Create a too-short error.
    pub fn too_short(expected: usize, actual: usize) -> Self {
        PacketError::TooShort { expected, actual }
    }
}
