//! The packet radio seen by a node.

use thiserror::Error;

/// Completion events a radio posts to the node's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// The last transmission left the antenna.
    TransmitDone,
    /// A packet is waiting to be read.
    PacketReceived,
}

/// Radio failures.
#[derive(Debug, Error)]
pub enum RadioError {
    /// The radio could not be brought up.
    #[error("radio initialisation failed: {0}")]
    Init(String),

    /// A packet arrived but failed its checksum.
    #[error("CRC mismatch")]
    Crc,

    /// A read was attempted with nothing received.
    #[error("no packet available")]
    NoPacket,

    /// I/O error on the underlying link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RadioError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RadioError::Init(_) => "init",
            RadioError::Crc => "crc",
            RadioError::NoPacket => "no_packet",
            RadioError::Io(_) => "io",
        }
    }
}

/// A half-duplex packet radio.
///
/// Completion is reported out of band: the radio posts a [`RadioEvent`]
/// to the mailbox it was built with, and the node picks it up on its next
/// iteration.
pub trait Radio {
    /// Start sending `data`. [`RadioEvent::TransmitDone`] follows.
    fn start_transmit(&mut self, data: &[u8]) -> Result<(), RadioError>;

    /// Copy the received packet into `buf` and return its length.
    ///
    /// Packets longer than `buf` are truncated.
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, RadioError>;

    /// Re-arm reception after a packet has been handled.
    fn start_receive(&mut self) -> Result<(), RadioError> {
        Ok(())
    }
}

impl<R: Radio + ?Sized> Radio for Box<R> {
    fn start_transmit(&mut self, data: &[u8]) -> Result<(), RadioError> {
        (**self).start_transmit(data)
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, RadioError> {
        (**self).read_packet(buf)
    }

    fn start_receive(&mut self) -> Result<(), RadioError> {
        (**self).start_receive()
    }
}
