//! # firenet-packet
//!
//! Binary framing of sensor readings for the LoRa link between a sensing
//! node and its gateway.
//!
//! Each packet is an address byte followed by a fixed number of unsigned
//! 16-bit fields, high byte first. The value `0xFFFF` is reserved: a
//! transmitter writes it for any value that does not fit, and a receiver
//! treats a packet containing it as invalid.
//!
//! ```
//! use firenet_packet::{decode_packet, encode_packet};
//!
//! let packet = encode_packet(0x11, &[273, 514, 4021, 530]);
//! assert_eq!(packet.as_bytes()[..3], [0x11, 0x01, 0x11]);
//!
//! let decoded = decode_packet(packet.as_bytes(), 4)?;
//! assert!(decoded.valid);
//! assert_eq!(decoded.fields, vec![273, 514, 4021, 530]);
//! # Ok::<(), firenet_packet::PacketError>(())
//! ```

mod codec;
mod error;
mod reading;

pub use codec::*;
pub use error::PacketError;
pub use reading::{PacketLayout, Scale, SensorReading};

/// Result type for packet operations.
pub type Result<T> = std::result::Result<T, PacketError>;
