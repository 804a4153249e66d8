//! Sensor packet encoding and decoding.
//!
//! ## Packet Format
//!
//! | Field      | Size (bytes) | Description                                  |
//! |------------|--------------|----------------------------------------------|
//! | id         | 1            | Transmitter address.                         |
//! | field[n]   | 2 each       | Unsigned 16-bit value, high byte first.      |
//!
//! The packet is not self-describing: sender and receiver agree on the
//! field count out of band (see [`PacketLayout`](crate::PacketLayout)).
//! A field that cannot be represented is transmitted as `0xFF 0xFF`,
//! which decodes to [`ERROR_SENTINEL`] and marks the packet invalid.

use std::fmt;

use crate::PacketError;

/// Reserved value marking an overflowed or failed reading.
pub const ERROR_SENTINEL: u16 = 0xFFFF;

/// Size of the address byte at the start of every packet.
pub const ID_SIZE: usize = 1;

/// Size of one encoded field.
pub const FIELD_SIZE: usize = 2;

/// Wire bytes used in place of a value that does not fit.
pub const POISON_BYTES: [u8; FIELD_SIZE] = [0xFF, 0xFF];

// ============================================================================
// Field Encoding
// ============================================================================

/// Result of encoding a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeResult {
    /// The value fits; `[high, low]`.
    Ok([u8; FIELD_SIZE]),
    /// The value was negative or at/above the sentinel.
    Overflow,
}

impl EncodeResult {
    /// Bytes to put on the wire. `Overflow` yields [`POISON_BYTES`].
    pub fn bytes(&self) -> [u8; FIELD_SIZE] {
        match self {
            EncodeResult::Ok(bytes) => *bytes,
            EncodeResult::Overflow => POISON_BYTES,
        }
    }

    /// Check if the value was encoded losslessly.
    pub fn is_ok(&self) -> bool {
        matches!(self, EncodeResult::Ok(_))
    }
}

/// Encode a value as `[high, low]`.
pub fn encode_field(value: i64) -> EncodeResult {
    if value < 0 || value >= i64::from(ERROR_SENTINEL) {
        return EncodeResult::Overflow;
    }
    let value = value as u16;
    EncodeResult::Ok([(value >> 8) as u8, (value & 0xFF) as u8])
}

/// Reconstruct a field from its high and low bytes.
pub fn decode_field(hi: u8, lo: u8) -> u16 {
    u16::from(lo) | (u16::from(hi) << 8)
}

/// Check whether a decoded value is a usable reading.
pub fn is_valid_value(value: u16) -> bool {
    value < ERROR_SENTINEL
}

/// Number of bytes a packet with `field_count` fields occupies.
pub const fn packet_len(field_count: usize) -> usize {
    ID_SIZE + field_count * FIELD_SIZE
}

// ============================================================================
// Packet Encoding
// ============================================================================

/// An encoded packet ready for the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    bytes: Vec<u8>,
    overflowed: Vec<usize>,
}

impl EncodedPacket {
    /// The wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the packet, returning the wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Packet length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the packet carries no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Indices (0-based, excluding the id) of fields sent as poison bytes.
    pub fn overflowed(&self) -> &[usize] {
        &self.overflowed
    }

    /// True if every field was encoded losslessly.
    pub fn is_clean(&self) -> bool {
        self.overflowed.is_empty()
    }

    /// Lowercase hex rendering of the wire bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for EncodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Encode an id byte followed by each field as `(high, low)`.
///
/// Overflowed fields are written as poison bytes and the send goes ahead;
/// their indices are recorded on the returned packet.
pub fn encode_packet(id: u8, fields: &[i64]) -> EncodedPacket {
    let mut bytes = Vec::with_capacity(packet_len(fields.len()));
    let mut overflowed = Vec::new();

    bytes.push(id);
    for (index, &value) in fields.iter().enumerate() {
        let encoded = encode_field(value);
        if !encoded.is_ok() {
            log::warn!("field {} value {} does not fit in two bytes", index, value);
            overflowed.push(index);
        }
        bytes.extend_from_slice(&encoded.bytes());
    }

    EncodedPacket { bytes, overflowed }
}

// ============================================================================
// Packet Decoding
// ============================================================================

/// A decoded packet.
///
/// All fields are present whether or not the packet is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    /// Transmitter address.
    pub id: u8,
    /// Decoded fields in wire order.
    pub fields: Vec<u16>,
    /// False if any field is at or above [`ERROR_SENTINEL`].
    pub valid: bool,
}

impl DecodedPacket {
    /// Indices of fields holding the sentinel.
    pub fn invalid_fields(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, &value)| !is_valid_value(value))
            .map(|(index, _)| index)
            .collect()
    }
}

/// Decode `field_count` fields from a packet.
///
/// Bytes past the layout are ignored. Every field is decoded even after an
/// invalid one has been seen.
pub fn decode_packet(bytes: &[u8], field_count: usize) -> Result<DecodedPacket, PacketError> {
    let expected = packet_len(field_count);
    if bytes.len() < expected {
        return Err(PacketError::too_short(expected, bytes.len()));
    }

    let id = bytes[0];
    let fields: Vec<u16> = bytes[ID_SIZE..expected]
        .chunks_exact(FIELD_SIZE)
        .map(|pair| decode_field(pair[0], pair[1]))
        .collect();
    let valid = fields.iter().all(|&value| is_valid_value(value));

    Ok(DecodedPacket { id, fields, valid })
}

/// Decode a packet given as a hex string.
pub fn decode_hex_packet(hex_str: &str, field_count: usize) -> Result<DecodedPacket, PacketError> {
    let bytes = hex::decode(hex_str.trim()).map_err(|e| PacketError::InvalidHex(e.to_string()))?;
    decode_packet(&bytes, field_count)
}
