//! Sensor readings and the deployment layouts that carry them.

use serde::{Deserialize, Serialize};

use crate::codec::{decode_packet, encode_packet, packet_len, DecodedPacket, EncodedPacket};
use crate::PacketError;

/// Field layout agreed between a transmitter and its gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PacketLayout {
    /// smoke, flame, gas, probability (9 bytes).
    #[default]
    Basic,
    /// smoke, flame, gas, probability, battery (11 bytes).
    WithBattery,
}

impl PacketLayout {
    /// Number of two-byte fields after the id.
    pub const fn field_count(&self) -> usize {
        match self {
            PacketLayout::Basic => 4,
            PacketLayout::WithBattery => 5,
        }
    }

    /// Packet length in bytes, including the id.
    pub const fn len(&self) -> usize {
        packet_len(self.field_count())
    }

    /// Field names in wire order.
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            PacketLayout::Basic => &["smoke", "flame", "gas", "probability"],
            PacketLayout::WithBattery => &["smoke", "flame", "gas", "probability", "battery"],
        }
    }

    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketLayout::Basic => "basic",
            PacketLayout::WithBattery => "with-battery",
        }
    }

    /// Decode a received buffer with this layout.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedPacket, PacketError> {
        decode_packet(bytes, self.field_count())
    }
}

/// Integer scaling applied to fractional values before transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scale {
    /// Multiplier applied on the transmitter.
    pub factor: u32,
}

impl Scale {
    /// Fire probability, 0.0..=1.0 as parts per ten thousand.
    pub const PROBABILITY: Scale = Scale { factor: 10_000 };
    /// Battery voltage in millivolts.
    pub const VOLTAGE_MILLI: Scale = Scale { factor: 1_000 };
    /// Battery voltage in tenths of a millivolt.
    pub const VOLTAGE_TENTH_MILLI: Scale = Scale { factor: 10_000 };

    /// Scale a real value to its wire integer, truncating toward zero.
    pub fn to_raw(&self, value: f64) -> i64 {
        (value * f64::from(self.factor)) as i64
    }

    /// Recover the real value from a wire integer.
    pub fn to_real(&self, raw: u16) -> f64 {
        f64::from(raw) / f64::from(self.factor)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::VOLTAGE_MILLI
    }
}

/// One node's measurements for a transmission cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    /// Transmitter address.
    pub transmitter_id: u8,
    /// Smoke sensor ADC value.
    pub smoke: u32,
    /// Flame sensor ADC value.
    pub flame: u32,
    /// Gas sensor ADC value.
    pub gas: u32,
    /// Fire probability scaled by [`Scale::PROBABILITY`].
    pub fire_probability: u32,
    /// Battery voltage, scaled per deployment.
    #[serde(default)]
    pub battery: Option<u32>,
}

impl SensorReading {
    /// Raw field values in wire order for `layout`.
    ///
    /// A missing battery value on a battery layout is sent as the sentinel
    /// so the receiver flags the packet.
    pub fn to_fields(&self, layout: PacketLayout) -> Vec<i64> {
        let mut fields = vec![
            i64::from(self.smoke),
            i64::from(self.flame),
            i64::from(self.gas),
            i64::from(self.fire_probability),
        ];
        if layout == PacketLayout::WithBattery {
            fields.push(self.battery.map_or(-1, i64::from));
        }
        fields
    }

    /// Encode this reading with `layout`.
    pub fn encode(&self, layout: PacketLayout) -> EncodedPacket {
        encode_packet(self.transmitter_id, &self.to_fields(layout))
    }

    /// Build a reading from a decoded packet.
    ///
    /// Invalid fields are carried through as-is; check
    /// [`DecodedPacket::valid`] before using the values.
    pub fn from_decoded(packet: &DecodedPacket, layout: PacketLayout) -> SensorReading {
        let field = |index: usize| packet.fields.get(index).copied().map_or(0, u32::from);
        SensorReading {
            transmitter_id: packet.id,
            smoke: field(0),
            flame: field(1),
            gas: field(2),
            fire_probability: field(3),
            battery: match layout {
                PacketLayout::Basic => None,
                PacketLayout::WithBattery => packet.fields.get(4).copied().map(u32::from),
            },
        }
    }
}
