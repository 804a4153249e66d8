//! Mapping of decoded readings onto telemetry fields.

use firenet_modem::{HttpGet, DEFAULT_BASE_URL};
use firenet_packet::{PacketLayout, Scale, SensorReading};
use serde::{Deserialize, Serialize};

/// A reading value that can be uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadField {
    /// Smoke sensor value, as received.
    Smoke,
    /// Flame sensor value, as received.
    Flame,
    /// Gas sensor value, as received.
    Gas,
    /// Fire probability, unscaled, two decimals.
    Probability,
    /// Battery voltage, unscaled, two decimals.
    Battery,
}

impl UploadField {
    /// Field order used when none is configured.
    pub fn default_order(layout: PacketLayout) -> Vec<UploadField> {
        let mut fields = vec![
            UploadField::Flame,
            UploadField::Smoke,
            UploadField::Gas,
            UploadField::Probability,
        ];
        if layout == PacketLayout::WithBattery {
            fields.push(UploadField::Battery);
        }
        fields
    }

    /// Render this field of `reading`.
    ///
    /// A reading without a battery value renders the battery as `0.00`.
    pub fn format(&self, reading: &SensorReading, voltage_scale: Scale) -> String {
        match self {
            UploadField::Smoke => reading.smoke.to_string(),
            UploadField::Flame => reading.flame.to_string(),
            UploadField::Gas => reading.gas.to_string(),
            UploadField::Probability => {
                format!("{:.2}", scaled(reading.fire_probability, Scale::PROBABILITY))
            }
            UploadField::Battery => {
                format!("{:.2}", reading.battery.map_or(0.0, |raw| scaled(raw, voltage_scale)))
            }
        }
    }
}

fn scaled(raw: u32, scale: Scale) -> f64 {
    f64::from(raw) / f64::from(scale.factor.max(1))
}

/// Where and what to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadSettings {
    /// Endpoint URL without query string.
    pub base_url: String,
    /// Write API key.
    pub api_key: String,
    /// Field order; `None` uses [`UploadField::default_order`].
    pub fields: Option<Vec<UploadField>>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        UploadSettings {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            fields: None,
        }
    }
}

impl UploadSettings {
    /// Fields to upload for `layout`, in order.
    pub fn fields_for(&self, layout: PacketLayout) -> Vec<UploadField> {
        self.fields
            .clone()
            .unwrap_or_else(|| UploadField::default_order(layout))
    }

    /// Build the GET request for `reading`.
    pub fn build_request(
        &self,
        reading: &SensorReading,
        layout: PacketLayout,
        voltage_scale: Scale,
    ) -> HttpGet {
        self.fields_for(layout)
            .iter()
            .fold(HttpGet::new(&self.base_url, &self.api_key), |request, field| {
                request.with_field(field.format(reading, voltage_scale))
            })
    }
}
