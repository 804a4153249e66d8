//! Deployment configuration.
//!
//! One YAML file describes a node: its address and packet layout, the radio
//! link, the modem and the upload target. Every section and every field
//! has a default, so a transmitter needs little more than its id.
//!
//! ```yaml
//! node:
//!   id: 17
//!   layout: with-battery
//! modem:
//!   address: 127.0.0.1:5000
//!   session:
//!     apn: internet.t-mobile.cz
//! upload:
//!   api_key: S8QL4UGSKU4E3NUH
//! ```

use std::path::Path;
use std::time::Duration;

use firenet_modem::SessionConfig;
use firenet_packet::{PacketLayout, Scale};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::upload::{UploadField, UploadSettings};

/// Default node address.
pub const DEFAULT_NODE_ID: u8 = 0x11;

/// Errors loading a deployment file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for this schema.
    #[error("YAML parsing error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Node identity and pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeSettings {
    /// Radio address written as the first packet byte.
    pub id: u8,
    /// Packet layout shared with the peer.
    pub layout: PacketLayout,
    /// Pause after each transmission, in milliseconds.
    pub cycle_interval_ms: u64,
    /// Main loop idle period, in milliseconds.
    pub poll_interval_ms: u64,
    /// Scale of the battery field.
    pub voltage_scale: Scale,
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            id: DEFAULT_NODE_ID,
            layout: PacketLayout::default(),
            cycle_interval_ms: 2_000,
            poll_interval_ms: 50,
            voltage_scale: Scale::default(),
        }
    }
}

impl NodeSettings {
    /// Pause after each transmission.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    /// Main loop idle period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Radio link emulated over UDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RadioSettings {
    /// Local socket address.
    pub bind: String,
    /// Where transmissions are sent.
    pub peer: String,
}

impl Default for RadioSettings {
    fn default() -> Self {
        RadioSettings {
            bind: "127.0.0.1:4700".to_string(),
            peer: "127.0.0.1:4701".to_string(),
        }
    }
}

/// Modem UART bridged over TCP, plus the session parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModemSettings {
    /// TCP address of the UART bridge.
    pub address: String,
    /// Connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Upload session parameters.
    pub session: SessionConfig,
}

impl Default for ModemSettings {
    fn default() -> Self {
        ModemSettings {
            address: "127.0.0.1:5000".to_string(),
            connect_timeout_ms: 2_000,
            session: SessionConfig::default(),
        }
    }
}

impl ModemSettings {
    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ============================================================================
// Deployment
// ============================================================================

/// A complete node deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Node identity and pacing.
    pub node: NodeSettings,
    /// Radio link.
    pub radio: RadioSettings,
    /// Modem link and session.
    pub modem: ModemSettings,
    /// Upload target.
    pub upload: UploadSettings,
}

impl DeploymentConfig {
    /// Load and validate a deployment file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a deployment from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: DeploymentConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.cycle_interval_ms == 0 {
            return Err(ConfigError::invalid("node.cycle_interval_ms must be greater than zero"));
        }
        if self.node.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("node.poll_interval_ms must be greater than zero"));
        }
        if self.node.voltage_scale.factor == 0 {
            return Err(ConfigError::invalid("node.voltage_scale must be greater than zero"));
        }
        self.modem
            .session
            .validate()
            .map_err(|e| ConfigError::invalid(format!("modem.session: {}", e)))?;

        let fields = self.upload.fields_for(self.node.layout);
        if fields.is_empty() {
            return Err(ConfigError::invalid("upload.fields must not be empty"));
        }
        if self.node.layout == PacketLayout::Basic && fields.contains(&UploadField::Battery) {
            return Err(ConfigError::invalid(
                "upload.fields contains battery but node.layout is basic",
            ));
        }
        Ok(())
    }
}
