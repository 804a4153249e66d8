//! # firenet-node
//!
//! Runtimes for the two kinds of node in the network:
//!
//! - [`TransmitterNode`]: encodes a reading each cycle and hands it to the radio
//! - [`GatewayNode`]: decodes received packets and uploads them through the modem
//!
//! Both are driven by a [`Mailbox`] that the radio's completion context posts
//! [`RadioEvent`]s to. The [`host`] module provides a UDP radio and a TCP
//! modem bridge so the nodes can run on an ordinary machine.

pub mod config;
mod error;
mod gateway;
pub mod host;
mod mailbox;
mod radio;
mod transmitter;
mod upload;

pub use config::{ConfigError, DeploymentConfig, ModemSettings, NodeSettings, RadioSettings};
pub use error::{NodeError, NodeResult};
pub use gateway::{GatewayNode, GatewayOutcome};
pub use mailbox::Mailbox;
pub use radio::{Radio, RadioError, RadioEvent};
pub use transmitter::TransmitterNode;
pub use upload::{UploadField, UploadSettings};
