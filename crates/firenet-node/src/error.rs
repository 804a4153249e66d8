//! Error types for the node runtime.

use firenet_modem::ModemError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::radio::RadioError;

/// Errors that stop a node.
///
/// Everything that can go wrong inside a cycle is logged and swallowed;
/// only failures to bring up a peripheral or load the deployment end up
/// here.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The radio could not be initialised or failed permanently.
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),

    /// The modem transport could not be opened.
    #[error("modem error: {0}")]
    Modem(#[from] ModemError),

    /// The deployment configuration is unusable.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
