//! Input runtime error types

use thiserror::Error;
use x3d_nodes::FieldError;

/// Errors raised by configuration and input setup
#[derive(Error, Debug)]
pub enum InputError {
    /// TOML did not parse into an [`crate::InputConfig`]
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A setting is outside its accepted range; the old value is kept
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// Node is not of the kind the operation needs
    #[error("Unsupported node: expected {expected}, got {found}")]
    UnsupportedNode {
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Field(#[from] FieldError),
}

impl InputError {
    pub(crate) fn setting(name: &'static str, reason: impl Into<String>) -> Self {
        InputError::InvalidSetting {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type for input operations
pub type Result<T> = std::result::Result<T, InputError>;
