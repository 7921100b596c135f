//! Field and listener error types

use thiserror::Error;

/// Errors raised by the field access protocol
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Index outside the node's field table
    #[error("Invalid field index {index} for {node}")]
    InvalidFieldIndex { node: &'static str, index: usize },

    /// Name lookup found no such field
    #[error("{node} has no field named {name:?}")]
    UnknownFieldName { node: &'static str, name: String },

    /// Value shape does not match the declared field type
    #[error("Invalid field type for {node}.{field}: expected {expected}, got {found}")]
    InvalidFieldType {
        node: &'static str,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Value violates the field's constraint; nothing was written
    #[error("Invalid value for {node}.{field}: {reason}")]
    InvalidFieldValue {
        node: &'static str,
        field: &'static str,
        reason: String,
    },

    /// initializeOnly field written after setup
    #[error("Field {node}.{field} is not writable after setup")]
    FieldNotWritable {
        node: &'static str,
        field: &'static str,
    },

    /// Resolved proto does not provide the node type the field needs
    #[error("Proto does not provide a {expected} node for {node}.{field}")]
    ProtoTypeMismatch {
        node: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    /// Handle does not name a live node
    #[error("Unknown node handle")]
    UnknownNode,

    /// Handle does not name a live proto instance
    #[error("Unknown proto handle")]
    UnknownProto,
}

impl FieldError {
    /// True for the errors that belong to the invalid-value class
    pub fn is_invalid_value(&self) -> bool {
        matches!(
            self,
            FieldError::InvalidFieldValue { .. } | FieldError::ProtoTypeMismatch { .. }
        )
    }
}

/// Error returned by a listener callback
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListenerError {
    #[error("Listener failed: {0}")]
    Failed(String),
}

/// Result type for field operations
pub type Result<T> = std::result::Result<T, FieldError>;
