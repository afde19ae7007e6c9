//! Error types for slicekeep

use thiserror::Error;

/// Result type alias for slicekeep operations
pub type Result<T> = std::result::Result<T, PersistError>;

/// Persistence error types
///
/// Cloneable so a single flush result can be handed to every waiting ticket.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    /// Storage engine rejected a read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored document is not valid wire format
    #[error("Document parse error: {0}")]
    Parse(String),

    /// Document could not be rendered to the wire format
    #[error("Document serialize error: {0}")]
    Serialize(String),

    /// A slice payload could not be decoded
    #[error("Failed to decode slice '{slice}': {reason}")]
    Decode { slice: String, reason: String },

    /// A slice value could not be encoded
    #[error("Failed to encode slice '{slice}': {reason}")]
    Encode { slice: String, reason: String },

    /// The same slice name was registered twice
    #[error("Slice registered more than once: {0}")]
    DuplicateSlice(String),

    /// Configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The item has been shut down
    #[error("Persist item is closed")]
    Closed,
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Storage(e.to_string())
    }
}

impl From<serde_yaml::Error> for PersistError {
    fn from(e: serde_yaml::Error) -> Self {
        PersistError::InvalidConfig(e.to_string())
    }
}
