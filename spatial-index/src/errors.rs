//! Error and result types shared by the storage layer and the tree engine.

use std::io;
use thiserror::Error;

/// Identifier type used for storage keys, node identifiers and entry identifiers.
pub type Id = i64;

/// Errors that can occur in storage and spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    /// No byte array is associated with the identifier.
    #[error("Identifier {0} not found")]
    NotFound(Id),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Persisted state is malformed or inconsistent.
    #[error("Corrupted state: {0}")]
    CorruptedState(String),

    /// Rejected before any mutation took place.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SpatialError {
    pub(crate) fn corrupted(msg: impl Into<String>) -> Self {
        SpatialError::CorruptedState(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SpatialError::InvalidArgument(msg.into())
    }

    /// Returns `true` for [`SpatialError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, SpatialError::NotFound(_))
    }
}

impl From<bincode::error::DecodeError> for SpatialError {
    fn from(err: bincode::error::DecodeError) -> Self {
        SpatialError::CorruptedState(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for SpatialError {
    fn from(err: bincode::error::EncodeError) -> Self {
        SpatialError::Serialization(err.to_string())
    }
}

/// Result type for storage and spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Encodes a serde value with the crate-wide bincode configuration.
pub(crate) fn encode<T: serde::Serialize>(value: &T) -> SpatialResult<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        value,
        bincode::config::legacy(),
    )?)
}

/// Decodes a serde value, mapping malformed bytes to [`SpatialError::CorruptedState`].
pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> SpatialResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(SpatialError::from)
}
