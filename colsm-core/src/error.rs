//! Error types for COLSM

use thiserror::Error;

/// Result type alias for COLSM operations
pub type Result<T> = std::result::Result<T, ColsmError>;

/// COLSM error types
#[derive(Error, Debug)]
pub enum ColsmError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer is truncated or does not hold what its header claims
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Unknown encoding tag or encoding not available for a column type
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Keys must be added in strictly increasing user-key order
    #[error("Key order violation: key {key} added after {previous}")]
    KeyOrder { previous: u32, key: u32 },

    /// Key is too short or otherwise not representable in the vertical layout
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Seek target is past every key in the block
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation is not implemented for this iterator
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ColsmError {
    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ColsmError::Corruption(_) | ColsmError::ChecksumMismatch { .. }
        )
    }

    /// Check if error is a seek miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, ColsmError::NotFound(_))
    }

    /// Check if error is an unsupported operation
    pub fn is_not_supported(&self) -> bool {
        matches!(self, ColsmError::NotSupported(_))
    }

    pub(crate) fn truncated(what: &str, needed: usize, available: usize) -> Self {
        ColsmError::Corruption(format!(
            "{what}: need {needed} bytes, {available} available"
        ))
    }
}
