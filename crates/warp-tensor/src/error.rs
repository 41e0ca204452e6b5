//! Error types for tensor save/load

use std::io;

use thiserror::Error;
use warp_blobdb::DbError;

use crate::tensor::Device;

/// Tensor save/load errors
#[derive(Debug, Error)]
pub enum TensorError {
    /// A save request wrote the same key twice, or a key appears in more
    /// than one source database of a load
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Requested key absent from the database
    #[error("key not found in database: {0}")]
    KeyNotFound(String),

    /// Blob absent from the workspace
    #[error("blob not found in workspace: {0}")]
    BlobNotFound(String),

    /// Storage backend error
    #[error("storage error: {0}")]
    Storage(DbError),

    /// Record carries a dtype tag this build does not know
    #[error("unsupported dtype tag: {0}")]
    UnsupportedDtype(u8),

    /// Device cannot be allocated on this host
    #[error("device unavailable: {device} ({available} accelerators on this host)")]
    DeviceUnavailable {
        /// Requested device
        device: Device,
        /// Accelerators present
        available: u32,
    },

    /// Invalid record format
    #[error("invalid record format: {0}")]
    InvalidFormat(String),

    /// Data length does not match shape and dtype
    #[error("invalid tensor shape {shape:?}: expected {expected} bytes, got {actual}")]
    InvalidShape {
        /// Shape
        shape: Vec<usize>,
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        actual: usize,
    },

    /// Invalid dtype
    #[error("invalid dtype: expected {expected}, got {actual}")]
    InvalidDtype {
        /// Expected dtype
        expected: String,
        /// Actual dtype
        actual: String,
    },

    /// Checksum mismatch
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Record name
        name: String,
        /// Expected checksum
        expected: String,
        /// Actual checksum
        actual: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operator argument error
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<DbError> for TensorError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::DuplicateKey(key) => Self::DuplicateKey(key),
            DbError::KeyNotFound(key) => Self::KeyNotFound(key),
            other => Self::Storage(other),
        }
    }
}

/// Result type for tensor operations
pub type TensorResult<T> = Result<T, TensorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_are_lifted() {
        let err: TensorError = DbError::DuplicateKey("x".to_string()).into();
        assert!(matches!(err, TensorError::DuplicateKey(ref k) if k == "x"));

        let err: TensorError = DbError::KeyNotFound("y".to_string()).into();
        assert!(matches!(err, TensorError::KeyNotFound(ref k) if k == "y"));

        let err: TensorError = DbError::Closed.into();
        assert!(matches!(err, TensorError::Storage(DbError::Closed)));
    }

    #[test]
    fn test_device_unavailable_message() {
        let err = TensorError::DeviceUnavailable {
            device: Device::Accelerator(3),
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "device unavailable: accelerator:3 (2 accelerators on this host)"
        );
    }
}
