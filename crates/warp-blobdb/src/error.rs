//! Error types for blob databases

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::DbBackend;

/// Blob database errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Database (or its parent directory) does not exist
    #[error("database not found: {}", path.display())]
    NotFound {
        /// Missing path
        path: PathBuf,
    },

    /// Write target exists and is not a database of the requested backend
    #[error("refusing to replace {}: not a {backend} blob database", path.display())]
    Occupied {
        /// Existing path
        path: PathBuf,
        /// Backend the write asked for
        backend: DbBackend,
    },

    /// Key written twice under one write handle
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Key absent from the database
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Backend tag not recognized
    #[error("unknown database backend: {0}")]
    UnknownBackend(String),

    /// On-disk content is malformed
    #[error("corrupted database: {0}")]
    Corrupted(String),

    /// Handle used after close
    #[error("database handle is closed")]
    Closed,

    /// Sled backend error
    #[error("sled error: {0}")]
    Backend(#[from] sled::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DbError {
    /// Check whether the error means the database itself is missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
