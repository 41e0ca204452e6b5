//! Backend selection and the read/write handles shared by every backend

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

/// Database backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbBackend {
    /// Embedded ordered-map database (one directory)
    #[default]
    Sled,
    /// Single framed file
    MiniDb,
}

impl DbBackend {
    /// All supported backends
    pub const ALL: [DbBackend; 2] = [DbBackend::Sled, DbBackend::MiniDb];

    /// Backend tag as used in configuration and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            DbBackend::Sled => "sled",
            DbBackend::MiniDb => "minidb",
        }
    }
}

impl fmt::Display for DbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbBackend {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s.to_lowercase().as_str() {
            "sled" => Ok(DbBackend::Sled),
            "minidb" => Ok(DbBackend::MiniDb),
            _ => Err(DbError::UnknownBackend(s.to_string())),
        }
    }
}

/// Sequential record writer implemented by each backend
pub trait DbWriter: Send {
    /// Append one record
    fn put(&mut self, key: &str, value: &[u8]) -> DbResult<()>;

    /// Flush all pending writes to disk
    fn flush(&mut self) -> DbResult<()>;
}

/// Random-access record reader implemented by each backend
pub trait DbReader: Send + Sync {
    /// Look up a record by exact name
    fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>>;

    /// All keys in write order
    fn keys(&self) -> DbResult<Vec<String>>;

    /// Number of records
    fn len(&self) -> usize;
}

/// Write handle for one database
///
/// Tracks every key written through it and rejects repeats. Dropping the
/// handle flushes the backend, so an early return on error never leaks an
/// open database; the content written so far is partial in that case.
pub struct WriteHandle {
    path: PathBuf,
    backend: DbBackend,
    inner: Option<Box<dyn DbWriter>>,
    seen: HashSet<String>,
}

impl WriteHandle {
    pub(crate) fn new(path: &Path, backend: DbBackend, inner: Box<dyn DbWriter>) -> Self {
        Self {
            path: path.to_path_buf(),
            backend,
            inner: Some(inner),
            seen: HashSet::new(),
        }
    }

    /// Database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backend type
    pub fn backend(&self) -> DbBackend {
        self.backend
    }

    /// Number of records written so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Append a record, failing if `key` was already written
    pub fn put(&mut self, key: &str, value: &[u8]) -> DbResult<()> {
        let writer = self.inner.as_mut().ok_or(DbError::Closed)?;

        if self.seen.contains(key) {
            return Err(DbError::DuplicateKey(key.to_string()));
        }

        writer.put(key, value)?;
        self.seen.insert(key.to_string());
        Ok(())
    }

    /// Flush and finalize the database
    pub fn close(mut self) -> DbResult<()> {
        if let Some(mut writer) = self.inner.take() {
            writer.flush()?;
            debug!(
                path = %self.path.display(),
                backend = %self.backend,
                records = self.seen.len(),
                "Closed database writer"
            );
        }
        Ok(())
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if let Some(mut writer) = self.inner.take() {
            if let Err(e) = writer.flush() {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to flush database writer on drop"
                );
            }
        }
    }
}

/// Read handle for one database
pub struct ReadHandle {
    path: PathBuf,
    backend: DbBackend,
    inner: Option<Box<dyn DbReader>>,
}

impl ReadHandle {
    pub(crate) fn new(path: &Path, backend: DbBackend, inner: Box<dyn DbReader>) -> Self {
        Self {
            path: path.to_path_buf(),
            backend,
            inner: Some(inner),
        }
    }

    fn reader(&self) -> DbResult<&dyn DbReader> {
        self.inner.as_deref().ok_or(DbError::Closed)
    }

    /// Database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backend type
    pub fn backend(&self) -> DbBackend {
        self.backend
    }

    /// Read a record by name
    pub fn get(&self, key: &str) -> DbResult<Vec<u8>> {
        self.reader()?
            .get(key)?
            .ok_or_else(|| DbError::KeyNotFound(key.to_string()))
    }

    /// Check if a record exists
    pub fn contains(&self, key: &str) -> DbResult<bool> {
        Ok(self.reader()?.get(key)?.is_some())
    }

    /// All record names in write order
    pub fn keys(&self) -> DbResult<Vec<String>> {
        self.reader()?.keys()
    }

    /// Number of records (zero once closed)
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |r| r.len())
    }

    /// Check if the database holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release read resources; calling it again is a no-op
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!(path = %self.path.display(), backend = %self.backend, "Closed database reader");
        }
    }
}
