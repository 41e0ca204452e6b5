//! Ordered key-value databases for named tensor records
//!
//! A blob database stores opaque binary records keyed by name. Records are
//! written sequentially through a [`WriteHandle`], which rejects a key that
//! was already written, and read back by exact name or in write order
//! through a [`ReadHandle`].
//!
//! Two backends are available:
//!
//! - [`DbBackend::Sled`]: an embedded ordered-map database, one directory
//!   per database
//! - [`DbBackend::MiniDb`]: a single append-only framed file
//!
//! # Example
//!
//! ```no_run
//! use warp_blobdb::{DbBackend, open_for_read, open_for_write};
//!
//! let mut writer = open_for_write("/tmp/weights", DbBackend::Sled)?;
//! writer.put("fc1.weight", b"...")?;
//! writer.close()?;
//!
//! let reader = open_for_read("/tmp/weights", DbBackend::Sled)?;
//! assert_eq!(reader.keys()?, vec!["fc1.weight"]);
//! # Ok::<(), warp_blobdb::DbError>(())
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod minidb;
pub mod sled_db;

pub use backend::{DbBackend, DbReader, DbWriter, ReadHandle, WriteHandle};
pub use error::{DbError, DbResult};

use std::path::Path;

use minidb::{MiniDbReader, MiniDbWriter};
use sled_db::{SledReader, SledWriter};

/// Create (or truncate) a database at `path` and open it for writing
///
/// The parent directory must already exist.
pub fn open_for_write(path: impl AsRef<Path>, backend: DbBackend) -> DbResult<WriteHandle> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(DbError::NotFound {
                path: parent.to_path_buf(),
            });
        }
    }

    let writer: Box<dyn DbWriter> = match backend {
        DbBackend::Sled => Box::new(SledWriter::create(path)?),
        DbBackend::MiniDb => Box::new(MiniDbWriter::create(path)?),
    };

    Ok(WriteHandle::new(path, backend, writer))
}

/// Open an existing database for reading
pub fn open_for_read(path: impl AsRef<Path>, backend: DbBackend) -> DbResult<ReadHandle> {
    let path = path.as_ref();

    let reader: Box<dyn DbReader> = match backend {
        DbBackend::Sled => Box::new(SledReader::open(path)?),
        DbBackend::MiniDb => Box::new(MiniDbReader::open(path)?),
    };

    Ok(ReadHandle::new(path, backend, reader))
}

/// Clear the way for a new database at `path`
///
/// Only a missing path, an empty directory or an existing database of the
/// same backend is replaced. Anything else is left alone and reported as
/// [`DbError::Occupied`].
pub(crate) fn replace_existing(path: &Path, backend: DbBackend) -> DbResult<()> {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return Ok(());
    };

    if meta.is_dir() && std::fs::read_dir(path)?.next().is_none() {
        std::fs::remove_dir(path)?;
        return Ok(());
    }

    let ours = match backend {
        DbBackend::Sled => sled_db::is_database(path)?,
        DbBackend::MiniDb => minidb::is_database(path)?,
    };
    if !ours {
        return Err(DbError::Occupied {
            path: path.to_path_buf(),
            backend,
        });
    }

    if meta.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
