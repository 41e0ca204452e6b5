//! Sled-backed blob database
//!
//! Records live in one tree keyed by name. A second tree maps a big-endian
//! sequence number to the name so keys can be listed in write order, which
//! sled's lexicographic iteration would otherwise lose.

use std::path::Path;

use sled::{Db, Tree};
use tracing::{debug, info};

use crate::backend::{DbBackend, DbReader, DbWriter};
use crate::error::{DbError, DbResult};

/// Tree names for sled
const TREE_RECORDS: &str = "records";
const TREE_ORDER: &str = "order";
const TREE_META: &str = "meta";

/// Marks a directory as a blob database
const KEY_FORMAT: &[u8] = b"format";
const FORMAT_MARKER: &[u8] = b"warp-blobdb/sled/1";

/// Sequence number to key bytes (big-endian for proper ordering)
fn seq_to_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

/// Files sled keeps at the top of every database directory
const SLED_FILES: [&str; 2] = ["conf", "db"];

/// Check for sled's own files without opening anything
fn has_sled_files(path: &Path) -> bool {
    path.is_dir() && SLED_FILES.iter().all(|f| path.join(f).is_file())
}

/// Check whether `path` holds a sled blob database
pub(crate) fn is_database(path: &Path) -> DbResult<bool> {
    if !has_sled_files(path) {
        return Ok(false);
    }
    let db = sled::open(path)?;
    let meta = db.open_tree(TREE_META)?;
    Ok(meta.get(KEY_FORMAT)?.is_some_and(|m| m.as_ref() == FORMAT_MARKER))
}

/// Writer for a sled database
pub struct SledWriter {
    db: Db,
    records: Tree,
    order: Tree,
    next_seq: u64,
}

impl SledWriter {
    /// Create a fresh database at `path`, replacing anything already there
    pub fn create(path: &Path) -> DbResult<Self> {
        crate::replace_existing(path, DbBackend::Sled)?;

        let db = sled::open(path)?;
        let records = db.open_tree(TREE_RECORDS)?;
        let order = db.open_tree(TREE_ORDER)?;
        let meta = db.open_tree(TREE_META)?;
        meta.insert(KEY_FORMAT, FORMAT_MARKER)?;

        debug!(path = %path.display(), "Created sled blob database");

        Ok(Self {
            db,
            records,
            order,
            next_seq: 0,
        })
    }
}

impl DbWriter for SledWriter {
    fn put(&mut self, key: &str, value: &[u8]) -> DbResult<()> {
        self.records.insert(key.as_bytes(), value)?;
        self.order.insert(seq_to_key(self.next_seq), key.as_bytes())?;
        self.next_seq += 1;
        Ok(())
    }

    fn flush(&mut self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Reader for a sled database
pub struct SledReader {
    // Keeps the database open for as long as the trees are in use
    _db: Db,
    records: Tree,
    order: Tree,
}

impl SledReader {
    /// Open an existing database
    pub fn open(path: &Path) -> DbResult<Self> {
        // sled::open would create its files in any directory it is given
        if !has_sled_files(path) {
            return Err(DbError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let db = sled::open(path)?;
        let meta = db.open_tree(TREE_META)?;
        match meta.get(KEY_FORMAT)? {
            Some(marker) if marker.as_ref() == FORMAT_MARKER => {}
            _ => {
                return Err(DbError::Corrupted(format!(
                    "{} is not a sled blob database",
                    path.display()
                )));
            }
        }

        let records = db.open_tree(TREE_RECORDS)?;
        let order = db.open_tree(TREE_ORDER)?;

        info!(
            path = %path.display(),
            records = records.len(),
            "Opened sled blob database"
        );

        Ok(Self {
            _db: db,
            records,
            order,
        })
    }
}

impl DbReader for SledReader {
    fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.records.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn keys(&self) -> DbResult<Vec<String>> {
        self.order
            .iter()
            .values()
            .map(|value| {
                let value = value?;
                String::from_utf8(value.to_vec())
                    .map_err(|e| DbError::Corrupted(format!("non UTF-8 key: {}", e)))
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
