//! Single-file blob database
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ Magic "WMDB" (4 bytes)       │
//! │ Version (u16 LE)             │
//! ├──────────────────────────────┤
//! │ key_len   (u32 LE)           │
//! │ value_len (u64 LE)           │  repeated once per record,
//! │ key       (UTF-8)            │  in write order
//! │ value                        │
//! └──────────────────────────────┘
//! ```
//!
//! The reader scans the frames once on open to index value offsets, then
//! serves lookups by seeking.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::backend::{DbBackend, DbReader, DbWriter};
use crate::error::{DbError, DbResult};

/// File magic
pub const MAGIC: &[u8; 4] = b"WMDB";

/// Current format version
pub const VERSION: u16 = 1;

const FILE_HEADER_SIZE: u64 = 6;
const FRAME_HEADER_SIZE: u64 = 12;

/// Check whether `path` is a file starting with the minidb magic
pub(crate) fn is_database(path: &Path) -> DbResult<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let mut magic = [0u8; 4];
    match File::open(path)?.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Writer for a minidb file
pub struct MiniDbWriter {
    writer: BufWriter<File>,
}

impl MiniDbWriter {
    /// Create a fresh database file at `path`, replacing anything already there
    pub fn create(path: &Path) -> DbResult<Self> {
        crate::replace_existing(path, DbBackend::MiniDb)?;

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;

        debug!(path = %path.display(), "Created minidb blob database");

        Ok(Self { writer })
    }
}

impl DbWriter for MiniDbWriter {
    fn put(&mut self, key: &str, value: &[u8]) -> DbResult<()> {
        let key_len = u32::try_from(key.len())
            .map_err(|_| DbError::Corrupted(format!("key too long: {} bytes", key.len())))?;

        self.writer.write_all(&key_len.to_le_bytes())?;
        self.writer.write_all(&(value.len() as u64).to_le_bytes())?;
        self.writer.write_all(key.as_bytes())?;
        self.writer.write_all(value)?;
        Ok(())
    }

    fn flush(&mut self) -> DbResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// Location of one value inside the file
#[derive(Debug, Clone)]
struct IndexEntry {
    key: String,
    offset: u64,
    len: u64,
}

/// Reader for a minidb file
pub struct MiniDbReader {
    file: Mutex<File>,
    entries: Vec<IndexEntry>,
    by_key: HashMap<String, usize>,
}

impl MiniDbReader {
    /// Open an existing database file and index its records
    pub fn open(path: &Path) -> DbResult<Self> {
        if !path.is_file() {
            return Err(DbError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let entries = scan(&file, file_len)?;

        let mut by_key = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if by_key.insert(entry.key.clone(), i).is_some() {
                return Err(DbError::Corrupted(format!("duplicate key: {}", entry.key)));
            }
        }

        info!(
            path = %path.display(),
            records = entries.len(),
            "Opened minidb blob database"
        );

        Ok(Self {
            file: Mutex::new(file),
            entries,
            by_key,
        })
    }
}

/// Walk every frame and record where each value lives
fn scan(file: &File, file_len: u64) -> DbResult<Vec<IndexEntry>> {
    if file_len < FILE_HEADER_SIZE {
        return Err(DbError::Corrupted("file shorter than header".to_string()));
    }

    let mut reader = BufReader::new(file);
    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    reader.read_exact(&mut header)?;

    if &header[..4] != MAGIC {
        return Err(DbError::Corrupted("bad minidb magic".to_string()));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > VERSION {
        return Err(DbError::Corrupted(format!(
            "unsupported minidb version {}",
            version
        )));
    }

    let mut entries = Vec::new();
    let mut pos = FILE_HEADER_SIZE;

    while pos < file_len {
        if pos + FRAME_HEADER_SIZE > file_len {
            return Err(DbError::Corrupted(format!(
                "truncated frame header at offset {}",
                pos
            )));
        }

        let mut frame = [0u8; FRAME_HEADER_SIZE as usize];
        reader.read_exact(&mut frame)?;
        let key_len = u64::from(u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]));
        let mut value_len_bytes = [0u8; 8];
        value_len_bytes.copy_from_slice(&frame[4..]);
        let value_len = u64::from_le_bytes(value_len_bytes);

        let offset = pos + FRAME_HEADER_SIZE + key_len;
        let end = offset
            .checked_add(value_len)
            .filter(|end| *end <= file_len)
            .ok_or_else(|| DbError::Corrupted(format!("truncated record at offset {}", pos)))?;

        let mut key = vec![0u8; key_len as usize];
        reader.read_exact(&mut key)?;
        let key = String::from_utf8(key)
            .map_err(|e| DbError::Corrupted(format!("non UTF-8 key: {}", e)))?;

        reader.seek_relative(value_len as i64)?;

        entries.push(IndexEntry {
            key,
            offset,
            len: value_len,
        });
        pos = end;
    }

    Ok(entries)
}

impl DbReader for MiniDbReader {
    fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        let Some(&index) = self.by_key.get(key) else {
            return Ok(None);
        };
        let entry = &self.entries[index];

        let mut value = vec![0u8; entry.len as usize];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(entry.offset))?;
        file.read_exact(&mut value)?;
        Ok(Some(value))
    }

    fn keys(&self) -> DbResult<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key.clone()).collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
