//! Save and load operators
//!
//! [`SaveOp`] writes named workspace blobs into one blob database;
//! [`LoadOp`] reads them back from one or more databases, placing each
//! blob on the recorded device or on an explicit target.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use warp_blobdb::{DbBackend, ReadHandle};

use crate::codec::{self, BlobRecord, Placement};
use crate::error::{TensorError, TensorResult};
use crate::tensor::Device;
use crate::workspace::{Blob, Workspace};

/// Result of a successful save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    /// Database written
    pub path: PathBuf,
    /// Backend used
    pub backend: DbBackend,
    /// Keys written, in request order
    pub keys: Vec<String>,
    /// Total encoded bytes
    pub bytes: u64,
}

/// Save workspace blobs into a blob database
#[derive(Debug, Clone)]
pub struct SaveOp {
    names: Vec<String>,
    db: PathBuf,
    backend: DbBackend,
    absolute_path: bool,
    strip_prefix: Option<String>,
    blob_name_overrides: Option<Vec<String>>,
}

impl SaveOp {
    /// Save `names` into the database at `db`
    pub fn new<I, S>(names: I, db: impl Into<PathBuf>, backend: DbBackend) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            db: db.into(),
            backend,
            absolute_path: false,
            strip_prefix: None,
            blob_name_overrides: None,
        }
    }

    /// Use `db` as given instead of resolving it against the configured root
    pub fn absolute_path(mut self, absolute: bool) -> Self {
        self.absolute_path = absolute;
        self
    }

    /// Remove a leading `prefix` from each key written
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    /// Store blob `names[i]` under key `overrides[i]`
    pub fn blob_name_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blob_name_overrides = Some(overrides.into_iter().map(Into::into).collect());
        self
    }

    fn keys(&self) -> TensorResult<Vec<String>> {
        if let Some(overrides) = &self.blob_name_overrides {
            if overrides.len() != self.names.len() {
                return Err(TensorError::InvalidArgument(format!(
                    "{} blob name overrides for {} blobs",
                    overrides.len(),
                    self.names.len()
                )));
            }
            return Ok(overrides.clone());
        }

        Ok(self
            .names
            .iter()
            .map(|name| match &self.strip_prefix {
                Some(prefix) => name.strip_prefix(prefix.as_str()).unwrap_or(name).to_string(),
                None => name.clone(),
            })
            .collect())
    }

    /// Encode and write the blobs
    pub fn run(&self, workspace: &Workspace) -> TensorResult<SaveSummary> {
        let keys = self.keys()?;
        let blobs = self
            .names
            .iter()
            .map(|name| workspace.require_blob(name))
            .collect::<TensorResult<Vec<&Blob>>>()?;

        let records = encode_all(&keys, &blobs, workspace)?;

        let path = workspace.resolve_db_path(&self.db, self.absolute_path);
        let mut writer = warp_blobdb::open_for_write(&path, self.backend)?;

        let mut bytes = 0u64;
        for (key, record) in keys.iter().zip(&records) {
            if let Err(e) = writer.put(key, record) {
                warn!(
                    path = %path.display(),
                    key = %key,
                    written = writer.len(),
                    error = %e,
                    "Save failed, database is partial"
                );
                return Err(e.into());
            }
            bytes += record.len() as u64;
        }
        writer.close()?;

        info!(
            path = %path.display(),
            backend = %self.backend,
            blobs = keys.len(),
            bytes,
            "Saved blobs"
        );

        Ok(SaveSummary {
            path,
            backend: self.backend,
            keys,
            bytes,
        })
    }
}

fn encode_all(keys: &[String], blobs: &[&Blob], workspace: &Workspace) -> TensorResult<Vec<Vec<u8>>> {
    let encode = workspace.config().encode.clone();
    let encode_one = |(key, blob): (&String, &&Blob)| codec::encode(key, blob).to_bytes();

    if encode.parallel && blobs.len() >= encode.parallel_threshold {
        debug!(blobs = blobs.len(), "Encoding records in parallel");
        keys.par_iter().zip(blobs.par_iter()).map(encode_one).collect()
    } else {
        keys.iter().zip(blobs.iter()).map(encode_one).collect()
    }
}

/// Result of a successful load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Blob names registered, in load order
    pub loaded: Vec<String>,
    /// Requested names found in no database
    pub skipped: Vec<String>,
    /// Databases read
    pub databases: usize,
    /// Total record bytes read
    pub bytes: u64,
}

/// Load blobs from one or more blob databases into a workspace
#[derive(Debug, Clone)]
pub struct LoadOp {
    names: Vec<String>,
    dbs: Vec<PathBuf>,
    backend: DbBackend,
    absolute_path: bool,
    placement: Placement,
    load_all: bool,
    add_prefix: Option<String>,
    strip_prefix: Option<String>,
    source_blob_names: Option<Vec<String>>,
    allow_incomplete: bool,
}

impl LoadOp {
    /// Load `names` from the database at `db`
    pub fn new<I, S>(names: I, db: impl Into<PathBuf>, backend: DbBackend) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            dbs: vec![db.into()],
            backend,
            absolute_path: false,
            placement: Placement::KeepOriginal,
            load_all: false,
            add_prefix: None,
            strip_prefix: None,
            source_blob_names: None,
            allow_incomplete: false,
        }
    }

    /// Read from every database in `paths` instead of the single one
    pub fn db_list<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.dbs = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Use database paths as given instead of resolving them against the root
    pub fn absolute_path(mut self, absolute: bool) -> Self {
        self.absolute_path = absolute;
        self
    }

    /// Device placement policy
    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Place each blob on the device it was saved from
    pub fn keep_device(self) -> Self {
        self.placement(Placement::KeepOriginal)
    }

    /// Place every blob on `device`
    pub fn device(self, device: Device) -> Self {
        self.placement(Placement::Override(device))
    }

    /// Load every key of every database, ignoring the requested names
    pub fn load_all(mut self, load_all: bool) -> Self {
        self.load_all = load_all;
        self
    }

    /// Prepend `prefix` to each key to form the blob name
    pub fn add_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.add_prefix = Some(prefix.into());
        self
    }

    /// Remove a leading `prefix` from each key to form the blob name
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    /// Read blob `names[i]` from key `sources[i]`
    pub fn source_blob_names<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_blob_names = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// Skip requested names found in no database instead of failing
    pub fn allow_incomplete(mut self, allow: bool) -> Self {
        self.allow_incomplete = allow;
        self
    }

    /// Blob name for a database key
    fn blob_name_for(&self, key: &str) -> String {
        let stripped = match &self.strip_prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str()).unwrap_or(key),
            None => key,
        };
        match &self.add_prefix {
            Some(prefix) => format!("{}{}", prefix, stripped),
            None => stripped.to_string(),
        }
    }

    /// `(source, blob name)` for each requested blob
    fn requests(&self) -> TensorResult<Vec<(String, String)>> {
        let sources = match &self.source_blob_names {
            Some(sources) if sources.len() != self.names.len() => {
                return Err(TensorError::InvalidArgument(format!(
                    "{} source blob names for {} blobs",
                    sources.len(),
                    self.names.len()
                )));
            }
            Some(sources) => sources.clone(),
            None => self.names.clone(),
        };

        let mut seen = HashSet::new();
        for name in &self.names {
            if !seen.insert(name.as_str()) {
                return Err(TensorError::DuplicateKey(name.clone()));
            }
        }

        Ok(sources.into_iter().zip(self.names.iter().cloned()).collect())
    }

    /// Read, decode and register the blobs
    pub fn run(&self, workspace: &mut Workspace) -> TensorResult<LoadSummary> {
        if self.dbs.is_empty() {
            return Err(TensorError::InvalidArgument("no database to load from".to_string()));
        }

        let requests = if self.load_all {
            if !self.names.is_empty() {
                debug!(
                    ignored = self.names.len(),
                    "load_all set, ignoring requested blob names"
                );
            }
            Vec::new()
        } else {
            self.requests()?
        };
        let wanted: HashSet<&str> = requests.iter().map(|(source, _)| source.as_str()).collect();

        let mut readers = Vec::with_capacity(self.dbs.len());
        for db in &self.dbs {
            let path = workspace.resolve_db_path(db, self.absolute_path);
            readers.push(warp_blobdb::open_for_read(&path, self.backend)?);
        }

        // Transformed key -> (reader, raw key), in database then write order
        let mut index: HashMap<String, (usize, String)> = HashMap::new();
        let mut ordered = Vec::new();
        for (db_idx, reader) in readers.iter().enumerate() {
            for key in reader.keys()? {
                let name = self.blob_name_for(&key);
                if index.contains_key(&name) {
                    if self.load_all || wanted.contains(name.as_str()) {
                        return Err(TensorError::DuplicateKey(name));
                    }
                    continue;
                }
                ordered.push(name.clone());
                index.insert(name, (db_idx, key));
            }
        }

        let plan: Vec<(String, String)> = if self.load_all {
            ordered.into_iter().map(|name| (name.clone(), name)).collect()
        } else {
            requests
        };

        let mut summary = LoadSummary {
            databases: readers.len(),
            ..Default::default()
        };
        let verify = workspace.config().verify_checksums;

        for (source, name) in plan {
            let Some((db_idx, key)) = index.get(&source) else {
                if self.allow_incomplete {
                    debug!(blob = %name, source = %source, "Blob not in any database, skipping");
                    summary.skipped.push(name);
                    continue;
                }
                return Err(TensorError::KeyNotFound(source));
            };

            let reader = &readers[*db_idx];
            let bytes = reader.get(key)?;
            summary.bytes += bytes.len() as u64;

            let blob = load_one(bytes, self.placement, workspace, verify)?;
            workspace.insert_blob(name.clone(), blob);
            summary.loaded.push(name);
        }

        for reader in &mut readers {
            reader.close();
        }

        info!(
            databases = summary.databases,
            loaded = summary.loaded.len(),
            skipped = summary.skipped.len(),
            bytes = summary.bytes,
            "Loaded blobs"
        );
        Ok(summary)
    }

    /// Database paths this op reads, before root resolution
    pub fn databases(&self) -> &[PathBuf] {
        &self.dbs
    }
}

fn load_one(
    bytes: Vec<u8>,
    placement: Placement,
    workspace: &Workspace,
    verify: bool,
) -> TensorResult<Blob> {
    let record = BlobRecord::from_bytes_with(bytes, verify)?;
    codec::decode(record, placement, workspace.devices())
}

/// Keys of the database at `path`, in write order
pub fn list_keys(path: &Path, backend: DbBackend) -> TensorResult<Vec<String>> {
    let mut reader: ReadHandle = warp_blobdb::open_for_read(path, backend)?;
    let keys = reader.keys()?;
    reader.close();
    Ok(keys)
}
