//! In-memory blob registry

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec::{self, BlobRecord};
use crate::config::TensorConfig;
use crate::device::{DeviceBuffer, DeviceManager};
use crate::error::{TensorError, TensorResult};
use crate::tensor::{Device, TensorData, TensorDtype};

/// A tensor value placed on a device
#[derive(Debug)]
pub struct Blob {
    buffer: DeviceBuffer,
}

impl Blob {
    pub(crate) fn from_buffer(buffer: DeviceBuffer) -> Self {
        Self { buffer }
    }

    /// Device holding the storage
    pub fn device(&self) -> Device {
        self.buffer.device()
    }

    /// Element type
    pub fn dtype(&self) -> TensorDtype {
        self.buffer.data().dtype()
    }

    /// Dimensions
    pub fn shape(&self) -> &[usize] {
        self.buffer.data().shape()
    }

    /// Copy the value to host memory
    pub fn to_host(&self) -> TensorData {
        self.buffer.to_host()
    }
}

/// Registry of named blobs
///
/// Save and load operators borrow the workspace explicitly; there is no
/// process-wide registry. Replacing or removing a blob drops its device
/// buffer, releasing the allocation on the device it lived on.
#[derive(Debug)]
pub struct Workspace {
    config: TensorConfig,
    devices: DeviceManager,
    blobs: HashMap<String, Blob>,
}

impl Workspace {
    /// Workspace with default configuration (CPU only)
    pub fn new() -> Self {
        Self::with_config(TensorConfig::default())
    }

    /// Workspace with the given configuration
    pub fn with_config(config: TensorConfig) -> Self {
        let devices = DeviceManager::new(config.accelerator_count);
        Self {
            config,
            devices,
            blobs: HashMap::new(),
        }
    }

    /// Configuration
    pub fn config(&self) -> &TensorConfig {
        &self.config
    }

    /// Device layer
    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// Place `data` on `device` under `name`, replacing any previous blob
    pub fn feed_blob(
        &mut self,
        name: impl Into<String>,
        data: TensorData,
        device: Device,
    ) -> TensorResult<()> {
        let buffer = self.devices.allocate(device, data)?;
        self.insert_blob(name.into(), Blob::from_buffer(buffer));
        Ok(())
    }

    pub(crate) fn insert_blob(&mut self, name: String, blob: Blob) {
        // The old blob (if any) is dropped here, freeing its device buffer
        self.blobs.insert(name, blob);
    }

    /// Host copy of a blob's value
    pub fn fetch_blob(&self, name: &str) -> Option<TensorData> {
        self.blobs.get(name).map(Blob::to_host)
    }

    /// Borrow a blob
    pub fn blob(&self, name: &str) -> Option<&Blob> {
        self.blobs.get(name)
    }

    /// Borrow a blob or fail with `BlobNotFound`
    pub fn require_blob(&self, name: &str) -> TensorResult<&Blob> {
        self.blob(name)
            .ok_or_else(|| TensorError::BlobNotFound(name.to_string()))
    }

    /// Check if a blob exists
    pub fn has_blob(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }

    /// Blob names, sorted
    pub fn blob_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove a blob, returning whether it existed
    pub fn remove_blob(&mut self, name: &str) -> bool {
        self.blobs.remove(name).is_some()
    }

    /// Number of blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if the workspace holds no blobs
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Drop every blob
    pub fn reset(&mut self) {
        let count = self.blobs.len();
        self.blobs.clear();
        debug!(blobs = count, "Workspace reset");
    }

    /// Serialize one blob as a standalone record
    pub fn serialize_blob(&self, name: &str) -> TensorResult<Vec<u8>> {
        codec::encode(name, self.require_blob(name)?).to_bytes()
    }

    /// Parse a standalone record and register it under its own name
    pub fn deserialize_blob(&mut self, bytes: Vec<u8>) -> TensorResult<String> {
        let record = BlobRecord::from_bytes_with(bytes, self.config.verify_checksums)?;
        let name = record.name.clone();
        let blob = codec::decode(record, codec::Placement::KeepOriginal, &self.devices)?;
        self.insert_blob(name.clone(), blob);
        Ok(name)
    }

    /// Resolve a database path against the configured root unless `absolute`
    pub fn resolve_db_path(&self, path: &Path, absolute: bool) -> PathBuf {
        if absolute || path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.root_path.join(path)
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
