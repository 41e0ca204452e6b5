//! Binary record codec for blobs
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ Magic "WBLB" (4 bytes)           │
//! │ Header length (u32 LE)           │
//! ├──────────────────────────────────┤
//! │ Header (MessagePack)             │
//! │   version, name, dtype tag,      │
//! │   shape, device kind + index,    │
//! │   data length, BLAKE3 checksum   │
//! ├──────────────────────────────────┤
//! │ Raw element bytes (row-major LE) │
//! └──────────────────────────────────┘
//! ```
//!
//! Encoding is deterministic: the same blob always produces the same bytes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::device::DeviceManager;
use crate::error::{TensorError, TensorResult};
use crate::tensor::{Device, TensorData, TensorDtype};
use crate::workspace::Blob;

/// Record magic
pub const RECORD_MAGIC: &[u8; 4] = b"WBLB";

/// Current record format version
pub const RECORD_VERSION: u16 = 1;

const PREFIX_SIZE: usize = 8;

/// Serialized record header
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordHeader {
    version: u16,
    name: String,
    dtype: u8,
    shape: Vec<u64>,
    device_kind: u8,
    device_index: u32,
    data_len: u64,
    checksum: [u8; 32],
}

/// Device placement policy for a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Use the device recorded when the blob was saved
    #[default]
    KeepOriginal,
    /// Use this device, ignoring the recorded one
    Override(Device),
}

impl Placement {
    /// Final device for a record saved on `recorded`
    pub fn resolve(&self, recorded: Device) -> Device {
        match self {
            Placement::KeepOriginal => recorded,
            Placement::Override(device) => *device,
        }
    }
}

/// A named tensor as stored in a blob database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    /// Record name
    pub name: String,
    /// Tensor value
    pub tensor: TensorData,
    /// Device the blob lived on when saved
    pub device: Device,
}

impl BlobRecord {
    /// Create a record
    pub fn new(name: impl Into<String>, tensor: TensorData, device: Device) -> Self {
        Self {
            name: name.into(),
            tensor,
            device,
        }
    }

    /// Element type
    pub fn dtype(&self) -> TensorDtype {
        self.tensor.dtype()
    }

    /// Dimensions
    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    /// BLAKE3 checksum of the raw element bytes
    pub fn checksum(&self) -> [u8; 32] {
        *blake3::hash(self.tensor.as_bytes()).as_bytes()
    }

    /// Serialize to the framed binary form
    pub fn to_bytes(&self) -> TensorResult<Vec<u8>> {
        let (device_kind, device_index) = self.device.to_parts();
        let header = RecordHeader {
            version: RECORD_VERSION,
            name: self.name.clone(),
            dtype: self.tensor.dtype().tag(),
            shape: self.tensor.shape().iter().map(|&d| d as u64).collect(),
            device_kind,
            device_index,
            data_len: self.tensor.size_bytes() as u64,
            checksum: self.checksum(),
        };

        let header_bytes =
            rmp_serde::to_vec(&header).map_err(|e| TensorError::Serialization(e.to_string()))?;
        let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
            TensorError::Serialization(format!("record header too large: {}", header_bytes.len()))
        })?;

        let mut out =
            Vec::with_capacity(PREFIX_SIZE + header_bytes.len() + self.tensor.size_bytes());
        out.extend_from_slice(RECORD_MAGIC);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(self.tensor.as_bytes());
        Ok(out)
    }

    /// Parse and verify a framed record
    pub fn from_bytes(bytes: impl Into<Bytes>) -> TensorResult<Self> {
        Self::from_bytes_with(bytes, true)
    }

    /// Parse a framed record, optionally skipping checksum verification
    pub fn from_bytes_with(bytes: impl Into<Bytes>, verify_checksum: bool) -> TensorResult<Self> {
        let bytes = bytes.into();

        if bytes.len() < PREFIX_SIZE {
            return Err(TensorError::InvalidFormat(format!(
                "record too short: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[..4] != RECORD_MAGIC {
            return Err(TensorError::InvalidFormat("bad record magic".to_string()));
        }

        let header_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let data_start = PREFIX_SIZE
            .checked_add(header_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| TensorError::InvalidFormat("truncated record header".to_string()))?;

        let header: RecordHeader = rmp_serde::from_slice(&bytes[PREFIX_SIZE..data_start])
            .map_err(|e| TensorError::Serialization(e.to_string()))?;

        if header.version > RECORD_VERSION {
            return Err(TensorError::InvalidFormat(format!(
                "unsupported record version {}",
                header.version
            )));
        }

        let dtype = TensorDtype::from_tag(header.dtype)?;
        let device = Device::from_parts(header.device_kind, header.device_index).ok_or_else(
            || TensorError::InvalidFormat(format!("unknown device kind {}", header.device_kind)),
        )?;
        let shape = header
            .shape
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| TensorError::InvalidFormat("dimension exceeds usize".to_string()))?;

        let data = bytes.slice(data_start..);
        if data.len() as u64 != header.data_len {
            return Err(TensorError::InvalidFormat(format!(
                "record {} declares {} data bytes, found {}",
                header.name,
                header.data_len,
                data.len()
            )));
        }

        if verify_checksum {
            let actual = blake3::hash(&data);
            if actual.as_bytes() != &header.checksum {
                return Err(TensorError::ChecksumMismatch {
                    name: header.name,
                    expected: blake3::Hash::from(header.checksum).to_hex().to_string(),
                    actual: actual.to_hex().to_string(),
                });
            }
        }

        let tensor = TensorData::from_bytes(dtype, shape, data)?;
        Ok(Self {
            name: header.name,
            tensor,
            device,
        })
    }
}

/// Capture a blob, with its current device, as a record named `name`
pub fn encode(name: &str, blob: &Blob) -> BlobRecord {
    BlobRecord::new(name, blob.to_host(), blob.device())
}

/// Materialize a record on the device chosen by `placement`
pub fn decode(
    record: BlobRecord,
    placement: Placement,
    devices: &DeviceManager,
) -> TensorResult<Blob> {
    let device = placement.resolve(record.device);
    trace!(
        name = %record.name,
        dtype = %record.dtype(),
        recorded = %record.device,
        %device,
        "Placing blob"
    );
    let buffer = devices.allocate(device, record.tensor)?;
    Ok(Blob::from_buffer(buffer))
}
