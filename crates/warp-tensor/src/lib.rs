//! Typed tensor persistence for WARP
//!
//! This crate saves named, typed, shaped tensors ("blobs") from an in-memory
//! workspace into a blob database and loads them back, optionally onto a
//! different device, with exact dtype, shape and bytes preserved.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Workspace                              │
//! │              name -> Blob (TensorData on a Device)              │
//! └──────────────┬───────────────────────────────▲──────────────────┘
//!                │ SaveOp                        │ LoadOp
//! ┌──────────────▼───────────────────────────────┴──────────────────┐
//! │                         warp-tensor                              │
//! │  ┌─────────────┐  ┌─────────────────┐  ┌─────────────────────┐  │
//! │  │   codec     │  │     device      │  │       config        │  │
//! │  │ (WBLB frame)│  │ (placement and  │  │ (TOML + env vars)   │  │
//! │  │             │  │  accounting)    │  │                     │  │
//! │  └──────┬──────┘  └─────────────────┘  └─────────────────────┘  │
//! └─────────┼───────────────────────────────────────────────────────┘
//!           │
//! ┌─────────▼───────────────────────────────────────────────────────┐
//! │                         warp-blobdb                              │
//! │                 (sled directory or minidb file)                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use warp_tensor::{DbBackend, Device, LoadOp, SaveOp, TensorData, Workspace};
//!
//! # fn main() -> warp_tensor::TensorResult<()> {
//! let mut ws = Workspace::new();
//! let weights = TensorData::from_slice(vec![2, 3], &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;
//! ws.feed_blob("fc_w", weights, Device::Cpu)?;
//!
//! SaveOp::new(["fc_w"], "/tmp/model.db", DbBackend::Sled)
//!     .absolute_path(true)
//!     .run(&ws)?;
//!
//! ws.reset();
//! LoadOp::new(["fc_w"], "/tmp/model.db", DbBackend::Sled)
//!     .absolute_path(true)
//!     .run(&mut ws)?;
//! assert_eq!(ws.blob("fc_w").map(|b| b.shape().to_vec()), Some(vec![2, 3]));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod ops;
pub mod tensor;
pub mod workspace;

pub use codec::{BlobRecord, Placement};
pub use config::{EncodeConfig, TensorConfig};
pub use device::{DeviceBuffer, DeviceManager, DeviceUsage};
pub use error::{TensorError, TensorResult};
pub use ops::{list_keys, LoadOp, LoadSummary, SaveOp, SaveSummary};
pub use tensor::{Device, Element, TensorData, TensorDtype};
pub use warp_blobdb::DbBackend;
pub use workspace::{Blob, Workspace};
