//! Device placement and allocation accounting
//!
//! Accelerators are modelled host-side: a buffer placed on an accelerator
//! owns a private copy of its bytes, and every live buffer is counted
//! against its device until dropped. This is what lets a load detect an
//! out-of-range accelerator and lets callers observe that replacing a blob
//! released the storage it held on its previous device.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::error::{TensorError, TensorResult};
use crate::tensor::{Device, TensorData};

/// Live allocations on one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceUsage {
    /// Bytes held by live buffers
    pub bytes: u64,
    /// Number of live buffers
    pub buffers: u64,
}

struct DeviceState {
    accelerator_count: u32,
    usage: DashMap<Device, DeviceUsage>,
}

impl DeviceState {
    fn release(&self, device: Device, bytes: u64) {
        if let Some(mut usage) = self.usage.get_mut(&device) {
            usage.bytes = usage.bytes.saturating_sub(bytes);
            usage.buffers = usage.buffers.saturating_sub(1);
        }
    }
}

/// Device layer for one host
///
/// Cloning is cheap; clones share the same accounting.
#[derive(Clone)]
pub struct DeviceManager {
    state: Arc<DeviceState>,
}

impl DeviceManager {
    /// Create a device manager for a host with `accelerator_count` accelerators
    pub fn new(accelerator_count: u32) -> Self {
        Self {
            state: Arc::new(DeviceState {
                accelerator_count,
                usage: DashMap::new(),
            }),
        }
    }

    /// Host with no accelerators
    pub fn cpu_only() -> Self {
        Self::new(0)
    }

    /// Number of accelerators on this host
    pub fn accelerator_count(&self) -> u32 {
        self.state.accelerator_count
    }

    /// Check whether `device` exists on this host
    pub fn is_available(&self, device: Device) -> bool {
        match device {
            Device::Cpu => true,
            Device::Accelerator(index) => index < self.state.accelerator_count,
        }
    }

    /// All devices on this host, CPU first
    pub fn devices(&self) -> Vec<Device> {
        std::iter::once(Device::Cpu)
            .chain((0..self.state.accelerator_count).map(Device::Accelerator))
            .collect()
    }

    /// Fail with `DeviceUnavailable` unless `device` exists
    pub fn check(&self, device: Device) -> TensorResult<()> {
        if self.is_available(device) {
            Ok(())
        } else {
            Err(TensorError::DeviceUnavailable {
                device,
                available: self.state.accelerator_count,
            })
        }
    }

    /// Place `data` on `device`
    pub fn allocate(&self, device: Device, data: TensorData) -> TensorResult<DeviceBuffer> {
        self.check(device)?;

        // Accelerator storage never aliases host bytes
        let data = if device.is_cpu() {
            data
        } else {
            data.deep_copy()
        };

        let size = data.size_bytes() as u64;
        {
            let mut usage = self.state.usage.entry(device).or_default();
            usage.bytes += size;
            usage.buffers += 1;
        }

        trace!(%device, bytes = size, "Allocated device buffer");

        Ok(DeviceBuffer {
            device,
            data,
            state: Arc::clone(&self.state),
        })
    }

    /// Live allocations on `device`
    pub fn usage(&self, device: Device) -> DeviceUsage {
        self.state
            .usage
            .get(&device)
            .map(|u| *u)
            .unwrap_or_default()
    }

    /// Live allocations across all devices
    pub fn total_usage(&self) -> DeviceUsage {
        self.state
            .usage
            .iter()
            .fold(DeviceUsage::default(), |acc, entry| DeviceUsage {
                bytes: acc.bytes + entry.bytes,
                buffers: acc.buffers + entry.buffers,
            })
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::cpu_only()
    }
}

impl fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManager")
            .field("accelerator_count", &self.state.accelerator_count)
            .field("total_usage", &self.total_usage())
            .finish()
    }
}

/// Tensor storage placed on a device
///
/// Dropping the buffer releases its allocation.
pub struct DeviceBuffer {
    device: Device,
    data: TensorData,
    state: Arc<DeviceState>,
}

impl DeviceBuffer {
    /// Device holding the storage
    pub fn device(&self) -> Device {
        self.device
    }

    /// Stored value
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Copy the value back to host memory
    pub fn to_host(&self) -> TensorData {
        if self.device.is_cpu() {
            self.data.clone()
        } else {
            self.data.deep_copy()
        }
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.state
            .release(self.device, self.data.size_bytes() as u64);
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device)
            .field("dtype", &self.data.dtype())
            .field("shape", &self.data.shape())
            .finish()
    }
}
