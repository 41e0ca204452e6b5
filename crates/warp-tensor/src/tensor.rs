//! Tensor element types, device placement and host-side tensor values

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::{TensorError, TensorResult};

/// Tensor element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorDtype {
    /// IEEE 754 half precision
    Float16,
    /// IEEE 754 single precision
    Float32,
    /// IEEE 754 double precision
    Float64,
    /// Boolean, one byte per element
    Bool,
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
}

impl TensorDtype {
    /// Every supported dtype
    pub const ALL: [TensorDtype; 10] = [
        TensorDtype::Float16,
        TensorDtype::Float32,
        TensorDtype::Float64,
        TensorDtype::Bool,
        TensorDtype::Int8,
        TensorDtype::Int16,
        TensorDtype::Int32,
        TensorDtype::Int64,
        TensorDtype::UInt8,
        TensorDtype::UInt16,
    ];

    /// Size of one element in bytes
    pub fn element_size(&self) -> usize {
        match self {
            TensorDtype::Bool | TensorDtype::Int8 | TensorDtype::UInt8 => 1,
            TensorDtype::Float16 | TensorDtype::Int16 | TensorDtype::UInt16 => 2,
            TensorDtype::Float32 | TensorDtype::Int32 => 4,
            TensorDtype::Float64 | TensorDtype::Int64 => 8,
        }
    }

    /// Stable wire tag
    pub fn tag(&self) -> u8 {
        match self {
            TensorDtype::Float16 => 1,
            TensorDtype::Float32 => 2,
            TensorDtype::Float64 => 3,
            TensorDtype::Bool => 4,
            TensorDtype::Int8 => 5,
            TensorDtype::Int16 => 6,
            TensorDtype::Int32 => 7,
            TensorDtype::Int64 => 8,
            TensorDtype::UInt8 => 9,
            TensorDtype::UInt16 => 10,
        }
    }

    /// Resolve a wire tag
    pub fn from_tag(tag: u8) -> TensorResult<Self> {
        Self::ALL
            .into_iter()
            .find(|dtype| dtype.tag() == tag)
            .ok_or(TensorError::UnsupportedDtype(tag))
    }

    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            TensorDtype::Float16 => "float16",
            TensorDtype::Float32 => "float32",
            TensorDtype::Float64 => "float64",
            TensorDtype::Bool => "bool",
            TensorDtype::Int8 => "int8",
            TensorDtype::Int16 => "int16",
            TensorDtype::Int32 => "int32",
            TensorDtype::Int64 => "int64",
            TensorDtype::UInt8 => "uint8",
            TensorDtype::UInt16 => "uint16",
        }
    }
}

impl fmt::Display for TensorDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute device a blob's storage lives on
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// Indexed accelerator
    Accelerator(u32),
}

impl Device {
    const KIND_CPU: u8 = 0;
    const KIND_ACCELERATOR: u8 = 1;

    /// Check if this is host memory
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Accelerator index, if any
    pub fn accelerator_index(&self) -> Option<u32> {
        match self {
            Device::Cpu => None,
            Device::Accelerator(index) => Some(*index),
        }
    }

    /// Wire form: (kind, index)
    pub(crate) fn to_parts(self) -> (u8, u32) {
        match self {
            Device::Cpu => (Self::KIND_CPU, 0),
            Device::Accelerator(index) => (Self::KIND_ACCELERATOR, index),
        }
    }

    /// Parse the wire form; unknown kinds yield `None`
    pub(crate) fn from_parts(kind: u8, index: u32) -> Option<Self> {
        match kind {
            Self::KIND_CPU => Some(Device::Cpu),
            Self::KIND_ACCELERATOR => Some(Device::Accelerator(index)),
            _ => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Accelerator(index) => write!(f, "accelerator:{}", index),
        }
    }
}

impl FromStr for Device {
    type Err = TensorError;

    /// Accepts `cpu`, `accelerator:N`, `gpu:N` and `cuda:N`
    fn from_str(s: &str) -> TensorResult<Self> {
        let lower = s.to_lowercase();
        if lower == "cpu" {
            return Ok(Device::Cpu);
        }

        let invalid = || TensorError::InvalidArgument(format!("invalid device: {}", s));
        let (kind, index) = lower.split_once(':').ok_or_else(invalid)?;
        match kind {
            "accelerator" | "gpu" | "cuda" => {
                let index = index.parse::<u32>().map_err(|_| invalid())?;
                Ok(Device::Accelerator(index))
            }
            _ => Err(invalid()),
        }
    }
}

/// Plain-old-data element types that map onto a [`TensorDtype`]
pub trait Element: bytemuck::Pod {
    /// Matching dtype
    const DTYPE: TensorDtype;
}

impl Element for f16 {
    const DTYPE: TensorDtype = TensorDtype::Float16;
}
impl Element for f32 {
    const DTYPE: TensorDtype = TensorDtype::Float32;
}
impl Element for f64 {
    const DTYPE: TensorDtype = TensorDtype::Float64;
}
impl Element for i8 {
    const DTYPE: TensorDtype = TensorDtype::Int8;
}
impl Element for i16 {
    const DTYPE: TensorDtype = TensorDtype::Int16;
}
impl Element for i32 {
    const DTYPE: TensorDtype = TensorDtype::Int32;
}
impl Element for i64 {
    const DTYPE: TensorDtype = TensorDtype::Int64;
}
impl Element for u8 {
    const DTYPE: TensorDtype = TensorDtype::UInt8;
}
impl Element for u16 {
    const DTYPE: TensorDtype = TensorDtype::UInt16;
}

/// Byte length of a tensor, or `None` on overflow
pub(crate) fn expected_len(dtype: TensorDtype, shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(dtype.element_size(), |acc, &dim| acc.checked_mul(dim))
}

#[cfg(target_endian = "big")]
compile_error!("warp-tensor stores element bytes little-endian; big-endian targets are unsupported");

/// Host-side tensor value
///
/// Elements are stored row-major in little-endian byte order, which is also
/// the on-disk layout. The byte length
/// always equals `product(shape) * dtype.element_size()`; an empty shape
/// is a scalar holding one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorData {
    dtype: TensorDtype,
    shape: Vec<usize>,
    data: Bytes,
}

impl TensorData {
    /// Wrap raw bytes, validating their length against shape and dtype
    pub fn from_bytes(
        dtype: TensorDtype,
        shape: Vec<usize>,
        data: impl Into<Bytes>,
    ) -> TensorResult<Self> {
        let data = data.into();
        match expected_len(dtype, &shape) {
            Some(expected) if expected == data.len() => Ok(Self { dtype, shape, data }),
            expected => Err(TensorError::InvalidShape {
                shape,
                expected: expected.unwrap_or(usize::MAX),
                actual: data.len(),
            }),
        }
    }

    /// Copy typed values into a new tensor
    pub fn from_slice<T: Element>(shape: Vec<usize>, values: &[T]) -> TensorResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        Self::from_bytes(T::DTYPE, shape, Bytes::copy_from_slice(bytes))
    }

    /// Build a boolean tensor
    pub fn from_bools(shape: Vec<usize>, values: &[bool]) -> TensorResult<Self> {
        let bytes: Vec<u8> = values.iter().map(|&v| u8::from(v)).collect();
        Self::from_bytes(TensorDtype::Bool, shape, bytes)
    }

    /// Zero-filled tensor
    pub fn zeros(dtype: TensorDtype, shape: Vec<usize>) -> TensorResult<Self> {
        let len = expected_len(dtype, &shape).ok_or_else(|| {
            TensorError::InvalidArgument(format!("tensor shape {:?} overflows", shape))
        })?;
        Self::from_bytes(dtype, shape, vec![0u8; len])
    }

    /// Copy into freshly allocated storage that shares nothing with `self`
    pub fn deep_copy(&self) -> Self {
        Self {
            dtype: self.dtype,
            shape: self.shape.clone(),
            data: Bytes::copy_from_slice(&self.data),
        }
    }

    /// Element type
    pub fn dtype(&self) -> TensorDtype {
        self.dtype
    }

    /// Dimensions
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Raw element bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the raw bytes
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    fn check_dtype(&self, expected: TensorDtype) -> TensorResult<()> {
        if self.dtype == expected {
            Ok(())
        } else {
            Err(TensorError::InvalidDtype {
                expected: expected.to_string(),
                actual: self.dtype.to_string(),
            })
        }
    }

    /// Copy the elements out as `T`
    pub fn to_vec<T: Element>(&self) -> TensorResult<Vec<T>> {
        self.check_dtype(T::DTYPE)?;
        Ok(bytemuck::pod_collect_to_vec::<u8, T>(&self.data[..]))
    }

    /// Copy the elements out of a boolean tensor
    pub fn to_bools(&self) -> TensorResult<Vec<bool>> {
        self.check_dtype(TensorDtype::Bool)?;
        Ok(self.data.iter().map(|&b| b != 0).collect())
    }

    /// Render up to `limit` leading elements as strings
    pub fn format_values(&self, limit: usize) -> Vec<String> {
        fn render<T: Element + fmt::Display>(data: &[u8]) -> Vec<String> {
            bytemuck::pod_collect_to_vec::<u8, T>(data)
                .iter()
                .map(ToString::to_string)
                .collect()
        }

        let count = limit.min(self.num_elements());
        let head = &self.data[..count * self.dtype.element_size()];

        match self.dtype {
            TensorDtype::Float16 => render::<f16>(head),
            TensorDtype::Float32 => render::<f32>(head),
            TensorDtype::Float64 => render::<f64>(head),
            TensorDtype::Bool => head.iter().map(|&b| (b != 0).to_string()).collect(),
            TensorDtype::Int8 => render::<i8>(head),
            TensorDtype::Int16 => render::<i16>(head),
            TensorDtype::Int32 => render::<i32>(head),
            TensorDtype::Int64 => render::<i64>(head),
            TensorDtype::UInt8 => render::<u8>(head),
            TensorDtype::UInt16 => render::<u16>(head),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_bytes_are_little_endian() {
        let t = TensorData::from_slice(vec![2], &[0x0102u16, 0x0304]).unwrap();
        assert_eq!(t.as_bytes(), &[0x02, 0x01, 0x04, 0x03]);

        let t = TensorData::from_slice(vec![], &[1.0f32]).unwrap();
        assert_eq!(t.as_bytes(), &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_dtype_tags_are_unique() {
        let mut tags: Vec<u8> = TensorDtype::ALL.iter().map(TensorDtype::tag).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), TensorDtype::ALL.len());

        for dtype in TensorDtype::ALL {
            assert_eq!(TensorDtype::from_tag(dtype.tag()).unwrap(), dtype);
        }
    }

    #[test]
    fn test_unknown_dtype_tag() {
        assert!(matches!(
            TensorDtype::from_tag(0),
            Err(TensorError::UnsupportedDtype(0))
        ));
        assert!(matches!(
            TensorDtype::from_tag(200),
            Err(TensorError::UnsupportedDtype(200))
        ));
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(TensorDtype::Float16.element_size(), 2);
        assert_eq!(TensorDtype::Float64.element_size(), 8);
        assert_eq!(TensorDtype::Bool.element_size(), 1);
        assert_eq!(TensorDtype::UInt16.element_size(), 2);
    }

    #[test]
    fn test_device_parse_and_display() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA:1".parse::<Device>().unwrap(), Device::Accelerator(1));
        assert_eq!("gpu:0".parse::<Device>().unwrap(), Device::Accelerator(0));
        assert_eq!(Device::Accelerator(2).to_string(), "accelerator:2");
        assert_eq!(
            Device::Accelerator(2).to_string().parse::<Device>().unwrap(),
            Device::Accelerator(2)
        );
        assert!("tpu:0".parse::<Device>().is_err());
        assert!("gpu:x".parse::<Device>().is_err());
        assert!("gpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_device_wire_parts() {
        for device in [Device::Cpu, Device::Accelerator(0), Device::Accelerator(7)] {
            let (kind, index) = device.to_parts();
            assert_eq!(Device::from_parts(kind, index), Some(device));
        }
        assert_eq!(Device::from_parts(9, 0), None);
    }

    #[test]
    fn test_from_slice_and_back() {
        let tensor = TensorData::from_slice(vec![2, 3], &[1i32, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(tensor.dtype(), TensorDtype::Int32);
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(tensor.num_elements(), 6);
        assert_eq!(tensor.size_bytes(), 24);
        assert_eq!(tensor.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let result = TensorData::from_slice(vec![2, 2], &[1.0f32, 2.0, 3.0]);
        assert!(matches!(
            result,
            Err(TensorError::InvalidShape {
                expected: 16,
                actual: 12,
                ..
            })
        ));
    }

    #[test]
    fn test_scalar_shape() {
        let tensor = TensorData::from_slice(vec![], &[42u16]).unwrap();
        assert_eq!(tensor.num_elements(), 1);
        assert_eq!(tensor.to_vec::<u16>().unwrap(), vec![42]);
    }

    #[test]
    fn test_wrong_dtype_access() {
        let tensor = TensorData::from_slice(vec![1], &[1.5f64]).unwrap();
        assert!(matches!(
            tensor.to_vec::<f32>(),
            Err(TensorError::InvalidDtype { .. })
        ));
        assert!(tensor.to_bools().is_err());
    }

    #[test]
    fn test_bools() {
        let tensor = TensorData::from_bools(vec![3], &[true, false, true]).unwrap();
        assert_eq!(tensor.dtype(), TensorDtype::Bool);
        assert_eq!(tensor.to_bools().unwrap(), vec![true, false, true]);
        assert_eq!(tensor.format_values(2), vec!["true", "false"]);
    }

    #[test]
    fn test_half_values() {
        let values = [f16::from_f32(0.5), f16::from_f32(-2.0)];
        let tensor = TensorData::from_slice(vec![2], &values).unwrap();
        assert_eq!(tensor.dtype(), TensorDtype::Float16);
        assert_eq!(tensor.to_vec::<f16>().unwrap(), values.to_vec());
        assert_eq!(tensor.format_values(10), vec!["0.5", "-2"]);
    }

    #[test]
    fn test_zeros() {
        let tensor = TensorData::zeros(TensorDtype::Int64, vec![4, 0]).unwrap();
        assert_eq!(tensor.num_elements(), 0);
        assert_eq!(tensor.size_bytes(), 0);

        let tensor = TensorData::zeros(TensorDtype::UInt8, vec![3]).unwrap();
        assert_eq!(tensor.as_bytes(), &[0, 0, 0]);
    }
}
