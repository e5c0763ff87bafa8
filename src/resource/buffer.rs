use bitflags::bitflags;
use futures::future::{ready, BoxFuture, FutureExt};

#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use super::{impl_resource, Resource, ResourceCore, ResourceKind};
use crate::error::{GpuError, Result};
use crate::gpu::Device;
use crate::native::ObjectDescriptor;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize), serde(transparent))]
    pub struct BufferUsage: u32 {
        const MAP_READ = 0x0001;
        const MAP_WRITE = 0x0002;
        const COPY_SRC = 0x0004;
        const COPY_DST = 0x0008;
        const INDEX = 0x0010;
        const VERTEX = 0x0020;
        const UNIFORM = 0x0040;
        const STORAGE = 0x0080;
        const INDIRECT = 0x0100;
        const QUERY_RESOLVE = 0x0200;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        BufferUsage::VERTEX | BufferUsage::COPY_DST
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum IndexType {
    #[default]
    Uint16,
    Uint32,
}

impl IndexType {
    pub fn byte_size(&self) -> u32 {
        match self {
            IndexType::Uint16 => 2,
            IndexType::Uint32 => 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct BufferProps {
    pub label: Option<String>,
    /// Size in bytes. Zero means "the length of `data`".
    pub byte_length: u64,
    pub usage: BufferUsage,
    /// Uploaded at offset 0 on creation.
    pub data: Option<Vec<u8>>,
    /// Element type when the buffer is bound as an index buffer.
    pub index_type: Option<IndexType>,
}

/// Linear block of device memory.
#[derive(Debug)]
pub struct Buffer {
    core: ResourceCore,
    byte_length: u64,
    usage: BufferUsage,
    index_type: Option<IndexType>,
}

impl_resource!(Buffer);

impl Buffer {
    pub(crate) fn new(device: &Device, props: &BufferProps) -> Result<Self> {
        let data_len = props.data.as_ref().map(|data| data.len() as u64).unwrap_or(0);
        let byte_length = if props.byte_length == 0 {
            data_len
        } else {
            props.byte_length
        };
        if byte_length == 0 {
            return Err(GpuError::invalid("buffer byte_length must be greater than zero"));
        }
        let max = device.limits().max_buffer_size;
        if byte_length > max {
            return Err(GpuError::invalid(format!(
                "buffer byte_length {byte_length} exceeds max-buffer-size {max}"
            )));
        }
        if data_len > byte_length {
            return Err(GpuError::invalid(format!(
                "initial data ({data_len} bytes) does not fit in {byte_length} bytes"
            )));
        }
        if props.usage.contains(BufferUsage::MAP_READ)
            && props.usage.intersects(BufferUsage::MAP_WRITE | BufferUsage::STORAGE)
        {
            return Err(GpuError::invalid(
                "MAP_READ may only be combined with COPY_DST and non-storage usages",
            ));
        }

        let handle = device.with_backend(|backend| {
            let handle = backend.create_object(&ObjectDescriptor::Buffer {
                byte_length,
                usage: props.usage,
            })?;
            if let Some(data) = &props.data {
                backend.write_buffer(handle, 0, data);
            }
            Ok(handle)
        })?;

        let index_type = props.index_type.or_else(|| {
            props
                .usage
                .contains(BufferUsage::INDEX)
                .then_some(IndexType::Uint16)
        });
        Ok(Self {
            core: ResourceCore::new(device, ResourceKind::Buffer, props.label.as_deref(), handle),
            byte_length,
            usage: props.usage,
            index_type,
        })
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn index_type(&self) -> Option<IndexType> {
        self.index_type
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.byte_length => Ok(()),
            _ => Err(GpuError::invalid(format!(
                "range {offset}+{len} is outside buffer \"{}\" ({} bytes)",
                self.label(),
                self.byte_length
            ))),
        }
    }

    /// Uploads `data` starting at `offset`.
    pub fn write(&self, data: &[u8], offset: u64) -> Result<()> {
        let handle = self.core.handle()?;
        self.check_range(offset, data.len() as u64)?;
        self.device().with_backend(|backend| {
            backend.write_buffer(handle, offset, data);
            Ok(())
        })
    }

    /// Reads `len` bytes at `offset`, or everything after `offset` when
    /// `len` is `None`. Nothing blocks; the bytes arrive through the future.
    pub fn read_async(&self, offset: u64, len: Option<u64>) -> BoxFuture<'static, Result<Vec<u8>>> {
        let start = || -> Result<BoxFuture<'static, Vec<u8>>> {
            let handle = self.core.handle()?;
            let len = len.unwrap_or(self.byte_length.saturating_sub(offset));
            self.check_range(offset, len)?;
            self.device()
                .with_backend(|backend| Ok(backend.read_buffer(handle, offset, len)))
        };
        match start() {
            Ok(bytes) => bytes.map(Ok).boxed(),
            Err(err) => ready(Err(err)).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceFactory, DeviceProps};
    use crate::resource::ResourceState;

    fn device() -> Device {
        DeviceFactory::without_provider()
            .create_null_device(&DeviceProps::default())
            .unwrap()
    }

    #[test]
    fn length_comes_from_data() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferProps {
                data: Some(vec![0; 12]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(buffer.byte_length(), 12);
        assert_eq!(buffer.state(), ResourceState::Ready);
    }

    #[test]
    fn oversized_data_is_rejected() {
        let device = device();
        let err = device
            .create_buffer(&BufferProps {
                byte_length: 4,
                data: Some(vec![0; 8]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::InvalidConfiguration(_)));
    }

    #[test]
    fn writes_are_bounds_checked() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferProps {
                byte_length: 8,
                ..Default::default()
            })
            .unwrap();
        buffer.write(&[1, 2, 3, 4], 4).unwrap();
        assert!(buffer.write(&[1, 2, 3, 4], 6).is_err());
        assert!(buffer.write(&[1], u64::MAX).is_err());
    }

    #[test]
    fn index_usage_defaults_to_u16() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferProps {
                byte_length: 6,
                usage: BufferUsage::INDEX,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(buffer.index_type(), Some(IndexType::Uint16));
    }
}
