use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::buffer::{Buffer, BufferUsage, IndexType};
use super::pipeline::PrimitiveTopology;
use super::{impl_resource, Resource, ResourceCore, ResourceKind};
use crate::error::{GpuError, Result};
use crate::gpu::Device;
use crate::native::{AttachPoint, NativeHandle, ObjectDescriptor};

/// Feedback buffer slots a transform feedback object exposes.
pub const MAX_FEEDBACK_BUFFERS: u32 = 4;

fn check_owner(device: &Device, buffer: &Buffer) -> Result<NativeHandle> {
    if buffer.device() != device {
        return Err(GpuError::invalid(format!(
            "buffer \"{}\" belongs to another device",
            buffer.label()
        )));
    }
    buffer.core().handle()
}

//===----------------------------------------------------------------------===//
// Vertex array
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexArrayProps {
    pub label: Option<String>,
}

#[derive(Default)]
struct VertexInputs {
    buffers: BTreeMap<u32, Arc<Buffer>>,
    index: Option<Arc<Buffer>>,
    constants: BTreeMap<u32, [f32; 4]>,
}

/// Which buffers feed which attribute locations, plus the index buffer.
pub struct VertexArray {
    core: ResourceCore,
    inputs: Mutex<VertexInputs>,
}

impl_resource!(VertexArray);

impl VertexArray {
    pub(crate) fn new(device: &Device, props: &VertexArrayProps) -> Result<Self> {
        let handle =
            device.with_backend(|backend| backend.create_object(&ObjectDescriptor::VertexArray))?;
        Ok(Self {
            core: ResourceCore::new(
                device,
                ResourceKind::VertexArray,
                props.label.as_deref(),
                handle,
            ),
            inputs: Mutex::new(VertexInputs::default()),
        })
    }

    fn check_location(&self, location: u32) -> Result<()> {
        let max = self.device().limits().max_vertex_attributes;
        if location >= max {
            return Err(GpuError::invalid(format!(
                "attribute location {location} is not below max-vertex-attributes {max}"
            )));
        }
        Ok(())
    }

    pub fn set_buffer(&self, location: u32, buffer: Arc<Buffer>) -> Result<()> {
        let handle = self.core.handle()?;
        self.check_location(location)?;
        let object = check_owner(self.device(), &buffer)?;
        if !buffer.usage().contains(BufferUsage::VERTEX) {
            return Err(GpuError::invalid(format!(
                "buffer \"{}\" lacks VERTEX usage",
                buffer.label()
            )));
        }
        self.device().with_backend(|backend| {
            backend.attach(handle, AttachPoint::VertexBuffer(location), object);
            Ok(())
        })?;
        let mut inputs = self.inputs.lock();
        inputs.constants.remove(&location);
        inputs.buffers.insert(location, buffer);
        Ok(())
    }

    pub fn set_index_buffer(&self, buffer: Arc<Buffer>) -> Result<()> {
        let handle = self.core.handle()?;
        let object = check_owner(self.device(), &buffer)?;
        if !buffer.usage().contains(BufferUsage::INDEX) {
            return Err(GpuError::invalid(format!(
                "buffer \"{}\" lacks INDEX usage",
                buffer.label()
            )));
        }
        self.device().with_backend(|backend| {
            backend.attach(handle, AttachPoint::IndexBuffer, object);
            Ok(())
        })?;
        self.inputs.lock().index = Some(buffer);
        Ok(())
    }

    /// Feeds `location` a constant instead of a buffer. Repeating the
    /// current value makes no native call.
    pub fn set_constant(&self, location: u32, value: [f32; 4]) -> Result<()> {
        self.core.handle()?;
        self.check_location(location)?;
        let mut inputs = self.inputs.lock();
        if inputs.constants.get(&location) == Some(&value) {
            return Ok(());
        }
        self.device().with_backend(|backend| {
            backend.vertex_attrib_constant(location, value);
            Ok(())
        })?;
        inputs.buffers.remove(&location);
        inputs.constants.insert(location, value);
        Ok(())
    }

    pub fn buffer(&self, location: u32) -> Option<Arc<Buffer>> {
        self.inputs.lock().buffers.get(&location).cloned()
    }

    pub fn index_buffer(&self) -> Option<Arc<Buffer>> {
        self.inputs.lock().index.clone()
    }

    /// Element type used by indexed draws with this array.
    pub fn index_type(&self) -> Option<IndexType> {
        let inputs = self.inputs.lock();
        let index = inputs.index.as_ref()?;
        Some(index.index_type().unwrap_or_default())
    }
}

impl std::fmt::Debug for VertexArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inputs = self.inputs.lock();
        f.debug_struct("VertexArray")
            .field("core", &self.core)
            .field("buffers", &inputs.buffers.keys().collect::<Vec<_>>())
            .field("indexed", &inputs.index.is_some())
            .finish()
    }
}

//===----------------------------------------------------------------------===//
// Transform feedback
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Default)]
pub struct TransformFeedbackProps {
    pub label: Option<String>,
    /// Initial buffers by feedback slot.
    pub buffers: Vec<(u32, Arc<Buffer>)>,
}

/// Captures vertex shader outputs into buffers. Stateful backend only.
pub struct TransformFeedback {
    core: ResourceCore,
    buffers: Mutex<BTreeMap<u32, Arc<Buffer>>>,
    active: Mutex<bool>,
}

impl_resource!(TransformFeedback);

impl TransformFeedback {
    pub(crate) fn new(device: &Device, props: &TransformFeedbackProps) -> Result<Self> {
        let handle = device
            .with_backend(|backend| backend.create_object(&ObjectDescriptor::TransformFeedback))?;
        let feedback = Self {
            core: ResourceCore::new(
                device,
                ResourceKind::TransformFeedback,
                props.label.as_deref(),
                handle,
            ),
            buffers: Mutex::new(BTreeMap::new()),
            active: Mutex::new(false),
        };
        for (index, buffer) in &props.buffers {
            feedback.set_buffer(*index, buffer.clone())?;
        }
        Ok(feedback)
    }

    pub fn set_buffer(&self, index: u32, buffer: Arc<Buffer>) -> Result<()> {
        let handle = self.core.handle()?;
        if index >= MAX_FEEDBACK_BUFFERS {
            return Err(GpuError::invalid(format!(
                "feedback slot {index} is not below {MAX_FEEDBACK_BUFFERS}"
            )));
        }
        let object = check_owner(self.device(), &buffer)?;
        self.device().with_backend(|backend| {
            backend.attach(handle, AttachPoint::FeedbackBuffer(index), object);
            Ok(())
        })?;
        self.buffers.lock().insert(index, buffer);
        Ok(())
    }

    pub fn buffer(&self, index: u32) -> Option<Arc<Buffer>> {
        self.buffers.lock().get(&index).cloned()
    }

    pub fn begin(&self, topology: PrimitiveTopology) -> Result<()> {
        let handle = self.core.handle()?;
        let mut active = self.active.lock();
        if *active {
            return Err(GpuError::state("transform feedback is already active"));
        }
        if self.buffers.lock().is_empty() {
            return Err(GpuError::state("transform feedback has no buffers"));
        }
        self.device().with_backend(|backend| {
            backend.begin_transform_feedback(handle, topology);
            Ok(())
        })?;
        *active = true;
        Ok(())
    }

    pub fn end(&self) -> Result<()> {
        self.core.handle()?;
        let mut active = self.active.lock();
        if !*active {
            return Err(GpuError::state("transform feedback is not active"));
        }
        self.device().with_backend(|backend| {
            backend.end_transform_feedback();
            Ok(())
        })?;
        *active = false;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }
}

impl std::fmt::Debug for TransformFeedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformFeedback")
            .field("core", &self.core)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceFactory, DeviceProps};
    use crate::resource::BufferProps;

    fn device() -> Device {
        DeviceFactory::without_provider()
            .create_null_device(&DeviceProps::default())
            .unwrap()
    }

    #[test]
    fn index_buffer_needs_index_usage() {
        let device = device();
        let vertex_array = device.create_vertex_array(&VertexArrayProps::default()).unwrap();
        let vertices = device
            .create_buffer(&BufferProps {
                byte_length: 64,
                ..Default::default()
            })
            .unwrap();
        assert!(vertex_array.set_index_buffer(vertices.clone()).is_err());
        vertex_array.set_buffer(0, vertices).unwrap();

        let indices = device
            .create_buffer(&BufferProps {
                byte_length: 12,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
                index_type: Some(IndexType::Uint32),
                ..Default::default()
            })
            .unwrap();
        vertex_array.set_index_buffer(indices).unwrap();
        assert_eq!(vertex_array.index_type(), Some(IndexType::Uint32));
    }

    #[test]
    fn locations_are_limited() {
        let device = device();
        let vertex_array = device.create_vertex_array(&VertexArrayProps::default()).unwrap();
        let max = device.limits().max_vertex_attributes;
        assert!(vertex_array.set_constant(max, [0.0; 4]).is_err());
        assert!(vertex_array.set_constant(max - 1, [1.0; 4]).is_ok());
    }

    #[test]
    fn destroyed_array_rejects_buffers() {
        let device = device();
        let vertex_array = device.create_vertex_array(&VertexArrayProps::default()).unwrap();
        let buffer = device
            .create_buffer(&BufferProps {
                byte_length: 16,
                ..Default::default()
            })
            .unwrap();
        vertex_array.destroy();
        assert!(matches!(
            vertex_array.set_buffer(0, buffer),
            Err(GpuError::ResourceDestroyed { .. })
        ));
    }
}
