//! GPU-side objects owned by a [`Device`].
//!
//! Every resource shares one lifecycle: construction either yields a
//! `Ready` object or fails without side effects, `destroy` releases the
//! native object exactly once, and every later operation fails with
//! [`GpuError::ResourceDestroyed`]. Dropping the last owner destroys it too.

mod buffer;
mod external;
mod framebuffer;
mod pipeline;
mod query;
mod sampler;
mod shader;
mod texture;
mod vertex;

pub use buffer::{Buffer, BufferProps, BufferUsage, IndexType};
pub use external::{ExternalTexture, ExternalTextureProps};
pub use framebuffer::{Attachment, Framebuffer, FramebufferProps};
pub use pipeline::{
    AttributeDeclaration, Binding, BindingDeclaration, BlendComponent, BlendFactor,
    BlendOperation, BufferLayout, ComputePipeline, ComputePipelineProps, CullMode, FrontFace,
    PipelineParameters, PrimitiveTopology, RenderPipeline, RenderPipelineProps, ShaderLayout,
    StepMode,
};
pub use query::{QuerySet, QuerySetProps, QueryType};
pub use sampler::{AddressMode, CompareFunction, FilterMode, Sampler, SamplerProps};
pub use shader::{
    detect_language, format_compiler_log, CompilationOutcome, CompilationStatus, Shader,
    ShaderDebug, ShaderLanguage, ShaderProps, ShaderStage,
};
pub(crate) use shader::CompilationFuture;
pub use texture::{Texture, TextureDimension, TextureProps, TextureUsage};
pub use vertex::{TransformFeedback, TransformFeedbackProps, VertexArray, VertexArrayProps};

use std::fmt;

use parking_lot::Mutex;

use crate::error::{GpuError, Result};
use crate::gpu::Device;
use crate::native::NativeHandle;
use crate::utils::uid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
    Shader,
    Framebuffer,
    RenderPipeline,
    ComputePipeline,
    VertexArray,
    TransformFeedback,
    QuerySet,
    ExternalTexture,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Sampler => "sampler",
            ResourceKind::Shader => "shader",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::RenderPipeline => "render-pipeline",
            ResourceKind::ComputePipeline => "compute-pipeline",
            ResourceKind::VertexArray => "vertex-array",
            ResourceKind::TransformFeedback => "transform-feedback",
            ResourceKind::QuerySet => "query-set",
            ResourceKind::ExternalTexture => "external-texture",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction goes straight to `Ready`; there is no observable
/// uninitialized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Ready,
    Destroyed,
}

/// How a resource gives its native object back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// Delete the native object.
    Native,
    /// The platform reclaims the object; just forget the handle.
    Detach,
}

/// Identity, owner and native handle slot shared by every resource.
pub struct ResourceCore {
    device: Device,
    id: String,
    label: String,
    kind: ResourceKind,
    handle: Mutex<Option<NativeHandle>>,
    release: Release,
}

impl ResourceCore {
    pub(crate) fn new(
        device: &Device,
        kind: ResourceKind,
        label: Option<&str>,
        handle: NativeHandle,
    ) -> Self {
        Self::with_release(device, kind, label, handle, Release::Native)
    }

    pub(crate) fn with_release(
        device: &Device,
        kind: ResourceKind,
        label: Option<&str>,
        handle: NativeHandle,
        release: Release,
    ) -> Self {
        let id = uid(kind.as_str());
        let label = label.map(str::to_string).unwrap_or_else(|| id.clone());
        log::debug!("{}: created {kind} \"{label}\"", device.id());
        Self {
            device: device.clone(),
            id,
            label,
            kind,
            handle: Mutex::new(Some(handle)),
            release,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn state(&self) -> ResourceState {
        match *self.handle.lock() {
            Some(_) => ResourceState::Ready,
            None => ResourceState::Destroyed,
        }
    }

    pub fn raw_handle(&self) -> Option<NativeHandle> {
        *self.handle.lock()
    }

    /// The live native handle, or `ResourceDestroyed`.
    pub fn handle(&self) -> Result<NativeHandle> {
        self.raw_handle().ok_or_else(|| self.destroyed_error())
    }

    pub(crate) fn destroyed_error(&self) -> GpuError {
        GpuError::ResourceDestroyed {
            kind: self.kind,
            label: self.label.clone(),
        }
    }

    /// Swaps in a new native object and returns the old one.
    pub(crate) fn replace_handle(&self, handle: NativeHandle) -> Result<NativeHandle> {
        let mut slot = self.handle.lock();
        match slot.as_mut() {
            Some(current) => Ok(std::mem::replace(current, handle)),
            None => Err(self.destroyed_error()),
        }
    }

    pub fn destroy(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if self.release == Release::Native {
            self.device.release_native(self.kind, handle);
        }
        log::debug!("{}: destroyed {} \"{}\"", self.device.id(), self.kind, self.label);
    }
}

impl Drop for ResourceCore {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for ResourceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCore")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("handle", &self.raw_handle())
            .finish()
    }
}

/// The contract shared by every resource variant.
pub trait Resource {
    fn core(&self) -> &ResourceCore;

    fn id(&self) -> &str {
        self.core().id()
    }

    fn label(&self) -> &str {
        self.core().label()
    }

    fn kind(&self) -> ResourceKind {
        self.core().kind()
    }

    fn device(&self) -> &Device {
        self.core().device()
    }

    fn state(&self) -> ResourceState {
        self.core().state()
    }

    fn handle(&self) -> Option<NativeHandle> {
        self.core().raw_handle()
    }

    /// Releases the native object. Repeated calls are no-ops.
    fn destroy(&self) {
        self.core().destroy()
    }
}

macro_rules! impl_resource {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::resource::Resource for $ty {
                fn core(&self) -> &$crate::resource::ResourceCore {
                    &self.core
                }
            }
        )*
    };
}

pub(crate) use impl_resource;
