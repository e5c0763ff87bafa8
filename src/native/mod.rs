//! Narrow interfaces over the native graphics contexts.
//!
//! The core never names a concrete graphics API. A windowing/platform layer
//! hands it something implementing [`GlContext`] (immediate-mode, globally
//! stateful) or [`ExplicitContext`] (recorded command lists, error scopes),
//! usually through a [`ContextProvider`]. [`recording`] has headless
//! implementations of both.

pub mod recording;

use std::fmt;

use bytemuck::{Pod, Zeroable};
use futures::future::BoxFuture;

use crate::caps::{DeviceFeature, DeviceLimits, TextureFormat};
use crate::driver::ir::{
    BindingKind, ClearFlags, CommandSink, CopyBufferToBuffer, CopyBufferToTexture,
    CopyTextureToBuffer, CopyTextureToTexture, Draw, DrawIndexed, TextureRegion,
};
use crate::driver::params::{GlParameter, ParameterValue};
use crate::error::Result;
use crate::gpu::structs::{PowerPreference, SurfaceProps};
use crate::resource::{
    BufferUsage, PrimitiveTopology, QueryType, ResourceKind, SamplerProps, ShaderStage,
    TextureProps,
};

/// Opaque backend object name. Zero is never a live object.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Identity of a native context, used to detect double binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor: String,
    pub renderer: String,
    pub version: String,
    pub shading_language: String,
    pub shading_language_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Warning,
    Info,
}

/// One compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerMessage {
    pub kind: MessageKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFilter {
    Validation,
    OutOfMemory,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub filter: ErrorFilter,
    pub message: String,
}

/// Where a child object is attached on a composite native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachPoint {
    Color(u32),
    Depth,
    Stencil,
    DepthStencil,
    VertexBuffer(u32),
    IndexBuffer,
    FeedbackBuffer(u32),
}

/// Everything the native side needs to create one object.
#[derive(Debug, Clone, Copy)]
pub enum ObjectDescriptor<'a> {
    Buffer {
        byte_length: u64,
        usage: BufferUsage,
    },
    Texture(&'a TextureProps),
    Sampler(&'a SamplerProps),
    Shader {
        stage: ShaderStage,
        source: &'a str,
        entry_point: &'a str,
    },
    Framebuffer,
    RenderPipeline {
        vs: NativeHandle,
        fs: NativeHandle,
        topology: PrimitiveTopology,
        color_formats: &'a [TextureFormat],
        depth_format: Option<TextureFormat>,
    },
    ComputePipeline {
        shader: NativeHandle,
        entry_point: &'a str,
    },
    VertexArray,
    TransformFeedback,
    QuerySet {
        kind: QueryType,
        count: u32,
    },
    ExternalTexture {
        source: &'a str,
    },
}

impl ObjectDescriptor<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ObjectDescriptor::Buffer { .. } => ResourceKind::Buffer,
            ObjectDescriptor::Texture(_) => ResourceKind::Texture,
            ObjectDescriptor::Sampler(_) => ResourceKind::Sampler,
            ObjectDescriptor::Shader { .. } => ResourceKind::Shader,
            ObjectDescriptor::Framebuffer => ResourceKind::Framebuffer,
            ObjectDescriptor::RenderPipeline { .. } => ResourceKind::RenderPipeline,
            ObjectDescriptor::ComputePipeline { .. } => ResourceKind::ComputePipeline,
            ObjectDescriptor::VertexArray => ResourceKind::VertexArray,
            ObjectDescriptor::TransformFeedback => ResourceKind::TransformFeedback,
            ObjectDescriptor::QuerySet { .. } => ResourceKind::QuerySet,
            ObjectDescriptor::ExternalTexture { .. } => ResourceKind::ExternalTexture,
        }
    }
}

/// Operations both native context families share.
pub trait NativeContext: Send {
    fn context_id(&self) -> ContextId;
    fn info(&self) -> DeviceInfo;
    fn limits(&self) -> DeviceLimits;
    /// `Some(message)` once the context has been lost.
    fn lost_message(&self) -> Option<String>;
    fn create_object(&mut self, desc: &ObjectDescriptor<'_>) -> Result<NativeHandle, NativeError>;
    fn delete_object(&mut self, kind: ResourceKind, handle: NativeHandle);
    fn write_buffer(&mut self, buffer: NativeHandle, offset: u64, data: &[u8]);
    fn read_buffer(&mut self, buffer: NativeHandle, offset: u64, len: u64)
        -> BoxFuture<'static, Vec<u8>>;
    fn write_texture(&mut self, texture: NativeHandle, region: &TextureRegion, data: &[u8]);
    fn compilation_messages(&mut self, shader: NativeHandle)
        -> BoxFuture<'static, Vec<CompilerMessage>>;
    /// Drops this crate's ownership of the context.
    fn release(&mut self);
}

/// An immediate-mode, globally stateful context.
pub trait GlContext: NativeContext {
    fn extensions(&self) -> Vec<String>;
    /// Asks the platform to lose the context. Returns false if unsupported.
    fn lose_context(&mut self) -> bool;
    fn get_parameter(&self, parameter: GlParameter) -> ParameterValue;
    fn set_parameter(&mut self, parameter: GlParameter, value: ParameterValue);
    fn link_program(&mut self, program: NativeHandle) -> Result<(), String>;
    fn attach(&mut self, target: NativeHandle, point: AttachPoint, object: NativeHandle);
    fn framebuffer_status(&mut self, framebuffer: NativeHandle) -> Result<(), String>;
    fn vertex_attrib_constant(&mut self, location: u32, value: [f32; 4]);
    fn bind_resource(
        &mut self,
        program: NativeHandle,
        slot: u32,
        kind: BindingKind,
        resource: NativeHandle,
    );
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u32);
    fn draw(&mut self, topology: PrimitiveTopology, cmd: &Draw);
    fn draw_indexed(&mut self, topology: PrimitiveTopology, cmd: &DrawIndexed);
    fn copy_buffer(&mut self, cmd: &CopyBufferToBuffer);
    fn copy_buffer_to_texture(&mut self, cmd: &CopyBufferToTexture);
    fn copy_texture_to_buffer(&mut self, cmd: &CopyTextureToBuffer);
    fn copy_texture(&mut self, cmd: &CopyTextureToTexture);
    fn begin_transform_feedback(&mut self, feedback: NativeHandle, topology: PrimitiveTopology);
    fn end_transform_feedback(&mut self);
    fn query_counter(&mut self, query_set: NativeHandle, index: u32);
    fn resolve_queries(
        &mut self,
        query_set: NativeHandle,
        first: u32,
        count: u32,
        destination: NativeHandle,
        offset: u64,
    );
    fn debug_group(&mut self, label: Option<&str>);
    fn flush(&mut self);
}

/// A context that records command lists and reports errors through scopes.
pub trait ExplicitContext: NativeContext + CommandSink {
    fn features(&self) -> Vec<DeviceFeature>;
    fn push_error_scope(&mut self, filter: ErrorFilter);
    fn pop_error_scope(&mut self) -> Option<NativeError>;
    /// Submits everything recorded through the sink since the last submit.
    fn queue_submit(&mut self);
    fn on_submitted_work_done(&mut self) -> BoxFuture<'static, ()>;
}

/// A native context handed to the device factory.
pub enum NativeDevice {
    Gl(Box<dyn GlContext>),
    Explicit(Box<dyn ExplicitContext>),
}

impl NativeDevice {
    pub fn context_id(&self) -> ContextId {
        match self {
            NativeDevice::Gl(gl) => gl.context_id(),
            NativeDevice::Explicit(ctx) => ctx.context_id(),
        }
    }
}

impl fmt::Debug for NativeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeDevice::Gl(gl) => write!(f, "NativeDevice::Gl({})", gl.context_id()),
            NativeDevice::Explicit(ctx) => {
                write!(f, "NativeDevice::Explicit({})", ctx.context_id())
            }
        }
    }
}

/// Creates native contexts for a surface. Implemented by the windowing layer.
pub trait ContextProvider: Send + Sync {
    fn create_gl_context(&self, surface: &SurfaceProps) -> Result<Box<dyn GlContext>>;
    fn create_explicit_context(
        &self,
        surface: &SurfaceProps,
        power_preference: PowerPreference,
    ) -> Result<Box<dyn ExplicitContext>>;
}
