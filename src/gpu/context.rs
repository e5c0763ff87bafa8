use futures::future::{ready, BoxFuture, FutureExt};

use super::explicit::ExplicitBackend;
use super::gl::GlBackend;
use super::null::NullBackend;
use super::structs::BackendKind;
use crate::caps::{DeviceFeature, DeviceLimits};
use crate::driver::ir::{CommandStream, TextureRegion};
use crate::driver::params::{GlParameter, ParameterValue, Parameters};
use crate::error::{GpuError, Result};
use crate::native::{
    AttachPoint, CompilerMessage, ContextId, DeviceInfo, ErrorFilter, NativeError, NativeHandle,
    ObjectDescriptor,
};
use crate::resource::{PrimitiveTopology, ResourceKind, ShaderLanguage};

/// Calls a method shared by both native context families.
macro_rules! native {
    ($self:expr, $method:ident($($arg:expr),*), $null:expr) => {
        match $self {
            ContextBackend::Gl(gl) => gl.gl.$method($($arg),*),
            ContextBackend::Explicit(ex) => ex.ctx.$method($($arg),*),
            ContextBackend::Null(_) => $null,
        }
    };
}

/// Closed set of backends a device dispatches to.
pub(crate) enum ContextBackend {
    Gl(GlBackend),
    Explicit(ExplicitBackend),
    Null(NullBackend),
}

impl ContextBackend {
    pub(crate) fn kind(&self) -> BackendKind {
        match self {
            ContextBackend::Gl(_) => BackendKind::Gl,
            ContextBackend::Explicit(_) => BackendKind::Explicit,
            ContextBackend::Null(_) => BackendKind::Null,
        }
    }

    pub(crate) fn context_id(&self) -> ContextId {
        match self {
            ContextBackend::Gl(gl) => gl.gl.context_id(),
            ContextBackend::Explicit(ex) => ex.ctx.context_id(),
            ContextBackend::Null(null) => null.context_id(),
        }
    }

    pub(crate) fn info(&self) -> DeviceInfo {
        native!(self, info(), NullBackend::info())
    }

    pub(crate) fn limits(&self) -> DeviceLimits {
        native!(self, limits(), NullBackend::limits())
    }

    pub(crate) fn features(&self) -> Vec<DeviceFeature> {
        match self {
            ContextBackend::Gl(gl) => gl.features(),
            ContextBackend::Explicit(ex) => ex.features(),
            ContextBackend::Null(_) => Vec::new(),
        }
    }

    pub(crate) fn lost_message(&self) -> Option<String> {
        native!(self, lost_message(), None)
    }

    /// Minimum row alignment for texture uploads and copies.
    pub(crate) fn texture_byte_alignment(&self) -> u32 {
        match self {
            ContextBackend::Gl(_) => 4,
            ContextBackend::Explicit(_) => 256,
            ContextBackend::Null(_) => 1,
        }
    }

    pub(crate) fn supports_kind(&self, kind: ResourceKind) -> bool {
        match (self, kind) {
            (ContextBackend::Gl(_), ResourceKind::ComputePipeline)
            | (ContextBackend::Gl(_), ResourceKind::ExternalTexture) => false,
            (ContextBackend::Explicit(_), ResourceKind::TransformFeedback) => false,
            (ContextBackend::Null(_), ResourceKind::ComputePipeline)
            | (ContextBackend::Null(_), ResourceKind::ExternalTexture) => false,
            _ => true,
        }
    }

    pub(crate) fn accepts_language(&self, language: ShaderLanguage) -> bool {
        !matches!(
            (self, language),
            (ContextBackend::Gl(_), ShaderLanguage::Wgsl)
                | (ContextBackend::Explicit(_), ShaderLanguage::Glsl)
        )
    }

    //===------------------------------------------------------------------===//
    // Objects and data
    //===------------------------------------------------------------------===//

    pub(crate) fn create_object(&mut self, desc: &ObjectDescriptor<'_>) -> Result<NativeHandle> {
        match self {
            ContextBackend::Gl(gl) => gl.gl.create_object(desc).map_err(|error| {
                GpuError::Native(format!("{} creation failed: {}", desc.kind(), error.message))
            }),
            ContextBackend::Explicit(ex) => ex.create_object(desc),
            ContextBackend::Null(null) => Ok(null.create_object(desc.kind())),
        }
    }

    /// Errors captured by native error scopes since the last call.
    pub(crate) fn take_captured_errors(&mut self) -> Vec<GpuError> {
        match self {
            ContextBackend::Explicit(ex) => ex.take_captured(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn delete_object(&mut self, kind: ResourceKind, handle: NativeHandle) {
        match self {
            ContextBackend::Gl(gl) => {
                if kind == ResourceKind::RenderPipeline {
                    gl.forget_pipeline(handle);
                }
                gl.gl.delete_object(kind, handle)
            }
            ContextBackend::Explicit(ex) => ex.ctx.delete_object(kind, handle),
            ContextBackend::Null(null) => null.delete_object(handle),
        }
    }

    pub(crate) fn live_null_objects(&self) -> Option<usize> {
        match self {
            ContextBackend::Null(null) => Some(null.live_objects()),
            _ => None,
        }
    }

    pub(crate) fn write_buffer(&mut self, buffer: NativeHandle, offset: u64, data: &[u8]) {
        native!(self, write_buffer(buffer, offset, data), ())
    }

    pub(crate) fn read_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'static, Vec<u8>> {
        native!(
            self,
            read_buffer(buffer, offset, len),
            ready(vec![0; len as usize]).boxed()
        )
    }

    pub(crate) fn write_texture(
        &mut self,
        texture: NativeHandle,
        region: &TextureRegion,
        data: &[u8],
    ) {
        native!(self, write_texture(texture, region, data), ())
    }

    pub(crate) fn compilation_messages(
        &mut self,
        shader: NativeHandle,
    ) -> BoxFuture<'static, Vec<CompilerMessage>> {
        native!(self, compilation_messages(shader), ready(Vec::new()).boxed())
    }

    //===------------------------------------------------------------------===//
    // Stateful-only object plumbing; no-ops on the other backends
    //===------------------------------------------------------------------===//

    pub(crate) fn link_program(&mut self, program: NativeHandle) -> Result<(), String> {
        match self {
            ContextBackend::Gl(gl) => gl.gl.link_program(program),
            _ => Ok(()),
        }
    }

    pub(crate) fn register_pipeline(&mut self, program: NativeHandle, parameters: Parameters) {
        if let ContextBackend::Gl(gl) = self {
            gl.register_pipeline(program, parameters);
        }
    }

    pub(crate) fn attach(
        &mut self,
        target: NativeHandle,
        point: AttachPoint,
        object: NativeHandle,
    ) {
        if let ContextBackend::Gl(gl) = self {
            gl.gl.attach(target, point, object);
        }
    }

    pub(crate) fn framebuffer_status(&mut self, framebuffer: NativeHandle) -> Result<(), String> {
        match self {
            ContextBackend::Gl(gl) => gl.gl.framebuffer_status(framebuffer),
            _ => Ok(()),
        }
    }

    pub(crate) fn vertex_attrib_constant(&mut self, location: u32, value: [f32; 4]) {
        if let ContextBackend::Gl(gl) = self {
            gl.gl.vertex_attrib_constant(location, value);
        }
    }

    pub(crate) fn begin_transform_feedback(
        &mut self,
        feedback: NativeHandle,
        topology: PrimitiveTopology,
    ) {
        if let ContextBackend::Gl(gl) = self {
            gl.gl.begin_transform_feedback(feedback, topology);
        }
    }

    pub(crate) fn end_transform_feedback(&mut self) {
        if let ContextBackend::Gl(gl) = self {
            gl.gl.end_transform_feedback();
        }
    }

    pub(crate) fn lose_context(&mut self) -> bool {
        match self {
            ContextBackend::Gl(gl) => gl.gl.lose_context(),
            _ => false,
        }
    }

    //===------------------------------------------------------------------===//
    // Execution
    //===------------------------------------------------------------------===//

    /// Runs commands as they are recorded. Only the stateful backend does
    /// this; the others wait for `submit`.
    pub(crate) fn execute(&mut self, stream: &CommandStream) {
        if let ContextBackend::Gl(gl) = self {
            gl.execute(stream);
        }
    }

    pub(crate) fn submit(&mut self, stream: Option<&CommandStream>) {
        match self {
            ContextBackend::Gl(gl) => gl.gl.flush(),
            ContextBackend::Explicit(ex) => {
                let empty = CommandStream::new();
                ex.submit(stream.unwrap_or(&empty));
            }
            ContextBackend::Null(null) => {
                if let Some(stream) = stream {
                    null.submit(stream);
                }
            }
        }
    }

    pub(crate) fn on_submitted_work_done(&mut self) -> BoxFuture<'static, ()> {
        match self {
            ContextBackend::Explicit(ex) => ex.on_submitted_work_done(),
            _ => ready(()).boxed(),
        }
    }

    pub(crate) fn push_error_scope(&mut self, filter: ErrorFilter) {
        if let ContextBackend::Explicit(ex) = self {
            ex.push_error_scope(filter);
        }
    }

    pub(crate) fn pop_error_scope(&mut self) -> Option<NativeError> {
        match self {
            ContextBackend::Explicit(ex) => ex.pop_error_scope(),
            _ => None,
        }
    }

    //===------------------------------------------------------------------===//
    // Global state
    //===------------------------------------------------------------------===//

    /// The stateful backend, or `UnsupportedOperation` for the explicit one.
    /// The null backend yields `None`.
    pub(crate) fn gl_state(&mut self) -> Result<Option<&mut GlBackend>> {
        match self {
            ContextBackend::Gl(gl) => Ok(Some(gl)),
            ContextBackend::Explicit(_) => Err(GpuError::unsupported(
                "global parameters are not available on the explicit backend",
            )),
            ContextBackend::Null(_) => Ok(None),
        }
    }

    pub(crate) fn state_depth(&self) -> usize {
        match self {
            ContextBackend::Gl(gl) => gl.state_depth(),
            _ => 0,
        }
    }

    pub(crate) fn get_parameters(&mut self, names: &[GlParameter]) -> Result<Parameters> {
        Ok(match self.gl_state()? {
            Some(gl) => gl.get_parameters(names),
            None => names
                .iter()
                .map(|parameter| (*parameter, parameter.default_value()))
                .collect::<Vec<(GlParameter, ParameterValue)>>(),
        })
    }

    pub(crate) fn release(&mut self) {
        native!(self, release(), ())
    }
}
