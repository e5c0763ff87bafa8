//! Headless native contexts.
//!
//! [`RecordingGl`] and [`RecordingExplicit`] keep objects and buffer bytes
//! in memory, run a tiny shader checker and log every native call. They back
//! [`DeviceFactory::headless`](crate::gpu::DeviceFactory::headless) and the
//! test suite. [`RecordingStats`] observes a context after it has been handed
//! to a device.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Poll;

use futures::future::{poll_fn, ready, BoxFuture, FutureExt};
use parking_lot::Mutex;

use super::{
    AttachPoint, CompilerMessage, ContextId, ContextProvider, DeviceInfo, ErrorFilter,
    ExplicitContext, GlContext, MessageKind, NativeContext, NativeError, NativeHandle,
    ObjectDescriptor,
};
use crate::caps::{DeviceFeature, DeviceLimits};
use crate::driver::ir::{
    BeginComputePass, BeginRenderPass, BindingKind, ClearFlags, CommandSink, CopyBufferToBuffer,
    CopyBufferToTexture, CopyTextureToBuffer, CopyTextureToTexture, Dispatch, Draw, DrawIndexed,
    EndComputePass, EndRenderPass, ResolveQuerySet, SetBinding, SetComputePipeline, SetPipeline,
    SetScissor, SetVertexArray, SetViewport, TextureRegion, WriteTimestamp,
};
use crate::driver::params::{GlParameter, ParameterValue};
use crate::error::{GpuError, Result};
use crate::gpu::structs::{PowerPreference, SurfaceProps, SurfaceTarget};
use crate::resource::{PrimitiveTopology, ResourceKind};

/// Extensions a fresh [`RecordingGl`] advertises.
pub const DEFAULT_GL_EXTENSIONS: &[&str] = &[
    "EXT_color_buffer_float",
    "OES_texture_float_linear",
    "EXT_texture_filter_anisotropic",
    "EXT_disjoint_timer_query_webgl2",
    "WEBGL_compressed_texture_s3tc",
];

const EXPLICIT_FEATURES: &[DeviceFeature] = &[
    DeviceFeature::Compute,
    DeviceFeature::Instancing,
    DeviceFeature::TimestampQuery,
    DeviceFeature::DepthClipControl,
    DeviceFeature::Depth32floatStencil8,
    DeviceFeature::TextureCompressionBc,
    DeviceFeature::Float32Renderable,
    DeviceFeature::Float32Filterable,
    DeviceFeature::Float16Renderable,
    DeviceFeature::Rg11b10ufloatRenderable,
    DeviceFeature::ShaderF16,
    DeviceFeature::CompilationStatusAsync,
    DeviceFeature::AnisotropicFiltering,
];

/// Returns `Pending` once, waking itself, then completes.
fn yield_once() -> impl Future<Output = ()> + Send + 'static {
    let mut yielded = false;
    poll_fn(move |cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
}

fn message(kind: MessageKind, line: u32, column: u32, text: impl Into<String>) -> CompilerMessage {
    CompilerMessage {
        kind,
        message: text.into(),
        line,
        column,
    }
}

/// Checks brace balance and the presence of the entry point. A
/// `#pragma warning <text>` line produces a warning.
pub fn check_shader_source(source: &str, entry_point: &str) -> Vec<CompilerMessage> {
    let mut messages = Vec::new();
    let mut depth = 0i64;
    let mut last_line = 1;
    for (index, line) in source.lines().enumerate() {
        let number = index as u32 + 1;
        last_line = number;
        if let Some(text) = line.trim_start().strip_prefix("#pragma warning") {
            messages.push(message(MessageKind::Warning, number, 1, text.trim()));
            continue;
        }
        for (column, ch) in line.chars().enumerate() {
            match ch {
                '{' => depth += 1,
                '}' if depth == 0 => messages.push(message(
                    MessageKind::Error,
                    number,
                    column as u32 + 1,
                    "unexpected '}'",
                )),
                '}' => depth -= 1,
                _ => {}
            }
        }
    }
    if depth > 0 {
        messages.push(message(
            MessageKind::Error,
            last_line,
            1,
            "unterminated block, expected '}'",
        ));
    }
    if !source.contains(entry_point) {
        messages.push(message(
            MessageKind::Error,
            1,
            1,
            format!("entry point '{entry_point}' not found"),
        ));
    }
    messages
}

//===----------------------------------------------------------------------===//
// Shared recorder
//===----------------------------------------------------------------------===//

#[derive(Default)]
struct Recorder {
    next_handle: u64,
    objects: HashMap<NativeHandle, ResourceKind>,
    buffers: HashMap<NativeHandle, (u64, Vec<u8>)>,
    shaders: HashMap<NativeHandle, Vec<CompilerMessage>>,
    programs: HashMap<NativeHandle, (NativeHandle, NativeHandle)>,
    attachments: HashMap<NativeHandle, HashMap<AttachPoint, NativeHandle>>,
    parameters: HashMap<GlParameter, ParameterValue>,
    parameter_writes: usize,
    draws: usize,
    submissions: usize,
    calls: Vec<String>,
    uncaptured: Vec<NativeError>,
    lost: Option<String>,
    released: bool,
}

impl Recorder {
    fn new() -> Self {
        Self {
            next_handle: 1,
            ..Default::default()
        }
    }

    fn call(&mut self, entry: String) {
        log::trace!("native: {entry}");
        self.calls.push(entry);
    }

    fn shader_failed(&self, shader: NativeHandle) -> bool {
        self.shaders
            .get(&shader)
            .is_some_and(|messages| messages.iter().any(|m| m.kind == MessageKind::Error))
    }

    fn create(&mut self, desc: &ObjectDescriptor<'_>) -> NativeHandle {
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(handle, desc.kind());
        match desc {
            ObjectDescriptor::Buffer { byte_length, .. } => {
                self.buffers.insert(handle, (*byte_length, Vec::new()));
            }
            ObjectDescriptor::Shader {
                source,
                entry_point,
                ..
            } => {
                self.shaders
                    .insert(handle, check_shader_source(source, entry_point));
            }
            ObjectDescriptor::RenderPipeline { vs, fs, .. } => {
                self.programs.insert(handle, (*vs, *fs));
            }
            _ => {}
        }
        self.call(format!("create {} {}", desc.kind(), handle.0));
        handle
    }

    fn delete(&mut self, kind: ResourceKind, handle: NativeHandle) {
        if self.objects.remove(&handle).is_none() {
            log::warn!("native: delete of unknown {kind} {}", handle.0);
            return;
        }
        self.buffers.remove(&handle);
        self.shaders.remove(&handle);
        self.programs.remove(&handle);
        self.attachments.remove(&handle);
        self.call(format!("delete {kind} {}", handle.0));
    }

    fn write_buffer(&mut self, buffer: NativeHandle, offset: u64, data: &[u8]) {
        let Some((len, bytes)) = self.buffers.get_mut(&buffer) else {
            return;
        };
        if bytes.len() as u64 != *len {
            bytes.resize(*len as usize, 0);
        }
        let start = offset as usize;
        let end = (start + data.len()).min(bytes.len());
        if start < end {
            bytes[start..end].copy_from_slice(&data[..end - start]);
        }
    }

    fn read_buffer(&self, buffer: NativeHandle, offset: u64, len: u64) -> Vec<u8> {
        let mut out = vec![0; len as usize];
        if let Some((_, bytes)) = self.buffers.get(&buffer) {
            let start = (offset as usize).min(bytes.len());
            let end = (start + len as usize).min(bytes.len());
            out[..end - start].copy_from_slice(&bytes[start..end]);
        }
        out
    }

    fn copy_buffer(&mut self, cmd: &CopyBufferToBuffer) {
        let bytes = self.read_buffer(cmd.src, cmd.src_offset, cmd.size);
        self.write_buffer(cmd.dst, cmd.dst_offset, &bytes);
        self.call(format!("copy buffer {} -> {} ({} bytes)", cmd.src.0, cmd.dst.0, cmd.size));
    }

    fn resolve_queries(
        &mut self,
        query_set: NativeHandle,
        first: u32,
        count: u32,
        destination: NativeHandle,
        offset: u64,
    ) {
        let bytes: Vec<u8> = (first..first + count)
            .flat_map(|index| (index as u64 * 1000).to_le_bytes())
            .collect();
        self.write_buffer(destination, offset, &bytes);
        self.call(format!("resolve queries {} [{first}, {})", query_set.0, first + count));
    }

    fn compilation(&self, shader: NativeHandle) -> Vec<CompilerMessage> {
        self.shaders.get(&shader).cloned().unwrap_or_default()
    }

    fn release(&mut self) {
        self.released = true;
        self.objects.clear();
        self.buffers.clear();
        self.shaders.clear();
        self.programs.clear();
        self.attachments.clear();
        self.call("release".to_string());
    }
}

/// Read-only view of a recording context, plus platform-side loss.
#[derive(Clone)]
pub struct RecordingStats {
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingStats {
    pub fn live_objects(&self) -> usize {
        self.recorder.lock().objects.len()
    }

    pub fn live_objects_of(&self, kind: ResourceKind) -> usize {
        self.recorder
            .lock()
            .objects
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    /// Native parameter writes issued so far.
    pub fn parameter_writes(&self) -> usize {
        self.recorder.lock().parameter_writes
    }

    pub fn parameter(&self, parameter: GlParameter) -> ParameterValue {
        self.recorder
            .lock()
            .parameters
            .get(&parameter)
            .copied()
            .unwrap_or_else(|| parameter.default_value())
    }

    pub fn draw_count(&self) -> usize {
        self.recorder.lock().draws
    }

    pub fn submissions(&self) -> usize {
        self.recorder.lock().submissions
    }

    /// Every native call, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.recorder.lock().calls.clone()
    }

    pub fn buffer_bytes(&self, buffer: NativeHandle) -> Option<Vec<u8>> {
        let recorder = self.recorder.lock();
        let (len, _) = recorder.buffers.get(&buffer)?;
        Some(recorder.read_buffer(buffer, 0, *len))
    }

    /// Errors raised while no matching error scope was open.
    pub fn uncaptured_errors(&self) -> Vec<NativeError> {
        self.recorder.lock().uncaptured.clone()
    }

    pub fn is_released(&self) -> bool {
        self.recorder.lock().released
    }

    pub fn is_lost(&self) -> bool {
        self.recorder.lock().lost.is_some()
    }

    /// Simulates the platform taking the context away.
    pub fn lose(&self, message: &str) {
        self.recorder.lock().lost = Some(message.to_string());
    }
}

impl std::fmt::Debug for RecordingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let recorder = self.recorder.lock();
        f.debug_struct("RecordingStats")
            .field("objects", &recorder.objects.len())
            .field("calls", &recorder.calls.len())
            .field("lost", &recorder.lost)
            .finish()
    }
}

//===----------------------------------------------------------------------===//
// Stateful context
//===----------------------------------------------------------------------===//

/// Headless immediate-mode context.
pub struct RecordingGl {
    context: ContextId,
    extensions: Vec<String>,
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingGl {
    pub fn new(context: ContextId) -> Self {
        Self::with_recorder(context, Arc::new(Mutex::new(Recorder::new())))
    }

    fn with_recorder(context: ContextId, recorder: Arc<Mutex<Recorder>>) -> Self {
        Self {
            context,
            extensions: DEFAULT_GL_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            recorder,
        }
    }

    pub fn with_extensions<S: Into<String>>(
        mut self,
        extensions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn stats(&self) -> RecordingStats {
        RecordingStats {
            recorder: self.recorder.clone(),
        }
    }
}

impl NativeContext for RecordingGl {
    fn context_id(&self) -> ContextId {
        self.context
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            vendor: "lumo".into(),
            renderer: "headless-gl".into(),
            version: "OpenGL ES 3.0 (recording)".into(),
            shading_language: "glsl".into(),
            shading_language_version: "300 es".into(),
        }
    }

    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            max_color_attachments: 4,
            max_texture_dimension_2d: 4096,
            max_texture_dimension_1d: 4096,
            ..DeviceLimits::default()
        }
    }

    fn lost_message(&self) -> Option<String> {
        self.recorder.lock().lost.clone()
    }

    fn create_object(&mut self, desc: &ObjectDescriptor<'_>) -> Result<NativeHandle, NativeError> {
        Ok(self.recorder.lock().create(desc))
    }

    fn delete_object(&mut self, kind: ResourceKind, handle: NativeHandle) {
        self.recorder.lock().delete(kind, handle)
    }

    fn write_buffer(&mut self, buffer: NativeHandle, offset: u64, data: &[u8]) {
        self.recorder.lock().write_buffer(buffer, offset, data)
    }

    fn read_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'static, Vec<u8>> {
        ready(self.recorder.lock().read_buffer(buffer, offset, len)).boxed()
    }

    fn write_texture(&mut self, texture: NativeHandle, region: &TextureRegion, data: &[u8]) {
        self.recorder.lock().call(format!(
            "tex_sub_image {} {}x{} ({} bytes)",
            texture.0,
            region.width,
            region.height,
            data.len()
        ));
    }

    fn compilation_messages(
        &mut self,
        shader: NativeHandle,
    ) -> BoxFuture<'static, Vec<CompilerMessage>> {
        ready(self.recorder.lock().compilation(shader)).boxed()
    }

    fn release(&mut self) {
        self.recorder.lock().release()
    }
}

impl GlContext for RecordingGl {
    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn lose_context(&mut self) -> bool {
        self.recorder.lock().lost = Some("context lost (lose_context)".to_string());
        true
    }

    fn get_parameter(&self, parameter: GlParameter) -> ParameterValue {
        self.stats().parameter(parameter)
    }

    fn set_parameter(&mut self, parameter: GlParameter, value: ParameterValue) {
        let mut recorder = self.recorder.lock();
        recorder.parameters.insert(parameter, value);
        recorder.parameter_writes += 1;
        recorder.call(format!("set {parameter} {value:?}"));
    }

    fn link_program(&mut self, program: NativeHandle) -> Result<(), String> {
        let mut recorder = self.recorder.lock();
        let Some((vs, fs)) = recorder.programs.get(&program).copied() else {
            return Err(format!("program {} does not exist", program.0));
        };
        recorder.call(format!("link {}", program.0));
        if fs.is_null() {
            return Err("link failed: program has no fragment shader".to_string());
        }
        for shader in [vs, fs] {
            if recorder.shader_failed(shader) {
                return Err(format!("link failed: shader {} did not compile", shader.0));
            }
        }
        Ok(())
    }

    fn attach(&mut self, target: NativeHandle, point: AttachPoint, object: NativeHandle) {
        let mut recorder = self.recorder.lock();
        let slots = recorder.attachments.entry(target).or_default();
        if object.is_null() {
            slots.remove(&point);
        } else {
            slots.insert(point, object);
        }
        recorder.call(format!("attach {} {point:?} {}", target.0, object.0));
    }

    fn framebuffer_status(&mut self, framebuffer: NativeHandle) -> Result<(), String> {
        let recorder = self.recorder.lock();
        match recorder.attachments.get(&framebuffer) {
            Some(slots) if !slots.is_empty() => Ok(()),
            _ => Err("framebuffer incomplete: missing attachment".to_string()),
        }
    }

    fn vertex_attrib_constant(&mut self, location: u32, value: [f32; 4]) {
        self.recorder
            .lock()
            .call(format!("vertex_attrib {location} {value:?}"));
    }

    fn bind_resource(
        &mut self,
        program: NativeHandle,
        slot: u32,
        kind: BindingKind,
        resource: NativeHandle,
    ) {
        self.recorder
            .lock()
            .call(format!("bind {} slot {slot} {kind:?} {}", program.0, resource.0));
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u32) {
        self.recorder
            .lock()
            .call(format!("clear {flags:?} {color:?} {depth} {stencil}"));
    }

    fn draw(&mut self, topology: PrimitiveTopology, cmd: &Draw) {
        let mut recorder = self.recorder.lock();
        recorder.draws += 1;
        recorder.call(format!(
            "draw {} {}x{}",
            topology.as_str(),
            cmd.vertex_count,
            cmd.instance_count
        ));
    }

    fn draw_indexed(&mut self, topology: PrimitiveTopology, cmd: &DrawIndexed) {
        let mut recorder = self.recorder.lock();
        recorder.draws += 1;
        recorder.call(format!(
            "draw_indexed {} {}x{} ({}-byte indices)",
            topology.as_str(),
            cmd.index_count,
            cmd.instance_count,
            cmd.index_size
        ));
    }

    fn copy_buffer(&mut self, cmd: &CopyBufferToBuffer) {
        self.recorder.lock().copy_buffer(cmd)
    }

    fn copy_buffer_to_texture(&mut self, cmd: &CopyBufferToTexture) {
        self.recorder
            .lock()
            .call(format!("copy buffer {} -> texture {}", cmd.buffer.0, cmd.texture.0));
    }

    fn copy_texture_to_buffer(&mut self, cmd: &CopyTextureToBuffer) {
        self.recorder
            .lock()
            .call(format!("copy texture {} -> buffer {}", cmd.texture.0, cmd.buffer.0));
    }

    fn copy_texture(&mut self, cmd: &CopyTextureToTexture) {
        self.recorder
            .lock()
            .call(format!("copy texture {} -> texture {}", cmd.src.0, cmd.dst.0));
    }

    fn begin_transform_feedback(&mut self, feedback: NativeHandle, topology: PrimitiveTopology) {
        self.recorder
            .lock()
            .call(format!("begin_transform_feedback {} {}", feedback.0, topology.as_str()));
    }

    fn end_transform_feedback(&mut self) {
        self.recorder.lock().call("end_transform_feedback".to_string());
    }

    fn query_counter(&mut self, query_set: NativeHandle, index: u32) {
        self.recorder
            .lock()
            .call(format!("query_counter {} {index}", query_set.0));
    }

    fn resolve_queries(
        &mut self,
        query_set: NativeHandle,
        first: u32,
        count: u32,
        destination: NativeHandle,
        offset: u64,
    ) {
        self.recorder
            .lock()
            .resolve_queries(query_set, first, count, destination, offset)
    }

    fn debug_group(&mut self, label: Option<&str>) {
        let entry = match label {
            Some(label) => format!("push_group {label}"),
            None => "pop_group".to_string(),
        };
        self.recorder.lock().call(entry);
    }

    fn flush(&mut self) {
        let mut recorder = self.recorder.lock();
        recorder.submissions += 1;
        recorder.call("flush".to_string());
    }
}

//===----------------------------------------------------------------------===//
// Explicit context
//===----------------------------------------------------------------------===//

/// Headless recorded-command context. Shader diagnostics arrive one poll
/// after creation, like a real asynchronous compiler.
pub struct RecordingExplicit {
    context: ContextId,
    recorder: Arc<Mutex<Recorder>>,
    scopes: Vec<(ErrorFilter, Option<NativeError>)>,
    pending: Vec<String>,
}

impl RecordingExplicit {
    pub fn new(context: ContextId) -> Self {
        Self::with_recorder(context, Arc::new(Mutex::new(Recorder::new())))
    }

    fn with_recorder(context: ContextId, recorder: Arc<Mutex<Recorder>>) -> Self {
        Self {
            context,
            recorder,
            scopes: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn stats(&self) -> RecordingStats {
        RecordingStats {
            recorder: self.recorder.clone(),
        }
    }

    /// Delivers `error` to the innermost scope with a matching filter.
    fn raise(&mut self, filter: ErrorFilter, text: String) {
        let error = NativeError {
            filter,
            message: text,
        };
        let scope = self
            .scopes
            .iter_mut()
            .rev()
            .find(|(scope_filter, _)| *scope_filter == filter);
        match scope {
            Some((_, slot)) => {
                slot.get_or_insert(error);
            }
            None => {
                log::warn!("uncaptured native error: {}", error.message);
                self.recorder.lock().uncaptured.push(error);
            }
        }
    }

    fn validate(&mut self, desc: &ObjectDescriptor<'_>) {
        let failed = {
            let recorder = self.recorder.lock();
            match desc {
                ObjectDescriptor::RenderPipeline { vs, fs, .. } => [*vs, *fs]
                    .into_iter()
                    .find(|shader| !shader.is_null() && recorder.shader_failed(*shader)),
                ObjectDescriptor::ComputePipeline { shader, .. } => {
                    Some(*shader).filter(|shader| recorder.shader_failed(*shader))
                }
                _ => None,
            }
        };
        if let Some(shader) = failed {
            self.raise(
                ErrorFilter::Validation,
                format!("pipeline references invalid shader module {}", shader.0),
            );
        }
    }

    fn record(&mut self, entry: String) {
        self.pending.push(entry);
    }
}

impl NativeContext for RecordingExplicit {
    fn context_id(&self) -> ContextId {
        self.context
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            vendor: "lumo".into(),
            renderer: "headless-explicit".into(),
            version: "1.0 (recording)".into(),
            shading_language: "wgsl".into(),
            shading_language_version: "1.0".into(),
        }
    }

    fn limits(&self) -> DeviceLimits {
        DeviceLimits::default()
    }

    fn lost_message(&self) -> Option<String> {
        self.recorder.lock().lost.clone()
    }

    fn create_object(&mut self, desc: &ObjectDescriptor<'_>) -> Result<NativeHandle, NativeError> {
        self.validate(desc);
        Ok(self.recorder.lock().create(desc))
    }

    fn delete_object(&mut self, kind: ResourceKind, handle: NativeHandle) {
        self.recorder.lock().delete(kind, handle)
    }

    fn write_buffer(&mut self, buffer: NativeHandle, offset: u64, data: &[u8]) {
        self.recorder.lock().write_buffer(buffer, offset, data)
    }

    fn read_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'static, Vec<u8>> {
        let bytes = self.recorder.lock().read_buffer(buffer, offset, len);
        async move {
            yield_once().await;
            bytes
        }
        .boxed()
    }

    fn write_texture(&mut self, texture: NativeHandle, region: &TextureRegion, data: &[u8]) {
        self.recorder.lock().call(format!(
            "write_texture {} {}x{} ({} bytes)",
            texture.0,
            region.width,
            region.height,
            data.len()
        ));
    }

    fn compilation_messages(
        &mut self,
        shader: NativeHandle,
    ) -> BoxFuture<'static, Vec<CompilerMessage>> {
        let messages = self.recorder.lock().compilation(shader);
        async move {
            yield_once().await;
            messages
        }
        .boxed()
    }

    fn release(&mut self) {
        self.pending.clear();
        self.recorder.lock().release()
    }
}

impl CommandSink for RecordingExplicit {
    fn begin_render_pass(&mut self, cmd: &BeginRenderPass) {
        self.record(format!(
            "begin_render_pass {} ({} colors)",
            cmd.framebuffer.0, cmd.color_count
        ));
    }

    fn end_render_pass(&mut self, _: &EndRenderPass) {
        self.record("end_render_pass".to_string());
    }

    fn set_pipeline(&mut self, cmd: &SetPipeline) {
        self.record(format!("set_pipeline {}", cmd.pipeline.0));
    }

    fn set_vertex_array(&mut self, cmd: &SetVertexArray) {
        self.record(format!("set_vertex_array {}", cmd.vertex_array.0));
    }

    fn set_binding(&mut self, cmd: &SetBinding) {
        self.record(format!("set_binding {} = {}", cmd.slot, cmd.resource.0));
    }

    fn set_viewport(&mut self, cmd: &SetViewport) {
        self.record(format!("set_viewport {:?}", cmd.rect));
    }

    fn set_scissor(&mut self, cmd: &SetScissor) {
        self.record(format!("set_scissor {:?}", cmd.rect));
    }

    fn draw(&mut self, cmd: &Draw) {
        self.recorder.lock().draws += 1;
        self.record(format!("draw {}x{}", cmd.vertex_count, cmd.instance_count));
    }

    fn draw_indexed(&mut self, cmd: &DrawIndexed) {
        self.recorder.lock().draws += 1;
        self.record(format!("draw_indexed {}x{}", cmd.index_count, cmd.instance_count));
    }

    fn begin_compute_pass(&mut self, _: &BeginComputePass) {
        self.record("begin_compute_pass".to_string());
    }

    fn end_compute_pass(&mut self, _: &EndComputePass) {
        self.record("end_compute_pass".to_string());
    }

    fn set_compute_pipeline(&mut self, cmd: &SetComputePipeline) {
        self.record(format!("set_compute_pipeline {}", cmd.pipeline.0));
    }

    fn dispatch(&mut self, cmd: &Dispatch) {
        self.record(format!("dispatch {}x{}x{}", cmd.x, cmd.y, cmd.z));
    }

    fn copy_buffer_to_buffer(&mut self, cmd: &CopyBufferToBuffer) {
        self.recorder.lock().copy_buffer(cmd);
    }

    fn copy_buffer_to_texture(&mut self, cmd: &CopyBufferToTexture) {
        self.record(format!("copy buffer {} -> texture {}", cmd.buffer.0, cmd.texture.0));
    }

    fn copy_texture_to_buffer(&mut self, cmd: &CopyTextureToBuffer) {
        self.record(format!("copy texture {} -> buffer {}", cmd.texture.0, cmd.buffer.0));
    }

    fn copy_texture_to_texture(&mut self, cmd: &CopyTextureToTexture) {
        self.record(format!("copy texture {} -> texture {}", cmd.src.0, cmd.dst.0));
    }

    fn write_timestamp(&mut self, cmd: &WriteTimestamp) {
        self.record(format!("write_timestamp {} {}", cmd.query_set.0, cmd.index));
    }

    fn resolve_query_set(&mut self, cmd: &ResolveQuerySet) {
        self.recorder.lock().resolve_queries(
            cmd.query_set,
            cmd.first_query,
            cmd.query_count,
            cmd.destination,
            cmd.destination_offset,
        );
    }

    fn push_debug_group(&mut self, label: &str) {
        self.record(format!("push_group {label}"));
    }

    fn pop_debug_group(&mut self) {
        self.record("pop_group".to_string());
    }

    fn insert_debug_marker(&mut self, label: &str) {
        self.record(format!("marker {label}"));
    }
}

impl ExplicitContext for RecordingExplicit {
    fn features(&self) -> Vec<DeviceFeature> {
        EXPLICIT_FEATURES.to_vec()
    }

    fn push_error_scope(&mut self, filter: ErrorFilter) {
        self.scopes.push((filter, None));
    }

    fn pop_error_scope(&mut self) -> Option<NativeError> {
        match self.scopes.pop() {
            Some((_, error)) => error,
            None => {
                log::warn!("pop_error_scope on an empty scope stack");
                None
            }
        }
    }

    fn queue_submit(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let mut recorder = self.recorder.lock();
        recorder.submissions += 1;
        recorder.call(format!("queue_submit ({} commands)", pending.len()));
        recorder.calls.extend(pending);
    }

    fn on_submitted_work_done(&mut self) -> BoxFuture<'static, ()> {
        yield_once().boxed()
    }
}

//===----------------------------------------------------------------------===//
// Provider
//===----------------------------------------------------------------------===//

/// Hands out recording contexts. Every canvas name maps to one context, so
/// asking twice for the same canvas yields the same [`ContextId`].
pub struct HeadlessProvider {
    next_context: AtomicU64,
    canvases: Mutex<HashMap<String, (ContextId, Arc<Mutex<Recorder>>)>>,
    contexts: Mutex<HashMap<ContextId, RecordingStats>>,
    explicit: bool,
    gl_extensions: Option<Vec<String>>,
    unavailable: HashSet<&'static str>,
}

impl HeadlessProvider {
    pub fn new() -> Self {
        Self {
            next_context: AtomicU64::new(1),
            canvases: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            explicit: true,
            gl_extensions: None,
            unavailable: HashSet::new(),
        }
    }

    /// A provider that cannot create explicit contexts.
    pub fn gl_only() -> Self {
        Self {
            explicit: false,
            ..Self::new()
        }
    }

    pub fn with_gl_extensions<S: Into<String>>(
        mut self,
        extensions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.gl_extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// A provider that cannot create stateful contexts.
    pub fn explicit_only() -> Self {
        let mut provider = Self::new();
        provider.unavailable.insert("gl");
        provider
    }

    /// Stats of a context this provider created.
    pub fn stats(&self, context: ContextId) -> Option<RecordingStats> {
        self.contexts.lock().get(&context).cloned()
    }

    fn context_for(&self, surface: &SurfaceProps) -> (ContextId, Arc<Mutex<Recorder>>) {
        let fresh = || {
            let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
            (id, Arc::new(Mutex::new(Recorder::new())))
        };
        let (id, recorder) = match &surface.target {
            SurfaceTarget::Canvas(name) => self
                .canvases
                .lock()
                .entry(name.clone())
                .or_insert_with(fresh)
                .clone(),
            SurfaceTarget::Offscreen => fresh(),
        };
        self.contexts.lock().insert(
            id,
            RecordingStats {
                recorder: recorder.clone(),
            },
        );
        (id, recorder)
    }
}

impl Default for HeadlessProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextProvider for HeadlessProvider {
    fn create_gl_context(&self, surface: &SurfaceProps) -> Result<Box<dyn GlContext>> {
        if self.unavailable.contains("gl") {
            return Err(GpuError::unsupported("no stateful context available"));
        }
        let (id, recorder) = self.context_for(surface);
        let mut gl = RecordingGl::with_recorder(id, recorder);
        if let Some(extensions) = &self.gl_extensions {
            gl = gl.with_extensions(extensions.iter().cloned());
        }
        Ok(Box::new(gl))
    }

    fn create_explicit_context(
        &self,
        surface: &SurfaceProps,
        power_preference: PowerPreference,
    ) -> Result<Box<dyn ExplicitContext>> {
        if !self.explicit {
            return Err(GpuError::unsupported("no explicit adapter available"));
        }
        log::debug!("requesting explicit adapter ({power_preference:?})");
        let (id, recorder) = self.context_for(surface);
        Ok(Box::new(RecordingExplicit::with_recorder(id, recorder)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checker_flags_missing_entry_point() {
        let messages = check_shader_source("<invalid>", "main");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Error);
        assert!(messages[0].message.contains("main"));
    }

    #[test]
    fn checker_flags_unbalanced_braces() {
        let messages = check_shader_source("void main() {\n", "main");
        assert!(messages
            .iter()
            .any(|m| m.kind == MessageKind::Error && m.message.contains("unterminated")));
        assert!(check_shader_source("void main() {}", "main").is_empty());
    }

    #[test]
    fn pragma_warning_is_reported() {
        let messages = check_shader_source("#pragma warning slow path\nvoid main() {}", "main");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Warning);
        assert_eq!(messages[0].line, 1);
    }

    #[test]
    fn same_canvas_shares_a_context() {
        let provider = HeadlessProvider::new();
        let surface = SurfaceProps {
            target: SurfaceTarget::Canvas("main".into()),
            ..Default::default()
        };
        let a = provider.create_gl_context(&surface).unwrap();
        let b = provider.create_gl_context(&surface).unwrap();
        assert_eq!(a.context_id(), b.context_id());
        let c = provider.create_gl_context(&SurfaceProps::default()).unwrap();
        assert_ne!(a.context_id(), c.context_id());
    }

    #[test]
    fn scopes_capture_the_first_error() {
        let mut ctx = RecordingExplicit::new(ContextId(1));
        ctx.push_error_scope(ErrorFilter::Validation);
        ctx.raise(ErrorFilter::Validation, "first".into());
        ctx.raise(ErrorFilter::Validation, "second".into());
        assert_eq!(ctx.pop_error_scope().map(|e| e.message), Some("first".into()));
        ctx.raise(ErrorFilter::OutOfMemory, "oom".into());
        assert_eq!(ctx.stats().uncaptured_errors().len(), 1);
    }
}
