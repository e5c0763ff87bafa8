use std::collections::HashMap;

use crate::caps::{DeviceFeature, TextureFormat};
use crate::driver::ir::{
    BeginComputePass, BeginRenderPass, BindingKind, ClearFlags, CommandSink, CommandStream,
    CopyBufferToBuffer, CopyBufferToTexture, CopyTextureToBuffer, CopyTextureToTexture, Dispatch,
    Draw, DrawIndexed, EndComputePass, EndRenderPass, ResolveQuerySet, SetBinding,
    SetComputePipeline, SetPipeline, SetScissor, SetVertexArray, SetViewport, WriteTimestamp,
};
use crate::driver::params::{GlParameter, ParameterChange, ParameterValue, Parameters};
use crate::driver::state::StateTracker;
use crate::error::Result;
use crate::ir::{CommandReplayer, Replayer};
use crate::native::{GlContext, NativeHandle};
use crate::resource::PrimitiveTopology;

/// Extension names and the features they unlock.
const EXTENSION_FEATURES: &[(&str, DeviceFeature)] = &[
    ("EXT_color_buffer_float", DeviceFeature::Float32Renderable),
    ("OES_texture_float_linear", DeviceFeature::Float32Filterable),
    ("EXT_color_buffer_half_float", DeviceFeature::Float16Renderable),
    ("EXT_disjoint_timer_query_webgl2", DeviceFeature::TimestampQuery),
    ("EXT_depth_clamp", DeviceFeature::DepthClipControl),
    ("WEBGL_compressed_texture_s3tc", DeviceFeature::TextureCompressionBc),
    ("EXT_texture_compression_bptc", DeviceFeature::TextureCompressionBc),
    ("WEBGL_compressed_texture_etc", DeviceFeature::TextureCompressionEtc2),
    ("WEBGL_compressed_texture_astc", DeviceFeature::TextureCompressionAstc),
    ("EXT_texture_filter_anisotropic", DeviceFeature::AnisotropicFiltering),
    ("KHR_parallel_shader_compile", DeviceFeature::CompilationStatusAsync),
    ("WEBGL_polygon_mode", DeviceFeature::PolygonMode),
    ("WEBGL_provoking_vertex", DeviceFeature::ProvokingVertex),
];

/// Formats a stateful context has no internal format for.
pub(crate) const MASKED_FORMATS: &[TextureFormat] =
    &[TextureFormat::Bgra8Unorm, TextureFormat::Bgra8UnormSrgb];

/// The stateful backend: a native context plus its shadow state.
pub(crate) struct GlBackend {
    pub(crate) gl: Box<dyn GlContext>,
    state: StateTracker,
    /// Fixed-function state of each linked program, applied on bind.
    pipelines: HashMap<NativeHandle, Parameters>,
    pass: PassState,
}

#[derive(Default)]
struct PassState {
    program: NativeHandle,
    topology: PrimitiveTopology,
}

impl GlBackend {
    /// `attached` contexts have unknown state, so the cache is read back.
    pub(crate) fn new(gl: Box<dyn GlContext>, attached: bool) -> Self {
        let state = if attached {
            StateTracker::from_values(
                GlParameter::ALL
                    .iter()
                    .map(|parameter| (*parameter, gl.get_parameter(*parameter))),
            )
        } else {
            StateTracker::new()
        };
        Self {
            gl,
            state,
            pipelines: HashMap::new(),
            pass: PassState::default(),
        }
    }

    pub(crate) fn features(&self) -> Vec<DeviceFeature> {
        let extensions = self.gl.extensions();
        let mut features = vec![DeviceFeature::Instancing, DeviceFeature::TransformFeedback];
        for (name, feature) in EXTENSION_FEATURES {
            if extensions.iter().any(|ext| ext == name) && !features.contains(feature) {
                features.push(*feature);
            }
        }
        features
    }

    fn apply(&mut self, changes: Vec<ParameterChange>) {
        for change in changes {
            self.gl.set_parameter(change.parameter, change.value);
        }
    }

    fn set_one(&mut self, parameter: GlParameter, value: ParameterValue) {
        if let Some(change) = self.state.request(parameter, value) {
            self.gl.set_parameter(change.parameter, change.value);
        }
    }

    //===------------------------------------------------------------------===//
    // State stack
    //===------------------------------------------------------------------===//

    pub(crate) fn push_state(&mut self) {
        self.state.push();
    }

    pub(crate) fn pop_state(&mut self) -> Result<()> {
        let changes = self.state.pop()?;
        self.apply(changes);
        Ok(())
    }

    pub(crate) fn state_depth(&self) -> usize {
        self.state.depth()
    }

    pub(crate) fn set_parameters(&mut self, values: &[(GlParameter, ParameterValue)]) {
        let changes = self.state.request_all(values);
        self.apply(changes);
    }

    pub(crate) fn get_parameters(&self, names: &[GlParameter]) -> Parameters {
        names
            .iter()
            .map(|parameter| (*parameter, self.state.get(*parameter)))
            .collect()
    }

    pub(crate) fn reset_parameters(&mut self) {
        let changes = self.state.reset();
        self.apply(changes);
    }

    //===------------------------------------------------------------------===//
    // Programs
    //===------------------------------------------------------------------===//

    pub(crate) fn register_pipeline(&mut self, program: NativeHandle, parameters: Parameters) {
        self.pipelines.insert(program, parameters);
    }

    pub(crate) fn forget_pipeline(&mut self, program: NativeHandle) {
        self.pipelines.remove(&program);
    }

    /// Runs recorded commands right away.
    pub(crate) fn execute(&mut self, stream: &CommandStream) {
        CommandReplayer::new(self).replay(stream);
    }
}

//===----------------------------------------------------------------------===//
// Command execution
//===----------------------------------------------------------------------===//

impl CommandSink for GlBackend {
    fn begin_render_pass(&mut self, cmd: &BeginRenderPass) {
        self.state.push();
        self.set_one(
            GlParameter::FramebufferBinding,
            ParameterValue::Handle(cmd.framebuffer),
        );
        let [x, y, w, h] = cmd.viewport;
        let viewport = if w > 0.0 && h > 0.0 {
            [x as i32, y as i32, w as i32, h as i32]
        } else {
            [0, 0, cmd.width as i32, cmd.height as i32]
        };
        self.set_one(GlParameter::Viewport, ParameterValue::Int4(viewport));
        self.set_one(GlParameter::DepthRange, ParameterValue::Float2(cmd.depth_range));

        let flags = ClearFlags::from_bits_truncate(cmd.clear);
        if flags.is_empty() {
            return;
        }
        if flags.contains(ClearFlags::COLOR) {
            self.set_one(GlParameter::ClearColor, ParameterValue::Float4(cmd.clear_color));
            self.set_one(GlParameter::ColorMask, ParameterValue::Bool4([true; 4]));
        }
        if flags.contains(ClearFlags::DEPTH) {
            self.set_one(GlParameter::ClearDepth, ParameterValue::Float(cmd.clear_depth));
            self.set_one(GlParameter::DepthMask, ParameterValue::Bool(true));
        }
        if flags.contains(ClearFlags::STENCIL) {
            self.set_one(GlParameter::ClearStencil, ParameterValue::Int(cmd.clear_stencil as i32));
        }
        self.gl
            .clear(flags, cmd.clear_color, cmd.clear_depth, cmd.clear_stencil);
    }

    fn end_render_pass(&mut self, _: &EndRenderPass) {
        self.pass = PassState::default();
        if let Err(err) = self.pop_state() {
            log::error!("render pass ended with unbalanced state: {err}");
        }
    }

    fn set_pipeline(&mut self, cmd: &SetPipeline) {
        self.pass.program = cmd.pipeline;
        self.pass.topology = PrimitiveTopology::from_u32(cmd.topology).unwrap_or_default();
        self.set_one(GlParameter::Program, ParameterValue::Handle(cmd.pipeline));
        if let Some(parameters) = self.pipelines.get(&cmd.pipeline).cloned() {
            self.set_parameters(&parameters);
        }
    }

    fn set_vertex_array(&mut self, cmd: &SetVertexArray) {
        self.set_one(
            GlParameter::VertexArrayBinding,
            ParameterValue::Handle(cmd.vertex_array),
        );
    }

    fn set_binding(&mut self, cmd: &SetBinding) {
        match BindingKind::from_u32(cmd.kind) {
            Some(kind) => self
                .gl
                .bind_resource(self.pass.program, cmd.slot, kind, cmd.resource),
            None => log::warn!("ignoring binding with unknown kind {}", cmd.kind),
        }
    }

    fn set_viewport(&mut self, cmd: &SetViewport) {
        let [x, y, w, h] = cmd.rect;
        self.set_one(
            GlParameter::Viewport,
            ParameterValue::Int4([x as i32, y as i32, w as i32, h as i32]),
        );
        self.set_one(GlParameter::DepthRange, ParameterValue::Float2(cmd.depth_range));
    }

    fn set_scissor(&mut self, cmd: &SetScissor) {
        let [x, y, w, h] = cmd.rect;
        self.set_one(GlParameter::ScissorTest, ParameterValue::Bool(true));
        self.set_one(
            GlParameter::Scissor,
            ParameterValue::Int4([x as i32, y as i32, w as i32, h as i32]),
        );
    }

    fn draw(&mut self, cmd: &Draw) {
        self.gl.draw(self.pass.topology, cmd);
    }

    fn draw_indexed(&mut self, cmd: &DrawIndexed) {
        self.gl.draw_indexed(self.pass.topology, cmd);
    }

    fn begin_compute_pass(&mut self, _: &BeginComputePass) {
        log::warn!("compute pass ignored by stateful backend");
    }

    fn end_compute_pass(&mut self, _: &EndComputePass) {}

    fn set_compute_pipeline(&mut self, _: &SetComputePipeline) {}

    fn dispatch(&mut self, _: &Dispatch) {
        log::warn!("dispatch ignored by stateful backend");
    }

    fn copy_buffer_to_buffer(&mut self, cmd: &CopyBufferToBuffer) {
        self.gl.copy_buffer(cmd);
    }

    fn copy_buffer_to_texture(&mut self, cmd: &CopyBufferToTexture) {
        self.gl.copy_buffer_to_texture(cmd);
    }

    fn copy_texture_to_buffer(&mut self, cmd: &CopyTextureToBuffer) {
        self.gl.copy_texture_to_buffer(cmd);
    }

    fn copy_texture_to_texture(&mut self, cmd: &CopyTextureToTexture) {
        self.gl.copy_texture(cmd);
    }

    fn write_timestamp(&mut self, cmd: &WriteTimestamp) {
        self.gl.query_counter(cmd.query_set, cmd.index);
    }

    fn resolve_query_set(&mut self, cmd: &ResolveQuerySet) {
        self.gl.resolve_queries(
            cmd.query_set,
            cmd.first_query,
            cmd.query_count,
            cmd.destination,
            cmd.destination_offset,
        );
    }

    fn push_debug_group(&mut self, label: &str) {
        self.gl.debug_group(Some(label));
    }

    fn pop_debug_group(&mut self) {
        self.gl.debug_group(None);
    }

    fn insert_debug_marker(&mut self, label: &str) {
        log::trace!("marker: {label}");
    }
}
