use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use super::buffer::{Buffer, BufferUsage};
use super::sampler::{CompareFunction, Sampler};
use super::shader::{Shader, ShaderStage};
use super::texture::Texture;
use super::{impl_resource, Resource, ResourceCore, ResourceKind};
use crate::caps::{TextureFormat, VertexFormat};
use crate::driver::ir::{BindingKind, SetBinding};
use crate::driver::params::{gl, GlParameter, ParameterValue, Parameters};
use crate::error::{GpuError, Result};
use crate::gpu::Device;
use crate::native::{NativeHandle, ObjectDescriptor};

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum PrimitiveTopology {
    PointList = 0,
    LineList = 1,
    LineStrip = 2,
    #[default]
    TriangleList = 3,
    TriangleStrip = 4,
}

impl PrimitiveTopology {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(PrimitiveTopology::PointList),
            1 => Some(PrimitiveTopology::LineList),
            2 => Some(PrimitiveTopology::LineStrip),
            3 => Some(PrimitiveTopology::TriangleList),
            4 => Some(PrimitiveTopology::TriangleStrip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveTopology::PointList => "point-list",
            PrimitiveTopology::LineList => "line-list",
            PrimitiveTopology::LineStrip => "line-strip",
            PrimitiveTopology::TriangleList => "triangle-list",
            PrimitiveTopology::TriangleStrip => "triangle-strip",
        }
    }
}

//===----------------------------------------------------------------------===//
// Fixed-function parameters
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

impl BlendFactor {
    fn gl(&self) -> u32 {
        match self {
            BlendFactor::Zero => gl::ZERO,
            BlendFactor::One => gl::ONE,
            BlendFactor::SrcAlpha => gl::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl BlendComponent {
    /// Premultiplied-style "source over".
    pub const ALPHA_BLENDING: BlendComponent = BlendComponent {
        src_factor: BlendFactor::SrcAlpha,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    };
}

/// Render state baked into a pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct PipelineParameters {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    /// `None` disables the depth test.
    pub depth_compare: Option<CompareFunction>,
    pub depth_write_enabled: bool,
    /// Color and alpha blending; `None` disables blending.
    pub blend: Option<(BlendComponent, BlendComponent)>,
    pub color_write_mask: [bool; 4],
    /// `[factor, units]`; `None` disables polygon offset.
    pub depth_bias: Option<[f32; 2]>,
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            depth_compare: None,
            depth_write_enabled: true,
            blend: None,
            color_write_mask: [true; 4],
            depth_bias: None,
        }
    }
}

impl PipelineParameters {
    /// The global parameter values that express these settings.
    pub fn to_gl(&self) -> Parameters {
        use ParameterValue::*;
        let mut values = vec![
            (GlParameter::CullFace, Bool(self.cull_mode != CullMode::None)),
            (
                GlParameter::FrontFace,
                Enum(match self.front_face {
                    FrontFace::Ccw => gl::CCW,
                    FrontFace::Cw => gl::CW,
                }),
            ),
            (GlParameter::DepthTest, Bool(self.depth_compare.is_some())),
            (GlParameter::DepthMask, Bool(self.depth_write_enabled)),
            (GlParameter::Blend, Bool(self.blend.is_some())),
            (GlParameter::ColorMask, Bool4(self.color_write_mask)),
            (GlParameter::PolygonOffsetFill, Bool(self.depth_bias.is_some())),
        ];
        match self.cull_mode {
            CullMode::Front => values.push((GlParameter::CullFaceMode, Enum(gl::FRONT))),
            CullMode::Back => values.push((GlParameter::CullFaceMode, Enum(gl::BACK))),
            CullMode::None => {}
        }
        if let Some(compare) = self.depth_compare {
            values.push((GlParameter::DepthFunc, Enum(compare.gl())));
        }
        if let Some((color, alpha)) = self.blend {
            values.push((
                GlParameter::BlendFunc,
                Uint4([
                    color.src_factor.gl(),
                    color.dst_factor.gl(),
                    alpha.src_factor.gl(),
                    alpha.dst_factor.gl(),
                ]),
            ));
            let equation = match color.operation {
                BlendOperation::Add => gl::FUNC_ADD,
                BlendOperation::Subtract => gl::FUNC_SUBTRACT,
            };
            values.push((GlParameter::BlendEquation, Enum(equation)));
        }
        if let Some(bias) = self.depth_bias {
            values.push((GlParameter::PolygonOffset, Float2(bias)));
        }
        values
    }
}

//===----------------------------------------------------------------------===//
// Layouts
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum StepMode {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct AttributeDeclaration {
    pub name: String,
    pub location: u32,
    pub format: VertexFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDeclaration {
    pub name: String,
    pub slot: u32,
    pub kind: BindingKind,
}

/// Attributes and bindings a shader pair expects, as reported by the shader
/// tooling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderLayout {
    pub attributes: Vec<AttributeDeclaration>,
    pub bindings: Vec<BindingDeclaration>,
}

/// How one vertex buffer feeds attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct BufferLayout {
    pub name: String,
    pub byte_stride: u32,
    pub step_mode: StepMode,
    pub attributes: Vec<AttributeDeclaration>,
}

fn validate_layouts(
    device: &Device,
    shader: &ShaderLayout,
    buffers: &[BufferLayout],
) -> Result<()> {
    let limits = device.limits();
    if buffers.len() > limits.max_vertex_buffers as usize {
        return Err(GpuError::invalid(format!(
            "{} vertex buffers exceed max-vertex-buffers {}",
            buffers.len(),
            limits.max_vertex_buffers
        )));
    }
    let attributes = shader
        .attributes
        .iter()
        .chain(buffers.iter().flat_map(|layout| layout.attributes.iter()));
    for attribute in attributes {
        if attribute.location >= limits.max_vertex_attributes {
            return Err(GpuError::invalid(format!(
                "attribute \"{}\" uses location {}, limit is {}",
                attribute.name, attribute.location, limits.max_vertex_attributes
            )));
        }
        if !device.is_vertex_format_supported(attribute.format) {
            return Err(GpuError::invalid(format!(
                "vertex format {} is not supported on this device",
                attribute.format.as_str()
            )));
        }
    }
    // Two buffers must never feed the same location.
    let mut locations = HashSet::new();
    for attribute in buffers.iter().flat_map(|layout| layout.attributes.iter()) {
        if !locations.insert(attribute.location) {
            return Err(GpuError::invalid(format!(
                "location {} is fed by more than one buffer attribute",
                attribute.location
            )));
        }
    }
    let mut slots = HashSet::new();
    for binding in &shader.bindings {
        if !slots.insert(binding.slot) {
            return Err(GpuError::invalid(format!(
                "binding slot {} declared twice",
                binding.slot
            )));
        }
    }
    Ok(())
}

//===----------------------------------------------------------------------===//
// Bindings
//===----------------------------------------------------------------------===//

/// A resource bound to a named shader slot.
#[derive(Debug, Clone)]
pub enum Binding {
    Buffer(Arc<Buffer>),
    Texture(Arc<Texture>),
    Sampler(Arc<Sampler>),
}

impl Binding {
    fn handle(&self) -> Result<NativeHandle> {
        match self {
            Binding::Buffer(buffer) => buffer.core().handle(),
            Binding::Texture(texture) => texture.core().handle(),
            Binding::Sampler(sampler) => sampler.core().handle(),
        }
    }

    fn matches(&self, kind: BindingKind) -> bool {
        match (self, kind) {
            (Binding::Buffer(buffer), BindingKind::UniformBuffer) => {
                buffer.usage().contains(BufferUsage::UNIFORM)
            }
            (Binding::Buffer(buffer), BindingKind::StorageBuffer) => {
                buffer.usage().contains(BufferUsage::STORAGE)
            }
            (Binding::Texture(_), BindingKind::Texture) => true,
            (Binding::Sampler(_), BindingKind::Sampler) => true,
            _ => false,
        }
    }
}

/// Name-to-slot resolution plus the currently bound resources.
struct BindingTable {
    label: String,
    declarations: Vec<BindingDeclaration>,
    bound: Mutex<BTreeMap<u32, (BindingKind, Binding)>>,
}

impl BindingTable {
    fn new(label: &str, declarations: Vec<BindingDeclaration>) -> Self {
        Self {
            label: label.to_string(),
            declarations,
            bound: Mutex::new(BTreeMap::new()),
        }
    }

    fn set<S: AsRef<str>>(&self, bindings: impl IntoIterator<Item = (S, Binding)>) -> Result<()> {
        let mut resolved = Vec::new();
        for (name, binding) in bindings {
            let name = name.as_ref();
            let Some(declaration) = self.declarations.iter().find(|d| d.name == name) else {
                log::warn!("{}: unknown binding \"{name}\" ignored", self.label);
                continue;
            };
            if !binding.matches(declaration.kind) {
                return Err(GpuError::invalid(format!(
                    "binding \"{name}\" expects {:?}",
                    declaration.kind
                )));
            }
            binding.handle()?;
            resolved.push((declaration.slot, (declaration.kind, binding)));
        }
        self.bound.lock().extend(resolved);
        Ok(())
    }

    fn commands(&self) -> Result<Vec<SetBinding>> {
        self.bound
            .lock()
            .iter()
            .map(|(slot, (kind, binding))| {
                Ok(SetBinding {
                    resource: binding.handle()?,
                    slot: *slot,
                    kind: *kind as u32,
                })
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.bound.lock().len()
    }
}

fn check_shader(device: &Device, shader: &Shader, stage: ShaderStage) -> Result<NativeHandle> {
    if shader.stage() != stage {
        return Err(GpuError::invalid(format!(
            "shader \"{}\" is a {} shader, expected {}",
            shader.label(),
            shader.stage().as_str(),
            stage.as_str()
        )));
    }
    if shader.device() != device {
        return Err(GpuError::invalid(format!(
            "shader \"{}\" belongs to another device",
            shader.label()
        )));
    }
    let handle = shader.core().handle()?;
    // Already reported when compilation finished.
    if let Some(err) = shader.known_failure() {
        return Err(err);
    }
    Ok(handle)
}

//===----------------------------------------------------------------------===//
// Render pipeline
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone)]
pub struct RenderPipelineProps {
    pub label: Option<String>,
    pub vs: Arc<Shader>,
    pub fs: Option<Arc<Shader>>,
    pub topology: PrimitiveTopology,
    pub shader_layout: ShaderLayout,
    pub buffer_layout: Vec<BufferLayout>,
    pub parameters: PipelineParameters,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    /// Initial bindings, by name.
    pub bindings: Vec<(String, Binding)>,
}

impl RenderPipelineProps {
    pub fn new(vs: Arc<Shader>, fs: Option<Arc<Shader>>) -> Self {
        Self {
            label: None,
            vs,
            fs,
            topology: PrimitiveTopology::TriangleList,
            shader_layout: ShaderLayout::default(),
            buffer_layout: Vec::new(),
            parameters: PipelineParameters::default(),
            color_formats: vec![TextureFormat::Rgba8Unorm],
            depth_format: None,
            bindings: Vec::new(),
        }
    }
}

/// Shaders linked with fixed-function state for drawing.
pub struct RenderPipeline {
    core: ResourceCore,
    vs: Arc<Shader>,
    fs: Option<Arc<Shader>>,
    topology: PrimitiveTopology,
    parameters: PipelineParameters,
    shader_layout: ShaderLayout,
    buffer_layout: Vec<BufferLayout>,
    bindings: BindingTable,
}

impl_resource!(RenderPipeline);

impl RenderPipeline {
    pub(crate) fn new(device: &Device, props: &RenderPipelineProps) -> Result<Self> {
        let vs = check_shader(device, &props.vs, ShaderStage::Vertex)?;
        let fs = match &props.fs {
            Some(fs) => check_shader(device, fs, ShaderStage::Fragment)?,
            None => NativeHandle::NULL,
        };
        for format in &props.color_formats {
            if format.is_depth_stencil() || !device.is_texture_format_renderable(*format) {
                return Err(GpuError::invalid(format!(
                    "{format} is not a renderable color format"
                )));
            }
        }
        if let Some(format) = props.depth_format {
            if !format.is_depth_stencil() {
                return Err(GpuError::invalid(format!("{format} is not a depth format")));
            }
        }
        validate_layouts(device, &props.shader_layout, &props.buffer_layout)?;

        let linked = device.with_backend(|backend| {
            let handle = backend.create_object(&ObjectDescriptor::RenderPipeline {
                vs,
                fs,
                topology: props.topology,
                color_formats: &props.color_formats,
                depth_format: props.depth_format,
            })?;
            match backend.link_program(handle) {
                Ok(()) => {
                    backend.register_pipeline(handle, props.parameters.to_gl());
                    Ok(Ok(handle))
                }
                Err(log) => {
                    backend.delete_object(ResourceKind::RenderPipeline, handle);
                    Ok(Err(log))
                }
            }
        })?;
        let label = props.label.clone().unwrap_or_else(|| "render-pipeline".to_string());
        let handle = match linked {
            Ok(handle) => handle,
            Err(log) => {
                let err = GpuError::Compilation { label, log };
                device.report_error(&err);
                return Err(err);
            }
        };

        let core = ResourceCore::new(
            device,
            ResourceKind::RenderPipeline,
            props.label.as_deref(),
            handle,
        );
        let pipeline = Self {
            bindings: BindingTable::new(core.label(), props.shader_layout.bindings.clone()),
            core,
            vs: props.vs.clone(),
            fs: props.fs.clone(),
            topology: props.topology,
            parameters: props.parameters,
            shader_layout: props.shader_layout.clone(),
            buffer_layout: props.buffer_layout.clone(),
        };
        pipeline.set_bindings(props.bindings.iter().map(|(name, b)| (name.as_str(), b.clone())))?;
        Ok(pipeline)
    }

    pub fn vs(&self) -> &Arc<Shader> {
        &self.vs
    }

    pub fn fs(&self) -> Option<&Arc<Shader>> {
        self.fs.as_ref()
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn parameters(&self) -> &PipelineParameters {
        &self.parameters
    }

    pub fn shader_layout(&self) -> &ShaderLayout {
        &self.shader_layout
    }

    pub fn buffer_layout(&self) -> &[BufferLayout] {
        &self.buffer_layout
    }

    /// Binds resources by name. Names the layout does not declare are
    /// skipped with a warning.
    pub fn set_bindings<S: AsRef<str>>(
        &self,
        bindings: impl IntoIterator<Item = (S, Binding)>,
    ) -> Result<()> {
        self.core.handle()?;
        self.bindings.set(bindings)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub(crate) fn binding_commands(&self) -> Result<Vec<SetBinding>> {
        self.bindings.commands()
    }
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("core", &self.core)
            .field("topology", &self.topology)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

//===----------------------------------------------------------------------===//
// Compute pipeline
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone)]
pub struct ComputePipelineProps {
    pub label: Option<String>,
    pub shader: Arc<Shader>,
    /// Defaults to the shader's entry point.
    pub entry_point: Option<String>,
    pub shader_layout: ShaderLayout,
    pub bindings: Vec<(String, Binding)>,
}

impl ComputePipelineProps {
    pub fn new(shader: Arc<Shader>) -> Self {
        Self {
            label: None,
            shader,
            entry_point: None,
            shader_layout: ShaderLayout::default(),
            bindings: Vec::new(),
        }
    }
}

pub struct ComputePipeline {
    core: ResourceCore,
    shader: Arc<Shader>,
    bindings: BindingTable,
}

impl_resource!(ComputePipeline);

impl ComputePipeline {
    pub(crate) fn new(device: &Device, props: &ComputePipelineProps) -> Result<Self> {
        let shader = check_shader(device, &props.shader, ShaderStage::Compute)?;
        let entry_point = props
            .entry_point
            .as_deref()
            .unwrap_or(props.shader.entry_point());
        validate_layouts(device, &props.shader_layout, &[])?;
        let handle = device.with_backend(|backend| {
            backend.create_object(&ObjectDescriptor::ComputePipeline { shader, entry_point })
        })?;
        let core = ResourceCore::new(
            device,
            ResourceKind::ComputePipeline,
            props.label.as_deref(),
            handle,
        );
        let pipeline = Self {
            bindings: BindingTable::new(core.label(), props.shader_layout.bindings.clone()),
            core,
            shader: props.shader.clone(),
        };
        pipeline.set_bindings(props.bindings.iter().map(|(name, b)| (name.as_str(), b.clone())))?;
        Ok(pipeline)
    }

    pub fn shader(&self) -> &Arc<Shader> {
        &self.shader
    }

    pub fn set_bindings<S: AsRef<str>>(
        &self,
        bindings: impl IntoIterator<Item = (S, Binding)>,
    ) -> Result<()> {
        self.core.handle()?;
        self.bindings.set(bindings)
    }

    pub(crate) fn binding_commands(&self) -> Result<Vec<SetBinding>> {
        self.bindings.commands()
    }
}

impl std::fmt::Debug for ComputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputePipeline")
            .field("core", &self.core)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::CompareFunction;

    #[test]
    fn default_parameters_match_context_defaults() {
        for (parameter, value) in PipelineParameters::default().to_gl() {
            assert_eq!(value, parameter.default_value(), "{parameter}");
        }
    }

    #[test]
    fn depth_and_blend_map_to_parameters() {
        let parameters = PipelineParameters {
            depth_compare: Some(CompareFunction::LessEqual),
            blend: Some((BlendComponent::ALPHA_BLENDING, BlendComponent::ALPHA_BLENDING)),
            cull_mode: CullMode::Back,
            ..Default::default()
        };
        let values = parameters.to_gl();
        let get = |p: GlParameter| values.iter().find(|(q, _)| *q == p).map(|(_, v)| *v);
        assert_eq!(get(GlParameter::DepthTest), Some(ParameterValue::Bool(true)));
        assert_eq!(get(GlParameter::DepthFunc), Some(ParameterValue::Enum(gl::LEQUAL)));
        assert_eq!(get(GlParameter::CullFaceMode), Some(ParameterValue::Enum(gl::BACK)));
        assert_eq!(
            get(GlParameter::BlendFunc),
            Some(ParameterValue::Uint4([
                gl::SRC_ALPHA,
                gl::ONE_MINUS_SRC_ALPHA,
                gl::SRC_ALPHA,
                gl::ONE_MINUS_SRC_ALPHA
            ]))
        );
    }

    #[test]
    fn topology_round_trips_through_u32() {
        for topology in [
            PrimitiveTopology::PointList,
            PrimitiveTopology::LineStrip,
            PrimitiveTopology::TriangleStrip,
        ] {
            assert_eq!(PrimitiveTopology::from_u32(topology as u32), Some(topology));
        }
        assert_eq!(PrimitiveTopology::from_u32(9), None);
    }
}
