use std::fmt;

use crate::native::NativeHandle;

/// Raw enum values understood by stateful native contexts.
pub mod gl {
    pub const ZERO: u32 = 0;
    pub const ONE: u32 = 1;
    pub const SRC_ALPHA: u32 = 0x0302;
    pub const ONE_MINUS_SRC_ALPHA: u32 = 0x0303;
    pub const NEVER: u32 = 0x0200;
    pub const LESS: u32 = 0x0201;
    pub const EQUAL: u32 = 0x0202;
    pub const LEQUAL: u32 = 0x0203;
    pub const GREATER: u32 = 0x0204;
    pub const NOTEQUAL: u32 = 0x0205;
    pub const GEQUAL: u32 = 0x0206;
    pub const ALWAYS: u32 = 0x0207;
    pub const FRONT: u32 = 0x0404;
    pub const BACK: u32 = 0x0405;
    pub const CW: u32 = 0x0900;
    pub const CCW: u32 = 0x0901;
    pub const FUNC_ADD: u32 = 0x8006;
    pub const FUNC_SUBTRACT: u32 = 0x800A;
}

/// Global context parameters the state tracker knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlParameter {
    FramebufferBinding,
    Program,
    VertexArrayBinding,
    Viewport,
    DepthRange,
    ScissorTest,
    Scissor,
    Blend,
    BlendColor,
    BlendEquation,
    /// `[src_rgb, dst_rgb, src_alpha, dst_alpha]`
    BlendFunc,
    CullFace,
    CullFaceMode,
    FrontFace,
    DepthTest,
    DepthFunc,
    DepthMask,
    ColorMask,
    ClearColor,
    ClearDepth,
    ClearStencil,
    StencilTest,
    /// `[func, ref, mask]`
    StencilFunc,
    StencilMask,
    PolygonOffsetFill,
    /// `[factor, units]`
    PolygonOffset,
    LineWidth,
    RasterizerDiscard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Int(i32),
    Uint(u32),
    Float(f32),
    Handle(NativeHandle),
    Enum(u32),
    Float2([f32; 2]),
    Int4([i32; 4]),
    Uint3([u32; 3]),
    Uint4([u32; 4]),
    Float4([f32; 4]),
    Bool4([bool; 4]),
}

impl GlParameter {
    pub const ALL: [GlParameter; 28] = [
        GlParameter::FramebufferBinding,
        GlParameter::Program,
        GlParameter::VertexArrayBinding,
        GlParameter::Viewport,
        GlParameter::DepthRange,
        GlParameter::ScissorTest,
        GlParameter::Scissor,
        GlParameter::Blend,
        GlParameter::BlendColor,
        GlParameter::BlendEquation,
        GlParameter::BlendFunc,
        GlParameter::CullFace,
        GlParameter::CullFaceMode,
        GlParameter::FrontFace,
        GlParameter::DepthTest,
        GlParameter::DepthFunc,
        GlParameter::DepthMask,
        GlParameter::ColorMask,
        GlParameter::ClearColor,
        GlParameter::ClearDepth,
        GlParameter::ClearStencil,
        GlParameter::StencilTest,
        GlParameter::StencilFunc,
        GlParameter::StencilMask,
        GlParameter::PolygonOffsetFill,
        GlParameter::PolygonOffset,
        GlParameter::LineWidth,
        GlParameter::RasterizerDiscard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GlParameter::FramebufferBinding => "framebuffer-binding",
            GlParameter::Program => "program",
            GlParameter::VertexArrayBinding => "vertex-array-binding",
            GlParameter::Viewport => "viewport",
            GlParameter::DepthRange => "depth-range",
            GlParameter::ScissorTest => "scissor-test",
            GlParameter::Scissor => "scissor",
            GlParameter::Blend => "blend",
            GlParameter::BlendColor => "blend-color",
            GlParameter::BlendEquation => "blend-equation",
            GlParameter::BlendFunc => "blend-func",
            GlParameter::CullFace => "cull-face",
            GlParameter::CullFaceMode => "cull-face-mode",
            GlParameter::FrontFace => "front-face",
            GlParameter::DepthTest => "depth-test",
            GlParameter::DepthFunc => "depth-func",
            GlParameter::DepthMask => "depth-mask",
            GlParameter::ColorMask => "color-mask",
            GlParameter::ClearColor => "clear-color",
            GlParameter::ClearDepth => "clear-depth",
            GlParameter::ClearStencil => "clear-stencil",
            GlParameter::StencilTest => "stencil-test",
            GlParameter::StencilFunc => "stencil-func",
            GlParameter::StencilMask => "stencil-mask",
            GlParameter::PolygonOffsetFill => "polygon-offset-fill",
            GlParameter::PolygonOffset => "polygon-offset",
            GlParameter::LineWidth => "line-width",
            GlParameter::RasterizerDiscard => "rasterizer-discard",
        }
    }

    /// Value of the parameter in a freshly created context.
    pub fn default_value(&self) -> ParameterValue {
        use ParameterValue::*;
        match self {
            GlParameter::FramebufferBinding
            | GlParameter::Program
            | GlParameter::VertexArrayBinding => Handle(NativeHandle::NULL),
            GlParameter::Viewport | GlParameter::Scissor => Int4([0, 0, 0, 0]),
            GlParameter::DepthRange => Float2([0.0, 1.0]),
            GlParameter::ScissorTest
            | GlParameter::Blend
            | GlParameter::CullFace
            | GlParameter::DepthTest
            | GlParameter::StencilTest
            | GlParameter::PolygonOffsetFill
            | GlParameter::RasterizerDiscard => Bool(false),
            GlParameter::BlendColor | GlParameter::ClearColor => Float4([0.0; 4]),
            GlParameter::BlendEquation => Enum(gl::FUNC_ADD),
            GlParameter::BlendFunc => Uint4([gl::ONE, gl::ZERO, gl::ONE, gl::ZERO]),
            GlParameter::CullFaceMode => Enum(gl::BACK),
            GlParameter::FrontFace => Enum(gl::CCW),
            GlParameter::DepthFunc => Enum(gl::LESS),
            GlParameter::DepthMask => Bool(true),
            GlParameter::ColorMask => Bool4([true; 4]),
            GlParameter::ClearDepth => Float(1.0),
            GlParameter::ClearStencil => Int(0),
            GlParameter::StencilFunc => Uint3([gl::ALWAYS, 0, u32::MAX]),
            GlParameter::StencilMask => Uint(u32::MAX),
            GlParameter::PolygonOffset => Float2([0.0, 0.0]),
            GlParameter::LineWidth => Float(1.0),
        }
    }
}

impl fmt::Display for GlParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One native write the tracker decided is necessary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterChange {
    pub parameter: GlParameter,
    pub value: ParameterValue,
}

/// An ordered set of parameter values, as passed to `set_parameters`.
pub type Parameters = Vec<(GlParameter, ParameterValue)>;
