use std::fmt;
use std::str::FromStr;

#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use super::features::{DeviceFeature, DeviceFeatures};
use crate::error::GpuError;

//===----------------------------------------------------------------------===//
// Texture formats
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum TextureFormat {
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba8Snorm,
    Rgba8Uint,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgb10a2Unorm,
    Rg11b10Ufloat,
    Rgb9e5Ufloat,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    Rgba32Uint,
    Stencil8,
    Depth16Unorm,
    Depth24Plus,
    Depth24PlusStencil8,
    Depth32Float,
    Depth32FloatStencil8,
    Bc1RgbaUnorm,
    Bc3RgbaUnorm,
    Bc7RgbaUnorm,
    Etc2Rgb8Unorm,
    Etc2Rgba8Unorm,
    Astc4x4Unorm,
}

/// Static description of a texture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub components: u8,
    pub bytes_per_block: u32,
    /// Texel width and height of one block; 1 for uncompressed formats.
    pub block_size: u32,
    pub depth: bool,
    pub stencil: bool,
    pub integer: bool,
    pub compressed: bool,
    /// Format cannot be a render target regardless of features.
    pub never_renderable: bool,
    pub required_feature: Option<DeviceFeature>,
    pub render_feature: Option<DeviceFeature>,
    pub filter_feature: Option<DeviceFeature>,
}

impl FormatInfo {
    const fn color(components: u8, bytes: u32) -> Self {
        Self {
            components,
            bytes_per_block: bytes,
            block_size: 1,
            depth: false,
            stencil: false,
            integer: false,
            compressed: false,
            never_renderable: false,
            required_feature: None,
            render_feature: None,
            filter_feature: None,
        }
    }

    const fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    const fn not_renderable(mut self) -> Self {
        self.never_renderable = true;
        self
    }

    const fn renders_with(mut self, feature: DeviceFeature) -> Self {
        self.render_feature = Some(feature);
        self
    }

    const fn filters_with(mut self, feature: DeviceFeature) -> Self {
        self.filter_feature = Some(feature);
        self
    }

    const fn depth_stencil(bytes: u32, depth: bool, stencil: bool) -> Self {
        let mut info = Self::color(if depth && stencil { 2 } else { 1 }, bytes);
        info.depth = depth;
        info.stencil = stencil;
        info
    }

    const fn compressed(bytes: u32, feature: DeviceFeature) -> Self {
        let mut info = Self::color(4, bytes);
        info.block_size = 4;
        info.compressed = true;
        info.required_feature = Some(feature);
        info
    }
}

impl TextureFormat {
    pub const ALL: [TextureFormat; 34] = [
        TextureFormat::R8Unorm,
        TextureFormat::R8Snorm,
        TextureFormat::R8Uint,
        TextureFormat::R8Sint,
        TextureFormat::Rg8Unorm,
        TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Rgba8Snorm,
        TextureFormat::Rgba8Uint,
        TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Rgb10a2Unorm,
        TextureFormat::Rg11b10Ufloat,
        TextureFormat::Rgb9e5Ufloat,
        TextureFormat::R16Float,
        TextureFormat::Rg16Float,
        TextureFormat::Rgba16Float,
        TextureFormat::R32Float,
        TextureFormat::Rg32Float,
        TextureFormat::Rgba32Float,
        TextureFormat::R32Uint,
        TextureFormat::Rgba32Uint,
        TextureFormat::Stencil8,
        TextureFormat::Depth16Unorm,
        TextureFormat::Depth24Plus,
        TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32Float,
        TextureFormat::Depth32FloatStencil8,
        TextureFormat::Bc1RgbaUnorm,
        TextureFormat::Bc3RgbaUnorm,
        TextureFormat::Bc7RgbaUnorm,
        TextureFormat::Etc2Rgb8Unorm,
        TextureFormat::Etc2Rgba8Unorm,
        TextureFormat::Astc4x4Unorm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextureFormat::R8Unorm => "r8unorm",
            TextureFormat::R8Snorm => "r8snorm",
            TextureFormat::R8Uint => "r8uint",
            TextureFormat::R8Sint => "r8sint",
            TextureFormat::Rg8Unorm => "rg8unorm",
            TextureFormat::Rgba8Unorm => "rgba8unorm",
            TextureFormat::Rgba8UnormSrgb => "rgba8unorm-srgb",
            TextureFormat::Rgba8Snorm => "rgba8snorm",
            TextureFormat::Rgba8Uint => "rgba8uint",
            TextureFormat::Bgra8Unorm => "bgra8unorm",
            TextureFormat::Bgra8UnormSrgb => "bgra8unorm-srgb",
            TextureFormat::Rgb10a2Unorm => "rgb10a2unorm",
            TextureFormat::Rg11b10Ufloat => "rg11b10ufloat",
            TextureFormat::Rgb9e5Ufloat => "rgb9e5ufloat",
            TextureFormat::R16Float => "r16float",
            TextureFormat::Rg16Float => "rg16float",
            TextureFormat::Rgba16Float => "rgba16float",
            TextureFormat::R32Float => "r32float",
            TextureFormat::Rg32Float => "rg32float",
            TextureFormat::Rgba32Float => "rgba32float",
            TextureFormat::R32Uint => "r32uint",
            TextureFormat::Rgba32Uint => "rgba32uint",
            TextureFormat::Stencil8 => "stencil8",
            TextureFormat::Depth16Unorm => "depth16unorm",
            TextureFormat::Depth24Plus => "depth24plus",
            TextureFormat::Depth24PlusStencil8 => "depth24plus-stencil8",
            TextureFormat::Depth32Float => "depth32float",
            TextureFormat::Depth32FloatStencil8 => "depth32float-stencil8",
            TextureFormat::Bc1RgbaUnorm => "bc1-rgba-unorm",
            TextureFormat::Bc3RgbaUnorm => "bc3-rgba-unorm",
            TextureFormat::Bc7RgbaUnorm => "bc7-rgba-unorm",
            TextureFormat::Etc2Rgb8Unorm => "etc2-rgb8unorm",
            TextureFormat::Etc2Rgba8Unorm => "etc2-rgba8unorm",
            TextureFormat::Astc4x4Unorm => "astc-4x4-unorm",
        }
    }

    pub fn info(&self) -> FormatInfo {
        use DeviceFeature::*;
        match self {
            TextureFormat::R8Unorm => FormatInfo::color(1, 1),
            TextureFormat::R8Snorm => FormatInfo::color(1, 1).not_renderable(),
            TextureFormat::R8Uint | TextureFormat::R8Sint => FormatInfo::color(1, 1).integer(),
            TextureFormat::Rg8Unorm => FormatInfo::color(2, 2),
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => FormatInfo::color(4, 4),
            TextureFormat::Rgba8Snorm => FormatInfo::color(4, 4).not_renderable(),
            TextureFormat::Rgba8Uint => FormatInfo::color(4, 4).integer(),
            TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => FormatInfo::color(4, 4),
            TextureFormat::Rgb10a2Unorm => FormatInfo::color(4, 4),
            TextureFormat::Rg11b10Ufloat => {
                FormatInfo::color(3, 4).renders_with(Rg11b10ufloatRenderable)
            }
            TextureFormat::Rgb9e5Ufloat => FormatInfo::color(3, 4).not_renderable(),
            TextureFormat::R16Float => FormatInfo::color(1, 2).renders_with(Float16Renderable),
            TextureFormat::Rg16Float => FormatInfo::color(2, 4).renders_with(Float16Renderable),
            TextureFormat::Rgba16Float => FormatInfo::color(4, 8).renders_with(Float16Renderable),
            TextureFormat::R32Float => FormatInfo::color(1, 4)
                .renders_with(Float32Renderable)
                .filters_with(Float32Filterable),
            TextureFormat::Rg32Float => FormatInfo::color(2, 8)
                .renders_with(Float32Renderable)
                .filters_with(Float32Filterable),
            TextureFormat::Rgba32Float => FormatInfo::color(4, 16)
                .renders_with(Float32Renderable)
                .filters_with(Float32Filterable),
            TextureFormat::R32Uint => FormatInfo::color(1, 4).integer(),
            TextureFormat::Rgba32Uint => FormatInfo::color(4, 16).integer(),
            TextureFormat::Stencil8 => FormatInfo::depth_stencil(1, false, true),
            TextureFormat::Depth16Unorm => FormatInfo::depth_stencil(2, true, false),
            TextureFormat::Depth24Plus => FormatInfo::depth_stencil(4, true, false),
            TextureFormat::Depth24PlusStencil8 => FormatInfo::depth_stencil(4, true, true),
            TextureFormat::Depth32Float => FormatInfo::depth_stencil(4, true, false),
            TextureFormat::Depth32FloatStencil8 => {
                let mut info = FormatInfo::depth_stencil(8, true, true);
                info.required_feature = Some(Depth32floatStencil8);
                info
            }
            TextureFormat::Bc1RgbaUnorm => FormatInfo::compressed(8, TextureCompressionBc),
            TextureFormat::Bc3RgbaUnorm | TextureFormat::Bc7RgbaUnorm => {
                FormatInfo::compressed(16, TextureCompressionBc)
            }
            TextureFormat::Etc2Rgb8Unorm => FormatInfo::compressed(8, TextureCompressionEtc2),
            TextureFormat::Etc2Rgba8Unorm => FormatInfo::compressed(16, TextureCompressionEtc2),
            TextureFormat::Astc4x4Unorm => FormatInfo::compressed(16, TextureCompressionAstc),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.info().compressed
    }

    pub fn is_depth_stencil(&self) -> bool {
        let info = self.info();
        info.depth || info.stencil
    }

    /// Bytes needed for a `width` x `height` image, rounded up to whole blocks.
    pub fn image_byte_length(&self, width: u32, height: u32) -> u64 {
        let info = self.info();
        let blocks_x = width.div_ceil(info.block_size) as u64;
        let blocks_y = height.div_ceil(info.block_size) as u64;
        blocks_x * blocks_y * info.bytes_per_block as u64
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextureFormat {
    type Err = GpuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TextureFormat::ALL
            .iter()
            .copied()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| GpuError::invalid(format!("unknown texture format \"{s}\"")))
    }
}

/// True for block-compressed formats. Depends only on the format.
pub fn is_texture_format_compressed(format: TextureFormat) -> bool {
    format.is_compressed()
}

//===----------------------------------------------------------------------===//
// Format capability table
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatCapabilities {
    pub supported: bool,
    pub sampleable: bool,
    pub renderable: bool,
    pub blendable: bool,
    pub filterable: bool,
}

impl FormatCapabilities {
    pub const UNSUPPORTED: FormatCapabilities = FormatCapabilities {
        supported: false,
        sampleable: false,
        renderable: false,
        blendable: false,
        filterable: false,
    };

    pub fn compute(format: TextureFormat, features: &DeviceFeatures) -> Self {
        let info = format.info();
        let has = |feature: Option<DeviceFeature>| feature.map_or(true, |f| features.has(f));
        if !has(info.required_feature) {
            return Self::UNSUPPORTED;
        }
        let renderable = !info.compressed && !info.never_renderable && has(info.render_feature);
        let depth_stencil = info.depth || info.stencil;
        Self {
            supported: true,
            sampleable: true,
            renderable,
            blendable: renderable && !info.integer && !depth_stencil,
            filterable: !info.integer && !(info.stencil && !info.depth) && has(info.filter_feature),
        }
    }
}

/// Per-format capabilities, computed once per device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTable {
    entries: Vec<FormatCapabilities>,
}

impl FormatTable {
    pub fn new(features: &DeviceFeatures) -> Self {
        Self {
            entries: TextureFormat::ALL
                .iter()
                .map(|format| FormatCapabilities::compute(*format, features))
                .collect(),
        }
    }

    pub fn get(&self, format: TextureFormat) -> FormatCapabilities {
        TextureFormat::ALL
            .iter()
            .position(|f| *f == format)
            .and_then(|index| self.entries.get(index).copied())
            .unwrap_or(FormatCapabilities::UNSUPPORTED)
    }

    /// Removes support for a format the backend has no native mapping for.
    pub fn mask(&mut self, format: TextureFormat) {
        if let Some(index) = TextureFormat::ALL.iter().position(|f| *f == format) {
            self.entries[index] = FormatCapabilities::UNSUPPORTED;
        }
    }
}

//===----------------------------------------------------------------------===//
// Vertex formats
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum VertexFormat {
    Uint8x2,
    Uint8x4,
    Unorm8x2,
    Unorm8x4,
    /// Four normalized bytes in BGRA order.
    Unorm8x4Bgra,
    Snorm8x4,
    Uint16x2,
    Uint16x4,
    Float16x2,
    Float16x4,
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
    Sint32x4,
}

impl VertexFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VertexFormat::Uint8x2 => "uint8x2",
            VertexFormat::Uint8x4 => "uint8x4",
            VertexFormat::Unorm8x2 => "unorm8x2",
            VertexFormat::Unorm8x4 => "unorm8x4",
            VertexFormat::Unorm8x4Bgra => "unorm8x4-bgra",
            VertexFormat::Snorm8x4 => "snorm8x4",
            VertexFormat::Uint16x2 => "uint16x2",
            VertexFormat::Uint16x4 => "uint16x4",
            VertexFormat::Float16x2 => "float16x2",
            VertexFormat::Float16x4 => "float16x4",
            VertexFormat::Float32 => "float32",
            VertexFormat::Float32x2 => "float32x2",
            VertexFormat::Float32x3 => "float32x3",
            VertexFormat::Float32x4 => "float32x4",
            VertexFormat::Uint32 => "uint32",
            VertexFormat::Uint32x2 => "uint32x2",
            VertexFormat::Uint32x3 => "uint32x3",
            VertexFormat::Uint32x4 => "uint32x4",
            VertexFormat::Sint32 => "sint32",
            VertexFormat::Sint32x4 => "sint32x4",
        }
    }

    pub fn components(&self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Sint32 => 1,
            VertexFormat::Uint8x2
            | VertexFormat::Unorm8x2
            | VertexFormat::Uint16x2
            | VertexFormat::Float16x2
            | VertexFormat::Float32x2
            | VertexFormat::Uint32x2 => 2,
            VertexFormat::Float32x3 | VertexFormat::Uint32x3 => 3,
            _ => 4,
        }
    }

    pub fn byte_length(&self) -> u32 {
        let component_bytes = match self {
            VertexFormat::Uint8x2
            | VertexFormat::Uint8x4
            | VertexFormat::Unorm8x2
            | VertexFormat::Unorm8x4
            | VertexFormat::Unorm8x4Bgra
            | VertexFormat::Snorm8x4 => 1,
            VertexFormat::Uint16x2
            | VertexFormat::Uint16x4
            | VertexFormat::Float16x2
            | VertexFormat::Float16x4 => 2,
            _ => 4,
        };
        component_bytes * self.components()
    }
}

impl fmt::Display for VertexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_is_a_pure_format_property() {
        assert!(!is_texture_format_compressed(TextureFormat::Rgba8Unorm));
        assert!(is_texture_format_compressed(TextureFormat::Bc3RgbaUnorm));
        assert_eq!(
            "bc3-rgba-unorm".parse::<TextureFormat>().unwrap(),
            TextureFormat::Bc3RgbaUnorm
        );
    }

    #[test]
    fn float32_rendering_requires_feature() {
        let none = DeviceFeatures::default();
        let caps = FormatCapabilities::compute(TextureFormat::Rgba32Float, &none);
        assert!(caps.supported);
        assert!(!caps.renderable);
        assert!(!caps.filterable);

        let float = DeviceFeatures::new(
            [DeviceFeature::Float32Renderable, DeviceFeature::Float32Filterable],
            &[],
        );
        let caps = FormatCapabilities::compute(TextureFormat::Rgba32Float, &float);
        assert!(caps.renderable && caps.blendable && caps.filterable);
    }

    #[test]
    fn compressed_formats_need_feature_and_never_render() {
        let table = FormatTable::new(&DeviceFeatures::default());
        assert!(!table.get(TextureFormat::Bc1RgbaUnorm).supported);

        let bc = DeviceFeatures::new([DeviceFeature::TextureCompressionBc], &[]);
        let caps = FormatCapabilities::compute(TextureFormat::Bc1RgbaUnorm, &bc);
        assert!(caps.supported && caps.sampleable);
        assert!(!caps.renderable);
    }

    #[test]
    fn depth_and_integer_formats_do_not_blend() {
        let table = FormatTable::new(&DeviceFeatures::default());
        let depth = table.get(TextureFormat::Depth24Plus);
        assert!(depth.renderable && !depth.blendable);
        let uint = table.get(TextureFormat::Rgba8Uint);
        assert!(uint.renderable && !uint.blendable && !uint.filterable);
    }

    #[test]
    fn masked_formats_are_unsupported() {
        let mut table = FormatTable::new(&DeviceFeatures::default());
        table.mask(TextureFormat::Bgra8Unorm);
        assert_eq!(table.get(TextureFormat::Bgra8Unorm), FormatCapabilities::UNSUPPORTED);
    }

    #[test]
    fn compressed_byte_length_rounds_to_blocks() {
        assert_eq!(TextureFormat::Bc1RgbaUnorm.image_byte_length(6, 4), 16);
        assert_eq!(TextureFormat::Rgba8Unorm.image_byte_length(2, 2), 16);
    }
}
