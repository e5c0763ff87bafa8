use bitflags::bitflags;
use parking_lot::Mutex;

#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use super::{impl_resource, Resource, ResourceCore, ResourceKind};
use crate::caps::TextureFormat;
use crate::driver::ir::TextureRegion;
use crate::error::{GpuError, Result};
use crate::gpu::Device;
use crate::native::ObjectDescriptor;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize), serde(transparent))]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 0x01;
        const COPY_DST = 0x02;
        const TEXTURE_BINDING = 0x04;
        const STORAGE_BINDING = 0x08;
        const RENDER_ATTACHMENT = 0x10;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D2Array,
    Cube,
    D3,
}

impl TextureDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextureDimension::D1 => "1d",
            TextureDimension::D2 => "2d",
            TextureDimension::D2Array => "2d-array",
            TextureDimension::Cube => "cube",
            TextureDimension::D3 => "3d",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct TextureProps {
    pub label: Option<String>,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// Depth of a 3d texture, or layer count of an array texture. Cube
    /// textures always have six layers.
    pub depth: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub usage: TextureUsage,
    /// Contents of mip level 0.
    pub data: Option<Vec<u8>>,
}

impl Default for TextureProps {
    fn default() -> Self {
        Self {
            label: None,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            sample_count: 1,
            usage: TextureUsage::default(),
            data: None,
        }
    }
}

impl TextureProps {
    pub fn layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::Cube => 6,
            TextureDimension::D2Array | TextureDimension::D3 => self.depth,
            _ => 1,
        }
    }
}

/// Largest usable mip count for a `width` x `height` base level.
pub(crate) fn max_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

fn validate(device: &Device, props: &TextureProps) -> Result<()> {
    let format = props.format;
    let caps = device.format_capabilities(format);
    if !caps.supported {
        return Err(GpuError::invalid(format!(
            "texture format {format} is not supported on this device"
        )));
    }
    if props.width == 0 || props.height == 0 || props.depth == 0 {
        return Err(GpuError::invalid("texture dimensions must be non-zero"));
    }

    let limits = device.limits();
    let (w, h, d) = (props.width, props.height, props.depth);
    let fits = match props.dimension {
        TextureDimension::D1 => w <= limits.max_texture_dimension_1d && h == 1 && d == 1,
        TextureDimension::D2 => {
            w <= limits.max_texture_dimension_2d && h <= limits.max_texture_dimension_2d && d == 1
        }
        TextureDimension::D2Array => {
            w <= limits.max_texture_dimension_2d
                && h <= limits.max_texture_dimension_2d
                && d <= limits.max_texture_array_layers
        }
        TextureDimension::Cube => w == h && w <= limits.max_texture_dimension_2d,
        TextureDimension::D3 => {
            let max = limits.max_texture_dimension_3d;
            w <= max && h <= max && d <= max
        }
    };
    if !fits {
        return Err(GpuError::invalid(format!(
            "{w}x{h}x{d} exceeds the limits of a {} texture",
            props.dimension.as_str()
        )));
    }

    let max_mips = max_mip_levels(w, h);
    if props.mip_levels == 0 || props.mip_levels > max_mips {
        return Err(GpuError::invalid(format!(
            "mip_levels must be in 1..={max_mips} for {w}x{h}, got {}",
            props.mip_levels
        )));
    }

    match props.sample_count {
        1 => {}
        4 => {
            if props.mip_levels != 1 || props.dimension != TextureDimension::D2 {
                return Err(GpuError::invalid(
                    "multisampled textures must be 2d with a single mip level",
                ));
            }
            if !caps.renderable {
                return Err(GpuError::invalid(format!(
                    "format {format} cannot be multisampled"
                )));
            }
        }
        n => {
            return Err(GpuError::invalid(format!(
                "sample_count must be 1 or 4, got {n}"
            )))
        }
    }

    let block = format.info().block_size;
    if format.is_compressed() && (w % block != 0 || h % block != 0) {
        return Err(GpuError::invalid(format!(
            "compressed format {format} needs dimensions that are multiples of {block}"
        )));
    }
    if props.usage.contains(TextureUsage::RENDER_ATTACHMENT) && !caps.renderable {
        return Err(GpuError::invalid(format!(
            "format {format} is not renderable on this device"
        )));
    }

    if let Some(data) = &props.data {
        let expected = format.image_byte_length(w, h) * props.layers() as u64;
        if data.len() as u64 != expected {
            return Err(GpuError::invalid(format!(
                "initial data is {} bytes, mip level 0 needs {expected}",
                data.len()
            )));
        }
    }
    Ok(())
}

/// Image resource with a fixed format and mip chain.
#[derive(Debug)]
pub struct Texture {
    core: ResourceCore,
    props: Mutex<TextureProps>,
}

impl_resource!(Texture);

impl Texture {
    pub(crate) fn new(device: &Device, props: &TextureProps) -> Result<Self> {
        validate(device, props)?;
        let handle = create_native(device, props)?;
        let stored = TextureProps {
            data: None,
            ..props.clone()
        };
        Ok(Self {
            core: ResourceCore::new(device, ResourceKind::Texture, props.label.as_deref(), handle),
            props: Mutex::new(stored),
        })
    }

    /// Current props. `data` is never retained.
    pub fn props(&self) -> TextureProps {
        self.props.lock().clone()
    }

    pub fn format(&self) -> TextureFormat {
        self.props.lock().format
    }

    pub fn dimension(&self) -> TextureDimension {
        self.props.lock().dimension
    }

    pub fn width(&self) -> u32 {
        self.props.lock().width
    }

    pub fn height(&self) -> u32 {
        self.props.lock().height
    }

    pub fn depth(&self) -> u32 {
        self.props.lock().depth
    }

    pub fn mip_levels(&self) -> u32 {
        self.props.lock().mip_levels
    }

    pub fn sample_count(&self) -> u32 {
        self.props.lock().sample_count
    }

    pub fn usage(&self) -> TextureUsage {
        self.props.lock().usage
    }

    /// Width, height and depth of mip `level`.
    pub fn mip_size(&self, level: u32) -> Result<(u32, u32, u32)> {
        let props = self.props.lock();
        if level >= props.mip_levels {
            return Err(GpuError::invalid(format!(
                "mip level {level} out of range, texture has {}",
                props.mip_levels
            )));
        }
        let depth = match props.dimension {
            TextureDimension::D3 => (props.depth >> level).max(1),
            _ => props.layers(),
        };
        Ok((
            (props.width >> level).max(1),
            (props.height >> level).max(1),
            depth,
        ))
    }

    /// Replaces all of mip level 0.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let (width, height, depth) = self.mip_size(0)?;
        self.set_sub_image(TextureRegion::whole(width, height, depth, 0), data)
    }

    /// Checks that `region` lies inside its mip level and, for compressed
    /// formats, starts on a block boundary.
    pub(crate) fn check_region(&self, region: &TextureRegion) -> Result<()> {
        let format = self.format();
        let (mip_w, mip_h, mip_d) = self.mip_size(region.mip_level)?;
        let inside = region.width > 0
            && region.height > 0
            && region.depth > 0
            && region.x.checked_add(region.width).is_some_and(|end| end <= mip_w)
            && region.y.checked_add(region.height).is_some_and(|end| end <= mip_h)
            && region.z.checked_add(region.depth).is_some_and(|end| end <= mip_d);
        if !inside {
            return Err(GpuError::invalid(format!(
                "region {}x{}x{} at ({}, {}, {}) is outside mip {} ({mip_w}x{mip_h}x{mip_d})",
                region.width, region.height, region.depth, region.x, region.y, region.z,
                region.mip_level
            )));
        }
        let block = format.info().block_size;
        if format.is_compressed() && (region.x % block != 0 || region.y % block != 0) {
            return Err(GpuError::invalid(format!(
                "compressed regions must start on a {block}x{block} block boundary"
            )));
        }
        Ok(())
    }

    /// Uploads `data` into `region`. The region must lie inside its mip
    /// level and `data` must cover it.
    pub fn set_sub_image(&self, region: TextureRegion, data: &[u8]) -> Result<()> {
        let handle = self.core.handle()?;
        self.check_region(&region)?;
        let format = self.format();
        let needed = format.image_byte_length(region.width, region.height) * region.depth as u64;
        if (data.len() as u64) < needed {
            return Err(GpuError::invalid(format!(
                "{} bytes supplied, region needs {needed}",
                data.len()
            )));
        }
        self.device().with_backend(|backend| {
            backend.write_texture(handle, &region, data);
            Ok(())
        })
    }

    /// Recreates the native texture at a new size. Contents are discarded;
    /// identity and label survive.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        self.core.handle()?;
        let resized = {
            let props = self.props.lock();
            if props.width == width && props.height == height {
                return Ok(());
            }
            let max_mips = max_mip_levels(width, height);
            TextureProps {
                width,
                height,
                mip_levels: props.mip_levels.min(max_mips),
                ..props.clone()
            }
        };
        validate(self.device(), &resized)?;
        let handle = create_native(self.device(), &resized)?;
        let old = self.core.replace_handle(handle)?;
        self.device().release_native(ResourceKind::Texture, old);
        log::debug!(
            "{}: resized texture \"{}\" to {width}x{height}",
            self.device().id(),
            self.label()
        );
        *self.props.lock() = resized;
        Ok(())
    }
}

fn create_native(device: &Device, props: &TextureProps) -> Result<crate::native::NativeHandle> {
    device.with_backend(|backend| {
        let handle = backend.create_object(&ObjectDescriptor::Texture(props))?;
        if let Some(data) = &props.data {
            let region = TextureRegion::whole(props.width, props.height, props.layers(), 0);
            backend.write_texture(handle, &region, data);
        }
        Ok(handle)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceFactory, DeviceProps};

    fn device() -> Device {
        DeviceFactory::without_provider()
            .create_null_device(&DeviceProps::default())
            .unwrap()
    }

    #[test]
    fn mip_count_follows_largest_side() {
        assert_eq!(max_mip_levels(1, 1), 1);
        assert_eq!(max_mip_levels(256, 16), 9);
        assert_eq!(max_mip_levels(300, 1), 9);
    }

    #[test]
    fn too_many_mips_rejected() {
        let err = device()
            .create_texture(&TextureProps {
                width: 4,
                height: 4,
                mip_levels: 4,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::InvalidConfiguration(_)));
    }

    #[test]
    fn multisample_needs_single_mip() {
        let err = device()
            .create_texture(&TextureProps {
                width: 8,
                height: 8,
                mip_levels: 2,
                sample_count: 4,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::InvalidConfiguration(_)));
    }

    #[test]
    fn compressed_without_feature_is_unsupported() {
        let err = device()
            .create_texture(&TextureProps {
                format: TextureFormat::Bc1RgbaUnorm,
                width: 8,
                height: 8,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::InvalidConfiguration(_)));
    }

    #[test]
    fn sub_image_region_is_checked() {
        let texture = device()
            .create_texture(&TextureProps {
                width: 4,
                height: 4,
                mip_levels: 3,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(texture.mip_size(1).unwrap(), (2, 2, 1));
        let region = TextureRegion::whole(2, 2, 1, 1);
        texture.set_sub_image(region, &[0; 16]).unwrap();
        let too_big = TextureRegion::whole(4, 4, 1, 1);
        assert!(texture.set_sub_image(too_big, &[0; 64]).is_err());
        assert!(texture.set_sub_image(region, &[0; 4]).is_err());
    }

    #[test]
    fn resize_keeps_identity() {
        let texture = device()
            .create_texture(&TextureProps {
                width: 16,
                height: 16,
                mip_levels: 5,
                ..Default::default()
            })
            .unwrap();
        let id = texture.id().to_string();
        let before = texture.handle();
        texture.resize(4, 4).unwrap();
        assert_eq!(texture.id(), id);
        assert_ne!(texture.handle(), before);
        assert_eq!((texture.width(), texture.height()), (4, 4));
        assert_eq!(texture.mip_levels(), 3);
    }
}
