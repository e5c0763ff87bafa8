#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use super::{impl_resource, ResourceCore, ResourceKind};
use crate::caps::DeviceFeature;
use crate::driver::params::gl;
use crate::error::{GpuError, Result};
use crate::gpu::Device;
use crate::native::ObjectDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl CompareFunction {
    /// The matching stateful-context enum.
    pub fn gl(&self) -> u32 {
        match self {
            CompareFunction::Never => gl::NEVER,
            CompareFunction::Less => gl::LESS,
            CompareFunction::Equal => gl::EQUAL,
            CompareFunction::LessEqual => gl::LEQUAL,
            CompareFunction::Greater => gl::GREATER,
            CompareFunction::NotEqual => gl::NOTEQUAL,
            CompareFunction::GreaterEqual => gl::GEQUAL,
            CompareFunction::Always => gl::ALWAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct SamplerProps {
    pub label: Option<String>,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    /// Makes this a comparison sampler.
    pub compare: Option<CompareFunction>,
    pub max_anisotropy: u16,
}

impl Default for SamplerProps {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            max_anisotropy: 1,
        }
    }
}

#[derive(Debug)]
pub struct Sampler {
    core: ResourceCore,
    props: SamplerProps,
}

impl_resource!(Sampler);

impl Sampler {
    pub(crate) fn new(device: &Device, props: &SamplerProps) -> Result<Self> {
        if !(props.lod_min_clamp >= 0.0 && props.lod_max_clamp >= props.lod_min_clamp) {
            return Err(GpuError::invalid(format!(
                "invalid lod clamp {}..{}",
                props.lod_min_clamp, props.lod_max_clamp
            )));
        }
        if props.max_anisotropy == 0 {
            return Err(GpuError::invalid("max_anisotropy must be at least 1"));
        }
        if props.max_anisotropy > 1 {
            if !device.has_feature(DeviceFeature::AnisotropicFiltering) {
                return Err(GpuError::invalid(
                    "max_anisotropy > 1 requires anisotropic-filtering",
                ));
            }
            let all_linear = [props.mag_filter, props.min_filter, props.mipmap_filter]
                .iter()
                .all(|filter| *filter == FilterMode::Linear);
            if !all_linear {
                return Err(GpuError::invalid(
                    "anisotropic sampling needs linear mag, min and mipmap filters",
                ));
            }
        }
        let handle =
            device.with_backend(|backend| {
                backend.create_object(&ObjectDescriptor::Sampler(props))
            })?;
        Ok(Self {
            core: ResourceCore::new(device, ResourceKind::Sampler, props.label.as_deref(), handle),
            props: props.clone(),
        })
    }

    pub fn props(&self) -> &SamplerProps {
        &self.props
    }

    pub fn is_comparison(&self) -> bool {
        self.props.compare.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceFactory, DeviceProps};

    #[test]
    fn anisotropy_needs_feature() {
        let device = DeviceFactory::without_provider()
            .create_null_device(&DeviceProps::default())
            .unwrap();
        let err = device
            .create_sampler(&SamplerProps {
                max_anisotropy: 8,
                mag_filter: FilterMode::Linear,
                min_filter: FilterMode::Linear,
                mipmap_filter: FilterMode::Linear,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::InvalidConfiguration(_)));
        assert!(device.create_sampler(&SamplerProps::default()).is_ok());
    }

    #[test]
    fn compare_maps_to_gl_enum() {
        assert_eq!(CompareFunction::Less.gl(), 0x0201);
        assert_eq!(CompareFunction::Always.gl(), 0x0207);
    }
}
