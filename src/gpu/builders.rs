//! Builder pattern wrapper for device creation.

use super::device::Device;
use super::factory::DeviceFactory;
use super::structs::{
    BackendKind, DebugShaders, DeviceProps, PowerPreference, SurfaceProps, SurfaceTarget,
};
use crate::caps::DeviceFeature;
use crate::error::Result;
use crate::native::NativeDevice;

/// Builds [`DeviceProps`] and creates a device from them.
///
/// # Examples
/// ```
/// use lumo::gpu::{BackendKind, DeviceBuilder, DeviceFactory};
///
/// let factory = DeviceFactory::headless();
/// let device = DeviceBuilder::new()
///     .backend(BackendKind::Null)
///     .id("offscreen")
///     .build(&factory)
///     .unwrap();
/// assert_eq!(device.id(), "offscreen");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeviceBuilder {
    props: DeviceProps,
}

impl DeviceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: &str) -> Self {
        self.props.id = Some(id.to_string());
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.props.backend = Some(backend);
        self
    }

    pub fn prefer_explicit_backend(mut self, prefer: bool) -> Self {
        self.props.prefer_explicit_backend = prefer;
        self
    }

    /// Fail creation unless `feature` is available.
    pub fn require(mut self, feature: DeviceFeature) -> Self {
        if !self.props.required_features.contains(&feature) {
            self.props.required_features.push(feature);
        }
        self
    }

    /// Hide `feature` even if the backend has it.
    pub fn disable(mut self, feature: DeviceFeature) -> Self {
        if !self.props.disabled_features.contains(&feature) {
            self.props.disabled_features.push(feature);
        }
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.props.debug = debug;
        self
    }

    pub fn debug_shaders(mut self, mode: DebugShaders) -> Self {
        self.props.debug_shaders = mode;
        self
    }

    pub fn power_preference(mut self, preference: PowerPreference) -> Self {
        self.props.power_preference = preference;
        self
    }

    pub fn canvas(mut self, name: &str, width: u32, height: u32) -> Self {
        self.props.surface = SurfaceProps {
            target: SurfaceTarget::Canvas(name.to_string()),
            width,
            height,
        };
        self
    }

    pub fn offscreen(mut self, width: u32, height: u32) -> Self {
        self.props.surface = SurfaceProps {
            target: SurfaceTarget::Offscreen,
            width,
            height,
        };
        self
    }

    pub fn reuse_existing_device(mut self, reuse: bool) -> Self {
        self.props.reuse_existing_device = reuse;
        self
    }

    pub fn props(&self) -> &DeviceProps {
        &self.props
    }

    pub fn into_props(self) -> DeviceProps {
        self.props
    }

    pub fn build(self, factory: &DeviceFactory) -> Result<Device> {
        factory.create_device(&self.props)
    }

    pub fn attach(self, factory: &DeviceFactory, context: NativeDevice) -> Result<Device> {
        factory.attach_device(context, &self.props)
    }
}
