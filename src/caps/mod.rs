//! What a concrete backend instance supports.
//!
//! A [`CapabilitySnapshot`] is computed once when a device is constructed
//! and never mutated afterwards; every query against it is a pure lookup.

mod features;
mod format;
mod limits;

pub use features::{DeviceFeature, DeviceFeatures};
pub use format::{
    is_texture_format_compressed, FormatCapabilities, FormatInfo, FormatTable, TextureFormat,
    VertexFormat,
};
pub use limits::DeviceLimits;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySnapshot {
    features: DeviceFeatures,
    limits: DeviceLimits,
    formats: FormatTable,
}

impl CapabilitySnapshot {
    pub fn new(features: DeviceFeatures, limits: DeviceLimits) -> Self {
        let formats = FormatTable::new(&features);
        Self {
            features,
            limits,
            formats,
        }
    }

    /// Builds a snapshot, then removes formats the backend cannot express.
    pub fn with_masked_formats(
        features: DeviceFeatures,
        limits: DeviceLimits,
        masked: &[TextureFormat],
    ) -> Self {
        let mut snapshot = Self::new(features, limits);
        for format in masked {
            snapshot.formats.mask(*format);
        }
        snapshot
    }

    pub fn features(&self) -> &DeviceFeatures {
        &self.features
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn has(&self, feature: DeviceFeature) -> bool {
        self.features.has(feature)
    }

    pub fn format(&self, format: TextureFormat) -> FormatCapabilities {
        self.formats.get(format)
    }

    pub fn is_texture_format_supported(&self, format: TextureFormat) -> bool {
        self.format(format).supported
    }

    pub fn is_texture_format_renderable(&self, format: TextureFormat) -> bool {
        self.format(format).renderable
    }

    pub fn is_texture_format_filterable(&self, format: TextureFormat) -> bool {
        self.format(format).filterable
    }

    pub fn is_texture_format_blendable(&self, format: TextureFormat) -> bool {
        self.format(format).blendable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_queries_are_deterministic() {
        let snapshot = CapabilitySnapshot::with_masked_formats(
            DeviceFeatures::new([DeviceFeature::Float32Renderable], &[]),
            DeviceLimits::default(),
            &[TextureFormat::Bgra8Unorm],
        );
        assert!(snapshot.is_texture_format_renderable(TextureFormat::R32Float));
        assert!(!snapshot.is_texture_format_supported(TextureFormat::Bgra8Unorm));
        assert_eq!(
            snapshot.format(TextureFormat::Rgba8Unorm),
            snapshot.format(TextureFormat::Rgba8Unorm)
        );
    }
}
