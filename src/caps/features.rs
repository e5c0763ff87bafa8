use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use crate::error::GpuError;

/// Optional capabilities a backend may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "lumo-serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum DeviceFeature {
    Compute,
    Instancing,
    TransformFeedback,
    TimestampQuery,
    DepthClipControl,
    Depth32floatStencil8,
    TextureCompressionBc,
    TextureCompressionEtc2,
    TextureCompressionAstc,
    Float32Renderable,
    Float32Filterable,
    Float16Renderable,
    Rg11b10ufloatRenderable,
    ShaderF16,
    CompilationStatusAsync,
    PolygonMode,
    ProvokingVertex,
    AnisotropicFiltering,
}

impl DeviceFeature {
    pub const ALL: [DeviceFeature; 18] = [
        DeviceFeature::Compute,
        DeviceFeature::Instancing,
        DeviceFeature::TransformFeedback,
        DeviceFeature::TimestampQuery,
        DeviceFeature::DepthClipControl,
        DeviceFeature::Depth32floatStencil8,
        DeviceFeature::TextureCompressionBc,
        DeviceFeature::TextureCompressionEtc2,
        DeviceFeature::TextureCompressionAstc,
        DeviceFeature::Float32Renderable,
        DeviceFeature::Float32Filterable,
        DeviceFeature::Float16Renderable,
        DeviceFeature::Rg11b10ufloatRenderable,
        DeviceFeature::ShaderF16,
        DeviceFeature::CompilationStatusAsync,
        DeviceFeature::PolygonMode,
        DeviceFeature::ProvokingVertex,
        DeviceFeature::AnisotropicFiltering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFeature::Compute => "compute",
            DeviceFeature::Instancing => "instancing",
            DeviceFeature::TransformFeedback => "transform-feedback",
            DeviceFeature::TimestampQuery => "timestamp-query",
            DeviceFeature::DepthClipControl => "depth-clip-control",
            DeviceFeature::Depth32floatStencil8 => "depth32float-stencil8",
            DeviceFeature::TextureCompressionBc => "texture-compression-bc",
            DeviceFeature::TextureCompressionEtc2 => "texture-compression-etc2",
            DeviceFeature::TextureCompressionAstc => "texture-compression-astc",
            DeviceFeature::Float32Renderable => "float32-renderable",
            DeviceFeature::Float32Filterable => "float32-filterable",
            DeviceFeature::Float16Renderable => "float16-renderable",
            DeviceFeature::Rg11b10ufloatRenderable => "rg11b10ufloat-renderable",
            DeviceFeature::ShaderF16 => "shader-f16",
            DeviceFeature::CompilationStatusAsync => "compilation-status-async",
            DeviceFeature::PolygonMode => "polygon-mode",
            DeviceFeature::ProvokingVertex => "provoking-vertex",
            DeviceFeature::AnisotropicFiltering => "anisotropic-filtering",
        }
    }
}

impl fmt::Display for DeviceFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceFeature {
    type Err = GpuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceFeature::ALL
            .iter()
            .copied()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| GpuError::invalid(format!("unknown device feature \"{s}\"")))
    }
}

/// The features a device reports, minus any the caller disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    features: BTreeSet<DeviceFeature>,
}

impl DeviceFeatures {
    pub fn new(
        available: impl IntoIterator<Item = DeviceFeature>,
        disabled: &[DeviceFeature],
    ) -> Self {
        Self {
            features: available
                .into_iter()
                .filter(|feature| !disabled.contains(feature))
                .collect(),
        }
    }

    pub fn has(&self, feature: DeviceFeature) -> bool {
        self.features.contains(&feature)
    }

    pub fn iter(&self) -> impl Iterator<Item = DeviceFeature> + '_ {
        self.features.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features in `required` this set does not contain.
    pub fn missing(&self, required: &[DeviceFeature]) -> Vec<DeviceFeature> {
        required
            .iter()
            .copied()
            .filter(|feature| !self.has(*feature))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_features_are_never_reported() {
        let features = DeviceFeatures::new(
            [DeviceFeature::Compute, DeviceFeature::TimestampQuery],
            &[DeviceFeature::TimestampQuery],
        );
        assert!(features.has(DeviceFeature::Compute));
        assert!(!features.has(DeviceFeature::TimestampQuery));
        assert_eq!(features.len(), 1);
    }

    #[test]
    fn names_parse_back() {
        for feature in DeviceFeature::ALL {
            assert_eq!(feature.as_str().parse::<DeviceFeature>().unwrap(), feature);
        }
        assert!("no-such-feature".parse::<DeviceFeature>().is_err());
    }

    #[test]
    fn missing_lists_unmet_requirements() {
        let features = DeviceFeatures::new([DeviceFeature::Instancing], &[]);
        let missing = features.missing(&[DeviceFeature::Instancing, DeviceFeature::Compute]);
        assert_eq!(missing, vec![DeviceFeature::Compute]);
    }
}
