#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

/// Numeric device limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct DeviceLimits {
    pub max_texture_dimension_1d: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_array_layers: u32,
    pub max_bind_groups: u32,
    pub max_uniform_buffer_binding_size: u64,
    pub max_storage_buffer_binding_size: u64,
    pub max_vertex_buffers: u32,
    pub max_vertex_attributes: u32,
    pub max_buffer_size: u64,
    pub max_color_attachments: u32,
    pub max_compute_workgroup_size_x: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub min_uniform_buffer_offset_alignment: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension_1d: 8192,
            max_texture_dimension_2d: 8192,
            max_texture_dimension_3d: 2048,
            max_texture_array_layers: 256,
            max_bind_groups: 4,
            max_uniform_buffer_binding_size: 65536,
            max_storage_buffer_binding_size: 134_217_728,
            max_vertex_buffers: 8,
            max_vertex_attributes: 16,
            max_buffer_size: 268_435_456,
            max_color_attachments: 8,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroups_per_dimension: 65535,
            min_uniform_buffer_offset_alignment: 256,
        }
    }
}

impl DeviceLimits {
    pub const NAMES: [&'static str; 14] = [
        "max-texture-dimension-1d",
        "max-texture-dimension-2d",
        "max-texture-dimension-3d",
        "max-texture-array-layers",
        "max-bind-groups",
        "max-uniform-buffer-binding-size",
        "max-storage-buffer-binding-size",
        "max-vertex-buffers",
        "max-vertex-attributes",
        "max-buffer-size",
        "max-color-attachments",
        "max-compute-workgroup-size-x",
        "max-compute-workgroups-per-dimension",
        "min-uniform-buffer-offset-alignment",
    ];

    /// Looks a limit up by its kebab-case name.
    pub fn get(&self, name: &str) -> Option<u64> {
        let value = match name {
            "max-texture-dimension-1d" => self.max_texture_dimension_1d.into(),
            "max-texture-dimension-2d" => self.max_texture_dimension_2d.into(),
            "max-texture-dimension-3d" => self.max_texture_dimension_3d.into(),
            "max-texture-array-layers" => self.max_texture_array_layers.into(),
            "max-bind-groups" => self.max_bind_groups.into(),
            "max-uniform-buffer-binding-size" => self.max_uniform_buffer_binding_size,
            "max-storage-buffer-binding-size" => self.max_storage_buffer_binding_size,
            "max-vertex-buffers" => self.max_vertex_buffers.into(),
            "max-vertex-attributes" => self.max_vertex_attributes.into(),
            "max-buffer-size" => self.max_buffer_size,
            "max-color-attachments" => self.max_color_attachments.into(),
            "max-compute-workgroup-size-x" => self.max_compute_workgroup_size_x.into(),
            "max-compute-workgroups-per-dimension" => {
                self.max_compute_workgroups_per_dimension.into()
            }
            "min-uniform-buffer-offset-alignment" => {
                self.min_uniform_buffer_offset_alignment.into()
            }
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DeviceLimits;

    #[test]
    fn every_name_resolves() {
        let limits = DeviceLimits::default();
        for name in DeviceLimits::NAMES {
            assert!(limits.get(name).is_some(), "{name}");
        }
        assert_eq!(limits.get("max-texture-dimension-2d"), Some(8192));
        assert_eq!(limits.get("max-teapots"), None);
    }
}
