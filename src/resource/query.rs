#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use super::{impl_resource, ResourceCore, ResourceKind};
use crate::caps::DeviceFeature;
use crate::error::{GpuError, Result};
use crate::gpu::Device;
use crate::native::ObjectDescriptor;

pub const MAX_QUERY_COUNT: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum QueryType {
    #[default]
    Occlusion,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct QuerySetProps {
    pub label: Option<String>,
    pub kind: QueryType,
    pub count: u32,
}

impl Default for QuerySetProps {
    fn default() -> Self {
        Self {
            label: None,
            kind: QueryType::Occlusion,
            count: 1,
        }
    }
}

#[derive(Debug)]
pub struct QuerySet {
    core: ResourceCore,
    kind: QueryType,
    count: u32,
}

impl_resource!(QuerySet);

impl QuerySet {
    pub(crate) fn new(device: &Device, props: &QuerySetProps) -> Result<Self> {
        if props.count == 0 || props.count > MAX_QUERY_COUNT {
            return Err(GpuError::invalid(format!(
                "query count {} is outside 1..={MAX_QUERY_COUNT}",
                props.count
            )));
        }
        if props.kind == QueryType::Timestamp
            && !device.has_feature(DeviceFeature::TimestampQuery)
        {
            return Err(GpuError::invalid("timestamp queries require timestamp-query"));
        }
        let handle = device.with_backend(|backend| {
            backend.create_object(&ObjectDescriptor::QuerySet {
                kind: props.kind,
                count: props.count,
            })
        })?;
        Ok(Self {
            core: ResourceCore::new(device, ResourceKind::QuerySet, props.label.as_deref(), handle),
            kind: props.kind,
            count: props.count,
        })
    }

    pub fn kind(&self) -> QueryType {
        self.kind
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Bytes needed to resolve `count` results.
    pub fn resolve_size(&self, count: u32) -> u64 {
        count as u64 * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceFactory, DeviceProps};

    #[test]
    fn count_and_feature_are_checked() {
        let device = DeviceFactory::without_provider()
            .create_null_device(&DeviceProps::default())
            .unwrap();
        for count in [0, MAX_QUERY_COUNT + 1] {
            let props = QuerySetProps {
                count,
                ..Default::default()
            };
            assert!(matches!(
                device.create_query_set(&props),
                Err(GpuError::InvalidConfiguration(_))
            ));
        }
        let timestamps = QuerySetProps {
            kind: QueryType::Timestamp,
            count: 2,
            ..Default::default()
        };
        assert!(device.create_query_set(&timestamps).is_err());
        let occlusion = device
            .create_query_set(&QuerySetProps {
                count: MAX_QUERY_COUNT,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(occlusion.count(), MAX_QUERY_COUNT);
    }
}
