use std::sync::Arc;

use parking_lot::Mutex;

use super::sampler::Sampler;
use super::{Release, Resource, ResourceCore, ResourceKind, ResourceState};
use crate::error::{GpuError, Result};
use crate::gpu::Device;
use crate::native::{NativeHandle, ObjectDescriptor};

#[derive(Debug, Clone, Default)]
pub struct ExternalTextureProps {
    pub label: Option<String>,
    /// Platform name of the imported frame.
    pub source: String,
    pub sampler: Option<Arc<Sampler>>,
}

/// A platform frame imported for sampling.
///
/// The platform reclaims the frame once the current task of work completes,
/// which for this crate is the next `Device::submit`. After that every use
/// fails with [`GpuError::ResourceDestroyed`] even without `destroy`.
#[derive(Debug)]
pub struct ExternalTexture {
    core: ResourceCore,
    source: String,
    epoch: u64,
    sampler: Mutex<Option<Arc<Sampler>>>,
}

impl ExternalTexture {
    pub(crate) fn new(device: &Device, props: &ExternalTextureProps) -> Result<Self> {
        if props.source.is_empty() {
            return Err(GpuError::invalid("external texture source is empty"));
        }
        if let Some(sampler) = &props.sampler {
            sampler.core().handle()?;
        }
        let epoch = device.task_epoch();
        let handle = device.with_backend(|backend| {
            backend.create_object(&ObjectDescriptor::ExternalTexture {
                source: &props.source,
            })
        })?;
        Ok(Self {
            core: ResourceCore::with_release(
                device,
                ResourceKind::ExternalTexture,
                props.label.as_deref(),
                handle,
                Release::Detach,
            ),
            source: props.source.clone(),
            epoch,
            sampler: Mutex::new(props.sampler.clone()),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True once the task it was imported in has been submitted.
    pub fn is_expired(&self) -> bool {
        self.core.device().task_epoch() != self.epoch
    }

    /// The handle, if the frame is still valid for this task.
    pub fn live_handle(&self) -> Result<NativeHandle> {
        if self.is_expired() {
            self.core.destroy();
            return Err(self.core.destroyed_error());
        }
        self.core.handle()
    }

    pub fn set_sampler(&self, sampler: Arc<Sampler>) -> Result<()> {
        self.live_handle()?;
        sampler.core().handle()?;
        *self.sampler.lock() = Some(sampler);
        Ok(())
    }

    pub fn sampler(&self) -> Option<Arc<Sampler>> {
        self.sampler.lock().clone()
    }
}

impl Resource for ExternalTexture {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn state(&self) -> ResourceState {
        if self.is_expired() {
            ResourceState::Destroyed
        } else {
            self.core.state()
        }
    }

    fn handle(&self) -> Option<NativeHandle> {
        if self.is_expired() {
            None
        } else {
            self.core.raw_handle()
        }
    }
}
