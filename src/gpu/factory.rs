use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::ContextBackend;
use super::device::{Device, Registry};
use super::explicit::ExplicitBackend;
use super::gl::GlBackend;
use super::null::NullBackend;
use super::structs::{BackendKind, DeviceProps};
use crate::error::{GpuError, Result};
use crate::native::recording::HeadlessProvider;
use crate::native::{ContextId, ContextProvider, NativeDevice};

/// Null contexts live in their own id range so they never collide with
/// provider contexts.
const NULL_CONTEXT_BASE: u64 = 1 << 63;

/// Creates devices and remembers which native context each is bound to.
pub struct DeviceFactory {
    provider: Option<Arc<dyn ContextProvider>>,
    registry: Arc<Registry>,
    next_null_context: AtomicU64,
}

impl DeviceFactory {
    pub fn new(provider: impl ContextProvider + 'static) -> Self {
        Self::with_provider(Some(Arc::new(provider)))
    }

    /// A factory backed by headless recording contexts.
    pub fn headless() -> Self {
        Self::new(HeadlessProvider::new())
    }

    /// A factory that can only attach existing contexts or make null devices.
    pub fn without_provider() -> Self {
        Self::with_provider(None)
    }

    fn with_provider(provider: Option<Arc<dyn ContextProvider>>) -> Self {
        Self {
            provider,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_null_context: AtomicU64::new(0),
        }
    }

    fn provider(&self) -> Result<&Arc<dyn ContextProvider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| GpuError::unsupported("this factory has no context provider"))
    }

    /// Creates a device on a new native context for `props.surface`.
    pub fn create_device(&self, props: &DeviceProps) -> Result<Device> {
        match props.backend {
            Some(BackendKind::Null) => self.create_null_device(props),
            Some(BackendKind::Gl) => {
                let gl = self.provider()?.create_gl_context(&props.surface)?;
                self.bind(NativeDevice::Gl(gl), props, false)
            }
            Some(BackendKind::Explicit) => {
                let ctx = self
                    .provider()?
                    .create_explicit_context(&props.surface, props.power_preference)?;
                self.bind(NativeDevice::Explicit(ctx), props, false)
            }
            None => {
                let provider = self.provider()?;
                if props.prefer_explicit_backend {
                    match provider.create_explicit_context(&props.surface, props.power_preference) {
                        Ok(ctx) => return self.bind(NativeDevice::Explicit(ctx), props, false),
                        Err(err) => {
                            log::info!("explicit backend unavailable, falling back: {err}")
                        }
                    }
                }
                let gl = provider.create_gl_context(&props.surface)?;
                self.bind(NativeDevice::Gl(gl), props, false)
            }
        }
    }

    /// Wraps a context the caller already owns.
    pub fn attach_device(&self, context: NativeDevice, props: &DeviceProps) -> Result<Device> {
        self.bind(context, props, true)
    }

    pub fn create_null_device(&self, props: &DeviceProps) -> Result<Device> {
        let next = self.next_null_context.fetch_add(1, Ordering::Relaxed);
        let id = ContextId(NULL_CONTEXT_BASE | next);
        let backend = ContextBackend::Null(NullBackend::new(id));
        let device = Device::new(backend, props, Some(Arc::downgrade(&self.registry)))?;
        self.registry.lock().insert(id, device.downgrade_inner());
        Ok(device)
    }

    /// The live device bound to `context`, as a non-owning handle.
    pub fn device_for_context(&self, context: ContextId) -> Option<Device> {
        self.registry
            .lock()
            .get(&context)
            .and_then(Weak::upgrade)
            .map(Device::reused)
    }

    fn bind(&self, native: NativeDevice, props: &DeviceProps, attached: bool) -> Result<Device> {
        let context = native.context_id();
        let mut registry = self.registry.lock();
        let bound = registry.get(&context).and_then(Weak::upgrade);
        if let Some(existing) = bound {
            // The handle may be the last owner; its drop takes this lock.
            drop(registry);
            let existing = Device::reused(existing);
            if props.reuse_existing_device {
                log::debug!("{context}: reusing {}", existing.id());
                return Ok(existing);
            }
            return Err(GpuError::ContextAlreadyBound {
                device: existing.id().to_string(),
            });
        }
        let backend = match native {
            NativeDevice::Gl(gl) => ContextBackend::Gl(GlBackend::new(gl, attached)),
            NativeDevice::Explicit(ctx) => ContextBackend::Explicit(ExplicitBackend::new(ctx)),
        };
        let device = Device::new(backend, props, Some(Arc::downgrade(&self.registry)))?;
        registry.insert(context, device.downgrade_inner());
        Ok(device)
    }
}

impl Default for DeviceFactory {
    fn default() -> Self {
        Self::headless()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::DeviceStatus;

    #[test]
    fn null_devices_get_distinct_contexts() {
        let factory = DeviceFactory::without_provider();
        let a = factory.create_null_device(&DeviceProps::default()).unwrap();
        let b = factory.create_null_device(&DeviceProps::default()).unwrap();
        assert_ne!(a.context_id(), b.context_id());
        assert_ne!(a, b);
    }

    #[test]
    fn providerless_factory_rejects_native_backends() {
        let factory = DeviceFactory::without_provider();
        let err = factory.create_device(&DeviceProps::default()).unwrap_err();
        assert!(matches!(err, GpuError::UnsupportedOperation(_)));
    }

    #[test]
    fn destroyed_device_leaves_registry() {
        let factory = DeviceFactory::without_provider();
        let device = factory.create_null_device(&DeviceProps::default()).unwrap();
        let context = device.context_id();
        assert!(factory.device_for_context(context).is_some());
        device.destroy();
        assert_eq!(device.status(), DeviceStatus::Destroyed);
        assert!(factory.device_for_context(context).is_none());
    }

    #[test]
    fn dropped_device_leaves_registry() {
        let factory = DeviceFactory::without_provider();
        let device = factory.create_null_device(&DeviceProps::default()).unwrap();
        let context = device.context_id();
        drop(device);
        assert!(factory.registry.lock().get(&context).is_none());
        assert!(factory.registry.lock().is_empty());
    }
}
