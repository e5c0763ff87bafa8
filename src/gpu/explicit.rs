use futures::future::BoxFuture;

use crate::caps::DeviceFeature;
use crate::driver::ir::CommandStream;
use crate::error::{GpuError, Result};
use crate::ir::{CommandReplayer, Replayer};
use crate::native::{ErrorFilter, ExplicitContext, NativeError, NativeHandle, ObjectDescriptor};

/// The recorded-command backend.
pub(crate) struct ExplicitBackend {
    pub(crate) ctx: Box<dyn ExplicitContext>,
    /// Scope captures waiting for the device reporter.
    captured: Vec<GpuError>,
}

impl ExplicitBackend {
    pub(crate) fn new(ctx: Box<dyn ExplicitContext>) -> Self {
        Self {
            ctx,
            captured: Vec::new(),
        }
    }

    pub(crate) fn features(&self) -> Vec<DeviceFeature> {
        self.ctx.features()
    }

    /// Creates an object inside a validation scope. A captured error fails
    /// the creation.
    pub(crate) fn create_object(&mut self, desc: &ObjectDescriptor<'_>) -> Result<NativeHandle> {
        self.ctx.push_error_scope(ErrorFilter::Validation);
        let created = self.ctx.create_object(desc);
        let captured = self.ctx.pop_error_scope();
        match (created, captured) {
            (Ok(handle), None) => Ok(handle),
            (Ok(handle), Some(error)) => {
                self.ctx.delete_object(desc.kind(), handle);
                Err(self.capture(native_error(desc, error)))
            }
            (Err(error), _) => Err(native_error(desc, error)),
        }
    }

    fn capture(&mut self, error: GpuError) -> GpuError {
        self.captured.push(error.clone());
        error
    }

    pub(crate) fn take_captured(&mut self) -> Vec<GpuError> {
        std::mem::take(&mut self.captured)
    }

    pub(crate) fn submit(&mut self, stream: &CommandStream) {
        CommandReplayer::new(&mut *self.ctx).replay(stream);
        self.ctx.queue_submit();
    }

    pub(crate) fn on_submitted_work_done(&mut self) -> BoxFuture<'static, ()> {
        self.ctx.on_submitted_work_done()
    }

    pub(crate) fn push_error_scope(&mut self, filter: ErrorFilter) {
        self.ctx.push_error_scope(filter);
    }

    pub(crate) fn pop_error_scope(&mut self) -> Option<NativeError> {
        self.ctx.pop_error_scope()
    }
}

fn native_error(desc: &ObjectDescriptor<'_>, error: NativeError) -> GpuError {
    log::warn!("{} creation failed: {}", desc.kind(), error.message);
    GpuError::Native(format!("{:?}: {}", error.filter, error.message))
}
