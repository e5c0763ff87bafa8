use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

use super::context::ContextBackend;
use super::gl::MASKED_FORMATS;
use super::lost::{LostFuture, LostSignal};
use super::reporter::{DebugHook, ErrorHandler, ErrorReporter};
use super::structs::{
    BackendKind, DebugShaders, DeviceProps, DeviceStatus, LostInfo, LostReason, ParameterMode,
    SubmissionIndex, SurfaceProps,
};
use crate::caps::{
    CapabilitySnapshot, DeviceFeature, DeviceFeatures, DeviceLimits, FormatCapabilities,
    TextureFormat, VertexFormat,
};
use crate::driver::encoder::{CommandBuffer, CommandEncoder, CommandEncoderProps, EncodeStrategy};
use crate::driver::params::{GlParameter, ParameterValue, Parameters};
use crate::error::{GpuError, Result};
use crate::native::{ContextId, DeviceInfo, ErrorFilter, NativeError, NativeHandle};
use crate::resource::{
    Buffer, BufferProps, CompilationFuture, ComputePipeline, ComputePipelineProps, ExternalTexture,
    ExternalTextureProps, Framebuffer, FramebufferProps, QuerySet, QuerySetProps,
    RenderPipeline, RenderPipelineProps, ResourceKind, Sampler, SamplerProps, Shader,
    ShaderProps, Texture, TextureProps, TransformFeedback, TransformFeedbackProps, VertexArray,
    VertexArrayProps,
};
use crate::utils::uid;

/// Context identity to the device bound to it. Owned by the factory.
pub(crate) type Registry = Mutex<HashMap<ContextId, Weak<DeviceInner>>>;

struct StatusCell {
    status: DeviceStatus,
    message: String,
}

pub(crate) struct DeviceInner {
    id: String,
    kind: BackendKind,
    context: ContextId,
    info: DeviceInfo,
    caps: Arc<CapabilitySnapshot>,
    surface: SurfaceProps,
    texture_alignment: u32,
    debug: bool,
    debug_shaders: DebugShaders,
    backend: Mutex<ContextBackend>,
    status: Mutex<StatusCell>,
    lost: LostSignal,
    reporter: ErrorReporter,
    default_encoder: Mutex<CommandEncoder>,
    submissions: AtomicU64,
    task_epoch: AtomicU64,
    nocatch_warned: AtomicBool,
    /// Shader compilations that have not resolved yet.
    compilations: Mutex<Vec<CompilationFuture>>,
    registry: Option<Weak<Registry>>,
}

/// Handle to a device. Clones share the same device; equality is identity.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
    /// False for handles obtained by reusing a device bound elsewhere.
    owner: bool,
}

/// Non-owning device reference held by encoders and pending results.
#[derive(Clone)]
pub struct WeakDevice {
    inner: Weak<DeviceInner>,
    owner: bool,
}

impl WeakDevice {
    pub fn upgrade(&self) -> Option<Device> {
        self.inner.upgrade().map(|inner| Device {
            inner,
            owner: self.owner,
        })
    }
}

impl fmt::Debug for WeakDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.upgrade() {
            Some(inner) => write!(f, "WeakDevice({})", inner.id),
            None => f.write_str("WeakDevice(<dropped>)"),
        }
    }
}

impl Device {
    pub(crate) fn new(
        mut backend: ContextBackend,
        props: &DeviceProps,
        registry: Option<Weak<Registry>>,
    ) -> Result<Self> {
        let kind = backend.kind();
        let features = DeviceFeatures::new(backend.features(), &props.disabled_features);
        let missing = features.missing(&props.required_features);
        if !missing.is_empty() {
            backend.release();
            let names: Vec<&str> = missing.iter().map(DeviceFeature::as_str).collect();
            return Err(GpuError::unsupported(format!(
                "required features not available on the {kind} backend: {}",
                names.join(", ")
            )));
        }

        let limits = backend.limits();
        let caps = match kind {
            BackendKind::Gl => {
                CapabilitySnapshot::with_masked_formats(features, limits, MASKED_FORMATS)
            }
            _ => CapabilitySnapshot::new(features, limits),
        };
        let id = props
            .id
            .clone()
            .unwrap_or_else(|| uid(&format!("{kind}-device")));
        let debug = props.debug_enabled();
        let info = backend.info();
        let context = backend.context_id();
        let texture_alignment = backend.texture_byte_alignment();
        let strategy = match kind {
            BackendKind::Gl => EncodeStrategy::Eager,
            _ => EncodeStrategy::Deferred,
        };
        let compute = caps.has(DeviceFeature::Compute);

        let inner = Arc::new_cyclic(|weak: &Weak<DeviceInner>| {
            let handle = WeakDevice {
                inner: weak.clone(),
                owner: true,
            };
            DeviceInner {
                default_encoder: Mutex::new(CommandEncoder::new(
                    handle,
                    id.clone(),
                    strategy,
                    compute,
                    &CommandEncoderProps::default(),
                )),
                id,
                kind,
                context,
                info,
                caps: Arc::new(caps),
                surface: props.surface.clone(),
                texture_alignment,
                debug,
                debug_shaders: props.debug_shaders,
                backend: Mutex::new(backend),
                status: Mutex::new(StatusCell {
                    status: DeviceStatus::Alive,
                    message: String::new(),
                }),
                lost: LostSignal::new(),
                reporter: ErrorReporter::default(),
                submissions: AtomicU64::new(0),
                task_epoch: AtomicU64::new(0),
                nocatch_warned: AtomicBool::new(false),
                compilations: Mutex::new(Vec::new()),
                registry,
            }
        });

        log::info!(
            "{}: created {} device on {} ({})",
            inner.id,
            kind,
            inner.info.renderer,
            context
        );
        if debug {
            log::warn!("{}: debug mode enabled, expect reduced performance", inner.id);
        }
        Ok(Self { inner, owner: true })
    }

    /// A handle that shares the device but does not own it.
    pub(crate) fn reused(inner: Arc<DeviceInner>) -> Self {
        Self {
            inner,
            owner: false,
        }
    }

    pub(crate) fn downgrade_inner(&self) -> Weak<DeviceInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn downgrade(&self) -> WeakDevice {
        WeakDevice {
            inner: Arc::downgrade(&self.inner),
            owner: self.owner,
        }
    }

    //===------------------------------------------------------------------===//
    // Accessors
    //===------------------------------------------------------------------===//

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.inner.kind
    }

    pub fn context_id(&self) -> ContextId {
        self.inner.context
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn capabilities(&self) -> &Arc<CapabilitySnapshot> {
        &self.inner.caps
    }

    pub fn features(&self) -> &DeviceFeatures {
        self.inner.caps.features()
    }

    pub fn limits(&self) -> &DeviceLimits {
        self.inner.caps.limits()
    }

    pub fn has_feature(&self, feature: DeviceFeature) -> bool {
        self.inner.caps.has(feature)
    }

    pub fn surface(&self) -> &SurfaceProps {
        &self.inner.surface
    }

    pub fn preferred_color_format(&self) -> TextureFormat {
        TextureFormat::Rgba8Unorm
    }

    pub fn preferred_depth_format(&self) -> TextureFormat {
        TextureFormat::Depth24Plus
    }

    pub fn is_debug(&self) -> bool {
        self.inner.debug
    }

    pub(crate) fn debug_shaders(&self) -> DebugShaders {
        self.inner.debug_shaders
    }

    pub fn status(&self) -> DeviceStatus {
        self.inner.status.lock().status
    }

    pub fn is_lost(&self) -> bool {
        self.status() != DeviceStatus::Alive
    }

    /// Whether this handle owns the device, as opposed to a reused handle.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    //===------------------------------------------------------------------===//
    // Capability queries
    //===------------------------------------------------------------------===//

    pub fn format_capabilities(&self, format: TextureFormat) -> FormatCapabilities {
        self.inner.caps.format(format)
    }

    pub fn is_texture_format_supported(&self, format: TextureFormat) -> bool {
        self.inner.caps.is_texture_format_supported(format)
    }

    pub fn is_texture_format_renderable(&self, format: TextureFormat) -> bool {
        self.inner.caps.is_texture_format_renderable(format)
    }

    pub fn is_texture_format_filterable(&self, format: TextureFormat) -> bool {
        self.inner.caps.is_texture_format_filterable(format)
    }

    pub fn is_texture_format_compressed(&self, format: TextureFormat) -> bool {
        format.is_compressed()
    }

    pub fn is_vertex_format_supported(&self, format: VertexFormat) -> bool {
        !(self.inner.kind == BackendKind::Gl && format == VertexFormat::Unorm8x4Bgra)
    }

    /// Row alignment required by texture uploads and texture/buffer copies.
    pub fn texture_byte_alignment(&self) -> u32 {
        self.inner.texture_alignment
    }

    //===------------------------------------------------------------------===//
    // Backend access
    //===------------------------------------------------------------------===//

    fn lost_error(&self) -> GpuError {
        let status = self.inner.status.lock();
        GpuError::DeviceLost {
            device: self.inner.id.clone(),
            message: status.message.clone(),
        }
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.status() == DeviceStatus::Alive {
            Ok(())
        } else {
            Err(self.lost_error())
        }
    }

    /// Runs `f` on the backend. Fails without touching the native context
    /// once the device is lost or destroyed.
    pub(crate) fn with_backend<T>(
        &self,
        f: impl FnOnce(&mut ContextBackend) -> Result<T>,
    ) -> Result<T> {
        self.ensure_alive()?;
        let mut backend = self.inner.backend.lock();
        if let Some(message) = backend.lost_message() {
            drop(backend);
            self.mark_lost(LostReason::Unknown, &message);
            return Err(self.lost_error());
        }
        let result = f(&mut backend);
        let captured = backend.take_captured_errors();
        drop(backend);
        // Reported outside the lock so handlers may use the device.
        for error in &captured {
            self.report_error(error);
            self.debug();
        }
        result
    }

    /// Deletes a native object on behalf of a resource. Skipped once the
    /// context is gone, since the objects went with it.
    pub(crate) fn release_native(&self, kind: ResourceKind, handle: NativeHandle) {
        if self.status() != DeviceStatus::Alive {
            return;
        }
        let mut backend = self.inner.backend.lock();
        if backend.lost_message().is_none() {
            backend.delete_object(kind, handle);
        }
    }

    pub(crate) fn check_supported(&self, kind: ResourceKind) -> Result<()> {
        self.with_backend(|backend| {
            if backend.supports_kind(kind) {
                Ok(())
            } else {
                Err(GpuError::unsupported(format!(
                    "{kind} is not supported by the {} backend",
                    backend.kind()
                )))
            }
        })
    }

    pub(crate) fn task_epoch(&self) -> u64 {
        self.inner.task_epoch.load(Ordering::Acquire)
    }

    //===------------------------------------------------------------------===//
    // Resource creation
    //===------------------------------------------------------------------===//

    pub fn create_buffer(&self, props: &BufferProps) -> Result<Arc<Buffer>> {
        self.check_supported(ResourceKind::Buffer)?;
        Buffer::new(self, props).map(Arc::new)
    }

    pub fn create_texture(&self, props: &TextureProps) -> Result<Arc<Texture>> {
        self.check_supported(ResourceKind::Texture)?;
        Texture::new(self, props).map(Arc::new)
    }

    pub fn create_sampler(&self, props: &SamplerProps) -> Result<Arc<Sampler>> {
        self.check_supported(ResourceKind::Sampler)?;
        Sampler::new(self, props).map(Arc::new)
    }

    pub fn create_shader(&self, props: &ShaderProps) -> Result<Arc<Shader>> {
        self.check_supported(ResourceKind::Shader)?;
        Shader::new(self, props).map(Arc::new)
    }

    pub fn create_framebuffer(&self, props: &FramebufferProps) -> Result<Arc<Framebuffer>> {
        self.check_supported(ResourceKind::Framebuffer)?;
        Framebuffer::new(self, props).map(Arc::new)
    }

    pub fn create_render_pipeline(
        &self,
        props: &RenderPipelineProps,
    ) -> Result<Arc<RenderPipeline>> {
        self.check_supported(ResourceKind::RenderPipeline)?;
        RenderPipeline::new(self, props).map(Arc::new)
    }

    pub fn create_compute_pipeline(
        &self,
        props: &ComputePipelineProps,
    ) -> Result<Arc<ComputePipeline>> {
        self.check_supported(ResourceKind::ComputePipeline)?;
        if !self.has_feature(DeviceFeature::Compute) {
            return Err(GpuError::unsupported("compute is disabled on this device"));
        }
        ComputePipeline::new(self, props).map(Arc::new)
    }

    pub fn create_vertex_array(&self, props: &VertexArrayProps) -> Result<Arc<VertexArray>> {
        self.check_supported(ResourceKind::VertexArray)?;
        VertexArray::new(self, props).map(Arc::new)
    }

    pub fn create_transform_feedback(
        &self,
        props: &TransformFeedbackProps,
    ) -> Result<Arc<TransformFeedback>> {
        self.check_supported(ResourceKind::TransformFeedback)?;
        if !self.has_feature(DeviceFeature::TransformFeedback) {
            return Err(GpuError::unsupported(
                "transform feedback is disabled on this device",
            ));
        }
        TransformFeedback::new(self, props).map(Arc::new)
    }

    pub fn create_query_set(&self, props: &QuerySetProps) -> Result<Arc<QuerySet>> {
        self.check_supported(ResourceKind::QuerySet)?;
        QuerySet::new(self, props).map(Arc::new)
    }

    /// Imports a platform frame. The result is only valid until the next
    /// submit on this device.
    pub fn import_external_texture(
        &self,
        props: &ExternalTextureProps,
    ) -> Result<Arc<ExternalTexture>> {
        self.check_supported(ResourceKind::ExternalTexture)?;
        ExternalTexture::new(self, props).map(Arc::new)
    }

    pub fn create_command_encoder(&self, props: &CommandEncoderProps) -> Result<CommandEncoder> {
        self.ensure_alive()?;
        Ok(CommandEncoder::new(
            self.downgrade(),
            self.inner.id.clone(),
            self.strategy(),
            self.has_feature(DeviceFeature::Compute),
            props,
        ))
    }

    fn strategy(&self) -> EncodeStrategy {
        match self.inner.kind {
            BackendKind::Gl => EncodeStrategy::Eager,
            _ => EncodeStrategy::Deferred,
        }
    }

    //===------------------------------------------------------------------===//
    // Submission
    //===------------------------------------------------------------------===//

    /// Runs `f` on the current default encoder. `f` must not submit.
    pub fn with_default_encoder<R>(&self, f: impl FnOnce(&mut CommandEncoder) -> R) -> R {
        let mut encoder = self.inner.default_encoder.lock();
        f(&mut encoder)
    }

    /// Submits `buffer`, or finishes and submits the default encoder and
    /// installs a fresh one.
    pub fn submit(&self, buffer: Option<&CommandBuffer>) -> Result<SubmissionIndex> {
        self.ensure_alive()?;
        let submitted = self.submit_inner(buffer);
        self.poll_compilations();
        submitted
    }

    fn submit_inner(&self, buffer: Option<&CommandBuffer>) -> Result<SubmissionIndex> {
        match buffer {
            Some(buffer) => self.submit_buffer(buffer),
            None => {
                let fresh = self.create_command_encoder(&CommandEncoderProps::default())?;
                let finished = {
                    let mut slot = self.inner.default_encoder.lock();
                    let mut current = std::mem::replace(&mut *slot, fresh);
                    current.finish()
                }?;
                self.submit_buffer(&finished)
            }
        }
    }

    fn submit_buffer(&self, buffer: &CommandBuffer) -> Result<SubmissionIndex> {
        if buffer.device_id() != self.inner.id {
            return Err(GpuError::invalid(format!(
                "command buffer \"{}\" belongs to device {}",
                buffer.label(),
                buffer.device_id()
            )));
        }
        buffer.mark_submitted()?;
        self.with_backend(|backend| {
            backend.submit(buffer.stream());
            Ok(())
        })?;
        let index = self.inner.submissions.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.task_epoch.fetch_add(1, Ordering::AcqRel);
        log::debug!(
            "{}: submitted \"{}\" as #{index}",
            self.inner.id,
            buffer.label()
        );
        Ok(SubmissionIndex(index))
    }

    /// Resolves when all work submitted so far has completed.
    pub fn on_submitted_work_done(&self) -> BoxFuture<'static, Result<()>> {
        self.poll_compilations();
        match self.with_backend(|backend| Ok(backend.on_submitted_work_done())) {
            Ok(done) => done.map(Ok).boxed(),
            Err(err) => futures::future::ready(Err(err)).boxed(),
        }
    }

    /// Keeps polling `compilation` at the device's sync points so a failure
    /// reaches the reporter even if nobody awaits it.
    pub(crate) fn track_compilation(&self, compilation: CompilationFuture) {
        self.inner.compilations.lock().push(compilation);
    }

    /// Drives tracked compilations. Resolved ones report through their own
    /// future, outside the lock.
    fn poll_compilations(&self) {
        let pending = std::mem::take(&mut *self.inner.compilations.lock());
        if pending.is_empty() {
            return;
        }
        let unresolved: Vec<CompilationFuture> = pending
            .into_iter()
            .filter(|compilation| compilation.clone().now_or_never().is_none())
            .collect();
        self.inner.compilations.lock().extend(unresolved);
    }

    //===------------------------------------------------------------------===//
    // Global state
    //===------------------------------------------------------------------===//

    pub fn push_state(&self) -> Result<()> {
        self.with_backend(|backend| {
            if let Some(gl) = backend.gl_state()? {
                gl.push_state();
            }
            Ok(())
        })
    }

    pub fn pop_state(&self) -> Result<()> {
        self.with_backend(|backend| match backend.gl_state()? {
            Some(gl) => gl.pop_state(),
            None => Ok(()),
        })
    }

    pub fn state_depth(&self) -> usize {
        self.inner.backend.lock().state_depth()
    }

    pub fn set_parameters(&self, values: &[(GlParameter, ParameterValue)]) -> Result<()> {
        self.with_backend(|backend| {
            if let Some(gl) = backend.gl_state()? {
                gl.set_parameters(values);
            }
            Ok(())
        })
    }

    pub fn get_parameters(&self, names: &[GlParameter]) -> Result<Parameters> {
        self.with_backend(|backend| backend.get_parameters(names))
    }

    pub fn get_parameter(&self, name: GlParameter) -> Result<ParameterValue> {
        let values = self.get_parameters(&[name])?;
        Ok(values
            .into_iter()
            .next()
            .map(|(_, value)| value)
            .unwrap_or_else(|| name.default_value()))
    }

    pub fn reset_parameters(&self) -> Result<()> {
        self.with_backend(|backend| {
            if let Some(gl) = backend.gl_state()? {
                gl.reset_parameters();
            }
            Ok(())
        })
    }

    /// Runs `f` with `values` applied, then restores the previous values.
    ///
    /// Under [`ParameterMode::Safe`] the restore happens on every exit path,
    /// panics included. Under [`ParameterMode::NoCatch`] an `Err` from `f`
    /// skips the restore and leaves the state stack one frame deeper.
    pub fn with_parameters<R>(
        &self,
        values: &[(GlParameter, ParameterValue)],
        mode: ParameterMode,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let tracked = self.with_backend(|backend| match backend.gl_state()? {
            Some(gl) => {
                gl.push_state();
                gl.set_parameters(values);
                Ok(true)
            }
            None => Ok(false),
        })?;
        if !tracked {
            return f();
        }
        match mode {
            ParameterMode::Safe => {
                let _restore = StateGuard { device: self };
                f()
            }
            ParameterMode::NoCatch => {
                if !self.inner.nocatch_warned.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "{}: parameters applied without restore on error",
                        self.inner.id
                    );
                }
                let result = f()?;
                self.pop_state()?;
                Ok(result)
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Errors
    //===------------------------------------------------------------------===//

    pub fn set_error_handler(&self, handler: Option<ErrorHandler>) {
        self.inner.reporter.set_handler(handler);
    }

    pub fn set_debug_hook(&self, hook: Option<DebugHook>) {
        self.inner.reporter.set_debug_hook(hook);
    }

    /// Sends `error` to the installed handler, or logs it.
    pub fn report_error(&self, error: &GpuError) {
        self.inner.reporter.report(&self.inner.id, error);
    }

    /// Enters the debug hook. Does nothing outside debug mode.
    pub fn debug(&self) {
        if self.inner.debug {
            self.inner.reporter.debug(&self.inner.id);
        }
    }

    pub fn reported_error_count(&self) -> usize {
        self.inner.reporter.reported()
    }

    pub fn push_error_scope(&self, filter: ErrorFilter) -> Result<()> {
        self.with_backend(|backend| {
            backend.push_error_scope(filter);
            Ok(())
        })
    }

    pub fn pop_error_scope(&self) -> Result<Option<NativeError>> {
        self.with_backend(|backend| Ok(backend.pop_error_scope()))
    }

    //===------------------------------------------------------------------===//
    // Loss and teardown
    //===------------------------------------------------------------------===//

    /// Resolves once, when the device is destroyed or its context is lost.
    pub fn lost(&self) -> LostFuture {
        self.inner.lost.future()
    }

    fn mark_lost(&self, reason: LostReason, message: &str) -> bool {
        {
            let mut status = self.inner.status.lock();
            if status.status != DeviceStatus::Alive {
                return false;
            }
            status.status = DeviceStatus::Lost;
            status.message = message.to_string();
        }
        log::error!("{}: device lost: {message}", self.inner.id);
        self.inner.lost.fire(LostInfo {
            reason,
            message: message.to_string(),
        })
    }

    /// Called by the platform layer when it learns the context is gone.
    pub fn notify_context_lost(&self, message: &str) {
        self.mark_lost(LostReason::Unknown, message);
    }

    /// Forces loss. Returns whether the native context was actually lost
    /// rather than only marked.
    pub fn lose_device(&self) -> bool {
        let native = match self.ensure_alive() {
            Ok(()) => self.inner.backend.lock().lose_context(),
            Err(_) => false,
        };
        self.mark_lost(LostReason::Destroyed, "application triggered context loss");
        native
    }

    /// Releases the native context. Safe to call any number of times.
    pub fn destroy(&self) {
        if !self.owner {
            log::debug!("{}: destroy ignored on a reused handle", self.inner.id);
            return;
        }
        {
            let mut status = self.inner.status.lock();
            if status.status == DeviceStatus::Destroyed {
                return;
            }
            status.status = DeviceStatus::Destroyed;
            status.message = "device destroyed".to_string();
        }
        self.poll_compilations();
        {
            let mut backend = self.inner.backend.lock();
            let depth = backend.state_depth();
            if depth > 0 {
                log::warn!(
                    "{}: destroyed with {depth} unmatched state push(es)",
                    self.inner.id
                );
            }
            backend.release();
        }
        self.inner.unregister();
        log::info!("{}: destroyed", self.inner.id);
        self.inner.lost.fire(LostInfo {
            reason: LostReason::Destroyed,
            message: "device destroyed".to_string(),
        });
    }

    #[cfg(test)]
    pub(crate) fn live_null_objects(&self) -> Option<usize> {
        self.inner.backend.lock().live_null_objects()
    }
}

impl DeviceInner {
    fn unregister(&self) {
        let Some(registry) = self.registry.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let mut registry = registry.lock();
        let bound_here = registry
            .get(&self.context)
            .map(|weak| std::ptr::eq(weak.as_ptr(), self))
            .unwrap_or(false);
        if bound_here {
            registry.remove(&self.context);
        }
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        let status = self.status.get_mut();
        if status.status == DeviceStatus::Alive {
            self.backend.get_mut().release();
            log::debug!("{}: dropped without destroy", self.id);
        }
        self.unregister();
    }
}

/// Pops the state frame pushed by `with_parameters`.
struct StateGuard<'a> {
    device: &'a Device,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.device.pop_state() {
            log::error!("{}: failed to restore parameters: {err}", self.device.id());
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("backend", &self.inner.kind)
            .field("context", &self.inner.context)
            .field("status", &self.status())
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::DeviceFactory;
    use crate::resource::{Resource, ResourceState};

    fn null_device() -> Device {
        DeviceFactory::headless()
            .create_null_device(&DeviceProps::default())
            .expect("null device")
    }

    #[test]
    fn null_objects_are_released() {
        let device = null_device();
        let buffer = device
            .create_buffer(&BufferProps {
                byte_length: 16,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(device.live_null_objects(), Some(1));
        buffer.destroy();
        assert_eq!(buffer.state(), ResourceState::Destroyed);
        assert_eq!(device.live_null_objects(), Some(0));
    }

    #[test]
    fn lost_device_rejects_creation() {
        let device = null_device();
        assert!(!device.lose_device());
        assert!(device.is_lost());
        let err = device.create_buffer(&BufferProps::default()).unwrap_err();
        assert!(matches!(err, GpuError::DeviceLost { .. }));
    }

    #[test]
    fn destroy_is_idempotent() {
        let device = null_device();
        device.destroy();
        device.destroy();
        assert_eq!(device.status(), DeviceStatus::Destroyed);
        let info = pollster::block_on(device.lost());
        assert_eq!(info.reason, LostReason::Destroyed);
    }

    #[test]
    fn null_state_calls_are_noops() {
        let device = null_device();
        device.push_state().unwrap();
        device.pop_state().unwrap();
        let value = device
            .with_parameters(
                &[(GlParameter::DepthTest, ParameterValue::Bool(true))],
                ParameterMode::Safe,
                || Ok(7),
            )
            .unwrap();
        assert_eq!(value, 7);
    }
}
