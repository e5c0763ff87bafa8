#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lumo::native::recording::{RecordingExplicit, RecordingGl, RecordingStats};
use lumo::native::{ContextId, NativeDevice};
use lumo::{Device, DeviceFactory, DeviceProps, GpuError, Shader, ShaderProps, ShaderStage};
use parking_lot::Mutex;

pub const GLSL_VS: &str = "#version 300 es\nvoid main() {\n  gl_Position = vec4(0.0);\n}\n";
pub const GLSL_FS: &str = "#version 300 es\nprecision mediump float;\nout vec4 color;\n\
    void main() {\n  color = vec4(1.0);\n}\n";
pub const WGSL_VS: &str =
    "@vertex fn main() -> @builtin(position) vec4<f32> {\n  return vec4<f32>(0.0);\n}\n";
pub const WGSL_FS: &str =
    "@fragment fn main() -> @location(0) vec4<f32> {\n  return vec4<f32>(1.0);\n}\n";

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

fn next_context() -> ContextId {
    ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn null_device() -> Device {
    init_logging();
    DeviceFactory::without_provider()
        .create_null_device(&DeviceProps::default())
        .unwrap()
}

/// A stateful device over a fresh recording context.
pub fn gl_device() -> (Device, RecordingStats) {
    init_logging();
    let gl = RecordingGl::new(next_context());
    let stats = gl.stats();
    let device = DeviceFactory::without_provider()
        .attach_device(NativeDevice::Gl(Box::new(gl)), &DeviceProps::default())
        .unwrap();
    (device, stats)
}

/// An explicit device over a fresh recording context.
pub fn explicit_device() -> (Device, RecordingStats) {
    init_logging();
    let ctx = RecordingExplicit::new(next_context());
    let stats = ctx.stats();
    let device = DeviceFactory::without_provider()
        .attach_device(NativeDevice::Explicit(Box::new(ctx)), &DeviceProps::default())
        .unwrap();
    (device, stats)
}

/// Installs a handler that keeps every reported error.
pub fn collect_errors(device: &Device) -> Arc<Mutex<Vec<GpuError>>> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    device.set_error_handler(Some(Arc::new(move |err: &GpuError| {
        sink.lock().push(err.clone())
    })));
    errors
}

pub fn shader(device: &Device, stage: ShaderStage, source: &str) -> Arc<Shader> {
    device
        .create_shader(&ShaderProps {
            stage,
            source: source.to_string(),
            ..Default::default()
        })
        .unwrap()
}
