mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use lumo::native::recording::HeadlessProvider;
use lumo::native::ErrorFilter;
use lumo::*;
use serial_test::serial;

fn canvas(name: &str) -> DeviceBuilder {
    DeviceBuilder::new().canvas(name, 640, 480)
}

#[test]
fn second_device_on_a_canvas_is_rejected() {
    init_logging();
    let factory = DeviceFactory::headless();
    let first = canvas("main").build(&factory).unwrap();
    assert_eq!(first.backend_kind(), BackendKind::Gl);
    assert_eq!(first.surface().width, 640);

    let err = canvas("main").build(&factory).unwrap_err();
    assert!(matches!(err, GpuError::ContextAlreadyBound { ref device } if device == first.id()));

    let other = canvas("overlay").build(&factory).unwrap();
    assert_ne!(other, first);
}

#[test]
fn reuse_returns_the_bound_device() {
    init_logging();
    let factory = DeviceFactory::headless();
    let first = canvas("main").build(&factory).unwrap();
    let reused = canvas("main")
        .reuse_existing_device(true)
        .build(&factory)
        .unwrap();
    assert_eq!(reused, first);
    assert!(first.is_owner());
    assert!(!reused.is_owner());

    reused.destroy();
    assert_eq!(first.status(), DeviceStatus::Alive);

    first.destroy();
    assert_eq!(reused.status(), DeviceStatus::Destroyed);
    let again = canvas("main").build(&factory).unwrap();
    assert_ne!(again, first);
}

#[test]
fn destroy_fires_lost_once() {
    let device = null_device();
    let lost = device.lost();
    device.destroy();
    device.destroy();
    let info = pollster::block_on(lost);
    assert_eq!(info.reason, LostReason::Destroyed);
    assert_eq!(pollster::block_on(device.lost()), info);
    assert_eq!(device.status(), DeviceStatus::Destroyed);
    assert!(device.is_lost());

    let err = device
        .create_buffer(&BufferProps {
            byte_length: 4,
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceLost);
}

#[test]
fn dropping_the_device_still_resolves_lost() {
    let device = null_device();
    let lost = device.lost();
    drop(device);
    assert_eq!(pollster::block_on(lost).reason, LostReason::Destroyed);
}

#[test]
fn platform_loss_stops_native_calls() {
    let (device, stats) = gl_device();
    let buffer = device
        .create_buffer(&BufferProps {
            byte_length: 4,
            ..Default::default()
        })
        .unwrap();
    stats.lose("gpu reset");
    let before = stats.calls().len();

    let err = buffer.write(&[1, 2, 3, 4], 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceLost);
    assert_eq!(device.status(), DeviceStatus::Lost);
    let info = pollster::block_on(device.lost());
    assert_eq!(info.reason, LostReason::Unknown);
    assert_eq!(info.message, "gpu reset");

    buffer.destroy();
    assert!(device.create_sampler(&SamplerProps::default()).is_err());
    assert_eq!(stats.calls().len(), before);
}

#[test]
fn notified_loss_reports_unknown() {
    let device = null_device();
    device.notify_context_lost("tab backgrounded");
    let info = pollster::block_on(device.lost());
    assert_eq!(info.reason, LostReason::Unknown);
    assert_eq!(info.message, "tab backgrounded");
    device.destroy();
    assert_eq!(device.status(), DeviceStatus::Destroyed);
}

#[test]
fn lose_device_uses_the_native_extension() {
    let (device, stats) = gl_device();
    assert!(device.lose_device());
    assert!(stats.is_lost());
    assert!(device.is_lost());
    assert!(!device.lose_device());

    let null = null_device();
    assert!(!null.lose_device());
    assert!(null.is_lost());
}

#[test]
fn explicit_is_preferred_when_available() {
    init_logging();
    let factory = DeviceFactory::headless();
    let device = DeviceBuilder::new()
        .prefer_explicit_backend(true)
        .build(&factory)
        .unwrap();
    assert_eq!(device.backend_kind(), BackendKind::Explicit);
    assert_eq!(device.info().shading_language, "wgsl");
    assert!(device.has_feature(DeviceFeature::Compute));
    assert_eq!(device.texture_byte_alignment(), 256);

    let fallback = DeviceFactory::new(HeadlessProvider::gl_only());
    let device = DeviceBuilder::new()
        .prefer_explicit_backend(true)
        .build(&fallback)
        .unwrap();
    assert_eq!(device.backend_kind(), BackendKind::Gl);
    assert!(!device.has_feature(DeviceFeature::Compute));
    let err = DeviceBuilder::new()
        .backend(BackendKind::Explicit)
        .build(&fallback)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[test]
fn feature_requirements_are_checked() {
    init_logging();
    let provider = HeadlessProvider::new().with_gl_extensions(Vec::<String>::new());
    let factory = DeviceFactory::new(provider);
    let err = DeviceBuilder::new()
        .backend(BackendKind::Gl)
        .require(DeviceFeature::Float32Renderable)
        .build(&factory)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert!(err.to_string().contains("float32-renderable"));

    let device = DeviceBuilder::new()
        .backend(BackendKind::Explicit)
        .disable(DeviceFeature::Compute)
        .build(&factory)
        .unwrap();
    assert!(!device.has_feature(DeviceFeature::Compute));
    let mut encoder = device
        .create_command_encoder(&CommandEncoderProps::default())
        .unwrap();
    assert_eq!(
        encoder.begin_compute_pass(None).err().map(|err| err.kind()),
        Some(ErrorKind::UnsupportedOperation)
    );
}

#[test]
fn reported_errors_reach_the_handler() {
    let device = null_device();
    device.report_error(&GpuError::Native("logged".into()));
    let errors = collect_errors(&device);
    device.report_error(&GpuError::InvalidState("handled".into()));
    assert_eq!(errors.lock().len(), 1);
    assert_eq!(device.reported_error_count(), 2);
}

#[test]
#[serial]
fn debug_hook_runs_only_in_debug_mode() {
    init_logging();
    let factory = DeviceFactory::without_provider();
    let hits = Arc::new(AtomicUsize::new(0));
    for debug in [false, true] {
        let device = factory
            .create_null_device(&DeviceProps {
                debug,
                ..Default::default()
            })
            .unwrap();
        let counter = hits.clone();
        device.set_debug_hook(Some(Arc::new(move |_: &str| {
            counter.fetch_add(1, Ordering::Relaxed);
        })));
        device.debug();
    }
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}

#[test]
fn error_scopes_pass_through_on_explicit() {
    let (device, _stats) = explicit_device();
    device.push_error_scope(ErrorFilter::OutOfMemory).unwrap();
    assert_eq!(device.pop_error_scope().unwrap(), None);

    let null = null_device();
    null.push_error_scope(ErrorFilter::Validation).unwrap();
    assert_eq!(null.pop_error_scope().unwrap(), None);
}

#[test]
#[serial]
fn debug_env_forces_debug_mode() {
    std::env::set_var(DEBUG_ENV, "1");
    let forced = null_device();
    std::env::set_var(DEBUG_ENV, "0");
    let plain = null_device();
    std::env::remove_var(DEBUG_ENV);
    assert!(forced.is_debug());
    assert!(!plain.is_debug());
}
