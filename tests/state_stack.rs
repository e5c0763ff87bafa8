mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};

use common::*;
use lumo::*;

const DEPTH_ON: (GlParameter, ParameterValue) =
    (GlParameter::DepthTest, ParameterValue::Bool(true));

#[test]
fn pop_restores_pushed_values() {
    let (device, stats) = gl_device();
    device
        .set_parameters(&[(GlParameter::ClearColor, ParameterValue::Float4([0.5; 4]))])
        .unwrap();
    device.push_state().unwrap();
    device
        .set_parameters(&[
            DEPTH_ON,
            (GlParameter::ClearColor, ParameterValue::Float4([1.0; 4])),
        ])
        .unwrap();
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(true));
    device.pop_state().unwrap();

    assert_eq!(device.state_depth(), 0);
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(false));
    assert_eq!(
        stats.parameter(GlParameter::ClearColor),
        ParameterValue::Float4([0.5; 4])
    );
    assert_eq!(
        device.get_parameter(GlParameter::ClearColor).unwrap(),
        ParameterValue::Float4([0.5; 4])
    );
}

#[test]
fn pop_on_empty_stack_is_an_error() {
    let (device, _stats) = gl_device();
    let err = device.pop_state().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn redundant_writes_are_skipped() {
    let (device, stats) = gl_device();
    device.set_parameters(&[DEPTH_ON]).unwrap();
    let writes = stats.parameter_writes();
    device.set_parameters(&[DEPTH_ON]).unwrap();
    device
        .set_parameters(&[(GlParameter::LineWidth, ParameterValue::Float(1.0))])
        .unwrap();
    assert_eq!(stats.parameter_writes(), writes);
}

#[test]
fn with_parameters_scopes_the_change() {
    let (device, stats) = gl_device();
    let seen = device
        .with_parameters(&[DEPTH_ON], ParameterMode::Safe, || {
            device.get_parameter(GlParameter::DepthTest)
        })
        .unwrap();
    assert_eq!(seen, ParameterValue::Bool(true));
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(false));
    assert_eq!(device.state_depth(), 0);
}

#[test]
fn safe_mode_restores_after_error() {
    let (device, stats) = gl_device();
    let result: lumo::Result<()> = device.with_parameters(&[DEPTH_ON], ParameterMode::Safe, || {
        Err(GpuError::InvalidState("callback failed".into()))
    });
    assert!(result.is_err());
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(false));
    assert_eq!(device.state_depth(), 0);
}

#[test]
fn safe_mode_restores_after_panic() {
    let (device, stats) = gl_device();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _ = device.with_parameters(&[DEPTH_ON], ParameterMode::Safe, || -> lumo::Result<()> {
            panic!("callback panicked")
        });
    }));
    assert!(outcome.is_err());
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(false));
    assert_eq!(device.state_depth(), 0);
}

#[test]
fn nocatch_mode_leaves_state_on_error() {
    let (device, stats) = gl_device();
    let result: lumo::Result<()> = device.with_parameters(&[DEPTH_ON], ParameterMode::NoCatch, || {
        Err(GpuError::InvalidState("callback failed".into()))
    });
    assert!(result.is_err());
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(true));
    assert_eq!(device.state_depth(), 1);
    device.pop_state().unwrap();
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(false));

    let value = device
        .with_parameters(&[DEPTH_ON], ParameterMode::NoCatch, || Ok(7))
        .unwrap();
    assert_eq!(value, 7);
    assert_eq!(device.state_depth(), 0);
}

#[test]
fn pipeline_state_is_scoped_to_the_pass() {
    let (device, stats) = gl_device();
    let vs = shader(&device, ShaderStage::Vertex, GLSL_VS);
    let fs = shader(&device, ShaderStage::Fragment, GLSL_FS);
    let mut props = RenderPipelineProps::new(vs, Some(fs));
    props.parameters.depth_compare = Some(CompareFunction::LessEqual);
    props.parameters.cull_mode = CullMode::Back;
    let pipeline = device.create_render_pipeline(&props).unwrap();

    let mut encoder = device
        .create_command_encoder(&CommandEncoderProps::default())
        .unwrap();
    let mut pass = encoder.begin_render_pass(&RenderPassProps::default()).unwrap();
    pass.set_pipeline(&pipeline).unwrap();
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(true));
    assert_eq!(stats.parameter(GlParameter::CullFace), ParameterValue::Bool(true));
    assert_eq!(
        stats.parameter(GlParameter::Viewport),
        ParameterValue::Int4([0, 0, 800, 600])
    );
    pass.draw(3, 1, 0, 0).unwrap();
    pass.end().unwrap();

    assert_eq!(stats.draw_count(), 1);
    assert_eq!(stats.parameter(GlParameter::DepthTest), ParameterValue::Bool(false));
    assert_eq!(stats.parameter(GlParameter::CullFace), ParameterValue::Bool(false));
    assert_eq!(device.state_depth(), 0);
}

#[test]
fn explicit_backend_rejects_parameters() {
    let (device, _stats) = explicit_device();
    assert_eq!(
        device.push_state().unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );
    let result = device.with_parameters(&[DEPTH_ON], ParameterMode::Safe, || Ok(()));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::UnsupportedOperation);
}

#[test]
fn null_backend_runs_the_callback() {
    let device = null_device();
    device.push_state().unwrap();
    device.set_parameters(&[DEPTH_ON]).unwrap();
    device.pop_state().unwrap();
    let value = device
        .with_parameters(&[DEPTH_ON], ParameterMode::Safe, || Ok("ran"))
        .unwrap();
    assert_eq!(value, "ran");
    assert_eq!(device.state_depth(), 0);
}

#[test]
fn attached_context_state_is_read_back() {
    use lumo::native::recording::RecordingGl;
    use lumo::native::{ContextId, GlContext, NativeDevice};

    let mut gl = RecordingGl::new(ContextId(9000));
    gl.set_parameter(GlParameter::Blend, ParameterValue::Bool(true));
    let stats = gl.stats();
    let device = DeviceFactory::without_provider()
        .attach_device(NativeDevice::Gl(Box::new(gl)), &DeviceProps::default())
        .unwrap();
    assert_eq!(
        device.get_parameter(GlParameter::Blend).unwrap(),
        ParameterValue::Bool(true)
    );
    let writes = stats.parameter_writes();
    device
        .set_parameters(&[(GlParameter::Blend, ParameterValue::Bool(true))])
        .unwrap();
    assert_eq!(stats.parameter_writes(), writes);
}
