mod common;

use std::sync::Arc;

use common::*;
use lumo::*;

fn null_pipeline(device: &Device) -> Arc<RenderPipeline> {
    let vs = shader(device, ShaderStage::Vertex, WGSL_VS);
    device
        .create_render_pipeline(&RenderPipelineProps::new(vs, None))
        .unwrap()
}

#[test]
fn command_buffer_submits_once() {
    let device = null_device();
    let pipeline = null_pipeline(&device);
    let mut encoder = device
        .create_command_encoder(&CommandEncoderProps::default())
        .unwrap();
    {
        let mut pass = encoder.begin_render_pass(&RenderPassProps::default()).unwrap();
        pass.set_pipeline(&pipeline).unwrap();
        pass.draw(3, 1, 0, 0).unwrap();
        pass.end().unwrap();
    }
    let buffer = encoder.finish().unwrap();

    let first = device.submit(Some(&buffer)).unwrap();
    assert!(buffer.is_submitted());
    let err = device.submit(Some(&buffer)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    assert!(encoder.is_finished());
    let err = encoder.push_debug_group("late").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(encoder.finish().unwrap_err().kind(), ErrorKind::InvalidState);

    let next = device.submit(None).unwrap();
    assert!(next > first);
}

#[test]
fn deferred_work_runs_at_submit() {
    let (device, stats) = explicit_device();
    let vs = shader(&device, ShaderStage::Vertex, WGSL_VS);
    let fs = shader(&device, ShaderStage::Fragment, WGSL_FS);
    let pipeline = device
        .create_render_pipeline(&RenderPipelineProps::new(vs, Some(fs)))
        .unwrap();

    let mut encoder = device
        .create_command_encoder(&CommandEncoderProps {
            label: Some("frame".into()),
        })
        .unwrap();
    assert_eq!(encoder.strategy(), EncodeStrategy::Deferred);
    {
        let mut pass = encoder
            .begin_render_pass(&RenderPassProps {
                label: Some("opaque"),
                clear_color: Some([0.1, 0.2, 0.3, 1.0]),
                ..Default::default()
            })
            .unwrap();
        pass.set_pipeline(&pipeline).unwrap();
        pass.draw(6, 2, 0, 0).unwrap();
        pass.end().unwrap();
    }
    let buffer = encoder.finish().unwrap();
    assert_eq!(stats.draw_count(), 0);

    device.submit(Some(&buffer)).unwrap();
    assert_eq!(stats.draw_count(), 1);
    assert_eq!(stats.submissions(), 1);
    let calls = stats.calls();
    let submit = calls
        .iter()
        .position(|call| call.starts_with("queue_submit"))
        .unwrap();
    assert_eq!(calls[submit + 1], "push_group opaque");
    assert!(calls[submit + 2].starts_with("begin_render_pass"));
    assert_eq!(calls.last().map(String::as_str), Some("pop_group"));

    pollster::block_on(device.on_submitted_work_done()).unwrap();
}

#[test]
fn eager_work_runs_while_recording() {
    let (device, stats) = gl_device();
    let vs = shader(&device, ShaderStage::Vertex, GLSL_VS);
    let fs = shader(&device, ShaderStage::Fragment, GLSL_FS);
    let pipeline = device
        .create_render_pipeline(&RenderPipelineProps::new(vs, Some(fs)))
        .unwrap();
    let mut encoder = device
        .create_command_encoder(&CommandEncoderProps::default())
        .unwrap();
    assert_eq!(encoder.strategy(), EncodeStrategy::Eager);
    {
        let mut pass = encoder.begin_render_pass(&RenderPassProps::default()).unwrap();
        pass.set_pipeline(&pipeline).unwrap();
        pass.draw(3, 1, 0, 0).unwrap();
        assert_eq!(stats.draw_count(), 1);
    }
    let buffer = encoder.finish().unwrap();
    assert!(buffer.stream().is_none());
    device.submit(Some(&buffer)).unwrap();
    assert_eq!(stats.submissions(), 1);
    assert_eq!(device.state_depth(), 0);
}

#[test]
fn default_encoder_is_replaced_on_submit() {
    let device = null_device();
    device
        .with_default_encoder(|encoder| encoder.push_debug_group("frame"))
        .unwrap();
    let err = device.submit(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    device
        .with_default_encoder(|encoder| encoder.insert_debug_marker("fresh"))
        .unwrap();
    device.submit(None).unwrap();
    assert!(!device.with_default_encoder(|encoder| encoder.is_finished()));
}

#[test]
fn buffer_copies_reach_the_destination() {
    let (device, stats) = explicit_device();
    let source = device
        .create_buffer(&BufferProps {
            usage: BufferUsage::COPY_SRC,
            data: Some((0..16).collect()),
            ..Default::default()
        })
        .unwrap();
    let destination = device
        .create_buffer(&BufferProps {
            byte_length: 16,
            usage: BufferUsage::COPY_DST | BufferUsage::MAP_READ,
            ..Default::default()
        })
        .unwrap();
    let mut encoder = device
        .create_command_encoder(&CommandEncoderProps::default())
        .unwrap();
    encoder
        .copy_buffer_to_buffer(&source, 4, &destination, 0, 8)
        .unwrap();
    assert!(encoder
        .copy_buffer_to_buffer(&destination, 0, &source, 0, 4)
        .is_err());
    let buffer = encoder.finish().unwrap();
    device.submit(Some(&buffer)).unwrap();

    let bytes = pollster::block_on(destination.read_async(0, Some(8))).unwrap();
    assert_eq!(bytes, vec![4, 5, 6, 7, 8, 9, 10, 11]);
    assert!(stats.calls().iter().any(|call| call.starts_with("copy buffer")));
}

#[test]
fn foreign_resources_are_rejected() {
    let device = null_device();
    let other = null_device();
    let pipeline = null_pipeline(&other);
    let mut encoder = device
        .create_command_encoder(&CommandEncoderProps::default())
        .unwrap();
    let mut pass = encoder.begin_render_pass(&RenderPassProps::default()).unwrap();
    let err = pass.set_pipeline(&pipeline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    pass.end().unwrap();
    let buffer = encoder.finish().unwrap();
    let err = other.submit(Some(&buffer)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
}

#[test]
fn timestamps_resolve_into_a_buffer() {
    let (device, _stats) = explicit_device();
    let queries = device
        .create_query_set(&QuerySetProps {
            kind: QueryType::Timestamp,
            count: 2,
            ..Default::default()
        })
        .unwrap();
    let results = device
        .create_buffer(&BufferProps {
            byte_length: queries.resolve_size(2),
            usage: BufferUsage::QUERY_RESOLVE | BufferUsage::COPY_SRC,
            ..Default::default()
        })
        .unwrap();
    let mut encoder = device
        .create_command_encoder(&CommandEncoderProps::default())
        .unwrap();
    encoder.write_timestamp(&queries, 0).unwrap();
    encoder.write_timestamp(&queries, 1).unwrap();
    assert!(encoder.write_timestamp(&queries, 2).is_err());
    encoder
        .resolve_query_set(&queries, 0, 2, &results, 0)
        .unwrap();
    device.submit(Some(&encoder.finish().unwrap())).unwrap();

    let bytes = pollster::block_on(results.read_async(8, Some(8))).unwrap();
    assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), 1000);
}

#[test]
fn external_textures_expire_at_submit() {
    let (device, stats) = explicit_device();
    let frame = device
        .import_external_texture(&ExternalTextureProps {
            source: "camera-0".into(),
            ..Default::default()
        })
        .unwrap();
    assert!(frame.live_handle().is_ok());
    assert_eq!(frame.state(), ResourceState::Ready);

    device.submit(None).unwrap();
    assert!(frame.is_expired());
    assert_eq!(frame.state(), ResourceState::Destroyed);
    assert_eq!(
        frame.live_handle().unwrap_err().kind(),
        ErrorKind::ResourceDestroyed
    );
    // The platform owns the frame, so nothing is deleted natively.
    assert!(!stats.calls().iter().any(|call| call.starts_with("delete external")));
}

#[test]
fn submit_after_teardown_fails() {
    for lose in [false, true] {
        let device = null_device();
        let mut encoder = device
            .create_command_encoder(&CommandEncoderProps::default())
            .unwrap();
        encoder.insert_debug_marker("late").unwrap();
        let buffer = encoder.finish().unwrap();
        if lose {
            device.lose_device();
        } else {
            device.destroy();
        }
        let err = device.submit(Some(&buffer)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceLost);
        assert!(!buffer.is_submitted());
        assert_eq!(device.submit(None).unwrap_err().kind(), ErrorKind::DeviceLost);
        assert_eq!(
            pollster::block_on(device.on_submitted_work_done())
                .unwrap_err()
                .kind(),
            ErrorKind::DeviceLost
        );
    }
}
