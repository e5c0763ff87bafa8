mod common;

use std::sync::Arc;

use common::*;
use lumo::*;

#[test]
fn buffer_write_after_destroy_fails() {
    let device = null_device();
    let buffer = device
        .create_buffer(&BufferProps {
            byte_length: 64,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(buffer.state(), ResourceState::Ready);
    buffer.destroy();
    assert_eq!(buffer.state(), ResourceState::Destroyed);
    let err = buffer.write(&[0; 4], 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceDestroyed);
    buffer.destroy();
}

#[test]
fn every_stateful_resource_releases_its_native_object() {
    let (device, stats) = gl_device();
    let vs = shader(&device, ShaderStage::Vertex, GLSL_VS);
    let fs = shader(&device, ShaderStage::Fragment, GLSL_FS);
    let buffer = device
        .create_buffer(&BufferProps {
            byte_length: 256,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            ..Default::default()
        })
        .unwrap();
    let texture = device
        .create_texture(&TextureProps {
            width: 16,
            height: 16,
            ..Default::default()
        })
        .unwrap();
    let sampler = device.create_sampler(&SamplerProps::default()).unwrap();
    let framebuffer = device
        .create_framebuffer(&FramebufferProps {
            width: 32,
            height: 32,
            color_attachments: vec![Attachment::Format(TextureFormat::Rgba8Unorm)],
            depth_stencil_attachment: Some(Attachment::Format(TextureFormat::Depth24Plus)),
            ..Default::default()
        })
        .unwrap();
    let pipeline = device
        .create_render_pipeline(&RenderPipelineProps::new(vs.clone(), Some(fs.clone())))
        .unwrap();
    let vertex_array = device
        .create_vertex_array(&VertexArrayProps::default())
        .unwrap();
    vertex_array.set_buffer(0, buffer.clone()).unwrap();
    let feedback = device
        .create_transform_feedback(&TransformFeedbackProps::default())
        .unwrap();
    let queries = device.create_query_set(&QuerySetProps::default()).unwrap();

    // Two attachment textures come with the framebuffer.
    assert_eq!(stats.live_objects(), 12);

    let resources: [&dyn Resource; 10] = [
        &*queries,
        &*feedback,
        &*vertex_array,
        &*pipeline,
        &*framebuffer,
        &*sampler,
        &*texture,
        &*buffer,
        &*fs,
        &*vs,
    ];
    for resource in &resources {
        resource.destroy();
        assert_eq!(resource.state(), ResourceState::Destroyed);
        assert!(resource.handle().is_none());
    }
    assert_eq!(stats.live_objects(), 0);

    for resource in &resources {
        resource.destroy();
    }
    assert_eq!(
        vertex_array.set_buffer(0, buffer.clone()).unwrap_err().kind(),
        ErrorKind::ResourceDestroyed
    );
    assert_eq!(
        texture.write(&[0; 16 * 16 * 4]).unwrap_err().kind(),
        ErrorKind::ResourceDestroyed
    );
}

#[test]
fn dropping_the_last_owner_destroys() {
    let (device, stats) = gl_device();
    let buffer = device
        .create_buffer(&BufferProps {
            byte_length: 16,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(stats.live_objects_of(ResourceKind::Buffer), 1);
    drop(buffer);
    assert_eq!(stats.live_objects_of(ResourceKind::Buffer), 0);
}

#[test]
fn buffer_contents_round_trip() {
    let (device, _stats) = explicit_device();
    let buffer = device
        .create_buffer(&BufferProps {
            usage: BufferUsage::COPY_SRC | BufferUsage::COPY_DST | BufferUsage::MAP_READ,
            data: Some(vec![1, 2, 3, 4, 5, 6, 7, 8]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(buffer.byte_length(), 8);
    buffer.write(&[9, 9], 2).unwrap();
    let bytes = pollster::block_on(buffer.read_async(0, None)).unwrap();
    assert_eq!(bytes, vec![1, 2, 9, 9, 5, 6, 7, 8]);
    let tail = pollster::block_on(buffer.read_async(6, Some(2))).unwrap();
    assert_eq!(tail, vec![7, 8]);
    assert!(buffer.write(&[0; 4], 6).is_err());
}

#[test]
fn texture_resize_replaces_the_native_object() {
    let (device, stats) = gl_device();
    let texture = device
        .create_texture(&TextureProps {
            width: 8,
            height: 8,
            ..Default::default()
        })
        .unwrap();
    let before = texture.handle();
    texture.resize(16, 4).unwrap();
    assert_ne!(texture.handle(), before);
    assert_eq!((texture.width(), texture.height()), (16, 4));
    assert_eq!(stats.live_objects_of(ResourceKind::Texture), 1);
}

#[test]
fn framebuffer_resize_follows_owned_attachments() {
    let (device, stats) = gl_device();
    let framebuffer = device
        .create_framebuffer(&FramebufferProps {
            width: 64,
            height: 64,
            color_attachments: vec![Attachment::Format(TextureFormat::Rgba8Unorm)],
            ..Default::default()
        })
        .unwrap();
    framebuffer.resize(128, 32).unwrap();
    assert_eq!((framebuffer.width(), framebuffer.height()), (128, 32));
    let color = &framebuffer.color_textures()[0];
    assert_eq!((color.width(), color.height()), (128, 32));
    framebuffer.destroy();
    assert_eq!(stats.live_objects(), 0);
}

#[test]
fn unsupported_kinds_fail_cleanly() {
    let (device, stats) = gl_device();
    let err = device
        .import_external_texture(&ExternalTextureProps {
            source: "video".into(),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(stats.live_objects(), 0);

    let (explicit, _) = explicit_device();
    let err = explicit
        .create_transform_feedback(&TransformFeedbackProps::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[test]
fn resources_keep_their_device_alive() {
    let (device, stats) = gl_device();
    let buffer: Arc<Buffer> = device
        .create_buffer(&BufferProps {
            byte_length: 4,
            ..Default::default()
        })
        .unwrap();
    let owner = buffer.device().clone();
    drop(device);
    assert!(!owner.is_lost());
    buffer.write(&[1, 2, 3, 4], 0).unwrap();
    assert_eq!(stats.live_objects(), 1);
}
