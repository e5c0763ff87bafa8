use std::sync::Arc;

use parking_lot::Mutex;

use super::texture::{Texture, TextureProps, TextureUsage};
use super::{Resource, ResourceCore, ResourceKind};
use crate::caps::TextureFormat;
use crate::driver::ir::MAX_PASS_COLORS;
use crate::error::{GpuError, Result};
use crate::gpu::{ContextBackend, Device};
use crate::native::{AttachPoint, NativeHandle, ObjectDescriptor};

/// One framebuffer attachment.
#[derive(Debug, Clone)]
pub enum Attachment {
    /// Render into an existing texture. The framebuffer shares it.
    Texture(Arc<Texture>),
    /// Create and own a texture of this format at the framebuffer size.
    Format(TextureFormat),
}

#[derive(Debug, Clone, Default)]
pub struct FramebufferProps {
    pub label: Option<String>,
    /// Zero takes the size of the first texture attachment, or the surface.
    pub width: u32,
    pub height: u32,
    pub color_attachments: Vec<Attachment>,
    pub depth_stencil_attachment: Option<Attachment>,
}

struct Slot {
    texture: Arc<Texture>,
    owned: bool,
}

struct Attachments {
    width: u32,
    height: u32,
    colors: Vec<Slot>,
    depth: Option<Slot>,
}

/// Native handles a render pass needs from its framebuffer.
pub(crate) struct PassTargets {
    pub(crate) framebuffer: NativeHandle,
    pub(crate) colors: [NativeHandle; MAX_PASS_COLORS],
    pub(crate) color_count: u32,
    pub(crate) depth: NativeHandle,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// A set of render targets of one size and sample count.
pub struct Framebuffer {
    core: ResourceCore,
    attachments: Mutex<Attachments>,
}

impl Resource for Framebuffer {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    /// Also destroys the textures this framebuffer created.
    fn destroy(&self) {
        self.core.destroy();
        let owned: Vec<Arc<Texture>> = {
            let attachments = self.attachments.lock();
            attachments
                .colors
                .iter()
                .chain(attachments.depth.iter())
                .filter(|slot| slot.owned)
                .map(|slot| slot.texture.clone())
                .collect()
        };
        for texture in owned {
            texture.destroy();
        }
    }
}

fn depth_point(format: TextureFormat) -> AttachPoint {
    let info = format.info();
    match (info.depth, info.stencil) {
        (true, true) => AttachPoint::DepthStencil,
        (false, true) => AttachPoint::Stencil,
        _ => AttachPoint::Depth,
    }
}

fn make_slot(
    device: &Device,
    attachment: &Attachment,
    label: String,
    size: (u32, u32),
    sample_count: u32,
) -> Result<Slot> {
    match attachment {
        Attachment::Texture(texture) => {
            texture.core().handle()?;
            Ok(Slot {
                texture: texture.clone(),
                owned: false,
            })
        }
        Attachment::Format(format) => {
            let texture = device.create_texture(&TextureProps {
                label: Some(label),
                format: *format,
                width: size.0,
                height: size.1,
                sample_count,
                usage: TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_SRC,
                ..Default::default()
            })?;
            Ok(Slot {
                texture,
                owned: true,
            })
        }
    }
}

fn borrowed<'a>(attachments: &'a [&'a Attachment]) -> impl Iterator<Item = &'a Arc<Texture>> + 'a {
    attachments.iter().filter_map(|attachment| match attachment {
        Attachment::Texture(texture) => Some(texture),
        Attachment::Format(_) => None,
    })
}

fn build_slots(
    device: &Device,
    label: &str,
    size: (u32, u32),
    colors: &[Attachment],
    depth: Option<&Attachment>,
) -> Result<(Vec<Slot>, Option<Slot>)> {
    let all: Vec<&Attachment> = colors.iter().chain(depth).collect();
    let sample_count = borrowed(&all)
        .next()
        .map(|texture| texture.sample_count())
        .unwrap_or(1);
    let colors = colors
        .iter()
        .enumerate()
        .map(|(index, attachment)| {
            make_slot(device, attachment, format!("{label}-color-{index}"), size, sample_count)
        })
        .collect::<Result<Vec<_>>>()?;
    let depth = depth
        .map(|attachment| {
            make_slot(device, attachment, format!("{label}-depth"), size, sample_count)
        })
        .transpose()?;
    Ok((colors, depth))
}

/// Size, sample count and format rules shared by construction,
/// `set_attachments` and `resize`.
fn validate(
    device: &Device,
    width: u32,
    height: u32,
    colors: &[Slot],
    depth: Option<&Slot>,
) -> Result<()> {
    if colors.is_empty() && depth.is_none() {
        return Err(GpuError::invalid("framebuffer needs at least one attachment"));
    }
    let max = (device.limits().max_color_attachments as usize).min(MAX_PASS_COLORS);
    if colors.len() > max {
        return Err(GpuError::invalid(format!(
            "{} color attachments exceed the limit of {max}",
            colors.len()
        )));
    }
    for slot in colors {
        let format = slot.texture.format();
        if format.is_depth_stencil() || !device.is_texture_format_renderable(format) {
            return Err(GpuError::invalid(format!(
                "{format} cannot be used as a color attachment"
            )));
        }
    }
    if let Some(slot) = depth {
        let format = slot.texture.format();
        if !format.is_depth_stencil() {
            return Err(GpuError::invalid(format!(
                "{format} is not a depth/stencil format"
            )));
        }
    }

    let mut samples = None;
    for slot in colors.iter().chain(depth) {
        let texture = &slot.texture;
        if (texture.width(), texture.height()) != (width, height) {
            return Err(GpuError::invalid(format!(
                "attachment \"{}\" is {}x{}, framebuffer is {width}x{height}",
                texture.label(),
                texture.width(),
                texture.height()
            )));
        }
        match samples {
            None => samples = Some(texture.sample_count()),
            Some(count) if count != texture.sample_count() => {
                return Err(GpuError::invalid(
                    "all framebuffer attachments must have the same sample count",
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Attaches every slot to `framebuffer` and checks completeness. Slots past
/// the new color count are cleared.
fn attach_all(
    backend: &mut ContextBackend,
    framebuffer: NativeHandle,
    colors: &[(NativeHandle, TextureFormat)],
    depth: Option<(NativeHandle, TextureFormat)>,
    previous_colors: usize,
) -> Result<()> {
    for (index, (handle, _)) in colors.iter().enumerate() {
        backend.attach(framebuffer, AttachPoint::Color(index as u32), *handle);
    }
    for index in colors.len()..previous_colors {
        backend.attach(framebuffer, AttachPoint::Color(index as u32), NativeHandle::NULL);
    }
    match depth {
        Some((handle, format)) => backend.attach(framebuffer, depth_point(format), handle),
        None => backend.attach(framebuffer, AttachPoint::DepthStencil, NativeHandle::NULL),
    }
    backend
        .framebuffer_status(framebuffer)
        .map_err(|status| GpuError::invalid(format!("framebuffer incomplete: {status}")))
}

fn native_targets(
    colors: &[Slot],
    depth: Option<&Slot>,
) -> Result<(Vec<(NativeHandle, TextureFormat)>, Option<(NativeHandle, TextureFormat)>)> {
    let colors = colors
        .iter()
        .map(|slot| Ok((slot.texture.core().handle()?, slot.texture.format())))
        .collect::<Result<Vec<_>>>()?;
    let depth = depth
        .map(|slot| Ok((slot.texture.core().handle()?, slot.texture.format())))
        .transpose()?;
    Ok((colors, depth))
}

impl Framebuffer {
    pub(crate) fn new(device: &Device, props: &FramebufferProps) -> Result<Self> {
        let label = props.label.clone().unwrap_or_else(|| "framebuffer".to_string());
        let all: Vec<&Attachment> = props
            .color_attachments
            .iter()
            .chain(props.depth_stencil_attachment.as_ref())
            .collect();
        let (width, height) = if props.width > 0 && props.height > 0 {
            (props.width, props.height)
        } else if let Some(texture) = borrowed(&all).next() {
            (texture.width(), texture.height())
        } else {
            (device.surface().width, device.surface().height)
        };

        let (colors, depth) = build_slots(
            device,
            &label,
            (width, height),
            &props.color_attachments,
            props.depth_stencil_attachment.as_ref(),
        )?;
        validate(device, width, height, &colors, depth.as_ref())?;
        let (color_targets, depth_target) = native_targets(&colors, depth.as_ref())?;

        let handle = device.with_backend(|backend| {
            let handle = backend.create_object(&ObjectDescriptor::Framebuffer)?;
            if let Err(err) = attach_all(backend, handle, &color_targets, depth_target, 0) {
                backend.delete_object(ResourceKind::Framebuffer, handle);
                return Err(err);
            }
            Ok(handle)
        })?;

        Ok(Self {
            core: ResourceCore::new(
                device,
                ResourceKind::Framebuffer,
                props.label.as_deref(),
                handle,
            ),
            attachments: Mutex::new(Attachments {
                width,
                height,
                colors,
                depth,
            }),
        })
    }

    pub fn width(&self) -> u32 {
        self.attachments.lock().width
    }

    pub fn height(&self) -> u32 {
        self.attachments.lock().height
    }

    pub fn color_textures(&self) -> Vec<Arc<Texture>> {
        self.attachments
            .lock()
            .colors
            .iter()
            .map(|slot| slot.texture.clone())
            .collect()
    }

    pub fn depth_stencil_texture(&self) -> Option<Arc<Texture>> {
        self.attachments
            .lock()
            .depth
            .as_ref()
            .map(|slot| slot.texture.clone())
    }

    /// Replaces every attachment. On failure the framebuffer is unchanged.
    pub fn set_attachments(
        &self,
        colors: &[Attachment],
        depth_stencil: Option<&Attachment>,
    ) -> Result<()> {
        let handle = self.core.handle()?;
        let (width, height, previous) = {
            let current = self.attachments.lock();
            (current.width, current.height, current.colors.len())
        };
        let (colors, depth) = build_slots(
            self.device(),
            self.label(),
            (width, height),
            colors,
            depth_stencil,
        )?;
        validate(self.device(), width, height, &colors, depth.as_ref())?;
        let (color_targets, depth_target) = native_targets(&colors, depth.as_ref())?;
        self.device().with_backend(|backend| {
            attach_all(backend, handle, &color_targets, depth_target, previous)
        })?;

        let replaced = {
            let mut current = self.attachments.lock();
            let old_colors = std::mem::replace(&mut current.colors, colors);
            let old_depth = std::mem::replace(&mut current.depth, depth);
            old_colors.into_iter().chain(old_depth).collect::<Vec<_>>()
        };
        for slot in replaced.into_iter().filter(|slot| slot.owned) {
            slot.texture.destroy();
        }
        Ok(())
    }

    /// Resizes owned attachments. Borrowed ones must already be the new
    /// size.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        let handle = self.core.handle()?;
        let attachments = self.attachments.lock();
        if (attachments.width, attachments.height) == (width, height) {
            return Ok(());
        }
        let slots: Vec<&Slot> = attachments.colors.iter().chain(attachments.depth.iter()).collect();
        if let Some(slot) = slots
            .iter()
            .find(|slot| {
                !slot.owned && (slot.texture.width(), slot.texture.height()) != (width, height)
            })
        {
            return Err(GpuError::invalid(format!(
                "borrowed attachment \"{}\" is not {width}x{height}",
                slot.texture.label()
            )));
        }
        for slot in slots.iter().filter(|slot| slot.owned) {
            slot.texture.resize(width, height)?;
        }
        validate(self.device(), width, height, &attachments.colors, attachments.depth.as_ref())?;
        let (color_targets, depth_target) =
            native_targets(&attachments.colors, attachments.depth.as_ref())?;
        let previous = attachments.colors.len();
        drop(attachments);

        self.device().with_backend(|backend| {
            attach_all(backend, handle, &color_targets, depth_target, previous)
        })?;
        let mut attachments = self.attachments.lock();
        attachments.width = width;
        attachments.height = height;
        Ok(())
    }

    pub(crate) fn pass_targets(&self) -> Result<PassTargets> {
        let framebuffer = self.core.handle()?;
        let attachments = self.attachments.lock();
        let (color_targets, depth_target) =
            native_targets(&attachments.colors, attachments.depth.as_ref())?;
        let mut colors = [NativeHandle::NULL; MAX_PASS_COLORS];
        for (slot, (handle, _)) in colors.iter_mut().zip(color_targets.iter()) {
            *slot = *handle;
        }
        Ok(PassTargets {
            framebuffer,
            colors,
            color_count: color_targets.len() as u32,
            depth: depth_target.map(|(handle, _)| handle).unwrap_or_default(),
            width: attachments.width,
            height: attachments.height,
        })
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attachments = self.attachments.lock();
        f.debug_struct("Framebuffer")
            .field("core", &self.core)
            .field("width", &attachments.width)
            .field("height", &attachments.height)
            .field("colors", &attachments.colors.len())
            .field("depth", &attachments.depth.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceFactory, DeviceProps};
    use crate::resource::ResourceState;

    fn device() -> Device {
        DeviceFactory::without_provider()
            .create_null_device(&DeviceProps::default())
            .unwrap()
    }

    fn texture(device: &Device, width: u32, height: u32, format: TextureFormat) -> Arc<Texture> {
        device
            .create_texture(&TextureProps {
                format,
                width,
                height,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let device = device();
        let err = device
            .create_framebuffer(&FramebufferProps {
                color_attachments: vec![
                    Attachment::Texture(texture(&device, 4, 4, TextureFormat::Rgba8Unorm)),
                    Attachment::Texture(texture(&device, 8, 8, TextureFormat::Rgba8Unorm)),
                ],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::InvalidConfiguration(_)));
    }

    #[test]
    fn mismatched_sample_counts_are_rejected() {
        let device = device();
        let multisampled = device
            .create_texture(&TextureProps {
                width: 4,
                height: 4,
                sample_count: 4,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap();
        let err = device
            .create_framebuffer(&FramebufferProps {
                width: 4,
                height: 4,
                color_attachments: vec![
                    Attachment::Texture(multisampled),
                    Attachment::Texture(texture(&device, 4, 4, TextureFormat::Rgba8Unorm)),
                ],
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("sample count"));
    }

    #[test]
    fn depth_format_as_color_is_rejected() {
        let device = device();
        let err = device
            .create_framebuffer(&FramebufferProps {
                width: 4,
                height: 4,
                color_attachments: vec![Attachment::Format(TextureFormat::Depth24Plus)],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::InvalidConfiguration(_)));
    }

    #[test]
    fn size_comes_from_borrowed_texture() {
        let device = device();
        let color = texture(&device, 16, 8, TextureFormat::Rgba8Unorm);
        let framebuffer = device
            .create_framebuffer(&FramebufferProps {
                color_attachments: vec![Attachment::Texture(color)],
                depth_stencil_attachment: Some(Attachment::Format(TextureFormat::Depth24Plus)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!((framebuffer.width(), framebuffer.height()), (16, 8));
        let depth = framebuffer.depth_stencil_texture().unwrap();
        assert_eq!((depth.width(), depth.height()), (16, 8));
    }

    #[test]
    fn resize_updates_owned_and_rejects_borrowed() {
        let device = device();
        let framebuffer = device
            .create_framebuffer(&FramebufferProps {
                width: 4,
                height: 4,
                color_attachments: vec![Attachment::Format(TextureFormat::Rgba8Unorm)],
                ..Default::default()
            })
            .unwrap();
        framebuffer.resize(8, 2).unwrap();
        assert_eq!(framebuffer.color_textures()[0].width(), 8);

        let borrowed = device
            .create_framebuffer(&FramebufferProps {
                color_attachments: vec![Attachment::Texture(texture(
                    &device,
                    4,
                    4,
                    TextureFormat::Rgba8Unorm,
                ))],
                ..Default::default()
            })
            .unwrap();
        assert!(borrowed.resize(8, 8).is_err());
        assert_eq!(borrowed.width(), 4);
    }

    #[test]
    fn destroy_releases_owned_textures_only() {
        let device = device();
        let shared = texture(&device, 4, 4, TextureFormat::Rgba8Unorm);
        let framebuffer = device
            .create_framebuffer(&FramebufferProps {
                color_attachments: vec![Attachment::Texture(shared.clone())],
                depth_stencil_attachment: Some(Attachment::Format(TextureFormat::Depth24Plus)),
                ..Default::default()
            })
            .unwrap();
        let depth = framebuffer.depth_stencil_texture().unwrap();
        framebuffer.destroy();
        assert_eq!(framebuffer.state(), ResourceState::Destroyed);
        assert_eq!(depth.state(), ResourceState::Destroyed);
        assert_eq!(shared.state(), ResourceState::Ready);
    }
}
