use std::sync::atomic::{AtomicBool, Ordering};

use bytemuck::Pod;

use super::ir::{
    BeginComputePass, BeginRenderPass, ClearFlags, CommandStream, CopyBufferToBuffer,
    CopyBufferToTexture, CopyTextureToBuffer, CopyTextureToTexture, DebugLabel, Dispatch, Draw,
    DrawIndexed, EndComputePass, EndRenderPass, Op, ResolveQuerySet, SetComputePipeline,
    SetPipeline, SetScissor, SetVertexArray, SetViewport, TextureRegion, WriteTimestamp,
    MAX_PASS_COLORS,
};
use crate::caps::DeviceFeature;
use crate::error::{GpuError, Result};
use crate::gpu::{Device, WeakDevice};
use crate::native::NativeHandle;
use crate::resource::{
    Buffer, BufferUsage, ComputePipeline, Framebuffer, IndexType, QuerySet, QueryType,
    RenderPipeline, Resource, Texture, TextureUsage, VertexArray,
};

/// How recorded commands reach the native context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeStrategy {
    /// Every command runs on the backend as it is recorded.
    Eager,
    /// Commands accumulate in a stream that runs at submit.
    Deferred,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandEncoderProps {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    None,
    Render,
    Compute,
}

/// Layout of image data inside a buffer, for buffer/texture copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageDataLayout {
    pub offset: u64,
    pub bytes_per_row: u32,
    /// Rows between consecutive images; 0 means the copy height.
    pub rows_per_image: u32,
}

//===----------------------------------------------------------------------===//
// Command buffer
//===----------------------------------------------------------------------===//

/// A finished, submittable unit of work. Submits at most once.
#[derive(Debug)]
pub struct CommandBuffer {
    device_id: String,
    label: String,
    stream: Option<CommandStream>,
    submitted: AtomicBool,
}

impl CommandBuffer {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Recorded commands. `None` when they already ran at record time.
    pub fn stream(&self) -> Option<&CommandStream> {
        self.stream.as_ref()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_submitted(&self) -> Result<()> {
        if self.submitted.swap(true, Ordering::AcqRel) {
            return Err(GpuError::state(format!(
                "command buffer \"{}\" was already submitted",
                self.label
            )));
        }
        Ok(())
    }
}

//===----------------------------------------------------------------------===//
// Encoder
//===----------------------------------------------------------------------===//

/// Records passes, copies and queries into a [`CommandBuffer`].
pub struct CommandEncoder {
    device: WeakDevice,
    device_id: String,
    label: String,
    strategy: EncodeStrategy,
    compute: bool,
    stream: CommandStream,
    finished: bool,
    pass: PassKind,
    debug_depth: u32,
}

impl CommandEncoder {
    pub(crate) fn new(
        device: WeakDevice,
        device_id: String,
        strategy: EncodeStrategy,
        compute: bool,
        props: &CommandEncoderProps,
    ) -> Self {
        Self {
            device,
            label: props
                .label
                .clone()
                .unwrap_or_else(|| format!("{device_id}-encoder")),
            device_id,
            strategy,
            compute,
            stream: CommandStream::new(),
            finished: false,
            pass: PassKind::None,
            debug_depth: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn strategy(&self) -> EncodeStrategy {
        self.strategy
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The owning device, if recording is still possible.
    fn usable(&self) -> Result<Device> {
        if self.finished {
            return Err(GpuError::state(format!(
                "command encoder \"{}\" is finished",
                self.label
            )));
        }
        let device = self.device.upgrade().ok_or_else(|| GpuError::DeviceLost {
            device: self.device_id.clone(),
            message: "device dropped".to_string(),
        })?;
        device.ensure_alive()?;
        Ok(device)
    }

    fn expect_pass(&self, pass: PassKind, what: &str) -> Result<Device> {
        let device = self.usable()?;
        if self.pass != pass {
            let place = match pass {
                PassKind::None => "outside passes",
                PassKind::Render => "inside a render pass",
                PassKind::Compute => "inside a compute pass",
            };
            return Err(GpuError::state(format!("{what} is only valid {place}")));
        }
        Ok(device)
    }

    fn owned<R: Resource + ?Sized>(&self, resource: &R) -> Result<NativeHandle> {
        if resource.device().id() != self.device_id {
            return Err(GpuError::invalid(format!(
                "{} \"{}\" belongs to another device",
                resource.kind(),
                resource.label()
            )));
        }
        resource.core().handle()
    }

    fn record(&mut self, device: &Device, write: impl FnOnce(&mut CommandStream)) -> Result<()> {
        match self.strategy {
            EncodeStrategy::Deferred => {
                write(&mut self.stream);
                Ok(())
            }
            EncodeStrategy::Eager => {
                let mut single = CommandStream::new();
                write(&mut single);
                device.with_backend(|backend| {
                    backend.execute(&single);
                    Ok(())
                })
            }
        }
    }

    fn push<T: Pod>(&mut self, device: &Device, op: Op, payload: &T) -> Result<()> {
        self.record(device, |stream| stream.push(op, payload))
    }

    //===------------------------------------------------------------------===//
    // Passes
    //===------------------------------------------------------------------===//

    pub fn begin_render_pass(&mut self, props: &RenderPassProps<'_>) -> Result<RenderPass<'_>> {
        let device = self.expect_pass(PassKind::None, "begin_render_pass")?;
        let mut begin = BeginRenderPass {
            depth_range: props.depth_range.unwrap_or([0.0, 1.0]),
            ..Default::default()
        };
        let has_depth = match props.framebuffer {
            Some(framebuffer) => {
                self.owned(framebuffer)?;
                let targets = framebuffer.pass_targets()?;
                begin.framebuffer = targets.framebuffer;
                begin.color_attachments = targets.colors;
                begin.color_count = targets.color_count.min(MAX_PASS_COLORS as u32);
                begin.depth_stencil_attachment = targets.depth;
                begin.width = targets.width;
                begin.height = targets.height;
                !targets.depth.is_null()
            }
            None => {
                let surface = device.surface();
                begin.color_count = 1;
                begin.width = surface.width;
                begin.height = surface.height;
                true
            }
        };
        begin.viewport = props
            .viewport
            .unwrap_or([0.0, 0.0, begin.width as f32, begin.height as f32]);

        let mut clear = ClearFlags::empty();
        if let Some(color) = props.clear_color {
            clear |= ClearFlags::COLOR;
            begin.clear_color = color;
        }
        if let (Some(depth), true) = (props.clear_depth, has_depth) {
            clear |= ClearFlags::DEPTH;
            begin.clear_depth = depth;
        }
        if let (Some(stencil), true) = (props.clear_stencil, has_depth) {
            clear |= ClearFlags::STENCIL;
            begin.clear_stencil = stencil;
        }
        begin.clear = clear.bits();

        if let Some(label) = props.label {
            self.record(&device, |stream| stream.push_label(Op::PushDebugGroup, label))?;
        }
        self.push(&device, Op::BeginRenderPass, &begin)?;
        self.pass = PassKind::Render;
        Ok(RenderPass {
            encoder: self,
            labeled: props.label.is_some(),
            topology_set: false,
            index_type: None,
            ended: false,
        })
    }

    /// Fails with `UnsupportedOperation` on devices without `compute`.
    pub fn begin_compute_pass(&mut self, label: Option<&str>) -> Result<ComputePass<'_>> {
        let device = self.expect_pass(PassKind::None, "begin_compute_pass")?;
        if !self.compute {
            return Err(GpuError::unsupported(format!(
                "{} has no compute support",
                self.device_id
            )));
        }
        if let Some(label) = label {
            self.record(&device, |stream| stream.push_label(Op::PushDebugGroup, label))?;
        }
        self.push(&device, Op::BeginComputePass, &BeginComputePass::default())?;
        self.pass = PassKind::Compute;
        Ok(ComputePass {
            encoder: self,
            labeled: label.is_some(),
            pipeline_set: false,
            ended: false,
        })
    }

    //===------------------------------------------------------------------===//
    // Copies
    //===------------------------------------------------------------------===//

    pub fn copy_buffer_to_buffer(
        &mut self,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        size: u64,
    ) -> Result<()> {
        let device = self.expect_pass(PassKind::None, "copy_buffer_to_buffer")?;
        let src = self.owned(source)?;
        let dst = self.owned(destination)?;
        require_buffer_usage(source, BufferUsage::COPY_SRC)?;
        require_buffer_usage(destination, BufferUsage::COPY_DST)?;
        check_buffer_range(source, source_offset, size)?;
        check_buffer_range(destination, destination_offset, size)?;
        if src == dst {
            let overlap = source_offset < destination_offset + size
                && destination_offset < source_offset + size;
            if overlap {
                return Err(GpuError::invalid("buffer copy ranges overlap"));
            }
        }
        self.push(
            &device,
            Op::CopyBufferToBuffer,
            &CopyBufferToBuffer {
                src,
                dst,
                src_offset: source_offset,
                dst_offset: destination_offset,
                size,
            },
        )
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        source: &Buffer,
        layout: ImageDataLayout,
        destination: &Texture,
        region: TextureRegion,
    ) -> Result<()> {
        let device = self.expect_pass(PassKind::None, "copy_buffer_to_texture")?;
        let buffer = self.owned(source)?;
        let texture = self.owned(destination)?;
        require_buffer_usage(source, BufferUsage::COPY_SRC)?;
        require_texture_usage(destination, TextureUsage::COPY_DST)?;
        destination.check_region(&region)?;
        let (bytes_per_row, rows_per_image) =
            check_image_layout(&device, source, destination, &layout, &region)?;
        self.push(
            &device,
            Op::CopyBufferToTexture,
            &CopyBufferToTexture {
                buffer,
                texture,
                offset: layout.offset,
                bytes_per_row,
                rows_per_image,
                region,
            },
        )
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        source: &Texture,
        region: TextureRegion,
        destination: &Buffer,
        layout: ImageDataLayout,
    ) -> Result<()> {
        let device = self.expect_pass(PassKind::None, "copy_texture_to_buffer")?;
        let texture = self.owned(source)?;
        let buffer = self.owned(destination)?;
        require_texture_usage(source, TextureUsage::COPY_SRC)?;
        require_buffer_usage(destination, BufferUsage::COPY_DST)?;
        source.check_region(&region)?;
        let (bytes_per_row, rows_per_image) =
            check_image_layout(&device, destination, source, &layout, &region)?;
        self.push(
            &device,
            Op::CopyTextureToBuffer,
            &CopyTextureToBuffer {
                texture,
                buffer,
                offset: layout.offset,
                bytes_per_row,
                rows_per_image,
                region,
            },
        )
    }

    /// Copies `region` of `source` to `destination`, placing it at
    /// `origin` (`[x, y, z, mip_level]`).
    pub fn copy_texture_to_texture(
        &mut self,
        source: &Texture,
        region: TextureRegion,
        destination: &Texture,
        origin: [u32; 4],
    ) -> Result<()> {
        let device = self.expect_pass(PassKind::None, "copy_texture_to_texture")?;
        let src = self.owned(source)?;
        let dst = self.owned(destination)?;
        require_texture_usage(source, TextureUsage::COPY_SRC)?;
        require_texture_usage(destination, TextureUsage::COPY_DST)?;
        if source.format() != destination.format() {
            return Err(GpuError::invalid(format!(
                "cannot copy {} into {}",
                source.format(),
                destination.format()
            )));
        }
        if source.sample_count() != destination.sample_count() {
            return Err(GpuError::invalid("texture copy sample counts differ"));
        }
        source.check_region(&region)?;
        let [x, y, z, mip_level] = origin;
        destination.check_region(&TextureRegion {
            x,
            y,
            z,
            mip_level,
            ..region
        })?;
        self.push(
            &device,
            Op::CopyTextureToTexture,
            &CopyTextureToTexture {
                src,
                dst,
                src_region: region,
                dst_origin: origin,
            },
        )
    }

    //===------------------------------------------------------------------===//
    // Queries
    //===------------------------------------------------------------------===//

    pub fn write_timestamp(&mut self, query_set: &QuerySet, index: u32) -> Result<()> {
        let device = self.expect_pass(PassKind::None, "write_timestamp")?;
        let handle = self.owned(query_set)?;
        if query_set.kind() != QueryType::Timestamp {
            return Err(GpuError::invalid(format!(
                "query set \"{}\" does not hold timestamps",
                query_set.label()
            )));
        }
        if !device.has_feature(DeviceFeature::TimestampQuery) {
            return Err(GpuError::unsupported("timestamp-query is not enabled"));
        }
        if index >= query_set.count() {
            return Err(GpuError::invalid(format!(
                "query index {index} out of range, set has {}",
                query_set.count()
            )));
        }
        self.push(
            &device,
            Op::WriteTimestamp,
            &WriteTimestamp {
                query_set: handle,
                index,
                padding: 0,
            },
        )
    }

    pub fn resolve_query_set(
        &mut self,
        query_set: &QuerySet,
        first_query: u32,
        query_count: u32,
        destination: &Buffer,
        destination_offset: u64,
    ) -> Result<()> {
        let device = self.expect_pass(PassKind::None, "resolve_query_set")?;
        let handle = self.owned(query_set)?;
        let buffer = self.owned(destination)?;
        let in_range = first_query
            .checked_add(query_count)
            .is_some_and(|end| end <= query_set.count());
        if !in_range {
            return Err(GpuError::invalid(format!(
                "queries {first_query}+{query_count} exceed set of {}",
                query_set.count()
            )));
        }
        require_buffer_usage(destination, BufferUsage::QUERY_RESOLVE)?;
        check_buffer_range(
            destination,
            destination_offset,
            query_set.resolve_size(query_count),
        )?;
        self.push(
            &device,
            Op::ResolveQuerySet,
            &ResolveQuerySet {
                query_set: handle,
                destination: buffer,
                destination_offset,
                first_query,
                query_count,
            },
        )
    }

    //===------------------------------------------------------------------===//
    // Debug groups
    //===------------------------------------------------------------------===//

    pub fn push_debug_group(&mut self, label: &str) -> Result<()> {
        let device = self.usable()?;
        self.record(&device, |stream| stream.push_label(Op::PushDebugGroup, label))?;
        self.debug_depth += 1;
        Ok(())
    }

    pub fn pop_debug_group(&mut self) -> Result<()> {
        let device = self.usable()?;
        if self.debug_depth == 0 {
            return Err(GpuError::state("pop_debug_group without matching push"));
        }
        self.push(&device, Op::PopDebugGroup, &DebugLabel::default())?;
        self.debug_depth -= 1;
        Ok(())
    }

    pub fn insert_debug_marker(&mut self, label: &str) -> Result<()> {
        let device = self.usable()?;
        self.record(&device, |stream| stream.push_label(Op::InsertDebugMarker, label))
    }

    //===------------------------------------------------------------------===//
    // Finish
    //===------------------------------------------------------------------===//

    /// Ends recording. Every later call on this encoder fails with
    /// `InvalidState`.
    pub fn finish(&mut self) -> Result<CommandBuffer> {
        self.expect_pass(PassKind::None, "finish")?;
        if self.debug_depth != 0 {
            return Err(GpuError::state(format!(
                "{} debug group(s) still open",
                self.debug_depth
            )));
        }
        self.finished = true;
        let stream = match self.strategy {
            EncodeStrategy::Deferred => Some(std::mem::take(&mut self.stream)),
            EncodeStrategy::Eager => None,
        };
        log::debug!(
            "{}: finished \"{}\" ({} commands)",
            self.device_id,
            self.label,
            stream.as_ref().map(CommandStream::len).unwrap_or(0)
        );
        Ok(CommandBuffer {
            device_id: self.device_id.clone(),
            label: self.label.clone(),
            stream,
            submitted: AtomicBool::new(false),
        })
    }
}

impl std::fmt::Debug for CommandEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEncoder")
            .field("label", &self.label)
            .field("strategy", &self.strategy)
            .field("finished", &self.finished)
            .field("pass", &self.pass)
            .finish()
    }
}

fn require_buffer_usage(buffer: &Buffer, usage: BufferUsage) -> Result<()> {
    if !buffer.usage().contains(usage) {
        return Err(GpuError::invalid(format!(
            "buffer \"{}\" lacks {usage:?} usage",
            buffer.label()
        )));
    }
    Ok(())
}

fn require_texture_usage(texture: &Texture, usage: TextureUsage) -> Result<()> {
    if !texture.usage().contains(usage) {
        return Err(GpuError::invalid(format!(
            "texture \"{}\" lacks {usage:?} usage",
            texture.label()
        )));
    }
    Ok(())
}

fn check_buffer_range(buffer: &Buffer, offset: u64, size: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= buffer.byte_length() => Ok(()),
        _ => Err(GpuError::invalid(format!(
            "range {offset}+{size} is outside buffer \"{}\" ({} bytes)",
            buffer.label(),
            buffer.byte_length()
        ))),
    }
}

/// Validates a buffer-side image layout and returns the effective
/// `(bytes_per_row, rows_per_image)`.
fn check_image_layout(
    device: &Device,
    buffer: &Buffer,
    texture: &Texture,
    layout: &ImageDataLayout,
    region: &TextureRegion,
) -> Result<(u32, u32)> {
    let format = texture.format();
    let block = format.info().block_size;
    let row_bytes = format.image_byte_length(region.width, 1);
    if (layout.bytes_per_row as u64) < row_bytes {
        return Err(GpuError::invalid(format!(
            "bytes_per_row {} is below the {row_bytes} bytes of one row",
            layout.bytes_per_row
        )));
    }
    let alignment = device.texture_byte_alignment();
    let multi_row = region.height > block || region.depth > 1;
    if multi_row && layout.bytes_per_row % alignment != 0 {
        return Err(GpuError::invalid(format!(
            "bytes_per_row {} is not a multiple of {alignment}",
            layout.bytes_per_row
        )));
    }
    let rows_per_image = if layout.rows_per_image == 0 {
        region.height
    } else {
        layout.rows_per_image
    };
    if rows_per_image < region.height {
        return Err(GpuError::invalid(format!(
            "rows_per_image {rows_per_image} is below the copy height {}",
            region.height
        )));
    }
    let rows = region.height.div_ceil(block) as u64;
    let image_rows = rows_per_image.div_ceil(block) as u64;
    let needed = layout.bytes_per_row as u64 * (image_rows * (region.depth as u64 - 1) + rows);
    check_buffer_range(buffer, layout.offset, needed)?;
    Ok((layout.bytes_per_row, rows_per_image))
}

//===----------------------------------------------------------------------===//
// Render pass
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderPassProps<'a> {
    pub label: Option<&'a str>,
    /// `None` renders to the device's default surface.
    pub framebuffer: Option<&'a Framebuffer>,
    pub clear_color: Option<[f32; 4]>,
    pub clear_depth: Option<f32>,
    pub clear_stencil: Option<u32>,
    /// `[x, y, width, height]`; defaults to the full target.
    pub viewport: Option<[f32; 4]>,
    pub depth_range: Option<[f32; 2]>,
}

/// An open render pass. Ends on [`RenderPass::end`] or when dropped.
pub struct RenderPass<'e> {
    encoder: &'e mut CommandEncoder,
    labeled: bool,
    topology_set: bool,
    index_type: Option<IndexType>,
    ended: bool,
}

impl RenderPass<'_> {
    fn device(&self) -> Result<Device> {
        self.encoder.expect_pass(PassKind::Render, "render pass command")
    }

    pub fn set_pipeline(&mut self, pipeline: &RenderPipeline) -> Result<()> {
        let device = self.device()?;
        let handle = self.encoder.owned(pipeline)?;
        let bindings = pipeline.binding_commands()?;
        let set = SetPipeline {
            pipeline: handle,
            topology: pipeline.topology() as u32,
            padding: 0,
        };
        self.encoder.record(&device, |stream| {
            stream.push(Op::SetPipeline, &set);
            for binding in &bindings {
                stream.push(Op::SetBinding, binding);
            }
        })?;
        self.topology_set = true;
        Ok(())
    }

    pub fn set_vertex_array(&mut self, vertex_array: &VertexArray) -> Result<()> {
        let device = self.device()?;
        let handle = self.encoder.owned(vertex_array)?;
        self.encoder.push(
            &device,
            Op::SetVertexArray,
            &SetVertexArray {
                vertex_array: handle,
            },
        )?;
        self.index_type = vertex_array.index_type();
        Ok(())
    }

    pub fn set_viewport(&mut self, rect: [f32; 4], depth_range: [f32; 2]) -> Result<()> {
        let device = self.device()?;
        self.encoder
            .push(&device, Op::SetViewport, &SetViewport { rect, depth_range })
    }

    pub fn set_scissor(&mut self, rect: [u32; 4]) -> Result<()> {
        let device = self.device()?;
        self.encoder.push(&device, Op::SetScissor, &SetScissor { rect })
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        let device = self.device()?;
        if !self.topology_set {
            return Err(GpuError::state("draw without a pipeline"));
        }
        self.encoder.push(
            &device,
            Op::Draw,
            &Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            },
        )
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        let device = self.device()?;
        if !self.topology_set {
            return Err(GpuError::state("draw_indexed without a pipeline"));
        }
        let Some(index_type) = self.index_type else {
            return Err(GpuError::state("draw_indexed without an index buffer"));
        };
        self.encoder.push(
            &device,
            Op::DrawIndexed,
            &DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
                index_size: index_type.byte_size(),
            },
        )
    }

    pub fn insert_debug_marker(&mut self, label: &str) -> Result<()> {
        self.device()?;
        self.encoder.insert_debug_marker(label)
    }

    fn close(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.encoder.pass = PassKind::None;
        let device = self.encoder.usable()?;
        self.encoder
            .push(&device, Op::EndRenderPass, &EndRenderPass::default())?;
        if self.labeled {
            self.encoder
                .push(&device, Op::PopDebugGroup, &DebugLabel::default())?;
        }
        Ok(())
    }

    pub fn end(mut self) -> Result<()> {
        self.close()
    }
}

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("render pass ended with error: {err}");
        }
    }
}

//===----------------------------------------------------------------------===//
// Compute pass
//===----------------------------------------------------------------------===//

/// An open compute pass. Ends on [`ComputePass::end`] or when dropped.
pub struct ComputePass<'e> {
    encoder: &'e mut CommandEncoder,
    labeled: bool,
    pipeline_set: bool,
    ended: bool,
}

impl ComputePass<'_> {
    pub fn set_pipeline(&mut self, pipeline: &ComputePipeline) -> Result<()> {
        let device = self.encoder.expect_pass(PassKind::Compute, "set_pipeline")?;
        let handle = self.encoder.owned(pipeline)?;
        let bindings = pipeline.binding_commands()?;
        self.encoder.record(&device, |stream| {
            stream.push(Op::SetComputePipeline, &SetComputePipeline { pipeline: handle });
            for binding in &bindings {
                stream.push(Op::SetBinding, binding);
            }
        })?;
        self.pipeline_set = true;
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        let device = self.encoder.expect_pass(PassKind::Compute, "dispatch")?;
        if !self.pipeline_set {
            return Err(GpuError::state("dispatch without a pipeline"));
        }
        let max = device.limits().max_compute_workgroups_per_dimension;
        if x > max || y > max || z > max {
            return Err(GpuError::invalid(format!(
                "dispatch {x}x{y}x{z} exceeds {max} workgroups per dimension"
            )));
        }
        self.encoder.push(&device, Op::Dispatch, &Dispatch { x, y, z })
    }

    fn close(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.encoder.pass = PassKind::None;
        let device = self.encoder.usable()?;
        self.encoder
            .push(&device, Op::EndComputePass, &EndComputePass::default())?;
        if self.labeled {
            self.encoder
                .push(&device, Op::PopDebugGroup, &DebugLabel::default())?;
        }
        Ok(())
    }

    pub fn end(mut self) -> Result<()> {
        self.close()
    }
}

impl Drop for ComputePass<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("compute pass ended with error: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceFactory, DeviceProps};
    use crate::resource::{BufferProps, RenderPipelineProps, ShaderProps, ShaderStage};

    fn device() -> Device {
        DeviceFactory::without_provider()
            .create_null_device(&DeviceProps::default())
            .unwrap()
    }

    fn pipeline(device: &Device) -> std::sync::Arc<RenderPipeline> {
        let vs = device
            .create_shader(&ShaderProps {
                stage: ShaderStage::Vertex,
                source: "void main() {}".into(),
                ..Default::default()
            })
            .unwrap();
        device
            .create_render_pipeline(&RenderPipelineProps::new(vs, None))
            .unwrap()
    }

    #[test]
    fn deferred_encoder_records_in_order() {
        let device = device();
        let pipeline = pipeline(&device);
        let mut encoder = device
            .create_command_encoder(&CommandEncoderProps::default())
            .unwrap();
        assert_eq!(encoder.strategy(), EncodeStrategy::Deferred);
        let mut pass = encoder
            .begin_render_pass(&RenderPassProps {
                label: Some("main"),
                clear_color: Some([0.0, 0.0, 0.0, 1.0]),
                ..Default::default()
            })
            .unwrap();
        pass.set_pipeline(&pipeline).unwrap();
        pass.draw(3, 1, 0, 0).unwrap();
        pass.end().unwrap();
        let buffer = encoder.finish().unwrap();
        let ops: Vec<Op> = buffer.stream().unwrap().iter().map(|cmd| cmd.op).collect();
        assert_eq!(
            ops,
            vec![
                Op::PushDebugGroup,
                Op::BeginRenderPass,
                Op::SetPipeline,
                Op::Draw,
                Op::EndRenderPass,
                Op::PopDebugGroup
            ]
        );
    }

    #[test]
    fn dropped_pass_is_closed() {
        let device = device();
        let mut encoder = device
            .create_command_encoder(&CommandEncoderProps::default())
            .unwrap();
        {
            let pass = encoder.begin_render_pass(&RenderPassProps::default()).unwrap();
            drop(pass);
        }
        let buffer = encoder.finish().unwrap();
        let last = buffer.stream().unwrap().iter().last().map(|cmd| cmd.op);
        assert_eq!(last, Some(Op::EndRenderPass));
    }

    #[test]
    fn draw_needs_pipeline() {
        let device = device();
        let mut encoder = device
            .create_command_encoder(&CommandEncoderProps::default())
            .unwrap();
        let mut pass = encoder.begin_render_pass(&RenderPassProps::default()).unwrap();
        assert!(matches!(pass.draw(3, 1, 0, 0), Err(GpuError::InvalidState(_))));
        assert!(matches!(
            pass.draw_indexed(3, 1, 0, 0, 0),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn finished_encoder_rejects_recording() {
        let device = device();
        let mut encoder = device
            .create_command_encoder(&CommandEncoderProps::default())
            .unwrap();
        encoder.finish().unwrap();
        assert!(matches!(encoder.finish(), Err(GpuError::InvalidState(_))));
        assert!(matches!(
            encoder.push_debug_group("late"),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn compute_pass_needs_compute() {
        let device = device();
        let mut encoder = device
            .create_command_encoder(&CommandEncoderProps::default())
            .unwrap();
        assert!(matches!(
            encoder.begin_compute_pass(None),
            Err(GpuError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn buffer_copies_are_bounds_checked() {
        let device = device();
        let source = device
            .create_buffer(&BufferProps {
                byte_length: 16,
                usage: BufferUsage::COPY_SRC,
                ..Default::default()
            })
            .unwrap();
        let destination = device
            .create_buffer(&BufferProps {
                byte_length: 8,
                usage: BufferUsage::COPY_DST,
                ..Default::default()
            })
            .unwrap();
        let mut encoder = device
            .create_command_encoder(&CommandEncoderProps::default())
            .unwrap();
        assert!(encoder
            .copy_buffer_to_buffer(&source, 0, &destination, 0, 16)
            .is_err());
        assert!(encoder
            .copy_buffer_to_buffer(&destination, 0, &source, 0, 4)
            .is_err());
        encoder
            .copy_buffer_to_buffer(&source, 8, &destination, 0, 8)
            .unwrap();
        assert_eq!(encoder.finish().unwrap().stream().unwrap().len(), 1);
    }

    #[test]
    fn unbalanced_debug_groups_block_finish() {
        let device = device();
        let mut encoder = device
            .create_command_encoder(&CommandEncoderProps::default())
            .unwrap();
        assert!(encoder.pop_debug_group().is_err());
        encoder.push_debug_group("upload").unwrap();
        assert!(encoder.finish().is_err());
        encoder.pop_debug_group().unwrap();
        assert!(encoder.finish().is_ok());
    }
}
