use bitflags::bitflags;
use bytemuck::{bytes_of, pod_read_unaligned, Pod, Zeroable};

use crate::native::NativeHandle;

//===----------------------------------------------------------------------===//
// Command definitions
//===----------------------------------------------------------------------===//

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    BeginRenderPass = 0,
    EndRenderPass = 1,
    SetPipeline = 2,
    SetVertexArray = 3,
    SetBinding = 4,
    SetViewport = 5,
    SetScissor = 6,
    Draw = 7,
    DrawIndexed = 8,
    BeginComputePass = 9,
    EndComputePass = 10,
    SetComputePipeline = 11,
    Dispatch = 12,
    CopyBufferToBuffer = 13,
    CopyBufferToTexture = 14,
    CopyTextureToBuffer = 15,
    CopyTextureToTexture = 16,
    WriteTimestamp = 17,
    ResolveQuerySet = 18,
    PushDebugGroup = 19,
    PopDebugGroup = 20,
    InsertDebugMarker = 21,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    UniformBuffer = 0,
    StorageBuffer = 1,
    Texture = 2,
    Sampler = 3,
}

impl BindingKind {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(BindingKind::UniformBuffer),
            1 => Some(BindingKind::StorageBuffer),
            2 => Some(BindingKind::Texture),
            3 => Some(BindingKind::Sampler),
            _ => None,
        }
    }
}

/// A box inside one mip level of a texture.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_level: u32,
    pub padding: u32,
}

impl TextureRegion {
    pub fn whole(width: u32, height: u32, depth: u32, mip_level: u32) -> Self {
        Self {
            width,
            height,
            depth,
            mip_level,
            ..Default::default()
        }
    }
}

/// Color attachment slots carried by a render pass.
pub const MAX_PASS_COLORS: usize = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq)]
pub struct BeginRenderPass {
    pub framebuffer: NativeHandle,
    pub color_attachments: [NativeHandle; MAX_PASS_COLORS],
    pub depth_stencil_attachment: NativeHandle,
    pub color_count: u32,
    /// [`ClearFlags`] bits.
    pub clear: u32,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    /// `[x, y, width, height]`
    pub viewport: [f32; 4],
    pub depth_range: [f32; 2],
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct EndRenderPass {
    pub padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct SetPipeline {
    pub pipeline: NativeHandle,
    pub topology: u32,
    pub padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct SetVertexArray {
    pub vertex_array: NativeHandle,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct SetBinding {
    pub resource: NativeHandle,
    pub slot: u32,
    /// [`BindingKind`] discriminant.
    pub kind: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq)]
pub struct SetViewport {
    pub rect: [f32; 4],
    pub depth_range: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct SetScissor {
    pub rect: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct Draw {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct DrawIndexed {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
    /// Bytes per index, 2 or 4.
    pub index_size: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct BeginComputePass {
    pub padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct EndComputePass {
    pub padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct SetComputePipeline {
    pub pipeline: NativeHandle,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct Dispatch {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct CopyBufferToBuffer {
    pub src: NativeHandle,
    pub dst: NativeHandle,
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct CopyBufferToTexture {
    pub buffer: NativeHandle,
    pub texture: NativeHandle,
    pub offset: u64,
    pub bytes_per_row: u32,
    pub rows_per_image: u32,
    pub region: TextureRegion,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct CopyTextureToBuffer {
    pub texture: NativeHandle,
    pub buffer: NativeHandle,
    pub offset: u64,
    pub bytes_per_row: u32,
    pub rows_per_image: u32,
    pub region: TextureRegion,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct CopyTextureToTexture {
    pub src: NativeHandle,
    pub dst: NativeHandle,
    pub src_region: TextureRegion,
    /// `[x, y, z, mip_level]`
    pub dst_origin: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct WriteTimestamp {
    pub query_set: NativeHandle,
    pub index: u32,
    pub padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct ResolveQuerySet {
    pub query_set: NativeHandle,
    pub destination: NativeHandle,
    pub destination_offset: u64,
    pub first_query: u32,
    pub query_count: u32,
}

/// Debug-group labels live in the stream's label table.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable, PartialEq, Eq)]
pub struct DebugLabel {
    pub label: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CmdHeader {
    op: u16,
    size: u16,
}

//===----------------------------------------------------------------------===//
// Command stream
//===----------------------------------------------------------------------===//

/// Encoded commands: a header and a `Pod` payload per op.
///
/// Payloads are copied out unaligned on read, so the byte vector needs no
/// particular alignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandStream {
    data: Vec<u8>,
    labels: Vec<String>,
}

impl CommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: Pod>(&mut self, op: Op, payload: &T) {
        let header = CmdHeader {
            op: op as u16,
            size: core::mem::size_of::<T>() as u16,
        };
        self.data.extend_from_slice(bytes_of(&header));
        self.data.extend_from_slice(bytes_of(payload));
    }

    pub fn push_label(&mut self, op: Op, label: &str) {
        let index = self.labels.len() as u32;
        self.labels.push(label.to_string());
        self.push(op, &DebugLabel { label: index });
    }

    pub fn label(&self, index: u32) -> &str {
        self.labels
            .get(index as usize)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> CommandIter<'_> {
        CommandIter { data: &self.data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.labels.clear();
    }
}

pub struct Command<'a> {
    pub op: Op,
    bytes: &'a [u8],
}

impl<'a> Command<'a> {
    pub fn payload<T: Pod>(&self) -> T {
        debug_assert_eq!(self.bytes.len(), core::mem::size_of::<T>());
        pod_read_unaligned(self.bytes)
    }
}

pub struct CommandIter<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = Command<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        use core::mem::size_of;
        if self.data.len() < size_of::<CmdHeader>() {
            return None;
        }
        let (head_bytes, rest) = self.data.split_at(size_of::<CmdHeader>());
        let header: CmdHeader = pod_read_unaligned(head_bytes);
        if rest.len() < header.size as usize {
            return None;
        }
        let (payload, remaining) = rest.split_at(header.size as usize);
        self.data = remaining;
        let op = Op::from_u16(header.op)?;
        Some(Command { op, bytes: payload })
    }
}

impl Op {
    fn from_u16(v: u16) -> Option<Self> {
        const OPS: [Op; 22] = [
            Op::BeginRenderPass,
            Op::EndRenderPass,
            Op::SetPipeline,
            Op::SetVertexArray,
            Op::SetBinding,
            Op::SetViewport,
            Op::SetScissor,
            Op::Draw,
            Op::DrawIndexed,
            Op::BeginComputePass,
            Op::EndComputePass,
            Op::SetComputePipeline,
            Op::Dispatch,
            Op::CopyBufferToBuffer,
            Op::CopyBufferToTexture,
            Op::CopyTextureToBuffer,
            Op::CopyTextureToTexture,
            Op::WriteTimestamp,
            Op::ResolveQuerySet,
            Op::PushDebugGroup,
            Op::PopDebugGroup,
            Op::InsertDebugMarker,
        ];
        OPS.iter().copied().find(|op| *op as u16 == v)
    }
}

//===----------------------------------------------------------------------===//
// Sink
//===----------------------------------------------------------------------===//

/// Anything that can consume decoded commands: a native queue, the stateful
/// executor, or a test recorder.
pub trait CommandSink {
    fn begin_render_pass(&mut self, cmd: &BeginRenderPass);
    fn end_render_pass(&mut self, cmd: &EndRenderPass);
    fn set_pipeline(&mut self, cmd: &SetPipeline);
    fn set_vertex_array(&mut self, cmd: &SetVertexArray);
    fn set_binding(&mut self, cmd: &SetBinding);
    fn set_viewport(&mut self, cmd: &SetViewport);
    fn set_scissor(&mut self, cmd: &SetScissor);
    fn draw(&mut self, cmd: &Draw);
    fn draw_indexed(&mut self, cmd: &DrawIndexed);
    fn begin_compute_pass(&mut self, cmd: &BeginComputePass);
    fn end_compute_pass(&mut self, cmd: &EndComputePass);
    fn set_compute_pipeline(&mut self, cmd: &SetComputePipeline);
    fn dispatch(&mut self, cmd: &Dispatch);
    fn copy_buffer_to_buffer(&mut self, cmd: &CopyBufferToBuffer);
    fn copy_buffer_to_texture(&mut self, cmd: &CopyBufferToTexture);
    fn copy_texture_to_buffer(&mut self, cmd: &CopyTextureToBuffer);
    fn copy_texture_to_texture(&mut self, cmd: &CopyTextureToTexture);
    fn write_timestamp(&mut self, cmd: &WriteTimestamp);
    fn resolve_query_set(&mut self, cmd: &ResolveQuerySet);
    fn push_debug_group(&mut self, label: &str);
    fn pop_debug_group(&mut self);
    fn insert_debug_marker(&mut self, label: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_layouts_have_no_padding() {
        use core::mem::size_of;
        assert_eq!(size_of::<BeginRenderPass>(), 144);
        assert_eq!(size_of::<CopyBufferToTexture>(), 64);
        assert_eq!(size_of::<CopyTextureToTexture>(), 64);
        assert_eq!(size_of::<DrawIndexed>(), 24);
    }

    #[test]
    fn commands_iterate_in_recorded_order() {
        let mut stream = CommandStream::new();
        let begin = BeginRenderPass {
            color_count: 1,
            clear: ClearFlags::COLOR.bits(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            ..Default::default()
        };
        let draw = Draw {
            vertex_count: 3,
            instance_count: 1,
            ..Default::default()
        };
        stream.push(Op::BeginRenderPass, &begin);
        stream.push_label(Op::PushDebugGroup, "triangle");
        stream.push(Op::Draw, &draw);
        stream.push(Op::PopDebugGroup, &DebugLabel::default());
        stream.push(Op::EndRenderPass, &EndRenderPass::default());

        let ops: Vec<Op> = stream.iter().map(|cmd| cmd.op).collect();
        assert_eq!(
            ops,
            vec![
                Op::BeginRenderPass,
                Op::PushDebugGroup,
                Op::Draw,
                Op::PopDebugGroup,
                Op::EndRenderPass
            ]
        );

        let mut iter = stream.iter();
        assert_eq!(iter.next().unwrap().payload::<BeginRenderPass>(), begin);
        let label = iter.next().unwrap().payload::<DebugLabel>();
        assert_eq!(stream.label(label.label), "triangle");
        assert_eq!(iter.next().unwrap().payload::<Draw>(), draw);
    }

    #[test]
    fn clear_empties_stream() {
        let mut stream = CommandStream::new();
        stream.push(Op::Dispatch, &Dispatch { x: 1, y: 1, z: 1 });
        assert_eq!(stream.len(), 1);
        stream.clear();
        assert!(stream.is_empty());
    }
}
