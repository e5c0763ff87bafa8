use std::collections::HashMap;

use crate::driver::ir::{
    BeginComputePass, BeginRenderPass, CommandSink, CommandStream, CopyBufferToBuffer,
    CopyBufferToTexture, CopyTextureToBuffer, CopyTextureToTexture, Dispatch, Draw, DrawIndexed,
    EndComputePass, EndRenderPass, Op, ResolveQuerySet, SetBinding, SetComputePipeline,
    SetPipeline, SetScissor, SetVertexArray, SetViewport, WriteTimestamp,
};

use super::replayer::{CommandReplayer, Replayer};

/// A sink that performs no GPU work and only tallies what it was sent.
#[derive(Debug, Default, Clone)]
pub struct NullSink {
    counts: HashMap<Op, usize>,
    debug_depth: usize,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, op: Op) -> usize {
        self.counts.get(&op).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Debug groups pushed but not yet popped.
    pub fn open_debug_groups(&self) -> usize {
        self.debug_depth
    }

    fn bump(&mut self, op: Op) {
        *self.counts.entry(op).or_insert(0) += 1;
    }
}

impl CommandSink for NullSink {
    fn begin_render_pass(&mut self, _: &BeginRenderPass) {
        self.bump(Op::BeginRenderPass)
    }
    fn end_render_pass(&mut self, _: &EndRenderPass) {
        self.bump(Op::EndRenderPass)
    }
    fn set_pipeline(&mut self, _: &SetPipeline) {
        self.bump(Op::SetPipeline)
    }
    fn set_vertex_array(&mut self, _: &SetVertexArray) {
        self.bump(Op::SetVertexArray)
    }
    fn set_binding(&mut self, _: &SetBinding) {
        self.bump(Op::SetBinding)
    }
    fn set_viewport(&mut self, _: &SetViewport) {
        self.bump(Op::SetViewport)
    }
    fn set_scissor(&mut self, _: &SetScissor) {
        self.bump(Op::SetScissor)
    }
    fn draw(&mut self, _: &Draw) {
        self.bump(Op::Draw)
    }
    fn draw_indexed(&mut self, _: &DrawIndexed) {
        self.bump(Op::DrawIndexed)
    }
    fn begin_compute_pass(&mut self, _: &BeginComputePass) {
        self.bump(Op::BeginComputePass)
    }
    fn end_compute_pass(&mut self, _: &EndComputePass) {
        self.bump(Op::EndComputePass)
    }
    fn set_compute_pipeline(&mut self, _: &SetComputePipeline) {
        self.bump(Op::SetComputePipeline)
    }
    fn dispatch(&mut self, _: &Dispatch) {
        self.bump(Op::Dispatch)
    }
    fn copy_buffer_to_buffer(&mut self, _: &CopyBufferToBuffer) {
        self.bump(Op::CopyBufferToBuffer)
    }
    fn copy_buffer_to_texture(&mut self, _: &CopyBufferToTexture) {
        self.bump(Op::CopyBufferToTexture)
    }
    fn copy_texture_to_buffer(&mut self, _: &CopyTextureToBuffer) {
        self.bump(Op::CopyTextureToBuffer)
    }
    fn copy_texture_to_texture(&mut self, _: &CopyTextureToTexture) {
        self.bump(Op::CopyTextureToTexture)
    }
    fn write_timestamp(&mut self, _: &WriteTimestamp) {
        self.bump(Op::WriteTimestamp)
    }
    fn resolve_query_set(&mut self, _: &ResolveQuerySet) {
        self.bump(Op::ResolveQuerySet)
    }
    fn push_debug_group(&mut self, _: &str) {
        self.debug_depth += 1;
        self.bump(Op::PushDebugGroup)
    }
    fn pop_debug_group(&mut self) {
        self.debug_depth = self.debug_depth.saturating_sub(1);
        self.bump(Op::PopDebugGroup)
    }
    fn insert_debug_marker(&mut self, _: &str) {
        self.bump(Op::InsertDebugMarker)
    }
}

/// Replays an encoded command stream on any [`CommandSink`].
///
/// This is useful for tests or headless backends where commands are
/// interpreted without performing real GPU work.
pub struct NullReplayer<'a, S: CommandSink> {
    sink: &'a mut S,
}

impl<'a, S: CommandSink> NullReplayer<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self { sink }
    }

    pub fn replay(&mut self, stream: &CommandStream) {
        CommandReplayer::new(&mut *self.sink).replay(stream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ir::DebugLabel;

    #[test]
    fn null_sink_counts_replayed_ops() {
        let mut stream = CommandStream::new();
        stream.push(Op::BeginRenderPass, &BeginRenderPass::default());
        stream.push_label(Op::PushDebugGroup, "scope");
        stream.push(Op::Draw, &Draw::default());
        stream.push(Op::Draw, &Draw::default());
        stream.push(Op::PopDebugGroup, &DebugLabel::default());
        stream.push(Op::EndRenderPass, &EndRenderPass::default());

        let mut sink = NullSink::new();
        NullReplayer::new(&mut sink).replay(&stream);
        assert_eq!(sink.count(Op::Draw), 2);
        assert_eq!(sink.total(), 6);
        assert_eq!(sink.open_debug_groups(), 0);
    }
}
