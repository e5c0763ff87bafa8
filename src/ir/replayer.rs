use crate::driver::ir::{
    BeginComputePass, BeginRenderPass, CommandSink, CommandStream, CopyBufferToBuffer,
    CopyBufferToTexture, CopyTextureToBuffer, CopyTextureToTexture, DebugLabel, Dispatch, Draw,
    DrawIndexed, EndComputePass, EndRenderPass, Op as OpTag, ResolveQuerySet, SetBinding,
    SetComputePipeline, SetPipeline, SetScissor, SetVertexArray, SetViewport, WriteTimestamp,
};

/// Trait for types that can replay a [`CommandStream`] on a [`CommandSink`].
pub trait Replayer<S: CommandSink + ?Sized> {
    /// Obtain the underlying command sink.
    fn sink(&mut self) -> &mut S;

    /// Iterate over the encoded command stream and forward each operation to
    /// the underlying sink, in recorded order.
    fn replay(&mut self, stream: &CommandStream) {
        let sink = self.sink();
        for cmd in stream.iter() {
            match cmd.op {
                OpTag::BeginRenderPass => {
                    sink.begin_render_pass(&cmd.payload::<BeginRenderPass>())
                }
                OpTag::EndRenderPass => sink.end_render_pass(&cmd.payload::<EndRenderPass>()),
                OpTag::SetPipeline => sink.set_pipeline(&cmd.payload::<SetPipeline>()),
                OpTag::SetVertexArray => sink.set_vertex_array(&cmd.payload::<SetVertexArray>()),
                OpTag::SetBinding => sink.set_binding(&cmd.payload::<SetBinding>()),
                OpTag::SetViewport => sink.set_viewport(&cmd.payload::<SetViewport>()),
                OpTag::SetScissor => sink.set_scissor(&cmd.payload::<SetScissor>()),
                OpTag::Draw => sink.draw(&cmd.payload::<Draw>()),
                OpTag::DrawIndexed => sink.draw_indexed(&cmd.payload::<DrawIndexed>()),
                OpTag::BeginComputePass => {
                    sink.begin_compute_pass(&cmd.payload::<BeginComputePass>())
                }
                OpTag::EndComputePass => sink.end_compute_pass(&cmd.payload::<EndComputePass>()),
                OpTag::SetComputePipeline => {
                    sink.set_compute_pipeline(&cmd.payload::<SetComputePipeline>())
                }
                OpTag::Dispatch => sink.dispatch(&cmd.payload::<Dispatch>()),
                OpTag::CopyBufferToBuffer => {
                    sink.copy_buffer_to_buffer(&cmd.payload::<CopyBufferToBuffer>())
                }
                OpTag::CopyBufferToTexture => {
                    sink.copy_buffer_to_texture(&cmd.payload::<CopyBufferToTexture>())
                }
                OpTag::CopyTextureToBuffer => {
                    sink.copy_texture_to_buffer(&cmd.payload::<CopyTextureToBuffer>())
                }
                OpTag::CopyTextureToTexture => {
                    sink.copy_texture_to_texture(&cmd.payload::<CopyTextureToTexture>())
                }
                OpTag::WriteTimestamp => sink.write_timestamp(&cmd.payload::<WriteTimestamp>()),
                OpTag::ResolveQuerySet => {
                    sink.resolve_query_set(&cmd.payload::<ResolveQuerySet>())
                }
                OpTag::PushDebugGroup => {
                    let label = cmd.payload::<DebugLabel>();
                    sink.push_debug_group(stream.label(label.label))
                }
                OpTag::PopDebugGroup => sink.pop_debug_group(),
                OpTag::InsertDebugMarker => {
                    let label = cmd.payload::<DebugLabel>();
                    sink.insert_debug_marker(stream.label(label.label))
                }
            }
        }
    }
}

/// Generic replayer that forwards commands to any [`CommandSink`].
pub struct CommandReplayer<'a, S: CommandSink + ?Sized> {
    sink: &'a mut S,
}

impl<'a, S: CommandSink + ?Sized> CommandReplayer<'a, S> {
    /// Create a new replayer targeting the given sink.
    pub fn new(sink: &'a mut S) -> Self {
        Self { sink }
    }
}

impl<'a, S: CommandSink + ?Sized> Replayer<S> for CommandReplayer<'a, S> {
    fn sink(&mut self) -> &mut S {
        &mut *self.sink
    }
}
