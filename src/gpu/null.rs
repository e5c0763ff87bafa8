use std::collections::HashMap;

use crate::caps::DeviceLimits;
use crate::driver::ir::CommandStream;
use crate::ir::NullSink;
use crate::ir::NullReplayer;
use crate::native::{ContextId, DeviceInfo, NativeHandle};
use crate::resource::ResourceKind;

/// Backend without a native context. Objects are counters, data is dropped.
pub(crate) struct NullBackend {
    context: ContextId,
    next_handle: u64,
    live: HashMap<NativeHandle, ResourceKind>,
    sink: NullSink,
}

impl NullBackend {
    pub(crate) fn new(context: ContextId) -> Self {
        Self {
            context,
            next_handle: 1,
            live: HashMap::new(),
            sink: NullSink::new(),
        }
    }

    pub(crate) fn context_id(&self) -> ContextId {
        self.context
    }

    pub(crate) fn info() -> DeviceInfo {
        DeviceInfo {
            vendor: "no-gpu".into(),
            renderer: "null".into(),
            version: "1.0".into(),
            shading_language: "glsl".into(),
            shading_language_version: "300".into(),
        }
    }

    pub(crate) fn limits() -> DeviceLimits {
        DeviceLimits::default()
    }

    pub(crate) fn create_object(&mut self, kind: ResourceKind) -> NativeHandle {
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, kind);
        handle
    }

    pub(crate) fn delete_object(&mut self, handle: NativeHandle) {
        self.live.remove(&handle);
    }

    pub(crate) fn live_objects(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn submit(&mut self, stream: &CommandStream) {
        NullReplayer::new(&mut self.sink).replay(stream);
        log::trace!("null backend replayed {} commands", self.sink.total());
    }
}
