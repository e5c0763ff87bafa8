use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GpuError;

pub type ErrorHandler = Arc<dyn Fn(&GpuError) + Send + Sync>;
pub type DebugHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Single sink for errors that surface away from the call that caused them.
#[derive(Default)]
pub(crate) struct ErrorReporter {
    handler: Mutex<Option<ErrorHandler>>,
    debug_hook: Mutex<Option<DebugHook>>,
    reported: AtomicUsize,
}

impl ErrorReporter {
    pub(crate) fn set_handler(&self, handler: Option<ErrorHandler>) {
        *self.handler.lock() = handler;
    }

    pub(crate) fn set_debug_hook(&self, hook: Option<DebugHook>) {
        *self.debug_hook.lock() = hook;
    }

    /// Handlers run outside the lock so they may call back into the device.
    pub(crate) fn report(&self, device: &str, error: &GpuError) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(error),
            None => log::error!("{device}: {error}"),
        }
    }

    pub(crate) fn debug(&self, device: &str) {
        let hook = self.debug_hook.lock().clone();
        match hook {
            Some(hook) => hook(device),
            None => log::warn!("{device}: debug break requested"),
        }
    }

    pub(crate) fn reported(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }
}
