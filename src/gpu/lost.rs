use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use super::structs::{LostInfo, LostReason};

/// Shared, one-shot future resolving when the device is lost.
pub type LostFuture = Shared<BoxFuture<'static, LostInfo>>;

/// Resolves at most once. If the sender is dropped unfired, observers see a
/// `Destroyed` loss.
pub(crate) struct LostSignal {
    sender: Mutex<Option<oneshot::Sender<LostInfo>>>,
    future: LostFuture,
}

impl LostSignal {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        let future = receiver
            .map(|info| {
                info.unwrap_or_else(|_| LostInfo {
                    reason: LostReason::Destroyed,
                    message: "device dropped".to_string(),
                })
            })
            .boxed()
            .shared();
        Self {
            sender: Mutex::new(Some(sender)),
            future,
        }
    }

    /// Returns false if the signal already fired.
    pub(crate) fn fire(&self, info: LostInfo) -> bool {
        match self.sender.lock().take() {
            Some(sender) => {
                let _ = sender.send(info);
                true
            }
            None => false,
        }
    }

    pub(crate) fn future(&self) -> LostFuture {
        self.future.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once() {
        let signal = LostSignal::new();
        assert!(signal.fire(LostInfo {
            reason: LostReason::Unknown,
            message: "first".into()
        }));
        assert!(!signal.fire(LostInfo {
            reason: LostReason::Destroyed,
            message: "second".into()
        }));
        let info = pollster::block_on(signal.future());
        assert_eq!(info.reason, LostReason::Unknown);
        assert_eq!(info.message, "first");
    }

    #[test]
    fn dropped_signal_reports_destroyed() {
        let signal = LostSignal::new();
        let future = signal.future();
        drop(signal);
        assert_eq!(pollster::block_on(future).reason, LostReason::Destroyed);
    }
}
