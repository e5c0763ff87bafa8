//! Devices and the backends they dispatch to.
//!
//! A [`Device`] wraps one native context, selected when the
//! [`DeviceFactory`] creates it: a stateful immediate-mode context, an
//! explicit command-list context, or no context at all. Everything above
//! this module talks to the device only.

mod builders;
mod context;
mod device;
mod explicit;
mod factory;
mod gl;
mod lost;
mod null;
mod reporter;
pub mod structs;

pub use builders::DeviceBuilder;
pub use device::{Device, WeakDevice};
pub use factory::DeviceFactory;
pub use lost::LostFuture;
pub use reporter::{DebugHook, ErrorHandler};
pub use structs::*;

pub(crate) use context::ContextBackend;
