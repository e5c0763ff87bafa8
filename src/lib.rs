//! `lumo`: a GPU device abstraction over stateful immediate-mode contexts
//! and explicit command-list contexts.
//!
//! Start from a [`DeviceFactory`], create a [`Device`], and create resources,
//! encoders and submissions through it. [`native::recording`] provides
//! headless contexts for tests and tools.

pub mod caps;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod ir;
pub mod native;
pub mod resource;
pub mod utils;

pub use caps::{DeviceFeature, DeviceFeatures, DeviceLimits, TextureFormat, VertexFormat};
pub use driver::encoder::{
    CommandBuffer, CommandEncoder, CommandEncoderProps, ComputePass, EncodeStrategy,
    ImageDataLayout, RenderPass, RenderPassProps,
};
pub use driver::params::{GlParameter, ParameterValue, Parameters};
pub use error::{ErrorKind, GpuError, Result};
pub use gpu::*;
pub use resource::*;
