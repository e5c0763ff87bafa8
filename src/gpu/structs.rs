use std::fmt;

#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use crate::caps::DeviceFeature;

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum BackendKind {
    /// Immediate-mode context with global state.
    Gl,
    /// Context that records command lists and submits them to a queue.
    Explicit,
    /// No native context; every call succeeds and does nothing.
    Null,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gl => "gl",
            BackendKind::Explicit => "explicit",
            BackendKind::Null => "null",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum PowerPreference {
    #[default]
    Default,
    LowPower,
    HighPerformance,
}

#[derive(Hash, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum SurfaceTarget {
    /// A platform canvas, identified by the windowing layer.
    Canvas(String),
    #[default]
    Offscreen,
}

#[derive(Hash, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct SurfaceProps {
    pub target: SurfaceTarget,
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceProps {
    fn default() -> Self {
        Self {
            target: SurfaceTarget::Offscreen,
            width: 800,
            height: 600,
        }
    }
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum DebugShaders {
    Never,
    /// Print the source listing when compilation fails.
    #[default]
    Errors,
    Warnings,
    Always,
}

/// Options recognized when creating a device.
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct DeviceProps {
    pub id: Option<String>,
    /// Forces a backend. `None` lets the factory choose.
    pub backend: Option<BackendKind>,
    pub prefer_explicit_backend: bool,
    pub required_features: Vec<DeviceFeature>,
    pub disabled_features: Vec<DeviceFeature>,
    /// Verbose diagnostics. Also forced on by `LUMO_DEBUG=1`.
    pub debug: bool,
    pub debug_shaders: DebugShaders,
    pub power_preference: PowerPreference,
    pub surface: SurfaceProps,
    /// Return the device already bound to a context instead of failing.
    pub reuse_existing_device: bool,
}

/// Name of the environment variable that forces debug mode.
pub const DEBUG_ENV: &str = "LUMO_DEBUG";

impl DeviceProps {
    /// `debug`, or the environment override.
    pub fn debug_enabled(&self) -> bool {
        self.debug
            || std::env::var(DEBUG_ENV)
                .map(|value| matches!(value.as_str(), "1" | "true"))
                .unwrap_or(false)
    }
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    Alive,
    Lost,
    Destroyed,
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LostReason {
    /// The device was destroyed by its owner.
    Destroyed,
    /// The platform took the context away.
    Unknown,
}

#[derive(Hash, Clone, Debug, PartialEq, Eq)]
pub struct LostInfo {
    pub reason: LostReason,
    pub message: String,
}

/// Monotonic index of a queue submission.
#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubmissionIndex(pub u64);

/// How `with_parameters` treats a failing callback.
#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ParameterMode {
    /// Restore state on every exit path.
    #[default]
    Safe,
    /// Skip restoration when the callback fails. Leaves the state stack
    /// unbalanced on error; only for hot paths that cannot afford a guard.
    NoCatch,
}
