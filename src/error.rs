use thiserror::Error;

use crate::resource::ResourceKind;

/// Fieldless discriminant of [`GpuError`], handy for matching in callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfiguration,
    UnsupportedOperation,
    ResourceDestroyed,
    ContextAlreadyBound,
    Compilation,
    DeviceLost,
    InvalidState,
    Native,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GpuError {
    /// Creation props are malformed or exceed the device capabilities.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The backend cannot implement the request.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("{kind} \"{label}\" has been destroyed")]
    ResourceDestroyed { kind: ResourceKind, label: String },
    #[error("native context already bound to device \"{device}\"")]
    ContextAlreadyBound { device: String },
    #[error("compilation of \"{label}\" failed:\n{log}")]
    Compilation { label: String, log: String },
    /// Terminal. Every later call on the same device fails with this kind.
    #[error("device \"{device}\" lost: {message}")]
    DeviceLost { device: String, message: String },
    /// Call sequence misuse: finished encoders, resubmission, stack underflow.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Error captured from a native error scope.
    #[error("native error: {0}")]
    Native(String),
}

impl GpuError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GpuError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            GpuError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            GpuError::ResourceDestroyed { .. } => ErrorKind::ResourceDestroyed,
            GpuError::ContextAlreadyBound { .. } => ErrorKind::ContextAlreadyBound,
            GpuError::Compilation { .. } => ErrorKind::Compilation,
            GpuError::DeviceLost { .. } => ErrorKind::DeviceLost,
            GpuError::InvalidState(_) => ErrorKind::InvalidState,
            GpuError::Native(_) => ErrorKind::Native,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        GpuError::InvalidConfiguration(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        GpuError::UnsupportedOperation(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        GpuError::InvalidState(message.into())
    }
}

/// Convenient crate-wide result type.
pub type Result<T, E = GpuError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = GpuError::ResourceDestroyed {
            kind: ResourceKind::Buffer,
            label: "vertices".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ResourceDestroyed);
        assert_eq!(err.to_string(), "buffer \"vertices\" has been destroyed");
        assert_eq!(GpuError::state("x").kind(), ErrorKind::InvalidState);
    }
}
