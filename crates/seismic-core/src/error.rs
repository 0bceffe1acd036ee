//! Error types for the seismic engine.

use thiserror::Error;

/// Result type for seismic operations.
pub type Result<T> = std::result::Result<T, SeismicError>;

/// Coarse classification of a [`SeismicError`].
///
/// Every class is fatal for a run; the classification only decides which
/// message and exit status the caller reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad geometry, alignment or kernel name. Detected before any buffer is
    /// allocated or thread started.
    ConfigValidation,
    /// A grid or pulse buffer could not be allocated.
    Allocation,
    /// Worker creation, join or barrier failure.
    ThreadLifecycle,
    /// Writing the result artifact failed.
    Io,
}

/// Errors that can occur while configuring or running a simulation.
#[derive(Error, Debug)]
pub enum SeismicError {
    /// The requested kernel is unknown or not supported by this processor.
    #[error("Unsupported kernel variant '{name}': {reason}")]
    UnsupportedVariant {
        /// Requested variant name.
        name: String,
        /// Why the variant cannot be used.
        reason: String,
    },

    /// Grid geometry, thread count or pulse position is invalid.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Buffer alignment is not representable.
    #[error("Invalid alignment: {0}")]
    InvalidAlignment(String),

    /// A kernel variant could not be registered.
    #[error("Invalid kernel registration: {0}")]
    InvalidRegistration(String),

    /// Host allocation failed.
    #[error("Failed to allocate {bytes} bytes")]
    Allocation {
        /// Requested size in bytes.
        bytes: usize,
    },

    /// A worker thread could not be created, joined, or diverged.
    #[error("Thread lifecycle failure: {0}")]
    ThreadLifecycle(String),

    /// The step barrier was torn down while a worker was waiting on it.
    #[error("Step barrier aborted: a peer worker failed")]
    BarrierAborted,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeismicError {
    /// Create an unsupported-variant error.
    pub fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedVariant {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a geometry error.
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create an alignment error.
    pub fn alignment(msg: impl Into<String>) -> Self {
        Self::InvalidAlignment(msg.into())
    }

    /// Create a thread lifecycle error.
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::ThreadLifecycle(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedVariant { .. }
            | Self::InvalidGeometry(_)
            | Self::InvalidAlignment(_)
            | Self::InvalidRegistration(_) => ErrorKind::ConfigValidation,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::ThreadLifecycle(_) | Self::BarrierAborted => ErrorKind::ThreadLifecycle,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
