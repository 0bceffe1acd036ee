//! Error types for the seismic CLI.

use std::process::ExitCode;

use seismic_core::{ErrorKind, SeismicError};
use thiserror::Error;

/// CLI result type alias.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type.
#[derive(Error, Debug)]
pub enum CliError {
    /// Failure reported by the engine.
    #[error(transparent)]
    Engine(#[from] SeismicError),

    /// Writing the output artifact failed.
    #[error("Cannot write {path}: {source}")]
    Output {
        /// Target file.
        path: String,
        /// Underlying engine error.
        source: SeismicError,
    },
}

impl CliError {
    /// Numeric exit status for this error.
    pub fn status(&self) -> u8 {
        let kind = match self {
            Self::Engine(err) => err.kind(),
            Self::Output { .. } => ErrorKind::Io,
        };
        match kind {
            ErrorKind::ConfigValidation => 2,
            ErrorKind::Allocation => 3,
            ErrorKind::ThreadLifecycle => 4,
            ErrorKind::Io => 5,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status())
    }

    /// Short label printed before the message.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Engine(err) => match err.kind() {
                ErrorKind::ConfigValidation => "Invalid configuration:",
                ErrorKind::Allocation => "Out of memory:",
                ErrorKind::ThreadLifecycle => "Thread failure:",
                ErrorKind::Io => "I/O error:",
            },
            Self::Output { .. } => "I/O error:",
        }
    }
}
