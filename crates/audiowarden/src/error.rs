//! Errors raised by platform primitives.
//!
//! None of these are fatal to the daemon: every call site catches them,
//! logs, and treats the attempt as a no-op.

use thiserror::Error;

/// Failure of a volume, switch or event-subscription primitive.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Platform service unavailable: {0}")]
    Unavailable(String),

    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Unexpected platform output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PlatformResult<T> = Result<T, PlatformError>;
