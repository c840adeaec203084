//! Error types for Mpsync core operations.
//!
//! Errors are grouped by domain: device selection, transport invocation,
//! listing interpretation, and local file system work. Every engine entry
//! point surfaces [`DeviceError::NoDeviceSelected`] before doing anything
//! else, so callers can redirect the user to device selection.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for Mpsync core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Device selection or probing failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Invoking the board tool failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A local file system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors related to device selection and discovery.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No device has been selected for the session.
    #[error("No device set. Please set a device first.")]
    NoDeviceSelected,

    /// The given descriptor did not contain a usable port token.
    #[error("Device descriptor is empty or malformed: {descriptor:?}")]
    InvalidDescriptor {
        /// The raw descriptor line as discovered.
        descriptor: String,
    },
}

/// Errors raised at the board-tool boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The tool process could not be spawned at all.
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed {
        /// Program that was invoked.
        program: String,
        /// Underlying failure.
        reason: String,
    },

    /// The tool exited with a failure status and the call site needs output.
    #[error("`{command}` exited with {status}")]
    CommandFailed {
        /// The full command line that was run.
        command: String,
        /// Exit status description.
        status: String,
    },

    /// The fire-and-forget terminal channel is gone.
    #[error("Terminal channel closed; command not delivered: {command}")]
    TerminalClosed {
        /// The command that could not be delivered.
        command: String,
    },

    /// A redirected listing log never became readable in time.
    #[error("Timed out after {waited_ms}ms waiting for listing log {path}")]
    LogTimeout {
        /// The polled log file.
        path: PathBuf,
        /// How long the poller waited before giving up.
        waited_ms: u64,
    },
}

/// Errors for local file system operations.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },

    /// Failed to read a file or directory.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// The path that could not be read.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },

    /// Failed to remove a file.
    #[error("Failed to remove {path}: {reason}")]
    RemoveFailed {
        /// The path that could not be removed.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },
}

impl Error {
    /// Shorthand for the fail-fast "no device" check used by every entry point.
    #[must_use]
    pub const fn no_device() -> Self {
        Self::Device(DeviceError::NoDeviceSelected)
    }

    /// Whether this error should redirect focus to device selection.
    #[must_use]
    pub const fn is_no_device(&self) -> bool {
        matches!(self, Self::Device(DeviceError::NoDeviceSelected))
    }
}
