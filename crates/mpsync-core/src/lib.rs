//! `Mpsync` Core Library
//!
//! This crate provides the core functionality for the `Mpsync` application:
//! - Serial device discovery and selection over the `mpremote` CLI
//! - Remote listing acquisition and parsing (captured output or shell logs)
//! - Directory mirroring between the device and a local staging folder
//! - Bidirectional sync sessions and confirmed bulk clears
//! - One-shot device operations (run, save, mount, resets)
//!
//! # Error Handling
//!
//! Errors are typed per domain; every engine entry point checks for a
//! missing device selection first and fails fast with a user-facing error.
//! See the [`error`] module for details.

pub mod clear;
pub mod device;
pub mod error;
pub mod listing;
pub mod mirror;
pub mod staging;
pub mod sync;
pub mod transport;

pub use clear::{
    AlwaysConfirm, ClearEngine, ClearOptions, ClearReport, ConfirmPrompt, PROTECTED_FILES,
};
pub use device::{DeviceController, DeviceDescriptor, DeviceRegistry, DeviceSession};
pub use error::{DeviceError, Error, FileSystemError, Result, TransportError};
pub use listing::{ListingFormat, RemoteEntry, RemoteLister, decode_listing, parse_listing};
pub use mirror::{TransferFilter, absolute_on_host, plan_directories, staging_destination};
pub use staging::{LocalEntry, STAGING_DIR_NAME, StagingArea};
pub use sync::{SyncDirection, SyncEngine, SyncPrompter, SyncReport};
pub use transport::{
    CommandExecutor, CommandOutput, CommandTarget, DEFAULT_LOG_POLL_INTERVAL, DEFAULT_LOG_TIMEOUT,
    DeviceCommand, LogFilePoller, OrderingGuarantee, SubprocessExecutor, TOOL_PROGRAM,
    TerminalExecutor,
};
