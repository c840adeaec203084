//! Device discovery, selection and session state.
//!
//! This module provides:
//! - Discovery of serial connections via the tool's `connect list` output
//! - Canonical port extraction from discovered descriptors
//! - The [`DeviceSession`] carrying the single active selection, owned by
//!   the hosting shell and passed explicitly to every engine call
//! - Supplemental one-shot device operations (run, save, mount, resets)

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DeviceError, Error, Result};
use crate::transport::{CommandExecutor, CommandTarget, DeviceCommand};

/// A serial connection descriptor as discovered, e.g.
/// `COM3 1a86:7523 USB Serial`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// The full descriptor line, trimmed.
    pub raw: String,
}

impl DeviceDescriptor {
    /// Wrap a trimmed descriptor line.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into().trim().to_string(),
        }
    }

    /// Canonical connection identifier: the leading token up to the first
    /// whitespace run.
    pub fn port(&self) -> Result<&str> {
        self.raw
            .split_whitespace()
            .next()
            .ok_or_else(|| {
                Error::Device(DeviceError::InvalidDescriptor {
                    descriptor: self.raw.clone(),
                })
            })
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// The single active device selection, plus the auto-device toggle.
///
/// Owned by the hosting shell and passed to every engine call; there is no
/// hidden process-wide selection. Selection changes only by explicit
/// re-selection, and consumers resolve a fresh [`CommandTarget`] per
/// operation rather than caching one, since the selection can change between
/// a listing call and the transfer that follows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    selected: Option<String>,
    auto_device: bool,
    connected: bool,
}

impl DeviceSession {
    /// Fresh session with nothing selected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The selected port, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Store a selection. The previous one is replaced; this is the only
    /// way a selection ever changes.
    pub fn select(&mut self, port: impl Into<String>) {
        let port = port.into();
        info!("Selected device is on port: {port}");
        self.selected = Some(port);
    }

    /// Whether auto-device addressing is enabled.
    #[must_use]
    pub const fn auto_device(&self) -> bool {
        self.auto_device
    }

    /// Flip the auto-device toggle and return the new state.
    pub fn toggle_auto_device(&mut self) -> bool {
        self.auto_device = !self.auto_device;
        info!(
            "Auto device {}",
            if self.auto_device { "enabled" } else { "disabled" }
        );
        self.auto_device
    }

    /// Whether the last selection probe reached the device.
    #[must_use]
    pub const fn connected(&self) -> bool {
        self.connected
    }

    /// Record the result of a connection probe.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Resolve the command target for the next operation.
    ///
    /// Auto-device takes precedence over an explicit selection. With neither
    /// in place this is the fail-fast "no device" error every entry point
    /// checks first.
    pub fn target(&self) -> Result<CommandTarget> {
        if self.auto_device {
            return Ok(CommandTarget::Auto);
        }
        match &self.selected {
            Some(port) => Ok(CommandTarget::Port(port.clone())),
            None => Err(Error::no_device()),
        }
    }
}

/// Discovers serial connections and applies selections to a session.
#[derive(Clone)]
pub struct DeviceRegistry {
    executor: Arc<dyn CommandExecutor>,
}

impl DeviceRegistry {
    /// Registry dispatching through the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Discover available connections, one descriptor per output line.
    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let output = self
            .executor
            .run(&DeviceCommand::connect_list(), &CommandTarget::Auto)
            .await?;
        if !output.success {
            warn!("Connection discovery failed; no devices reported");
            return Ok(Vec::new());
        }

        let devices: Vec<DeviceDescriptor> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(DeviceDescriptor::new)
            .collect();
        debug!("Discovered {} device(s)", devices.len());
        Ok(devices)
    }

    /// Select a discovered device into the session and probe it.
    ///
    /// The probe is a lightweight listing; its failure marks the session as
    /// not connected but does not revert the selection.
    pub async fn select(
        &self,
        session: &mut DeviceSession,
        descriptor: &DeviceDescriptor,
    ) -> Result<()> {
        let port = descriptor.port()?.to_string();
        session.select(port);

        let target = session.target()?;
        let connected = match self.executor.run(&DeviceCommand::ls(), &target).await {
            Ok(output) => output.success,
            Err(e) => {
                warn!("Probe after selection failed: {e}");
                false
            }
        };
        session.set_connected(connected);
        Ok(())
    }
}

/// One-shot device operations outside the sync/clear sessions.
///
/// Each operation resolves the session target first, so the "no device"
/// check happens before any command is constructed.
#[derive(Clone)]
pub struct DeviceController {
    executor: Arc<dyn CommandExecutor>,
}

impl DeviceController {
    /// Controller dispatching through the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Run a local script on the device.
    pub async fn run_file(&self, session: &DeviceSession, path: &Path) -> Result<()> {
        let target = session.target()?;
        self.executor.run(&DeviceCommand::run(path), &target).await?;
        Ok(())
    }

    /// Copy a local file into the device root under its own name.
    pub async fn save_file(&self, session: &DeviceSession, path: &Path) -> Result<()> {
        let target = session.target()?;
        self.executor
            .run(&DeviceCommand::copy_to(path, "."), &target)
            .await?;
        Ok(())
    }

    /// Create a local directory and mount it on the device.
    pub async fn mount(&self, session: &DeviceSession, dir: &Path) -> Result<()> {
        let target = session.target()?;
        std::fs::create_dir_all(dir).map_err(|e| {
            crate::error::FileSystemError::CreateDirFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        self.executor.run(&DeviceCommand::mount(dir), &target).await?;
        Ok(())
    }

    /// Soft-reset the device interpreter.
    pub async fn soft_reset(&self, session: &DeviceSession) -> Result<()> {
        let target = session.target()?;
        self.executor
            .run(&DeviceCommand::soft_reset(), &target)
            .await?;
        Ok(())
    }

    /// Hard-reset the device.
    pub async fn reset(&self, session: &DeviceSession) -> Result<()> {
        let target = session.target()?;
        self.executor.run(&DeviceCommand::reset(), &target).await?;
        Ok(())
    }
}
