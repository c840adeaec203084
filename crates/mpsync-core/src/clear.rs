//! Clear engine: confirmed bulk deletion of device files.
//!
//! Deletion is destructive and unrecoverable on the board, so a blocking
//! Yes/No confirmation gates it unless a composite operation explicitly
//! suppresses the prompt. The device's auto-run boot file is always exempt,
//! and directory removal runs deepest-first because the tool refuses to
//! remove a non-empty directory.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device::DeviceSession;
use crate::error::Result;
use crate::listing::{RemoteEntry, RemoteLister};
use crate::transport::{CommandExecutor, DeviceCommand};

/// File names that are never included in a bulk delete.
pub const PROTECTED_FILES: &[&str] = &["boot.py"];

/// Blocking Yes/No confirmation surface supplied by the hosting shell.
#[cfg_attr(test, mockall::automock)]
pub trait ConfirmPrompt {
    /// Ask whether everything on the device should really be deleted.
    /// Dismissing the prompt counts as "No".
    fn confirm_clear(&self) -> bool;
}

/// Confirmation that always answers "Yes", for suppressed internal use.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl ConfirmPrompt for AlwaysConfirm {
    fn confirm_clear(&self) -> bool {
        true
    }
}

/// Configuration for a clear operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearOptions {
    /// Skip the confirmation prompt and behave as if the user answered
    /// "Yes". Used by composite operations such as sync-and-clear.
    pub suppress_confirmation: bool,
    /// Whether listed directories are removed (deepest-first, after their
    /// contents) or silently left in place.
    pub prune_directories: bool,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            suppress_confirmation: false,
            prune_directories: true,
        }
    }
}

impl ClearOptions {
    /// Options for suppressed internal clears.
    #[must_use]
    pub fn suppressed() -> Self {
        Self {
            suppress_confirmation: true,
            ..Self::default()
        }
    }

    /// Set whether directories are pruned.
    #[must_use]
    pub const fn with_prune_directories(mut self, prune: bool) -> Self {
        self.prune_directories = prune;
        self
    }
}

/// Result of a clear operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClearReport {
    /// Whether the user declined (or dismissed) the confirmation.
    pub was_cancelled: bool,
    /// Remove commands issued for files.
    pub files_removed: usize,
    /// Remove commands issued for directories.
    pub directories_removed: usize,
    /// Entries skipped because they are protected or the root itself.
    pub skipped: usize,
    /// Remove commands the transport reported as failed.
    pub failed: usize,
}

impl ClearReport {
    fn cancelled() -> Self {
        Self {
            was_cancelled: true,
            ..Self::default()
        }
    }

    /// Get a summary string of the clear result.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.was_cancelled {
            "Deletion canceled.".to_string()
        } else {
            format!(
                "Removed {} files and {} directories ({} skipped, {} failed)",
                self.files_removed, self.directories_removed, self.skipped, self.failed
            )
        }
    }
}

/// Whether an entry may never be deleted: the protected boot file and the
/// root path itself.
fn is_protected(entry: &RemoteEntry) -> bool {
    let path = entry.path.as_str();
    if path.is_empty() || path == "/" || path == "." {
        return true;
    }
    PROTECTED_FILES.contains(&path)
}

/// Orchestrates confirmed bulk deletion of remote files.
#[derive(Clone)]
pub struct ClearEngine {
    executor: Arc<dyn CommandExecutor>,
    lister: RemoteLister,
}

impl ClearEngine {
    /// Engine dispatching through the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        let lister = RemoteLister::new(Arc::clone(&executor));
        Self { executor, lister }
    }

    /// Delete everything on the device except the protected files.
    ///
    /// Fails fast when no device is selected. Unless suppressed, asks for
    /// confirmation first; "No" or dismiss aborts with no side effects.
    pub async fn clear(
        &self,
        session: &DeviceSession,
        prompt: &dyn ConfirmPrompt,
        options: &ClearOptions,
    ) -> Result<ClearReport> {
        let target = session.target()?;

        if !options.suppress_confirmation && !prompt.confirm_clear() {
            info!("Deletion canceled.");
            return Ok(ClearReport::cancelled());
        }

        let entries = self.lister.list(&target).await?;
        let mut report = ClearReport::default();

        let mut removable: Vec<&RemoteEntry> = Vec::new();
        for entry in &entries {
            if is_protected(entry) {
                debug!("Skipping protected entry: {}", entry.path);
                report.skipped += 1;
            } else if entry.is_dir() && !options.prune_directories {
                report.skipped += 1;
            } else {
                removable.push(entry);
            }
        }

        // Children before parents, so directories are empty by the time
        // their own remove command runs.
        removable.sort_by_key(|e| std::cmp::Reverse(e.depth()));

        for entry in removable {
            let command = if entry.is_dir() {
                DeviceCommand::remove_dir(entry.path.trim_end_matches('/'))
            } else {
                DeviceCommand::remove(entry.path.trim())
            };
            let output = self.executor.run(&command, &target).await?;
            if !output.success {
                report.failed += 1;
            } else if entry.is_dir() {
                report.directories_removed += 1;
            } else {
                report.files_removed += 1;
            }
        }

        info!("{}", report.summary());
        Ok(report)
    }
}
