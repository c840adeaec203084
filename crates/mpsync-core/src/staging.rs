//! Local staging area mirroring the device file system.
//!
//! Device files are staged under a fixed folder (`mprem_files`) relative to
//! the workspace root. The staging area is created on demand and enumerated
//! fresh for every sync session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{FileSystemError, Result};

/// Fixed name of the staging folder under the workspace root.
pub const STAGING_DIR_NAME: &str = "mprem_files";

/// A single staged path, relative to the staging root and `/`-separated so
/// it mirrors its [`RemoteEntry`](crate::listing::RemoteEntry) counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEntry {
    /// Path relative to the staging root, `/`-separated.
    pub path: String,
}

impl LocalEntry {
    /// Create an entry from a staging-relative path.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl std::fmt::Display for LocalEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// The local mirror root for device files.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Staging area under the given workspace root, at the conventional
    /// [`STAGING_DIR_NAME`] location.
    #[must_use]
    pub fn in_workspace(workspace_root: &Path) -> Self {
        Self {
            root: workspace_root.join(STAGING_DIR_NAME),
        }
    }

    /// Staging area rooted at an explicit path.
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The staging root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the staging root if it does not exist yet.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            FileSystemError::CreateDirFailed {
                path: self.root.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    /// Create every directory of a mirror plan under the staging root.
    ///
    /// Steps are `/`-separated device-relative prefixes, shallowest first;
    /// already-existing directories are fine.
    pub fn create_dirs(&self, plan: &[String]) -> Result<()> {
        for step in plan {
            let dir = crate::mirror::staging_destination(&self.root, step);
            std::fs::create_dir_all(&dir).map_err(|e| FileSystemError::CreateDirFailed {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Enumerate all staged files, relative to the staging root.
    ///
    /// A missing staging root yields an empty sequence: there is simply
    /// nothing staged yet.
    pub fn list(&self) -> Result<Vec<LocalEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| FileSystemError::ReadFailed {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(LocalEntry::new(path));
        }

        debug!("Staging area holds {} files", entries.len());
        Ok(entries)
    }

    /// Absolute location of a staged entry.
    #[must_use]
    pub fn absolute(&self, entry: &LocalEntry) -> PathBuf {
        crate::mirror::staging_destination(&self.root, &entry.path)
    }
}
