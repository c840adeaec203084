//! Path mirroring between the device and the local staging folder.
//!
//! Before any file copy can be issued, every directory on its destination
//! path must already exist: the board tool does not auto-create intermediate
//! directories on `cp`. This module computes the minimal ordered set of
//! directory-creation steps for a batch of entries and reconstructs
//! destination paths across the `/`-separated remote world and the host's
//! native separators.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Drive root used when rebuilding an absolute host path from a
/// device-relative one on Windows, where the first segment of the incoming
/// path names a pseudo-root that does not exist on the host.
#[cfg(windows)]
pub const HOST_DRIVE_ROOT: &str = "C:\\";

/// An optional file-extension filter applied to transfer candidates.
///
/// Empty means "all files". A leading dot in user input is stripped; the
/// match itself is a case-sensitive exact suffix match on the path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFilter {
    extension: Option<String>,
}

impl TransferFilter {
    /// Build a filter from free-text prompt input.
    #[must_use]
    pub fn new(input: &str) -> Self {
        let trimmed = input.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            Self { extension: None }
        } else {
            Self {
                extension: Some(trimmed.to_string()),
            }
        }
    }

    /// The "all files" filter.
    #[must_use]
    pub const fn all() -> Self {
        Self { extension: None }
    }

    /// Whether this filter selects every file.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        self.extension.is_none()
    }

    /// Whether the given path passes the filter.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match &self.extension {
            None => true,
            Some(ext) => path.ends_with(ext.as_str()),
        }
    }
}

impl std::fmt::Display for TransferFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.extension {
            None => write!(f, "all files"),
            Some(ext) => write!(f, "*.{ext}"),
        }
    }
}

/// Split a `/`-separated path into its non-empty segments.
fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Whether the final segment of a path names a file rather than a directory.
///
/// Trailing-separator entries are always directories; otherwise an extension
/// with a non-empty stem marks a file.
fn final_segment_is_file(path: &str) -> bool {
    if path.ends_with('/') {
        return false;
    }
    segments(path)
        .last()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(stem, _)| !stem.is_empty())
}

/// Compute the ordered directory-creation steps needed before copying the
/// given entries.
///
/// For each path, every prefix of its segment sequence except a final file
/// segment yields one step, shallowest first; steps already planned in this
/// pass are skipped, so a batch sharing directories plans each one exactly
/// once. Creating an already-existing directory downstream must not fail the
/// pipeline, so the plan stays idempotent on both sides.
#[must_use]
pub fn plan_directories<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut steps = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let segs = segments(path);
        if segs.is_empty() {
            continue;
        }

        let dir_count = if final_segment_is_file(path) {
            segs.len() - 1
        } else {
            segs.len()
        };

        for depth in 1..=dir_count {
            let prefix = segs[..depth].join("/");
            if seen.insert(prefix.clone()) {
                steps.push(prefix);
            }
        }
    }

    steps
}

/// Reconstruct the local destination for a device-relative path under the
/// staging root, using the host's native separators.
#[must_use]
pub fn staging_destination(staging_root: &Path, remote_path: &str) -> PathBuf {
    let mut dest = staging_root.to_path_buf();
    for seg in segments(remote_path) {
        dest.push(seg);
    }
    dest
}

/// Rebuild an absolute host path from a device-relative one.
///
/// On Windows the first segment of the incoming path is discarded and the
/// result is re-rooted at [`HOST_DRIVE_ROOT`]; elsewhere the path is joined
/// under the host root unchanged.
#[cfg(windows)]
#[must_use]
pub fn absolute_on_host(remote_path: &str) -> PathBuf {
    let mut dest = PathBuf::from(HOST_DRIVE_ROOT);
    for seg in segments(remote_path).into_iter().skip(1) {
        dest.push(seg);
    }
    dest
}

/// Rebuild an absolute host path from a device-relative one.
#[cfg(not(windows))]
#[must_use]
pub fn absolute_on_host(remote_path: &str) -> PathBuf {
    let mut dest = PathBuf::from("/");
    for seg in segments(remote_path) {
        dest.push(seg);
    }
    dest
}
