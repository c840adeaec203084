//! Sync engine: one bidirectional sync session between the device and the
//! local staging folder.
//!
//! A session walks a fixed sequence: fail fast without a device, prompt for
//! an optional extension filter, prompt for a direction, execute, done.
//! Nothing is persisted between sessions; filter and direction live only for
//! the one run. Dismissing the filter prompt counts as "all files" (a
//! deliberate leniency), while dismissing the direction pick ends the
//! session silently with no side effects.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clear::{AlwaysConfirm, ClearEngine, ClearOptions, ClearReport};
use crate::device::DeviceSession;
use crate::error::Result;
use crate::listing::RemoteLister;
use crate::mirror::{TransferFilter, plan_directories};
use crate::staging::{LocalEntry, StagingArea};
use crate::transport::{CommandExecutor, CommandTarget, DeviceCommand, OrderingGuarantee};

/// Direction of one sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Copy matching device files into the staging folder.
    FromDevice,
    /// Copy matching staged files onto the device.
    ToDevice,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FromDevice => write!(f, "from device to local"),
            Self::ToDevice => write!(f, "from local to device"),
        }
    }
}

/// Prompt surface for a sync session, supplied by the hosting shell.
#[cfg_attr(test, mockall::automock)]
pub trait SyncPrompter {
    /// Free-text extension filter. `None` means the prompt was dismissed;
    /// an empty string means "all files".
    fn extension_filter(&self) -> Option<String>;

    /// Binary direction choice. `None` means the pick was dismissed.
    fn direction(&self) -> Option<SyncDirection>;
}

/// Result of one sync session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Chosen direction, absent when the session was dismissed.
    pub direction: Option<SyncDirection>,
    /// The filter that was applied.
    pub filter: TransferFilter,
    /// Entries seen on the source side.
    pub entries_listed: usize,
    /// Copy commands issued.
    pub files_copied: usize,
    /// Directory-creation steps planned ahead of the copies.
    pub directories_planned: usize,
    /// Copy commands the transport reported as failed.
    pub failed: usize,
    /// Embedded clear result for the replace-everything path and for
    /// sync-and-clear.
    pub cleared: Option<ClearReport>,
    /// Whether the session ended at the direction pick with no side effects.
    pub was_cancelled: bool,
}

impl SyncReport {
    fn new(filter: TransferFilter) -> Self {
        Self {
            direction: None,
            filter,
            entries_listed: 0,
            files_copied: 0,
            directories_planned: 0,
            failed: 0,
            cleared: None,
            was_cancelled: false,
        }
    }

    fn cancelled(filter: TransferFilter) -> Self {
        Self {
            was_cancelled: true,
            ..Self::new(filter)
        }
    }

    /// Get a summary string of the sync result.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.was_cancelled {
            "Sync dismissed; nothing transferred".to_string()
        } else {
            format!(
                "Synced {} of {} entries ({}), {} failed",
                self.files_copied, self.entries_listed, self.filter, self.failed
            )
        }
    }
}

/// Orchestrates sync sessions between the device and the staging folder.
#[derive(Clone)]
pub struct SyncEngine {
    executor: Arc<dyn CommandExecutor>,
    lister: RemoteLister,
    clear: ClearEngine,
    staging: StagingArea,
}

impl SyncEngine {
    /// Engine dispatching through the given executor, staging into the
    /// given area.
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>, staging: StagingArea) -> Self {
        let lister = RemoteLister::new(Arc::clone(&executor));
        let clear = ClearEngine::new(Arc::clone(&executor));
        Self {
            executor,
            lister,
            clear,
            staging,
        }
    }

    /// The staging area this engine mirrors into.
    #[must_use]
    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Run one interactive sync session.
    ///
    /// Fails fast when no device is selected; the caller redirects the user
    /// to device selection. Direction dismissal ends the session silently.
    pub async fn sync(
        &self,
        session: &DeviceSession,
        prompter: &dyn SyncPrompter,
    ) -> Result<SyncReport> {
        let target = session.target()?;

        // A dismissed filter prompt proceeds with all files rather than
        // aborting the session; see DESIGN.md.
        let filter = TransferFilter::new(&prompter.extension_filter().unwrap_or_default());

        let Some(direction) = prompter.direction() else {
            debug!("Direction pick dismissed; ending sync session");
            return Ok(SyncReport::cancelled(filter));
        };
        info!("Sync session: {direction}, {filter}");

        match direction {
            SyncDirection::FromDevice => self.copy_from_device(&target, &filter).await,
            SyncDirection::ToDevice => self.copy_to_device(session, &target, &filter).await,
        }
    }

    /// Copy everything off the device, then clear it.
    ///
    /// The composite "archive and wipe" operation: an unfiltered
    /// from-device sync followed by a suppressed clear.
    pub async fn sync_and_clear(&self, session: &DeviceSession) -> Result<SyncReport> {
        let target = session.target()?;
        let mut report = self.copy_from_device(&target, &TransferFilter::all()).await?;
        let cleared = self
            .clear
            .clear(session, &AlwaysConfirm, &ClearOptions::suppressed())
            .await?;
        report.cleared = Some(cleared);
        Ok(report)
    }

    async fn copy_from_device(
        &self,
        target: &CommandTarget,
        filter: &TransferFilter,
    ) -> Result<SyncReport> {
        let entries = self.lister.list(target).await?;
        let mut report = SyncReport::new(filter.clone());
        report.direction = Some(SyncDirection::FromDevice);
        report.entries_listed = entries.len();

        let candidates: Vec<&str> = entries
            .iter()
            .filter(|e| e.is_file() && filter.matches(&e.path))
            .map(|e| e.path.as_str())
            .collect();

        self.staging.ensure()?;
        let plan = plan_directories(candidates.iter().copied());
        self.staging.create_dirs(&plan)?;
        report.directories_planned = plan.len();

        for path in candidates {
            let dest = self.staging.absolute(&LocalEntry::new(path));
            let output = self
                .executor
                .run(&DeviceCommand::copy_from(path, &dest), target)
                .await?;
            if output.success {
                report.files_copied += 1;
            } else {
                report.failed += 1;
            }
        }

        info!("{}", report.summary());
        Ok(report)
    }

    async fn copy_to_device(
        &self,
        session: &DeviceSession,
        target: &CommandTarget,
        filter: &TransferFilter,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new(filter.clone());
        report.direction = Some(SyncDirection::ToDevice);

        if filter.is_all() {
            // Replace-everything fast path: wipe the device, push the whole
            // staging tree in one recursive copy, then refresh the listing.
            self.staging.ensure()?;
            let cleared = self
                .clear
                .clear(session, &AlwaysConfirm, &ClearOptions::suppressed())
                .await?;
            report.cleared = Some(cleared);

            let output = self
                .executor
                .run(&DeviceCommand::copy_tree_to_root(self.staging.root()), target)
                .await?;
            if output.success {
                report.files_copied = self.staging.list()?.len();
            } else {
                report.failed += 1;
            }

            let refreshed = self.lister.list(target).await?;
            report.entries_listed = refreshed.len();
        } else {
            let locals = self.staging.list()?;
            report.entries_listed = locals.len();
            let candidates: Vec<&LocalEntry> =
                locals.iter().filter(|e| filter.matches(&e.path)).collect();

            let plan = plan_directories(candidates.iter().map(|e| e.path.as_str()));
            report.directories_planned = plan.len();
            if !plan.is_empty() && self.executor.ordering() == OrderingGuarantee::Issuance {
                // Known limitation: an issuance-ordered executor cannot
                // guarantee the mkdir finished before the copy into it.
                warn!("Directory creation is not awaited on this transport; copies may race it");
            }
            for step in &plan {
                self.executor
                    .run(&DeviceCommand::make_dir(step), target)
                    .await?;
            }

            for entry in candidates {
                let local = self.staging.absolute(entry);
                let output = self
                    .executor
                    .run(&DeviceCommand::copy_to(&local, &entry.path), target)
                    .await?;
                if output.success {
                    report.files_copied += 1;
                } else {
                    report.failed += 1;
                }
            }
        }

        info!("{}", report.summary());
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::transport::CommandOutput;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Executor that records every issued command line and serves a fixed
    /// listing.
    struct RecordingExecutor {
        listing: String,
        ordering: OrderingGuarantee,
        lines: Mutex<Vec<String>>,
    }

    impl RecordingExecutor {
        fn new(listing: &str) -> Self {
            Self {
                listing: listing.to_string(),
                ordering: OrderingGuarantee::Completion,
                lines: Mutex::new(Vec::new()),
            }
        }

        fn issuance_ordered(listing: &str) -> Self {
            Self {
                ordering: OrderingGuarantee::Issuance,
                ..Self::new(listing)
            }
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn run(
            &self,
            command: &DeviceCommand,
            target: &CommandTarget,
        ) -> Result<CommandOutput> {
            let line = command.command_line(target);
            self.lines.lock().expect("lock").push(line.clone());
            if line.ends_with(" ls") {
                Ok(CommandOutput {
                    success: true,
                    stdout: self.listing.clone(),
                })
            } else {
                Ok(CommandOutput::empty(true))
            }
        }

        fn ordering(&self) -> OrderingGuarantee {
            self.ordering
        }
    }

    struct FixedPrompter {
        filter: Option<String>,
        direction: Option<SyncDirection>,
    }

    impl SyncPrompter for FixedPrompter {
        fn extension_filter(&self) -> Option<String> {
            self.filter.clone()
        }

        fn direction(&self) -> Option<SyncDirection> {
            self.direction
        }
    }

    fn selected_session() -> DeviceSession {
        let mut session = DeviceSession::new();
        session.select("COM3");
        session
    }

    const LISTING: &str =
        "ls :\n         139 boot.py\n          10 lib/util.py\n          10 data.bin\n";

    fn engine_with(executor: Arc<RecordingExecutor>, workspace: &TempDir) -> SyncEngine {
        SyncEngine::new(executor, StagingArea::in_workspace(workspace.path()))
    }

    #[tokio::test]
    async fn test_sync_rejects_without_device() {
        let workspace = TempDir::new().expect("create temp dir");
        let executor = Arc::new(RecordingExecutor::new(LISTING));
        let engine = engine_with(executor.clone(), &workspace);

        let prompter = FixedPrompter {
            filter: Some(String::new()),
            direction: Some(SyncDirection::FromDevice),
        };
        let err = engine
            .sync(&DeviceSession::new(), &prompter)
            .await
            .expect_err("no device selected");
        assert!(err.is_no_device());
        assert!(executor.lines().is_empty());
    }

    #[tokio::test]
    async fn test_sync_dismissed_direction_is_silent_noop() {
        let workspace = TempDir::new().expect("create temp dir");
        let executor = Arc::new(RecordingExecutor::new(LISTING));
        let engine = engine_with(executor.clone(), &workspace);

        let prompter = FixedPrompter {
            filter: Some("py".to_string()),
            direction: None,
        };
        let report = engine
            .sync(&selected_session(), &prompter)
            .await
            .expect("dismissal is not an error");
        assert!(report.was_cancelled);
        assert!(executor.lines().is_empty());
    }

    #[tokio::test]
    async fn test_sync_dismissed_filter_means_all_files() {
        let workspace = TempDir::new().expect("create temp dir");
        let executor = Arc::new(RecordingExecutor::new(LISTING));
        let engine = engine_with(executor.clone(), &workspace);

        let prompter = FixedPrompter {
            filter: None,
            direction: Some(SyncDirection::FromDevice),
        };
        let report = engine
            .sync(&selected_session(), &prompter)
            .await
            .expect("sync");
        assert!(report.filter.is_all());
        // boot.py, lib/util.py and data.bin are all files and all match.
        assert_eq!(report.files_copied, 3);
    }

    #[tokio::test]
    async fn test_from_device_filters_and_mirrors_directories() {
        let workspace = TempDir::new().expect("create temp dir");
        let executor = Arc::new(RecordingExecutor::new(LISTING));
        let engine = engine_with(executor.clone(), &workspace);

        let prompter = FixedPrompter {
            filter: Some("py".to_string()),
            direction: Some(SyncDirection::FromDevice),
        };
        let report = engine
            .sync(&selected_session(), &prompter)
            .await
            .expect("sync");

        assert_eq!(report.files_copied, 2);
        assert_eq!(report.directories_planned, 1);
        // The staging mirror for lib/ exists before the copy is issued.
        assert!(workspace.path().join("mprem_files/lib").is_dir());

        let lines = executor.lines();
        assert!(lines.iter().any(|l| l.contains("cp :boot.py")));
        assert!(lines.iter().any(|l| l.contains("cp :lib/util.py")));
        assert!(!lines.iter().any(|l| l.contains("data.bin")));
    }

    #[tokio::test]
    async fn test_from_device_empty_listing_copies_nothing() {
        let workspace = TempDir::new().expect("create temp dir");
        let executor = Arc::new(RecordingExecutor::new(""));
        let engine = engine_with(executor.clone(), &workspace);

        let prompter = FixedPrompter {
            filter: Some(String::new()),
            direction: Some(SyncDirection::FromDevice),
        };
        let report = engine
            .sync(&selected_session(), &prompter)
            .await
            .expect("sync");

        assert_eq!(report.files_copied, 0);
        // Only the listing command ran; no copies were attempted.
        assert_eq!(executor.lines().len(), 1);
    }

    fn stage_files(workspace: &TempDir) {
        let staging = workspace.path().join("mprem_files");
        fs::create_dir_all(staging.join("lib")).expect("mkdir");
        fs::write(staging.join("main.py"), "pass").expect("write");
        fs::write(staging.join("lib/util.py"), "pass").expect("write");
        fs::write(staging.join("notes.txt"), "text").expect("write");
    }

    #[tokio::test]
    async fn test_to_device_filtered_creates_remote_dirs_first() {
        let workspace = TempDir::new().expect("create temp dir");
        stage_files(&workspace);
        let executor = Arc::new(RecordingExecutor::new(LISTING));
        let engine = engine_with(executor.clone(), &workspace);

        let prompter = FixedPrompter {
            filter: Some("py".to_string()),
            direction: Some(SyncDirection::ToDevice),
        };
        let report = engine
            .sync(&selected_session(), &prompter)
            .await
            .expect("sync");

        assert_eq!(report.files_copied, 2);
        let lines = executor.lines();
        let mkdir_pos = lines.iter().position(|l| l.ends_with("mkdir lib"));
        let copy_pos = lines.iter().position(|l| l.contains(":lib/util.py"));
        assert!(mkdir_pos.expect("mkdir issued") < copy_pos.expect("copy issued"));
        // The additive filtered path never clears the device.
        assert!(!lines.iter().any(|l| l.contains(" rm ")));
        assert!(!lines.iter().any(|l| l.contains("cp -r")));
    }

    #[tokio::test]
    async fn test_to_device_all_is_replace_everything() {
        let workspace = TempDir::new().expect("create temp dir");
        stage_files(&workspace);
        let executor = Arc::new(RecordingExecutor::new(LISTING));
        let engine = engine_with(executor.clone(), &workspace);

        let prompter = FixedPrompter {
            filter: Some(String::new()),
            direction: Some(SyncDirection::ToDevice),
        };
        let report = engine
            .sync(&selected_session(), &prompter)
            .await
            .expect("sync");

        let lines = executor.lines();
        // Clear first (protected file spared), then the recursive copy,
        // then a listing refresh.
        let clear_pos = lines.iter().position(|l| l.contains(" rm "));
        let copy_pos = lines.iter().position(|l| l.contains("cp -r"));
        let refresh_pos = lines.iter().rposition(|l| l.ends_with(" ls"));
        assert!(clear_pos.expect("cleared") < copy_pos.expect("copied"));
        assert!(copy_pos.expect("copied") < refresh_pos.expect("refreshed"));
        assert!(!lines.iter().any(|l| l.contains("rm boot.py")));

        assert!(report.cleared.is_some());
        assert_eq!(report.files_copied, 3);
    }

    #[tokio::test]
    async fn test_sync_and_clear_copies_then_wipes() {
        let workspace = TempDir::new().expect("create temp dir");
        let executor = Arc::new(RecordingExecutor::new(LISTING));
        let engine = engine_with(executor.clone(), &workspace);

        let report = engine
            .sync_and_clear(&selected_session())
            .await
            .expect("sync and clear");

        let lines = executor.lines();
        let copy_pos = lines.iter().position(|l| l.contains("cp :boot.py"));
        let rm_pos = lines.iter().position(|l| l.contains(" rm "));
        assert!(copy_pos.expect("copied") < rm_pos.expect("cleared"));

        // Everything including the boot file is archived locally...
        assert_eq!(report.files_copied, 3);
        // ...but the boot file survives the wipe.
        assert!(!lines.iter().any(|l| l.contains("rm boot.py")));
        let cleared = report.cleared.expect("clear ran");
        assert_eq!(cleared.files_removed, 2);
    }

    #[tokio::test]
    async fn test_to_device_issuance_ordering_still_orders_mkdir_first() {
        let workspace = TempDir::new().expect("create temp dir");
        stage_files(&workspace);
        let executor = Arc::new(RecordingExecutor::issuance_ordered(LISTING));
        let engine = engine_with(executor.clone(), &workspace);

        let prompter = FixedPrompter {
            filter: Some("py".to_string()),
            direction: Some(SyncDirection::ToDevice),
        };
        engine
            .sync(&selected_session(), &prompter)
            .await
            .expect("sync");

        let lines = executor.lines();
        let mkdir_pos = lines.iter().position(|l| l.ends_with("mkdir lib"));
        let copy_pos = lines.iter().position(|l| l.contains(":lib/util.py"));
        assert!(mkdir_pos.expect("mkdir issued") < copy_pos.expect("copy issued"));
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(SyncDirection::FromDevice.to_string(), "from device to local");
        assert_eq!(SyncDirection::ToDevice.to_string(), "from local to device");
    }

    #[test]
    fn test_report_serialization() {
        let report = SyncReport::cancelled(TransferFilter::new("py"));
        let json = serde_json::to_string(&report).expect("serialize");
        let deserialized: SyncReport = serde_json::from_str(&json).expect("deserialize");
        assert!(deserialized.was_cancelled);
        assert_eq!(deserialized.filter, TransferFilter::new("py"));
    }

    #[test]
    fn test_report_summary() {
        let mut report = SyncReport::new(TransferFilter::all());
        report.entries_listed = 5;
        report.files_copied = 4;
        report.failed = 1;
        let summary = report.summary();
        assert!(summary.contains("4 of 5"));
        assert!(summary.contains("1 failed"));
    }
}
