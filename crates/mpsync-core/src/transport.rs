//! Device transport boundary: constructing and dispatching board-tool
//! commands.
//!
//! All device access goes through the external `mpremote` CLI. Commands are
//! built as `mpremote connect <id> <subcommand> <args>` and dispatched
//! through the [`CommandExecutor`] capability, which has two
//! implementations with different ordering guarantees:
//!
//! - [`SubprocessExecutor`] spawns the tool, captures its output and
//!   resolves when the process exits. Completion-ordered: a command is done
//!   before the next one starts.
//! - [`TerminalExecutor`] injects the command line into a persistent
//!   interactive terminal and returns immediately. Issuance-ordered only:
//!   sequential sends are queued in order by the terminal, but nothing here
//!   waits for, or even learns about, completion.
//!
//! Engines depend on the capability, not the mechanism, and consult
//! [`CommandExecutor::ordering`] when a step's correctness depends on a
//! prior command having finished.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::listing::decode_listing;

/// The board management tool invoked for every device operation.
pub const TOOL_PROGRAM: &str = "mpremote";

/// How a target device is addressed when a command is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    /// Let the tool pick the single unambiguous device; no `connect` clause
    /// is injected. Takes precedence over an explicit selection.
    Auto,
    /// Address the named serial port via `connect <port>`.
    Port(String),
}

/// A single board-tool command, prior to device targeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    args: Vec<String>,
    /// Commands like `connect list` address the tool itself, never a device.
    standalone: bool,
}

impl DeviceCommand {
    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            standalone: false,
        }
    }

    /// List files on the device.
    #[must_use]
    pub fn ls() -> Self {
        Self::new(["ls"])
    }

    /// Copy a device file into a local destination.
    #[must_use]
    pub fn copy_from(remote_path: &str, local_dest: &Path) -> Self {
        Self::new([
            "cp".to_string(),
            format!(":{remote_path}"),
            local_dest.to_string_lossy().into_owned(),
        ])
    }

    /// Copy a local file to a device path. Pass `"."` to drop the file into
    /// the device root under its own name.
    #[must_use]
    pub fn copy_to(local_path: &Path, remote_dest: &str) -> Self {
        Self::new([
            "cp".to_string(),
            local_path.to_string_lossy().into_owned(),
            format!(":{remote_dest}"),
        ])
    }

    /// Recursively copy a local directory tree into the device root.
    ///
    /// The trailing separator makes the tool copy the directory's contents
    /// rather than the directory itself.
    #[must_use]
    pub fn copy_tree_to_root(local_dir: &Path) -> Self {
        Self::new([
            "cp".to_string(),
            "-r".to_string(),
            format!("{}/", local_dir.to_string_lossy().trim_end_matches('/')),
            ":".to_string(),
        ])
    }

    /// Remove a device file.
    #[must_use]
    pub fn remove(remote_path: &str) -> Self {
        Self::new(["rm", remote_path])
    }

    /// Remove an (empty) device directory.
    #[must_use]
    pub fn remove_dir(remote_path: &str) -> Self {
        Self::new(["rmdir", remote_path])
    }

    /// Create a device directory. Intermediate directories are not created
    /// implicitly, so callers issue one command per mirror-plan step.
    #[must_use]
    pub fn make_dir(remote_path: &str) -> Self {
        Self::new(["mkdir", remote_path])
    }

    /// Run a local script on the device.
    #[must_use]
    pub fn run(local_path: &Path) -> Self {
        Self::new(["run".to_string(), local_path.to_string_lossy().into_owned()])
    }

    /// Soft-reset the device interpreter.
    #[must_use]
    pub fn soft_reset() -> Self {
        Self::new(["soft-reset"])
    }

    /// Hard-reset the device.
    #[must_use]
    pub fn reset() -> Self {
        Self::new(["reset"])
    }

    /// Mount a local directory on the device.
    #[must_use]
    pub fn mount(local_dir: &Path) -> Self {
        Self::new(["mount".to_string(), local_dir.to_string_lossy().into_owned()])
    }

    /// List available serial connections.
    #[must_use]
    pub fn connect_list() -> Self {
        Self {
            args: vec!["connect".to_string(), "list".to_string()],
            standalone: true,
        }
    }

    /// Arguments passed to the tool for the given target.
    #[must_use]
    pub fn render(&self, target: &CommandTarget) -> Vec<String> {
        match target {
            CommandTarget::Port(port) if !self.standalone => {
                let mut rendered = Vec::with_capacity(self.args.len() + 2);
                rendered.push("connect".to_string());
                rendered.push(port.clone());
                rendered.extend(self.args.iter().cloned());
                rendered
            }
            _ => self.args.clone(),
        }
    }

    /// Full command line for terminal injection, arguments with whitespace
    /// quoted.
    #[must_use]
    pub fn command_line(&self, target: &CommandTarget) -> String {
        let mut line = String::from(TOOL_PROGRAM);
        for arg in self.render(target) {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(&arg);
                line.push('"');
            } else {
                line.push_str(&arg);
            }
        }
        line
    }
}

/// Result of dispatching one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the tool reported success. Fire-and-forget dispatch always
    /// reports success since no completion signal exists.
    pub success: bool,
    /// Captured standard output; empty for fire-and-forget dispatch and for
    /// swallowed failures.
    pub stdout: String,
}

impl CommandOutput {
    /// An empty output with the given success flag.
    #[must_use]
    pub const fn empty(success: bool) -> Self {
        Self {
            success,
            stdout: String::new(),
        }
    }
}

/// Ordering guarantee an executor provides between consecutive commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingGuarantee {
    /// Each command completes before the next begins.
    Completion,
    /// Commands are issued in order but may complete in any order, or not
    /// at all as far as the caller can observe.
    Issuance,
}

/// Abstract capability for dispatching board-tool commands.
///
/// Engines hold a `dyn CommandExecutor` and never assume which mechanism
/// backs it; where correctness depends on a prior command's completion they
/// check [`ordering`](Self::ordering) and degrade explicitly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Dispatch one command at the given target.
    async fn run(&self, command: &DeviceCommand, target: &CommandTarget) -> Result<CommandOutput>;

    /// The ordering guarantee this executor provides.
    fn ordering(&self) -> OrderingGuarantee;
}

/// Captured-subprocess executor: spawns the tool per command and awaits its
/// exit.
///
/// A non-zero exit is swallowed into an unsuccessful, empty output rather
/// than an error: listing call sites treat it as "nothing listed" and
/// continue, matching the tool's habit of failing noisily on transient
/// serial hiccups. Call sites that need the distinction check
/// [`CommandOutput::success`].
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    program: String,
}

impl Default for SubprocessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SubprocessExecutor {
    /// Executor invoking the standard tool program.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: TOOL_PROGRAM.to_string(),
        }
    }

    /// Executor invoking a specific program (tests, vendored tool builds).
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CommandExecutor for SubprocessExecutor {
    async fn run(&self, command: &DeviceCommand, target: &CommandTarget) -> Result<CommandOutput> {
        let args = command.render(target);
        debug!("Running {} {:?}", self.program, args);

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TransportError::SpawnFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(CommandOutput {
                success: true,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            })
        } else {
            warn!(
                "`{}` exited with {}: {}",
                command.command_line(target),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            Ok(CommandOutput::empty(false))
        }
    }

    fn ordering(&self) -> OrderingGuarantee {
        OrderingGuarantee::Completion
    }
}

/// Fire-and-forget executor injecting command lines into a persistent
/// terminal.
///
/// `run` returns as soon as the line is queued. Completion is never
/// observed, so steps that must finish before a follow-up command (directory
/// creation before a copy into it) are only issuance-ordered here.
#[derive(Debug, Clone)]
pub struct TerminalExecutor {
    tx: mpsc::UnboundedSender<String>,
}

impl TerminalExecutor {
    /// Executor writing into a channel the hosting terminal drains.
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Executor plus the receiving end, for hosts that own the terminal.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Spawn a persistent shell and forward every injected line to its
    /// standard input.
    pub fn spawn_shell(shell_program: &str) -> Result<Self> {
        let mut child = tokio::process::Command::new(shell_program)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::SpawnFailed {
                program: shell_program.to_string(),
                reason: e.to_string(),
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| TransportError::SpawnFailed {
            program: shell_program.to_string(),
            reason: "stdin not piped".to_string(),
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    warn!("Terminal shell went away; dropping queued commands");
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
            }
            drop(child.kill().await);
        });

        Ok(Self::new(tx))
    }
}

#[async_trait]
impl CommandExecutor for TerminalExecutor {
    async fn run(&self, command: &DeviceCommand, target: &CommandTarget) -> Result<CommandOutput> {
        let line = command.command_line(target);
        debug!("Injecting into terminal: {}", line);
        self.tx
            .send(line.clone())
            .map_err(|_| TransportError::TerminalClosed { command: line })?;
        Ok(CommandOutput::empty(true))
    }

    fn ordering(&self) -> OrderingGuarantee {
        OrderingGuarantee::Issuance
    }
}

// =============================================================================
// Log-file polling
// =============================================================================

/// Default interval between readiness polls.
pub const DEFAULT_LOG_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound on the total wait for a listing log.
pub const DEFAULT_LOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Poller for listing output redirected into a log file.
///
/// Used when the tool must run inside an interactive shell rather than be
/// captured directly: the shell redirects its listing to a temp file, and
/// this poller waits for the file to exist and become non-empty before
/// decoding it. Waiting for non-empty rather than merely existent avoids
/// reading a just-created empty file, though a partially written first block
/// can still slip through; that race is a known limitation of the log-file
/// strategy. The file is deleted after consumption so repeated calls never
/// see stale data.
#[derive(Debug, Clone)]
pub struct LogFilePoller {
    path: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl LogFilePoller {
    /// Poller for the given log file with default interval and timeout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_LOG_POLL_INTERVAL,
            timeout: DEFAULT_LOG_TIMEOUT,
        }
    }

    /// Override the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the total wait bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The polled path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Conventional log location under the system temp directory.
    #[must_use]
    pub fn default_log_path() -> PathBuf {
        std::env::temp_dir().join("mpsync").join("listing.log")
    }

    /// Wait until the log is fully written, decode and consume it.
    ///
    /// The byte content's charset is sniffed before decoding since the
    /// shell's output encoding varies with the platform locale.
    pub async fn wait_and_read(&self) -> Result<String> {
        let started = Instant::now();
        let deadline = started + self.timeout;

        loop {
            match tokio::fs::read(&self.path).await {
                Ok(bytes) if !bytes.is_empty() => {
                    if let Err(e) = tokio::fs::remove_file(&self.path).await {
                        warn!("Could not remove consumed log {}: {}", self.path.display(), e);
                    }
                    return Ok(decode_listing(&bytes));
                }
                // Not there yet, or created but still empty. Keep polling.
                Ok(_) | Err(_) => {}
            }

            if Instant::now() >= deadline {
                return Err(TransportError::LogTimeout {
                    path: self.path.clone(),
                    waited_ms: started.elapsed().as_millis() as u64,
                }
                .into());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    fn port() -> CommandTarget {
        CommandTarget::Port("COM3".to_string())
    }

    #[test]
    fn test_render_injects_connect_clause() {
        let rendered = DeviceCommand::ls().render(&port());
        assert_eq!(rendered, vec!["connect", "COM3", "ls"]);
    }

    #[test]
    fn test_render_auto_omits_connect_clause() {
        let rendered = DeviceCommand::ls().render(&CommandTarget::Auto);
        assert_eq!(rendered, vec!["ls"]);
    }

    #[test]
    fn test_render_connect_list_is_standalone() {
        let rendered = DeviceCommand::connect_list().render(&port());
        assert_eq!(rendered, vec!["connect", "list"]);
    }

    #[test]
    fn test_copy_from_prefixes_remote_path() {
        let cmd = DeviceCommand::copy_from("lib/util.py", Path::new("mprem_files/lib/util.py"));
        let rendered = cmd.render(&CommandTarget::Auto);
        assert_eq!(rendered[0], "cp");
        assert_eq!(rendered[1], ":lib/util.py");
        assert_eq!(rendered[2], "mprem_files/lib/util.py");
    }

    #[test]
    fn test_copy_to_device_root() {
        let cmd = DeviceCommand::copy_to(Path::new("main.py"), ".");
        let rendered = cmd.render(&CommandTarget::Auto);
        assert_eq!(rendered, vec!["cp", "main.py", ":."]);
    }

    #[test]
    fn test_copy_tree_to_root() {
        let cmd = DeviceCommand::copy_tree_to_root(Path::new("mprem_files"));
        let rendered = cmd.render(&CommandTarget::Auto);
        assert_eq!(rendered, vec!["cp", "-r", "mprem_files/", ":"]);
    }

    #[test]
    fn test_command_line_quotes_whitespace() {
        let cmd = DeviceCommand::run(Path::new("/ws/my sketch.py"));
        let line = cmd.command_line(&port());
        assert_eq!(line, "mpremote connect COM3 run \"/ws/my sketch.py\"");
    }

    #[test]
    fn test_command_line_plain() {
        let line = DeviceCommand::soft_reset().command_line(&CommandTarget::Auto);
        assert_eq!(line, "mpremote soft-reset");
    }

    #[tokio::test]
    async fn test_subprocess_executor_captures_stdout() {
        let executor = SubprocessExecutor::with_program("echo");
        let out = executor
            .run(&DeviceCommand::ls(), &CommandTarget::Auto)
            .await
            .expect("echo should run");
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "ls");
    }

    #[tokio::test]
    async fn test_subprocess_executor_swallows_failure() {
        let executor = SubprocessExecutor::with_program("false");
        let out = executor
            .run(&DeviceCommand::ls(), &CommandTarget::Auto)
            .await
            .expect("failure is swallowed, not raised");
        assert!(!out.success);
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_subprocess_executor_spawn_failure() {
        let executor = SubprocessExecutor::with_program("/nonexistent/tool-binary");
        let err = executor
            .run(&DeviceCommand::ls(), &CommandTarget::Auto)
            .await
            .expect_err("spawn should fail");
        assert!(matches!(
            err,
            Error::Transport(TransportError::SpawnFailed { .. })
        ));
    }

    #[test]
    fn test_subprocess_executor_is_completion_ordered() {
        assert_eq!(
            SubprocessExecutor::new().ordering(),
            OrderingGuarantee::Completion
        );
    }

    #[tokio::test]
    async fn test_terminal_executor_queues_line_and_returns() {
        let (executor, mut rx) = TerminalExecutor::channel();
        let out = executor
            .run(&DeviceCommand::remove("old.py"), &port())
            .await
            .expect("send should succeed");
        assert!(out.success);
        assert!(out.stdout.is_empty());
        assert_eq!(
            rx.recv().await.as_deref(),
            Some("mpremote connect COM3 rm old.py")
        );
    }

    #[tokio::test]
    async fn test_terminal_executor_preserves_issue_order() {
        let (executor, mut rx) = TerminalExecutor::channel();
        executor
            .run(&DeviceCommand::make_dir("lib"), &port())
            .await
            .expect("send");
        executor
            .run(&DeviceCommand::make_dir("lib/net"), &port())
            .await
            .expect("send");
        assert!(rx.recv().await.is_some_and(|l| l.ends_with("mkdir lib")));
        assert!(rx.recv().await.is_some_and(|l| l.ends_with("mkdir lib/net")));
    }

    #[tokio::test]
    async fn test_terminal_executor_closed_channel() {
        let (executor, rx) = TerminalExecutor::channel();
        drop(rx);
        let err = executor
            .run(&DeviceCommand::ls(), &port())
            .await
            .expect_err("closed channel should error");
        assert!(matches!(
            err,
            Error::Transport(TransportError::TerminalClosed { .. })
        ));
    }

    #[test]
    fn test_terminal_executor_is_issuance_ordered() {
        let (executor, _rx) = TerminalExecutor::channel();
        assert_eq!(executor.ordering(), OrderingGuarantee::Issuance);
    }

    #[tokio::test]
    async fn test_log_poller_reads_once_nonempty() {
        let dir = TempDir::new().expect("create temp dir");
        let log = dir.path().join("listing.log");
        let poller = LogFilePoller::new(&log).with_poll_interval(Duration::from_millis(5));

        let writer_path = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tokio::fs::write(&writer_path, "ls :\n          10 boot.py\n")
                .await
                .expect("write log");
        });

        let text = poller.wait_and_read().await.expect("log should arrive");
        assert!(text.contains("boot.py"));
    }

    #[tokio::test]
    async fn test_log_poller_deletes_consumed_file() {
        let dir = TempDir::new().expect("create temp dir");
        let log = dir.path().join("listing.log");
        std::fs::write(&log, "content").expect("write log");

        let poller = LogFilePoller::new(&log);
        poller.wait_and_read().await.expect("read");
        assert!(!log.exists());
    }

    #[tokio::test]
    async fn test_log_poller_waits_past_empty_file() {
        let dir = TempDir::new().expect("create temp dir");
        let log = dir.path().join("listing.log");
        std::fs::write(&log, "").expect("create empty log");

        let poller = LogFilePoller::new(&log).with_poll_interval(Duration::from_millis(5));
        let writer_path = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tokio::fs::write(&writer_path, "filled").await.expect("fill log");
        });

        let text = poller.wait_and_read().await.expect("should wait for content");
        assert_eq!(text, "filled");
    }

    #[tokio::test]
    async fn test_log_poller_times_out() {
        let dir = TempDir::new().expect("create temp dir");
        let poller = LogFilePoller::new(dir.path().join("never.log"))
            .with_poll_interval(Duration::from_millis(5))
            .with_timeout(Duration::from_millis(40));

        let err = poller.wait_and_read().await.expect_err("should time out");
        assert!(matches!(
            err,
            Error::Transport(TransportError::LogTimeout { .. })
        ));
    }

    #[test]
    fn test_default_log_path_under_temp() {
        let path = LogFilePoller::default_log_path();
        assert!(path.ends_with(Path::new("mpsync/listing.log")));
    }
}
