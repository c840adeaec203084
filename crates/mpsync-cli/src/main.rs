//! Command-line shell for Mpsync.
//!
//! Owns the per-invocation [`DeviceSession`], wires console prompts into
//! the engines and picks the transport strategy. All engine logic lives in
//! `mpsync-core`; this binary is orchestration only.

mod logging;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;

use mpsync_core::clear::{ClearEngine, ClearOptions};
use mpsync_core::device::{DeviceController, DeviceRegistry, DeviceSession};
use mpsync_core::listing::RemoteLister;
use mpsync_core::staging::StagingArea;
use mpsync_core::sync::{SyncDirection, SyncEngine};
use mpsync_core::transport::{CommandExecutor, SubprocessExecutor, TerminalExecutor};
use mpsync_core::Result;

use crate::prompts::ConsolePrompter;

/// Manage files on a MicroPython board over the mpremote CLI.
#[derive(Debug, Parser)]
#[command(name = "mpsync", version, about)]
struct Cli {
    /// Serial port of the target device (e.g. COM3, /dev/ttyACM0).
    #[arg(long, global = true, value_name = "PORT")]
    device: Option<String>,

    /// Let the tool address the single attached device itself.
    #[arg(long, global = true)]
    auto: bool,

    /// Workspace root holding the staging folder. Defaults to the current
    /// directory.
    #[arg(long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Dispatch commands fire-and-forget into a persistent shell instead of
    /// capturing each invocation.
    #[arg(long, global = true)]
    terminal: bool,

    /// Disable the rotated JSON file log.
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Command,
}

/// Sync direction flag.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum DirectionArg {
    /// Copy device files into the staging folder.
    From,
    /// Copy staged files onto the device.
    To,
}

impl From<DirectionArg> for SyncDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::From => Self::FromDevice,
            DirectionArg::To => Self::ToDevice,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List available serial connections.
    Devices,
    /// List files on the device.
    Ls,
    /// Run a sync session between the device and the staging folder.
    Sync {
        /// Extension filter; omit to be prompted, empty for all files.
        #[arg(long, value_name = "EXT")]
        ext: Option<String>,
        /// Direction; omit to be prompted.
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
    },
    /// Delete everything on the device except protected files.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
        /// Leave listed directories in place instead of pruning them.
        #[arg(long)]
        keep_directories: bool,
    },
    /// Copy everything off the device, then clear it.
    SyncClear,
    /// Run a local script on the device.
    Run {
        /// Script to execute.
        file: PathBuf,
    },
    /// Copy a local file into the device root.
    Save {
        /// File to copy.
        file: PathBuf,
    },
    /// Mount a local directory on the device.
    Mount {
        /// Directory to mount.
        #[arg(default_value = "remote")]
        dir: PathBuf,
    },
    /// Soft-reset the device interpreter.
    SoftReset,
    /// Hard-reset the device.
    Reset,
}

fn build_executor(cli: &Cli) -> Result<Arc<dyn CommandExecutor>> {
    if cli.terminal {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "sh".to_string());
        Ok(Arc::new(TerminalExecutor::spawn_shell(&shell)?))
    } else {
        Ok(Arc::new(SubprocessExecutor::new()))
    }
}

fn build_session(cli: &Cli) -> DeviceSession {
    let mut session = DeviceSession::new();
    if let Some(port) = &cli.device {
        session.select(port.clone());
    }
    if cli.auto {
        session.toggle_auto_device();
    }
    session
}

async fn run(cli: &Cli) -> Result<()> {
    let executor = build_executor(cli)?;
    let session = build_session(cli);
    let workspace = match &cli.workspace {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let staging = StagingArea::in_workspace(&workspace);

    match &cli.command {
        Command::Devices => {
            let registry = DeviceRegistry::new(executor);
            let devices = registry.list_devices().await?;
            if devices.is_empty() {
                println!("No devices found.");
            }
            for device in devices {
                println!("{device}");
            }
        }
        Command::Ls => {
            let lister = RemoteLister::new(executor);
            for entry in lister.list(&session.target()?).await? {
                println!("{entry}");
            }
        }
        Command::Sync { ext, direction } => {
            let mut prompter = ConsolePrompter::new();
            if let Some(ext) = ext {
                prompter = prompter.with_filter(ext.clone());
            }
            if let Some(direction) = direction {
                prompter = prompter.with_direction((*direction).into());
            }
            let engine = SyncEngine::new(executor, staging);
            let report = engine.sync(&session, &prompter).await?;
            println!("{}", report.summary());
        }
        Command::Clear { yes, keep_directories } => {
            let prompter = ConsolePrompter::new().with_assume_yes(*yes);
            let options = ClearOptions::default().with_prune_directories(!*keep_directories);
            let engine = ClearEngine::new(executor);
            let report = engine.clear(&session, &prompter, &options).await?;
            println!("{}", report.summary());
        }
        Command::SyncClear => {
            let engine = SyncEngine::new(executor, staging);
            let report = engine.sync_and_clear(&session).await?;
            println!("{}", report.summary());
            if let Some(cleared) = &report.cleared {
                println!("{}", cleared.summary());
            }
        }
        Command::Run { file } => {
            DeviceController::new(executor).run_file(&session, file).await?;
        }
        Command::Save { file } => {
            DeviceController::new(executor).save_file(&session, file).await?;
        }
        Command::Mount { dir } => {
            DeviceController::new(executor).mount(&session, dir).await?;
        }
        Command::SoftReset => {
            DeviceController::new(executor).soft_reset(&session).await?;
        }
        Command::Reset => {
            DeviceController::new(executor).reset(&session).await?;
        }
    }

    Ok(())
}

/// Print the discovered devices after a "no device" failure, standing in
/// for the editor's focus redirect to the device list.
async fn show_device_hint(cli: &Cli) {
    let Ok(executor) = build_executor(cli) else {
        return;
    };
    let registry = DeviceRegistry::new(executor);
    if let Ok(devices) = registry.list_devices().await {
        if devices.is_empty() {
            eprintln!("No devices found. Connect a board and try `mpsync devices`.");
        } else {
            eprintln!("Available devices:");
            for device in devices {
                eprintln!("  {device}");
            }
            eprintln!("Select one with `--device <PORT>`.");
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging_config = logging::LoggingConfig {
        file_log: !cli.no_file_log,
        ..logging::LoggingConfig::default()
    };
    let _logging_guard = match logging::init(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging setup failed: {e}");
            None
        }
    };

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            if e.is_no_device() {
                show_device_hint(&cli).await;
            }
            ExitCode::FAILURE
        }
    }
}
