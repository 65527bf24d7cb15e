//! `nexus daemon` — daemon lifecycle, launchd management, and log access.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use nexus_daemon::paths;
use nexus_daemon::{
    install_launchd, request_status, request_stop, start_blocking, uninstall_launchd, DaemonError,
};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (trigger + drift watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Install and bootstrap the launchd agent.
    Install,
    /// Boot out and remove the launchd agent.
    Uninstall,
    /// Tail the daemon log files.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// How many trailing lines to print.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,

    /// Show only the auto-sync failure log.
    #[arg(long, conflicts_with = "stderr_only")]
    pub auto_sync: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start => start_blocking(&home).context("daemon exited with error"),
        DaemonCommand::Stop => stop(&home),
        DaemonCommand::Status => status(&home),
        DaemonCommand::Install => {
            let plist = install_launchd(&home).context("failed to install launchd service")?;
            println!("installed launchd service: {}", plist.display());
            Ok(())
        }
        DaemonCommand::Uninstall => {
            uninstall_launchd(&home).context("failed to remove launchd service")?;
            println!("removed launchd service");
            Ok(())
        }
        DaemonCommand::Logs(args) => logs(&home, &args),
    }
}

fn stop(home: &Path) -> Result<()> {
    match request_stop(home) {
        Ok(()) => println!("daemon stop requested"),
        Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
        Err(err) => return Err(err).context("failed to stop daemon"),
    }
    Ok(())
}

/// Prints JSON whether or not a daemon is running, so callers can poll it.
fn status(home: &Path) -> Result<()> {
    let payload = match request_status(home) {
        Ok(status) => status,
        Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
            "running": false,
            "socket": paths::socket_path(home).display().to_string(),
        }),
        Err(err) => return Err(err).context("failed to query daemon status"),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to render daemon status JSON")?
    );
    Ok(())
}

fn logs(home: &Path, args: &DaemonLogsArgs) -> Result<()> {
    let files: Vec<PathBuf> = if args.auto_sync {
        vec![paths::auto_sync_log_path(home)]
    } else if args.stderr_only {
        vec![paths::stderr_log_path(home)]
    } else {
        vec![paths::stdout_log_path(home), paths::stderr_log_path(home)]
    };

    for path in files {
        if !path.exists() {
            println!("log file not found: {}", path.display());
            continue;
        }
        println!("==> {} <==", path.display());
        for line in tail_lines(&path, args.lines)? {
            println!("{line}");
        }
    }
    Ok(())
}

/// Last `keep` lines of the file at `path`.
fn tail_lines(path: &Path, keep: usize) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::with_capacity(keep.min(1024));
    for line in BufReader::new(file).lines() {
        tail.push_back(line.with_context(|| format!("read {}", path.display()))?);
        if tail.len() > keep {
            tail.pop_front();
        }
    }
    Ok(tail.into_iter().collect())
}
