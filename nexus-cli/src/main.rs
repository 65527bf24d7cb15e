//! Nexus — keep MCP servers in sync across AI clients.
//!
//! # Usage
//!
//! ```text
//! nexus init
//! nexus server list
//! nexus server add <name> --npm <pkg> [--target cursor ...]
//! nexus server remove <id>
//! nexus server enable|disable <id> [--target <target> ...]
//! nexus server import <target> [--overwrite]
//! nexus target enable|disable <target>
//! nexus sync [TARGET] [--all] [--dry-run] [--diff]
//! nexus status [--target <target>] [--json]
//! nexus manual <target>
//! nexus daemon start|stop|status|install|uninstall|logs
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, manual::ManualArgs, server::ServerCommand, status::StatusArgs,
    sync::SyncArgs, target::TargetCommand,
};
use nexus_core::types::TargetId;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "nexus",
    version,
    about = "Manage MCP server configs across Claude, Cursor, VS Code and friends",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the Nexus registry (idempotent).
    Init,

    /// Manage MCP server definitions in the registry.
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },

    /// Turn automatic propagation on or off for a target.
    Target {
        #[command(subcommand)]
        command: TargetCommand,
    },

    /// Propagate registry servers into client configs.
    Sync(SyncArgs),

    /// Show detection and sync state for every target.
    Status(StatusArgs),

    /// Print the paste-in config payload for a target.
    Manual(ManualArgs),

    /// Manage the Nexus background daemon and launchd integration.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared target argument — parsed from CLI strings, converts to core type
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `TargetId` from CLI args.
#[derive(Debug, Clone)]
pub struct TargetArg(pub TargetId);

impl FromStr for TargetArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TargetId::from_str(s).map(Self).map_err(|e| e.to_string())
    }
}

impl fmt::Display for TargetArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<TargetArg> for TargetId {
    fn from(t: TargetArg) -> Self {
        t.0
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Server { command } => commands::server::run(command),
        Commands::Target { command } => commands::target::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Manual(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
