//! `nexus target enable|disable` — per-target propagation switch.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use nexus_core::{registry, types::SyncMode};

use super::super::TargetArg;
use super::notify_daemon;

#[derive(Subcommand, Debug)]
pub enum TargetCommand {
    /// Include the target in automatic propagation passes.
    Enable(TargetToggleArgs),

    /// Exclude the target from automatic propagation passes.
    Disable(TargetToggleArgs),
}

#[derive(Args, Debug)]
pub struct TargetToggleArgs {
    /// Target to switch (e.g. cursor, vscode).
    pub target: TargetArg,
}

pub fn run(cmd: TargetCommand) -> Result<()> {
    match cmd {
        TargetCommand::Enable(args) => toggle(args, true),
        TargetCommand::Disable(args) => toggle(args, false),
    }
}

fn toggle(args: TargetToggleArgs, enabled: bool) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let target = args.target.0;

    registry::set_target_enabled_at(&home, target, enabled)
        .with_context(|| format!("failed to update sync settings for {target}"))?;
    notify_daemon(&home);

    let verb = if enabled { "enabled" } else { "disabled" };
    println!("✓ Sync {verb} for {}", target.display_name());
    if target.sync_mode() == SyncMode::ManualOnly {
        println!("  Note: {target} is manual-only; use `nexus manual {target}` to get its config.");
    }
    Ok(())
}
