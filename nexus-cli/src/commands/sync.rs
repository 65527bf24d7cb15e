//! `nexus sync` — propagate registry servers into client configs.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Args;

use nexus_core::{registry, types::TargetId};
use nexus_daemon::{daemon_running, request_sync, PassSummary};
use nexus_sync::{
    diff_all_at, diff_target_at,
    pipeline::{self, SyncScope},
    SyncOutcome, TargetDiff,
};

use super::super::TargetArg;

/// Arguments for `nexus sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Target to sync (omit to sync all enabled targets).
    pub target: Option<TargetArg>,

    /// Sync every enabled target (the default when no target is given).
    #[arg(long, conflicts_with = "target")]
    pub all: bool,

    /// Compute outcomes without writing configs or recording state.
    #[arg(long)]
    pub dry_run: bool,

    /// Show unified diffs of what a sync would change, instead of syncing.
    #[arg(long)]
    pub diff: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let target = if self.all {
            None
        } else {
            self.target.as_ref().map(|t| t.0)
        };

        if self.diff {
            return print_diffs(&home, target);
        }

        // A running daemon owns the propagation gate; routing through it keeps
        // an explicit sync from interleaving with an automatic pass.
        if !self.dry_run && daemon_running(&home) {
            let value = request_sync(&home, target.map(|t| t.to_string()))
                .context("sync via daemon failed")?;
            let pass: PassSummary = serde_json::from_value(value)
                .context("daemon returned an unexpected sync payload")?;
            print_pass(
                pass.successful,
                pass.failed,
                pass.manual_required,
                pass.total_targets,
                &pass.outcomes,
                false,
                true,
            );
            return finish(pass.failed);
        }

        let scope = match target {
            Some(t) => SyncScope::Target(t),
            None => SyncScope::All,
        };
        let summary = pipeline::run_at(&home, scope, self.dry_run).context("sync failed")?;
        print_pass(
            summary.successful,
            summary.failed,
            summary.manual_required,
            summary.total_targets,
            &summary.outcomes,
            self.dry_run,
            false,
        );
        finish(summary.failed)
    }
}

fn finish(failed: usize) -> Result<()> {
    if failed > 0 {
        return Err(anyhow!("{failed} target(s) failed to sync"));
    }
    Ok(())
}

fn print_pass(
    successful: usize,
    failed: usize,
    manual: usize,
    total: usize,
    outcomes: &[SyncOutcome],
    dry_run: bool,
    via_daemon: bool,
) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let via = if via_daemon { " (via daemon)" } else { "" };

    println!("{prefix}Synced {successful} of {total} target(s){via} — {failed} failed, {manual} manual");
    for outcome in outcomes {
        if outcome.manual_config.is_some() {
            println!(
                "  · {} — manual-only; run `nexus manual {}`",
                outcome.target, outcome.target
            );
        } else if outcome.success {
            println!(
                "  ✓ {} — {} server(s)",
                outcome.target, outcome.servers_synced
            );
        } else {
            let error = outcome.error.as_deref().unwrap_or("unknown error");
            println!("  ✗ {} — {error}", outcome.target);
        }
    }
}

fn print_diffs(home: &Path, target: Option<TargetId>) -> Result<()> {
    let registry_doc =
        registry::load_at(home).context("failed to load registry — run `nexus init` first")?;

    let diffs: Vec<TargetDiff> = match target {
        Some(t) => diff_target_at(home, &registry_doc, t)
            .with_context(|| format!("diff failed for {t}"))?
            .into_iter()
            .collect(),
        None => diff_all_at(home, &registry_doc).context("diff failed")?,
    };

    if diffs.is_empty() {
        println!("Client configs already match the registry.");
        return Ok(());
    }

    for diff in diffs {
        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}
