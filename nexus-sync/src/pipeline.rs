//! Shared propagation entrypoint used by the CLI and the daemon.

use std::path::Path;

use nexus_core::registry;
use nexus_core::types::TargetId;

use crate::executor::{self, SyncSummary};
use crate::SyncError;

/// Scope for a propagation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    /// Every target with sync enabled.
    All,
    /// One explicitly named target, even if it is disabled for automatic
    /// passes.
    Target(TargetId),
}

/// Run one propagation pass.
///
/// Loads the registry once and syncs from that snapshot; mutations landing
/// mid-pass are picked up by the next pass, not this one. Outcomes are folded
/// back into the registry afterwards unless `dry_run` is set. This is the
/// canonical entrypoint for `nexus sync` and the daemon's automatic passes —
/// callers serialize passes through the daemon's propagation gate.
pub fn run_at(home: &Path, scope: SyncScope, dry_run: bool) -> Result<SyncSummary, SyncError> {
    let registry = registry::load_at(home)?;

    let summary = match scope {
        SyncScope::All => executor::sync_all_at(home, &registry, dry_run),
        SyncScope::Target(target) => executor::classify(vec![executor::sync_target_at(
            home, &registry, target, dry_run,
        )]),
    };

    if !dry_run {
        executor::record_outcomes_at(home, &summary.outcomes)?;
    }

    tracing::info!(
        "pass complete: {} ok, {} failed, {} manual of {}",
        summary.successful,
        summary.failed,
        summary.manual_required,
        summary.total_targets
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
