//! Merged per-target status view.
//!
//! Detection says what is on the machine; the registry says what we last did
//! to it. [`merge`] combines the two into one record per target, with drift
//! derived from checksums at merge time. Signal precedence for display:
//!
//! 1. `Manual` — the target is manual-only; propagation never writes it.
//! 2. `Disabled` — the user opted this target out of automatic passes.
//! 3. `Drifted` — the config changed outside a pass since the last sync.
//! 4. `Failed` — the most recent attempt recorded an error.
//! 5. `NeverSynced` — no successful pass yet.
//! 6. `Synced` — in sync as of `last_sync`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nexus_core::types::{Registry, SyncMode, TargetId, TargetSettings};
use nexus_detector::DetectedTarget;

use crate::drift;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Display signal for one target, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncSignal {
    Manual,
    Disabled,
    Drifted,
    Failed,
    NeverSynced,
    Synced,
}

/// One target's detection result and sync state, merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub target: TargetId,
    pub installed: bool,
    pub config_path: PathBuf,
    pub config_exists: bool,
    pub server_count: usize,
    /// Whether automatic passes include this target.
    pub sync_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Derived at merge time from the checksum record — never persisted.
    pub externally_modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_error: Option<String>,
}

impl TargetStatus {
    /// Highest-precedence signal for this record.
    pub fn signal(&self) -> SyncSignal {
        if self.target.sync_mode() == SyncMode::ManualOnly {
            return SyncSignal::Manual;
        }
        if !self.sync_enabled {
            return SyncSignal::Disabled;
        }
        if self.externally_modified {
            return SyncSignal::Drifted;
        }
        if self.last_error.is_some() {
            return SyncSignal::Failed;
        }
        if self.last_sync.is_none() {
            return SyncSignal::NeverSynced;
        }
        SyncSignal::Synced
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge one detection record with its sync settings. Pure and deterministic
/// — the caller supplies the current config checksum so no I/O happens here.
pub fn merge(
    detected: &DetectedTarget,
    settings: &TargetSettings,
    current_checksum: Option<&str>,
) -> TargetStatus {
    TargetStatus {
        target: detected.target,
        installed: detected.installed,
        config_path: detected.config_path.clone(),
        config_exists: detected.config_exists,
        server_count: detected.server_count,
        sync_enabled: settings.enabled,
        last_sync: settings.last_sync,
        last_error: settings.last_error.clone(),
        externally_modified: drift::is_drifted(
            current_checksum,
            settings.last_sync_checksum.as_deref(),
        ),
        detection_error: detected.error.clone(),
    }
}

/// Merged view over a full detection pass, settings defaulting to
/// sync-enabled where the registry has no prior record.
pub fn merged_view_at(
    home: &Path,
    registry: &Registry,
    detected: &[DetectedTarget],
) -> Vec<TargetStatus> {
    detected
        .iter()
        .map(|d| {
            let settings = registry.target_settings(d.target);
            let current = drift::current_checksum_at(home, d.target);
            merge(d, &settings, current.as_deref())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Age formatting
// ---------------------------------------------------------------------------

/// Compact age for status tables: `42s`, `5m`, `3h`, `2d`.
pub fn format_age(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
