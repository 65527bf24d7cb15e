//! Propagation executor — writes registry state into client configs.
//!
//! ## Per-target write protocol
//!
//! 1. Collect the servers enabled for the target from the registry snapshot.
//! 2. Manual-only target → no write; return the generated paste-in payload.
//! 3. Read the existing config (empty or missing file counts as none).
//! 4. Copy the existing file to a `.json.bak` sibling.
//! 5. Build the per-format document ([`crate::transform`]) and pretty-print.
//! 6. Write `<path>.json.tmp` (parent dirs 0700, file 0600), then rename.
//!
//! Every step failure lands in that target's [`SyncOutcome`] — a pass never
//! aborts because one client is broken. After a pass, [`record_outcomes_at`]
//! folds timestamps, checksums, and errors back into the registry document.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nexus_core::registry;
use nexus_core::types::{Registry, SyncMode, TargetId};
use nexus_detector::config_path_at;

use crate::drift;
use crate::error::{io_err, SyncError};
use crate::transform;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one propagation attempt against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub target: TargetId,
    pub success: bool,
    pub servers_synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Paste-in payload; present only for manual-only targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_config: Option<String>,
}

impl SyncOutcome {
    fn failure(target: TargetId, error: String) -> Self {
        Self {
            target,
            success: false,
            servers_synced: 0,
            backup_path: None,
            error: Some(error),
            manual_config: None,
        }
    }
}

/// Aggregate over one propagation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub total_targets: usize,
    pub successful: usize,
    pub failed: usize,
    pub manual_required: usize,
    pub outcomes: Vec<SyncOutcome>,
}

/// Fold per-target outcomes into a pass summary.
///
/// Counting rule: an outcome carrying a non-empty manual payload counts only
/// toward `manual_required`; every other outcome counts toward `successful`
/// or `failed` by its success flag. `total_targets` is the outcome count, so
/// `successful + failed + manual_required == total_targets` always holds.
/// Total function — classification is report-only and never fails.
pub fn classify(outcomes: Vec<SyncOutcome>) -> SyncSummary {
    let mut successful = 0;
    let mut failed = 0;
    let mut manual_required = 0;

    for outcome in &outcomes {
        let manual = outcome
            .manual_config
            .as_deref()
            .map(|payload| !payload.is_empty())
            .unwrap_or(false);
        if manual {
            manual_required += 1;
        } else if outcome.success {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    SyncSummary {
        total_targets: outcomes.len(),
        successful,
        failed,
        manual_required,
        outcomes,
    }
}

// ---------------------------------------------------------------------------
// Per-target sync
// ---------------------------------------------------------------------------

/// Propagate the registry snapshot to a single target. Never fails; problems
/// land in the returned outcome.
///
/// Idempotent for a fixed snapshot: repeating the call produces the same
/// target content and the same `servers_synced` count. With `dry_run` the
/// outcome is computed through document rendering but nothing touches disk.
pub fn sync_target_at(
    home: &Path,
    registry: &Registry,
    target: TargetId,
    dry_run: bool,
) -> SyncOutcome {
    let servers = registry.servers_for_target(target);

    // Manual-only targets never receive a write; they get a payload to paste.
    if target.sync_mode() == SyncMode::ManualOnly {
        return SyncOutcome {
            target,
            success: true,
            servers_synced: servers.len(),
            backup_path: None,
            error: None,
            manual_config: Some(transform::manual_config(&servers)),
        };
    }

    let config_path = config_path_at(home, target);

    let existing = match read_existing_config(&config_path) {
        Ok(existing) => existing,
        Err(e) => return SyncOutcome::failure(target, format!("failed to read existing config: {e}")),
    };

    let document = transform::render(target.config_format(), &servers, existing.as_ref());
    let content = match serde_json::to_string_pretty(&document) {
        Ok(content) => content,
        Err(e) => return SyncOutcome::failure(target, format!("failed to serialize config: {e}")),
    };

    if dry_run {
        tracing::info!(
            "[dry-run] would sync {} server(s) to {}",
            servers.len(),
            target
        );
        return SyncOutcome {
            target,
            success: true,
            servers_synced: servers.len(),
            backup_path: None,
            error: None,
            manual_config: None,
        };
    }

    let backup_path = match create_backup(&config_path) {
        Ok(backup) => backup,
        Err(e) => return SyncOutcome::failure(target, format!("failed to create backup: {e}")),
    };

    if let Err(e) = write_config(&config_path, &content) {
        return SyncOutcome {
            target,
            success: false,
            servers_synced: 0,
            backup_path,
            error: Some(format!("failed to write config: {e}")),
            manual_config: None,
        };
    }

    tracing::info!("synced {} server(s) to {}", servers.len(), target);
    SyncOutcome {
        target,
        success: true,
        servers_synced: servers.len(),
        backup_path,
        error: None,
        manual_config: None,
    }
}

/// Propagate the registry snapshot to every target with sync enabled.
///
/// Targets the user disabled are skipped entirely (no outcome); each
/// remaining target's outcome is independent of the others.
pub fn sync_all_at(home: &Path, registry: &Registry, dry_run: bool) -> SyncSummary {
    let mut outcomes = Vec::new();
    for target in TargetId::all() {
        if !registry.target_sync_enabled(target) {
            tracing::debug!("skipping disabled target: {target}");
            continue;
        }
        outcomes.push(sync_target_at(home, registry, target, dry_run));
    }
    classify(outcomes)
}

// ---------------------------------------------------------------------------
// State fold-in
// ---------------------------------------------------------------------------

/// Record a pass's outcomes in the registry document.
///
/// Reloads the registry rather than saving the pass's snapshot, so a server
/// mutation that landed mid-pass survives; only per-target sync fields are
/// touched. Success sets `last_sync` and the written file's checksum and
/// clears `last_error`; failure sets `last_error` and leaves the rest alone.
/// Manual-only outcomes record nothing — no bytes were written.
pub fn record_outcomes_at(home: &Path, outcomes: &[SyncOutcome]) -> Result<(), SyncError> {
    let mut registry = registry::load_at(home)?;
    let now = Utc::now();

    for outcome in outcomes {
        if outcome.manual_config.is_some() {
            continue;
        }
        let settings = registry.targets.entry(outcome.target).or_default();
        if outcome.success {
            settings.last_sync = Some(now);
            settings.last_sync_checksum = drift::current_checksum_at(home, outcome.target);
            settings.last_error = None;
        } else {
            settings.last_error = outcome.error.clone();
        }
    }

    registry.updated_at = now;
    registry::save_at(home, &registry)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// File plumbing
// ---------------------------------------------------------------------------

/// Existing config document, `None` when the file is absent or blank.
fn read_existing_config(path: &Path) -> Result<Option<Value>, SyncError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(&content)?;
    Ok(Some(value))
}

/// Copy an existing config to its `.json.bak` sibling. `None` when there was
/// nothing to back up.
fn create_backup(path: &Path) -> Result<Option<PathBuf>, SyncError> {
    if !path.exists() {
        return Ok(None);
    }
    let backup = path.with_extension("json.bak");
    fs::copy(path, &backup).map_err(|e| io_err(&backup, e))?;
    Ok(Some(backup))
}

/// Atomic config write: tmp sibling, tight permissions, rename.
fn write_config(path: &Path, content: &str) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            set_dir_permissions(parent)?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    owner_only_permissions(&tmp)?;

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SyncError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SyncError> {
    Ok(())
}

#[cfg(unix)]
fn owner_only_permissions(path: &Path) -> Result<(), SyncError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn owner_only_permissions(_path: &Path) -> Result<(), SyncError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::types::{ServerDefinition, ServerId, ServerSource, Transport};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_registry(targets: &[TargetId]) -> Registry {
        let mut server = ServerDefinition::new(
            ServerId::from("github"),
            "github".to_string(),
            ServerSource::Npm {
                package: "@test/github".to_string(),
                version: None,
            },
            Transport::Stdio {
                command: "npx".to_string(),
                args: vec!["-y".to_string(), "@test/github".to_string()],
                env: HashMap::new(),
            },
        );
        for target in targets {
            server.enable_for(*target);
        }
        let mut registry = Registry::default();
        registry.servers.push(server);
        registry
    }

    fn outcome(target: TargetId, success: bool, manual: Option<&str>) -> SyncOutcome {
        SyncOutcome {
            target,
            success,
            servers_synced: 1,
            backup_path: None,
            error: if success { None } else { Some("boom".into()) },
            manual_config: manual.map(String::from),
        }
    }

    #[test]
    fn classify_counts_manual_separately() {
        let summary = classify(vec![
            outcome(TargetId::Cursor, true, None),
            outcome(TargetId::Warp, true, Some("{\"mcpServers\": {}}")),
            outcome(TargetId::Vscode, false, None),
        ]);
        assert_eq!(summary.total_targets, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.manual_required, 1);
    }

    #[test]
    fn classify_counts_always_add_up() {
        let outcomes = vec![
            outcome(TargetId::Cursor, true, None),
            outcome(TargetId::Vscode, false, None),
            outcome(TargetId::Cline, true, None),
            outcome(TargetId::Warp, true, Some("{}")),
            outcome(TargetId::Continue, false, None),
        ];
        let summary = classify(outcomes);
        assert_eq!(
            summary.successful + summary.failed + summary.manual_required,
            summary.total_targets
        );
    }

    #[test]
    fn classify_empty_manual_payload_counts_by_success_flag() {
        let summary = classify(vec![outcome(TargetId::Warp, true, Some(""))]);
        assert_eq!(summary.manual_required, 0);
        assert_eq!(summary.successful, 1);
    }

    #[test]
    fn classify_of_nothing_is_all_zero() {
        let summary = classify(vec![]);
        assert_eq!(summary.total_targets, 0);
        assert_eq!(summary.successful, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.manual_required, 0);
    }

    #[test]
    fn manual_only_target_gets_payload_not_write() {
        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Warp]);

        let outcome = sync_target_at(home.path(), &registry, TargetId::Warp, false);
        assert!(outcome.success);
        assert_eq!(outcome.servers_synced, 1);
        let payload = outcome.manual_config.expect("manual payload");
        assert!(payload.contains("github"));
        assert!(
            !config_path_at(home.path(), TargetId::Warp).exists(),
            "manual-only target must never be written"
        );
    }

    #[test]
    fn sync_writes_config_with_backup_of_previous() {
        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Cursor]);
        let path = config_path_at(home.path(), TargetId::Cursor);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, r#"{"mcpServers": {"stale": {"command": "old"}}}"#).expect("seed");

        let outcome = sync_target_at(home.path(), &registry, TargetId::Cursor, false);
        assert!(outcome.success, "error: {:?}", outcome.error);
        assert_eq!(outcome.servers_synced, 1);

        let backup = outcome.backup_path.expect("backup recorded");
        assert!(backup.to_string_lossy().ends_with("mcp.json.bak"));
        let backed_up = fs::read_to_string(&backup).expect("read backup");
        assert!(backed_up.contains("stale"), "backup holds prior content");

        let written: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert!(written["mcpServers"]["github"].is_object());
        assert!(
            written["mcpServers"].get("stale").is_none(),
            "standard format replaces the document"
        );
    }

    #[test]
    fn first_sync_has_no_backup() {
        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Cursor]);
        let outcome = sync_target_at(home.path(), &registry, TargetId::Cursor, false);
        assert!(outcome.success);
        assert!(outcome.backup_path.is_none());
    }

    #[test]
    fn sync_twice_is_idempotent() {
        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Cursor]);

        let first = sync_target_at(home.path(), &registry, TargetId::Cursor, false);
        let path = config_path_at(home.path(), TargetId::Cursor);
        let bytes_1 = fs::read(&path).expect("read");

        let second = sync_target_at(home.path(), &registry, TargetId::Cursor, false);
        let bytes_2 = fs::read(&path).expect("read");

        assert_eq!(first.servers_synced, second.servers_synced);
        assert_eq!(bytes_1, bytes_2, "same snapshot, same content");
    }

    #[test]
    fn corrupt_existing_config_fails_that_target_only() {
        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Vscode, TargetId::Cursor]);
        let vscode_path = config_path_at(home.path(), TargetId::Vscode);
        fs::create_dir_all(vscode_path.parent().expect("parent")).expect("mkdir");
        fs::write(&vscode_path, "{broken").expect("seed corrupt");

        let summary = sync_all_at(home.path(), &registry, false);
        let vscode = summary
            .outcomes
            .iter()
            .find(|o| o.target == TargetId::Vscode)
            .expect("vscode outcome");
        assert!(!vscode.success);
        assert!(vscode.error.as_deref().expect("error").contains("existing config"));

        let cursor = summary
            .outcomes
            .iter()
            .find(|o| o.target == TargetId::Cursor)
            .expect("cursor outcome");
        assert!(cursor.success, "one broken target must not abort the rest");
        assert!(summary.failed >= 1 && summary.successful >= 1);
    }

    #[test]
    fn empty_existing_file_is_treated_as_missing() {
        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Cursor]);
        let path = config_path_at(home.path(), TargetId::Cursor);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "  \n").expect("seed blank");

        let outcome = sync_target_at(home.path(), &registry, TargetId::Cursor, false);
        assert!(outcome.success, "error: {:?}", outcome.error);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Cursor]);

        let outcome = sync_target_at(home.path(), &registry, TargetId::Cursor, true);
        assert!(outcome.success);
        assert_eq!(outcome.servers_synced, 1);
        assert!(outcome.backup_path.is_none());
        assert!(!config_path_at(home.path(), TargetId::Cursor).exists());
    }

    #[test]
    fn disabled_target_is_skipped_without_outcome() {
        let home = TempDir::new().expect("home");
        let mut registry = test_registry(&[TargetId::Cursor]);
        registry.targets.entry(TargetId::Cursor).or_default().enabled = false;

        let summary = sync_all_at(home.path(), &registry, true);
        assert!(
            summary.outcomes.iter().all(|o| o.target != TargetId::Cursor),
            "disabled target must not appear in the pass"
        );
    }

    #[test]
    fn failed_outcome_records_error_and_keeps_last_sync() {
        let home = TempDir::new().expect("home");
        let synced_at = Utc::now() - chrono::Duration::hours(2);
        let mut registry = test_registry(&[TargetId::Cursor]);
        let settings = registry.targets.entry(TargetId::Cursor).or_default();
        settings.last_sync = Some(synced_at);
        settings.last_sync_checksum = Some("9f86d081884c7d65".to_string());
        registry::save_at(home.path(), &registry).expect("save");

        record_outcomes_at(home.path(), &[outcome(TargetId::Cursor, false, None)])
            .expect("record");

        let settings = registry::load_at(home.path())
            .expect("reload")
            .target_settings(TargetId::Cursor);
        assert_eq!(settings.last_sync, Some(synced_at), "failure must not touch last_sync");
        assert_eq!(settings.last_sync_checksum.as_deref(), Some("9f86d081884c7d65"));
        assert_eq!(settings.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn success_clears_a_previously_recorded_error() {
        let home = TempDir::new().expect("home");
        let mut registry = test_registry(&[TargetId::Cursor]);
        registry.targets.entry(TargetId::Cursor).or_default().last_error =
            Some("disk full".to_string());
        registry::save_at(home.path(), &registry).expect("save");

        record_outcomes_at(home.path(), &[outcome(TargetId::Cursor, true, None)])
            .expect("record");

        let settings = registry::load_at(home.path())
            .expect("reload")
            .target_settings(TargetId::Cursor);
        assert!(settings.last_error.is_none());
        assert!(settings.last_sync.is_some());
    }

    #[test]
    fn manual_outcomes_leave_target_state_untouched() {
        let home = TempDir::new().expect("home");
        registry::save_at(home.path(), &test_registry(&[TargetId::Warp])).expect("save");

        record_outcomes_at(home.path(), &[outcome(TargetId::Warp, true, Some("{}"))])
            .expect("record");

        let settings = registry::load_at(home.path())
            .expect("reload")
            .target_settings(TargetId::Warp);
        assert!(settings.last_sync.is_none());
        assert!(settings.last_sync_checksum.is_none());
    }

    #[test]
    fn tmp_file_cleaned_up_after_write() {
        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Cursor]);
        sync_target_at(home.path(), &registry, TargetId::Cursor, false);

        let tmp = config_path_at(home.path(), TargetId::Cursor).with_extension("json.tmp");
        assert!(!tmp.exists(), "tmp sibling must not survive the rename");
    }

    #[cfg(unix)]
    #[test]
    fn written_config_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let home = TempDir::new().expect("home");
        let registry = test_registry(&[TargetId::Cursor]);
        sync_target_at(home.path(), &registry, TargetId::Cursor, false);

        let path = config_path_at(home.path(), TargetId::Cursor);
        let mode = fs::metadata(&path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = fs::metadata(path.parent().expect("parent"))
            .expect("meta")
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }
}
