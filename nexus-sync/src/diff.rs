//! Dry-run unified diff support for `nexus sync --diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use nexus_core::types::{Registry, SyncMode, TargetId};
use nexus_detector::config_path_at;

use crate::error::io_err;
use crate::transform;
use crate::SyncError;

/// Pending change for one target's config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDiff {
    pub target: TargetId,
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Compare what a sync would write for `target` against what is on disk.
///
/// Returns `Ok(None)` when they already agree, and for manual-only targets,
/// which have no file to diff against. No files are written.
pub fn diff_target_at(
    home: &Path,
    registry: &Registry,
    target: TargetId,
) -> Result<Option<TargetDiff>, SyncError> {
    if target.sync_mode() == SyncMode::ManualOnly {
        return Ok(None);
    }

    let path = config_path_at(home, target);
    let existing = read_existing_or_empty(&path)?;

    let servers = registry.servers_for_target(target);
    let existing_value = if existing.trim().is_empty() {
        None
    } else {
        serde_json::from_str(&existing).ok()
    };
    let rendered = serde_json::to_string_pretty(&transform::render(
        target.config_format(),
        &servers,
        existing_value.as_ref(),
    ))?;

    if existing == rendered {
        return Ok(None);
    }

    let relative = path.strip_prefix(home).unwrap_or(path.as_path());
    let old_header = format!("a/{}", relative.display());
    let new_header = format!("b/{}", relative.display());
    let unified = TextDiff::from_lines(&existing, &rendered)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();

    Ok(Some(TargetDiff {
        target,
        path,
        unified_diff: unified,
    }))
}

/// Pending changes for every sync-enabled target.
pub fn diff_all_at(home: &Path, registry: &Registry) -> Result<Vec<TargetDiff>, SyncError> {
    let mut diffs = Vec::new();
    for target in TargetId::all() {
        if !registry.target_sync_enabled(target) {
            continue;
        }
        if let Some(diff) = diff_target_at(home, registry, target)? {
            diffs.push(diff);
        }
    }
    Ok(diffs)
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::sync_target_at;
    use nexus_core::types::{ServerDefinition, ServerId, ServerSource, Transport};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn registry_with_cursor_server() -> Registry {
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
        server.enable_for(TargetId::Cursor);
        let mut registry = Registry::default();
        registry.servers.push(server);
        registry
    }

    #[test]
    fn no_diff_after_clean_sync() {
        let home = TempDir::new().expect("home");
        let registry = registry_with_cursor_server();
        let outcome = sync_target_at(home.path(), &registry, TargetId::Cursor, false);
        assert!(outcome.success);

        let diff = diff_target_at(home.path(), &registry, TargetId::Cursor).expect("diff");
        assert!(diff.is_none(), "freshly synced config should show no diff");
    }

    #[test]
    fn never_synced_target_diffs_from_empty() {
        let home = TempDir::new().expect("home");
        let registry = registry_with_cursor_server();

        let diff = diff_target_at(home.path(), &registry, TargetId::Cursor)
            .expect("diff")
            .expect("pending change");
        assert!(diff.unified_diff.contains("--- a/.cursor/mcp.json"));
        assert!(diff.unified_diff.contains("+++ b/.cursor/mcp.json"));
        assert!(diff.unified_diff.contains("+    \"github\""));
    }

    #[test]
    fn external_edit_shows_up_as_diff() {
        let home = TempDir::new().expect("home");
        let registry = registry_with_cursor_server();
        sync_target_at(home.path(), &registry, TargetId::Cursor, false);

        let path = config_path_at(home.path(), TargetId::Cursor);
        fs::write(&path, r#"{"mcpServers": {"rogue": {"command": "x"}}}"#).expect("edit");

        let diff = diff_target_at(home.path(), &registry, TargetId::Cursor)
            .expect("diff")
            .expect("pending change");
        assert!(diff.unified_diff.contains("rogue"));
        assert!(diff.unified_diff.contains("@@"));
    }

    #[test]
    fn manual_only_target_never_diffs() {
        let home = TempDir::new().expect("home");
        let registry = registry_with_cursor_server();
        let diff = diff_target_at(home.path(), &registry, TargetId::Warp).expect("diff");
        assert!(diff.is_none());
    }

    #[test]
    fn diff_all_skips_disabled_targets() {
        let home = TempDir::new().expect("home");
        let mut registry = registry_with_cursor_server();
        registry.targets.entry(TargetId::Cursor).or_default().enabled = false;

        let diffs = diff_all_at(home.path(), &registry).expect("diffs");
        assert!(diffs.iter().all(|d| d.target != TargetId::Cursor));
    }
}
