//! Import existing server entries from a client's config into the registry.
//!
//! The inverse of propagation: a user who already wired servers into, say,
//! Cursor by hand can pull those entries in as registry definitions instead
//! of re-typing them. Transport comes straight off the entry; the source is
//! inferred from the launch command.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nexus_core::registry;
use nexus_core::types::{ServerDefinition, ServerId, ServerSource, TargetId, Transport};
use nexus_detector::config_scan_at;

use crate::error::SyncError;

/// What an import run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub target: TargetId,
    pub imported: usize,
    /// Name collisions left untouched (only when overwrite is off).
    pub skipped: usize,
    pub names: Vec<String>,
}

/// Reconstruct server definitions from `target`'s config and add them to the
/// registry.
///
/// Collisions are matched by server name: with `overwrite` off they are
/// skipped, with it on the existing definition is replaced. Each imported
/// server is enabled for the source target. Entries that don't look like
/// server definitions (no `command` or `url`) are ignored.
pub fn import_from_target_at(
    home: &Path,
    target: TargetId,
    overwrite: bool,
) -> Result<ImportReport, SyncError> {
    let scan = config_scan_at(home, target)?.ok_or_else(|| SyncError::Import {
        target,
        reason: "no config file found".to_string(),
    })?;
    let raw = scan.raw_servers.ok_or_else(|| SyncError::Import {
        target,
        reason: "config stores servers in a form that cannot be imported".to_string(),
    })?;

    let mut registry = registry::load_at(home)?;
    let mut imported = 0;
    let mut skipped = 0;
    let mut names = Vec::new();

    for (name, entry) in &raw {
        let Some(server) = definition_from_entry(name, entry, target) else {
            tracing::debug!("ignoring unrecognized entry '{name}' in {target} config");
            continue;
        };

        let exists = registry.servers.iter().any(|s| s.name == server.name);
        if exists && !overwrite {
            skipped += 1;
            continue;
        }
        if exists {
            registry.servers.retain(|s| s.name != server.name);
        }

        names.push(server.name.clone());
        registry.servers.push(server);
        imported += 1;
    }

    if imported > 0 {
        registry.updated_at = Utc::now();
        registry::save_at(home, &registry)?;
    }

    tracing::info!("imported {imported} server(s) from {target}, skipped {skipped}");
    Ok(ImportReport {
        target,
        imported,
        skipped,
        names,
    })
}

// ---------------------------------------------------------------------------
// Entry parsing
// ---------------------------------------------------------------------------

/// Rebuild one definition from a raw config entry. `None` when the entry
/// has neither a `url` nor a `command`.
fn definition_from_entry(name: &str, entry: &Value, source_target: TargetId) -> Option<ServerDefinition> {
    let obj = entry.as_object()?;

    let transport = if let Some(url) = obj.get("url").and_then(|v| v.as_str()) {
        let headers: HashMap<String, String> = obj
            .get("headers")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        Transport::Sse {
            url: url.to_string(),
            headers,
        }
    } else if let Some(command) = obj.get("command").and_then(|v| v.as_str()) {
        let args: Vec<String> = obj
            .get("args")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let env: HashMap<String, String> = obj
            .get("env")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        Transport::Stdio {
            command: command.to_string(),
            args,
            env,
        }
    } else {
        return None;
    };

    let source = infer_source(name, &transport);

    let mut server = ServerDefinition::new(
        ServerId::slug(name),
        name.to_string(),
        source,
        transport,
    );
    server.description = Some(format!("Imported from {}", source_target.display_name()));
    server.enable_for(source_target);
    Some(server)
}

/// Best-effort source classification from the launch command.
fn infer_source(name: &str, transport: &Transport) -> ServerSource {
    match transport {
        Transport::Sse { url, .. } => ServerSource::Remote { url: url.clone() },
        Transport::Stdio { command, args, .. } => {
            if command == "npx" || command.ends_with("/npx") {
                let package = args
                    .iter()
                    .find(|a| !a.starts_with('-'))
                    .cloned()
                    .unwrap_or_else(|| name.to_string());
                ServerSource::Npm {
                    package,
                    version: None,
                }
            } else if command == "uvx" || command.ends_with("/uvx") {
                let package = args.first().cloned().unwrap_or_else(|| name.to_string());
                ServerSource::Uvx { package }
            } else if command == "docker" || command.ends_with("/docker") {
                let image = args
                    .iter()
                    .skip_while(|a| *a != "run")
                    .skip(1)
                    .find(|a| !a.starts_with('-'))
                    .cloned()
                    .unwrap_or_else(|| name.to_string());
                ServerSource::Docker { image }
            } else {
                let path = if args.is_empty() {
                    command.clone()
                } else {
                    format!("{command} {}", args.join(" "))
                };
                ServerSource::Local { path }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
