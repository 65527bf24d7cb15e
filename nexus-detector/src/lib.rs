//! Client detection for `nexus-detector`.
//!
//! `detect_at(home, target)` inspects a client's config file location under a
//! home directory and reports whether the client looks installed, whether its
//! config exists, and how many MCP servers that config declares. Detection
//! never hard-fails: unreadable or malformed configs are reported on the
//! record itself so one broken client cannot hide the other seven.
//!
//! All functions take `home` explicitly so tests can point them at a
//! `TempDir` instead of the real home directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nexus_core::types::{ConfigFormat, SyncMode, TargetId};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Detection result for a single client target.
///
/// Carries only what was observed on disk; display name, sync mode and
/// config format are static properties of [`TargetId`] and are not repeated
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedTarget {
    /// Which client this record describes.
    pub target: TargetId,
    /// Whether the client appears to be installed.
    pub installed: bool,
    /// Where this client's config file lives (placeholder for manual-only
    /// clients that keep settings internally).
    pub config_path: PathBuf,
    /// Whether the config file exists on disk.
    pub config_exists: bool,
    /// Number of MCP servers declared in the config (0 when absent or
    /// unreadable).
    pub server_count: usize,
    /// Read or parse failure, if any. The record is still valid.
    pub error: Option<String>,
}

/// Parsed view of a client config's MCP server section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigScan {
    /// Number of server entries, including unnamed ones.
    pub server_count: usize,
    /// Names of the entries that carry one.
    pub server_names: Vec<String>,
    /// Raw name → definition map, when the format stores servers as an
    /// object. Array-style configs have no stable map to expose.
    pub raw_servers: Option<serde_json::Map<String, Value>>,
}

/// Errors from config scanning.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Config file location for `target`, relative to `home`.
///
/// Manual-only clients (Warp) keep their MCP settings internally; the
/// returned path is a documented placeholder that is never written.
pub fn config_path_at(home: &Path, target: TargetId) -> PathBuf {
    match target {
        TargetId::ClaudeCode => home.join(".claude.json"),
        TargetId::ClaudeDesktop => home
            .join("Library")
            .join("Application Support")
            .join("Claude")
            .join("claude_desktop_config.json"),
        TargetId::Cursor => home.join(".cursor").join("mcp.json"),
        TargetId::Vscode => home.join(".vscode").join("mcp.json"),
        TargetId::Cline => home
            .join("Documents")
            .join("Cline")
            .join("cline_mcp_settings.json"),
        TargetId::Continue => home.join(".continue").join("config.json"),
        TargetId::Windsurf => home.join(".codeium").join("windsurf").join("mcp_config.json"),
        TargetId::Warp => home.join(".warp").join("mcp_config.json"),
    }
}

/// Detect a single client under `home`. Never fails; problems reading or
/// parsing the config are attached to the returned record.
pub fn detect_at(home: &Path, target: TargetId) -> DetectedTarget {
    let config_path = config_path_at(home, target);
    let mut detected = DetectedTarget {
        target,
        installed: false,
        config_path: config_path.clone(),
        config_exists: false,
        server_count: 0,
        error: None,
    };

    // Manual-only clients hold their config internally; the file on disk is
    // never consulted.
    if target.sync_mode() == SyncMode::ManualOnly {
        detected.installed = true;
        return detected;
    }

    if config_path.exists() {
        detected.config_exists = true;
        detected.installed = true;
        match fs::read_to_string(&config_path) {
            Ok(content) => match scan_config(target.config_format(), &content) {
                Ok(scan) => detected.server_count = scan.server_count,
                Err(e) => detected.error = Some(format!("failed to parse config: {e}")),
            },
            Err(e) => detected.error = Some(format!("failed to read config: {e}")),
        }
    } else {
        detected.installed = installed_without_config(target, &config_path);
    }

    detected
}

/// Detect all supported clients under `home`, in [`TargetId::all`] order.
pub fn detect_all_at(home: &Path) -> Vec<DetectedTarget> {
    TargetId::all().into_iter().map(|t| detect_at(home, t)).collect()
}

/// Full scan of `target`'s config under `home`, for import flows.
///
/// Returns `Ok(None)` when the config file does not exist.
pub fn config_scan_at(home: &Path, target: TargetId) -> Result<Option<ConfigScan>, DetectError> {
    let path = config_path_at(home, target);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let scan = scan_config(target.config_format(), &content).map_err(|e| {
        DetectError::ParseError { path: path.clone(), message: e.to_string() }
    })?;
    Ok(Some(scan))
}

/// Parse the MCP server section of a client config in the given format.
pub fn scan_config(format: ConfigFormat, content: &str) -> Result<ConfigScan, DetectError> {
    let json: Value = serde_json::from_str(content)?;

    let scan = match format {
        // {"mcpServers": {"name": {...}, ...}}
        ConfigFormat::Standard => {
            scan_object(json.get("mcpServers").and_then(|v| v.as_object()))
        }
        // {"mcp": {"servers": {"name": {...}, ...}}}
        ConfigFormat::Vscode => scan_object(
            json.get("mcp")
                .and_then(|v| v.get("servers"))
                .and_then(|v| v.as_object()),
        ),
        // {"mcpServers": [{"name": ..., ...}, ...]} — array first, with an
        // object fallback for configs written in the standard shape.
        ConfigFormat::Continue => {
            if let Some(servers) = json.get("mcpServers").and_then(|v| v.as_array()) {
                let server_names: Vec<String> = servers
                    .iter()
                    .filter_map(|v| v.get("name").and_then(|n| n.as_str()).map(String::from))
                    .collect();
                ConfigScan { server_count: servers.len(), server_names, raw_servers: None }
            } else {
                scan_object(json.get("mcpServers").and_then(|v| v.as_object()))
            }
        }
    };

    Ok(scan)
}

// ---------------------------------------------------------------------------
// Installed heuristics
// ---------------------------------------------------------------------------

/// Whether `target` looks installed even though its config file is absent.
///
/// App-bundle checks are macOS conventions; on other platforms they simply
/// come back `false` and the directory checks carry the decision.
fn installed_without_config(target: TargetId, config_path: &Path) -> bool {
    match target {
        TargetId::ClaudeDesktop => Path::new("/Applications/Claude.app").exists(),
        TargetId::Cursor => {
            Path::new("/Applications/Cursor.app").exists() || parent_exists(config_path)
        }
        TargetId::Vscode => {
            Path::new("/Applications/Visual Studio Code.app").exists()
                || parent_exists(config_path)
        }
        TargetId::Windsurf => Path::new("/Applications/Windsurf.app").exists(),
        TargetId::Cline | TargetId::Continue => parent_exists(config_path),
        // CLI-based; there is no bundle or settings directory to probe.
        TargetId::ClaudeCode => true,
        // Manual-only targets are handled before this point.
        TargetId::Warp => false,
    }
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn parent_exists(path: &Path) -> bool {
    path.parent().map(|p| p.exists()).unwrap_or(false)
}

fn scan_object(servers: Option<&serde_json::Map<String, Value>>) -> ConfigScan {
    match servers {
        Some(map) => ConfigScan {
            server_count: map.len(),
            server_names: map.keys().cloned().collect(),
            raw_servers: Some(map.clone()),
        },
        None => ConfigScan { server_count: 0, server_names: vec![], raw_servers: None },
    }
}

// ---------------------------------------------------------------------------
// Detection cache
// ---------------------------------------------------------------------------

/// TTL-bounded cache over [`detect_all_at`].
///
/// Detection stats a pile of paths; status views refresh through this cache so
/// repeated queries inside the TTL window reuse the last scan. The cache is
/// explicit state — `(value, last_checked, ttl)` — owned by whoever serves
/// status, not a global.
#[derive(Debug)]
pub struct DetectionCache {
    value: Vec<DetectedTarget>,
    last_checked: Option<Instant>,
    ttl: Duration,
}

impl DetectionCache {
    /// Empty cache; the first [`get_or_refresh_at`](Self::get_or_refresh_at)
    /// always scans.
    pub fn new(ttl: Duration) -> Self {
        Self { value: Vec::new(), last_checked: None, ttl }
    }

    /// Whether the cached value is older than the TTL (or never populated).
    pub fn is_stale(&self) -> bool {
        match self.last_checked {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    /// The cached records, possibly stale or empty.
    pub fn get(&self) -> &[DetectedTarget] {
        &self.value
    }

    /// Re-run detection now and cache the result.
    pub fn refresh_at(&mut self, home: &Path) -> &[DetectedTarget] {
        self.value = detect_all_at(home);
        self.last_checked = Some(Instant::now());
        &self.value
    }

    /// Cached records, re-scanning first if the TTL has lapsed.
    pub fn get_or_refresh_at(&mut self, home: &Path) -> &[DetectedTarget] {
        if self.is_stale() {
            self.refresh_at(home);
        }
        &self.value
    }

    /// Drop freshness so the next read re-scans (used after sync passes that
    /// just rewrote client configs).
    pub fn invalidate(&mut self) {
        self.last_checked = None;
    }
}
