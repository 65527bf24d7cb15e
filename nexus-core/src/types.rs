//! Domain types for the Nexus registry.
//!
//! The registry document and everything inside it is serializable via
//! serde + serde_yaml. Client identifiers are a closed enum — adding a new
//! client means adding a variant, and the compiler walks you through every
//! metadata table that has to learn about it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a server definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId(pub String);

impl ServerId {
    /// Identifier derived from a display name: lowercased, with runs of
    /// non-alphanumeric characters collapsed to single dashes.
    pub fn slug(name: &str) -> Self {
        let mut out = String::with_capacity(name.len());
        let mut gap = false;
        for c in name.chars() {
            if c.is_alphanumeric() {
                if gap && !out.is_empty() {
                    out.push('-');
                }
                gap = false;
                out.extend(c.to_lowercase());
            } else {
                gap = true;
            }
        }
        Self(out)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// One supported client integration.
///
/// The set is fixed: targets are not user-extensible, and every per-target
/// dispatch in the workspace is an exhaustive `match` on this enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum TargetId {
    ClaudeCode,
    ClaudeDesktop,
    Cursor,
    Vscode,
    Cline,
    Continue,
    Windsurf,
    Warp,
}

impl TargetId {
    /// Every supported target, in display order.
    pub const fn all() -> [TargetId; 8] {
        [
            TargetId::ClaudeCode,
            TargetId::ClaudeDesktop,
            TargetId::Cursor,
            TargetId::Vscode,
            TargetId::Cline,
            TargetId::Continue,
            TargetId::Windsurf,
            TargetId::Warp,
        ]
    }

    /// Stable string identifier, as used in persisted documents and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetId::ClaudeCode => "claude-code",
            TargetId::ClaudeDesktop => "claude-desktop",
            TargetId::Cursor => "cursor",
            TargetId::Vscode => "vscode",
            TargetId::Cline => "cline",
            TargetId::Continue => "continue",
            TargetId::Windsurf => "windsurf",
            TargetId::Warp => "warp",
        }
    }

    /// Human-facing name for tables and messages.
    pub fn display_name(self) -> &'static str {
        match self {
            TargetId::ClaudeCode => "Claude Code",
            TargetId::ClaudeDesktop => "Claude Desktop",
            TargetId::Cursor => "Cursor",
            TargetId::Vscode => "VS Code",
            TargetId::Cline => "Cline",
            TargetId::Continue => "Continue.dev",
            TargetId::Windsurf => "Windsurf",
            TargetId::Warp => "Warp",
        }
    }

    /// How configuration reaches this target.
    pub fn sync_mode(self) -> SyncMode {
        match self {
            TargetId::Warp => SyncMode::ManualOnly,
            _ => SyncMode::Automatic,
        }
    }

    /// The native config file layout this target reads.
    pub fn config_format(self) -> ConfigFormat {
        match self {
            TargetId::Vscode => ConfigFormat::Vscode,
            TargetId::Continue => ConfigFormat::Continue,
            _ => ConfigFormat::Standard,
        }
    }

    /// Setup documentation, for targets that need hand-configuration.
    pub fn docs_url(self) -> Option<&'static str> {
        match self {
            TargetId::Warp => Some("https://docs.warp.dev/features/mcp"),
            _ => None,
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        TargetId::all()
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| {
                let known: Vec<&str> = TargetId::all().iter().map(|t| t.as_str()).collect();
                RegistryError::UnknownTarget(format!(
                    "unknown target '{s}'; expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Whether a target's config can be written programmatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// File-based sync handled by the executor.
    Automatic,
    /// The user pastes a generated payload by hand (e.g. Warp).
    ManualOnly,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Automatic => write!(f, "automatic"),
            SyncMode::ManualOnly => write!(f, "manual-only"),
        }
    }
}

/// Native config document layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    /// `{"mcpServers": {...}}` — the whole document is ours.
    Standard,
    /// `{"mcp": {"servers": {...}}}` inside a larger settings file.
    Vscode,
    /// `{"mcpServers": ...}` inside Continue's `config.json`.
    Continue,
}

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

/// How a server is obtained and launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerSource {
    Npm {
        package: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Uvx {
        package: String,
    },
    Local {
        path: String,
    },
    Docker {
        image: String,
    },
    Remote {
        url: String,
    },
    Github {
        repo: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
}

/// How clients talk to a running server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

/// One MCP server entry in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDefinition {
    pub id: ServerId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: ServerSource,
    pub transport: Transport,
    /// Global on/off switch; a disabled server is synced to no target.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Targets whose configs should carry this server.
    #[serde(default)]
    pub enabled_targets: Vec<TargetId>,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ServerDefinition {
    /// Create a definition enabled globally but for no targets yet.
    pub fn new(id: ServerId, name: String, source: ServerSource, transport: Transport) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            description: None,
            source,
            transport,
            enabled: true,
            enabled_targets: vec![],
            installed_at: now,
            updated_at: now,
            version: None,
        }
    }

    /// `true` when this server should appear in `target`'s config.
    pub fn is_enabled_for(&self, target: TargetId) -> bool {
        self.enabled && self.enabled_targets.contains(&target)
    }

    pub fn enable_for(&mut self, target: TargetId) {
        if !self.enabled_targets.contains(&target) {
            self.enabled_targets.push(target);
            self.updated_at = Utc::now();
        }
    }

    pub fn disable_for(&mut self, target: TargetId) {
        if self.enabled_targets.contains(&target) {
            self.enabled_targets.retain(|t| *t != target);
            self.updated_at = Utc::now();
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Sync state & preferences
// ---------------------------------------------------------------------------

/// Persisted per-target sync record.
///
/// The externally-modified flag is deliberately absent: it is derived from
/// `last_sync_checksum` by the drift check at read time, so a successful sync
/// clears it by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSettings {
    /// Whether automatic propagation includes this target.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_checksum: Option<String>,
    /// Message from the most recent failed propagation attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            last_sync: None,
            last_sync_checksum: None,
            last_error: None,
        }
    }
}

/// Global user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Feed registry mutations into the debounced auto-sync trigger.
    #[serde(default = "default_true")]
    pub auto_sync_on_changes: bool,
    /// Seconds a cached detection pass stays fresh in the daemon.
    #[serde(default = "default_refresh_interval")]
    pub status_refresh_interval: u64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_sync_on_changes: true,
            status_refresh_interval: default_refresh_interval(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Registry document
// ---------------------------------------------------------------------------

/// Root of the Nexus YAML registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Registry {
    pub version: u32,
    #[serde(default)]
    pub servers: Vec<ServerDefinition>,
    /// Per-target sync state, keyed by the stable target identifier.
    #[serde(default)]
    pub targets: BTreeMap<TargetId, TargetSettings>,
    #[serde(default)]
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registry {
    /// Servers that belong in `target`'s config right now.
    pub fn servers_for_target(&self, target: TargetId) -> Vec<&ServerDefinition> {
        self.servers
            .iter()
            .filter(|s| s.is_enabled_for(target))
            .collect()
    }

    /// Settings for `target`, defaulting to sync-enabled with no history.
    pub fn target_settings(&self, target: TargetId) -> TargetSettings {
        self.targets.get(&target).cloned().unwrap_or_default()
    }

    /// `true` when automatic propagation should include `target`.
    pub fn target_sync_enabled(&self, target: TargetId) -> bool {
        self.targets.get(&target).map(|s| s.enabled).unwrap_or(true)
    }

    pub fn find_server(&self, id: &ServerId) -> Option<&ServerDefinition> {
        self.servers.iter().find(|s| &s.id == id)
    }

    pub fn find_server_mut(&mut self, id: &ServerId) -> Option<&mut ServerDefinition> {
        self.servers.iter_mut().find(|s| &s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
