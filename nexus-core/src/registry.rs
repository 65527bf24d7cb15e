//! The single-document YAML registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.nexus/
//!   registry.yaml   (servers + per-target state + preferences — mode 0600)
//!   logs/           (daemon-managed)
//!   daemon.sock     (daemon-managed)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.
//!
//! Mutations never touch any client's native config. Propagation is the sync
//! executor's job, fed by change notifications after the mutation lands.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::RegistryError;
use crate::types::{Registry, ServerDefinition, ServerId, TargetId};

/// Current registry document version.
pub const REGISTRY_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.nexus/` — pure, no I/O.
pub fn nexus_root_at(home: &Path) -> PathBuf {
    home.join(".nexus")
}

/// `<home>/.nexus/registry.yaml` — pure, no I/O.
pub fn registry_path_at(home: &Path) -> PathBuf {
    nexus_root_at(home).join("registry.yaml")
}

/// `<home>/.nexus/registry.yaml` (convenience — uses `dirs::home_dir()`).
pub fn registry_path() -> Result<PathBuf, RegistryError> {
    Ok(registry_path_at(&home()?))
}

/// Create `<home>/.nexus/` (mode `0700`) if it does not yet exist.
pub fn ensure_root_at(home: &Path) -> Result<PathBuf, RegistryError> {
    let root = nexus_root_at(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        restrict_permissions(&root, 0o700)?;
    }
    Ok(root)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the registry from `<home>/.nexus/registry.yaml`.
///
/// Returns `RegistryError::RegistryNotFound` if absent,
/// `RegistryError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Registry, RegistryError> {
    let path = registry_path_at(home);
    if !path.exists() {
        return Err(RegistryError::RegistryNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| RegistryError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Registry, RegistryError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the registry to `<home>/.nexus/registry.yaml`.
///
/// Write flow: serialize → `registry.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem — no EXDEV on macOS).
pub fn save_at(home: &Path, registry: &Registry) -> Result<(), RegistryError> {
    ensure_root_at(home)?;
    let path = registry_path_at(home);
    let tmp_path = path.with_file_name("registry.yaml.tmp");

    let yaml = serde_yaml::to_string(registry)?;
    std::fs::write(&tmp_path, yaml)?;
    restrict_permissions(&tmp_path, 0o600)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(registry: &Registry) -> Result<(), RegistryError> {
    save_at(&home()?, registry)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Create `<home>/.nexus/registry.yaml` with an empty document.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
/// The second element is `true` only when this call created the document.
pub fn init_at(home: &Path) -> Result<(Registry, bool), RegistryError> {
    if registry_path_at(home).exists() {
        return Ok((load_at(home)?, false));
    }

    let now = Utc::now();
    let registry = Registry {
        version: REGISTRY_VERSION,
        created_at: now,
        updated_at: now,
        ..Registry::default()
    };
    save_at(home, &registry)?;
    Ok((registry, true))
}

/// `init_at` convenience wrapper.
pub fn init() -> Result<(Registry, bool), RegistryError> {
    init_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Server mutations
// ---------------------------------------------------------------------------

/// Add a new server definition.
///
/// Returns `RegistryError::DuplicateServer` if the id is already taken.
pub fn add_server_at(home: &Path, server: ServerDefinition) -> Result<ServerDefinition, RegistryError> {
    let mut registry = load_at(home)?;
    if registry.find_server(&server.id).is_some() {
        return Err(RegistryError::DuplicateServer { id: server.id });
    }
    registry.servers.push(server.clone());
    touch_and_save(home, &mut registry)?;
    Ok(server)
}

/// `add_server_at` convenience wrapper.
pub fn add_server(server: ServerDefinition) -> Result<ServerDefinition, RegistryError> {
    add_server_at(&home()?, server)
}

/// Replace an existing server definition, keyed by id.
///
/// `installed_at` is preserved from the stored entry; `updated_at` is bumped.
/// Returns `RegistryError::ServerNotFound` for an unknown id.
pub fn update_server_at(
    home: &Path,
    mut server: ServerDefinition,
) -> Result<ServerDefinition, RegistryError> {
    let mut registry = load_at(home)?;
    let existing = registry
        .find_server_mut(&server.id)
        .ok_or_else(|| RegistryError::ServerNotFound { id: server.id.clone() })?;
    server.installed_at = existing.installed_at;
    server.updated_at = Utc::now();
    *existing = server.clone();
    touch_and_save(home, &mut registry)?;
    Ok(server)
}

/// `update_server_at` convenience wrapper.
pub fn update_server(server: ServerDefinition) -> Result<ServerDefinition, RegistryError> {
    update_server_at(&home()?, server)
}

/// Remove a server definition; returns the removed entry.
///
/// Returns `RegistryError::ServerNotFound` for an unknown id.
pub fn remove_server_at(home: &Path, id: &ServerId) -> Result<ServerDefinition, RegistryError> {
    let mut registry = load_at(home)?;
    let index = registry
        .servers
        .iter()
        .position(|s| &s.id == id)
        .ok_or_else(|| RegistryError::ServerNotFound { id: id.clone() })?;
    let removed = registry.servers.remove(index);
    touch_and_save(home, &mut registry)?;
    Ok(removed)
}

/// `remove_server_at` convenience wrapper.
pub fn remove_server(id: &ServerId) -> Result<ServerDefinition, RegistryError> {
    remove_server_at(&home()?, id)
}

/// Enable or disable one server for one target.
///
/// Returns `RegistryError::ServerNotFound` for an unknown server id.
pub fn toggle_target_at(
    home: &Path,
    id: &ServerId,
    target: TargetId,
    enabled: bool,
) -> Result<ServerDefinition, RegistryError> {
    let mut registry = load_at(home)?;
    let server = registry
        .find_server_mut(id)
        .ok_or_else(|| RegistryError::ServerNotFound { id: id.clone() })?;
    if enabled {
        server.enable_for(target);
    } else {
        server.disable_for(target);
    }
    let updated = server.clone();
    touch_and_save(home, &mut registry)?;
    Ok(updated)
}

/// `toggle_target_at` convenience wrapper.
pub fn toggle_target(
    id: &ServerId,
    target: TargetId,
    enabled: bool,
) -> Result<ServerDefinition, RegistryError> {
    toggle_target_at(&home()?, id, target, enabled)
}

// ---------------------------------------------------------------------------
// 6. Target & preference mutations
// ---------------------------------------------------------------------------

/// Turn automatic propagation for one target on or off.
///
/// Creates the target's settings record on first use.
pub fn set_target_enabled_at(
    home: &Path,
    target: TargetId,
    enabled: bool,
) -> Result<(), RegistryError> {
    let mut registry = load_at(home)?;
    registry.targets.entry(target).or_default().enabled = enabled;
    touch_and_save(home, &mut registry)
}

/// `set_target_enabled_at` convenience wrapper.
pub fn set_target_enabled(target: TargetId, enabled: bool) -> Result<(), RegistryError> {
    set_target_enabled_at(&home()?, target, enabled)
}

/// Turn the global auto-sync-on-changes preference on or off.
pub fn set_auto_sync_at(home: &Path, enabled: bool) -> Result<(), RegistryError> {
    let mut registry = load_at(home)?;
    registry.preferences.auto_sync_on_changes = enabled;
    touch_and_save(home, &mut registry)
}

/// `set_auto_sync_at` convenience wrapper.
pub fn set_auto_sync(enabled: bool) -> Result<(), RegistryError> {
    set_auto_sync_at(&home()?, enabled)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn touch_and_save(home: &Path, registry: &mut Registry) -> Result<(), RegistryError> {
    registry.updated_at = Utc::now();
    save_at(home, registry)
}

fn home() -> Result<PathBuf, RegistryError> {
    dirs::home_dir().ok_or(RegistryError::HomeNotFound)
}

/// Owner-only modes: 0o700 for `~/.nexus/`, 0o600 for the document itself.
#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
