//! Error types for nexus-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ServerId;

/// Everything that can go wrong while reading or mutating the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Filesystem failure underneath a load or a save.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The in-memory document failed to serialize.
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The on-disk document is not valid registry YAML. Keeps serde_yaml's
    /// line/column context alongside the offending path.
    #[error("failed to parse registry at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` came back empty, so `~/.nexus/` cannot be resolved.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No document at the expected path. `init` has not run yet.
    #[error("registry not found at {path} — run `nexus init` first")]
    RegistryNotFound { path: PathBuf },

    /// A mutation referenced a server id that is not in the registry.
    #[error("no server with id '{id}' in the registry")]
    ServerNotFound { id: ServerId },

    /// `add` was called with an id that is already taken.
    #[error("a server with id '{id}' already exists")]
    DuplicateServer { id: ServerId },

    /// A target identifier outside the supported set was given.
    #[error("{0}")]
    UnknownTarget(String),
}
