//! Error types for nexus-sync.

use std::path::PathBuf;

use thiserror::Error;

use nexus_core::error::RegistryError;
use nexus_core::types::TargetId;
use nexus_detector::DetectError;

/// Errors from the machinery around a propagation pass.
///
/// Per-target write failures during a pass are *not* errors at this level —
/// they are captured into the target's outcome so one broken client cannot
/// abort the batch. `SyncError` covers the steps around the pass: loading and
/// saving the registry, scanning configs for import, and diff rendering.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the registry store.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// An error from target detection or config scanning.
    #[error("detection error: {0}")]
    Detection(#[from] DetectError),

    /// Filesystem failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A target's config could not be turned back into server definitions.
    #[error("cannot import from {target}: {reason}")]
    Import { target: TargetId, reason: String },
}

/// Shorthand for [`SyncError::Io`] with the offending path attached.
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io { path: path.into(), source }
}
