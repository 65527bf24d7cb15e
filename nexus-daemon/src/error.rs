use std::path::PathBuf;

use thiserror::Error;

/// Errors from the daemon runtime, its socket protocol, and launchd management.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Socket, watcher, or log file I/O, tagged with the path involved.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client config watcher could not be set up or fed.
    #[error("config watcher: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Registry(#[from] nexus_core::RegistryError),

    #[error(transparent)]
    Sync(#[from] nexus_sync::SyncError),

    #[error("wire JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal channel lost its other end, usually during shutdown.
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),

    /// The daemon answered, but with a failure or a malformed response.
    #[error("{0}")]
    Protocol(String),

    #[error("no daemon is listening on {socket}")]
    DaemonNotRunning { socket: PathBuf },

    #[error("launchd: {0}")]
    Launchd(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io { path: path.into(), source }
}
