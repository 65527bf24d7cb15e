//! Daemon runtime: debounced auto-sync trigger + drift watcher + socket server.

mod error;
pub mod launchd;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod trigger;

pub use error::DaemonError;
pub use launchd::{generate_plist, install as install_launchd, uninstall as uninstall_launchd};
pub use protocol::{
    daemon_running, request_manual, request_notify_change, request_status, request_stop,
    request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, PassSummary};
pub use trigger::{AutoSyncTrigger, TriggerState};
