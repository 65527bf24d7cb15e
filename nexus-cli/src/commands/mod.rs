pub mod daemon;
pub mod init;
pub mod manual;
pub mod server;
pub mod status;
pub mod sync;
pub mod target;

use std::path::Path;

/// Best-effort poke so a running daemon schedules a pass for the mutation
/// that just saved. No daemon listening is the normal case, not an error.
pub(crate) fn notify_daemon(home: &Path) {
    let _ = nexus_daemon::request_notify_change(home);
}
