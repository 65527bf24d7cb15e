use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_LABEL: &str = "dev.nexus.daemon";

/// Debounce window for the auto-sync trigger: a burst of registry mutations
/// inside this window collapses into one propagation pass.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(1000);

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const AUTO_SYNC_LOG: &str = "auto-sync.log";
pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn nexus_root(home: &Path) -> PathBuf {
    home.join(".nexus")
}

pub fn socket_path(home: &Path) -> PathBuf {
    nexus_root(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    nexus_root(home).join("logs")
}

/// Daemon stdout, the launchd `StandardOutPath`.
pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

/// Daemon stderr, the launchd `StandardErrorPath`.
pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}

/// One appended line per failed automatic pass lands here.
pub fn auto_sync_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(AUTO_SYNC_LOG)
}

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library/LaunchAgents")
}

pub fn launchd_plist_path(home: &Path) -> PathBuf {
    launch_agents_dir(home).join(format!("{DAEMON_LABEL}.plist"))
}
