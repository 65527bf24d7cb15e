//! Size-capped rotation for the daemon's log files.
//!
//! The daemon appends to `daemon.log`, `daemon-err.log`, and `auto-sync.log`
//! indefinitely; rotation keeps each file bounded by renaming it to `.1` once
//! it reaches the cap and shifting older copies up one slot. The oldest copy
//! falls off the end.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// When and how much to rotate.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    /// Rotate once a file reaches this many bytes.
    pub max_bytes: u64,
    /// Rotated copies to keep (`<name>.1` through `<name>.<keep>`).
    pub keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

impl RotationPolicy {
    /// Rotate `path` if it has reached the size cap.
    ///
    /// Returns whether a rotation happened. A missing file is not an error;
    /// there is simply nothing to rotate yet.
    pub fn rotate(&self, path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        // <name>.<keep> falls off; everything else moves up one slot.
        let _ = fs::remove_file(backup_path(path, self.keep));
        for slot in (1..self.keep).rev() {
            let from = backup_path(path, slot);
            if from.exists() {
                fs::rename(&from, backup_path(path, slot + 1))?;
            }
        }
        fs::rename(path, backup_path(path, 1))?;

        // Fresh empty live file for the next append.
        fs::File::create(path)?;
        Ok(true)
    }
}

/// Apply the default policy to every log the daemon writes under `home`.
///
/// Per-file failures are logged and skipped; one unrotatable log must not
/// stall the others.
pub fn rotate_logs(home: &Path) {
    let policy = RotationPolicy::default();
    for path in [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
        crate::paths::auto_sync_log_path(home),
    ] {
        match policy.rotate(&path) {
            Ok(true) => tracing::info!(path = %path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `daemon.log` → `daemon.log.2` for slot 2.
fn backup_path(base: &Path, slot: usize) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{slot}"));
    base.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
