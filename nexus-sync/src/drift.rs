//! Drift detection — has a target's config changed outside our control?
//!
//! A successful sync records the SHA-256 of the bytes it wrote. Drift is a
//! plain checksum mismatch between that record and the file's current bytes:
//! no semantic diffing, a single unmanaged byte is enough. Drift never blocks
//! propagation; it is surfaced as a warning alongside normal status.

use std::path::Path;

use sha2::{Digest, Sha256};

use nexus_core::types::TargetId;
use nexus_detector::config_path_at;

/// SHA-256 hex digest of `content`.
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Whether a target's config drifted from its recorded state.
///
/// `current` is the checksum of the config as it stands now (`None` when the
/// file is absent or unreadable); `recorded` is the checksum stored at the
/// last successful sync. With nothing recorded there is nothing to drift
/// from; with something recorded, a missing file counts as drift just like a
/// mismatch does.
pub fn is_drifted(current: Option<&str>, recorded: Option<&str>) -> bool {
    match (current, recorded) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(cur), Some(rec)) => cur != rec,
    }
}

/// Checksum of `target`'s config file under `home`, `None` when the file is
/// missing or unreadable.
pub fn current_checksum_at(home: &Path, target: TargetId) -> Option<String> {
    let path = config_path_at(home, target);
    std::fs::read(&path).ok().map(|bytes| checksum(&bytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        let a = checksum(b"hello");
        assert_eq!(a, checksum(b"hello"));
        assert_ne!(a, checksum(b"hello "));
        assert_eq!(a.len(), 64, "sha256 hex digest");
    }

    #[test]
    fn no_record_means_no_drift() {
        assert!(!is_drifted(None, None));
        assert!(!is_drifted(Some("abc"), None));
    }

    #[test]
    fn missing_file_with_record_is_drift() {
        assert!(is_drifted(None, Some("abc")));
    }

    #[test]
    fn mismatch_is_drift_and_match_is_not() {
        assert!(is_drifted(Some("abc"), Some("def")));
        assert!(!is_drifted(Some("abc"), Some("abc")));
    }

    #[test]
    fn current_checksum_reads_the_config_location() {
        use nexus_core::types::TargetId;
        let home = tempfile::TempDir::new().expect("tempdir");
        assert!(current_checksum_at(home.path(), TargetId::Cursor).is_none());

        let path = config_path_at(home.path(), TargetId::Cursor);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, b"{}").expect("write");
        assert_eq!(
            current_checksum_at(home.path(), TargetId::Cursor),
            Some(checksum(b"{}")),
        );
    }
}
