//! # nexus-sync
//!
//! Propagation engine: renders registry servers into each client's config
//! format, writes atomically with backups, and folds outcomes back into the
//! registry.
//!
//! Call [`pipeline::run_at`] for a full pass, or [`executor::sync_target_at`]
//! to sync one target without recording outcomes. Status views, drift
//! checksums, config diffs, and reverse import all live here too so the CLI
//! and daemon share one implementation.

pub mod diff;
pub mod drift;
pub mod error;
pub mod executor;
pub mod import;
pub mod pipeline;
pub mod status;
pub mod transform;

pub use diff::{diff_all_at, diff_target_at, TargetDiff};
pub use drift::{checksum, current_checksum_at, is_drifted};
pub use error::SyncError;
pub use executor::{
    classify, record_outcomes_at, sync_all_at, sync_target_at, SyncOutcome, SyncSummary,
};
pub use import::{import_from_target_at, ImportReport};
pub use pipeline::{run_at, SyncScope};
pub use status::{merged_view_at, SyncSignal, TargetStatus};
pub use transform::manual_config;
