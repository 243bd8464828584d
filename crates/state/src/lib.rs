//! Import job model and atomic on-disk checkpoint store.
//!
//! A [`Job`] is the full persisted record of one import run: the selected
//! source archives, their download progress, and the per-entry upload
//! ledger. The [`CheckpointStore`] is its sole persistence path and
//! guarantees that a crash mid-save never corrupts the record.

mod job;
mod paths;
mod store;

pub use job::{FileUnit, Job, JobStatus, UploadLedger, entry_key};
pub use paths::{app_data_dir, default_checkpoint_path};
pub use store::CheckpointStore;

/// Errors from state persistence.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk record exists but cannot be parsed. Deliberately distinct
    /// from the missing-record case: a corrupt checkpoint must surface, not
    /// silently restart the job from scratch.
    #[error("corrupt checkpoint: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("data directory not available")]
    NoDataDir,
}
