//! Pipeline error types.

use thiserror::Error;

/// Errors surfaced by the import pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state error: {0}")]
    State(#[from] shoebox_state::StateError),

    #[error("source store error: {0}")]
    Source(#[from] shoebox_drive::DriveError),

    #[error("ingestion error: {0}")]
    Ingest(#[from] shoebox_ingest::IngestError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The remote side answered in a way that breaks resume semantics,
    /// e.g. a full-body response to a ranged request.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The stream ended before delivering the expected byte count.
    #[error("incomplete download: got {actual} of {expected} bytes")]
    Incomplete { expected: u64, actual: u64 },

    #[error("no resumable job found")]
    NoJob,

    /// Cooperative shutdown, not a failure. State is already persisted.
    #[error("operation cancelled")]
    Cancelled,
}
