//! Source object store client.
//!
//! Async HTTP client for the Drive-style store holding the user's archive
//! export: paginated listing of candidate archives and byte-range media
//! fetches for resumable downloads. Authentication is an externally
//! acquired bearer token; the OAuth flow itself lives outside this crate.

mod client;
mod types;

pub use client::{DriveClient, RangeDownload, RangeStatus};
pub use types::DriveFile;

/// Errors from the source store client.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
}
