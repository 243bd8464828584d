//! Media ingestion service client.
//!
//! Uploads extracted media as multipart assets. The destination dedupes on
//! the caller-supplied external id; an asset it already holds is reported
//! back as [`UploadOutcome::Duplicate`], which callers treat as success.

mod client;

pub use client::{IngestClient, UploadOutcome};

/// Errors from the ingestion service client.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}
