//! Seams between the pipeline and the outside world.
//!
//! The pipeline talks to the source store and the ingestion service only
//! through these traits, so tests can substitute in-memory fakes for the
//! HTTP clients.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use shoebox_drive::{DriveClient, DriveError, RangeDownload};
use shoebox_ingest::{IngestClient, IngestError, UploadOutcome};

/// Read side: ranged fetches from the source object store.
pub trait ObjectStore: Send + Sync {
    /// Opens a download of `source_id` starting at byte `start`.
    fn fetch_range<'a>(
        &'a self,
        source_id: &'a str,
        start: u64,
    ) -> Pin<Box<dyn Future<Output = Result<RangeDownload, DriveError>> + Send + 'a>>;
}

/// Write side: asset uploads to the ingestion service.
pub trait AssetSink: Send + Sync {
    fn upload_asset<'a>(
        &'a self,
        file_name: &'a str,
        data: Vec<u8>,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
        external_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UploadOutcome, IngestError>> + Send + 'a>>;
}

impl ObjectStore for DriveClient {
    fn fetch_range<'a>(
        &'a self,
        source_id: &'a str,
        start: u64,
    ) -> Pin<Box<dyn Future<Output = Result<RangeDownload, DriveError>> + Send + 'a>> {
        Box::pin(DriveClient::fetch_range(self, source_id, start))
    }
}

impl AssetSink for IngestClient {
    fn upload_asset<'a>(
        &'a self,
        file_name: &'a str,
        data: Vec<u8>,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
        external_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UploadOutcome, IngestError>> + Send + 'a>> {
        Box::pin(IngestClient::upload_asset(
            self,
            file_name,
            data,
            created_at,
            modified_at,
            external_id,
        ))
    }
}
