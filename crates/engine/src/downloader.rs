//! Byte-range-resumable archive downloads.
//!
//! The physical file length is the authoritative resume offset: on every
//! run the downloader measures what is already on disk and asks the store
//! for the remainder. No separate offset bookkeeping can drift out of
//! sync with the data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use shoebox_drive::RangeStatus;
use shoebox_state::FileUnit;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::remote::ObjectStore;

/// Downloads source archives into a local directory.
pub struct Downloader {
    store: Arc<dyn ObjectStore>,
    download_dir: PathBuf,
}

impl Downloader {
    pub fn new(store: Arc<dyn ObjectStore>, download_dir: PathBuf) -> Self {
        Self {
            store,
            download_dir,
        }
    }

    /// Fetches one file, resuming from whatever is already on disk.
    ///
    /// On success `file.downloaded` is set and `file.local_path` points at
    /// a file of at least `expected_size` bytes. On any error the partial
    /// file is left in place for the next attempt.
    pub async fn download_file(
        &self,
        cancel: &CancellationToken,
        file: &mut FileUnit,
    ) -> Result<(), EngineError> {
        let local_path = self.download_dir.join(local_file_name(&file.name));
        file.local_path = Some(local_path.clone());

        let offset = match tokio::fs::metadata(&local_path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        file.bytes_transferred = offset;

        if file.expected_size > 0 && offset >= file.expected_size {
            debug!(name = %file.name, offset, "already fully downloaded");
            file.downloaded = true;
            return Ok(());
        }

        let dl = self.store.fetch_range(&file.source_id, offset).await?;
        if offset > 0 && dl.status == RangeStatus::Full {
            // Appending a from-zero body after `offset` bytes would corrupt
            // the file, so refuse rather than guess.
            return Err(EngineError::Protocol(format!(
                "store returned the full body for {} instead of the range from byte {offset}",
                file.name
            )));
        }

        let mut out = if offset > 0 {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&local_path)
                .await?
        } else {
            tokio::fs::File::create(&local_path).await?
        };

        let mut stream = dl.stream;
        loop {
            if cancel.is_cancelled() {
                out.flush().await?;
                return Err(EngineError::Cancelled);
            }
            let Some(chunk) = stream.next().await else {
                break;
            };
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            file.bytes_transferred += chunk.len() as u64;
        }
        out.flush().await?;
        out.sync_all().await?;

        if file.expected_size > 0 && file.bytes_transferred < file.expected_size {
            return Err(EngineError::Incomplete {
                expected: file.expected_size,
                actual: file.bytes_transferred,
            });
        }

        file.downloaded = true;
        info!(
            name = %file.name,
            bytes = file.bytes_transferred,
            resumed_from = offset,
            "download complete"
        );
        Ok(())
    }
}

/// Local file name for a source display name. Only the final path
/// component is used so a name with separators cannot escape the
/// download directory.
fn local_file_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("download.bin")
}
