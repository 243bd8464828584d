//! Per-entry checkpointed upload of downloaded archives.
//!
//! Each media entry inside each archive is uploaded at most once per
//! successful attempt: completion is recorded in the job ledger under a
//! composite `archive:entry` key and the ledger is checkpointed on a
//! fixed cadence, so a restart replays nothing that already landed.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use shoebox_state::{CheckpointStore, Job, entry_key};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::EngineError;
use crate::events::{ImportEvent, Phase, emit};
use crate::media::{is_archive, is_media_file};
use crate::remote::AssetSink;

/// Checkpoint after this many newly completed entries.
pub const DEFAULT_CHECKPOINT_EVERY: u64 = 100;

/// One uploadable entry found while scanning an archive.
struct ArchiveEntry {
    index: usize,
    name: String,
    modified: DateTime<Utc>,
}

/// Uploads the media inside downloaded archives.
pub struct Importer {
    sink: Arc<dyn AssetSink>,
    checkpoint_every: u64,
}

impl Importer {
    pub fn new(sink: Arc<dyn AssetSink>) -> Self {
        Self {
            sink,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        }
    }

    pub fn with_checkpoint_every(mut self, every: u64) -> Self {
        self.checkpoint_every = every.max(1);
        self
    }

    /// Processes every downloaded archive of `job` in order.
    ///
    /// Individual entry failures are logged and skipped; only archive-level
    /// and infrastructure errors abort the run.
    pub async fn import_all(
        &self,
        cancel: &CancellationToken,
        job: &mut Job,
        checkpoint: &CheckpointStore,
        events: &mpsc::Sender<ImportEvent>,
    ) -> Result<(), EngineError> {
        for idx in 0..job.files.len() {
            let (downloaded, name, local_path) = {
                let f = &job.files[idx];
                (f.downloaded, f.name.clone(), f.local_path.clone())
            };
            if !downloaded {
                continue;
            }
            let Some(local_path) = local_path else {
                continue;
            };
            if !is_archive(&name) {
                debug!(name, "not an archive, nothing to import");
                continue;
            }
            self.process_archive(cancel, &local_path, job, checkpoint, events)
                .await?;
        }
        Ok(())
    }

    async fn process_archive(
        &self,
        cancel: &CancellationToken,
        archive_path: &Path,
        job: &mut Job,
        checkpoint: &CheckpointStore,
        events: &mpsc::Sender<ImportEvent>,
    ) -> Result<(), EngineError> {
        let entries = scan_archive(archive_path).await?;
        let path_key = archive_path.to_string_lossy().into_owned();

        {
            let ledger = job.ledger_mut();
            // Count each archive's entries into the total exactly once,
            // even across restarts.
            if ledger.mark_counted(&path_key) {
                ledger.add_total(entries.len() as u64);
            }
        }
        info!(
            archive = %path_key,
            entries = entries.len(),
            "importing archive"
        );

        let mut archive = open_archive(archive_path).await?;

        for entry in entries {
            if cancel.is_cancelled() {
                checkpoint.save(job)?;
                return Err(EngineError::Cancelled);
            }

            let key = entry_key(&path_key, &entry.name);
            if job.ledger_mut().is_completed(&key) {
                continue;
            }

            {
                let ledger = job.ledger_mut();
                emit(
                    events,
                    ImportEvent::Progress {
                        phase: Phase::Uploading,
                        completed: ledger.completed_entries,
                        total: ledger.total_entries,
                        current_item: entry.name.clone(),
                    },
                );
            }

            let index = entry.index;
            let (returned, read) = tokio::task::spawn_blocking(move || {
                let mut archive = archive;
                let read = read_entry(&mut archive, index);
                (archive, read)
            })
            .await?;
            archive = returned;

            let data = match read {
                Ok(data) => data,
                Err(e) => {
                    warn!(entry = %entry.name, error = %e, "unreadable entry, skipping");
                    continue;
                }
            };

            let id = external_id(&data);
            let upload = self
                .sink
                .upload_asset(base_name(&entry.name), data, entry.modified, entry.modified, &id)
                .await;
            match upload {
                Ok(outcome) => {
                    debug!(entry = %entry.name, ?outcome, "entry imported");
                    let ledger = job.ledger_mut();
                    ledger.record_completed(&key);
                    if ledger.completed_entries % self.checkpoint_every == 0 {
                        checkpoint.save(job)?;
                    }
                }
                Err(e) => {
                    // Left out of the ledger so the next run retries it.
                    warn!(entry = %entry.name, error = %e, "upload failed, continuing");
                }
            }
        }

        checkpoint.save(job)?;
        Ok(())
    }
}

/// Lists the media entries of the archive without decompressing them.
async fn scan_archive(path: &Path) -> Result<Vec<ArchiveEntry>, EngineError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut archive = ZipArchive::new(File::open(&path)?)?;
        let mut entries = Vec::new();
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if entry.is_dir() || !is_media_file(entry.name()) {
                continue;
            }
            entries.push(ArchiveEntry {
                index,
                name: entry.name().to_string(),
                modified: entry_mtime(entry.last_modified()),
            });
        }
        Ok(entries)
    })
    .await?
}

async fn open_archive(path: &Path) -> Result<ZipArchive<File>, EngineError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || Ok(ZipArchive::new(File::open(&path)?)?)).await?
}

fn read_entry(archive: &mut ZipArchive<File>, index: usize) -> Result<Vec<u8>, EngineError> {
    use std::io::Read;
    let mut entry = archive.by_index(index)?;
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(data)
}

/// Stable content-derived identifier for destination-side deduplication.
fn external_id(data: &[u8]) -> String {
    let prefix = &data[..data.len().min(32)];
    format!("import-{}", hex::encode(prefix))
}

fn base_name(entry_name: &str) -> &str {
    Path::new(entry_name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(entry_name)
}

/// Archive timestamps use 1980-01-01 00:00:00 as a "not recorded"
/// sentinel; fall back to now rather than importing everything as 1980.
fn entry_mtime(dt: zip::DateTime) -> DateTime<Utc> {
    let is_sentinel = dt.year() == 1980
        && dt.month() == 1
        && dt.day() == 1
        && dt.hour() == 0
        && dt.minute() == 0
        && dt.second() == 0;
    if is_sentinel {
        return Utc::now();
    }
    Utc.with_ymd_and_hms(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )
    .single()
    .unwrap_or_else(Utc::now)
}
