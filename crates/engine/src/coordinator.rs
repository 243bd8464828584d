//! Job lifecycle: selection, phase ordering, persistence, cancellation.

use std::path::PathBuf;
use std::sync::Arc;

use shoebox_state::{CheckpointStore, Job, JobStatus, StateError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::downloader::Downloader;
use crate::error::EngineError;
use crate::events::{ImportEvent, Phase, emit};
use crate::importer::Importer;
use crate::remote::{AssetSink, ObjectStore};

/// One archive chosen from the source store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArchive {
    pub source_id: String,
    pub name: String,
    pub size: u64,
}

/// How a run ended. Cancellation is an outcome, not an error: state is
/// persisted and a later run resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Cancelled,
}

const EVENT_BUFFER: usize = 256;

/// Drives a job through download and upload to completion.
pub struct Coordinator {
    checkpoint: CheckpointStore,
    downloader: Downloader,
    importer: Importer,
    events_tx: mpsc::Sender<ImportEvent>,
    events_rx: Option<mpsc::Receiver<ImportEvent>>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn AssetSink>,
        checkpoint: CheckpointStore,
        download_dir: PathBuf,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            checkpoint,
            downloader: Downloader::new(store, download_dir),
            importer: Importer::new(sink),
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_checkpoint_every(mut self, every: u64) -> Self {
        self.importer = self.importer.with_checkpoint_every(every);
        self
    }

    /// Takes the receiving end of the progress events. Can only be
    /// taken once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ImportEvent>> {
        self.events_rx.take()
    }

    /// Token a front end can use to request cooperative shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The persisted job, if any.
    pub fn job(&self) -> Result<Option<Job>, StateError> {
        self.checkpoint.load()
    }

    /// Discards all persisted job state.
    pub fn reset(&self) -> Result<(), StateError> {
        self.checkpoint.clear()
    }

    /// Starts (or extends) a job with `selection` and runs it to the end.
    ///
    /// An existing unfinished job keeps its progress; archives already in
    /// it are not added twice.
    pub async fn start(&self, selection: &[RemoteArchive]) -> Result<RunOutcome, EngineError> {
        let mut job = match self.checkpoint.load()? {
            Some(job) if job.status != JobStatus::Complete => job,
            _ => Job::new(),
        };
        for archive in selection {
            job.add_file(&archive.source_id, &archive.name, archive.size);
        }
        info!(id = %job.id, files = job.files.len(), "starting import job");
        self.run(job).await
    }

    /// Resumes the persisted job from wherever it stopped.
    pub async fn resume(&self) -> Result<RunOutcome, EngineError> {
        let job = self.checkpoint.load()?.ok_or(EngineError::NoJob)?;
        if job.status == JobStatus::Complete {
            info!(id = %job.id, "job already complete");
            return Ok(RunOutcome::Complete);
        }
        info!(id = %job.id, status = ?job.status, "resuming import job");
        self.run(job).await
    }

    async fn run(&self, mut job: Job) -> Result<RunOutcome, EngineError> {
        match self.run_phases(&mut job).await {
            Ok(()) => {
                job.status = JobStatus::Complete;
                job.last_error = None;
                self.checkpoint.save(&mut job)?;
                emit(&self.events_tx, ImportEvent::Completed);
                info!(id = %job.id, "import complete");
                Ok(RunOutcome::Complete)
            }
            Err(EngineError::Cancelled) => {
                job.status = JobStatus::Cancelled;
                self.checkpoint.save(&mut job)?;
                info!(id = %job.id, "import cancelled, progress persisted");
                Ok(RunOutcome::Cancelled)
            }
            Err(e) => {
                job.status = JobStatus::Error;
                job.last_error = Some(e.to_string());
                self.checkpoint.save(&mut job)?;
                emit(
                    &self.events_tx,
                    ImportEvent::Failed {
                        error: e.to_string(),
                    },
                );
                error!(id = %job.id, error = %e, "import failed");
                Err(e)
            }
        }
    }

    async fn run_phases(&self, job: &mut Job) -> Result<(), EngineError> {
        job.status = JobStatus::Downloading;
        self.checkpoint.save(job)?;

        let total = job.files.len() as u64;
        for idx in 0..job.files.len() {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if job.files[idx].downloaded {
                continue;
            }
            emit(
                &self.events_tx,
                ImportEvent::Progress {
                    phase: Phase::Downloading,
                    completed: idx as u64,
                    total,
                    current_item: job.files[idx].name.clone(),
                },
            );
            self.downloader
                .download_file(&self.cancel, &mut job.files[idx])
                .await?;
            // Persist after every file so a crash redownloads nothing.
            self.checkpoint.save(job)?;
        }

        job.status = JobStatus::Uploading;
        self.checkpoint.save(job)?;
        self.importer
            .import_all(&self.cancel, job, &self.checkpoint, &self.events_tx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{DateTime, Utc};
    use futures_util::stream;
    use shoebox_drive::{DriveError, RangeDownload, RangeStatus};
    use shoebox_ingest::{IngestError, UploadOutcome};
    use std::collections::HashMap;
    use std::future::Future;
    use std::io::Write;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Store serving whole objects from memory, honoring ranges.
    struct FakeStore {
        objects: HashMap<String, Vec<u8>>,
        fail: bool,
    }

    impl FakeStore {
        fn new(objects: HashMap<String, Vec<u8>>) -> Self {
            Self {
                objects,
                fail: false,
            }
        }
    }

    impl ObjectStore for FakeStore {
        fn fetch_range<'a>(
            &'a self,
            source_id: &'a str,
            start: u64,
        ) -> Pin<Box<dyn Future<Output = Result<RangeDownload, DriveError>> + Send + 'a>> {
            Box::pin(async move {
                if self.fail {
                    return Err(DriveError::Api {
                        status: 503,
                        body: "unavailable".into(),
                    });
                }
                let data = &self.objects[source_id];
                let (status, body) = if start > 0 {
                    (RangeStatus::Partial, data[start as usize..].to_vec())
                } else {
                    (RangeStatus::Full, data.clone())
                };
                Ok(RangeDownload {
                    status,
                    stream: Box::pin(stream::iter(vec![Ok(Bytes::from(body))])),
                })
            })
        }
    }

    #[derive(Default)]
    struct FakeSink {
        uploads: Mutex<Vec<String>>,
    }

    impl AssetSink for FakeSink {
        fn upload_asset<'a>(
            &'a self,
            file_name: &'a str,
            _data: Vec<u8>,
            _created_at: DateTime<Utc>,
            _modified_at: DateTime<Utc>,
            _external_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<UploadOutcome, IngestError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.uploads.lock().unwrap().push(file_name.to_string());
                Ok(UploadOutcome::Uploaded)
            })
        }
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::FileOptions::default();
            for (name, data) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn coordinator(
        tmp: &tempfile::TempDir,
        store: FakeStore,
        sink: Arc<FakeSink>,
    ) -> Coordinator {
        Coordinator::new(
            Arc::new(store),
            sink,
            CheckpointStore::new(tmp.path().join("state").join("job.json")),
            tmp.path().join("downloads"),
        )
    }

    fn selection(archive: &[u8]) -> (FakeStore, Vec<RemoteArchive>) {
        let store = FakeStore::new(HashMap::from([("src-1".to_string(), archive.to_vec())]));
        let sel = vec![RemoteArchive {
            source_id: "src-1".into(),
            name: "takeout-001.zip".into(),
            size: archive.len() as u64,
        }];
        (store, sel)
    }

    #[tokio::test]
    async fn full_pipeline_downloads_then_uploads() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("downloads")).unwrap();
        let archive = zip_bytes(&[("a.jpg", b"AAAA"), ("b.jpg", b"BBBB"), ("skip.json", b"{}")]);
        let (store, sel) = selection(&archive);
        let sink = Arc::new(FakeSink::default());
        let coord = coordinator(&tmp, store, sink.clone());

        let outcome = coord.start(&sel).await.unwrap();
        assert_eq!(outcome, RunOutcome::Complete);
        assert_eq!(*sink.uploads.lock().unwrap(), vec!["a.jpg", "b.jpg"]);

        let job = coord.job().unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.last_error.is_none());
        assert!(job.files[0].downloaded);
        let ledger = job.upload_progress.unwrap();
        assert_eq!(ledger.completed_entries, 2);
        assert_eq!(ledger.total_entries, 2);
    }

    #[tokio::test]
    async fn source_failure_persists_error_and_resume_recovers() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("downloads")).unwrap();
        let archive = zip_bytes(&[("a.jpg", b"AAAA")]);
        let (mut store, sel) = selection(&archive);
        store.fail = true;
        let sink = Arc::new(FakeSink::default());
        let coord = coordinator(&tmp, store, sink.clone());

        let err = coord.start(&sel).await.unwrap_err();
        assert!(matches!(err, EngineError::Source(_)));
        let job = coord.job().unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.last_error.is_some());

        // Same checkpoint, healthy store: resume finishes the job.
        let (store, _) = selection(&archive);
        let coord = coordinator(&tmp, store, sink.clone());
        let outcome = coord.resume().await.unwrap();
        assert_eq!(outcome, RunOutcome::Complete);
        let job = coord.job().unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.last_error.is_none());
        assert_eq!(*sink.uploads.lock().unwrap(), vec!["a.jpg"]);
    }

    #[tokio::test]
    async fn resume_after_interrupted_upload_skips_completed_entries() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("downloads")).unwrap();
        let archive = zip_bytes(&[("a.jpg", b"AAAA"), ("b.jpg", b"BBBB")]);

        // First run to completion, then hand-edit the checkpoint back to
        // an interrupted shape: one entry done, status uploading.
        let (store, sel) = selection(&archive);
        let sink = Arc::new(FakeSink::default());
        let coord = coordinator(&tmp, store, sink.clone());
        coord.start(&sel).await.unwrap();

        let mut job = coord.job().unwrap().unwrap();
        job.status = JobStatus::Uploading;
        let archive_key = job.files[0].local_path.clone().unwrap();
        let ledger = job.ledger_mut();
        ledger.completed_keys.remove(&shoebox_state::entry_key(
            &archive_key.to_string_lossy(),
            "b.jpg",
        ));
        ledger.completed_entries = 1;
        CheckpointStore::new(tmp.path().join("state").join("job.json"))
            .save(&mut job)
            .unwrap();

        let (store, _) = selection(&archive);
        let sink2 = Arc::new(FakeSink::default());
        let coord = coordinator(&tmp, store, sink2.clone());
        let outcome = coord.resume().await.unwrap();

        assert_eq!(outcome, RunOutcome::Complete);
        // Only the missing entry went out; the total was not re-counted.
        assert_eq!(*sink2.uploads.lock().unwrap(), vec!["b.jpg"]);
        let job = coord.job().unwrap().unwrap();
        let ledger = job.upload_progress.unwrap();
        assert_eq!(ledger.total_entries, 2);
        assert_eq!(ledger.completed_entries, 2);
    }

    #[tokio::test]
    async fn cancellation_is_an_outcome_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("downloads")).unwrap();
        let archive = zip_bytes(&[("a.jpg", b"AAAA")]);
        let (store, sel) = selection(&archive);
        let coord = coordinator(&tmp, store, Arc::new(FakeSink::default()));

        coord.cancel_token().cancel();
        let outcome = coord.start(&sel).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        let job = coord.job().unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn resume_without_job_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FakeStore::new(HashMap::new());
        let coord = coordinator(&tmp, store, Arc::new(FakeSink::default()));
        let err = coord.resume().await.unwrap_err();
        assert!(matches!(err, EngineError::NoJob));
    }

    #[tokio::test]
    async fn resume_of_complete_job_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("downloads")).unwrap();
        let archive = zip_bytes(&[("a.jpg", b"AAAA")]);
        let (store, sel) = selection(&archive);
        let sink = Arc::new(FakeSink::default());
        let coord = coordinator(&tmp, store, sink.clone());
        coord.start(&sel).await.unwrap();

        let outcome = coord.resume().await.unwrap();
        assert_eq!(outcome, RunOutcome::Complete);
        // No second round of uploads.
        assert_eq!(sink.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_after_complete_begins_a_fresh_job() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("downloads")).unwrap();
        let archive = zip_bytes(&[("a.jpg", b"AAAA")]);
        let (store, sel) = selection(&archive);
        let sink = Arc::new(FakeSink::default());
        let coord = coordinator(&tmp, store, sink.clone());
        coord.start(&sel).await.unwrap();
        let first_id = coord.job().unwrap().unwrap().id;

        let (store, sel) = selection(&archive);
        let coord = coordinator(&tmp, store, sink.clone());
        coord.start(&sel).await.unwrap();
        let second_id = coord.job().unwrap().unwrap().id;
        assert_ne!(first_id, second_id);
    }

    #[tokio::test]
    async fn progress_events_cover_both_phases() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("downloads")).unwrap();
        let archive = zip_bytes(&[("a.jpg", b"AAAA")]);
        let (store, sel) = selection(&archive);
        let mut coord = coordinator(&tmp, store, Arc::new(FakeSink::default()));
        let mut rx = coord.take_events().unwrap();
        assert!(coord.take_events().is_none());

        coord.start(&sel).await.unwrap();

        let mut phases = Vec::new();
        let mut completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ImportEvent::Progress { phase, .. } => phases.push(phase),
                ImportEvent::Completed => completed = true,
                ImportEvent::Failed { .. } => panic!("unexpected failure event"),
            }
        }
        assert!(phases.contains(&Phase::Downloading));
        assert!(phases.contains(&Phase::Uploading));
        assert!(completed);
    }
}
