//! Job, file, and upload-ledger state.
//!
//! Field names mirror the on-disk JSON record (camelCase). New fields must
//! be `#[serde(default)]` so older records keep loading.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an import job.
///
/// `Idle` and `Complete` are resting states a fresh selection can start
/// from; `Error` and `Cancelled` are resting states a rerun resumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Downloading,
    Uploading,
    Complete,
    Error,
    Cancelled,
}

/// One source archive and its download progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUnit {
    /// Identifier in the remote store (immutable key).
    pub source_id: String,
    /// Display name, also used as the local file name.
    pub name: String,
    /// Total byte size reported by the remote store (0 if unknown).
    #[serde(default)]
    pub expected_size: u64,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Bytes materialized locally. The physical file length is the
    /// authoritative resume offset; this field trails it for reporting.
    #[serde(default)]
    pub bytes_transferred: u64,
}

/// Completed-entry tracking for the upload phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLedger {
    #[serde(default)]
    pub total_entries: u64,
    #[serde(default)]
    pub completed_entries: u64,
    /// Composite `archive_path:entry_name` keys, inserted exactly once.
    #[serde(default)]
    pub completed_keys: BTreeSet<String>,
    /// Archives whose entry count has already been added to
    /// `total_entries`. Guards against re-counting on resume.
    #[serde(default)]
    pub counted_archives: BTreeSet<String>,
}

impl UploadLedger {
    /// Returns `true` if the entry was already uploaded.
    pub fn is_completed(&self, key: &str) -> bool {
        self.completed_keys.contains(key)
    }

    /// Records a completed entry. Increments `completed_entries` only on
    /// first insertion, so it always equals `completed_keys.len()`.
    pub fn record_completed(&mut self, key: &str) {
        if self.completed_keys.insert(key.to_string()) {
            self.completed_entries += 1;
        }
    }

    /// Marks an archive as counted. Returns `true` the first time, after
    /// which the caller must not add its entries to `total_entries` again.
    pub fn mark_counted(&mut self, archive_path: &str) -> bool {
        self.counted_archives.insert(archive_path.to_string())
    }

    pub fn add_total(&mut self, entries: u64) {
        self.total_entries += entries;
    }
}

/// Composite key identifying one entry of one archive.
pub fn entry_key(archive_path: &str, entry_name: &str) -> String {
    format!("{archive_path}:{entry_name}")
}

/// The full persisted record of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Insertion order = selection order; unique by `source_id`.
    #[serde(default)]
    pub files: Vec<FileUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_progress: Option<UploadLedger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a fresh idle job.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Idle,
            files: Vec::new(),
            upload_progress: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a file to track. A `source_id` already present is ignored.
    pub fn add_file(&mut self, source_id: &str, name: &str, expected_size: u64) {
        if self.files.iter().any(|f| f.source_id == source_id) {
            return;
        }
        self.files.push(FileUnit {
            source_id: source_id.to_string(),
            name: name.to_string(),
            expected_size,
            downloaded: false,
            local_path: None,
            bytes_transferred: 0,
        });
    }

    /// Returns the upload ledger, creating it on first use.
    pub fn ledger_mut(&mut self) -> &mut UploadLedger {
        self.upload_progress.get_or_insert_with(UploadLedger::default)
    }

    /// Byte-weighted download progress in `0.0..=100.0`.
    pub fn download_progress(&self) -> f64 {
        let mut total: u64 = 0;
        let mut done: u64 = 0;
        for f in &self.files {
            total += f.expected_size;
            done += if f.downloaded {
                f.expected_size
            } else {
                f.bytes_transferred
            };
        }
        if total == 0 {
            return 0.0;
        }
        done as f64 / total as f64 * 100.0
    }

    /// Entry-ratio upload progress in `0.0..=100.0`.
    pub fn upload_progress_pct(&self) -> f64 {
        match &self.upload_progress {
            Some(l) if l.total_entries > 0 => {
                l.completed_entries as f64 / l.total_entries as f64 * 100.0
            }
            _ => 0.0,
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_idle_and_empty() {
        let job = Job::new();
        assert_eq!(job.status, JobStatus::Idle);
        assert!(job.files.is_empty());
        assert!(job.upload_progress.is_none());
        assert!(job.last_error.is_none());
        assert!(!job.id.is_empty());
    }

    #[test]
    fn add_file_dedupes_by_source_id() {
        let mut job = Job::new();
        job.add_file("id-1", "takeout-001.zip", 100);
        job.add_file("id-2", "takeout-002.zip", 200);
        job.add_file("id-1", "takeout-001-renamed.zip", 999);

        assert_eq!(job.files.len(), 2);
        assert_eq!(job.files[0].name, "takeout-001.zip");
        assert_eq!(job.files[0].expected_size, 100);
    }

    #[test]
    fn add_file_preserves_selection_order() {
        let mut job = Job::new();
        job.add_file("c", "c.zip", 1);
        job.add_file("a", "a.zip", 1);
        job.add_file("b", "b.zip", 1);

        let ids: Vec<&str> = job.files.iter().map(|f| f.source_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn ledger_record_completed_is_idempotent() {
        let mut ledger = UploadLedger::default();
        ledger.record_completed("a.zip:1.jpg");
        ledger.record_completed("a.zip:1.jpg");
        ledger.record_completed("a.zip:2.jpg");

        assert_eq!(ledger.completed_entries, 2);
        assert_eq!(ledger.completed_entries, ledger.completed_keys.len() as u64);
        assert!(ledger.is_completed("a.zip:1.jpg"));
        assert!(!ledger.is_completed("a.zip:3.jpg"));
    }

    #[test]
    fn ledger_counts_archive_once() {
        let mut ledger = UploadLedger::default();
        assert!(ledger.mark_counted("/tmp/a.zip"));
        ledger.add_total(20);
        // Second pass over the same archive must not inflate the total.
        assert!(!ledger.mark_counted("/tmp/a.zip"));
        assert_eq!(ledger.total_entries, 20);
    }

    #[test]
    fn entry_key_format() {
        assert_eq!(entry_key("/d/a.zip", "Photos/1.jpg"), "/d/a.zip:Photos/1.jpg");
    }

    #[test]
    fn download_progress_weights_by_bytes() {
        let mut job = Job::new();
        job.add_file("a", "a.zip", 100);
        job.add_file("b", "b.zip", 300);
        job.files[0].downloaded = true;
        job.files[1].bytes_transferred = 100;

        assert_eq!(job.download_progress(), 50.0);
    }

    #[test]
    fn download_progress_empty_is_zero() {
        assert_eq!(Job::new().download_progress(), 0.0);
        let mut job = Job::new();
        job.add_file("a", "a.zip", 0);
        assert_eq!(job.download_progress(), 0.0);
    }

    #[test]
    fn upload_progress_pct() {
        let mut job = Job::new();
        assert_eq!(job.upload_progress_pct(), 0.0);

        let ledger = job.ledger_mut();
        ledger.add_total(4);
        ledger.record_completed("a.zip:1.jpg");
        assert_eq!(job.upload_progress_pct(), 25.0);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
        let back: JobStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(back, JobStatus::Cancelled);
    }

    #[test]
    fn record_without_new_ledger_fields_loads() {
        // An older record predating countedArchives.
        let json = r#"{
            "totalEntries": 3,
            "completedEntries": 1,
            "completedKeys": ["a.zip:1.jpg"]
        }"#;
        let ledger: UploadLedger = serde_json::from_str(json).unwrap();
        assert_eq!(ledger.total_entries, 3);
        assert!(ledger.counted_archives.is_empty());
    }
}
