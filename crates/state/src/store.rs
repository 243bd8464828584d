//! Durable, atomic persistence of one job record.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::{Job, StateError};

/// Persists a [`Job`] as a single JSON record on disk.
///
/// Saves go through a temporary file followed by a rename, so a crash
/// mid-write leaves either the previous record or the new one — never a
/// half-written record. The record may carry credentials-adjacent data, so
/// the containing directory is created owner-only.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Creates a store backed by `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the record path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted job.
    ///
    /// A missing record is `Ok(None)`. A malformed record is an error: it
    /// must not be mistaken for the absence of a job.
    pub fn load(&self) -> Result<Option<Job>, StateError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let job: Job = serde_json::from_str(&data)?;
        debug!(id = %job.id, status = ?job.status, "loaded checkpoint");
        Ok(Some(job))
    }

    /// Writes the job to disk, refreshing `updated_at`.
    pub fn save(&self, job: &mut Job) -> Result<(), StateError> {
        job.updated_at = Utc::now();

        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }

        let json = serde_json::to_string_pretty(job)?;
        let tmp = self.path.with_extension("json.tmp");
        write_private_file(&tmp, json.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(id = %job.id, status = ?job.status, path = ?self.path, "persisted checkpoint");
        Ok(())
    }

    /// Removes the record. Removing an absent record is not an error.
    pub fn clear(&self) -> Result<(), StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(unix)]
fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}
