//! Progress events emitted by the pipeline.

use tokio::sync::mpsc;

/// Which phase of the pipeline a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Downloading,
    Uploading,
}

/// Event stream consumed by a UI or CLI front end.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    Progress {
        phase: Phase,
        /// Units completed so far: files for downloads, entries for uploads.
        completed: u64,
        total: u64,
        current_item: String,
    },
    Completed,
    Failed {
        error: String,
    },
}

/// Sends without waiting. A slow or absent consumer loses events; the
/// pipeline must never stall on reporting.
pub(crate) fn emit(tx: &mpsc::Sender<ImportEvent>, event: ImportEvent) {
    let _ = tx.try_send(event);
}
