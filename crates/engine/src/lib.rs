//! Resumable import pipeline.
//!
//! This crate implements the **business logic** for moving a bounded set
//! of large archive files from the remote source store into the media
//! ingestion service, surviving interruption at any point. It is a library
//! crate with no UI or credential handling — callers provide
//! [`ObjectStore`]/[`AssetSink`] implementations (or the bundled
//! `drive`/`ingest` clients) and a checkpoint location.
//!
//! # Pipeline
//!
//! 1. **Download** — byte-range-resumable fetch of every selected archive
//! 2. **Import** — per-entry checkpointed upload of the media inside them
//!
//! Both phases are idempotent across process restarts: the persisted
//! [`Job`](shoebox_state::Job) record plus the physical download files are
//! the only state, so a crashed or cancelled run is resumed by simply
//! running again.

pub mod coordinator;
pub mod downloader;
pub mod error;
pub mod events;
pub mod importer;
pub mod media;
pub mod remote;

// Re-export primary types for convenience.
pub use coordinator::{Coordinator, RemoteArchive, RunOutcome};
pub use downloader::Downloader;
pub use error::EngineError;
pub use events::{ImportEvent, Phase};
pub use importer::{DEFAULT_CHECKPOINT_EVERY, Importer};
pub use media::{is_archive, is_media_file};
pub use remote::{AssetSink, ObjectStore};
