//! File-name classification for archive contents.

use std::path::Path;

/// Extensions the ingestion service accepts. Everything else in an
/// archive (JSON sidecars, HTML indexes) is skipped without counting.
const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "avif", "mp4", "mov", "avi", "mkv",
    "webm", "m4v", "3gp", "raw", "cr2", "nef", "arw", "dng", "orf", "rw2",
];

/// Returns `true` if `name` has a recognized media extension.
pub fn is_media_file(name: &str) -> bool {
    let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    MEDIA_EXTENSIONS.contains(&ext.as_str())
}

/// Returns `true` if `name` looks like a zip archive.
pub fn is_archive(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}
