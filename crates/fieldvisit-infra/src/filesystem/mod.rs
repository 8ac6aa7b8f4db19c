//! Filesystem adapters.
//!
//! Data-directory resolution, MIME detection for attachments read from disk,
//! and a directory-backed `AttachmentUploader`.

pub mod uploader;

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "FIELDVISIT_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `FIELDVISIT_DATA_DIR` environment variable
/// 2. `~/.fieldvisit`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".fieldvisit");
    }

    PathBuf::from(".fieldvisit")
}

/// Detect a MIME type from a file name's extension.
///
/// Covers what field crews attach: photos, scanned forms, audio notes and
/// spreadsheets. Unknown extensions map to `application/octet-stream`.
pub fn detect_mime(filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "svg" => "image/svg+xml",

        // Documents
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "json" => "application/json",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",

        // Audio
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",

        _ => "application/octet-stream",
    }
    .to_string()
}
