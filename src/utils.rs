//! Utility functions for file names and file operations

use std::path::Path;
use std::time::Duration;

/// Video container extensions treated as media members
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "m4v"];

/// Check if a path names a media file by extension (case-insensitive)
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use debridarr::utils::is_media_file;
///
/// assert!(is_media_file(Path::new("/Movie (2024)/movie.MKV")));
/// assert!(!is_media_file(Path::new("/Movie (2024)/movie.nfo")));
/// ```
#[must_use]
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
        .unwrap_or(false)
}

/// Check if a path appears to be a sample file or folder
///
/// Detects sample files/folders using common naming patterns:
/// - Folders named "sample", "samples", "proof"
/// - Files with "sample" anywhere in the name
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use debridarr::utils::is_sample;
///
/// assert!(is_sample(Path::new("/Movie/Sample")));
/// assert!(is_sample(Path::new("/Movie/movie-sample.mkv")));
/// assert!(!is_sample(Path::new("/Movie/movie.mkv")));
/// ```
#[must_use]
pub fn is_sample(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    const SAMPLE_PATTERNS: &[&str] = &["sample", "samples", "proof", "proofs"];

    if SAMPLE_PATTERNS.iter().any(|&pattern| name == pattern) {
        return true;
    }

    name.contains("sample")
}

/// File name without its last extension
///
/// Used to turn an expected filename or a descriptor name into the release
/// title understood by the upstream catalogs.
///
/// # Examples
///
/// ```
/// use debridarr::utils::strip_extension;
///
/// assert_eq!(strip_extension("movie.mkv"), "movie");
/// assert_eq!(strip_extension("Show.S01E01.1080p.mkv"), "Show.S01E01.1080p");
/// assert_eq!(strip_extension("noext"), "noext");
/// ```
#[must_use]
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Delete a file, retrying while the deletion is transiently blocked
///
/// An already-absent file counts as deleted. Returns the last error once
/// `attempts` tries have failed.
pub async fn delete_file_with_retry(
    path: &Path,
    attempts: u32,
    delay: Duration,
) -> std::io::Result<()> {
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), attempt, "deleted file");
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "file already gone");
                return Ok(());
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    attempt,
                    max_attempts = attempts,
                    "failed to delete file, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    attempts,
                    "giving up deleting file"
                );
                return Err(e);
            }
        }
    }
}
