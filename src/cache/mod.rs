//! On-disk snapshots fed to `git diff --no-index`.

pub mod buffer;
pub mod target;

pub use buffer::BufferCache;
pub use target::TargetCache;

use crate::config::APP_NAME;
use crate::error::{GutterError, Result};
use log::{debug, warn};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

/// Snapshots older than this are leftovers from a crashed process.
pub const STALE_AGE: Duration = Duration::from_secs(48 * 60 * 60);

/// Per-user directory holding the snapshot files.
///
/// Without a runtime dir the user is named by `$USER` (`$USERNAME` on
/// Windows), not by uid. Two accounts sharing that name also share the
/// directory; snapshot names are random so they never collide.
pub fn snapshot_dir() -> PathBuf {
    match dirs::runtime_dir() {
        Some(runtime) => runtime.join(APP_NAME),
        None => {
            let user = std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "user".to_string());
            std::env::temp_dir().join(format!("{APP_NAME}.{user}"))
        }
    }
}

/// Delete regular files in `dir` whose modification time is older than
/// `max_age`. Returns how many were removed.
pub fn remove_stale_files(dir: &Path, max_age: Duration) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age > max_age {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove stale snapshot {:?}: {e}", entry.path()),
            }
        }
    }

    debug!("Removed {removed} stale snapshot(s) from {dir:?}");
    Ok(removed)
}

/// Convert `\r\n` and lone `\r` to `\n`.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Byte-level variant of [`normalize_line_endings`] for archive content.
pub fn normalize_line_endings_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        if byte == b'\r' {
            if iter.peek() == Some(&b'\n') {
                iter.next();
            }
            out.push(b'\n');
        } else {
            out.push(byte);
        }
    }
    out
}

/// Create an empty snapshot file that is deleted when dropped.
pub(crate) fn create_snapshot(dir: &Path, prefix: &str) -> Result<NamedTempFile> {
    fs::create_dir_all(dir).map_err(|source| GutterError::SnapshotWriteFailed {
        path: dir.to_path_buf(),
        source,
    })?;
    tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(dir)
        .map_err(|source| GutterError::SnapshotWriteFailed {
            path: dir.to_path_buf(),
            source,
        })
}

pub(crate) fn write_snapshot(file: &NamedTempFile, content: &[u8]) -> Result<()> {
    fs::write(file.path(), content).map_err(|source| GutterError::SnapshotWriteFailed {
        path: file.path().to_path_buf(),
        source,
    })
}
