use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// What the monitor saw change since the previous poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    /// The file appeared, or its size changed.
    Modified,
    /// Only the modification time moved, as after a plain save.
    Saved,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: SystemTime,
    len: u64,
}

/// Polls a file's modification time and size.
#[derive(Debug, Clone)]
pub struct FileMonitor {
    path: PathBuf,
    interval: Duration,
    last_poll: Option<Instant>,
    last_stamp: Option<Stamp>,
}

impl FileMonitor {
    /// The current state of `path` is the baseline; the first poll reports
    /// nothing unless the file changed after this call.
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        let path = path.into();
        let last_stamp = stamp(&path);
        Self {
            path,
            interval,
            last_poll: None,
            last_stamp,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn should_poll(&self) -> bool {
        if let Some(last_poll) = self.last_poll {
            last_poll.elapsed() >= self.interval
        } else {
            true
        }
    }

    pub fn poll(&mut self) -> Option<FileChange> {
        self.last_poll = Some(Instant::now());
        let current = stamp(&self.path);
        let previous = std::mem::replace(&mut self.last_stamp, current);

        let change = match (previous, current) {
            (None, None) => None,
            (Some(_), None) => Some(FileChange::Removed),
            (None, Some(_)) => Some(FileChange::Modified),
            (Some(before), Some(after)) if before.len != after.len => Some(FileChange::Modified),
            (Some(before), Some(after)) if before.modified != after.modified => {
                Some(FileChange::Saved)
            }
            _ => None,
        };
        if let Some(change) = change {
            debug!("{:?}: {change:?}", self.path);
        }
        change
    }
}

fn stamp(path: &Path) -> Option<Stamp> {
    let metadata = fs::metadata(path).ok()?;
    Some(Stamp {
        modified: metadata.modified().ok()?,
        len: metadata.len(),
    })
}
