use super::{create_snapshot, normalize_line_endings, write_snapshot};
use crate::encoding::BufferEncoding;
use crate::error::Result;
use crate::host::{BufferId, Host};
use log::trace;
use std::path::Path;
use tempfile::NamedTempFile;

/// Snapshot of the editor buffer, rewritten only when the host's change
/// counter moves.
#[derive(Debug)]
pub struct BufferCache {
    buffer: BufferId,
    file: NamedTempFile,
    change_count: Option<u64>,
    line_count: usize,
}

impl BufferCache {
    pub fn new(buffer: BufferId, dir: &Path) -> Result<Self> {
        Ok(Self {
            buffer,
            file: create_snapshot(dir, "buffer-")?,
            change_count: None,
            line_count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Lines in the buffer as of the last write.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Force the next [`update`](Self::update) to rewrite the snapshot.
    pub fn invalidate(&mut self) {
        self.change_count = None;
    }

    /// Bring the snapshot up to date. Returns whether the file was rewritten.
    pub fn update(&mut self, host: &dyn Host) -> Result<bool> {
        let change_count = host.change_count(self.buffer);
        if self.change_count == Some(change_count) {
            return Ok(false);
        }

        let text = host.text(self.buffer).unwrap_or_default();
        let text = normalize_line_endings(&text);
        let encoding = BufferEncoding::from_label(&host.encoding(self.buffer));
        write_snapshot(&self.file, &encoding.encode(&text))?;

        self.line_count = text.lines().count();
        self.change_count = Some(change_count);
        trace!(
            "Wrote buffer {} snapshot ({} lines) to {:?}",
            self.buffer,
            self.line_count,
            self.file.path()
        );
        Ok(true)
    }
}
