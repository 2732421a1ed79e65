//! Contract between the engine and the editor that owns the buffers.

use crate::config::Settings;
use crate::diff::{DiffParser, DiffResult};
use crate::git::FileStatus;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

pub type BufferId = u64;

/// How a buffer is presented. Buffers that are detached, scratch, read-only
/// or widgets are never tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewInfo {
    pub attached: bool,
    pub scratch: bool,
    pub read_only: bool,
    pub widget: bool,
}

impl Default for ViewInfo {
    fn default() -> Self {
        Self {
            attached: true,
            scratch: false,
            read_only: false,
            widget: false,
        }
    }
}

impl ViewInfo {
    pub fn is_trackable(&self) -> bool {
        self.attached && !self.scratch && !self.read_only && !self.widget
    }
}

/// Everything one pipeline run hands back to the editor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Publication {
    pub regions: DiffResult,
    pub status: FileStatus,
    pub status_text: Option<String>,
    pub annotation: Option<String>,
    /// Minimap marker width; 0 means no minimap markers.
    pub minimap_width: u32,
    #[serde(skip)]
    pub parser: Arc<DiffParser>,
}

/// The editor side. Every method is called from engine tasks, so
/// implementations must be thread safe.
pub trait Host: Send + Sync + 'static {
    fn exists(&self, buffer: BufferId) -> bool;

    fn file_name(&self, buffer: BufferId) -> Option<PathBuf>;

    /// Counter the editor bumps on every edit of the buffer.
    fn change_count(&self, buffer: BufferId) -> u64;

    /// Full text of the buffer.
    fn text(&self, buffer: BufferId) -> Option<String>;

    /// Declared encoding label, e.g. `UTF-8` or `Western (Windows 1252)`.
    fn encoding(&self, buffer: BufferId) -> String {
        let _ = buffer;
        "UTF-8".to_string()
    }

    fn view_info(&self, buffer: BufferId) -> ViewInfo {
        let _ = buffer;
        ViewInfo::default()
    }

    fn is_visible(&self, buffer: BufferId) -> bool;

    /// 1-based line of the cursor, used for line annotations.
    fn cursor_line(&self, buffer: BufferId) -> Option<usize> {
        let _ = buffer;
        None
    }

    /// View-level settings override.
    fn settings(&self, buffer: BufferId) -> Settings {
        let _ = buffer;
        Settings::default()
    }

    fn publish(&self, buffer: BufferId, publication: &Publication);

    /// Remove every marker, status text and annotation of the buffer.
    fn clear(&self, buffer: BufferId);
}

impl std::fmt::Debug for dyn Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Host")
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryBuffer {
    path: Option<PathBuf>,
    text: String,
    change_count: u64,
    encoding: Option<String>,
    hidden: bool,
    view: ViewInfo,
    cursor_line: Option<usize>,
    settings: Settings,
    publish_count: usize,
    clear_count: usize,
    last_publication: Option<Publication>,
}

/// A [`Host`] keeping buffers in memory. Every publish or clear bumps a
/// counter observable through [`MemoryHost::subscribe`].
#[derive(Debug)]
pub struct MemoryHost {
    buffers: scc::HashMap<BufferId, MemoryBuffer>,
    updates: tokio::sync::watch::Sender<u64>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            buffers: scc::HashMap::new(),
            updates: tokio::sync::watch::Sender::new(0),
        }
    }

    pub fn open(&self, buffer: BufferId, path: impl Into<PathBuf>, text: impl Into<String>) {
        let entry = MemoryBuffer {
            path: Some(path.into()),
            text: text.into(),
            change_count: 1,
            ..Default::default()
        };
        self.buffers.upsert(buffer, entry);
    }

    pub fn close(&self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    /// Replace the text and bump the change counter.
    pub fn edit(&self, buffer: BufferId, text: impl Into<String>) {
        let text = text.into();
        self.buffers.update(&buffer, |_, entry| {
            entry.text = text;
            entry.change_count += 1;
        });
    }

    pub fn set_visible(&self, buffer: BufferId, visible: bool) {
        self.buffers
            .update(&buffer, |_, entry| entry.hidden = !visible);
    }

    pub fn set_encoding(&self, buffer: BufferId, label: &str) {
        let label = label.to_string();
        self.buffers
            .update(&buffer, |_, entry| entry.encoding = Some(label));
    }

    pub fn set_view_info(&self, buffer: BufferId, view: ViewInfo) {
        self.buffers.update(&buffer, |_, entry| entry.view = view);
    }

    pub fn set_cursor_line(&self, buffer: BufferId, line: usize) {
        self.buffers
            .update(&buffer, |_, entry| entry.cursor_line = Some(line));
    }

    pub fn set_settings(&self, buffer: BufferId, settings: Settings) {
        self.buffers
            .update(&buffer, |_, entry| entry.settings = settings);
    }

    pub fn last_publication(&self, buffer: BufferId) -> Option<Publication> {
        self.buffers
            .read(&buffer, |_, entry| entry.last_publication.clone())
            .flatten()
    }

    pub fn publish_count(&self, buffer: BufferId) -> usize {
        self.buffers
            .read(&buffer, |_, entry| entry.publish_count)
            .unwrap_or(0)
    }

    pub fn clear_count(&self, buffer: BufferId) -> usize {
        self.buffers
            .read(&buffer, |_, entry| entry.clear_count)
            .unwrap_or(0)
    }

    /// Receiver that changes on every publish or clear.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.updates.subscribe()
    }

    fn bump(&self) {
        self.updates.send_modify(|count| *count += 1);
    }
}

impl Host for MemoryHost {
    fn exists(&self, buffer: BufferId) -> bool {
        self.buffers.contains(&buffer)
    }

    fn file_name(&self, buffer: BufferId) -> Option<PathBuf> {
        self.buffers
            .read(&buffer, |_, entry| entry.path.clone())
            .flatten()
    }

    fn change_count(&self, buffer: BufferId) -> u64 {
        self.buffers
            .read(&buffer, |_, entry| entry.change_count)
            .unwrap_or(0)
    }

    fn text(&self, buffer: BufferId) -> Option<String> {
        self.buffers.read(&buffer, |_, entry| entry.text.clone())
    }

    fn encoding(&self, buffer: BufferId) -> String {
        self.buffers
            .read(&buffer, |_, entry| entry.encoding.clone())
            .flatten()
            .unwrap_or_else(|| "UTF-8".to_string())
    }

    fn view_info(&self, buffer: BufferId) -> ViewInfo {
        self.buffers
            .read(&buffer, |_, entry| entry.view)
            .unwrap_or_default()
    }

    fn is_visible(&self, buffer: BufferId) -> bool {
        self.buffers
            .read(&buffer, |_, entry| !entry.hidden)
            .unwrap_or(false)
    }

    fn cursor_line(&self, buffer: BufferId) -> Option<usize> {
        self.buffers
            .read(&buffer, |_, entry| entry.cursor_line)
            .flatten()
    }

    fn settings(&self, buffer: BufferId) -> Settings {
        self.buffers
            .read(&buffer, |_, entry| entry.settings.clone())
            .unwrap_or_default()
    }

    fn publish(&self, buffer: BufferId, publication: &Publication) {
        self.buffers.update(&buffer, |_, entry| {
            entry.publish_count += 1;
            entry.last_publication = Some(publication.clone());
        });
        self.bump();
    }

    fn clear(&self, buffer: BufferId) {
        self.buffers.update(&buffer, |_, entry| {
            entry.clear_count += 1;
            entry.last_publication = None;
        });
        self.bump();
    }
}
