//! A [`Host`] backed by files on disk, used by the command-line front end.

use crate::config::Settings;
use crate::encoding::BufferEncoding;
use crate::host::{BufferId, Host, Publication};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;
use tokio::sync::watch;

/// Latest state pushed for a file.
#[derive(Debug, Clone, Default)]
pub enum Update {
    #[default]
    Pending,
    Published(Box<Publication>),
    Cleared,
}

#[derive(Debug)]
struct OpenFile {
    path: PathBuf,
    cursor_line: Option<usize>,
    updates: watch::Sender<Update>,
}

/// Every file is always visible. The buffer text is the file content; the
/// change count follows the file's modification time and size.
#[derive(Debug)]
pub struct FileHost {
    files: scc::HashMap<BufferId, OpenFile>,
    settings: Settings,
    encoding: Mutex<String>,
}

impl FileHost {
    /// `settings` is the view layer applied to every file.
    pub fn new(settings: Settings) -> Self {
        Self {
            files: scc::HashMap::new(),
            settings,
            encoding: Mutex::new("UTF-8".to_string()),
        }
    }

    /// Encoding every file is read in, as an editor label ("UTF-8",
    /// "Western (Windows 1252)", "Hexadecimal").
    pub fn set_encoding(&self, label: &str) {
        if let Ok(mut encoding) = self.encoding.lock() {
            *encoding = label.to_string();
        }
    }

    /// Register `path` as `buffer`; the receiver sees every update of it.
    pub fn open(&self, buffer: BufferId, path: impl Into<PathBuf>) -> watch::Receiver<Update> {
        let (updates, receiver) = watch::channel(Update::Pending);
        let path = path.into();
        debug!("Opening {path:?} as buffer {buffer}");
        self.files.upsert(
            buffer,
            OpenFile {
                path,
                cursor_line: None,
                updates,
            },
        );
        receiver
    }

    pub fn close(&self, buffer: BufferId) {
        self.files.remove(&buffer);
    }

    pub fn set_cursor_line(&self, buffer: BufferId, line: usize) {
        self.files.update(&buffer, |_, file| file.cursor_line = Some(line));
    }

    fn path(&self, buffer: BufferId) -> Option<PathBuf> {
        self.files.read(&buffer, |_, file| file.path.clone())
    }

    fn send(&self, buffer: BufferId, update: Update) {
        self.files.read(&buffer, |_, file| file.updates.send_replace(update));
    }
}

fn change_count(path: &Path) -> u64 {
    let Ok(metadata) = fs::metadata(path) else {
        return 0;
    };
    let nanos = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |age| age.as_nanos() as u64);
    nanos ^ metadata.len().rotate_left(32)
}

impl Host for FileHost {
    fn exists(&self, buffer: BufferId) -> bool {
        self.files.contains(&buffer)
    }

    fn file_name(&self, buffer: BufferId) -> Option<PathBuf> {
        self.path(buffer)
    }

    fn change_count(&self, buffer: BufferId) -> u64 {
        self.path(buffer).map_or(0, |path| change_count(&path))
    }

    fn text(&self, buffer: BufferId) -> Option<String> {
        let bytes = fs::read(self.path(buffer)?).ok()?;
        Some(BufferEncoding::from_label(&self.encoding(buffer)).decode(&bytes))
    }

    fn encoding(&self, _buffer: BufferId) -> String {
        self.encoding
            .lock()
            .map(|encoding| encoding.clone())
            .unwrap_or_else(|_| "UTF-8".to_string())
    }

    fn is_visible(&self, buffer: BufferId) -> bool {
        self.exists(buffer)
    }

    fn cursor_line(&self, buffer: BufferId) -> Option<usize> {
        self.files
            .read(&buffer, |_, file| file.cursor_line)
            .flatten()
    }

    fn settings(&self, _buffer: BufferId) -> Settings {
        self.settings.clone()
    }

    fn publish(&self, buffer: BufferId, publication: &Publication) {
        self.send(buffer, Update::Published(Box::new(publication.clone())));
    }

    fn clear(&self, buffer: BufferId) {
        self.send(buffer, Update::Cleared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_host_reads_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "one\n").unwrap();

        let host = FileHost::new(Settings::default());
        let _updates = host.open(1, &path);
        assert!(host.exists(1));
        assert!(host.is_visible(1));
        assert_eq!(host.file_name(1), Some(path.clone()));
        assert_eq!(host.text(1).as_deref(), Some("one\n"));

        let before = host.change_count(1);
        fs::write(&path, "one\ntwo\n").unwrap();
        assert_ne!(host.change_count(1), before);

        host.close(1);
        assert!(!host.exists(1));
        assert_eq!(host.text(1), None);
    }

    #[test]
    fn test_file_host_encoding() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latin.txt");
        fs::write(&path, b"caf\xe9\n").unwrap();

        let host = FileHost::new(Settings::default());
        let _updates = host.open(1, &path);
        assert_eq!(host.encoding(1), "UTF-8");
        assert_eq!(host.text(1).as_deref(), Some("caf\u{fffd}\n"));

        host.set_encoding("Western (Windows 1252)");
        assert_eq!(host.encoding(1), "Western (Windows 1252)");
        assert_eq!(host.text(1).as_deref(), Some("café\n"));
    }

    #[test]
    fn test_file_host_sends_updates() {
        let host = FileHost::new(Settings::default());
        let mut updates = host.open(7, "/nowhere/a.txt");
        assert!(matches!(*updates.borrow(), Update::Pending));

        host.publish(7, &Publication::default());
        assert!(updates.has_changed().unwrap());
        assert!(matches!(
            *updates.borrow_and_update(),
            Update::Published(_)
        ));

        host.clear(7);
        assert!(matches!(*updates.borrow_and_update(), Update::Cleared));
    }
}
