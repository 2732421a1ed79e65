//! Line-level change tracking of editor buffers against a git revision.
//!
//! The engine diffs the live buffer content against the file as stored in a
//! chosen revision and pushes inserted, modified and deleted line regions,
//! a status text and an optional blame annotation back to the host.

pub mod cache;
pub mod config;
pub mod diff;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod event;
pub mod file_host;
pub mod git;
pub mod host;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod popup;
pub mod promise;
pub mod shared_state;
pub mod status;

pub use config::{Settings, SettingsView};
pub use diff::{DiffParser, DiffResult, Hunk, LineChange};
pub use engine::Engine;
pub use error::GutterError;
pub use git::{CompareTarget, FileState, FileStatus};
pub use host::{BufferId, Host, MemoryHost, Publication};
pub use popup::PopupModel;
pub use promise::Promise;
