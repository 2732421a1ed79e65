use super::{create_snapshot, normalize_line_endings_bytes, write_snapshot};
use crate::error::{GutterError, Result};
use crate::git::operations::{archive_args, rev_parse_args};
use crate::git::{CompareTarget, ResolvedTarget, VcsRunner, WorkTree};
use crate::promise::Promise;
use crate::shared_state::CompareTargets;
use color_eyre::eyre;
use log::{debug, warn};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Content of the file at the compare target, refetched only when the
/// target resolves to a different content id.
#[derive(Debug)]
pub struct TargetCache {
    runner: VcsRunner,
    targets: Arc<CompareTargets>,
    worktree: WorkTree,
    default_target: CompareTarget,
    file: NamedTempFile,
    resolved: Option<ResolvedTarget>,
    stale: bool,
    untracked: bool,
}

impl TargetCache {
    pub fn new(
        runner: VcsRunner,
        targets: Arc<CompareTargets>,
        worktree: WorkTree,
        default_target: CompareTarget,
        dir: &Path,
    ) -> Result<Self> {
        Ok(Self {
            runner,
            targets,
            worktree,
            default_target,
            file: create_snapshot(dir, "target-")?,
            resolved: None,
            stale: true,
            untracked: false,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The working tree's current target. Selections are written to the
    /// shared map by the engine and picked up here on the next update.
    pub fn get(&self) -> CompareTarget {
        self.targets
            .get_or_insert(&self.worktree.root, self.default_target.clone())
    }

    pub fn resolved(&self) -> Option<&ResolvedTarget> {
        self.resolved.as_ref()
    }

    /// Whether the file did not exist at the target as of the last fetch.
    pub fn is_untracked(&self) -> bool {
        self.untracked
    }

    /// Re-resolve the target on the next update; the content is refetched
    /// only if the content id moved.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Bring the snapshot up to date. Returns whether the file was rewritten.
    pub async fn update(&mut self) -> Result<bool> {
        let target = self.get();
        let target_moved = self
            .resolved
            .as_ref()
            .is_none_or(|resolved| resolved.target != target);
        if !self.stale && !target_moved {
            return Ok(false);
        }

        let root = self.worktree.root.clone();
        let content_id = match (target.commit_hash(), target.revision()) {
            (Some(hash), _) => Promise::resolved(hash.to_string()),
            (None, Some(revision)) => self.runner.run(&root, rev_parse_args(revision)),
            (None, None) => Promise::resolved(String::new()),
        };

        let last_id = self.resolved.as_ref().map(|r| r.content_id.clone());
        let runner = self.runner.clone();
        let relative_path = self.worktree.relative_path.clone();
        let fetched = content_id.and_then(move |content_id| {
            if last_id.as_deref() == Some(content_id.as_str()) {
                return Promise::resolved(None);
            }
            if content_id.is_empty() {
                return Promise::resolved(Some((content_id, Vec::new())));
            }
            runner
                .run_raw(&root, archive_args(&content_id, &relative_path))
                .then(move |archive| Some((content_id, archive)))
        });

        let fetched = fetched.await?;
        self.stale = false;

        let Some((content_id, archive)) = fetched else {
            debug!("Target {target} unchanged for {}", self.worktree.relative_path);
            if let Some(resolved) = self.resolved.as_mut() {
                resolved.target = target;
            }
            return Ok(false);
        };

        if content_id.is_empty() {
            let e = GutterError::TargetResolveFailed {
                target: target.to_string(),
            };
            warn!("{e}");
        }

        let content = if archive.is_empty() {
            None
        } else {
            match extract_last_entry(&archive) {
                Ok(content) => Some(normalize_line_endings_bytes(&content)),
                Err(e) => {
                    warn!("Unreadable archive for {}: {e}", self.worktree.relative_path);
                    None
                }
            }
        };

        self.untracked = content.is_none();
        write_snapshot(&self.file, content.as_deref().unwrap_or_default())?;
        debug!(
            "Target snapshot for {} now at {target} ({content_id}), untracked: {}",
            self.worktree.relative_path, self.untracked
        );
        self.resolved = Some(ResolvedTarget { target, content_id });
        Ok(true)
    }
}

/// The file is the last entry of the archive; leading entries are its
/// parent directories.
fn extract_last_entry(archive: &[u8]) -> eyre::Result<Vec<u8>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let last = zip
        .len()
        .checked_sub(1)
        .ok_or_else(|| eyre::eyre!("empty archive"))?;
    let mut entry = zip.by_index(last)?;
    let mut content = Vec::new();
    entry.read_to_end(&mut content)?;
    Ok(content)
}
