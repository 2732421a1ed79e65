//! Per-buffer orchestrator.
//!
//! A [`Pipeline`] owns the buffer's snapshots and turns one debounced batch of
//! events into at most one diff run, then publishes the outcome to the host.

use crate::cache::{BufferCache, TargetCache};
use crate::config::{Settings, SettingsView};
use crate::diff::{DiffParser, DiffResult};
use crate::encoding::BufferEncoding;
use crate::event::{DebounceTarget, EventKind, EventMask};
use crate::git::operations::{blame_args, diff_args, ls_files_args, parse_blame, status_args};
use crate::git::{FileState, FileStatus, VcsRunner, WorkTree, locate};
use crate::host::{BufferId, Host, Publication};
use crate::shared_state::CompareTargets;
use crate::status::{self, GIT_UNAVAILABLE};
use color_eyre::eyre::{Result, eyre};
use log::{debug, info, warn};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// State shared by every pipeline of an engine.
#[derive(Debug)]
pub struct PipelineContext {
    pub runner: VcsRunner,
    pub targets: Arc<CompareTargets>,
    pub user_settings: Settings,
    pub snapshot_dir: PathBuf,
    pub git_available: bool,
}

#[derive(Debug)]
struct Tracked {
    /// Resolved path inside the working tree; the host may name the file
    /// through a symlink that git would reject.
    file: PathBuf,
    worktree: WorkTree,
    project_settings: Settings,
    buffer_cache: BufferCache,
    target_cache: TargetCache,
}

#[derive(Debug)]
pub struct Pipeline {
    buffer: BufferId,
    host: Arc<dyn Host>,
    context: Arc<PipelineContext>,
    tracked: Option<Tracked>,
    admitted: bool,
    located: bool,
    parser: Arc<DiffParser>,
    untracked_state: Option<FileState>,
}

impl Pipeline {
    pub fn new(buffer: BufferId, host: Arc<dyn Host>, context: Arc<PipelineContext>) -> Self {
        Self {
            buffer,
            host,
            context,
            tracked: None,
            admitted: false,
            located: false,
            parser: Arc::new(DiffParser::default()),
            untracked_state: None,
        }
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn worktree(&self) -> Option<&WorkTree> {
        self.tracked.as_ref().map(|tracked| &tracked.worktree)
    }

    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    /// Settings of this buffer: view override, project, user, defaults.
    pub fn settings(&self) -> SettingsView {
        let project = self
            .tracked
            .as_ref()
            .map(|tracked| tracked.project_settings.clone())
            .unwrap_or_default();
        SettingsView::from_layers(
            self.host.settings(self.buffer),
            project,
            self.context.user_settings.clone(),
        )
    }

    /// Which events start a run under the current modes.
    pub fn admits_event(&self, kind: EventKind) -> bool {
        let settings = self.settings();
        match kind {
            EventKind::Activated => settings.live_mode() || settings.focus_change_mode(),
            EventKind::Modified => settings.live_mode(),
            EventKind::Load | EventKind::PostSave | EventKind::Clone | EventKind::TargetChanged => {
                true
            }
        }
    }

    /// Re-evaluate whether the buffer is tracked. The working tree is looked
    /// up again on load, activation and save, and cached otherwise.
    fn validate(&mut self, mask: EventMask) -> bool {
        let relocate = !self.located
            || mask.contains(EventKind::Load)
            || mask.contains(EventKind::Activated)
            || mask.contains(EventKind::PostSave);
        if relocate {
            self.relocate();
        }

        let settings = self.settings();
        let encoding = BufferEncoding::from_label(&self.host.encoding(self.buffer));
        let admitted = self.tracked.is_some()
            && settings.enable()
            && self.host.view_info(self.buffer).is_trackable()
            && encoding.is_trackable();

        if admitted != self.admitted {
            debug!("Buffer {}: admitted {} -> {admitted}", self.buffer, self.admitted);
            self.admitted = admitted;
            self.host.clear(self.buffer);
            self.parser = Arc::new(DiffParser::default());
            if let Some(tracked) = self.tracked.as_mut() {
                tracked.buffer_cache.invalidate();
            }
        }
        admitted
    }

    fn relocate(&mut self) {
        self.located = true;
        let Some(file) = self.host.file_name(self.buffer) else {
            self.tracked = None;
            return;
        };
        let Some(worktree) = locate(&file) else {
            debug!("Buffer {}: {file:?} is not in a working tree", self.buffer);
            self.tracked = None;
            return;
        };
        if self
            .tracked
            .as_ref()
            .is_some_and(|tracked| tracked.worktree == worktree)
        {
            return;
        }

        match self.track(worktree) {
            Ok(tracked) => self.tracked = Some(tracked),
            Err(e) => {
                warn!("Buffer {}: cannot track file: {e}", self.buffer);
                self.tracked = None;
            }
        }
    }

    fn track(&self, worktree: WorkTree) -> Result<Tracked> {
        let project_settings = Settings::load_project(&worktree.root).unwrap_or_else(|e| {
            warn!("Ignoring project settings of {:?}: {e}", worktree.root);
            Settings::default()
        });
        let settings = SettingsView::from_layers(
            self.host.settings(self.buffer),
            project_settings.clone(),
            self.context.user_settings.clone(),
        );
        let buffer_cache = BufferCache::new(self.buffer, &self.context.snapshot_dir)?;
        let target_cache = TargetCache::new(
            self.context.runner.clone(),
            Arc::clone(&self.context.targets),
            worktree.clone(),
            settings.compare_against(),
            &self.context.snapshot_dir,
        )?;
        info!(
            "Tracking {} in {:?}",
            worktree.relative_path, worktree.root
        );
        Ok(Tracked {
            file: worktree.file_path(),
            worktree,
            project_settings,
            buffer_cache,
            target_cache,
        })
    }

    /// One full run. Failures abort the run without publishing.
    pub async fn run(&mut self, mask: EventMask) {
        if let Err(e) = self.try_run(mask).await {
            warn!("Buffer {}: run aborted: {e}", self.buffer);
        }
    }

    async fn try_run(&mut self, mask: EventMask) -> Result<()> {
        if !self.validate(mask) {
            return Ok(());
        }
        let settings = self.settings();

        if !self.context.git_available {
            let publication = Publication {
                status_text: Some(GIT_UNAVAILABLE.to_string()),
                ..Default::default()
            };
            self.host.publish(self.buffer, &publication);
            return Ok(());
        }

        let host = Arc::clone(&self.host);
        let runner = self.context.runner.clone();
        let buffer = self.buffer;
        let tracked = self
            .tracked
            .as_mut()
            .ok_or_else(|| eyre!("buffer {buffer} lost its working tree"))?;

        if !mask.contains(EventKind::Load) && !mask.contains(EventKind::Modified) {
            tracked.target_cache.mark_stale();
        }
        let target_changed = tracked.target_cache.update().await?;
        let buffer_changed = tracked.buffer_cache.update(host.as_ref())?;
        let root = tracked.worktree.root.clone();

        let regions = if tracked.target_cache.is_untracked() {
            self.parser = Arc::new(DiffParser::default());
            if target_changed || self.untracked_state.is_none() {
                self.untracked_state = Some(classify_untracked(&runner, &root, &tracked.file).await?);
            }
            if settings.show_markers_on_untracked_file() {
                DiffResult::all_inserted(tracked.buffer_cache.line_count())
            } else {
                DiffResult::default()
            }
        } else {
            self.untracked_state = None;
            if target_changed || buffer_changed {
                let diff = runner
                    .run_diff(
                        &root,
                        diff_args(
                            settings.ignore_whitespace(),
                            settings.diff_algorithm(),
                            tracked.target_cache.path(),
                            tracked.buffer_cache.path(),
                        ),
                    )
                    .await?;
                let encoding = BufferEncoding::from_label(&host.encoding(buffer));
                self.parser = Arc::new(DiffParser::parse(&encoding.decode(&diff)));
            }
            self.parser.result()
        };

        let status_output = runner.run(&root, status_args(&tracked.file)).await?;
        let info = status::parse_status(&status_output);
        let file_status = FileStatus {
            state: self.untracked_state.unwrap_or(info.file_state),
            lines_inserted: regions.inserted.len(),
            lines_modified: regions.modified.len(),
            lines_deleted: deleted_line_count(&self.parser),
        };

        let status_text = settings.show_status_bar_text().then(|| {
            let vars = status::status_vars(
                &tracked.worktree.repo_name(),
                &info,
                &tracked.target_cache.get(),
                &file_status,
            );
            status::render(&settings.status_bar_text(), &vars)
        });

        let annotation = if settings.show_line_annotation() && self.untracked_state.is_none() {
            match host.cursor_line(buffer) {
                Some(row) => {
                    annotate(
                        &runner,
                        &root,
                        row,
                        tracked.buffer_cache.path(),
                        &tracked.worktree.relative_path,
                        &settings.line_annotation_text(),
                    )
                    .await?
                }
                None => None,
            }
        } else {
            None
        };

        let publication = Publication {
            regions,
            status: file_status,
            status_text,
            annotation,
            minimap_width: settings.show_in_minimap(),
            parser: Arc::clone(&self.parser),
        };
        debug!(
            "Buffer {buffer}: publishing {} inserted, {} modified, {} deleted",
            publication.regions.inserted.len(),
            publication.regions.modified.len(),
            publication.regions.deleted.len()
        );
        host.publish(buffer, &publication);
        Ok(())
    }
}

impl DebounceTarget for Pipeline {
    fn admits(&mut self, kind: EventKind) -> bool {
        self.admits_event(kind)
    }

    fn debounce_delay(&self) -> Duration {
        self.settings().debounce_delay()
    }

    fn is_visible(&self) -> bool {
        self.host.is_visible(self.buffer)
    }

    fn run(&mut self, mask: EventMask) -> impl Future<Output = ()> + Send {
        Pipeline::run(self, mask)
    }
}

fn deleted_line_count(parser: &DiffParser) -> usize {
    parser
        .hunks()
        .iter()
        .filter(|hunk| hunk.new_size == 0)
        .map(|hunk| hunk.old_size)
        .sum()
}

/// Tell untracked files from ignored ones.
async fn classify_untracked(runner: &VcsRunner, root: &Path, file: &Path) -> Result<FileState> {
    let untracked = runner.run(root, ls_files_args(file, false)).await?;
    if !untracked.is_empty() {
        return Ok(FileState::Untracked);
    }
    let ignored = runner.run(root, ls_files_args(file, true)).await?;
    if !ignored.is_empty() {
        return Ok(FileState::Ignored);
    }
    // Neither listing includes files git already tracks, so the file was added
    // after the target (staged or committed on top of it).
    Ok(FileState::Staged)
}

async fn annotate(
    runner: &VcsRunner,
    root: &Path,
    row: usize,
    snapshot: &Path,
    relative_path: &str,
    template: &str,
) -> Result<Option<String>> {
    let output = runner
        .run(root, blame_args(row, snapshot, relative_path))
        .await?;
    let now = chrono::Utc::now().timestamp();
    Ok(parse_blame(&output)
        .and_then(|blame| status::annotation_vars(&blame, now))
        .map(|vars| status::render(template, &vars)))
}
