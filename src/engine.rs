//! Host-facing entry points.

use crate::cache::{STALE_AGE, remove_stale_files, snapshot_dir};
use crate::config::{Settings, SettingsView};
use crate::encoding::BufferEncoding;
use crate::error::GutterError;
use crate::event::{EventKind, EventMux};
use crate::git::operations::{
    branches_args, current_branch_args, log_all_args, log_file_args, parse_branches,
    parse_commits, parse_file_commits, parse_tags, tags_args,
};
use crate::git::{Choice, CompareTarget, TaskQueue, VcsRunner, WorkTree, locate};
use crate::host::{BufferId, Host};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::promise::Promise;
use crate::shared_state::CompareTargets;
use color_eyre::eyre::{Result, bail};
use log::{debug, info, warn};
use std::ffi::OsString;
use std::sync::Arc;

/// Wires the VCS worker, the compare-target map and the event multiplexer
/// together for one host.
#[derive(Debug)]
pub struct Engine {
    host: Arc<dyn Host>,
    context: Arc<PipelineContext>,
    queue: Arc<TaskQueue>,
    mux: EventMux,
}

impl Engine {
    /// `settings` is the user layer; projects and views override it.
    pub fn new(host: Arc<dyn Host>, settings: Settings) -> Result<Self> {
        let view = SettingsView::new(vec![settings.clone()]);
        let queue = Arc::new(TaskQueue::new()?);
        let runner = VcsRunner::new(view.git_binary(), Arc::clone(&queue));
        let git_available = runner.is_available();
        if !git_available {
            warn!("{:?} not found, change tracking is disabled", runner.git_binary());
        }

        let snapshot_dir = snapshot_dir();
        match remove_stale_files(&snapshot_dir, STALE_AGE) {
            Ok(removed) if removed > 0 => info!("Removed {removed} stale snapshot(s)"),
            Ok(_) => {}
            Err(e) => warn!("Could not clean {snapshot_dir:?}: {e}"),
        }

        let context = Arc::new(PipelineContext {
            runner,
            targets: Arc::new(CompareTargets::new()),
            user_settings: settings,
            snapshot_dir,
            git_available,
        });

        Ok(Self {
            host,
            context,
            queue,
            mux: EventMux::new(),
        })
    }

    pub fn git_available(&self) -> bool {
        self.context.git_available
    }

    pub fn runner(&self) -> &VcsRunner {
        &self.context.runner
    }

    /// Whether VCS work is running or queued.
    pub fn busy(&self) -> bool {
        self.queue.busy()
    }

    /// Drop queued VCS work; the running command finishes.
    pub fn cancel_pending(&self) {
        self.queue.cancel_all();
    }

    fn dispatch(&self, buffer: BufferId, kind: EventKind) {
        let host = Arc::clone(&self.host);
        let context = Arc::clone(&self.context);
        self.mux
            .dispatch(buffer, kind, move || Pipeline::new(buffer, host, context));
    }

    pub fn on_load(&self, buffer: BufferId) {
        self.dispatch(buffer, EventKind::Load);
    }

    pub fn on_modified(&self, buffer: BufferId) {
        self.dispatch(buffer, EventKind::Modified);
    }

    pub fn on_post_save(&self, buffer: BufferId) {
        self.dispatch(buffer, EventKind::PostSave);
    }

    pub fn on_activated(&self, buffer: BufferId) {
        self.dispatch(buffer, EventKind::Activated);
    }

    pub fn on_clone(&self, buffer: BufferId) {
        self.dispatch(buffer, EventKind::Clone);
    }

    pub fn on_close(&self, buffer: BufferId) {
        if self.mux.remove(buffer) {
            debug!("Buffer {buffer} closed");
        }
    }

    /// Drop listeners of buffers the host no longer knows.
    pub fn collect_garbage(&self) -> usize {
        let host = Arc::clone(&self.host);
        self.mux.collect_garbage(|buffer| host.exists(buffer))
    }

    fn worktree_of(&self, buffer: BufferId) -> Result<WorkTree, GutterError> {
        let file = self
            .host
            .file_name(buffer)
            .ok_or_else(|| GutterError::NotInWorkingTree(format!("buffer {buffer}").into()))?;
        locate(&file).ok_or(GutterError::NotInWorkingTree(file))
    }

    fn settings_of(&self, buffer: BufferId, worktree: &WorkTree) -> SettingsView {
        let project = Settings::load_project(&worktree.root).unwrap_or_default();
        SettingsView::from_layers(
            self.host.settings(buffer),
            project,
            self.context.user_settings.clone(),
        )
    }

    fn default_target(&self, buffer: BufferId, worktree: &WorkTree) -> CompareTarget {
        self.settings_of(buffer, worktree).compare_against()
    }

    /// Whether a run for `buffer` would be admitted: the file is in a working
    /// tree, tracking is enabled for it and the view shows diffable text.
    pub fn is_trackable(&self, buffer: BufferId) -> bool {
        let Ok(worktree) = self.worktree_of(buffer) else {
            return false;
        };
        let encoding = BufferEncoding::from_label(&self.host.encoding(buffer));
        self.settings_of(buffer, &worktree).enable()
            && self.host.view_info(buffer).is_trackable()
            && encoding.is_trackable()
    }

    /// Target of the buffer's working tree.
    pub fn compare_target(&self, buffer: BufferId) -> Result<CompareTarget> {
        let worktree = self.worktree_of(buffer)?;
        let default = self.default_target(buffer, &worktree);
        Ok(self.context.targets.get_or_insert(&worktree.root, default))
    }

    /// Human readable description of the buffer's target.
    pub fn show_compare(&self, buffer: BufferId) -> Result<String> {
        let target = self.compare_target(buffer)?;
        Ok(match target {
            CompareTarget::Head => "Comparing against HEAD".to_string(),
            CompareTarget::Branch(_) => format!("Comparing against branch {target}"),
            CompareTarget::Tag(_) => format!("Comparing against tag {target}"),
            CompareTarget::Remote(_) => format!("Comparing against remote {target}"),
            CompareTarget::Commit(_) => format!("Comparing against commit {target}"),
        })
    }

    /// Switch the target of the buffer's working tree and refresh every
    /// buffer of that tree, whatever the live and focus modes say.
    fn set_target(&self, buffer: BufferId, target: CompareTarget) -> Result<()> {
        let worktree = self.worktree_of(buffer)?;
        info!("Comparing {:?} against {target}", worktree.root);
        self.context.targets.set(&worktree.root, target);

        for other in self.mux.buffers() {
            let same_tree = self
                .host
                .file_name(other)
                .and_then(|file| locate(&file))
                .is_some_and(|tree| tree.root == worktree.root);
            if same_tree {
                self.dispatch(other, EventKind::TargetChanged);
            }
        }
        if !self.mux.contains(buffer) {
            self.dispatch(buffer, EventKind::TargetChanged);
        }
        Ok(())
    }

    pub fn compare_against_head(&self, buffer: BufferId) -> Result<()> {
        self.set_target(buffer, CompareTarget::Head)
    }

    /// Compare against `origin/<current branch>`.
    pub async fn compare_against_origin(&self, buffer: BufferId) -> Result<CompareTarget> {
        let worktree = self.worktree_of(buffer)?;
        let branch = self
            .context
            .runner
            .run(&worktree.root, current_branch_args())
            .await?;
        if branch.is_empty() || branch == "HEAD" {
            bail!("{:?} has no current branch", worktree.root);
        }
        let target = CompareTarget::Remote(format!("origin/{branch}"));
        self.set_target(buffer, target.clone())?;
        Ok(target)
    }

    pub fn compare_against_branch(&self, buffer: BufferId, refname: &str) -> Result<()> {
        let refname = if refname.starts_with("refs/") {
            refname.to_string()
        } else {
            format!("refs/heads/{refname}")
        };
        self.set_target(buffer, CompareTarget::Branch(refname))
    }

    pub fn compare_against_tag(&self, buffer: BufferId, refname: &str) -> Result<()> {
        let refname = if refname.starts_with("refs/") {
            refname.to_string()
        } else {
            format!("refs/tags/{refname}")
        };
        self.set_target(buffer, CompareTarget::Tag(refname))
    }

    /// Also used for commits picked from the file history.
    pub fn compare_against_commit(&self, buffer: BufferId, hash: &str) -> Result<()> {
        self.set_target(buffer, CompareTarget::Commit(hash.to_string()))
    }

    /// Apply any target picked from one of the `list_*` helpers.
    pub fn compare_against(&self, buffer: BufferId, target: CompareTarget) -> Result<()> {
        self.set_target(buffer, target)
    }

    fn list(
        &self,
        buffer: BufferId,
        args: impl FnOnce(&WorkTree) -> Vec<OsString>,
        parse: fn(&str) -> Vec<Choice>,
    ) -> Promise<Vec<Choice>> {
        match self.worktree_of(buffer) {
            Ok(worktree) => self
                .context
                .runner
                .run(&worktree.root, args(&worktree))
                .then(move |output| parse(&output)),
            Err(e) => {
                debug!("{e}");
                Promise::resolved(Vec::new())
            }
        }
    }

    pub fn list_branches(&self, buffer: BufferId) -> Promise<Vec<Choice>> {
        self.list(buffer, |_| branches_args(), parse_branches)
    }

    pub fn list_tags(&self, buffer: BufferId) -> Promise<Vec<Choice>> {
        self.list(buffer, |_| tags_args(), parse_tags)
    }

    pub fn list_commits(&self, buffer: BufferId) -> Promise<Vec<Choice>> {
        self.list(buffer, |_| log_all_args(), parse_commits)
    }

    pub fn list_file_commits(&self, buffer: BufferId) -> Promise<Vec<Choice>> {
        self.list(
            buffer,
            |worktree| log_file_args(&worktree.relative_path),
            parse_file_commits,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use tempfile::TempDir;

    fn engine_with_file() -> (TempDir, Arc<MemoryHost>, Engine) {
        let temp_dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        std::fs::create_dir(root.join(".git")).unwrap();
        let host = Arc::new(MemoryHost::new());
        host.open(1, root.join("a.txt"), "a\n");
        let engine = Engine::new(host.clone(), Settings::default()).unwrap();
        (temp_dir, host, engine)
    }

    #[tokio::test]
    async fn test_compare_selection_updates_target() {
        let (_temp_dir, _host, engine) = engine_with_file();
        assert_eq!(engine.compare_target(1).unwrap(), CompareTarget::Head);
        assert_eq!(engine.show_compare(1).unwrap(), "Comparing against HEAD");

        engine.compare_against_branch(1, "dev").unwrap();
        assert_eq!(
            engine.compare_target(1).unwrap(),
            CompareTarget::Branch("refs/heads/dev".to_string())
        );
        assert_eq!(
            engine.show_compare(1).unwrap(),
            "Comparing against branch dev"
        );

        engine.compare_against_tag(1, "v1.0").unwrap();
        assert_eq!(engine.show_compare(1).unwrap(), "Comparing against tag v1.0");

        engine.compare_against_commit(1, "0123456789abcdef").unwrap();
        assert_eq!(
            engine.show_compare(1).unwrap(),
            "Comparing against commit 0123456"
        );

        engine.compare_against_head(1).unwrap();
        assert_eq!(engine.compare_target(1).unwrap(), CompareTarget::Head);
    }

    #[tokio::test]
    async fn test_settings_default_target() {
        let temp_dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        std::fs::create_dir(root.join(".git")).unwrap();
        let host = Arc::new(MemoryHost::new());
        host.open(1, root.join("a.txt"), "a\n");
        let settings = Settings {
            compare_against: Some("refs/tags/v2".to_string()),
            ..Default::default()
        };
        let engine = Engine::new(host, settings).unwrap();
        assert_eq!(
            engine.compare_target(1).unwrap(),
            CompareTarget::Tag("refs/tags/v2".to_string())
        );
    }

    #[tokio::test]
    async fn test_buffer_outside_tree() {
        let host = Arc::new(MemoryHost::new());
        host.open(1, "/definitely/not/a/checkout/x.txt", "");
        let engine = Engine::new(host, Settings::default()).unwrap();
        assert!(engine.compare_target(1).is_err());
        assert!(engine.list_branches(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_is_trackable() {
        let (temp_dir, host, engine) = engine_with_file();
        assert!(engine.is_trackable(1));

        host.set_encoding(1, "Hexadecimal");
        assert!(!engine.is_trackable(1));
        host.set_encoding(1, "UTF-8");

        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        std::fs::write(root.join(".gutterline.json"), r#"{"enable": false}"#).unwrap();
        assert!(!engine.is_trackable(1));

        host.open(2, "/definitely/not/a/checkout/x.txt", "");
        assert!(!engine.is_trackable(2));
    }

    #[tokio::test]
    async fn test_close_and_collect_garbage() {
        let (_temp_dir, host, engine) = engine_with_file();
        host.open(2, "/elsewhere/b.txt", "");
        engine.on_load(1);
        engine.on_load(2);

        engine.on_close(1);
        host.close(2);
        assert_eq!(engine.collect_garbage(), 1);
        assert_eq!(engine.collect_garbage(), 0);
    }
}
