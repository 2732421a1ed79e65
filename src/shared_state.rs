use crate::git::CompareTarget;
use scc::HashMap;
use std::path::{Path, PathBuf};

/// Process-wide compare target of every working tree, keyed by the
/// canonical working-tree path.
///
/// Written only from the host context (compare-selection operations), read by
/// pipeline runs. Nothing is persisted.
#[derive(Debug, Default)]
pub struct CompareTargets {
    targets: HashMap<PathBuf, CompareTarget>,
}

impl CompareTargets {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(root: &Path) -> PathBuf {
        std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
    }

    /// Current target of `root`, registering `default` the first time the
    /// working tree is seen.
    pub fn get_or_insert(&self, root: &Path, default: CompareTarget) -> CompareTarget {
        self.targets
            .entry(Self::key(root))
            .or_insert(default)
            .get()
            .clone()
    }

    pub fn get(&self, root: &Path) -> Option<CompareTarget> {
        self.targets.read(&Self::key(root), |_, target| target.clone())
    }

    pub fn set(&self, root: &Path, target: CompareTarget) {
        self.targets.upsert(Self::key(root), target);
    }
}
