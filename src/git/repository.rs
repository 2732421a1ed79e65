use log::debug;
use std::path::{Component, Path, PathBuf};

/// Location of a file inside a working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkTree {
    /// Root directory of the checkout (the directory holding `.git`).
    pub root: PathBuf,
    /// Path of the file relative to `root`, always `/`-separated.
    pub relative_path: String,
}

impl WorkTree {
    /// Name shown for the repository in status text.
    pub fn repo_name(&self) -> String {
        self.root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// The file's path with symlinks resolved, as git sees it.
    pub fn file_path(&self) -> PathBuf {
        self.relative_path
            .split('/')
            .fold(self.root.clone(), |path, component| path.join(component))
    }
}

/// Find the working tree containing `file_path`.
///
/// Walks upward from the file's parent directory until a directory holding a
/// `.git` entry (directory or worktree file) is found. Symlinks are resolved
/// first, and anything living inside a `.git` directory is rejected.
pub fn locate(file_path: &Path) -> Option<WorkTree> {
    let real_path = std::fs::canonicalize(file_path).unwrap_or_else(|_| file_path.to_path_buf());

    if real_path
        .components()
        .any(|component| matches!(component, Component::Normal(name) if name == ".git"))
    {
        debug!("Ignoring file inside a .git directory: {real_path:?}");
        return None;
    }

    let parent = real_path.parent()?;
    for dir in parent.ancestors() {
        if dir.join(".git").exists() {
            let relative = real_path.strip_prefix(dir).ok()?;
            let relative_path = to_slash_path(relative);
            debug!("Located {real_path:?} in working tree {dir:?} as {relative_path}");
            return Some(WorkTree {
                root: dir.to_path_buf(),
                relative_path,
            });
        }
    }

    debug!("No working tree found for {real_path:?}");
    None
}

/// Join path components with `/` regardless of the platform separator.
fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
