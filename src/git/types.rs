use serde::Serialize;
use std::fmt;

/// The revision a buffer is diffed against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CompareTarget {
    #[default]
    Head,
    Branch(String),
    Tag(String),
    Remote(String),
    Commit(String),
}

impl CompareTarget {
    /// Interpret a user-supplied revision string, e.g. a `compare_against`
    /// setting or a command-line flag.
    ///
    /// `origin` alone is kept as a remote name; the pipeline does not expand it
    /// to the current branch here because that needs a VCS call.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("HEAD") {
            return CompareTarget::Head;
        }
        if value.starts_with("refs/heads/") {
            return CompareTarget::Branch(value.to_string());
        }
        if value.starts_with("refs/tags/") {
            return CompareTarget::Tag(value.to_string());
        }
        if let Some(remote) = value.strip_prefix("refs/remotes/") {
            return CompareTarget::Remote(remote.to_string());
        }
        if is_commit_hash(value) {
            return CompareTarget::Commit(value.to_string());
        }
        if value == "origin" || value.starts_with("origin/") {
            return CompareTarget::Remote(value.to_string());
        }
        CompareTarget::Branch(value.to_string())
    }

    /// The revision argument handed to `rev-parse`, or `None` for a commit
    /// that needs no resolving.
    pub fn revision(&self) -> Option<&str> {
        match self {
            CompareTarget::Head => Some("HEAD"),
            CompareTarget::Branch(name) | CompareTarget::Tag(name) | CompareTarget::Remote(name) => {
                Some(name)
            }
            CompareTarget::Commit(_) => None,
        }
    }

    pub fn commit_hash(&self) -> Option<&str> {
        match self {
            CompareTarget::Commit(hash) => Some(hash),
            _ => None,
        }
    }

    pub fn is_head(&self) -> bool {
        matches!(self, CompareTarget::Head)
    }
}

impl fmt::Display for CompareTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareTarget::Head => write!(f, "HEAD"),
            CompareTarget::Branch(name) => {
                write!(f, "{}", name.strip_prefix("refs/heads/").unwrap_or(name))
            }
            CompareTarget::Tag(name) => {
                write!(f, "{}", name.strip_prefix("refs/tags/").unwrap_or(name))
            }
            CompareTarget::Remote(name) => write!(f, "{name}"),
            CompareTarget::Commit(hash) => write!(f, "{}", &hash[..7.min(hash.len())]),
        }
    }
}

fn is_commit_hash(value: &str) -> bool {
    (7..=64).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// A compare target pinned to the content id the VCS resolved it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub target: CompareTarget,
    pub content_id: String,
}

/// State of the tracked file in the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Committed,
    Staged,
    Modified,
    StagedAndModified,
    Untracked,
    Ignored,
    #[default]
    Unknown,
}

impl FileState {
    /// Map the two-character `XY` code of `status --porcelain=2`.
    pub fn from_xy(xy: &str) -> Self {
        let mut chars = xy.chars();
        let index = chars.next().unwrap_or('.');
        let worktree = chars.next().unwrap_or('.');
        match (index != '.', worktree != '.') {
            (true, true) => FileState::StagedAndModified,
            (true, false) => FileState::Staged,
            (false, true) => FileState::Modified,
            (false, false) => FileState::Committed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Committed => "committed",
            FileState::Staged => "staged",
            FileState::Modified => "modified",
            FileState::StagedAndModified => "staged and modified",
            FileState::Untracked => "untracked",
            FileState::Ignored => "ignored",
            FileState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// [`FileState`] plus the line counters of the latest diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub state: FileState,
    pub lines_inserted: usize,
    pub lines_modified: usize,
    pub lines_deleted: usize,
}

/// One entry of a compare-target picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub target: CompareTarget,
    pub title: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_target_parse() {
        assert_eq!(CompareTarget::parse("HEAD"), CompareTarget::Head);
        assert_eq!(CompareTarget::parse(""), CompareTarget::Head);
        assert_eq!(
            CompareTarget::parse("refs/heads/main"),
            CompareTarget::Branch("refs/heads/main".to_string())
        );
        assert_eq!(
            CompareTarget::parse("refs/tags/v1.0"),
            CompareTarget::Tag("refs/tags/v1.0".to_string())
        );
        assert_eq!(
            CompareTarget::parse("refs/remotes/origin/main"),
            CompareTarget::Remote("origin/main".to_string())
        );
        assert_eq!(
            CompareTarget::parse("origin/dev"),
            CompareTarget::Remote("origin/dev".to_string())
        );
        assert_eq!(
            CompareTarget::parse("1a2b3c4d"),
            CompareTarget::Commit("1a2b3c4d".to_string())
        );
        assert_eq!(
            CompareTarget::parse("feature"),
            CompareTarget::Branch("feature".to_string())
        );
    }

    #[test]
    fn test_compare_target_revision() {
        assert_eq!(CompareTarget::Head.revision(), Some("HEAD"));
        assert_eq!(
            CompareTarget::Tag("refs/tags/v1".to_string()).revision(),
            Some("refs/tags/v1")
        );
        let commit = CompareTarget::Commit("abcdef0123".to_string());
        assert_eq!(commit.revision(), None);
        assert_eq!(commit.commit_hash(), Some("abcdef0123"));
    }

    #[test]
    fn test_compare_target_display() {
        assert_eq!(CompareTarget::Head.to_string(), "HEAD");
        assert_eq!(
            CompareTarget::Branch("refs/heads/main".to_string()).to_string(),
            "main"
        );
        assert_eq!(
            CompareTarget::Commit("0123456789abcdef".to_string()).to_string(),
            "0123456"
        );
    }

    #[test]
    fn test_file_state_from_xy() {
        assert_eq!(FileState::from_xy(".."), FileState::Committed);
        assert_eq!(FileState::from_xy("M."), FileState::Staged);
        assert_eq!(FileState::from_xy(".M"), FileState::Modified);
        assert_eq!(FileState::from_xy("MM"), FileState::StagedAndModified);
        assert_eq!(FileState::from_xy("A."), FileState::Staged);
    }
}
