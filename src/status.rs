//! Status line and line annotation text.
//!
//! Both are rendered from user templates with a small placeholder language:
//! `{name}` inserts a variable, `[ ... ]` is kept only when every variable
//! inside it is set.

use crate::git::operations::{BlameLine, humanize_age};
use crate::git::{CompareTarget, FileState, FileStatus};
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

pub const GIT_UNAVAILABLE: &str = "git is not available";

/// What `status --porcelain=2 -z -b` reports for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusInfo {
    pub branch: String,
    pub head: String,
    pub upstream: Option<String>,
    pub ahead: usize,
    pub behind: usize,
    pub file_state: FileState,
    pub added_files: usize,
    pub deleted_files: usize,
    pub modified_files: usize,
    pub staged_files: usize,
}

/// Parse NUL separated porcelain v2 output.
pub fn parse_status(output: &str) -> StatusInfo {
    let mut info = StatusInfo {
        file_state: FileState::Committed,
        ..Default::default()
    };
    let mut records = output.split('\0').filter(|record| !record.is_empty());

    while let Some(record) = records.next() {
        if let Some(header) = record.strip_prefix("# ") {
            let (key, value) = header.split_once(' ').unwrap_or((header, ""));
            match key {
                "branch.oid" => info.head = value.to_string(),
                "branch.head" => info.branch = value.to_string(),
                "branch.upstream" => info.upstream = Some(value.to_string()),
                "branch.ab" => {
                    for count in value.split_whitespace() {
                        if let Some(ahead) = count.strip_prefix('+') {
                            info.ahead = ahead.parse().unwrap_or(0);
                        } else if let Some(behind) = count.strip_prefix('-') {
                            info.behind = behind.parse().unwrap_or(0);
                        }
                    }
                }
                _ => {}
            }
            continue;
        }

        let mut fields = record.splitn(3, ' ');
        let kind = fields.next().unwrap_or("");
        match kind {
            "1" | "2" | "u" => {
                let xy = fields.next().unwrap_or("..");
                if kind == "2" {
                    // Renames carry the original path as a separate record.
                    records.next();
                }
                info.file_state = if kind == "u" {
                    FileState::Modified
                } else {
                    FileState::from_xy(xy)
                };
                let mut codes = xy.chars();
                let index = codes.next().unwrap_or('.');
                let worktree = codes.next().unwrap_or('.');
                if index != '.' {
                    info.staged_files += 1;
                }
                if index == 'A' {
                    info.added_files += 1;
                }
                if index == 'D' || worktree == 'D' {
                    info.deleted_files += 1;
                }
                if worktree == 'M' {
                    info.modified_files += 1;
                }
            }
            "?" => {
                info.file_state = FileState::Untracked;
                info.added_files += 1;
            }
            "!" => info.file_state = FileState::Ignored,
            _ => {}
        }
    }

    info
}

/// Named template values. Each value carries whether it counts as set for
/// optional groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    values: HashMap<String, (String, bool)>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>, is_set: bool) {
        self.values.insert(name.to_string(), (value.into(), is_set));
    }

    /// Set iff non-empty.
    pub fn text(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let is_set = !value.is_empty();
        self.set(name, value, is_set);
    }

    /// Set iff non-zero.
    pub fn count(&mut self, name: &str, value: usize) {
        self.set(name, value.to_string(), value > 0);
    }

    fn lookup(&self, name: &str) -> (&str, bool) {
        self.values
            .get(name)
            .map_or(("", false), |(value, is_set)| (value.as_str(), *is_set))
    }
}

/// Render `template` with `vars`. Unknown variables render empty.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut chars = template.chars().peekable();
    render_sequence(&mut chars, vars, false).0
}

fn render_sequence(chars: &mut Peekable<Chars<'_>>, vars: &TemplateVars, in_group: bool) -> (String, bool) {
    let mut out = String::new();
    let mut all_set = true;

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    out.push('{');
                    out.push_str(&name);
                    continue;
                }
                let (value, is_set) = vars.lookup(name.trim());
                out.push_str(value);
                all_set &= is_set;
            }
            '[' => {
                let (group, group_set) = render_sequence(chars, vars, true);
                if group_set {
                    out.push_str(&group);
                }
            }
            ']' if in_group => return (out, all_set),
            c => out.push(c),
        }
    }

    (out, all_set)
}

/// Variables of the status line template.
pub fn status_vars(
    repo: &str,
    info: &StatusInfo,
    compare: &CompareTarget,
    status: &FileStatus,
) -> TemplateVars {
    let mut vars = TemplateVars::new();
    vars.text("repo", repo);
    let branch = if info.branch == "(detached)" {
        info.head.chars().take(7).collect()
    } else {
        info.branch.clone()
    };
    vars.text("branch", branch);
    vars.set("compare", compare.to_string(), !compare.is_head());
    vars.text("remote", info.upstream.clone().unwrap_or_default());
    vars.count("ahead", info.ahead);
    vars.count("behind", info.behind);
    vars.count("added_files", info.added_files);
    vars.count("deleted_files", info.deleted_files);
    vars.count("modified_files", info.modified_files);
    vars.count("staged_files", info.staged_files);
    vars.text("state", status.state.as_str());
    vars.count("deleted", status.lines_deleted);
    vars.count("inserted", status.lines_inserted);
    vars.count("modified", status.lines_modified);
    vars
}

/// Variables of the line annotation template, `None` for uncommitted lines.
pub fn annotation_vars(blame: &BlameLine, now: i64) -> Option<TemplateVars> {
    if blame.is_uncommitted() {
        return None;
    }
    let mut vars = TemplateVars::new();
    vars.text("line_commit", blame.commit.chars().take(7).collect::<String>());
    vars.text("line_author", blame.author.as_str());
    vars.text("line_author_mail", blame.author_mail.as_str());
    vars.text("line_author_age", humanize_age(now - blame.author_time));
    vars.text("line_summary", blame.summary.as_str());
    Some(vars)
}
