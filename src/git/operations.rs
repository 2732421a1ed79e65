//! Command lines handed to the git binary and parsers for their output.
//!
//! The argument order matters to some git versions, so every builder here
//! produces the exact argv the engine relies on.

use super::types::{Choice, CompareTarget};
use crate::config::{DiffAlgorithm, IgnoreWhitespace};
use chrono::{Local, TimeZone};
use std::ffi::OsString;
use std::path::Path;

/// Field separator used in `--pretty` / `--format` strings.
const SEP: char = '\x07';

fn argv<const N: usize>(args: [&str; N]) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

/// `diff -U0 --no-color --no-index [whitespace] [algorithm] <target> <buffer>`
pub fn diff_args(
    ignore_whitespace: IgnoreWhitespace,
    algorithm: DiffAlgorithm,
    target_file: &Path,
    buffer_file: &Path,
) -> Vec<OsString> {
    let mut args = argv(["diff", "-U0", "--no-color", "--no-index"]);
    if let Some(flag) = ignore_whitespace.flag() {
        args.push(flag.into());
    }
    args.push(algorithm.flag().into());
    args.push(target_file.as_os_str().to_os_string());
    args.push(buffer_file.as_os_str().to_os_string());
    args
}

pub fn rev_parse_args(revision: &str) -> Vec<OsString> {
    argv(["rev-parse", revision])
}

pub fn current_branch_args() -> Vec<OsString> {
    argv(["rev-parse", "--abbrev-ref", "HEAD"])
}

pub fn tags_args() -> Vec<OsString> {
    argv(["show-ref", "--tags", "--abbrev=7"])
}

pub fn log_all_args() -> Vec<OsString> {
    argv([
        "log",
        "--all",
        "--pretty=%h %s\x07%an <%aE>\x07%ad (%ar)",
        "--date=local",
        "--max-count=9000",
    ])
}

pub fn log_file_args(relative_path: &str) -> Vec<OsString> {
    argv([
        "log",
        "--pretty=%at\x07%h %s\x07%an <%aE>\x07%ad (%ar)",
        "--date=local",
        "--max-count=9000",
        "--",
        relative_path,
    ])
}

pub fn branches_args() -> Vec<OsString> {
    argv([
        "for-each-ref",
        "--sort=-committerdate",
        "--format=%(subject)\x07%(refname)\x07%(objectname)",
        "refs/heads/",
    ])
}

pub fn archive_args(commit: &str, relative_path: &str) -> Vec<OsString> {
    argv(["archive", "--format=zip", commit, relative_path])
}

pub fn status_args(file: &Path) -> Vec<OsString> {
    let mut args = argv(["status", "--porcelain=2", "-z", "-b", "-u", "--ignored"]);
    args.push(file.as_os_str().to_os_string());
    args
}

pub fn ls_files_args(file: &Path, ignored: bool) -> Vec<OsString> {
    let mut args = argv(["ls-files", "--other", "--exclude-standard"]);
    if ignored {
        args.push("-i".into());
    }
    args.push(file.as_os_str().to_os_string());
    args
}

pub fn blame_args(row: usize, contents: &Path, relative_path: &str) -> Vec<OsString> {
    let range = format!("{row},{row}");
    let mut args = argv(["blame", "--porcelain", "-L", &range, "--contents"]);
    args.push(contents.as_os_str().to_os_string());
    args.push("--".into());
    args.push(relative_path.into());
    args
}

/// Parse `show-ref --tags --abbrev=7`.
pub fn parse_tags(output: &str) -> Vec<Choice> {
    output
        .lines()
        .filter_map(|line| {
            let (hash, refname) = line.trim().split_once(' ')?;
            if refname.ends_with("^{}") {
                return None;
            }
            let name = refname.strip_prefix("refs/tags/").unwrap_or(refname);
            Some(Choice {
                target: CompareTarget::Tag(refname.to_string()),
                title: name.to_string(),
                detail: hash.to_string(),
            })
        })
        .collect()
}

/// Parse `for-each-ref` output in the [`branches_args`] format.
pub fn parse_branches(output: &str) -> Vec<Choice> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(SEP);
            let subject = fields.next()?;
            let refname = fields.next()?;
            let object = fields.next().unwrap_or("");
            let name = refname.strip_prefix("refs/heads/").unwrap_or(refname);
            Some(Choice {
                target: CompareTarget::Branch(refname.to_string()),
                title: name.to_string(),
                detail: format!("{} {subject}", &object[..7.min(object.len())]),
            })
        })
        .collect()
}

/// Parse `log --all` output in the [`log_all_args`] format.
pub fn parse_commits(output: &str) -> Vec<Choice> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(SEP);
            let title = fields.next()?;
            let author = fields.next().unwrap_or("");
            let date = fields.next().unwrap_or("");
            let (hash, _) = title.split_once(' ').unwrap_or((title, ""));
            if hash.is_empty() {
                return None;
            }
            Some(Choice {
                target: CompareTarget::Commit(hash.to_string()),
                title: title.to_string(),
                detail: format!("{author}\n{date}"),
            })
        })
        .collect()
}

/// Parse file history in the [`log_file_args`] format, newest first.
pub fn parse_file_commits(output: &str) -> Vec<Choice> {
    let mut entries: Vec<(i64, Choice)> = output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(SEP);
            let timestamp: i64 = fields.next()?.trim().parse().ok()?;
            let title = fields.next()?;
            let author = fields.next().unwrap_or("");
            let (hash, _) = title.split_once(' ').unwrap_or((title, ""));
            let date = Local
                .timestamp_opt(timestamp, 0)
                .single()
                .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            Some((
                timestamp,
                Choice {
                    target: CompareTarget::Commit(hash.to_string()),
                    title: title.to_string(),
                    detail: format!("{author}\n{date}"),
                },
            ))
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    entries.into_iter().map(|(_, choice)| choice).collect()
}

/// One line of `blame --porcelain` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    pub commit: String,
    pub author: String,
    pub author_mail: String,
    pub author_time: i64,
    pub summary: String,
}

impl BlameLine {
    /// Lines not yet committed are attributed to the all-zero commit.
    pub fn is_uncommitted(&self) -> bool {
        self.commit.chars().all(|c| c == '0')
    }
}

pub fn parse_blame(output: &str) -> Option<BlameLine> {
    let mut lines = output.lines();
    let commit = lines.next()?.split_whitespace().next()?.to_string();
    let mut blame = BlameLine {
        commit,
        author: String::new(),
        author_mail: String::new(),
        author_time: 0,
        summary: String::new(),
    };
    for line in lines {
        if line.starts_with('\t') {
            break;
        }
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        match key {
            "author" => blame.author = value.to_string(),
            "author-mail" => {
                blame.author_mail = value.trim_matches(|c| c == '<' || c == '>').to_string()
            }
            "author-time" => blame.author_time = value.parse().unwrap_or(0),
            "summary" => blame.summary = value.to_string(),
            _ => {}
        }
    }
    Some(blame)
}

/// Coarse "time ago" text for annotations.
pub fn humanize_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (value, unit) = match seconds {
        s if s < 60 => return "just now".to_string(),
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s if s < 2_592_000 => (s / 86_400, "day"),
        s if s < 31_536_000 => (s / 2_592_000, "month"),
        s => (s / 31_536_000, "year"),
    };
    if value == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{value} {unit}s ago")
    }
}
