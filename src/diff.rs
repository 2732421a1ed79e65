//! Interpreter for `diff -U0` output.
//!
//! Every hunk becomes one of three line classes on the new (buffer) side:
//! pure insertions are `inserted`, pure deletions put a single marker on the
//! line after the deletion point, and everything else is `modified`.

use crate::error::{GutterError, Result};
use log::debug;
use serde::Serialize;

/// One hunk of a zero-context unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_size: usize,
    pub new_start: usize,
    pub new_size: usize,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

impl Hunk {
    fn is_insertion(&self) -> bool {
        self.old_size == 0
    }

    fn is_deletion(&self) -> bool {
        self.new_size == 0
    }

    /// Buffer line the hunk's marker sits on.
    pub fn anchor(&self) -> usize {
        if self.is_deletion() {
            self.new_start + 1
        } else {
            self.new_start.max(1)
        }
    }

    fn contains(&self, row: usize) -> bool {
        if self.is_deletion() {
            row == self.new_start + 1
        } else {
            (self.new_start..self.new_start + self.new_size).contains(&row)
        }
    }
}

/// Line classes of a buffer, 1-based and pairwise disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub first_line: usize,
    pub last_line: usize,
    pub inserted: Vec<usize>,
    pub modified: Vec<usize>,
    pub deleted: Vec<usize>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Every line of a buffer with `line_count` lines marked as inserted.
    pub fn all_inserted(line_count: usize) -> Self {
        if line_count == 0 {
            return Self::default();
        }
        Self {
            first_line: 1,
            last_line: line_count,
            inserted: (1..=line_count).collect(),
            ..Default::default()
        }
    }
}

/// Navigation data for the popup of one hunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HunkMeta {
    pub added_lines: Vec<String>,
    pub first_change: Option<usize>,
    pub prev_change: Option<usize>,
    pub next_change: Option<usize>,
}

/// Hunk selected for a buffer line. `start` is `None` when the line is not
/// part of any change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineChange {
    pub deleted_lines: Vec<String>,
    pub start: Option<usize>,
    pub size: usize,
    pub meta: HunkMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffParser {
    hunks: Vec<Hunk>,
}

/// Parse `@@ -<ostart>[,<osize>] +<nstart>[,<nsize>] @@`.
pub fn parse_hunk_header(line: &str) -> Result<(usize, usize, usize, usize)> {
    let malformed = || GutterError::MalformedHunkHeader(line.to_string());

    let rest = line.strip_prefix("@@ ").ok_or_else(malformed)?;
    let (ranges, _) = rest.split_once(" @@").ok_or_else(malformed)?;
    let (old, new) = ranges.split_once(' ').ok_or_else(malformed)?;
    let old = old.strip_prefix('-').ok_or_else(malformed)?;
    let new = new.strip_prefix('+').ok_or_else(malformed)?;

    let range = |text: &str| -> Option<(usize, usize)> {
        match text.split_once(',') {
            Some((start, size)) => Some((start.parse().ok()?, size.parse().ok()?)),
            None => Some((text.parse().ok()?, 1)),
        }
    };
    let (old_start, old_size) = range(old).ok_or_else(malformed)?;
    let (new_start, new_size) = range(new).ok_or_else(malformed)?;
    Ok((old_start, old_size, new_start, new_size))
}

impl DiffParser {
    /// Parse diff text. Malformed hunk headers are skipped together with their
    /// body; the other hunks still count.
    pub fn parse(diff: &str) -> Self {
        let mut hunks = Vec::new();
        let mut current: Option<Hunk> = None;

        for line in diff.lines() {
            if line.starts_with("@@") {
                hunks.extend(current.take());
                match parse_hunk_header(line) {
                    Ok((old_start, old_size, new_start, new_size)) => {
                        current = Some(Hunk {
                            old_start,
                            old_size,
                            new_start,
                            new_size,
                            removed: Vec::new(),
                            added: Vec::new(),
                        });
                    }
                    Err(e) => debug!("Skipping hunk: {e}"),
                }
                continue;
            }
            if line.starts_with("diff ") {
                hunks.extend(current.take());
                continue;
            }

            let Some(hunk) = current.as_mut() else {
                continue;
            };
            if let Some(text) = line.strip_prefix('-') {
                hunk.removed.push(text.to_string());
            } else if let Some(text) = line.strip_prefix('+') {
                hunk.added.push(text.to_string());
            }
        }
        hunks.extend(current);

        Self { hunks }
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn result(&self) -> DiffResult {
        let (Some(first), Some(last)) = (self.hunks.first(), self.hunks.last()) else {
            return DiffResult::default();
        };

        let mut inserted = Vec::new();
        let mut modified = Vec::new();
        let mut deleted = Vec::new();
        for hunk in &self.hunks {
            let lines = hunk.new_start.max(1)..hunk.new_start + hunk.new_size;
            if hunk.is_insertion() {
                inserted.extend(lines);
            } else if hunk.is_deletion() {
                deleted.push(hunk.new_start + 1);
            } else {
                modified.extend(lines);
            }
        }

        for lines in [&mut inserted, &mut modified, &mut deleted] {
            lines.sort_unstable();
            lines.dedup();
        }
        // A deletion marker never hides a line that itself changed.
        deleted.retain(|line| {
            inserted.binary_search(line).is_err() && modified.binary_search(line).is_err()
        });

        DiffResult {
            first_line: first.new_start.max(1),
            last_line: last.new_start + last.new_size.max(1),
            inserted,
            modified,
            deleted,
        }
    }

    /// Anchor line of every hunk, in buffer order.
    pub fn changed_blocks(&self) -> Vec<usize> {
        let mut blocks: Vec<usize> = self.hunks.iter().map(Hunk::anchor).collect();
        blocks.dedup();
        blocks
    }

    /// First change below `row`, wrapping to the top when allowed.
    pub fn next_change(&self, row: usize, wrap: bool) -> Option<usize> {
        let blocks = self.changed_blocks();
        blocks
            .iter()
            .copied()
            .find(|&line| line > row)
            .or_else(|| if wrap { blocks.first().copied() } else { None })
    }

    /// Last change above `row`, wrapping to the bottom when allowed.
    pub fn prev_change(&self, row: usize, wrap: bool) -> Option<usize> {
        let blocks = self.changed_blocks();
        blocks
            .iter()
            .rev()
            .copied()
            .find(|&line| line < row)
            .or_else(|| if wrap { blocks.last().copied() } else { None })
    }

    /// Hunk covering `row`. A pure deletion claims the line right after it.
    pub fn line_change(&self, row: usize, wrap: bool) -> LineChange {
        let first_change = self.changed_blocks().first().copied();

        let Some(hunk) = self.hunks.iter().find(|hunk| hunk.contains(row)) else {
            return LineChange {
                meta: HunkMeta {
                    first_change,
                    prev_change: self.prev_change(row, wrap),
                    next_change: self.next_change(row, wrap),
                    ..Default::default()
                },
                ..Default::default()
            };
        };

        let anchor = hunk.anchor();
        LineChange {
            deleted_lines: hunk.removed.clone(),
            start: Some(hunk.new_start),
            size: hunk.new_size,
            meta: HunkMeta {
                added_lines: hunk.added.clone(),
                first_change,
                prev_change: self.prev_change(anchor, wrap),
                next_change: self.next_change(anchor, wrap),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(diff: &str) -> DiffResult {
        DiffParser::parse(diff).result()
    }

    #[test]
    fn test_single_line_modification() {
        let result = parse("@@ -2 +2 @@\n-B\n+X\n");
        assert_eq!(
            result,
            DiffResult {
                first_line: 2,
                last_line: 3,
                inserted: vec![],
                modified: vec![2],
                deleted: vec![],
            }
        );
    }

    #[test]
    fn test_pure_insertion_at_top() {
        let result = parse("@@ -0,0 +1 @@\n+Z\n");
        assert_eq!(result.inserted, vec![1]);
        assert!(result.modified.is_empty());
        assert!(result.deleted.is_empty());
        assert_eq!(result.first_line, 1);
    }

    #[test]
    fn test_pure_deletion_of_second_line() {
        let result = parse("@@ -2 +1,0 @@\n-B\n");
        assert_eq!(result.deleted, vec![2]);
        assert!(result.inserted.is_empty());
        assert!(result.modified.is_empty());
    }

    #[test]
    fn test_deletion_at_top() {
        let result = parse("@@ -1 +0,0 @@\n-A\n");
        assert_eq!(result.deleted, vec![1]);
        assert_eq!(result.first_line, 1);
    }

    #[test]
    fn test_replace_two_with_one() {
        let result = parse("@@ -1,2 +1 @@\n-A\n-B\n+C\n");
        assert_eq!(result.modified, vec![1]);
        assert!(result.inserted.is_empty());
        assert!(result.deleted.is_empty());
    }

    #[test]
    fn test_empty_diff() {
        let result = parse("");
        assert_eq!(result, DiffResult::default());
        assert_eq!(result.first_line, 0);
        assert!(result.is_empty());
    }

    #[test]
    fn test_file_headers_are_ignored() {
        let diff = "diff --git a/t b/b\nindex 1..2 100644\n--- a/t\n+++ b/b\n@@ -2 +2 @@\n-B\n+X\n";
        let parser = DiffParser::parse(diff);
        assert_eq!(parser.hunks().len(), 1);
        assert_eq!(parser.hunks()[0].removed, vec!["B"]);
        assert_eq!(parser.hunks()[0].added, vec!["X"]);
    }

    #[test]
    fn test_malformed_header_is_skipped() {
        let diff = "@@ -1 +1 @@\n-a\n+b\n@@ -x +y @@\n-c\n+d\n@@ -9,0 +10,2 @@\n+e\n+f\n";
        let result = parse(diff);
        assert_eq!(result.modified, vec![1]);
        assert_eq!(result.inserted, vec![10, 11]);
        assert_eq!(result.last_line, 12);
    }

    #[test]
    fn test_parse_hunk_header() {
        assert_eq!(parse_hunk_header("@@ -3,2 +4 @@").unwrap(), (3, 2, 4, 1));
        assert_eq!(
            parse_hunk_header("@@ -0,0 +1,3 @@ fn main()").unwrap(),
            (0, 0, 1, 3)
        );
        assert!(matches!(
            parse_hunk_header("@@ -a +1 @@"),
            Err(GutterError::MalformedHunkHeader(_))
        ));
        assert!(parse_hunk_header("@@ garbage").is_err());
    }

    #[test]
    fn test_deletion_marker_does_not_overlap_change() {
        let diff = "@@ -3 +2,0 @@\n-c\n@@ -5 +3 @@\n-e\n+E\n";
        let result = parse(diff);
        assert_eq!(result.modified, vec![3]);
        assert!(result.deleted.is_empty());
    }

    fn sample() -> DiffParser {
        // inserted 2..=3, deletion after 6, modified 10
        DiffParser::parse(
            "@@ -1,0 +2,2 @@\n+i1\n+i2\n@@ -6 +6,0 @@\n-gone\n@@ -10 +9 @@\n-old\n+new\n",
        )
    }

    #[test]
    fn test_changed_blocks_and_navigation() {
        let parser = sample();
        assert_eq!(parser.changed_blocks(), vec![2, 7, 9]);
        assert_eq!(parser.next_change(2, true), Some(7));
        assert_eq!(parser.next_change(9, true), Some(2));
        assert_eq!(parser.next_change(9, false), None);
        assert_eq!(parser.prev_change(7, true), Some(2));
        assert_eq!(parser.prev_change(2, true), Some(9));
        assert_eq!(parser.prev_change(1, false), None);
    }

    #[test]
    fn test_line_change_inside_insertion() {
        let change = sample().line_change(3, true);
        assert_eq!(change.start, Some(2));
        assert_eq!(change.size, 2);
        assert!(change.deleted_lines.is_empty());
        assert_eq!(change.meta.added_lines, vec!["i1", "i2"]);
        assert_eq!(change.meta.first_change, Some(2));
        assert_eq!(change.meta.prev_change, Some(9));
        assert_eq!(change.meta.next_change, Some(7));
    }

    #[test]
    fn test_line_change_prefers_deletion_on_following_line() {
        let parser = DiffParser::parse("@@ -3 +2,0 @@\n-c\n@@ -4,0 +3 @@\n+n\n");
        let change = parser.line_change(3, false);
        assert_eq!(change.start, Some(2));
        assert_eq!(change.size, 0);
        assert_eq!(change.deleted_lines, vec!["c"]);
    }

    #[test]
    fn test_line_change_outside_hunks() {
        let change = sample().line_change(5, false);
        assert_eq!(change.start, None);
        assert_eq!(change.size, 0);
        assert_eq!(change.meta.prev_change, Some(2));
        assert_eq!(change.meta.next_change, Some(7));
    }

    #[test]
    fn test_all_inserted() {
        let result = DiffResult::all_inserted(3);
        assert_eq!(result.inserted, vec![1, 2, 3]);
        assert_eq!((result.first_line, result.last_line), (1, 3));
        assert!(DiffResult::all_inserted(0).is_empty());
    }

    /// Build a well-formed `-U0` diff from (gap, old_size, new_size) triples.
    fn synthesize(hunks: &[(usize, usize, usize)]) -> String {
        let mut diff = String::from("--- a\n+++ b\n");
        let (mut old_pos, mut new_pos) = (0, 0);
        for (index, &(gap, old_size, new_size)) in hunks.iter().enumerate() {
            if old_size == 0 && new_size == 0 {
                continue;
            }
            let gap = if index == 0 { gap } else { gap.max(1) };
            let old_start = old_pos + gap + usize::from(old_size > 0);
            let new_start = new_pos + gap + usize::from(new_size > 0);
            diff.push_str(&format!(
                "@@ -{old_start},{old_size} +{new_start},{new_size} @@\n"
            ));
            for i in 0..old_size {
                diff.push_str(&format!("-old{i}\n"));
            }
            for i in 0..new_size {
                diff.push_str(&format!("+new{i}\n"));
            }
            old_pos += gap + old_size;
            new_pos += gap + new_size;
        }
        diff
    }

    fn strictly_increasing(lines: &[usize]) -> bool {
        lines.windows(2).all(|pair| pair[0] < pair[1])
    }

    proptest! {
        #[test]
        fn test_result_invariants(hunks in prop::collection::vec((0usize..5, 0usize..4, 0usize..4), 0..12)) {
            let diff = synthesize(&hunks);
            let result = parse(&diff);

            for lines in [&result.inserted, &result.modified, &result.deleted] {
                prop_assert!(strictly_increasing(lines));
                prop_assert!(lines.iter().all(|&line| line >= 1));
            }
            for line in &result.inserted {
                prop_assert!(!result.modified.contains(line));
                prop_assert!(!result.deleted.contains(line));
            }
            for line in &result.modified {
                prop_assert!(!result.deleted.contains(line));
            }
            prop_assert_eq!(result.first_line == 0, result.is_empty());
            prop_assert_eq!(parse(&diff), result);
        }
    }
}
