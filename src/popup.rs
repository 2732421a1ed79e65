//! Data behind the per-hunk popup: what changed, how to undo it, and where
//! the navigation buttons lead.

use crate::diff::LineChange;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HunkKind {
    Added,
    Modified,
    Removed,
}

/// Replace `text[start..end]` with `replacement` to undo a hunk. Offsets are
/// byte offsets into the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl RevertEdit {
    pub fn apply(&self, text: &str) -> String {
        let mut reverted = String::with_capacity(text.len() + self.replacement.len());
        reverted.push_str(&text[..self.start]);
        reverted.push_str(&self.replacement);
        reverted.push_str(&text[self.end..]);
        reverted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NavButton {
    pub line: Option<usize>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupModel {
    pub kind: HunkKind,
    pub start: usize,
    pub size: usize,
    /// Common indentation of the deleted lines, in columns.
    pub indent: usize,
    pub deleted_lines: Vec<String>,
    /// Deleted lines with the common indentation removed.
    pub dedented_lines: Vec<String>,
    pub added_lines: Vec<String>,
    /// Text placed on the clipboard by "copy".
    pub copy_text: String,
    pub revert: RevertEdit,
    pub first_change: NavButton,
    pub prev_change: NavButton,
    pub next_change: NavButton,
}

impl PopupModel {
    /// Build the popup for `change`, or `None` when the line is unchanged.
    pub fn build(change: &LineChange, text: &str, tab_width: usize) -> Option<Self> {
        let start = change.start?;
        let size = change.size;
        let kind = if size == 0 {
            HunkKind::Removed
        } else if change.deleted_lines.is_empty() {
            HunkKind::Added
        } else {
            HunkKind::Modified
        };

        let tab_width = tab_width.max(1);
        let indent = min_indent(&change.deleted_lines, tab_width);
        let dedented_lines = change
            .deleted_lines
            .iter()
            .map(|line| dedent(line, indent, tab_width))
            .collect();

        let joined = change.deleted_lines.join("\n");
        let revert = revert_edit(kind, start, size, &joined, text);

        let anchor = if size == 0 { start + 1 } else { start.max(1) };
        let button = |line: Option<usize>| NavButton {
            line,
            enabled: line.is_some_and(|line| line != anchor),
        };

        Some(Self {
            kind,
            start,
            size,
            indent,
            deleted_lines: change.deleted_lines.clone(),
            dedented_lines,
            added_lines: change.meta.added_lines.clone(),
            copy_text: joined,
            revert,
            first_change: button(change.meta.first_change),
            prev_change: button(change.meta.prev_change),
            next_change: button(change.meta.next_change),
        })
    }
}

fn revert_edit(kind: HunkKind, start: usize, size: usize, joined: &str, text: &str) -> RevertEdit {
    match kind {
        HunkKind::Removed if start == 0 => RevertEdit {
            start: 0,
            end: 0,
            replacement: format!("{joined}\n"),
        },
        HunkKind::Removed => {
            let offset = end_of_line(text, start);
            RevertEdit {
                start: offset,
                end: offset,
                replacement: format!("\n{joined}"),
            }
        }
        HunkKind::Added | HunkKind::Modified => {
            let begin = line_start(text, start);
            let mut end = line_start(text, start + size);
            if kind == HunkKind::Modified && end < text.len() {
                end -= 1;
            }
            RevertEdit {
                start: begin,
                end: end.max(begin),
                replacement: joined.to_string(),
            }
        }
    }
}

/// Byte offset where 1-based `line` begins, or the text length past the end.
fn line_start(text: &str, line: usize) -> usize {
    if line <= 1 {
        return 0;
    }
    text.match_indices('\n')
        .nth(line - 2)
        .map_or(text.len(), |(index, _)| index + 1)
}

/// Byte offset of the newline ending 1-based `line`, or the text length.
fn end_of_line(text: &str, line: usize) -> usize {
    let begin = line_start(text, line);
    text[begin..].find('\n').map_or(text.len(), |index| begin + index)
}

fn indent_width(line: &str, tab_width: usize) -> Option<usize> {
    let mut column = 0;
    for c in line.chars() {
        match c {
            ' ' => column += 1,
            '\t' => column = (column / tab_width + 1) * tab_width,
            _ => return Some(column),
        }
    }
    // Blank lines do not constrain the indentation.
    None
}

fn min_indent(lines: &[String], tab_width: usize) -> usize {
    lines
        .iter()
        .filter_map(|line| indent_width(line, tab_width))
        .min()
        .unwrap_or(0)
}

fn dedent(line: &str, indent: usize, tab_width: usize) -> String {
    let mut column = 0;
    for (index, c) in line.char_indices() {
        if column >= indent {
            return format!("{}{}", " ".repeat(column - indent), &line[index..]);
        }
        match c {
            ' ' => column += 1,
            '\t' => column = (column / tab_width + 1) * tab_width,
            _ => return line[index..].to_string(),
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffParser;

    fn popup(diff: &str, text: &str, row: usize) -> PopupModel {
        let change = DiffParser::parse(diff).line_change(row, true);
        PopupModel::build(&change, text, 4).unwrap()
    }

    #[test]
    fn test_revert_modified_line() {
        let buffer = "A\nX\nC\n";
        let model = popup("@@ -2 +2 @@\n-B\n+X\n", buffer, 2);
        assert_eq!(model.kind, HunkKind::Modified);
        assert_eq!(model.revert.apply(buffer), "A\nB\nC\n");
    }

    #[test]
    fn test_revert_added_line_at_top() {
        let buffer = "Z\nA\nB\n";
        let model = popup("@@ -0,0 +1 @@\n+Z\n", buffer, 1);
        assert_eq!(model.kind, HunkKind::Added);
        assert_eq!(model.added_lines, vec!["Z"]);
        assert_eq!(model.revert.apply(buffer), "A\nB\n");
    }

    #[test]
    fn test_revert_removed_line() {
        let buffer = "A\nC\n";
        let model = popup("@@ -2 +1,0 @@\n-B\n", buffer, 2);
        assert_eq!(model.kind, HunkKind::Removed);
        assert_eq!(model.start, 1);
        assert_eq!(model.revert.apply(buffer), "A\nB\nC\n");
    }

    #[test]
    fn test_revert_removed_at_top() {
        let buffer = "B\n";
        let model = popup("@@ -1 +0,0 @@\n-A\n", buffer, 1);
        assert_eq!(
            model.revert,
            RevertEdit {
                start: 0,
                end: 0,
                replacement: "A\n".to_string()
            }
        );
        assert_eq!(model.revert.apply(buffer), "A\nB\n");
    }

    #[test]
    fn test_revert_two_replaced_by_one() {
        let buffer = "C\n";
        let model = popup("@@ -1,2 +1 @@\n-A\n-B\n+C\n", buffer, 1);
        // The last line keeps no trailing newline of its own.
        assert_eq!(model.revert.apply(buffer), "A\nB");
    }

    #[test]
    fn test_unchanged_line_has_no_popup() {
        let change = DiffParser::parse("@@ -2 +2 @@\n-B\n+X\n").line_change(1, true);
        assert!(PopupModel::build(&change, "A\nX\n", 4).is_none());
    }

    #[test]
    fn test_min_indent_with_tabs() {
        let lines = vec![
            "\tfoo".to_string(),
            "      bar".to_string(),
            "".to_string(),
            "  \tbaz".to_string(),
        ];
        assert_eq!(min_indent(&lines, 4), 4);
        assert_eq!(dedent("      bar", 4, 4), "  bar");
        assert_eq!(dedent("\tfoo", 4, 4), "foo");
        assert_eq!(min_indent(&[], 4), 0);
    }

    #[test]
    fn test_nav_buttons() {
        let diff = "@@ -1 +1 @@\n-a\n+b\n@@ -5,0 +6 @@\n+c\n";
        let model = popup(diff, "b\n2\n3\n4\n5\nc\n", 1);
        assert_eq!(model.first_change.line, Some(1));
        assert!(!model.first_change.enabled);
        assert_eq!(model.next_change.line, Some(6));
        assert!(model.next_change.enabled);
        assert_eq!(model.prev_change.line, Some(6));
        assert!(model.prev_change.enabled);
    }

    #[test]
    fn test_line_offsets() {
        let text = "ab\ncd\n";
        assert_eq!(line_start(text, 1), 0);
        assert_eq!(line_start(text, 2), 3);
        assert_eq!(line_start(text, 3), 6);
        assert_eq!(line_start(text, 9), 6);
        assert_eq!(end_of_line(text, 1), 2);
        assert_eq!(end_of_line("ab", 1), 2);
    }
}
