//! Code-span resolution: which text to run for a cursor or selection.
//!
//! Cells are delimited by separator lines (a line that, trimmed, equals the
//! variant's separator such as `# %%` or `// %%`).
//!
//! ```text
//!   0  # %%          ◀── nearest separator at/above cursor → start
//!   1  x = 1
//!   2  x + 1         ◀── cursor
//!   3  # %%          ◀── nearest separator below → end (inclusive line)
//!   4  y = 2
//! ```
//!
//! A non-empty selection is used verbatim. Without a separator above the
//! cursor only the cursor line runs; without one below, the cell extends to
//! the last line of the document.

use inline_repl_types::{DocumentKey, Origin, Position, SourceRange};

/// A document as lines, for span resolution.
#[derive(Debug, Clone)]
pub struct TextDocument {
    key: DocumentKey,
    lines: Vec<String>,
}

impl TextDocument {
    pub fn new(key: impl Into<DocumentKey>, text: &str) -> Self {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        Self {
            key: key.into(),
            lines,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Always at least one.
    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    pub fn line(&self, line: u32) -> Option<&str> {
        self.lines.get(line as usize).map(String::as_str)
    }

    /// Range covering a whole line.
    pub fn line_range(&self, line: u32) -> SourceRange {
        let len = self.line(line).map_or(0, |l| l.chars().count() as u32);
        SourceRange::from_coords(line, 0, line, len)
    }

    /// Text inside `range`; positions are clamped to the document.
    pub fn text_in(&self, range: &SourceRange) -> String {
        let last = self.line_count() - 1;
        let start = range.start.line.min(last);
        let end = range.end.line.min(last);

        let mut out = String::new();
        for line in start..=end {
            let text = self.line(line).unwrap_or_default();
            let from = if line == start { range.start.character } else { 0 };
            let to = if line == end {
                range.end.character
            } else {
                u32::MAX
            };
            out.extend(
                text.chars()
                    .skip(from as usize)
                    .take(to.saturating_sub(from) as usize),
            );
            if line != end {
                out.push('\n');
            }
        }
        out
    }
}

/// What the user pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Cursor(Position),
    Selection(SourceRange),
}

/// Code to execute and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSpan {
    pub code: String,
    pub origin: Origin,
}

fn is_separator(line: &str, separator: &str) -> bool {
    line.trim() == separator
}

/// Nearest separator line starting at `line` and stepping in `direction`.
fn find_boundary(doc: &TextDocument, line: u32, direction: i64, separator: &str) -> Option<u32> {
    let mut line = i64::from(line);
    while line >= 0 && line < i64::from(doc.line_count()) {
        if doc.line(line as u32).is_some_and(|l| is_separator(l, separator)) {
            return Some(line as u32);
        }
        line += direction;
    }
    None
}

/// Source range to run for `target`.
pub fn execution_range(doc: &TextDocument, target: Target, separator: &str) -> SourceRange {
    let cursor_line = match target {
        Target::Selection(range) if !range.is_empty() => return range,
        Target::Selection(range) => range.start.line,
        Target::Cursor(pos) => pos.line,
    }
    .min(doc.line_count() - 1);

    let Some(start) = find_boundary(doc, cursor_line, -1, separator) else {
        return doc.line_range(cursor_line);
    };

    let mut next = cursor_line;
    if doc.line(cursor_line).is_some_and(|l| is_separator(l, separator)) {
        next += 1;
    }
    let end = find_boundary(doc, next, 1, separator).unwrap_or(doc.line_count() - 1);

    let end_len = doc.line_range(end).end.character;
    SourceRange::from_coords(start, 0, end, end_len)
}

/// Resolve `target` to trimmed code. `None` when there is nothing to run.
pub fn resolve_span(doc: &TextDocument, target: Target, separator: &str) -> Option<CodeSpan> {
    let range = execution_range(doc, target, separator);
    let code = doc.text_in(&range).trim().to_string();
    if code.is_empty() {
        return None;
    }
    Some(CodeSpan {
        code,
        origin: Origin::new(doc.key().clone(), range),
    })
}

/// Split the whole document into cells, skipping empty ones.
///
/// Each cell runs from a separator line (or the top of the document) to the
/// line before the next separator.
pub fn split_cells(doc: &TextDocument, separator: &str) -> Vec<CodeSpan> {
    let last = doc.line_count() - 1;
    let mut starts: Vec<u32> = (0..doc.line_count())
        .filter(|&line| doc.line(line).is_some_and(|l| is_separator(l, separator)))
        .collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).map_or(last, |next| next - 1);
            let end_len = doc.line_range(end).end.character;
            let range = SourceRange::from_coords(start, 0, end, end_len);
            resolve_span(doc, Target::Selection(range), separator)
        })
        .collect()
}
