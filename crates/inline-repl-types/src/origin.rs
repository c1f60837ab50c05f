//! Where a task came from: a document and a range within it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a source document (URI or path string).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Zero-based line/character position.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open source range `[start, end)`.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

impl SourceRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range spanning `start_line:start_char` to `end_line:end_char`.
    pub fn from_coords(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Self {
        Self::new(
            Position::new(start_line, start_char),
            Position::new(end_line, end_char),
        )
    }

    /// A collapsed range (cursor with no selection).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 1-based lines for humans
        if self.start.line == self.end.line {
            write!(f, "L{}", self.start.line + 1)
        } else {
            write!(f, "L{}-{}", self.start.line + 1, self.end.line + 1)
        }
    }
}

/// Document identity plus source range of a submitted task.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub document: DocumentKey,
    pub range: SourceRange,
}

impl Origin {
    pub fn new(document: impl Into<DocumentKey>, range: SourceRange) -> Self {
        Self {
            document: document.into(),
            range,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document, self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_range() {
        assert!(SourceRange::from_coords(3, 4, 3, 4).is_empty());
        assert!(!SourceRange::from_coords(3, 0, 3, 4).is_empty());
    }

    #[test]
    fn test_display() {
        let origin = Origin::new("file:///a.rb", SourceRange::from_coords(0, 0, 2, 5));
        assert_eq!(origin.to_string(), "file:///a.rb:L1-3");

        let single = SourceRange::from_coords(4, 0, 4, 10);
        assert_eq!(single.to_string(), "L5");
    }

    #[test]
    fn test_range_equality_includes_characters() {
        let a = SourceRange::from_coords(1, 0, 2, 3);
        let b = SourceRange::from_coords(1, 0, 2, 4);
        assert_ne!(a, b);
    }
}
