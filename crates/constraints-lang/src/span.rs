//! Source locations.
//!
//! - `Span`: byte range inside a single source unit
//! - `SourceUnit`: named source text with a line index
//! - `Location`: 1-based line/column resolved from a byte offset

use serde::{Deserialize, Serialize};

/// Position of a unit inside a source bundle.
pub type UnitId = u16;

/// Byte range within a source unit.
///
/// Spans do not carry their unit: a parsed module can be placed at any
/// position of a bundle, so the unit is attached where a span is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: u32,
    /// Byte offset one past the last character.
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Zero-length span at `offset`.
    pub fn point(offset: u32) -> Self {
        Self::new(offset, offset)
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// A named unit of source text.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    name: String,
    text: String,
    /// Byte offset of each line start; `line_starts[0]` is always 0.
    line_starts: Vec<u32>,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(
                text.char_indices()
                    .filter(|(_, c)| *c == '\n')
                    .map(|(i, _)| i as u32 + 1),
            )
            .collect();
        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Span covering the end of the text.
    pub fn end_span(&self) -> Span {
        Span::point(self.text.len() as u32)
    }

    /// Resolve a byte offset to a line and column.
    ///
    /// Columns count characters, not bytes. Offsets past the end clamp to
    /// the end of the text.
    pub fn location(&self, offset: u32) -> Location {
        let offset = offset.min(self.text.len() as u32);
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line_index] as usize;
        let column = self
            .text
            .get(line_start..offset as usize)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(offset as usize - line_start);
        Location {
            line: line_index as u32 + 1,
            column: column as u32 + 1,
        }
    }

    /// Text covered by `span`, or an empty string when out of range.
    pub fn snippet(&self, span: Span) -> &str {
        self.text
            .get(span.start as usize..span.end as usize)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_first_line() {
        let unit = SourceUnit::new("a.edsl", "let x = 1;");
        assert_eq!(unit.location(0), Location { line: 1, column: 1 });
        assert_eq!(unit.location(4), Location { line: 1, column: 5 });
    }

    #[test]
    fn location_after_newlines() {
        let unit = SourceUnit::new("a.edsl", "a\nbc\n\ndef");
        assert_eq!(unit.location(2), Location { line: 2, column: 1 });
        assert_eq!(unit.location(3), Location { line: 2, column: 2 });
        assert_eq!(unit.location(5), Location { line: 3, column: 1 });
        assert_eq!(unit.location(8), Location { line: 4, column: 3 });
    }

    #[test]
    fn location_counts_characters() {
        let unit = SourceUnit::new("a.edsl", "\"héllo\" + x");
        // 'x' sits at byte 11, after ten characters
        assert_eq!(unit.location(11), Location { line: 1, column: 11 });
    }

    #[test]
    fn location_clamps_past_end() {
        let unit = SourceUnit::new("a.edsl", "ab");
        assert_eq!(unit.location(99), Location { line: 1, column: 3 });
    }

    #[test]
    fn span_to_covers_both() {
        let span = Span::new(4, 6).to(Span::new(1, 2));
        assert_eq!(span, Span::new(1, 6));
        assert!(Span::point(3).is_empty());
    }

    #[test]
    fn snippet_extracts_text() {
        let unit = SourceUnit::new("a.edsl", "return x;");
        assert_eq!(unit.snippet(Span::new(7, 8)), "x");
        assert_eq!(unit.snippet(Span::new(7, 80)), "");
    }
}
