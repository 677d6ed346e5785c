// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Source location tracking.

/// A byte range in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const DUMMY: Span = Span { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Line starts of one source text, for turning byte offsets into 1-based
/// line and column numbers.
///
/// Caller-line default arguments are computed from this, once per loop.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Offset just past each newline, after a leading 0.
    starts: Vec<usize>,
}

impl LineMap {
    pub fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(at, _)| at + 1))
            .collect();
        Self { starts }
    }

    /// `(line, column)` of a byte offset, both 1-based. Columns count bytes.
    pub fn offset_to_line_col(&self, offset: usize) -> (u32, u32) {
        let idx = self.line_index(offset);
        ((idx + 1) as u32, (offset - self.starts[idx] + 1) as u32)
    }

    /// 1-based line of the start of `span`.
    pub fn line_of(&self, span: Span) -> u32 {
        (self.line_index(span.start) + 1) as u32
    }

    /// Text of a 1-based line, newline excluded.
    pub fn line_text<'a>(&self, source: &'a str, line: u32) -> Option<&'a str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.starts.get(idx)?;
        let end = match self.starts.get(idx + 1) {
            Some(next) => next - 1,
            None => source.len(),
        };
        source.get(start..end)
    }

    pub fn line_count(&self) -> u32 {
        self.starts.len() as u32
    }

    fn line_index(&self, offset: usize) -> usize {
        // starts[0] == 0, so at least one start is <= offset.
        self.starts.partition_point(|&start| start <= offset) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_union_and_len() {
        let a = Span::new(4, 9);
        let b = Span::new(2, 6);
        assert_eq!(a.to(b), Span::new(2, 9));
        assert_eq!(a.len(), 5);
        assert!(Span::DUMMY.is_empty());
        assert!(a.contains(4));
        assert!(!a.contains(9));
    }

    #[test]
    fn empty_source() {
        let lines = LineMap::new("");
        assert_eq!(lines.offset_to_line_col(0), (1, 1));
        assert_eq!(lines.line_count(), 1);
        assert_eq!(lines.line_text("", 1), Some(""));
    }

    #[test]
    fn loop_header_lines() {
        let src = "fn m() {\n    foreach (var x in xs)\n    {\n    }\n}";
        let lm = LineMap::new(src);
        let foreach_at = src.find("foreach").unwrap();
        assert_eq!(lm.line_of(Span::new(foreach_at, foreach_at + 7)), 2);
        assert_eq!(lm.offset_to_line_col(foreach_at), (2, 5));
        assert_eq!(lm.line_text(src, 2), Some("    foreach (var x in xs)"));
        assert_eq!(lm.line_text(src, 9), None);
    }

    #[test]
    fn offset_at_newline() {
        let src = "ab\ncd\n";
        let lines = LineMap::new(src);
        assert_eq!(lines.offset_to_line_col(2), (1, 3));
        assert_eq!(lines.offset_to_line_col(3), (2, 1));
        assert_eq!(lines.line_count(), 3);
        assert_eq!(lines.line_text(src, 3), Some(""));
    }
}
