//! Line/column addressing over buffer text.
//!
//! Columns are UTF-16 code units, the LSP default. Out-of-range positions
//! clamp: a column past the end of a line maps to the line end, a line past
//! the end of the buffer maps to the buffer end, and a column that lands in
//! the middle of a surrogate pair rounds down to the start of that character.

use std::borrow::Cow;

/// A zero-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LineCol {
    pub line: u32,
    pub character: u32,
}

impl LineCol {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open `[start, end)` span of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextRange {
    pub start: LineCol,
    pub end: LineCol,
}

impl TextRange {
    pub const fn new(start: LineCol, end: LineCol) -> Self {
        Self { start, end }
    }

    /// Whether `pos` lies inside the range (end inclusive, so an empty range
    /// still contains its own position).
    pub fn contains(&self, pos: LineCol) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Whether the two ranges share at least one line.
    pub fn overlaps_lines(&self, other: &TextRange) -> bool {
        self.start.line <= other.end.line && other.start.line <= self.end.line
    }
}

/// Byte offsets of every line start in a text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte range of a line's content, without its line terminator.
    pub fn line_span(&self, text: &str, line: usize) -> Option<(usize, usize)> {
        let start = *self.line_starts.get(line)?;
        let mut end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        if end > start && text.as_bytes().get(end - 1) == Some(&b'\r') {
            end -= 1;
        }
        Some((start, end))
    }

    /// Byte offset for a line/column position, clamped to the text.
    pub fn offset_of(&self, text: &str, pos: LineCol) -> usize {
        let Some((start, end)) = self.line_span(text, pos.line as usize) else {
            return self.len;
        };
        let mut units = 0u32;
        for (i, ch) in text[start..end].char_indices() {
            let width = ch.len_utf16() as u32;
            if units + width > pos.character {
                return start + i;
            }
            units += width;
        }
        end
    }

    /// Line/column position for a byte offset, clamped to the text.
    pub fn position_of(&self, text: &str, offset: usize) -> LineCol {
        let mut offset = offset.min(self.len);
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_starts.partition_point(|&s| s <= offset) - 1;
        let start = self.line_starts[line];
        let character = text[start..offset].encode_utf16().count() as u32;
        LineCol::new(line as u32, character)
    }

    /// Byte offsets for a range; a reversed range is swapped.
    pub fn span_of(&self, text: &str, range: TextRange) -> (usize, usize) {
        let a = self.offset_of(text, range.start);
        let b = self.offset_of(text, range.end);
        (a.min(b), a.max(b))
    }

    /// The range covering the whole text.
    pub fn full_range(&self, text: &str) -> TextRange {
        TextRange::new(LineCol::default(), self.position_of(text, self.len))
    }
}

/// Convert `\r\n` line endings to `\n`.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains("\r\n") {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}
