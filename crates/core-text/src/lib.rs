//! Rope-based text buffer and the reference host built on it.
//!
//! [`Buffer`] stores text; [`TextHost`] wraps it with caret, selection,
//! registers, marks and undo history and implements every capability trait
//! the modal engine consumes, so a `Session<TextHost>` edits real text.

use core_state::Position;
use ropey::Rope;

pub mod host;
pub mod motion;
pub mod pattern;
pub mod text_object;
pub mod undo;

pub use host::TextHost;
pub use pattern::VimRegex;

/// A text buffer backed by a `ropey::Rope`.
///
/// Lines are separated by `\n`; a buffer always has at least one (possibly
/// empty) line. Positions address bytes within a line, excluding the
/// terminator.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    rope: Rope,
    pub name: String,
}

impl Buffer {
    /// Construct a buffer from an in-memory string slice.
    pub fn from_str(name: impl Into<String>, content: &str) -> Self {
        Self {
            rope: Rope::from_str(content),
            name: name.into(),
        }
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Total number of lines in the buffer.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Line `idx` without its terminator.
    pub fn line(&self, idx: usize) -> Option<String> {
        if idx >= self.rope.len_lines() {
            return None;
        }
        let mut s = self.rope.line(idx).to_string();
        if s.ends_with('\n') {
            s.pop();
        }
        Some(s)
    }

    /// Byte length of a line, excluding the newline.
    pub fn line_byte_len(&self, idx: usize) -> usize {
        if idx >= self.rope.len_lines() {
            return 0;
        }
        let line = self.rope.line(idx);
        let len = line.len_bytes();
        if line.len_chars() > 0 && line.char(line.len_chars() - 1) == '\n' {
            len - 1
        } else {
            len
        }
    }

    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    /// Absolute byte offset of `pos`, clamped to the buffer and the line.
    pub fn offset(&self, pos: Position) -> usize {
        let last = self.line_count().saturating_sub(1);
        let line = pos.line.min(last);
        self.rope.line_to_byte(line) + pos.byte.min(self.line_byte_len(line))
    }

    /// Position of an absolute byte offset.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.rope.len_bytes());
        let line = self.rope.byte_to_line(offset);
        Position::new(line, offset - self.rope.line_to_byte(line))
    }

    /// Return the UTF-8 slice in the absolute byte range `[start,end)`.
    pub fn slice_bytes(&self, start: usize, end: usize) -> String {
        let total = self.rope.len_bytes();
        let (s, e) = (start.min(total), end.min(total));
        if s >= e {
            return String::new();
        }
        let start_char = self.rope.byte_to_char(s);
        let end_char = self.rope.byte_to_char(e);
        self.rope.slice(start_char..end_char).to_string()
    }

    /// Replace the absolute byte range `[start,end)` with `text`, returning
    /// the removed text.
    pub fn replace_bytes(&mut self, start: usize, end: usize, text: &str) -> String {
        let total = self.rope.len_bytes();
        let (s, e) = (start.min(total), end.min(total).max(start.min(total)));
        let start_char = self.rope.byte_to_char(s);
        let end_char = self.rope.byte_to_char(e);
        let removed = self.rope.slice(start_char..end_char).to_string();
        if end_char > start_char {
            self.rope.remove(start_char..end_char);
        }
        if !text.is_empty() {
            self.rope.insert(start_char, text);
        }
        removed
    }

    /// Text between two positions, `[start, end)`.
    pub fn slice(&self, start: Position, end: Position) -> String {
        self.slice_bytes(self.offset(start), self.offset(end))
    }

    /// Insert a grapheme cluster string at the given position; advances
    /// position by its byte length.
    pub fn insert_grapheme(&mut self, pos: &mut Position, g: &str) {
        let at = self.offset(*pos);
        self.replace_bytes(at, at, g);
        pos.byte += g.len();
    }

    /// Insert a newline at the given position, splitting the current line.
    /// Cursor moves to start of new line.
    pub fn insert_newline(&mut self, pos: &mut Position) {
        let at = self.offset(*pos);
        self.replace_bytes(at, at, "\n");
        pos.line += 1;
        pos.byte = 0;
    }

    /// Delete the grapheme cluster before the position (like backspace). If
    /// at start of line and not first line, joins with previous.
    pub fn delete_grapheme_before(&mut self, pos: &mut Position) {
        if pos.line == 0 && pos.byte == 0 {
            return;
        }
        if pos.byte == 0 {
            let prev_line = pos.line - 1;
            let prev_len = self.line_byte_len(prev_line);
            let newline = self.offset(Position::new(prev_line, prev_len));
            self.replace_bytes(newline, newline + 1, "");
            *pos = Position::new(prev_line, prev_len);
            return;
        }
        let line = self.line(pos.line).unwrap_or_default();
        let prev = grapheme::prev_boundary(&line, pos.byte);
        let base = self.offset(Position::new(pos.line, 0));
        self.replace_bytes(base + prev, base + pos.byte, "");
        pos.byte = prev;
    }

    /// Delete the grapheme cluster at the position. At line end the next
    /// line is joined instead.
    pub fn delete_grapheme_at(&mut self, pos: &Position) {
        let line = self.line(pos.line).unwrap_or_default();
        if pos.byte >= line.len() {
            if pos.line + 1 < self.line_count() {
                let at = self.offset(Position::new(pos.line, line.len()));
                self.replace_bytes(at, at + 1, "");
            }
            return;
        }
        let next = grapheme::next_boundary(&line, pos.byte);
        let base = self.offset(Position::new(pos.line, 0));
        self.replace_bytes(base + pos.byte, base + next, "");
    }

    /// Whether both buffers hold the same text.
    pub fn same_text(&self, other: &Buffer) -> bool {
        self.rope == other.rope
    }
}

/// Grapheme and width utilities. These are pure helpers operating on a
/// single line.
pub mod grapheme {
    use unicode_segmentation::UnicodeSegmentation;
    use unicode_width::UnicodeWidthStr;

    /// Iterate grapheme clusters in a line.
    pub fn iter(line: &str) -> impl Iterator<Item = &str> {
        line.graphemes(true)
    }

    /// Previous grapheme boundary (returns 0 if already at or below 1st boundary).
    pub fn prev_boundary(line: &str, byte: usize) -> usize {
        if byte == 0 {
            return 0;
        }
        let byte = byte.min(line.len());
        let mut last = 0;
        for (idx, _) in line.grapheme_indices(true) {
            if idx >= byte {
                break;
            }
            last = idx;
        }
        last
    }

    /// Next grapheme boundary (returns line.len() if at or beyond end).
    pub fn next_boundary(line: &str, byte: usize) -> usize {
        if byte >= line.len() {
            return line.len();
        }
        for (idx, _) in line.grapheme_indices(true) {
            if idx > byte {
                return idx;
            }
        }
        line.len()
    }

    /// Start of the last grapheme cluster, or 0 for an empty line.
    pub fn last_start(line: &str) -> usize {
        prev_boundary(line, line.len())
    }

    /// Compute visual column (terminal cells) up to (but not including) byte offset.
    pub fn visual_col(line: &str, byte: usize) -> usize {
        let mut col = 0;
        for (idx, g) in line.grapheme_indices(true) {
            if idx >= byte {
                break;
            }
            col += cluster_width(g);
        }
        col
    }

    /// Width in terminal cells of this grapheme cluster; never less than one.
    pub fn cluster_width(g: &str) -> usize {
        g.width().max(1)
    }

    /// Byte offset of the first non-blank character (line length if none).
    pub fn first_non_blank(line: &str) -> usize {
        line.find(|c: char| c != ' ' && c != '\t').unwrap_or(line.len())
    }
}
