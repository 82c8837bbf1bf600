//! Capabilities the modal engine consumes from its host.
//!
//! The engine never owns text. Everything it needs from the editor goes
//! through [`HostSurface`] (caret, selection, text, undo boundary, registers
//! and marks) and [`RegexEngine`] (Vim-dialect pattern matching). Positions are
//! zero-based; `byte` is an offset into the line text without its newline.

use thiserror::Error;

use crate::SelectionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: usize,
    pub byte: usize,
}

impl Position {
    pub const fn new(line: usize, byte: usize) -> Self {
        Self { line, byte }
    }
}

/// A region of host text.
///
/// * `Characterwise`: `[start, end)` by position, may span lines.
/// * `Linewise`: whole lines `start.line..=end.line`; bytes are ignored.
/// * `Blockwise`: columns `[start.byte, end.byte)` on every line from
///   `start.line` to `end.line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
    pub kind: SelectionKind,
}

impl TextRange {
    /// Build a range with ordered endpoints.
    pub fn new(a: Position, b: Position, kind: SelectionKind) -> Self {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Self { start, end, kind }
    }

    pub fn lines(first: usize, last: usize) -> Self {
        Self::new(
            Position::new(first, 0),
            Position::new(last, 0),
            SelectionKind::Linewise,
        )
    }

    pub fn chars(start: Position, end: Position) -> Self {
        Self::new(start, end, SelectionKind::Characterwise)
    }

    pub fn is_empty(&self) -> bool {
        self.kind == SelectionKind::Characterwise && self.start == self.end
    }
}

/// Live Visual/Select selection: `anchor` stays where the selection started,
/// `head` follows the caret. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Position,
    pub head: Position,
    pub kind: SelectionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterContent {
    pub text: String,
    pub linewise: bool,
}

impl RegisterContent {
    pub fn chars(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            linewise: false,
        }
    }

    pub fn lines(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            linewise: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("E16: Invalid range")]
    OutOfRange,
    #[error("E21: Cannot make changes, 'modifiable' is off")]
    ReadOnly,
    #[error("E354: Invalid register name: '{0}'")]
    InvalidRegister(char),
    #[error("E191: Argument must be a letter or forward/backward quote")]
    InvalidMark,
    #[error("E383: Invalid search string: {0}")]
    InvalidPattern(String),
    #[error("{0}")]
    Other(String),
}

/// Text surface of the host editor.
pub trait HostSurface {
    fn caret(&self) -> Position;
    fn set_caret(&mut self, pos: Position);

    fn selection(&self) -> Option<Selection>;
    fn set_selection(&mut self, selection: Option<Selection>);

    fn line_count(&self) -> usize;
    /// Text of line `idx` without its line terminator.
    fn line(&self, idx: usize) -> Option<String>;
    /// Linewise text ends every line with `\n`.
    fn text(&self, range: &TextRange) -> Result<String, HostError>;
    /// Linewise ranges swap whole lines including their terminators: `text`
    /// ends in `\n` unless it is empty, which deletes the lines.
    fn replace(&mut self, range: &TextRange, text: &str) -> Result<(), HostError>;

    /// Open an undo transaction. Nested calls are balanced by the host.
    fn begin_undo_transaction(&mut self);
    fn end_undo_transaction(&mut self);

    fn register(&self, name: char) -> Option<RegisterContent>;
    fn set_register(&mut self, name: char, content: RegisterContent) -> Result<(), HostError>;
    /// Registers that currently hold content, in display order.
    fn register_names(&self) -> Vec<char>;

    fn mark(&self, name: char) -> Option<Position>;
    fn set_mark(&mut self, name: char, pos: Position) -> Result<(), HostError>;
    fn delete_mark(&mut self, name: char) -> Result<(), HostError>;

    fn last_line(&self) -> usize {
        self.line_count().saturating_sub(1)
    }

    /// Insert `text` at `pos` without replacing anything.
    fn insert(&mut self, pos: Position, text: &str) -> Result<(), HostError> {
        self.replace(&TextRange::chars(pos, pos), text)
    }
}

/// Vim-dialect regular expressions.
pub trait RegexEngine {
    /// First match of `pattern` in `haystack` at or after byte `start`,
    /// returned as a byte span.
    fn find(
        &self,
        pattern: &str,
        haystack: &str,
        start: usize,
        ignore_case: bool,
    ) -> Result<Option<(usize, usize)>, HostError>;

    /// Replace the first (or every, with `global`) match. `replacement` uses
    /// Vim syntax (`&`, `\0`..`\9`, `\n`, `\r`).
    fn substitute(
        &self,
        pattern: &str,
        haystack: &str,
        replacement: &str,
        global: bool,
        ignore_case: bool,
    ) -> Result<String, HostError>;

    fn is_match(&self, pattern: &str, haystack: &str, ignore_case: bool) -> Result<bool, HostError> {
        Ok(self.find(pattern, haystack, 0, ignore_case)?.is_some())
    }
}
