//! Text objects: the regions `iw`, `a"`, `i(`, `ap` and friends select.
//!
//! Word and quote objects stay on the caret line; bracket objects may span
//! lines and count outward for nested pairs; paragraph objects are linewise.

use core_actions::{TextObject, TextObjectKind};
use core_state::{Position, TextRange};

use crate::Buffer;
use crate::motion::{Class, class_of};

/// Region of `obj` around `pos`, or `None` when there is no such object
/// (no enclosing quotes or brackets).
pub fn select(buf: &Buffer, pos: Position, obj: TextObject, count: usize) -> Option<TextRange> {
    let count = count.max(1);
    match obj.kind {
        TextObjectKind::Word => word(buf, pos, obj.inner, count, false),
        TextObjectKind::BigWord => word(buf, pos, obj.inner, count, true),
        TextObjectKind::Quote(q) => quote(buf, pos, q, obj.inner),
        TextObjectKind::Bracket(open, close) => bracket(buf, pos, open, close, obj.inner, count),
        TextObjectKind::Paragraph => paragraph(buf, pos, obj.inner, count),
    }
}

// ------------------------------------------------------------------------------------------------
// Words
// ------------------------------------------------------------------------------------------------

fn class_at(line: &str, byte: usize, big: bool) -> Option<Class> {
    line.get(byte..)?.chars().next().map(|c| class_of(c, big))
}

/// End of the run of same-class characters starting at `byte`.
fn run_end(line: &str, byte: usize, big: bool) -> usize {
    let Some(class) = class_at(line, byte, big) else {
        return byte;
    };
    line[byte..]
        .char_indices()
        .find(|&(_, c)| class_of(c, big) != class)
        .map_or(line.len(), |(i, _)| byte + i)
}

fn run_start(line: &str, byte: usize, big: bool) -> usize {
    let Some(class) = class_at(line, byte, big) else {
        return byte;
    };
    line[..byte]
        .char_indices()
        .rev()
        .take_while(|&(_, c)| class_of(c, big) == class)
        .last()
        .map_or(byte, |(i, _)| i)
}

fn word(buf: &Buffer, pos: Position, inner: bool, count: usize, big: bool) -> Option<TextRange> {
    let line = buf.line(pos.line)?;
    if line.is_empty() {
        return None;
    }
    let byte = pos.byte.min(line.len().saturating_sub(1));
    let start_blank = class_at(&line, byte, big) == Some(Class::Blank);
    let mut start = run_start(&line, byte, big);
    let mut end = run_end(&line, byte, big);
    for _ in 1..count {
        if end >= line.len() {
            break;
        }
        end = run_end(&line, end, big);
        // `aw` counts a word together with its white space.
        if !inner && class_at(&line, end, big) == Some(Class::Blank) {
            end = run_end(&line, end, big);
        }
    }
    if !inner {
        if start_blank {
            // White space first, then the word after it.
            if end < line.len() {
                end = run_end(&line, end, big);
            }
        } else if class_at(&line, end, big) == Some(Class::Blank) {
            end = run_end(&line, end, big);
        } else if start > 0 && class_at(&line, start - 1, big) == Some(Class::Blank) {
            start = run_start(&line, start - 1, big);
        }
    }
    Some(TextRange::chars(
        Position::new(pos.line, start),
        Position::new(pos.line, end),
    ))
}

// ------------------------------------------------------------------------------------------------
// Quotes
// ------------------------------------------------------------------------------------------------

fn quote(buf: &Buffer, pos: Position, q: char, inner: bool) -> Option<TextRange> {
    let line = buf.line(pos.line)?;
    let mut quotes = Vec::new();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == q {
            quotes.push(i);
        }
    }
    let pairs: Vec<(usize, usize)> = quotes.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    let (open, close) = pairs
        .iter()
        .copied()
        .find(|&(a, b)| a <= pos.byte && pos.byte <= b)
        .or_else(|| pairs.iter().copied().find(|&(a, _)| a > pos.byte))?;
    let (mut start, mut end) = if inner {
        (open + q.len_utf8(), close)
    } else {
        (open, close + q.len_utf8())
    };
    if !inner {
        let trailing = line[end..].len() - line[end..].trim_start_matches([' ', '\t']).len();
        if trailing > 0 {
            end += trailing;
        } else {
            start = line[..start].trim_end_matches([' ', '\t']).len();
        }
    }
    Some(TextRange::chars(
        Position::new(pos.line, start),
        Position::new(pos.line, end),
    ))
}

// ------------------------------------------------------------------------------------------------
// Brackets
// ------------------------------------------------------------------------------------------------

/// Offset of the unmatched `open` at or before `from`.
fn enclosing_open(text: &str, from: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[..from].char_indices().rev() {
        if c == close {
            depth += 1;
        } else if c == open {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
    }
    None
}

fn matching_close(text: &str, open_at: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open_at..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(open_at + i);
            }
        }
    }
    None
}

fn bracket(
    buf: &Buffer,
    pos: Position,
    open: char,
    close: char,
    inner: bool,
    count: usize,
) -> Option<TextRange> {
    let text = buf.text();
    let at = buf.offset(pos);
    let under = text[at..].chars().next();
    let mut open_at = match under {
        Some(c) if c == open => at,
        Some(c) if c == close => enclosing_open(&text, at, open, close)?,
        _ => enclosing_open(&text, at, open, close)?,
    };
    for _ in 1..count {
        open_at = enclosing_open(&text, open_at, open, close)?;
    }
    let close_at = matching_close(&text, open_at, open, close)?;
    let (start, end) = if inner {
        (open_at + open.len_utf8(), close_at)
    } else {
        (open_at, close_at + close.len_utf8())
    };
    Some(TextRange::chars(buf.position(start), buf.position(end)))
}

// ------------------------------------------------------------------------------------------------
// Paragraphs
// ------------------------------------------------------------------------------------------------

fn is_blank_line(buf: &Buffer, idx: usize) -> bool {
    buf.line(idx).is_none_or(|l| l.trim().is_empty())
}

/// Last line of the run of lines sharing `first`'s blankness.
fn run_last(buf: &Buffer, first: usize) -> usize {
    let blank = is_blank_line(buf, first);
    let last = buf.line_count().saturating_sub(1);
    let mut line = first;
    while line < last && is_blank_line(buf, line + 1) == blank {
        line += 1;
    }
    line
}

fn paragraph(buf: &Buffer, pos: Position, inner: bool, count: usize) -> Option<TextRange> {
    let last = buf.line_count().saturating_sub(1);
    let blank = is_blank_line(buf, pos.line);
    let mut start = pos.line;
    while start > 0 && is_blank_line(buf, start - 1) == blank {
        start -= 1;
    }
    let mut end = run_last(buf, pos.line);
    let runs = if inner { count } else { count * 2 };
    for _ in 1..runs {
        if end >= last {
            if inner {
                break;
            }
            // Nothing follows: `ap` takes the blank lines before instead.
            if !blank && start > 0 && is_blank_line(buf, start - 1) {
                start -= 1;
                while start > 0 && is_blank_line(buf, start - 1) {
                    start -= 1;
                }
            }
            break;
        }
        end = run_last(buf, end + 1);
    }
    Some(TextRange::lines(start, end))
}
