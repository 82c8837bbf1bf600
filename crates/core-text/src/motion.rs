//! Cursor motion helpers.
//!
//! These operate purely on a `Buffer` + `Position` pair and are free of
//! editor state. Word motions classify every grapheme as blank, punctuation
//! or keyword; the end of a line reads as a blank and an empty line is a word
//! of its own, which is how Vim walks `w`, `b` and `e` across lines.

use core_actions::FindKind;
use core_state::Position;

use crate::{Buffer, grapheme};

/// Normalize a position for Vim Normal-mode semantics: clamp the line, and
/// move a byte at or past the end of a non-empty line onto its last grapheme
/// so the cursor rests on a real character cell.
pub fn normalize_normal_mode_position(buf: &Buffer, pos: &mut Position) {
    clamp_line(buf, pos);
    let line = buf.line(pos.line).unwrap_or_default();
    if pos.byte >= line.len() {
        pos.byte = grapheme::last_start(&line);
    }
}

/// Keep the position inside the buffer, allowing the byte just past the
/// last character (Insert mode rest position).
pub fn clamp_line(buf: &Buffer, pos: &mut Position) {
    let last = buf.line_count().saturating_sub(1);
    if pos.line > last {
        pos.line = last;
    }
    let len = buf.line_byte_len(pos.line);
    if pos.byte > len {
        pos.byte = len;
    }
}

/// Move left one grapheme boundary; never leaves the line.
pub fn left(buf: &Buffer, pos: &mut Position) {
    if pos.byte == 0 {
        return;
    }
    if let Some(line) = buf.line(pos.line) {
        pos.byte = grapheme::prev_boundary(&line, pos.byte);
    }
}

/// Move right one grapheme boundary, up to the end of the line.
pub fn right(buf: &Buffer, pos: &mut Position) {
    if let Some(line) = buf.line(pos.line) {
        pos.byte = grapheme::next_boundary(&line, pos.byte);
    }
}

/// Move to start of line.
pub fn line_start(_buf: &Buffer, pos: &mut Position) {
    pos.byte = 0;
}

/// Move onto the last grapheme of the line.
pub fn line_end(buf: &Buffer, pos: &mut Position) {
    let line = buf.line(pos.line).unwrap_or_default();
    pos.byte = grapheme::last_start(&line);
}

/// Move to the first non-blank character, or the last character of an
/// all-blank line.
pub fn first_non_blank(buf: &Buffer, pos: &mut Position) {
    let line = buf.line(pos.line).unwrap_or_default();
    let first = grapheme::first_non_blank(&line);
    pos.byte = if first < line.len() {
        first
    } else {
        grapheme::last_start(&line)
    };
}

/// Move up one line preserving a target visual column (sticky). Returns the
/// updated sticky column. If `sticky_col` is `None`, it is computed from the
/// current position's visual column.
pub fn up(buf: &Buffer, pos: &mut Position, mut sticky_col: Option<usize>) -> Option<usize> {
    if pos.line == 0 {
        return sticky_col;
    }
    let current = buf.line(pos.line).unwrap_or_default();
    let col = *sticky_col.get_or_insert_with(|| grapheme::visual_col(&current, pos.byte));
    pos.line -= 1;
    pos.byte = byte_for_visual_col(buf, pos.line, col);
    sticky_col
}

/// Move down one line preserving sticky visual column.
pub fn down(buf: &Buffer, pos: &mut Position, mut sticky_col: Option<usize>) -> Option<usize> {
    if pos.line + 1 >= buf.line_count() {
        return sticky_col;
    }
    let current = buf.line(pos.line).unwrap_or_default();
    let col = *sticky_col.get_or_insert_with(|| grapheme::visual_col(&current, pos.byte));
    pos.line += 1;
    pos.byte = byte_for_visual_col(buf, pos.line, col);
    sticky_col
}

/// Convert a target visual column into a byte offset on a given line,
/// clamping to the last grapheme.
fn byte_for_visual_col(buf: &Buffer, line: usize, target_col: usize) -> usize {
    let content = buf.line(line).unwrap_or_default();
    let mut col = 0;
    let mut last = 0;
    for (b, g) in unicode_segmentation::UnicodeSegmentation::grapheme_indices(content.as_str(), true)
    {
        let w = grapheme::cluster_width(g);
        if col + w > target_col {
            return b;
        }
        col += w;
        last = b;
    }
    last
}

// ------------------------------------------------------------------------------------------------
// Word motions
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    Blank,
    EmptyLine,
    Punct,
    Word,
}

pub(crate) fn class_of(c: char, big: bool) -> Class {
    if c.is_whitespace() {
        Class::Blank
    } else if big || c == '_' || c.is_alphanumeric() {
        Class::Word
    } else {
        Class::Punct
    }
}

fn class_at(buf: &Buffer, p: Position, big: bool) -> Class {
    let line = buf.line(p.line).unwrap_or_default();
    if line.is_empty() {
        return Class::EmptyLine;
    }
    match line.get(p.byte..).and_then(|s| s.chars().next()) {
        Some(c) => class_of(c, big),
        None => Class::Blank,
    }
}

/// Next grapheme position; the end of a non-empty line is a position of
/// its own.
fn next_pos(buf: &Buffer, p: Position) -> Option<Position> {
    let line = buf.line(p.line)?;
    if p.byte < line.len() {
        return Some(Position::new(p.line, grapheme::next_boundary(&line, p.byte)));
    }
    (p.line + 1 < buf.line_count()).then(|| Position::new(p.line + 1, 0))
}

fn prev_pos(buf: &Buffer, p: Position) -> Option<Position> {
    if p.byte > 0 {
        let line = buf.line(p.line)?;
        return Some(Position::new(p.line, grapheme::prev_boundary(&line, p.byte)));
    }
    let prev = p.line.checked_sub(1)?;
    Some(Position::new(prev, buf.line_byte_len(prev)))
}

fn buffer_end(buf: &Buffer) -> Position {
    let last = buf.line_count().saturating_sub(1);
    Position::new(last, buf.line_byte_len(last))
}

/// `w` / `W`: start of the next word. Past the last word the position ends
/// just after the last character of the buffer.
pub fn word_forward(buf: &Buffer, pos: &mut Position, big: bool) {
    let mut p = *pos;
    let start = class_at(buf, p, big);
    let advance = |p: Position| next_pos(buf, p);
    match start {
        Class::Word | Class::Punct => {
            while class_at(buf, p, big) == start {
                match advance(p) {
                    Some(n) => p = n,
                    None => {
                        *pos = buffer_end(buf);
                        return;
                    }
                }
            }
        }
        Class::EmptyLine => match advance(p) {
            Some(n) => p = n,
            None => {
                *pos = buffer_end(buf);
                return;
            }
        },
        Class::Blank => {}
    }
    while class_at(buf, p, big) == Class::Blank {
        match advance(p) {
            Some(n) => p = n,
            None => {
                *pos = buffer_end(buf);
                return;
            }
        }
    }
    *pos = p;
}

/// `e` / `E`: end of the current or next word.
pub fn word_end(buf: &Buffer, pos: &mut Position, big: bool) {
    let Some(mut p) = next_pos(buf, *pos) else {
        return;
    };
    while matches!(class_at(buf, p, big), Class::Blank | Class::EmptyLine) {
        match next_pos(buf, p) {
            Some(n) => p = n,
            None => return,
        }
    }
    let class = class_at(buf, p, big);
    while let Some(n) = next_pos(buf, p)
        && n.line == p.line
        && class_at(buf, n, big) == class
    {
        p = n;
    }
    *pos = p;
}

/// `b` / `B`: start of the current or previous word.
pub fn word_backward(buf: &Buffer, pos: &mut Position, big: bool) {
    let Some(mut p) = prev_pos(buf, *pos) else {
        return;
    };
    while class_at(buf, p, big) == Class::Blank {
        match prev_pos(buf, p) {
            Some(q) => p = q,
            None => {
                *pos = p;
                return;
            }
        }
    }
    let class = class_at(buf, p, big);
    if class != Class::EmptyLine {
        while let Some(q) = prev_pos(buf, p)
            && q.line == p.line
            && class_at(buf, q, big) == class
        {
            p = q;
        }
    }
    *pos = p;
}

/// Whether `pos` is on the last character of a word: the next grapheme on
/// the line belongs to another class.
pub fn at_word_end(buf: &Buffer, pos: Position, big: bool) -> bool {
    let class = class_at(buf, pos, big);
    match next_pos(buf, pos) {
        Some(n) if n.line == pos.line => class_at(buf, n, big) != class,
        _ => true,
    }
}

/// Whether the grapheme at `pos` is white space (or the line is empty).
pub fn on_blank(buf: &Buffer, pos: Position) -> bool {
    matches!(class_at(buf, pos, false), Class::Blank | Class::EmptyLine)
}

// ------------------------------------------------------------------------------------------------
// Line-local search and larger units
// ------------------------------------------------------------------------------------------------

/// `f`, `t`, `F`, `T`: the `count`-th `ch` on the current line. Returns
/// false (leaving `pos` alone) when there are not enough occurrences.
pub fn find_char(buf: &Buffer, pos: &mut Position, kind: FindKind, ch: char, count: usize) -> bool {
    let line = buf.line(pos.line).unwrap_or_default();
    let count = count.max(1);
    let hit = if kind.is_forward() {
        let from = grapheme::next_boundary(&line, pos.byte);
        let from = if kind == FindKind::ForwardTill {
            grapheme::next_boundary(&line, from).min(line.len())
        } else {
            from
        };
        line[from..]
            .match_indices(ch)
            .nth(count - 1)
            .map(|(i, _)| from + i)
    } else {
        let upto = if kind == FindKind::BackwardTill {
            grapheme::prev_boundary(&line, pos.byte)
        } else {
            pos.byte
        };
        line[..upto.min(line.len())]
            .rmatch_indices(ch)
            .nth(count - 1)
            .map(|(i, _)| i)
    };
    let Some(idx) = hit else {
        return false;
    };
    pos.byte = match kind {
        FindKind::Forward | FindKind::Backward => idx,
        FindKind::ForwardTill => grapheme::prev_boundary(&line, idx),
        FindKind::BackwardTill => grapheme::next_boundary(&line, idx),
    };
    true
}

const BRACKETS: [(char, char); 3] = [('(', ')'), ('[', ']'), ('{', '}')];

/// `%`: take the first bracket at or after the caret on its line and move to
/// its partner, counting nesting across lines. Quotes are not special.
pub fn match_pair(buf: &Buffer, pos: &mut Position) -> bool {
    let line = buf.line(pos.line).unwrap_or_default();
    let from = pos.byte.min(line.len());
    let Some((idx, (open, close))) = line[from..].char_indices().find_map(|(i, c)| {
        BRACKETS
            .iter()
            .find(|&&(o, cl)| c == o || c == cl)
            .map(|&(o, cl)| (from + i, if c == o { (o, cl) } else { (cl, o) }))
    }) else {
        return false;
    };
    // `open` is the bracket under the search start, `close` its partner.
    let forward = BRACKETS.iter().any(|&(o, _)| o == open);
    let text = buf.text();
    let start = buf.offset(Position::new(pos.line, idx));
    let mut depth = 0usize;
    let mut step = |(i, c): (usize, char)| {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        None
    };
    let hit = if forward {
        text[start..].char_indices().find_map(|(i, c)| step((start + i, c)))
    } else {
        text[..start + open.len_utf8()].char_indices().rev().find_map(step)
    };
    match hit {
        Some(offset) => {
            *pos = buf.position(offset);
            true
        }
        None => false,
    }
}

fn is_empty_line(buf: &Buffer, idx: usize) -> bool {
    buf.line_byte_len(idx) == 0
}

/// `}`: the next empty line after a run of text, or the end of the buffer.
pub fn paragraph_forward(buf: &Buffer, pos: &mut Position) {
    let last = buf.line_count().saturating_sub(1);
    let mut line = pos.line;
    while line < last && is_empty_line(buf, line) {
        line += 1;
    }
    while line < last && !is_empty_line(buf, line) {
        line += 1;
    }
    if is_empty_line(buf, line) {
        *pos = Position::new(line, 0);
    } else {
        let text = buf.line(line).unwrap_or_default();
        *pos = Position::new(line, grapheme::last_start(&text));
    }
}

/// `{`: the previous empty line before a run of text, or the first line.
pub fn paragraph_backward(buf: &Buffer, pos: &mut Position) {
    let mut line = pos.line;
    while line > 0 && is_empty_line(buf, line) {
        line -= 1;
    }
    while line > 0 && !is_empty_line(buf, line) {
        line -= 1;
    }
    *pos = Position::new(line, 0);
}

fn starts_section(buf: &Buffer, idx: usize) -> bool {
    buf.line(idx).is_some_and(|l| l.starts_with('{'))
}

/// `]]`: next line starting with `{`, or the last line.
pub fn section_forward(buf: &Buffer, pos: &mut Position) {
    let last = buf.line_count().saturating_sub(1);
    let line = (pos.line + 1..=last)
        .find(|&l| starts_section(buf, l))
        .unwrap_or(last);
    *pos = Position::new(line, 0);
}

/// `[[`: previous line starting with `{`, or the first line.
pub fn section_backward(buf: &Buffer, pos: &mut Position) {
    let line = (0..pos.line)
        .rev()
        .find(|&l| starts_section(buf, l))
        .unwrap_or(0);
    *pos = Position::new(line, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn walk(text: &str, start: Position, step: impl Fn(&Buffer, &mut Position)) -> Vec<Position> {
        let buf = Buffer::from_str("t", text);
        let mut pos = start;
        let mut seen = Vec::new();
        loop {
            let before = pos;
            step(&buf, &mut pos);
            if pos == before || seen.len() > 20 {
                return seen;
            }
            seen.push(pos);
        }
    }

    #[test]
    fn match_pair_counts_nesting() {
        let buf = Buffer::from_str("t", "f([x], {y})");
        let mut pos = Position::new(0, 0);
        assert!(match_pair(&buf, &mut pos));
        assert_eq!(pos, Position::new(0, 10));

        // From `x` the first bracket is `]`.
        let mut pos = Position::new(0, 3);
        assert!(match_pair(&buf, &mut pos));
        assert_eq!(pos, Position::new(0, 2));

        let buf = Buffer::from_str("t", "((a)");
        let mut pos = Position::new(0, 0);
        assert!(!match_pair(&buf, &mut pos));
        assert_eq!(pos, Position::new(0, 0));
    }

    #[test]
    fn horizontal_and_line_boundaries() {
        let buf = Buffer::from_str("t", "ab😀c");
        let mut pos = Position::new(0, 0);
        while pos.byte < buf.line_byte_len(0) {
            right(&buf, &mut pos);
        }
        assert_eq!(pos.byte, buf.line_byte_len(0));
        left(&buf, &mut pos);
        left(&buf, &mut pos);
        assert_eq!(pos.byte, 2);
        line_start(&buf, &mut pos);
        assert_eq!(pos.byte, 0);
        line_end(&buf, &mut pos);
        assert_eq!(pos.byte, 6);
    }

    #[test]
    fn normal_mode_clamps_to_last_grapheme() {
        let buf = Buffer::from_str("t", "abc\n");
        let mut pos = Position::new(0, 3);
        normalize_normal_mode_position(&buf, &mut pos);
        assert_eq!(pos, Position::new(0, 2));
        let mut pos = Position::new(7, 3);
        normalize_normal_mode_position(&buf, &mut pos);
        assert_eq!(pos, Position::new(1, 0));
    }

    #[test]
    fn vertical_motion_keeps_sticky_column() {
        let buf = Buffer::from_str("t", "abcdef\nxy\nlonger line");
        let mut pos = Position::new(0, 4);
        let sticky = down(&buf, &mut pos, None);
        assert_eq!(pos, Position::new(1, 1));
        let sticky = down(&buf, &mut pos, sticky);
        assert_eq!(pos, Position::new(2, 4));
        up(&buf, &mut pos, sticky);
        up(&buf, &mut pos, sticky);
        assert_eq!(pos, Position::new(0, 4));
    }

    #[test]
    fn word_forward_stops_at_punctuation_and_empty_lines() {
        let stops = walk("foo, bar\n\n  baz", Position::new(0, 0), |b, p| {
            word_forward(b, p, false)
        });
        assert_eq!(
            stops,
            vec![
                Position::new(0, 3),
                Position::new(0, 5),
                Position::new(1, 0),
                Position::new(2, 2),
                Position::new(2, 5),
            ]
        );
    }

    #[test]
    fn big_word_forward_skips_punctuation() {
        let buf = Buffer::from_str("t", "foo,bar baz");
        let mut pos = Position::new(0, 0);
        word_forward(&buf, &mut pos, true);
        assert_eq!(pos, Position::new(0, 8));
    }

    #[test]
    fn word_backward_walks_to_buffer_start() {
        let stops = walk("foo, bar\n\n  baz", Position::new(2, 4), |b, p| {
            word_backward(b, p, false)
        });
        assert_eq!(
            stops,
            vec![
                Position::new(2, 2),
                Position::new(1, 0),
                Position::new(0, 5),
                Position::new(0, 3),
                Position::new(0, 0),
            ]
        );
    }

    #[test]
    fn word_end_crosses_lines() {
        let stops = walk("ab cd\nef", Position::new(0, 0), |b, p| word_end(b, p, false));
        assert_eq!(
            stops,
            vec![Position::new(0, 1), Position::new(0, 4), Position::new(1, 1)]
        );
    }

    #[test]
    fn find_char_variants() {
        let buf = Buffer::from_str("t", "a,b,c,d");
        let mut pos = Position::new(0, 0);
        assert!(find_char(&buf, &mut pos, FindKind::Forward, ',', 2));
        assert_eq!(pos.byte, 3);
        assert!(find_char(&buf, &mut pos, FindKind::ForwardTill, ',', 1));
        assert_eq!(pos.byte, 4);
        assert!(find_char(&buf, &mut pos, FindKind::Backward, 'a', 1));
        assert_eq!(pos.byte, 0);
        assert!(!find_char(&buf, &mut pos, FindKind::Forward, 'z', 1));
        assert_eq!(pos.byte, 0);
        let mut pos = Position::new(0, 6);
        assert!(find_char(&buf, &mut pos, FindKind::BackwardTill, 'b', 1));
        assert_eq!(pos.byte, 3);
    }

    #[test]
    fn paragraphs_and_sections() {
        let buf = Buffer::from_str("t", "a\nb\n\nc\n{\nd");
        let mut pos = Position::new(0, 0);
        paragraph_forward(&buf, &mut pos);
        assert_eq!(pos, Position::new(2, 0));
        paragraph_forward(&buf, &mut pos);
        assert_eq!(pos, Position::new(5, 0));
        paragraph_backward(&buf, &mut pos);
        assert_eq!(pos, Position::new(2, 0));

        let mut pos = Position::new(0, 0);
        section_forward(&buf, &mut pos);
        assert_eq!(pos, Position::new(4, 0));
        section_forward(&buf, &mut pos);
        assert_eq!(pos, Position::new(5, 0));
        section_backward(&buf, &mut pos);
        assert_eq!(pos, Position::new(4, 0));
    }
}
