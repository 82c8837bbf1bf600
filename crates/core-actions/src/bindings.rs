//! Built-in key tables of the modal dispatcher.
//!
//! These are the keys Vim gives meaning to before any user mapping; the
//! [`KeyHandler`](crate::KeyHandler) consults them once a key has survived
//! mapping expansion.

use core_events::{KeyCode, KeyEvent, KeyModifiers};

use crate::command::{InsertEntry, Motion, Operator, TextObject, TextObjectKind};

/// Target a shorthand key expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShorthandTarget {
    Motion(Motion),
    Lines,
}

/// Motions reached by a single key.
pub fn motion(key: &KeyEvent) -> Option<Motion> {
    if key.mods == KeyModifiers::CTRL {
        return match key.code {
            KeyCode::Char('h') => Some(Motion::Left),
            KeyCode::Char('n') | KeyCode::Char('j') => Some(Motion::Down),
            KeyCode::Char('p') => Some(Motion::Up),
            _ => None,
        };
    }
    let m = match key.code {
        KeyCode::Left | KeyCode::Backspace => Motion::Left,
        KeyCode::Right => Motion::Right,
        KeyCode::Up => Motion::Up,
        KeyCode::Down => Motion::Down,
        KeyCode::Home => Motion::LineStart,
        KeyCode::End => Motion::LineEnd,
        KeyCode::Char(c) if key.mods.is_empty() => match c {
            'h' => Motion::Left,
            'l' | ' ' => Motion::Right,
            'j' => Motion::Down,
            'k' => Motion::Up,
            'w' => Motion::WordForward,
            'b' => Motion::WordBackward,
            'e' => Motion::WordEnd,
            'W' => Motion::BigWordForward,
            'B' => Motion::BigWordBackward,
            'E' => Motion::BigWordEnd,
            '0' => Motion::LineStart,
            '^' => Motion::FirstNonBlank,
            '$' => Motion::LineEnd,
            '}' => Motion::ParagraphForward,
            '{' => Motion::ParagraphBackward,
            '%' => Motion::MatchPair,
            _ => return None,
        },
        _ => return None,
    };
    Some(m)
}

/// Operators started by a single key.
pub fn operator(ch: char) -> Option<Operator> {
    match ch {
        'd' => Some(Operator::Delete),
        'y' => Some(Operator::Yank),
        'c' => Some(Operator::Change),
        '>' => Some(Operator::Indent),
        '<' => Some(Operator::Outdent),
        _ => None,
    }
}

/// Operators started by `g` and a second key.
pub fn g_operator(ch: char) -> Option<Operator> {
    match ch {
        'u' => Some(Operator::Lowercase),
        'U' => Some(Operator::Uppercase),
        '~' => Some(Operator::ToggleCase),
        _ => None,
    }
}

/// Operators reached by a single key while a selection is live.
pub fn visual_operator(ch: char) -> Option<Operator> {
    match ch {
        'x' | 'X' | 'D' => Some(Operator::Delete),
        'Y' => Some(Operator::Yank),
        's' | 'S' | 'C' | 'R' => Some(Operator::Change),
        'u' => Some(Operator::Lowercase),
        'U' => Some(Operator::Uppercase),
        '~' => Some(Operator::ToggleCase),
        other => operator(other),
    }
}

/// Single keys that stand for an operator with a fixed target.
pub fn shorthand(ch: char) -> Option<(Operator, ShorthandTarget)> {
    let entry = match ch {
        'x' => (Operator::Delete, ShorthandTarget::Motion(Motion::Right)),
        'X' => (Operator::Delete, ShorthandTarget::Motion(Motion::Left)),
        'D' => (Operator::Delete, ShorthandTarget::Motion(Motion::LineEnd)),
        'C' => (Operator::Change, ShorthandTarget::Motion(Motion::LineEnd)),
        's' => (Operator::Change, ShorthandTarget::Motion(Motion::Right)),
        'S' => (Operator::Change, ShorthandTarget::Lines),
        'Y' => (Operator::Yank, ShorthandTarget::Lines),
        '~' => (Operator::ToggleCase, ShorthandTarget::Motion(Motion::Right)),
        _ => return None,
    };
    Some(entry)
}

pub fn insert_entry(ch: char) -> Option<InsertEntry> {
    match ch {
        'i' => Some(InsertEntry::Before),
        'a' => Some(InsertEntry::After),
        'I' => Some(InsertEntry::LineStart),
        'A' => Some(InsertEntry::LineEnd),
        'o' => Some(InsertEntry::OpenBelow),
        'O' => Some(InsertEntry::OpenAbove),
        _ => None,
    }
}

/// Text object named by the key after `i` or `a`.
pub fn text_object(ch: char, inner: bool) -> Option<TextObject> {
    let kind = match ch {
        'w' => TextObjectKind::Word,
        'W' => TextObjectKind::BigWord,
        '"' | '\'' | '`' => TextObjectKind::Quote(ch),
        '(' | ')' | 'b' => TextObjectKind::Bracket('(', ')'),
        '{' | '}' | 'B' => TextObjectKind::Bracket('{', '}'),
        '[' | ']' => TextObjectKind::Bracket('[', ']'),
        '<' | '>' => TextObjectKind::Bracket('<', '>'),
        'p' => TextObjectKind::Paragraph,
        _ => return None,
    };
    Some(TextObject { kind, inner })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_is_a_motion_here() {
        assert_eq!(motion(&KeyEvent::char('0')), Some(Motion::LineStart));
        assert_eq!(motion(&KeyEvent::char('1')), None);
        assert_eq!(motion(&KeyEvent::ctrl('n')), Some(Motion::Down));
    }

    #[test]
    fn bracket_aliases() {
        let a = text_object('b', true).unwrap();
        let b = text_object(')', true).unwrap();
        assert_eq!(a, b);
        assert_eq!(text_object('B', false).unwrap().kind, TextObjectKind::Bracket('{', '}'));
        assert!(text_object('z', true).is_none());
    }
}
