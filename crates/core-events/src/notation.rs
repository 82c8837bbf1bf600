//! Vim key notation codec.
//!
//! `parse_keys` understands the `<...>` notation used by mappings and
//! `:normal` (`<C-O>`, `<Esc>`, `<lt>`, `<Plug>`, `<F5>`, `<S-Tab>`);
//! `keys_to_notation` renders the canonical spelling back. For any canonical
//! key list `keys_to_notation(&parse_keys(s))` is the normalized form of `s`
//! and parsing that again yields the same keys.
//!
//! Unknown or unterminated `<...>` groups are taken literally, matching how
//! Vim treats `<foo>` in a mapping right-hand side.

use crate::{KeyCode, KeyEvent, KeyModifiers};

/// Named keys accepted inside `<...>` (case insensitive). The first spelling for
/// each code is the canonical one used when rendering.
const NAMED_KEYS: &[(&str, KeyCode)] = &[
    ("CR", KeyCode::Enter),
    ("Enter", KeyCode::Enter),
    ("Return", KeyCode::Enter),
    ("Esc", KeyCode::Esc),
    ("BS", KeyCode::Backspace),
    ("Backspace", KeyCode::Backspace),
    ("Tab", KeyCode::Tab),
    ("Up", KeyCode::Up),
    ("Down", KeyCode::Down),
    ("Left", KeyCode::Left),
    ("Right", KeyCode::Right),
    ("Home", KeyCode::Home),
    ("End", KeyCode::End),
    ("PageUp", KeyCode::PageUp),
    ("PageDown", KeyCode::PageDown),
    ("Insert", KeyCode::Insert),
    ("Ins", KeyCode::Insert),
    ("Del", KeyCode::Delete),
    ("Delete", KeyCode::Delete),
    ("Plug", KeyCode::Plug),
    ("Action", KeyCode::Action),
];

/// Printable characters that have a dedicated name in notation.
const NAMED_CHARS: &[(&str, char)] = &[
    ("Space", ' '),
    ("lt", '<'),
    ("Bar", '|'),
    ("Bslash", '\\'),
];

/// Parse Vim key notation into key events.
pub fn parse_keys(input: &str) -> Vec<KeyEvent> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '<'
            && let Some(rel_end) = chars[i + 1..].iter().position(|c| *c == '>')
        {
            let end = i + 1 + rel_end;
            let inner: String = chars[i + 1..end].iter().collect();
            match parse_special(&inner) {
                Some(Special::Key(k)) => {
                    out.push(k);
                    i = end + 1;
                    continue;
                }
                Some(Special::Nop) => {
                    i = end + 1;
                    continue;
                }
                None => {}
            }
        }
        out.push(key_from_char(chars[i]));
        i += 1;
    }
    out
}

/// Every character becomes one key, without interpreting `<...>` groups.
pub fn string_to_keys(input: &str) -> Vec<KeyEvent> {
    input.chars().map(key_from_char).collect()
}

/// Canonical notation for a single key.
pub fn to_key_notation(key: &KeyEvent) -> String {
    let base = match key.code {
        KeyCode::Char(c) => {
            if let Some((name, _)) = NAMED_CHARS.iter().find(|(_, ch)| *ch == c) {
                name.to_string()
            } else if key.mods.contains(KeyModifiers::CTRL) && c.is_ascii_lowercase() {
                c.to_ascii_uppercase().to_string()
            } else {
                c.to_string()
            }
        }
        KeyCode::F(n) => format!("F{n}"),
        code => NAMED_KEYS
            .iter()
            .find(|(_, k)| *k == code)
            .map(|(name, _)| name.to_string())
            .unwrap_or_default(),
    };
    let bare_char = matches!(key.code, KeyCode::Char(c) if !NAMED_CHARS.iter().any(|(_, ch)| *ch == c));
    if key.mods.is_empty() && bare_char {
        return base;
    }
    let mut out = String::from("<");
    for (flag, prefix) in [
        (KeyModifiers::CTRL, "C-"),
        (KeyModifiers::SHIFT, "S-"),
        (KeyModifiers::ALT, "A-"),
        (KeyModifiers::META, "D-"),
    ] {
        if key.mods.contains(flag) {
            out.push_str(prefix);
        }
    }
    out.push_str(&base);
    out.push('>');
    out
}

/// Canonical notation for a key sequence.
pub fn keys_to_notation(keys: &[KeyEvent]) -> String {
    keys.iter().map(to_key_notation).collect()
}

/// Text a key sequence would insert when typed in Insert mode.
///
/// `<Tab>` and `<CR>` become their whitespace, `<C-x>` becomes the matching
/// control character; keys without a textual form are dropped.
pub fn to_printable_string(keys: &[KeyEvent]) -> String {
    keys.iter().filter_map(key_to_char).collect()
}

/// Process the escapes of a double quoted Vim script string body.
///
/// Supported: `\n \t \r \e \b \f \\ \"`, `\xNN`, `\uNNNN`, `\UNNNNNNNN`,
/// octal `\NNN` and `\<Key>` (the key's character form, or its notation
/// text when the key has none). Any other escaped char stands for itself.
pub fn parse_vim_script_string(body: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' || i + 1 >= chars.len() {
            out.push(c);
            i += 1;
            continue;
        }
        let e = chars[i + 1];
        i += 2;
        match e {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'e' => out.push('\x1b'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'x' | 'X' | 'u' | 'U' => {
                let max = match e {
                    'x' | 'X' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars[i..]
                    .iter()
                    .take(max)
                    .take_while(|d| d.is_ascii_hexdigit())
                    .collect();
                if digits.is_empty() {
                    out.push(e);
                } else {
                    i += digits.len();
                    if let Some(ch) = u32::from_str_radix(&digits, 16)
                        .ok()
                        .and_then(char::from_u32)
                    {
                        out.push(ch);
                    }
                }
            }
            '0'..='7' => {
                let mut digits = String::from(e);
                while digits.len() < 3 && i < chars.len() && ('0'..='7').contains(&chars[i]) {
                    digits.push(chars[i]);
                    i += 1;
                }
                if let Some(ch) = u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            '<' => {
                let rest: String = chars[i..].iter().collect();
                let parsed = rest.find('>').and_then(|end| {
                    let inner = &rest[..end];
                    match parse_special(inner) {
                        Some(Special::Key(k)) => Some((k, inner.chars().count() + 1)),
                        _ => None,
                    }
                });
                match parsed {
                    Some((key, consumed)) => {
                        i += consumed;
                        match key_to_char(&key) {
                            Some(ch) => out.push(ch),
                            None => out.push_str(&to_key_notation(&key)),
                        }
                    }
                    None => out.push('<'),
                }
            }
            other => out.push(other),
        }
    }
    out
}

enum Special {
    Key(KeyEvent),
    Nop,
}

fn parse_special(inner: &str) -> Option<Special> {
    if inner.eq_ignore_ascii_case("nop") {
        return Some(Special::Nop);
    }
    let mut mods = KeyModifiers::empty();
    let mut rest = inner;
    loop {
        let mut it = rest.chars();
        let (Some(m), Some('-')) = (it.next(), it.next()) else {
            break;
        };
        if rest.chars().count() <= 2 {
            break;
        }
        let flag = match m.to_ascii_uppercase() {
            'C' => KeyModifiers::CTRL,
            'S' => KeyModifiers::SHIFT,
            'A' | 'M' => KeyModifiers::ALT,
            'D' => KeyModifiers::META,
            _ => break,
        };
        mods |= flag;
        rest = &rest[2..];
    }
    let mut base_chars = rest.chars();
    let code = match (base_chars.next(), base_chars.next()) {
        (Some(c), None) => {
            // A bare `<x>` is not notation; it needs at least one modifier.
            if mods.is_empty() {
                return None;
            }
            KeyCode::Char(c)
        }
        (Some(_), Some(_)) => named_code(rest)?,
        _ => return None,
    };
    Some(Special::Key(KeyEvent::new(code, mods)))
}

fn named_code(name: &str) -> Option<KeyCode> {
    if let Some((_, c)) = NAMED_CHARS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
    {
        return Some(KeyCode::Char(*c));
    }
    if let Some((_, code)) = NAMED_KEYS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
    {
        return Some(*code);
    }
    let digits = name.strip_prefix(['F', 'f'])?;
    let n: u8 = digits.parse().ok()?;
    (1..=37).contains(&n).then_some(KeyCode::F(n))
}

/// Raw character to key, mapping ASCII control characters to their keys.
fn key_from_char(c: char) -> KeyEvent {
    match c {
        '\x1b' => KeyEvent::esc(),
        '\r' | '\n' => KeyEvent::enter(),
        '\t' => KeyEvent::named(KeyCode::Tab),
        '\x08' | '\x7f' => KeyEvent::named(KeyCode::Backspace),
        '\x01'..='\x1a' => KeyEvent::ctrl((b'a' + (c as u8 - 1)) as char),
        _ => KeyEvent::char(c),
    }
}

fn key_to_char(key: &KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(c) if key.mods.is_empty() => Some(c),
        KeyCode::Char(c) if key.mods == KeyModifiers::CTRL && c.is_ascii_lowercase() => {
            Some((c as u8 - b'a' + 1) as char)
        }
        KeyCode::Enter if key.mods.is_empty() => Some('\r'),
        KeyCode::Tab if key.mods.is_empty() => Some('\t'),
        KeyCode::Esc if key.mods.is_empty() => Some('\x1b'),
        KeyCode::Backspace if key.mods.is_empty() => Some('\x08'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn parses_plain_and_named_keys() {
        let keys = parse_keys("d<Esc>x<CR>");
        assert_eq!(
            keys,
            vec![
                KeyEvent::char('d'),
                KeyEvent::esc(),
                KeyEvent::char('x'),
                KeyEvent::enter()
            ]
        );
    }

    #[test]
    fn named_keys_are_case_insensitive() {
        assert_eq!(parse_keys("<esc>"), parse_keys("<ESC>"));
        assert_eq!(parse_keys("<c-o>"), vec![KeyEvent::ctrl('o')]);
        assert_eq!(parse_keys("<Enter>"), parse_keys("<cr>"));
    }

    #[test]
    fn modifiers_render_in_canonical_order() {
        let keys = parse_keys("<s-c-tab>");
        assert_eq!(keys_to_notation(&keys), "<C-S-Tab>");
        assert_eq!(keys_to_notation(&parse_keys("<M-x>")), "<A-x>");
    }

    #[test]
    fn special_chars_render_with_names() {
        assert_eq!(keys_to_notation(&parse_keys("a b")), "a<Space>b");
        assert_eq!(keys_to_notation(&parse_keys("<lt>")), "<lt>");
        assert_eq!(parse_keys("<Bar>"), vec![KeyEvent::char('|')]);
    }

    #[test]
    fn unknown_groups_are_literal() {
        assert_eq!(keys_to_notation(&parse_keys("<foo>")), "<lt>foo>");
        assert_eq!(parse_keys("<a"), vec![KeyEvent::char('<'), KeyEvent::char('a')]);
        assert_eq!(parse_keys("<x>").len(), 3);
    }

    #[test]
    fn plug_and_nop() {
        let keys = parse_keys("<Plug>(Foo)<Nop>");
        assert_eq!(keys[0], KeyEvent::named(KeyCode::Plug));
        assert_eq!(keys.len(), 6);
        assert_eq!(keys_to_notation(&keys), "<Plug>(Foo)");
    }

    #[test]
    fn printable_string_expands_control_keys() {
        let keys = parse_keys("<C-I>hello<Esc>");
        assert_eq!(to_printable_string(&keys), "\thello\x1b");
    }

    #[test]
    fn raw_control_chars_map_to_keys() {
        assert_eq!(string_to_keys("\x0f"), vec![KeyEvent::ctrl('o')]);
        assert_eq!(string_to_keys("\x1b"), vec![KeyEvent::esc()]);
        assert_eq!(string_to_keys("<Esc>").len(), 5);
    }

    #[test]
    fn script_string_escapes() {
        assert_eq!(parse_vim_script_string(r#"a\tb\n"#), "a\tb\n");
        assert_eq!(parse_vim_script_string(r#"\"q\""#), "\"q\"");
        assert_eq!(parse_vim_script_string(r"\x41☺"), "A\u{263A}");
        assert_eq!(parse_vim_script_string(r"\101"), "A");
        assert_eq!(parse_vim_script_string(r"\<Esc>dd"), "\x1bdd");
        assert_eq!(parse_vim_script_string(r"\<Up>"), "<Up>");
    }

    fn canonical_key() -> impl Strategy<Value = KeyEvent> {
        let printable = proptest::char::range('!', '~').prop_map(KeyEvent::char);
        let ctrl = proptest::char::range('a', 'z').prop_map(KeyEvent::ctrl);
        let named = prop_oneof![
            Just(KeyCode::Enter),
            Just(KeyCode::Esc),
            Just(KeyCode::Backspace),
            Just(KeyCode::Tab),
            Just(KeyCode::Up),
            Just(KeyCode::Home),
            Just(KeyCode::Delete),
            Just(KeyCode::Plug),
            (1u8..=12).prop_map(KeyCode::F),
        ]
        .prop_map(KeyEvent::named);
        let shifted = Just(KeyEvent::new(KeyCode::Tab, KeyModifiers::SHIFT));
        prop_oneof![printable, ctrl, named, shifted, Just(KeyEvent::char(' '))]
    }

    proptest! {
        #[test]
        fn notation_round_trips(keys in proptest::collection::vec(canonical_key(), 0..12)) {
            let text = keys_to_notation(&keys);
            let parsed = parse_keys(&text);
            prop_assert_eq!(&parsed, &keys);
            prop_assert_eq!(keys_to_notation(&parsed), text);
        }
    }
}
