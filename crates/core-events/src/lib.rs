//! Core key event types for oxvim.
//!
//! Every layer above this crate (mapping trie, modal dispatcher, ex command
//! line) speaks in terms of `KeyEvent`. Hosts translate their platform events
//! into this model once; the textual Vim key notation (`<C-O>`, `<Esc>`,
//! `<Plug>`) is handled by the [`notation`] module and round-trips losslessly.
//!
//! Normalization rules applied at construction time (see [`KeyEvent::new`]):
//! * `CTRL` + letter is stored with a lowercase letter (`<C-O>` == `<C-o>`).
//! * `SHIFT` on a printable character is folded into the character itself
//!   (`<S-a>` becomes `A`); `SHIFT` is retained only for named keys.

use std::fmt;

pub mod notation;

pub use notation::{
    keys_to_notation, parse_keys, parse_vim_script_string, string_to_keys, to_key_notation,
    to_printable_string,
};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct KeyModifiers: u8 {
        const CTRL = 0b0000_0001;
        const SHIFT= 0b0000_0010;
        const ALT  = 0b0000_0100;
        /// Command / super key (`<D-...>` in notation).
        const META = 0b0000_1000;
    }
}

/// KeyCode enumerates normalized logical key representations consumed by higher layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyCode {
    Char(char),
    Enter,
    Esc,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
    /// Fake key introducing `<Plug>` mappings; never produced by a keyboard.
    Plug,
    /// Fake key introducing `<Action>` mappings routed to host actions.
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub mods: KeyModifiers,
}

impl KeyEvent {
    /// Build a normalized key event (see crate docs for the folding rules).
    pub fn new(code: KeyCode, mods: KeyModifiers) -> Self {
        let mut code = code;
        let mut mods = mods;
        if let KeyCode::Char(c) = code {
            if mods.contains(KeyModifiers::SHIFT) {
                mods.remove(KeyModifiers::SHIFT);
                if c.is_ascii_lowercase() {
                    code = KeyCode::Char(c.to_ascii_uppercase());
                }
            }
            if mods.contains(KeyModifiers::CTRL)
                && let KeyCode::Char(c) = code
                && c.is_ascii_uppercase()
            {
                code = KeyCode::Char(c.to_ascii_lowercase());
            }
        }
        Self { code, mods }
    }

    /// Plain character key without modifiers.
    pub const fn char(c: char) -> Self {
        Self {
            code: KeyCode::Char(c),
            mods: KeyModifiers::empty(),
        }
    }

    /// Named (non character) key without modifiers.
    pub const fn named(code: KeyCode) -> Self {
        Self {
            code,
            mods: KeyModifiers::empty(),
        }
    }

    /// `<C-x>` for a character.
    pub fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c), KeyModifiers::CTRL)
    }

    pub const fn esc() -> Self {
        Self::named(KeyCode::Esc)
    }

    pub const fn enter() -> Self {
        Self::named(KeyCode::Enter)
    }

    /// The character this key types when no modifiers are held.
    pub fn plain_char(&self) -> Option<char> {
        match self.code {
            KeyCode::Char(c) if self.mods.is_empty() => Some(c),
            _ => None,
        }
    }

    pub fn is_ctrl(&self, c: char) -> bool {
        self.mods == KeyModifiers::CTRL && self.code == KeyCode::Char(c)
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_key_notation(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_event_display_uses_notation() {
        let k = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CTRL);
        assert_eq!(format!("{}", k), "<C-X>");
        assert_eq!(format!("{}", KeyEvent::esc()), "<Esc>");
    }

    #[test]
    fn ctrl_letter_is_case_folded() {
        let upper = KeyEvent::new(KeyCode::Char('O'), KeyModifiers::CTRL);
        let lower = KeyEvent::ctrl('o');
        assert_eq!(upper, lower);
    }

    #[test]
    fn shift_folds_into_printable_char() {
        let k = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::SHIFT);
        assert_eq!(k, KeyEvent::char('A'));
        let tab = KeyEvent::new(KeyCode::Tab, KeyModifiers::SHIFT);
        assert!(tab.mods.contains(KeyModifiers::SHIFT));
    }

    #[test]
    fn plain_char_requires_no_modifiers() {
        assert_eq!(KeyEvent::char('q').plain_char(), Some('q'));
        assert_eq!(KeyEvent::ctrl('q').plain_char(), None);
        assert!(KeyEvent::ctrl('r').is_ctrl('r'));
    }
}
