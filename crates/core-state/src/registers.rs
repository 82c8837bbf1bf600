//! Register store usable by hosts that do not bring their own.
//!
//! Write rules:
//! - Yanks fill `0`; deletes shift the `1`..`9` ring (newest at `1`), except
//!   deletes within one line, which go to `-`.
//! - Named registers `a`-`z` are replaced, `A`-`Z` append to the lowercase slot.
//! - The unnamed register `"` always mirrors the latest payload.
//! - `_` discards everything written to it.

use tracing::trace;

use crate::{HostError, RegisterContent};

#[derive(Debug, Default, Clone)]
pub struct Registers {
    unnamed: RegisterContent,
    yank: RegisterContent,
    numbered: Vec<RegisterContent>, // newest at index 0, length <= 9
    small_delete: RegisterContent,
    named: [RegisterContent; 26],
    search: RegisterContent,
    command: RegisterContent,
}

impl Registers {
    pub const RING: usize = 9;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_yank(&mut self, target: Option<char>, content: RegisterContent) {
        if target == Some('_') {
            return;
        }
        if let Some(name) = target.filter(|c| c.is_ascii_alphabetic()) {
            let stored = self.write_named(name, content);
            self.unnamed = stored;
            return;
        }
        self.yank = content.clone();
        self.unnamed = content;
        trace!(target: "state.registers", "yank_recorded");
    }

    pub fn record_delete(&mut self, target: Option<char>, content: RegisterContent) {
        if target == Some('_') {
            return;
        }
        if let Some(name) = target.filter(|c| c.is_ascii_alphabetic()) {
            let stored = self.write_named(name, content);
            self.unnamed = stored;
            return;
        }
        if !content.linewise && !content.text.contains('\n') {
            self.small_delete = content.clone();
        } else {
            let rotated = self.numbered.len() == Self::RING;
            if rotated {
                self.numbered.pop();
            }
            self.numbered.insert(0, content.clone());
            trace!(target: "state.registers", rotated, "numbered_ring_shift");
        }
        self.unnamed = content;
    }

    pub fn get(&self, name: char) -> Option<RegisterContent> {
        let content = match name {
            '"' => &self.unnamed,
            '0' => &self.yank,
            '1'..='9' => self.numbered.get((name as u8 - b'1') as usize)?,
            '-' => &self.small_delete,
            '/' => &self.search,
            ':' => &self.command,
            c if c.is_ascii_alphabetic() => &self.named[named_index(c)],
            _ => return None,
        };
        (!content.text.is_empty()).then(|| content.clone())
    }

    /// Direct write as done by `:let @a = ...` or `setreg()`.
    pub fn set(&mut self, name: char, content: RegisterContent) -> Result<(), HostError> {
        match name {
            '"' => {
                self.yank = content.clone();
                self.unnamed = content;
            }
            '0' => self.yank = content,
            '1'..='9' => {
                let idx = (name as u8 - b'1') as usize;
                while self.numbered.len() <= idx {
                    self.numbered.push(RegisterContent::default());
                }
                self.numbered[idx] = content;
            }
            '-' => self.small_delete = content,
            '/' => self.search = content,
            ':' => self.command = content,
            '_' => {}
            c if c.is_ascii_alphabetic() => {
                self.write_named(c, content);
            }
            other => return Err(HostError::InvalidRegister(other)),
        }
        Ok(())
    }

    /// Names of non-empty registers in `:registers` order.
    pub fn names(&self) -> Vec<char> {
        let order = ['"', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '-']
            .into_iter()
            .chain('a'..='z')
            .chain([':', '/']);
        order.filter(|c| self.get(*c).is_some()).collect()
    }

    fn write_named(&mut self, name: char, content: RegisterContent) -> RegisterContent {
        let slot = &mut self.named[named_index(name)];
        if name.is_ascii_uppercase() && !slot.text.is_empty() {
            if content.linewise && !slot.linewise {
                slot.text.push('\n');
            }
            slot.text.push_str(&content.text);
            slot.linewise |= content.linewise;
        } else {
            *slot = content;
        }
        slot.clone()
    }
}

fn named_index(c: char) -> usize {
    (c.to_ascii_lowercase() as u8 - b'a') as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn uppercase_appends_to_named_slot() {
        let mut r = Registers::new();
        r.record_yank(Some('a'), RegisterContent::chars("foo"));
        r.record_yank(Some('A'), RegisterContent::chars("bar"));
        assert_eq!(r.get('a').unwrap().text, "foobar");
        assert_eq!(r.get('"').unwrap().text, "foobar");
    }

    #[test]
    fn deletes_rotate_numbered_ring() {
        let mut r = Registers::new();
        for i in 0..11 {
            r.record_delete(None, RegisterContent::lines(format!("line{i}\n")));
        }
        assert_eq!(r.get('1').unwrap().text, "line10\n");
        assert_eq!(r.get('9').unwrap().text, "line2\n");
        assert!(r.get('0').is_none());
    }

    #[test]
    fn small_delete_and_black_hole() {
        let mut r = Registers::new();
        r.record_delete(None, RegisterContent::chars("w"));
        assert_eq!(r.get('-').unwrap().text, "w");
        assert!(r.get('1').is_none());
        r.record_delete(Some('_'), RegisterContent::chars("gone"));
        assert_eq!(r.get('"').unwrap().text, "w");
    }

    #[test]
    fn names_skip_empty_registers() {
        let mut r = Registers::new();
        r.record_yank(None, RegisterContent::chars("y"));
        r.set('q', RegisterContent::chars("macro")).unwrap();
        assert_eq!(r.names(), vec!['"', '0', 'q']);
        assert_eq!(
            r.set('%', RegisterContent::chars("x")),
            Err(HostError::InvalidRegister('%'))
        );
    }
}
