#![allow(dead_code)] // Shared across integration tests; each test binary uses a subset of helpers.

use core_actions::Session;
use core_state::{HostSurface, Position};
use core_text::TextHost;

pub fn session(text: &str) -> Session<TextHost> {
    Session::new(TextHost::new(text))
}

/// Session over `text` after `keys` were typed; panics if any key failed.
pub fn typed(text: &str, keys: &str) -> Session<TextHost> {
    let mut s = session(text);
    s.feed_keys(keys).unwrap();
    s
}

pub fn contents(s: &Session<TextHost>) -> String {
    s.host().contents()
}

pub fn caret(s: &Session<TextHost>) -> Position {
    s.host().caret()
}

pub fn at(line: usize, byte: usize) -> Position {
    Position::new(line, byte)
}
