//! Command-line mode: editing the text after `:` and running it.

use core_events::{KeyCode, KeyEvent};
use core_script::Interpreter;
use core_state::{HostSurface, Mode, RegisterContent};
use tracing::debug;

use super::Core;
use crate::DispatchError;
use crate::executor::EditorHost;

impl<H: EditorHost> Core<H> {
    pub(super) fn cmdline_key(
        &mut self,
        interp: &mut Interpreter,
        key: KeyEvent,
    ) -> Result<(), DispatchError> {
        if key == KeyEvent::enter() {
            let line = self.cmdline.take().unwrap_or_default();
            self.mode = Mode::Normal;
            return self.submit(interp, &line);
        }
        if key == KeyEvent::esc() || key.is_ctrl('c') || key.is_ctrl('[') {
            self.abandon_cmdline();
            return Ok(());
        }
        let Some(text) = self.cmdline.as_mut() else {
            self.mode = Mode::Normal;
            return Ok(());
        };
        let backspace = key.code == KeyCode::Backspace || key.is_ctrl('h');
        if backspace && text.is_empty() {
            self.abandon_cmdline();
        } else if backspace {
            text.pop();
        } else if key.is_ctrl('u') {
            text.clear();
        } else if key.is_ctrl('w') {
            delete_word_before(text);
        } else if key.code == KeyCode::Tab {
            text.push('\t');
        } else if let Some(c) = key.plain_char() {
            text.push(c);
        }
        Ok(())
    }

    fn abandon_cmdline(&mut self) {
        self.cmdline = None;
        self.mode = Mode::Normal;
    }

    fn submit(&mut self, interp: &mut Interpreter, line: &str) -> Result<(), DispatchError> {
        debug!(target: "runtime.session", len = line.len(), "cmdline_submit");
        if !line.trim().is_empty() {
            self.host.set_register(':', RegisterContent::chars(line))?;
        }
        self.run_ex_line(interp, line)
    }
}

/// `<C-W>`: drop trailing blanks, then one word or one run of punctuation.
fn delete_word_before(text: &mut String) {
    let trimmed = text.trim_end().len();
    text.truncate(trimmed);
    let Some(last) = text.chars().next_back() else {
        return;
    };
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let keep = if is_word(last) {
        text.trim_end_matches(is_word).len()
    } else {
        text.trim_end_matches(|c: char| !is_word(c) && !c.is_whitespace())
            .len()
    };
    text.truncate(keep);
}
