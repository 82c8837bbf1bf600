//! Drives one session over the reference host.
//!
//! Every input (ex command, sourced script, key notation) runs as its own
//! dispatch turn. A failing turn does not stop the driver: the session has
//! already recorded the message and reset to Normal mode, so the next input
//! starts clean and the failure shows up in the final report.

use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use core_actions::{DispatchError, Session};
use core_config::Config;
use core_text::{Buffer, TextHost};
use tracing::{debug, info, warn};

pub struct Driver {
    session: Session<TextHost>,
}

impl Driver {
    /// Session over the contents of `path`; a file that does not exist yet
    /// opens as an empty buffer carrying its name.
    pub fn open(path: Option<&Path>, config: &Config) -> Result<Self> {
        let buffer = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                // The final newline terminates the last line.
                let content = content.strip_suffix('\n').unwrap_or(&content);
                info!(target: "runtime.startup", path = %path.display(), bytes = content.len(), "buffer_loaded");
                Buffer::from_str(path.display().to_string(), content)
            }
            Some(path) => {
                info!(target: "runtime.startup", path = %path.display(), "new_file");
                Buffer::from_str(path.display().to_string(), "")
            }
            None => Buffer::default(),
        };
        Ok(Self::with_buffer(buffer, config))
    }

    pub fn with_buffer(buffer: Buffer, config: &Config) -> Self {
        Self {
            session: Session::with_config(TextHost::from_buffer(buffer), config),
        }
    }

    pub fn session(&self) -> &Session<TextHost> {
        &self.session
    }

    pub fn run_command(&mut self, line: &str) {
        let result = self.session.execute_ex(line);
        self.note("command", result);
    }

    pub fn source(&mut self, path: &Path) {
        let result = self.session.source(path).map(|id| {
            debug!(target: "runtime.driver", script = id.0, "script_sourced");
        });
        self.note("source", result);
    }

    /// Feed keys in Vim notation; a mapping prefix still pending at the end
    /// is resolved as if its timeout had passed.
    pub fn feed(&mut self, notation: &str) {
        let result = self.session.feed_keys(notation);
        self.note("keys", result);
        if let Some(deadline) = self.session.deadline() {
            let result = self.session.flush_timeout(deadline);
            self.note("timeout", result);
        }
    }

    /// One REPL line: `:`-prefixed lines are ex commands, anything else is
    /// key notation.
    pub fn repl_line(&mut self, line: &str) {
        match line.strip_prefix(':') {
            Some(cmd) => self.run_command(cmd),
            None => self.feed(line),
        }
    }

    /// Read lines until end of input, printing the messages each one
    /// produced.
    pub fn repl(&mut self, input: impl BufRead, out: &mut impl Write) -> Result<()> {
        for line in input.lines() {
            let line = line.context("reading input")?;
            self.repl_line(&line);
            for msg in self.session.take_messages() {
                writeln!(out, "{msg}")?;
            }
        }
        Ok(())
    }

    /// Buffer text, then any messages not yet shown, then the last error.
    pub fn report(&mut self) -> String {
        let mut out = self.session.host().contents();
        out.push('\n');
        let messages = self.session.take_messages();
        if !messages.is_empty() {
            out.push_str("-- messages --\n");
            for msg in messages {
                let _ = writeln!(out, "{msg}");
            }
        }
        if let Some(err) = self.session.last_error() {
            let _ = writeln!(out, "-- last error: {err}");
        }
        out
    }

    fn note(&self, what: &str, result: Result<(), DispatchError>) {
        if let Err(err) = result {
            warn!(target: "runtime.driver", input = what, error = %err, "input_failed");
        }
    }
}
