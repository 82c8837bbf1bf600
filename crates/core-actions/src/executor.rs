//! The seam between dispatch and the host's editing primitives.

use core_state::{HostSurface, Mode, RegexEngine};

use crate::ActionError;
use crate::command::Command;

/// Settings and state an executor may need besides the command itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecContext {
    /// Mode the command was typed in.
    pub mode: Mode,
    pub shiftwidth: usize,
    pub ignorecase: bool,
    pub wrapscan: bool,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            shiftwidth: 8,
            ignorecase: false,
            wrapscan: true,
        }
    }
}

/// Runs resolved motions, operators and edits against host text.
///
/// Mode bookkeeping, registers of the dispatcher (`.` history, last search)
/// and selection tracking stay in the session; an executor only moves the
/// caret and changes text. Commands it has no use for may be ignored.
pub trait ActionExecutor {
    fn execute(&mut self, cmd: &Command, ctx: &ExecContext) -> Result<(), ActionError>;
}

/// Everything a [`Session`](crate::Session) needs from its host.
pub trait EditorHost: HostSurface + RegexEngine + ActionExecutor {}

impl<T: HostSurface + RegexEngine + ActionExecutor> EditorHost for T {}
