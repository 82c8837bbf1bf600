//! core-ex: the ex command line.
//!
//! Three layers, each usable on its own:
//! * [`range`]: `[range]` syntax and its lazy resolution against the host.
//! * [`registry`]: the command table with abbreviations and per-command
//!   range/argument/bang/access requirements.
//! * [`parser`]: `[range] name [!] [argument]` splitting, validation, `|`
//!   separation and script line continuation.
//!
//! Executing a command is the session's job (`core-actions`); this crate only
//! turns text into validated [`ExCommandLine`] values.

mod error;
pub mod parser;
pub mod range;
pub mod registry;

pub use error::ExError;
pub use parser::{
    CommandParts, ExCommandLine, is_comment_or_empty, join_continuation_lines,
    parse_command_line, split_bars, split_command,
};
pub use range::{Address, LineRange, LineSpec, Range, parse_range};
pub use registry::{
    Access, ArgumentFlag, CommandRegistry, CommandSpec, RangeFlag, builtin_spec,
    canonical_builtin,
};
