//! core-actions: the modal command-resolution engine.
//!
//! Raw keys enter a [`Session`], pass through user mappings and the builtin
//! key tables of [`KeyHandler`], and come out as [`Command`] values that the
//! host runs through its [`ActionExecutor`]. The session also runs ex
//! command lines and owns the Vim script interpreter, so `:map`, `:normal`,
//! `:set` and `<expr>` mappings all meet in one place.

pub mod bindings;
pub mod command;
mod error;
mod executor;
pub mod key_handler;
mod options;
mod session;

pub use command::{
    Command, FindKind, InsertEntry, Motion, MotionClass, Operator, OperatorTarget, ScrollAnchor,
    TextObject, TextObjectKind,
};
pub use error::{ActionError, DispatchError};
pub use executor::{ActionExecutor, EditorHost, ExecContext};
pub use key_handler::{KeyHandler, PendingState, Step};
pub use options::{OptionError, OptionValue, Options};
pub use session::Session;
