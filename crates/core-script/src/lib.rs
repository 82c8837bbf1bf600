//! core-script: a Vim script interpreter.
//!
//! Source text goes through [`parser`] into [`ast`] statements, which
//! [`Interpreter`] runs against a [`ScriptHost`]. The interpreter owns all
//! variable scopes and the [`FunctionStorage`]; the host owns text, options,
//! messages and every ex command that is not part of the language.

pub mod ast;
pub mod builtins;
mod error;
mod eval;
pub mod functions;
mod lexer;
pub mod parser;
pub mod value;

pub use error::ScriptError;
pub use eval::{ExecutionResult, Interpreter, ScriptHost, ScriptSettings};
pub use functions::{FunctionHandler, FunctionKey, FunctionScope, FunctionStorage, ScriptId};
pub use parser::{ParseContext, parse_expression, parse_script, parse_script_in};
pub use value::{Funcref, Value};
