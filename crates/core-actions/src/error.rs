use core_ex::ExError;
use core_keymap::MappingError;
use core_script::ScriptError;
use core_state::HostError;
use thiserror::Error;

use crate::options::OptionError;

/// Failures reported by an [`ActionExecutor`](crate::ActionExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("E486: Pattern not found: {0}")]
    PatternNotFound(String),
    #[error("E20: Mark not set")]
    MarkNotSet,
    #[error("E353: Nothing in register {0}")]
    EmptyRegister(char),
    #[error("E35: No previous regular expression")]
    NoPreviousPattern,
    /// The motion did not move, so the operator has nothing to act on.
    #[error("Operator would act on an empty region")]
    EmptyRegion,
    #[error("E319: Sorry, the command is not available in this version: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Anything that can abort one dispatch turn. The session records the
/// message, resets to Normal mode and returns the error to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("E223: recursive mapping")]
    RecursiveMapping,
    #[error("E192: Recursive use of :normal too deep")]
    NormalTooDeep,
    #[error("Invalid key sequence: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Ex(#[from] ExError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Option(#[from] OptionError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<DispatchError> for ScriptError {
    /// Errors of the session layer raised while the interpreter runs an ex
    /// command keep their message but travel as script errors.
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Script(e) => e,
            DispatchError::Ex(e) => ScriptError::Ex(e),
            DispatchError::Host(e) => ScriptError::Host(e),
            other => ScriptError::User(other.to_string()),
        }
    }
}
