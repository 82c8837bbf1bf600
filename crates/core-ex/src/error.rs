use core_state::HostError;
use thiserror::Error;

/// Parse and resolution failures of the ex command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExError {
    #[error("E492: Not an editor command: {0}")]
    NotAnEditorCommand(String),
    #[error("E481: No range allowed")]
    NoRangeAllowed,
    #[error("E471: Argument required")]
    ArgumentRequired,
    #[error("E488: Trailing characters: {0}")]
    TrailingCharacters(String),
    #[error("E477: No ! allowed")]
    NoBangAllowed,
    #[error("E16: Invalid range")]
    InvalidRange,
    #[error("E14: Invalid address")]
    InvalidAddress,
    #[error("E20: Mark not set")]
    MarkNotSet,
    #[error("E486: Pattern not found: {0}")]
    PatternNotFound(String),
    #[error("E35: No previous regular expression")]
    NoPreviousPattern,
    #[error("E464: Ambiguous use of user-defined command: {0}")]
    Ambiguous(String),
    #[error("E174: Command already exists: add ! to replace it: {0}")]
    CommandExists(String),
    #[error(transparent)]
    Host(#[from] HostError),
}
