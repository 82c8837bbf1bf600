use core_ex::ExError;
use core_state::HostError;
use thiserror::Error;

/// Every failure the script layer can report. `Display` is the exact Vim
/// message, code included.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    // ---- parse ---------------------------------------------------------------------------------
    #[error("E15: Invalid expression: \"{0}\"")]
    InvalidExpression(String),
    #[error("E110: Missing ')'")]
    MissingParen,
    #[error("E697: Missing end of List ']': {0}")]
    MissingListEnd(String),
    #[error("E723: Missing end of Dictionary '}}': {0}")]
    MissingDictEnd(String),
    #[error("E720: Missing colon in Dictionary: {0}")]
    MissingDictColon(String),
    #[error("E114: Missing quote: {0}")]
    MissingDoubleQuote(String),
    #[error("E115: Missing quote: {0}")]
    MissingSingleQuote(String),
    #[error("E171: Missing :endif")]
    MissingEndif,
    #[error("E580: :endif without :if")]
    EndifWithoutIf,
    #[error("E581: :else without :if")]
    ElseWithoutIf,
    #[error("E582: :elseif without :if")]
    ElseifWithoutIf,
    #[error("E583: multiple :else")]
    MultipleElse,
    #[error("E584: :elseif after :else")]
    ElseifAfterElse,
    #[error("E170: Missing :endwhile")]
    MissingEndwhile,
    #[error("E170: Missing :endfor")]
    MissingEndfor,
    #[error("E588: :endwhile without :while")]
    EndwhileWithoutWhile,
    #[error("E588: :endfor without :for")]
    EndforWithoutFor,
    #[error("E126: Missing :endfunction")]
    MissingEndfunction,
    #[error("E193: :endfunction not inside a function")]
    EndfunctionOutsideFunction,
    #[error("E133: :return not inside a function")]
    ReturnOutsideFunction,
    #[error("E586: :continue without :while or :for")]
    ContinueOutsideLoop,
    #[error("E587: :break without :while or :for")]
    BreakOutsideLoop,
    #[error("E690: Missing \"in\" after :for")]
    MissingIn,
    #[error("E124: Missing '(': {0}")]
    MissingOpenParen(String),
    #[error("E125: Illegal argument: {0}")]
    IllegalArgument(String),
    #[error("E853: Duplicate argument name: {0}")]
    DuplicateArgument(String),
    #[error("E129: Function name required")]
    FunctionNameRequired,
    #[error("E128: Function name must start with a capital or \"s:\": {0}")]
    BadFunctionName(String),
    #[error("E488: Trailing characters: {0}")]
    TrailingCharacters(String),
    #[error("E1169: Expression too recursive: {0}")]
    ExpressionTooRecursive(String),

    // ---- types ---------------------------------------------------------------------------------
    #[error("E714: List required")]
    ListRequired,
    #[error("E715: Dictionary required")]
    DictRequired,
    #[error("E745: Using a List as a Number")]
    ListAsNumber,
    #[error("E728: Using a Dictionary as a Number")]
    DictAsNumber,
    #[error("E703: Using a Funcref as a Number")]
    FuncrefAsNumber,
    #[error("E805: Using a Float as a Number")]
    FloatAsNumber,
    #[error("E730: Using List as a String")]
    ListAsString,
    #[error("E731: Using Dictionary as a String")]
    DictAsString,
    #[error("E729: Using Funcref as a String")]
    FuncrefAsString,
    #[error("E806: Using Float as a String")]
    FloatAsString,
    #[error("E691: Can only compare List with List")]
    CompareList,
    #[error("E735: Can only compare Dictionary with Dictionary")]
    CompareDict,
    #[error("E694: Invalid operation for Funcrefs")]
    FuncrefOperation,
    #[error("E692: Invalid operation for List")]
    ListOperation,
    #[error("E736: Invalid operation for Dictionary")]
    DictOperation,
    #[error("E804: Cannot use '%' with Float")]
    FloatModulo,
    #[error("E726: Stride is zero")]
    StrideZero,
    #[error("E689: Can only index a List, Dictionary or Blob")]
    NotIndexable,
    #[error("E684: list index out of range: {0}")]
    IndexOutOfRange(i64),
    #[error("E716: Key not present in Dictionary: \"{0}\"")]
    KeyNotPresent(String),
    #[error("E687: Less targets than List items")]
    LessTargets,
    #[error("E688: More targets than List items")]
    MoreTargets,
    #[error("E734: Wrong variable type for {0}=")]
    WrongTypeForOperator(String),

    // ---- resolution ----------------------------------------------------------------------------
    #[error("E121: Undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("E108: No such variable: \"{0}\"")]
    NoSuchVariable(String),
    #[error("E461: Illegal variable name: {0}")]
    IllegalVariableName(String),
    #[error("E46: Cannot change read-only variable \"{0}\"")]
    ReadOnlyVariable(String),
    #[error("E117: Unknown function: {0}")]
    UnknownFunction(String),
    #[error("E700: Unknown function: {0}")]
    UnknownFunctionReference(String),
    #[error("E130: Unknown function: {0}")]
    DeleteUnknownFunction(String),
    #[error("E131: Cannot delete function {0}: It is in use")]
    FunctionInUse(String),
    #[error("E122: Function {0} already exists, add ! to replace it")]
    FunctionExists(String),
    #[error("E81: Using <SID> not in a script context")]
    SidOutsideScript,
    #[error("E118: Too many arguments for function: {0}")]
    TooManyArguments(String),
    #[error("E119: Not enough arguments for function: {0}")]
    NotEnoughArguments(String),
    #[error("E725: Calling dict function without Dictionary: {0}")]
    DictFunctionWithoutDict(String),
    #[error("E132: Function call depth is higher than 'maxfuncdepth'")]
    CallDepth,
    #[error("E169: Command too recursive")]
    CommandTooRecursive,
    #[error("E113: Unknown option: {0}")]
    UnknownOption(String),
    #[error("E474: Invalid argument")]
    InvalidArgument,
    #[error("E475: Invalid argument: {0}")]
    InvalidArgumentValue(String),
    #[error("E484: Can't open file {0}")]
    CannotOpenFile(String),

    // ---- runtime -------------------------------------------------------------------------------
    #[error("Interrupted")]
    Interrupted,
    /// Raised by `:echoerr`; the text is shown as is.
    #[error("{0}")]
    User(String),
    #[error(transparent)]
    Ex(#[from] ExError),
    #[error(transparent)]
    Host(#[from] HostError),
}
