//! Parsed Vim script. Nodes are immutable once built; function bodies are
//! shared through `Rc` between the defining statement and the function table.

use std::fmt;
use std::rc::Rc;

use core_ex::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Script,
    Local,
    Argument,
    Vim,
    Buffer,
    Window,
    Tab,
}

impl Scope {
    pub fn from_prefix(c: char) -> Option<Self> {
        Some(match c {
            'g' => Scope::Global,
            's' => Scope::Script,
            'l' => Scope::Local,
            'a' => Scope::Argument,
            'v' => Scope::Vim,
            'b' => Scope::Buffer,
            'w' => Scope::Window,
            't' => Scope::Tab,
            _ => return None,
        })
    }

    pub fn prefix(self) -> char {
        match self {
            Scope::Global => 'g',
            Scope::Script => 's',
            Scope::Local => 'l',
            Scope::Argument => 'a',
            Scope::Vim => 'v',
            Scope::Buffer => 'b',
            Scope::Window => 'w',
            Scope::Tab => 't',
        }
    }
}

/// Possibly scoped identifier (`g:x`, `s:Func`, `count`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarName {
    pub scope: Option<Scope>,
    pub name: String,
}

impl VarName {
    pub fn new(scope: Option<Scope>, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    /// Split `s:name` style text.
    pub fn parse(text: &str) -> Self {
        let mut chars = text.chars();
        if let (Some(c), Some(':')) = (chars.next(), chars.next())
            && let Some(scope) = Scope::from_prefix(c)
            && text.len() > 2
        {
            return Self::new(Some(scope), &text[2..]);
        }
        if let Some(rest) = text.strip_prefix("<SID>") {
            return Self::new(Some(Scope::Script), rest);
        }
        Self::new(None, text)
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Some(s) => write!(f, "{}:{}", s.prefix(), self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Match,
    NoMatch,
    Is,
    IsNot,
}

/// Case handling of a comparison: `==` follows 'ignorecase', `==#` matches
/// case, `==?` ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMode {
    Option,
    Match,
    Ignore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Named(VarName),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaDef {
    pub params: Vec<String>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Var(VarName),
    Option(String),
    Register(char),
    Env(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        case: CaseMode,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    /// `base.key`: member access on a Dictionary, concatenation otherwise.
    Dot(Box<Expr>, String),
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
    /// `base->name(args)`: `base` becomes the first argument.
    Method {
        base: Box<Expr>,
        callee: Callee,
        args: Vec<Expr>,
    },
    Lambda(Rc<LambdaDef>),
}

impl Expr {
    /// Whether the expression can be assigned to.
    pub fn is_lvalue(&self) -> bool {
        match self {
            Expr::Var(_) | Expr::Option(_) | Expr::Register(_) | Expr::Env(_) => true,
            Expr::Index(base, _) | Expr::Slice(base, _, _) | Expr::Dot(base, _) => base.is_lvalue(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "",
            AssignOp::Add => "+",
            AssignOp::Sub => "-",
            AssignOp::Mul => "*",
            AssignOp::Div => "/",
            AssignOp::Mod => "%",
            AssignOp::Concat => ".",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LetTarget {
    Single(Expr),
    /// `[a, b; rest]`
    Unpack { items: Vec<Expr>, rest: Option<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoKind {
    Echo,
    Echon,
    Echomsg,
    Echoerr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub default: Option<String>,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct FunctionFlags: u8 {
        const RANGE   = 0b0001;
        const ABORT   = 0b0010;
        const DICT    = 0b0100;
        const CLOSURE = 0b1000;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionName {
    Named(VarName),
    /// `function dict.key()`: stored as a numbered function in `dict`.
    Member(Expr, String),
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionName::Named(v) => write!(f, "{v}"),
            FunctionName::Member(_, key) => write!(f, "<dict>.{key}"),
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    pub name: FunctionName,
    pub params: Vec<Param>,
    pub varargs: bool,
    pub flags: FunctionFlags,
    pub body: Vec<Statement>,
    /// Parsed default-value expressions, aligned with `params`.
    pub defaults: Vec<Option<Expr>>,
}

impl FunctionDef {
    pub fn required_params(&self) -> usize {
        self.defaults.iter().take_while(|d| d.is_none()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `:let` without arguments lists variables.
    LetList,
    Let {
        target: LetTarget,
        op: AssignOp,
        value: Expr,
    },
    Unlet {
        targets: Vec<Expr>,
        bang: bool,
    },
    If {
        branches: Vec<(Expr, Vec<Statement>)>,
        otherwise: Option<Vec<Statement>>,
    },
    While {
        condition: Expr,
        body: Vec<Statement>,
    },
    For {
        target: LetTarget,
        iterable: Expr,
        body: Vec<Statement>,
    },
    Function {
        def: Rc<FunctionDef>,
        bang: bool,
    },
    /// `:function` / `:function Name` listing.
    FunctionList(Option<String>),
    Return(Option<Expr>),
    Break,
    Continue,
    Delfunction {
        name: VarName,
        bang: bool,
    },
    Call {
        range: Option<Range>,
        call: Expr,
    },
    Echo {
        kind: EchoKind,
        args: Vec<Expr>,
    },
    Execute(Vec<Expr>),
    /// Any other ex command, run by the host.
    Ex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// One-based source line.
    pub line: usize,
    pub kind: StatementKind,
}
