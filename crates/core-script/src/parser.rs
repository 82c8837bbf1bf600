//! Script parser.
//!
//! Source text goes through three stages: continuation lines are joined and
//! `|` separators split (both in `core-ex`), each command becomes an [`Item`],
//! and a block builder folds `if`/`while`/`for`/`function` items into nested
//! statements. Expressions are parsed by recursive descent over lexer tokens.

use std::rc::Rc;

use core_ex::{
    ArgumentFlag, ExError, builtin_spec, is_comment_or_empty, join_continuation_lines, split_bars,
    split_command,
};
use tracing::trace;

use crate::ScriptError;
use crate::ast::{
    AssignOp, BinaryOp, Callee, CaseMode, CompareOp, EchoKind, Expr, FunctionDef, FunctionFlags,
    FunctionName, LambdaDef, LetTarget, Param, Scope, Statement, StatementKind, UnaryOp, VarName,
};
use crate::lexer::{Tok, Token, tokenize};

/// Where a fragment is parsed. `:execute` inside a function or loop may
/// contain `:return` or `:break`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseContext {
    pub in_function: bool,
    pub in_loop: bool,
}

pub fn parse_script(src: &str) -> Result<Vec<Statement>, ScriptError> {
    parse_script_in(src, ParseContext::default())
}

pub fn parse_script_in(src: &str, ctx: ParseContext) -> Result<Vec<Statement>, ScriptError> {
    let mut builder = BlockBuilder::new(ctx);
    for (line, text) in join_continuation_lines(src) {
        if is_comment_or_empty(&text) {
            continue;
        }
        for segment in split_bars(&text) {
            if is_comment_or_empty(&segment) {
                continue;
            }
            let item = parse_item(&segment)?;
            builder.push(line, item)?;
        }
    }
    let statements = builder.finish()?;
    trace!(target: "script.parse", statements = statements.len(), "script_parsed");
    Ok(statements)
}

// ------------------------------------------------------------------------------------------------
// Items
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
struct FunctionHeader {
    name: FunctionName,
    params: Vec<Param>,
    defaults: Vec<Option<Expr>>,
    varargs: bool,
    flags: FunctionFlags,
}

#[derive(Debug)]
enum Item {
    Stmt(StatementKind),
    If(Expr),
    ElseIf(Expr),
    Else,
    EndIf,
    While(Expr),
    EndWhile,
    For(LetTarget, Expr),
    EndFor,
    Function(Box<FunctionHeader>, bool),
    EndFunction,
}

fn parse_item(segment: &str) -> Result<Item, ScriptError> {
    let parts = split_command(segment)?;
    let spec = builtin_spec(parts.name);
    let canonical = spec.map(|s| s.name.as_str());
    // Only `:call` takes a range among script statements.
    if parts.range.is_some() && canonical != Some("call") {
        return Ok(Item::Stmt(StatementKind::Ex(segment.to_string())));
    }
    let arg = parts.argument.trim();
    if let Some(spec) = spec
        && is_statement(&spec.name)
    {
        if parts.bang && !spec.bang {
            return Err(ExError::NoBangAllowed.into());
        }
        if spec.argument == ArgumentFlag::Required && arg.is_empty() {
            return Err(ExError::ArgumentRequired.into());
        }
    }
    let no_argument = |item: Item| {
        if arg.is_empty() || arg.starts_with('"') {
            Ok(item)
        } else {
            Err(ScriptError::TrailingCharacters(arg.to_string()))
        }
    };
    let item = match canonical {
        Some("let") if arg.is_empty() => Item::Stmt(StatementKind::LetList),
        Some("let") => Item::Stmt(parse_let(arg)?),
        Some("unlet") => {
            let targets = arg
                .split_whitespace()
                .map(|t| {
                    let e = parse_expression(t)?;
                    if e.is_lvalue() {
                        Ok(e)
                    } else {
                        Err(ScriptError::IllegalVariableName(t.to_string()))
                    }
                })
                .collect::<Result<_, _>>()?;
            Item::Stmt(StatementKind::Unlet {
                targets,
                bang: parts.bang,
            })
        }
        Some("if") => Item::If(parse_expression(arg)?),
        Some("elseif") => Item::ElseIf(parse_expression(arg)?),
        Some("else") => no_argument(Item::Else)?,
        Some("endif") => no_argument(Item::EndIf)?,
        Some("while") => Item::While(parse_expression(arg)?),
        Some("endwhile") => no_argument(Item::EndWhile)?,
        Some("for") => {
            let (target, iterable) = parse_for(arg)?;
            Item::For(target, iterable)
        }
        Some("endfor") => no_argument(Item::EndFor)?,
        Some("function") => {
            if arg.is_empty() {
                Item::Stmt(StatementKind::FunctionList(None))
            } else if !arg.contains('(') {
                Item::Stmt(StatementKind::FunctionList(Some(arg.to_string())))
            } else {
                Item::Function(Box::new(parse_function_header(arg)?), parts.bang)
            }
        }
        Some("endfunction") => no_argument(Item::EndFunction)?,
        Some("return") if arg.is_empty() => Item::Stmt(StatementKind::Return(None)),
        Some("return") => Item::Stmt(StatementKind::Return(Some(parse_expression(arg)?))),
        Some("break") => no_argument(Item::Stmt(StatementKind::Break))?,
        Some("continue") => no_argument(Item::Stmt(StatementKind::Continue))?,
        Some("delfunction") => {
            let name = arg.strip_suffix("()").unwrap_or(arg);
            Item::Stmt(StatementKind::Delfunction {
                name: VarName::parse(name),
                bang: parts.bang,
            })
        }
        Some("call") => {
            let call = parse_expression(arg)?;
            if !matches!(call, Expr::Call { .. } | Expr::Method { .. }) {
                return Err(ScriptError::FunctionNameRequired);
            }
            Item::Stmt(StatementKind::Call {
                range: parts.range,
                call,
            })
        }
        Some(echo @ ("echo" | "echon" | "echomsg" | "echoerr")) => {
            let kind = match echo {
                "echo" => EchoKind::Echo,
                "echon" => EchoKind::Echon,
                "echomsg" => EchoKind::Echomsg,
                _ => EchoKind::Echoerr,
            };
            Item::Stmt(StatementKind::Echo {
                kind,
                args: parse_expression_list(arg)?,
            })
        }
        Some("execute") => Item::Stmt(StatementKind::Execute(parse_expression_list(arg)?)),
        _ => Item::Stmt(StatementKind::Ex(segment.to_string())),
    };
    Ok(item)
}

/// Commands the interpreter parses itself instead of passing them to the ex
/// layer.
fn is_statement(name: &str) -> bool {
    matches!(
        name,
        "let"
            | "unlet"
            | "if"
            | "elseif"
            | "else"
            | "endif"
            | "while"
            | "endwhile"
            | "for"
            | "endfor"
            | "function"
            | "endfunction"
            | "return"
            | "break"
            | "continue"
            | "delfunction"
            | "call"
            | "echo"
            | "echon"
            | "echomsg"
            | "echoerr"
            | "execute"
    )
}

fn parse_let(arg: &str) -> Result<StatementKind, ScriptError> {
    let mut p = ExprParser::new(arg)?;
    let target = p.let_target()?;
    let op = match p.next_tok() {
        Some(Tok::Op("=")) => AssignOp::Set,
        Some(Tok::Op("+=")) => AssignOp::Add,
        Some(Tok::Op("-=")) => AssignOp::Sub,
        Some(Tok::Op("*=")) => AssignOp::Mul,
        Some(Tok::Op("/=")) => AssignOp::Div,
        Some(Tok::Op("%=")) => AssignOp::Mod,
        Some(Tok::Op(".=" | "..=")) => AssignOp::Concat,
        _ => return Err(ScriptError::InvalidExpression(arg.to_string())),
    };
    if let LetTarget::Unpack { .. } = target
        && op != AssignOp::Set
        && op != AssignOp::Add
        && op != AssignOp::Sub
        && op != AssignOp::Concat
    {
        return Err(ScriptError::InvalidExpression(arg.to_string()));
    }
    p.start_expression();
    let value = p.expr1()?;
    p.finish()?;
    Ok(StatementKind::Let { target, op, value })
}

fn parse_for(arg: &str) -> Result<(LetTarget, Expr), ScriptError> {
    let mut p = ExprParser::new(arg)?;
    let target = p.let_target()?;
    match p.next_tok() {
        Some(Tok::Ident(kw)) if kw == "in" => {}
        _ => return Err(ScriptError::MissingIn),
    }
    p.start_expression();
    let iterable = p.expr1()?;
    p.finish()?;
    Ok((target, iterable))
}

fn parse_function_header(arg: &str) -> Result<FunctionHeader, ScriptError> {
    let open = arg
        .find('(')
        .ok_or_else(|| ScriptError::MissingOpenParen(arg.to_string()))?;
    let raw_name = arg[..open].trim();
    if raw_name.is_empty() {
        return Err(ScriptError::FunctionNameRequired);
    }
    let name = parse_function_name(raw_name)?;
    let close = matching_paren(arg, open).ok_or(ScriptError::MissingParen)?;

    let mut params: Vec<Param> = Vec::new();
    let mut defaults = Vec::new();
    let mut varargs = false;
    for piece in split_top_level(&arg[open + 1..close]) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if varargs {
            return Err(ScriptError::IllegalArgument(piece.to_string()));
        }
        if piece == "..." {
            varargs = true;
            continue;
        }
        let (pname, default) = match piece.split_once('=') {
            Some((n, d)) => (n.trim(), Some(d.trim())),
            None => (piece, None),
        };
        let valid = pname
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && pname.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid || pname == "firstline" || pname == "lastline" {
            return Err(ScriptError::IllegalArgument(pname.to_string()));
        }
        if params.iter().any(|p| p.name == pname) {
            return Err(ScriptError::DuplicateArgument(pname.to_string()));
        }
        // A parameter without a default may not follow one with a default.
        if default.is_none() && defaults.iter().any(Option::is_some) {
            return Err(ScriptError::IllegalArgument(pname.to_string()));
        }
        defaults.push(default.map(parse_expression).transpose()?);
        params.push(Param {
            name: pname.to_string(),
            default: default.map(str::to_string),
        });
    }

    let mut flags = FunctionFlags::empty();
    for word in arg[close + 1..].split_whitespace() {
        if word.starts_with('"') {
            break;
        }
        flags |= match word {
            "range" => FunctionFlags::RANGE,
            "abort" => FunctionFlags::ABORT,
            "dict" => FunctionFlags::DICT,
            "closure" => FunctionFlags::CLOSURE,
            other => return Err(ScriptError::TrailingCharacters(other.to_string())),
        };
    }
    Ok(FunctionHeader {
        name,
        params,
        defaults,
        varargs,
        flags,
    })
}

fn parse_function_name(raw: &str) -> Result<FunctionName, ScriptError> {
    if let Some((base, key)) = raw.rsplit_once('.') {
        let base = parse_expression(base)?;
        return Ok(FunctionName::Member(base, key.to_string()));
    }
    let name = VarName::parse(raw);
    let ok = match name.scope {
        Some(Scope::Script) => !name.name.is_empty(),
        None | Some(Scope::Global) => {
            name.name.starts_with(|c: char| c.is_ascii_uppercase()) || name.name.contains('#')
        }
        _ => false,
    };
    if !ok {
        return Err(ScriptError::BadFunctionName(raw.to_string()));
    }
    Ok(FunctionName::Named(name))
}

fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote = None;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

// ------------------------------------------------------------------------------------------------
// Block builder
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
enum Block {
    Root,
    If {
        branches: Vec<(Expr, Vec<Statement>)>,
        /// Condition of the branch being collected; `None` once in `else`.
        current: Option<Expr>,
    },
    While(Expr),
    For(LetTarget, Expr),
    Function(Box<FunctionHeader>, bool),
}

#[derive(Debug)]
struct Open {
    line: usize,
    block: Block,
    body: Vec<Statement>,
}

struct BlockBuilder {
    ctx: ParseContext,
    stack: Vec<Open>,
}

impl BlockBuilder {
    fn new(ctx: ParseContext) -> Self {
        Self {
            ctx,
            stack: vec![Open {
                line: 0,
                block: Block::Root,
                body: Vec::new(),
            }],
        }
    }

    fn in_function(&self) -> bool {
        self.ctx.in_function
            || self
                .stack
                .iter()
                .any(|o| matches!(o.block, Block::Function(..)))
    }

    fn in_loop(&self) -> bool {
        for open in self.stack.iter().rev() {
            match open.block {
                Block::While(_) | Block::For(..) => return true,
                Block::Function(..) => return false,
                _ => {}
            }
        }
        self.ctx.in_loop
    }

    fn open(&mut self, line: usize, block: Block) {
        self.stack.push(Open {
            line,
            block,
            body: Vec::new(),
        });
    }

    fn emit(&mut self, line: usize, kind: StatementKind) {
        if let Some(top) = self.stack.last_mut() {
            top.body.push(Statement { line, kind });
        }
    }

    fn top_block(&mut self) -> Option<&mut Open> {
        self.stack.last_mut().filter(|o| !matches!(o.block, Block::Root))
    }

    fn push(&mut self, line: usize, item: Item) -> Result<(), ScriptError> {
        match item {
            Item::Stmt(kind) => {
                match kind {
                    StatementKind::Return(_) if !self.in_function() => {
                        return Err(ScriptError::ReturnOutsideFunction);
                    }
                    StatementKind::Break if !self.in_loop() => {
                        return Err(ScriptError::BreakOutsideLoop);
                    }
                    StatementKind::Continue if !self.in_loop() => {
                        return Err(ScriptError::ContinueOutsideLoop);
                    }
                    _ => {}
                }
                self.emit(line, kind);
            }
            Item::If(cond) => self.open(
                line,
                Block::If {
                    branches: Vec::new(),
                    current: Some(cond),
                },
            ),
            Item::ElseIf(cond) => {
                let Some(Open {
                    block: Block::If { branches, current },
                    body,
                    ..
                }) = self.top_block()
                else {
                    return Err(ScriptError::ElseifWithoutIf);
                };
                let Some(prev) = current.take() else {
                    return Err(ScriptError::ElseifAfterElse);
                };
                branches.push((prev, std::mem::take(body)));
                *current = Some(cond);
            }
            Item::Else => {
                let Some(Open {
                    block: Block::If { branches, current },
                    body,
                    ..
                }) = self.top_block()
                else {
                    return Err(ScriptError::ElseWithoutIf);
                };
                let Some(prev) = current.take() else {
                    return Err(ScriptError::MultipleElse);
                };
                branches.push((prev, std::mem::take(body)));
            }
            Item::EndIf => {
                if !matches!(self.top_block(), Some(Open { block: Block::If { .. }, .. })) {
                    return Err(ScriptError::EndifWithoutIf);
                }
                self.close()?;
            }
            Item::While(cond) => self.open(line, Block::While(cond)),
            Item::EndWhile => {
                if !matches!(self.top_block(), Some(Open { block: Block::While(_), .. })) {
                    return Err(ScriptError::EndwhileWithoutWhile);
                }
                self.close()?;
            }
            Item::For(target, iterable) => self.open(line, Block::For(target, iterable)),
            Item::EndFor => {
                if !matches!(self.top_block(), Some(Open { block: Block::For(..), .. })) {
                    return Err(ScriptError::EndforWithoutFor);
                }
                self.close()?;
            }
            Item::Function(header, bang) => self.open(line, Block::Function(header, bang)),
            Item::EndFunction => {
                match self.top_block() {
                    Some(Open { block: Block::Function(..), .. }) => {}
                    Some(Open { block, .. }) => return Err(unclosed(block)),
                    None => return Err(ScriptError::EndfunctionOutsideFunction),
                }
                self.close()?;
            }
        }
        Ok(())
    }

    /// Pop the innermost block and emit it as a statement into its parent.
    fn close(&mut self) -> Result<(), ScriptError> {
        let Some(Open { line, block, body }) = self.stack.pop() else {
            return Err(ScriptError::EndfunctionOutsideFunction);
        };
        let kind = match block {
            Block::Root => return Err(ScriptError::EndfunctionOutsideFunction),
            Block::If {
                mut branches,
                current,
            } => {
                let otherwise = match current {
                    Some(cond) => {
                        branches.push((cond, body));
                        None
                    }
                    None => Some(body),
                };
                StatementKind::If {
                    branches,
                    otherwise,
                }
            }
            Block::While(condition) => StatementKind::While { condition, body },
            Block::For(target, iterable) => StatementKind::For {
                target,
                iterable,
                body,
            },
            Block::Function(header, bang) => {
                let FunctionHeader {
                    name,
                    params,
                    defaults,
                    varargs,
                    flags,
                } = *header;
                StatementKind::Function {
                    def: Rc::new(FunctionDef {
                        name,
                        params,
                        varargs,
                        flags,
                        body,
                        defaults,
                    }),
                    bang,
                }
            }
        };
        self.emit(line, kind);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Statement>, ScriptError> {
        if let Some(open) = self.top_block() {
            return Err(unclosed(&open.block));
        }
        Ok(self.stack.pop().map(|o| o.body).unwrap_or_default())
    }
}

fn unclosed(block: &Block) -> ScriptError {
    match block {
        Block::If { .. } => ScriptError::MissingEndif,
        Block::While(_) => ScriptError::MissingEndwhile,
        Block::For(..) => ScriptError::MissingEndfor,
        Block::Function(..) | Block::Root => ScriptError::MissingEndfunction,
    }
}

// ------------------------------------------------------------------------------------------------
// Expressions
// ------------------------------------------------------------------------------------------------

pub fn parse_expression(src: &str) -> Result<Expr, ScriptError> {
    let mut p = ExprParser::new(src)?;
    let expr = p.expr1()?;
    p.finish()?;
    Ok(expr)
}

/// Whitespace-separated expressions, as taken by `:echo` and `:execute`.
pub fn parse_expression_list(src: &str) -> Result<Vec<Expr>, ScriptError> {
    let mut p = ExprParser::new(src)?;
    let mut out = Vec::new();
    while !p.at_end() {
        out.push(p.expr1()?);
    }
    Ok(out)
}

/// Deepest expression tree the parser builds. Parsing and evaluation both
/// recurse once per level; operator chains count one level per operand.
const MAX_EXPR_DEPTH: usize = 100;

struct ExprParser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Byte offset where the reported expression text starts.
    start: usize,
}

impl<'a> ExprParser<'a> {
    fn new(src: &'a str) -> Result<Self, ScriptError> {
        Ok(Self {
            src,
            toks: tokenize(src)?,
            pos: 0,
            depth: 0,
            start: 0,
        })
    }

    fn descend(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            return Err(ScriptError::ExpressionTooRecursive(self.rest()));
        }
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos)
    }

    fn peek_tok(&self) -> Option<&Tok> {
        self.peek().map(|t| &t.tok)
    }

    fn peek_op(&self, op: &str) -> bool {
        matches!(self.peek_tok(), Some(Tok::Op(o)) if *o == op)
    }

    /// `op` directly after the previous token (no whitespace).
    fn peek_glued_op(&self, op: &str) -> bool {
        self.peek()
            .is_some_and(|t| !t.space_before && matches!(t.tok, Tok::Op(o) if o == op))
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn next_tok(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).map(|t| t.tok.clone());
        self.pos += 1;
        t
    }

    fn invalid(&self) -> ScriptError {
        ScriptError::InvalidExpression(self.src[self.start..].trim().to_string())
    }

    /// Errors from here on quote the text from the next token onwards.
    fn start_expression(&mut self) {
        self.start = self.peek().map_or(self.src.len(), |t| t.offset);
    }

    fn rest(&self) -> String {
        self.peek()
            .map(|t| self.src[t.offset..].trim().to_string())
            .unwrap_or_default()
    }

    fn finish(&self) -> Result<(), ScriptError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(ScriptError::TrailingCharacters(self.rest()))
        }
    }

    fn let_target(&mut self) -> Result<LetTarget, ScriptError> {
        if !self.eat_op("[") {
            let target = self.postfix()?;
            if !target.is_lvalue() {
                return Err(ScriptError::IllegalVariableName(self.src.trim().to_string()));
            }
            return Ok(LetTarget::Single(target));
        }
        let mut items = Vec::new();
        let mut rest = None;
        loop {
            if self.eat_op("]") {
                break;
            }
            let item = self.postfix()?;
            if !item.is_lvalue() {
                return Err(ScriptError::IllegalVariableName(self.src.trim().to_string()));
            }
            if self.eat_op(";") {
                rest = Some(self.postfix()?);
                if !self.eat_op("]") {
                    return Err(ScriptError::MissingListEnd(self.rest()));
                }
                items.push(item);
                break;
            }
            items.push(item);
            if !self.eat_op(",") && !self.peek_op("]") {
                return Err(ScriptError::MissingListEnd(self.rest()));
            }
        }
        Ok(LetTarget::Unpack { items, rest })
    }

    /// `cond ? a : b`
    fn expr1(&mut self) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        self.descend()?;
        let expr = self.ternary();
        self.depth = depth;
        expr
    }

    fn ternary(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.expr2()?;
        if !self.eat_op("?") {
            return Ok(cond);
        }
        let then = self.expr1()?;
        if !self.eat_op(":") {
            return Err(self.invalid());
        }
        let otherwise = self.expr1()?;
        Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    /// `||`
    fn expr2(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.expr3()?;
        while self.eat_op("||") {
            self.descend()?;
            let rhs = self.expr3()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// `&&`
    fn expr3(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.expr4()?;
        while self.eat_op("&&") {
            self.descend()?;
            let rhs = self.expr4()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// Comparisons; not associative.
    fn expr4(&mut self) -> Result<Expr, ScriptError> {
        let lhs = self.expr5()?;
        let Some((op, case)) = self.peek_tok().and_then(compare_op) else {
            return Ok(lhs);
        };
        self.pos += 1;
        let rhs = self.expr5()?;
        Ok(Expr::Compare {
            op,
            case,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// `+ - . ..`
    fn expr5(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.expr6()?;
        loop {
            let op = match self.peek_tok() {
                Some(Tok::Op("+")) => BinaryOp::Add,
                Some(Tok::Op("-")) => BinaryOp::Sub,
                Some(Tok::Op("." | "..")) => BinaryOp::Concat,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.expr6()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// `* / %`
    fn expr6(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.expr7()?;
        loop {
            let op = match self.peek_tok() {
                Some(Tok::Op("*")) => BinaryOp::Mul,
                Some(Tok::Op("/")) => BinaryOp::Div,
                Some(Tok::Op("%")) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.expr7()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// Unary `! - +`
    fn expr7(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek_tok() {
            Some(Tok::Op("!")) => UnaryOp::Not,
            Some(Tok::Op("-")) => UnaryOp::Neg,
            Some(Tok::Op("+")) => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.pos += 1;
        let depth = self.depth;
        self.descend()?;
        let operand = self.expr7();
        self.depth = depth;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    /// Subscripts, slices, calls, member access and `->` methods.
    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut base = self.primary()?;
        loop {
            if self.peek_glued_op("[") || self.peek_glued_op("(") || self.peek_op("->") {
                self.descend()?;
            }
            if self.peek_glued_op("[") {
                self.pos += 1;
                base = self.subscript(base)?;
            } else if self.peek_glued_op("(") {
                self.pos += 1;
                let args = self.arguments()?;
                let callee = match base {
                    Expr::Var(name) => Callee::Named(name),
                    other => Callee::Expr(Box::new(other)),
                };
                base = Expr::Call { callee, args };
            } else if self.peek_glued_op(".")
                && let Some(Token {
                    tok: Tok::Ident(key),
                    space_before: false,
                    ..
                }) = self.toks.get(self.pos + 1)
            {
                base = Expr::Dot(Box::new(base), key.clone());
                self.pos += 2;
            } else if self.eat_op("->") {
                let callee = match self.next_tok() {
                    Some(Tok::Ident(name)) => Callee::Named(VarName::parse(&name)),
                    _ => return Err(self.invalid()),
                };
                if !self.eat_op("(") {
                    return Err(ScriptError::MissingOpenParen(self.rest()));
                }
                let args = self.arguments()?;
                base = Expr::Method {
                    base: Box::new(base),
                    callee,
                    args,
                };
            } else {
                return Ok(base);
            }
        }
    }

    fn subscript(&mut self, base: Expr) -> Result<Expr, ScriptError> {
        let base = Box::new(base);
        if self.eat_op(":") {
            let end = if self.peek_op("]") { None } else { Some(Box::new(self.expr1()?)) };
            self.expect_close_bracket()?;
            return Ok(Expr::Slice(base, None, end));
        }
        let first = self.expr1()?;
        if self.eat_op(":") {
            let end = if self.peek_op("]") { None } else { Some(Box::new(self.expr1()?)) };
            self.expect_close_bracket()?;
            return Ok(Expr::Slice(base, Some(Box::new(first)), end));
        }
        self.expect_close_bracket()?;
        Ok(Expr::Index(base, Box::new(first)))
    }

    fn expect_close_bracket(&mut self) -> Result<(), ScriptError> {
        if self.eat_op("]") {
            Ok(())
        } else {
            Err(ScriptError::MissingListEnd(self.rest()))
        }
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        let mut args = Vec::new();
        if self.eat_op(")") {
            return Ok(args);
        }
        loop {
            args.push(self.expr1()?);
            if self.eat_op(")") {
                return Ok(args);
            }
            if !self.eat_op(",") {
                return Err(ScriptError::MissingParen);
            }
            // Trailing comma.
            if self.eat_op(")") {
                return Ok(args);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let Some(tok) = self.next_tok() else {
            return Err(self.invalid());
        };
        Ok(match tok {
            Tok::Number(n) => Expr::Number(n),
            Tok::Float(f) => Expr::Float(f),
            Tok::Str(s) => Expr::Str(s),
            Tok::Ident(name) => Expr::Var(VarName::parse(&name)),
            Tok::Option(name) => Expr::Option(name),
            Tok::Register(r) => Expr::Register(r),
            Tok::Env(name) => Expr::Env(name),
            Tok::Op("(") => {
                let inner = self.expr1()?;
                if !self.eat_op(")") {
                    return Err(ScriptError::MissingParen);
                }
                inner
            }
            Tok::Op("[") => {
                let mut items = Vec::new();
                while !self.eat_op("]") {
                    if self.at_end() {
                        return Err(ScriptError::MissingListEnd(self.src.trim().to_string()));
                    }
                    items.push(self.expr1()?);
                    if !self.eat_op(",") && !self.peek_op("]") {
                        return Err(ScriptError::MissingListEnd(self.rest()));
                    }
                }
                Expr::List(items)
            }
            Tok::Op("#{") => self.dict(true)?,
            Tok::Op("{") if self.is_lambda() => self.lambda()?,
            Tok::Op("{") => self.dict(false)?,
            _ => return Err(self.invalid()),
        })
    }

    /// After `{`: `ident, ident ->` or `->` means a lambda.
    fn is_lambda(&self) -> bool {
        let mut i = self.pos;
        loop {
            match self.toks.get(i).map(|t| &t.tok) {
                Some(Tok::Op("->")) => return true,
                Some(Tok::Ident(_)) => match self.toks.get(i + 1).map(|t| &t.tok) {
                    Some(Tok::Op(",")) => i += 2,
                    Some(Tok::Op("->")) => return true,
                    _ => return false,
                },
                _ => return false,
            }
        }
    }

    fn lambda(&mut self) -> Result<Expr, ScriptError> {
        let mut params = Vec::new();
        while let Some(Tok::Ident(name)) = self.peek_tok() {
            params.push(name.clone());
            self.pos += 1;
            self.eat_op(",");
        }
        if !self.eat_op("->") {
            return Err(self.invalid());
        }
        let body = self.expr1()?;
        if !self.eat_op("}") {
            return Err(self.invalid());
        }
        Ok(Expr::Lambda(Rc::new(LambdaDef { params, body })))
    }

    /// Dictionary literal after `{` (or `#{` with `literal_keys`).
    fn dict(&mut self, literal_keys: bool) -> Result<Expr, ScriptError> {
        let mut entries = Vec::new();
        while !self.eat_op("}") {
            if self.at_end() {
                return Err(ScriptError::MissingDictEnd(self.src.trim().to_string()));
            }
            let key = if literal_keys {
                match self.next_tok() {
                    Some(Tok::Ident(k)) => Expr::Str(k),
                    Some(Tok::Number(n)) => Expr::Str(n.to_string()),
                    Some(Tok::Str(s)) => Expr::Str(s),
                    _ => return Err(self.invalid()),
                }
            } else {
                self.expr1()?
            };
            if !self.eat_op(":") {
                return Err(ScriptError::MissingDictColon(self.rest()));
            }
            let value = self.expr1()?;
            entries.push((key, value));
            if !self.eat_op(",") && !self.peek_op("}") {
                return Err(ScriptError::MissingDictEnd(self.rest()));
            }
        }
        Ok(Expr::Dict(entries))
    }
}

fn compare_op(tok: &Tok) -> Option<(CompareOp, CaseMode)> {
    let text: &str = match tok {
        Tok::Op(o) => *o,
        Tok::Ident(i) if i.starts_with("is") => i.as_str(),
        _ => return None,
    };
    let (base, case) = match text.as_bytes().last() {
        Some(b'#') => (&text[..text.len() - 1], CaseMode::Match),
        Some(b'?') => (&text[..text.len() - 1], CaseMode::Ignore),
        _ => (text, CaseMode::Option),
    };
    let op = match base {
        "==" => CompareOp::Eq,
        "!=" => CompareOp::Ne,
        ">" => CompareOp::Gt,
        ">=" => CompareOp::Ge,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::Le,
        "=~" => CompareOp::Match,
        "!~" => CompareOp::NoMatch,
        "is" => CompareOp::Is,
        "isnot" => CompareOp::IsNot,
        _ => return None,
    };
    Some((op, case))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Expr {
        Expr::Var(VarName::parse(name))
    }

    fn num(n: i64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(
            parse_expression("1 + 2 * 3").unwrap(),
            Expr::Binary(
                BinaryOp::Add,
                num(1),
                Box::new(Expr::Binary(BinaryOp::Mul, num(2), num(3)))
            )
        );
        assert_eq!(
            parse_expression("-x[0]").unwrap(),
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Index(Box::new(var("x")), num(0)))
            )
        );
    }

    #[test]
    fn comparisons_with_case_suffix() {
        let e = parse_expression("a ==? 'B' && b isnot c").unwrap();
        let Expr::Binary(BinaryOp::And, lhs, rhs) = e else {
            panic!("expected &&");
        };
        assert!(matches!(
            *lhs,
            Expr::Compare {
                op: CompareOp::Eq,
                case: CaseMode::Ignore,
                ..
            }
        ));
        assert!(matches!(
            *rhs,
            Expr::Compare {
                op: CompareOp::IsNot,
                case: CaseMode::Option,
                ..
            }
        ));
    }

    #[test]
    fn member_access_versus_concatenation() {
        assert_eq!(
            parse_expression("d.key").unwrap(),
            Expr::Dot(Box::new(var("d")), "key".into())
        );
        assert_eq!(
            parse_expression("a . b").unwrap(),
            Expr::Binary(BinaryOp::Concat, Box::new(var("a")), Box::new(var("b")))
        );
    }

    #[test]
    fn lambdas_dicts_and_methods() {
        assert!(matches!(parse_expression("{x, y -> x + y}").unwrap(), Expr::Lambda(_)));
        assert!(matches!(parse_expression("{'a': 1, 'b': 2}").unwrap(), Expr::Dict(ref e) if e.len() == 2));
        assert!(matches!(parse_expression("#{one: 1}").unwrap(), Expr::Dict(_)));
        assert!(matches!(
            parse_expression("[1, 2]->len()").unwrap(),
            Expr::Method { .. }
        ));
        assert!(matches!(parse_expression("l[1:]").unwrap(), Expr::Slice(_, Some(_), None)));
    }

    #[test]
    fn expression_errors() {
        assert_eq!(
            parse_expression("1 +").unwrap_err().to_string(),
            "E15: Invalid expression: \"1 +\""
        );
        assert_eq!(parse_expression("(1").unwrap_err().to_string(), "E110: Missing ')'");
        assert!(matches!(parse_expression("[1, 2"), Err(ScriptError::MissingListEnd(_))));
        assert!(matches!(parse_expression("{'a' 1}"), Err(ScriptError::MissingDictColon(_))));
    }

    #[test]
    fn blocks_nest() {
        let src = "\
let i = 0
while i < 3
  if i == 1
    let i += 1
    continue
  elseif i == 2
    break
  else
    echo i
  endif
  let i += 1
endwhile";
        let stmts = parse_script(src).unwrap();
        assert_eq!(stmts.len(), 2);
        let StatementKind::While { body, .. } = &stmts[1].kind else {
            panic!("expected while");
        };
        assert_eq!(body.len(), 2);
        let StatementKind::If { branches, otherwise } = &body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert!(otherwise.is_some());
        assert_eq!(body[0].line, 3);
    }

    #[test]
    fn one_line_function_definition() {
        let stmts = parse_script("function F1() | return 10 | endfunction").unwrap();
        let StatementKind::Function { def, bang } = &stmts[0].kind else {
            panic!("expected function");
        };
        assert!(!bang);
        assert_eq!(def.name, FunctionName::Named(VarName::new(None, "F1")));
        assert_eq!(def.body.len(), 1);
    }

    #[test]
    fn function_header_parts() {
        let src = "function! s:Add(a, b = 2, ...) range abort\nreturn a:a + a:b\nendfunction";
        let stmts = parse_script(src).unwrap();
        let StatementKind::Function { def, bang } = &stmts[0].kind else {
            panic!("expected function");
        };
        assert!(bang);
        assert!(def.varargs);
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.required_params(), 1);
        assert_eq!(def.flags, FunctionFlags::RANGE | FunctionFlags::ABORT);
        assert_eq!(
            parse_script("function f()\nendfunction").unwrap_err().to_string(),
            "E128: Function name must start with a capital or \"s:\": f"
        );
        assert_eq!(
            parse_script("function F(a, a)\nendfunction").unwrap_err().to_string(),
            "E853: Duplicate argument name: a"
        );
    }

    #[test]
    fn block_mismatches() {
        let err = |src: &str| parse_script(src).unwrap_err().to_string();
        assert_eq!(err("if 1"), "E171: Missing :endif");
        assert_eq!(err("endif"), "E580: :endif without :if");
        assert_eq!(err("else"), "E581: :else without :if");
        assert_eq!(err("elseif 1"), "E582: :elseif without :if");
        assert_eq!(err("if 1\nelse\nelse\nendif"), "E583: multiple :else");
        assert_eq!(err("if 1\nelse\nelseif 2\nendif"), "E584: :elseif after :else");
        assert_eq!(err("while 1"), "E170: Missing :endwhile");
        assert_eq!(err("for x in []"), "E170: Missing :endfor");
        assert_eq!(err("endwhile"), "E588: :endwhile without :while");
        assert_eq!(err("endfor"), "E588: :endfor without :for");
        assert_eq!(err("function F()"), "E126: Missing :endfunction");
        assert_eq!(err("endfunction"), "E193: :endfunction not inside a function");
        assert_eq!(err("return 1"), "E133: :return not inside a function");
        assert_eq!(err("break"), "E587: :break without :while or :for");
        assert_eq!(err("continue"), "E586: :continue without :while or :for");
        assert_eq!(err("for x [1]\nendfor"), "E690: Missing \"in\" after :for");
    }

    #[test]
    fn let_forms() {
        let stmts = parse_script("let [a, b; rest] = [1, 2, 3]\nlet s ..= 'x'\nlet d.k = 1").unwrap();
        assert!(matches!(
            &stmts[0].kind,
            StatementKind::Let { target: LetTarget::Unpack { items, rest: Some(_) }, .. } if items.len() == 2
        ));
        assert!(matches!(
            &stmts[1].kind,
            StatementKind::Let { op: AssignOp::Concat, .. }
        ));
        assert!(matches!(
            &stmts[2].kind,
            StatementKind::Let { target: LetTarget::Single(Expr::Dot(..)), .. }
        ));
    }

    #[test]
    fn other_commands_pass_through() {
        let stmts = parse_script("normal! dd | echo 1\n2,3delete\ncall F(1)").unwrap();
        assert_eq!(stmts[0].kind, StatementKind::Ex("normal! dd | echo 1".into()));
        assert_eq!(stmts[1].kind, StatementKind::Ex("2,3delete".into()));
        assert!(matches!(stmts[2].kind, StatementKind::Call { range: None, .. }));
        assert_eq!(
            parse_script("call x").unwrap_err().to_string(),
            "E129: Function name required"
        );
    }

    #[test]
    fn deep_nesting_is_reported_not_overflowed() {
        // Builds the deepest accepted tree, so give it a fixed stack.
        let handle = std::thread::Builder::new()
            .stack_size(8 << 20)
            .spawn(|| {
                let shallow = format!("{}1{}", "(".repeat(40), ")".repeat(40));
                assert_eq!(parse_expression(&shallow).unwrap(), Expr::Number(1));

                let too_deep = [
                    format!("{}1{}", "(".repeat(5000), ")".repeat(5000)),
                    format!("{}1{}", "[".repeat(5000), "]".repeat(5000)),
                    format!("{}1", "-".repeat(5000)),
                    format!("1{}", " + 1".repeat(5000)),
                    format!("l{}", "[0]".repeat(5000)),
                ];
                for src in &too_deep {
                    let err = parse_expression(src).unwrap_err();
                    assert!(
                        matches!(err, ScriptError::ExpressionTooRecursive(_)),
                        "{err}"
                    );
                    assert!(err.to_string().starts_with("E1169: Expression too recursive"));
                }
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn statements_without_required_argument() {
        for cmd in ["unlet", "unlet!", "delfunction", "delfunction!", "call", "if", "while", "for"] {
            assert_eq!(
                parse_script(cmd).unwrap_err().to_string(),
                "E471: Argument required",
                "{cmd}"
            );
        }
        assert_eq!(parse_script("echo! 1").unwrap_err().to_string(), "E477: No ! allowed");
        assert_eq!(parse_script("let! x = 1").unwrap_err().to_string(), "E477: No ! allowed");
        assert!(parse_script("unlet! g:x").is_ok());
    }

    #[test]
    fn let_errors_quote_the_value() {
        assert_eq!(
            parse_script("let x = 1 +").unwrap_err().to_string(),
            "E15: Invalid expression: \"1 +\""
        );
        assert_eq!(
            parse_script("for i in [1] +").unwrap_err().to_string(),
            "E15: Invalid expression: \"[1] +\""
        );
    }

    #[test]
    fn execute_fragment_may_return_inside_function() {
        let ctx = ParseContext {
            in_function: true,
            in_loop: false,
        };
        assert!(parse_script_in("return 1", ctx).is_ok());
    }
}
