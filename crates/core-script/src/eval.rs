//! Statement execution and expression evaluation.
//!
//! Control flow travels as [`ExecutionResult`]: loops consume `Break` and
//! `Continue`, function calls consume `Finish`, and errors ride the `Err`
//! arm of `Result` up to whoever started the evaluation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use core_ex::Range;
use core_state::{HostSurface, Mode, Position, RegexEngine, RegisterContent};
use tracing::{debug, trace};

use crate::ScriptError;
use crate::ast::{
    AssignOp, BinaryOp, Callee, CaseMode, CompareOp, EchoKind, Expr, FunctionDef, FunctionFlags,
    FunctionName, LambdaDef, LetTarget, Scope, Statement, StatementKind, UnaryOp, VarName,
};
use crate::builtins;
use crate::functions::{FunctionHandler, FunctionKey, FunctionStorage, ScriptId};
use crate::parser::{ParseContext, parse_expression, parse_script, parse_script_in};
use crate::value::{DictRef, FuncTarget, Funcref, ScopeRef, Value, new_scope};

/// Outcome of running a statement or block.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success,
    Break,
    Continue,
    /// `:return`, with its value.
    Finish(Value),
}

/// Everything the interpreter needs from the editor around it.
pub trait ScriptHost {
    fn surface(&self) -> &dyn HostSurface;
    fn surface_mut(&mut self) -> &mut dyn HostSurface;
    fn regex(&self) -> &dyn RegexEngine;
    /// Run an ex command that is not a script statement. The interpreter is
    /// handed back so the command may evaluate script itself.
    fn execute_ex(
        &mut self,
        interp: &mut Interpreter,
        line: &str,
        script: Option<ScriptId>,
    ) -> Result<(), ScriptError>;
    fn echo(&mut self, kind: EchoKind, text: &str);
    fn option(&self, name: &str) -> Option<Value>;
    fn set_option(&mut self, name: &str, value: &Value) -> Result<(), ScriptError>;
    fn mode(&self) -> Mode;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSettings {
    pub maxfuncdepth: usize,
    pub ignorecase: bool,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            maxfuncdepth: 100,
            ignorecase: false,
        }
    }
}

/// Variable context of the code being run.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    /// `l:`; `None` at top level.
    pub locals: Option<ScopeRef>,
    pub args: Option<ScopeRef>,
    /// Captured scopes of a closure or lambda, innermost first.
    pub closure: Vec<ScopeRef>,
    pub script: Option<ScriptId>,
    pub loop_depth: usize,
    /// Lambdas see globals through unscoped names.
    pub global_fallback: bool,
}

impl Frame {
    pub fn top(script: Option<ScriptId>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    fn captured(&self) -> Vec<ScopeRef> {
        self.locals
            .iter()
            .chain(self.closure.iter())
            .cloned()
            .collect()
    }
}

/// A resolved call target.
#[derive(Debug, Clone)]
pub(crate) enum Callable {
    Builtin(&'static str),
    User(FunctionHandler),
    Funcref(Rc<Funcref>),
}

/// Ceiling on 'maxfuncdepth'. Every call level costs several native stack
/// frames; this many fit in an 8 MiB stack in debug builds.
const MAX_CALL_DEPTH: usize = 100;

/// Scripts sourcing scripts.
const MAX_SOURCE_DEPTH: usize = 50;

pub struct Interpreter {
    globals: ScopeRef,
    vim_vars: ScopeRef,
    buffer_vars: ScopeRef,
    window_vars: ScopeRef,
    tab_vars: ScopeRef,
    script_vars: HashMap<ScriptId, ScopeRef>,
    scripts: Vec<String>,
    functions: FunctionStorage,
    call_depth: usize,
    source_depth: usize,
    settings: ScriptSettings,
    interrupt: Arc<AtomicBool>,
    env: HashMap<String, String>,
    next_lambda: u32,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(ScriptSettings::default())
    }
}

impl Interpreter {
    pub fn new(settings: ScriptSettings) -> Self {
        let vim_vars = new_scope();
        {
            let mut v = vim_vars.borrow_mut();
            v.insert("count".into(), Value::Number(0));
            v.insert("count1".into(), Value::Number(1));
            v.insert("register".into(), Value::str("\""));
            v.insert("errmsg".into(), Value::str(""));
        }
        Self {
            globals: new_scope(),
            vim_vars,
            buffer_vars: new_scope(),
            window_vars: new_scope(),
            tab_vars: new_scope(),
            script_vars: HashMap::new(),
            scripts: Vec::new(),
            functions: FunctionStorage::new(),
            call_depth: 0,
            source_depth: 0,
            settings,
            interrupt: Arc::new(AtomicBool::new(false)),
            env: HashMap::new(),
            next_lambda: 0,
        }
    }

    pub fn settings(&self) -> &ScriptSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ScriptSettings {
        &mut self.settings
    }

    pub fn functions(&self) -> &FunctionStorage {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionStorage {
        &mut self.functions
    }

    /// Flag polled between loop iterations; set it to abort a running script.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    /// Set a `v:` variable such as `v:count` or `v:errmsg`.
    pub fn set_vim_var(&mut self, name: &str, value: Value) {
        self.vim_vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn vim_var(&self, name: &str) -> Option<Value> {
        self.vim_vars.borrow().get(name).cloned()
    }

    pub fn env_var(&self, name: &str) -> String {
        self.env
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
            .unwrap_or_default()
    }

    /// Handle for a script source, reusing the id of a script seen before.
    pub fn register_script(&mut self, name: &str) -> ScriptId {
        let idx = match self.scripts.iter().position(|s| s == name) {
            Some(idx) => idx,
            None => {
                self.scripts.push(name.to_string());
                self.scripts.len() - 1
            }
        };
        ScriptId(idx as u32 + 1)
    }

    pub fn script_name(&self, id: ScriptId) -> Option<&str> {
        let idx = (id.0 as usize).checked_sub(1)?;
        self.scripts.get(idx).map(String::as_str)
    }

    // --------------------------------------------------------------------------------------------
    // Entry points
    // --------------------------------------------------------------------------------------------

    /// Parse and run `src` at top level, in the context of `script`.
    pub fn execute(
        &mut self,
        host: &mut dyn ScriptHost,
        src: &str,
        script: Option<ScriptId>,
    ) -> Result<(), ScriptError> {
        let statements = parse_script(src)?;
        let mut frame = Frame::top(script);
        self.exec_block(host, &statements, &mut frame)?;
        Ok(())
    }

    /// Read and run a script file under its own script id.
    pub fn source_file(
        &mut self,
        host: &mut dyn ScriptHost,
        path: &Path,
    ) -> Result<ScriptId, ScriptError> {
        let src = std::fs::read_to_string(path)
            .map_err(|_| ScriptError::CannotOpenFile(path.display().to_string()))?;
        if self.source_depth >= MAX_SOURCE_DEPTH {
            return Err(ScriptError::CommandTooRecursive);
        }
        let id = self.register_script(&path.display().to_string());
        debug!(target: "script.eval", script = id.0, depth = self.source_depth, "source");
        self.source_depth += 1;
        let result = self.execute(host, &src, Some(id));
        self.source_depth -= 1;
        result.map(|()| id)
    }

    pub fn evaluate(
        &mut self,
        host: &mut dyn ScriptHost,
        src: &str,
        script: Option<ScriptId>,
    ) -> Result<Value, ScriptError> {
        let expr = parse_expression(src)?;
        self.eval(host, &Frame::top(script), &expr)
    }

    /// Call a function by name, as `call()` would.
    pub fn call_function(
        &mut self,
        host: &mut dyn ScriptHost,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let frame = Frame::top(None);
        let target = self.resolve_named(&frame, &VarName::parse(name))?;
        self.invoke(host, &frame, target, args, None, None)
    }

    // --------------------------------------------------------------------------------------------
    // Statements
    // --------------------------------------------------------------------------------------------

    pub(crate) fn exec_block(
        &mut self,
        host: &mut dyn ScriptHost,
        statements: &[Statement],
        frame: &mut Frame,
    ) -> Result<ExecutionResult, ScriptError> {
        for stmt in statements {
            if frame.loop_depth > 0 {
                self.check_interrupt()?;
            }
            match self.exec(host, stmt, frame) {
                Ok(ExecutionResult::Success) => {}
                Ok(other) => return Ok(other),
                Err(err) => {
                    debug!(target: "script.eval", line = stmt.line, error = %err, "statement_failed");
                    return Err(err);
                }
            }
        }
        Ok(ExecutionResult::Success)
    }

    fn exec(
        &mut self,
        host: &mut dyn ScriptHost,
        stmt: &Statement,
        frame: &mut Frame,
    ) -> Result<ExecutionResult, ScriptError> {
        trace!(target: "script.eval", line = stmt.line, "statement");
        match &stmt.kind {
            StatementKind::LetList => self.list_variables(host),
            StatementKind::Let { target, op, value } => {
                let value = self.eval(host, frame, value)?;
                self.assign_target(host, frame, target, *op, value)?;
            }
            StatementKind::Unlet { targets, bang } => {
                for target in targets {
                    self.unlet(host, frame, target, *bang)?;
                }
            }
            StatementKind::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(host, frame, cond)?.truthy()? {
                        return self.exec_block(host, body, frame);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(host, body, frame);
                }
            }
            StatementKind::While { condition, body } => loop {
                self.check_interrupt()?;
                if !self.eval(host, frame, condition)?.truthy()? {
                    break;
                }
                match self.exec_loop_body(host, body, frame)? {
                    ExecutionResult::Break => break,
                    ExecutionResult::Finish(v) => return Ok(ExecutionResult::Finish(v)),
                    ExecutionResult::Success | ExecutionResult::Continue => {}
                }
            },
            StatementKind::For {
                target,
                iterable,
                body,
            } => {
                let items = match self.eval(host, frame, iterable)? {
                    Value::List(list) => list.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    _ => return Err(ScriptError::ListRequired),
                };
                for item in items {
                    self.check_interrupt()?;
                    self.assign_target(host, frame, target, AssignOp::Set, item)?;
                    match self.exec_loop_body(host, body, frame)? {
                        ExecutionResult::Break => break,
                        ExecutionResult::Finish(v) => return Ok(ExecutionResult::Finish(v)),
                        ExecutionResult::Success | ExecutionResult::Continue => {}
                    }
                }
            }
            StatementKind::Function { def, bang } => self.define_function(host, frame, def, *bang)?,
            StatementKind::FunctionList(name) => self.list_functions(host, frame, name.as_deref())?,
            StatementKind::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval(host, frame, e)?,
                    None => Value::Number(0),
                };
                return Ok(ExecutionResult::Finish(value));
            }
            StatementKind::Break => return Ok(ExecutionResult::Break),
            StatementKind::Continue => return Ok(ExecutionResult::Continue),
            StatementKind::Delfunction { name, bang } => {
                let key = self.function_key(frame, name)?;
                self.functions.delete(&key, *bang)?;
            }
            StatementKind::Call { range, call } => self.exec_call(host, frame, range.as_ref(), call)?,
            StatementKind::Echo { kind, args } => self.echo(host, frame, *kind, args)?,
            StatementKind::Execute(args) => return self.execute_strings(host, frame, args),
            StatementKind::Ex(line) => host.execute_ex(self, line, frame.script)?,
        }
        Ok(ExecutionResult::Success)
    }

    fn exec_loop_body(
        &mut self,
        host: &mut dyn ScriptHost,
        body: &[Statement],
        frame: &mut Frame,
    ) -> Result<ExecutionResult, ScriptError> {
        frame.loop_depth += 1;
        let result = self.exec_block(host, body, frame);
        frame.loop_depth -= 1;
        result
    }

    fn check_interrupt(&self) -> Result<(), ScriptError> {
        if self.interrupt.swap(false, AtomicOrdering::Relaxed) {
            debug!(target: "script.eval", "interrupted");
            return Err(ScriptError::Interrupted);
        }
        Ok(())
    }

    fn echo(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        kind: EchoKind,
        args: &[Expr],
    ) -> Result<(), ScriptError> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(self.eval(host, frame, arg)?.to_echo());
        }
        let text = match kind {
            EchoKind::Echon => parts.concat(),
            _ => parts.join(" "),
        };
        if kind == EchoKind::Echoerr {
            return Err(ScriptError::User(text));
        }
        host.echo(kind, &text);
        Ok(())
    }

    fn execute_strings(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &mut Frame,
        args: &[Expr],
    ) -> Result<ExecutionResult, ScriptError> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(self.eval(host, frame, arg)?.to_str()?);
        }
        let ctx = ParseContext {
            in_function: frame.locals.is_some(),
            in_loop: frame.loop_depth > 0,
        };
        let statements = parse_script_in(&parts.join(" "), ctx)?;
        self.exec_block(host, &statements, frame)
    }

    fn exec_call(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        range: Option<&Range>,
        call: &Expr,
    ) -> Result<(), ScriptError> {
        let (Some(range), Expr::Call { callee, args }) = (range, call) else {
            self.eval(host, frame, call)?;
            return Ok(());
        };
        let lines = range.resolve(host.surface(), host.regex(), self.settings.ignorecase)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(host, frame, arg)?);
        }
        let target = self.resolve_callee(host, frame, callee)?;
        let ranged = match &target.0 {
            Callable::User(h) => h.def.flags.contains(FunctionFlags::RANGE),
            _ => false,
        };
        if ranged {
            self.invoke(host, frame, target.0, values, target.1, Some((lines.start, lines.end)))?;
            return Ok(());
        }
        for line in lines.start..=lines.end {
            host.surface_mut().set_caret(Position::new(line, 0));
            self.invoke(
                host,
                frame,
                target.0.clone(),
                values.clone(),
                target.1.clone(),
                Some((line, line)),
            )?;
        }
        Ok(())
    }

    fn define_function(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        def: &Rc<FunctionDef>,
        bang: bool,
    ) -> Result<(), ScriptError> {
        let closure = if def.flags.contains(FunctionFlags::CLOSURE) {
            frame.captured()
        } else {
            Vec::new()
        };
        match &def.name {
            FunctionName::Named(name) => {
                let key = self.function_key(frame, name)?;
                let handler = FunctionHandler {
                    key: key.clone(),
                    def: Rc::clone(def),
                    script: frame.script,
                    closure,
                };
                self.functions.register(key, handler, bang)
            }
            FunctionName::Member(base, member) => {
                let dict = self.eval(host, frame, base)?.as_dict()?.clone();
                let key = self.functions.next_anonymous_key();
                let handler = FunctionHandler {
                    key: key.clone(),
                    def: Rc::clone(def),
                    script: frame.script,
                    closure,
                };
                self.functions.register(key.clone(), handler, false)?;
                let anchor = self.functions.anchor(&key);
                dict.borrow_mut()
                    .insert(member.clone(), Value::Funcref(Rc::new(Funcref::anchored(anchor))));
                Ok(())
            }
        }
    }

    fn list_functions(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        name: Option<&str>,
    ) -> Result<(), ScriptError> {
        let keys = match name {
            None => self
                .functions
                .names()
                .iter()
                .map(|n| FunctionKey::from_display_name(n))
                .collect(),
            Some(name) => vec![self.function_key(frame, &VarName::parse(name))?],
        };
        for key in keys {
            let Some(handler) = self.functions.lookup(&key) else {
                return Err(ScriptError::UnknownFunction(key.display_name()));
            };
            let mut params: Vec<String> = handler.def.params.iter().map(|p| p.name.clone()).collect();
            if handler.def.varargs {
                params.push("...".into());
            }
            let line = format!("function {}({})", key.display_name(), params.join(", "));
            host.echo(EchoKind::Echo, &line);
        }
        Ok(())
    }

    fn list_variables(&self, host: &mut dyn ScriptHost) {
        let lines: Vec<String> = self
            .globals
            .borrow()
            .iter()
            .map(|(k, v)| format!("{k:<20}{}", v.to_repr()))
            .collect();
        for line in lines {
            host.echo(EchoKind::Echo, &line);
        }
    }

    // --------------------------------------------------------------------------------------------
    // Variables
    // --------------------------------------------------------------------------------------------

    fn script_scope(&mut self, id: ScriptId) -> ScopeRef {
        Rc::clone(self.script_vars.entry(id).or_insert_with(new_scope))
    }

    pub(crate) fn lookup_var(&self, frame: &Frame, name: &VarName) -> Option<Value> {
        let get = |scope: &ScopeRef| scope.borrow().get(&name.name).cloned();
        match name.scope {
            Some(Scope::Global) => get(&self.globals),
            Some(Scope::Script) => frame
                .script
                .and_then(|id| self.script_vars.get(&id))
                .and_then(get),
            Some(Scope::Local) => frame.locals.as_ref().and_then(get),
            Some(Scope::Argument) => frame.args.as_ref().and_then(get),
            Some(Scope::Vim) => match name.name.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                "null" | "none" => Some(Value::None),
                _ => get(&self.vim_vars),
            },
            Some(Scope::Buffer) => get(&self.buffer_vars),
            Some(Scope::Window) => get(&self.window_vars),
            Some(Scope::Tab) => get(&self.tab_vars),
            None => match &frame.locals {
                None => get(&self.globals),
                Some(locals) => get(locals)
                    .or_else(|| frame.closure.iter().find_map(get))
                    .or_else(|| {
                        if frame.global_fallback {
                            get(&self.globals)
                        } else {
                            None
                        }
                    }),
            },
        }
    }

    fn get_var(&self, frame: &Frame, name: &VarName) -> Result<Value, ScriptError> {
        self.lookup_var(frame, name)
            .ok_or_else(|| ScriptError::UndefinedVariable(name.to_string()))
    }

    /// Scope a `:let` or `:unlet` of `name` writes to.
    fn writable_scope(&mut self, frame: &Frame, name: &VarName) -> Result<ScopeRef, ScriptError> {
        let valid = name
            .name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && name.name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '#');
        if !valid {
            return Err(ScriptError::IllegalVariableName(name.to_string()));
        }
        match name.scope {
            Some(Scope::Global) => Ok(Rc::clone(&self.globals)),
            Some(Scope::Script) => match frame.script {
                Some(id) => Ok(self.script_scope(id)),
                None => Err(ScriptError::IllegalVariableName(name.to_string())),
            },
            Some(Scope::Local) => frame
                .locals
                .clone()
                .ok_or_else(|| ScriptError::IllegalVariableName(name.to_string())),
            Some(Scope::Argument | Scope::Vim) => {
                Err(ScriptError::ReadOnlyVariable(name.to_string()))
            }
            Some(Scope::Buffer) => Ok(Rc::clone(&self.buffer_vars)),
            Some(Scope::Window) => Ok(Rc::clone(&self.window_vars)),
            Some(Scope::Tab) => Ok(Rc::clone(&self.tab_vars)),
            None => match &frame.locals {
                None => Ok(Rc::clone(&self.globals)),
                Some(locals) if locals.borrow().contains_key(&name.name) => Ok(Rc::clone(locals)),
                Some(locals) => Ok(frame
                    .closure
                    .iter()
                    .find(|s| s.borrow().contains_key(&name.name))
                    .cloned()
                    .unwrap_or_else(|| Rc::clone(locals))),
            },
        }
    }

    fn assign_target(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        target: &LetTarget,
        op: AssignOp,
        value: Value,
    ) -> Result<(), ScriptError> {
        match target {
            LetTarget::Single(t) => self.assign(host, frame, t, op, value),
            LetTarget::Unpack { items, rest } => {
                let list = value.as_list()?.borrow().clone();
                if list.len() < items.len() {
                    return Err(ScriptError::MoreTargets);
                }
                if rest.is_none() && list.len() > items.len() {
                    return Err(ScriptError::LessTargets);
                }
                for (t, v) in items.iter().zip(list.iter()) {
                    self.assign(host, frame, t, op, v.clone())?;
                }
                if let Some(rest) = rest {
                    let tail = Value::list(list[items.len()..].to_vec());
                    self.assign(host, frame, rest, op, tail)?;
                }
                Ok(())
            }
        }
    }

    fn assign(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        target: &Expr,
        op: AssignOp,
        value: Value,
    ) -> Result<(), ScriptError> {
        let value = if op == AssignOp::Set {
            value
        } else {
            let current = self.eval(host, frame, target)?;
            compound(op, current, value)?
        };
        match target {
            Expr::Var(name) => {
                let scope = self.writable_scope(frame, name)?;
                scope.borrow_mut().insert(name.name.clone(), value);
                Ok(())
            }
            Expr::Option(name) => host.set_option(name, &value),
            Expr::Register(reg) => {
                let content = match &value {
                    Value::List(l) => {
                        let mut text = String::new();
                        for item in l.borrow().iter() {
                            text.push_str(&item.to_str()?);
                            text.push('\n');
                        }
                        RegisterContent::lines(text)
                    }
                    other => RegisterContent::chars(other.to_str()?),
                };
                host.surface_mut().set_register(*reg, content)?;
                Ok(())
            }
            Expr::Env(name) => {
                self.env.insert(name.clone(), value.to_str()?);
                Ok(())
            }
            Expr::Index(base, index) => {
                let container = self.eval(host, frame, base)?;
                let index = self.eval(host, frame, index)?;
                match container {
                    Value::List(list) => {
                        let mut list = list.borrow_mut();
                        let i = list_index(list.len(), index.to_number()?)?;
                        list[i] = value;
                        Ok(())
                    }
                    Value::Dict(dict) => {
                        dict.borrow_mut().insert(index.to_str()?, value);
                        Ok(())
                    }
                    _ => Err(ScriptError::NotIndexable),
                }
            }
            Expr::Slice(base, start, end) => {
                let container = self.eval(host, frame, base)?;
                let list = container.as_list()?;
                let start = match start {
                    Some(e) => self.eval(host, frame, e)?.to_number()?,
                    None => 0,
                };
                let end = match end {
                    Some(e) => Some(self.eval(host, frame, e)?.to_number()?),
                    None => None,
                };
                let items = value.as_list()?.borrow().clone();
                let mut target = list.borrow_mut();
                let first = list_index(target.len(), start)?;
                if let Some(last) = end {
                    let last = list_index(target.len(), last)?;
                    if last + 1 - first != items.len() {
                        return Err(ScriptError::ListOperation);
                    }
                }
                if first + items.len() > target.len() {
                    return Err(ScriptError::IndexOutOfRange((first + items.len()) as i64 - 1));
                }
                for (i, item) in items.into_iter().enumerate() {
                    target[first + i] = item;
                }
                Ok(())
            }
            Expr::Dot(base, key) => {
                let container = self.eval(host, frame, base)?;
                container.as_dict()?.borrow_mut().insert(key.clone(), value);
                Ok(())
            }
            other => Err(ScriptError::IllegalVariableName(format!("{other:?}"))),
        }
    }

    fn unlet(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        target: &Expr,
        bang: bool,
    ) -> Result<(), ScriptError> {
        match target {
            Expr::Var(name) => {
                let scope = self.writable_scope(frame, name)?;
                let removed = scope.borrow_mut().remove(&name.name).is_some();
                if !removed && !bang {
                    return Err(ScriptError::NoSuchVariable(name.to_string()));
                }
                Ok(())
            }
            Expr::Env(name) => {
                self.env.insert(name.clone(), String::new());
                Ok(())
            }
            Expr::Index(base, index) => {
                let container = self.eval(host, frame, base)?;
                let index = self.eval(host, frame, index)?;
                match container {
                    Value::List(list) => {
                        let mut list = list.borrow_mut();
                        match list_index(list.len(), index.to_number()?) {
                            Ok(i) => {
                                list.remove(i);
                            }
                            Err(_) if bang => {}
                            Err(e) => return Err(e),
                        }
                        Ok(())
                    }
                    Value::Dict(dict) => {
                        let key = index.to_str()?;
                        if dict.borrow_mut().remove(&key).is_none() && !bang {
                            return Err(ScriptError::KeyNotPresent(key));
                        }
                        Ok(())
                    }
                    _ => Err(ScriptError::NotIndexable),
                }
            }
            Expr::Dot(base, key) => {
                let container = self.eval(host, frame, base)?;
                if container.as_dict()?.borrow_mut().remove(key).is_none() && !bang {
                    return Err(ScriptError::KeyNotPresent(key.clone()));
                }
                Ok(())
            }
            other => Err(ScriptError::IllegalVariableName(format!("{other:?}"))),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Functions
    // --------------------------------------------------------------------------------------------

    fn function_key(&self, frame: &Frame, name: &VarName) -> Result<FunctionKey, ScriptError> {
        match name.scope {
            Some(Scope::Script) => frame
                .script
                .map(|id| FunctionKey::script(id, &name.name))
                .ok_or(ScriptError::SidOutsideScript),
            Some(Scope::Global) => Ok(FunctionKey::global(&name.name)),
            None => Ok(FunctionKey::from_display_name(&name.name)),
            Some(_) => Err(ScriptError::BadFunctionName(name.to_string())),
        }
    }

    /// Function name as stored in a funcref created in `frame`.
    pub(crate) fn funcref_name(&self, frame: &Frame, name: &str) -> Result<String, ScriptError> {
        let parsed = VarName::parse(name);
        if parsed.scope.is_none() && builtins::lookup(name).is_some() {
            return Ok(name.to_string());
        }
        let key = self.function_key(frame, &parsed)?;
        if self.functions.lookup(&key).is_none() {
            return Err(ScriptError::UnknownFunctionReference(name.to_string()));
        }
        Ok(key.display_name())
    }

    /// Builtin, then stored function, then a variable holding a funcref.
    pub(crate) fn resolve_named(
        &self,
        frame: &Frame,
        name: &VarName,
    ) -> Result<Callable, ScriptError> {
        if name.scope.is_none()
            && let Some(builtin) = builtins::lookup(&name.name)
        {
            return Ok(Callable::Builtin(builtin));
        }
        let key = self.function_key(frame, name)?;
        if let Some(handler) = self.functions.lookup(&key) {
            return Ok(Callable::User(handler.clone()));
        }
        if let Some(Value::Funcref(f)) = self.lookup_var(frame, name) {
            return Ok(Callable::Funcref(f));
        }
        Err(ScriptError::UnknownFunction(name.to_string()))
    }

    /// Target of a call expression plus the dictionary bound as `self`.
    fn resolve_callee(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        callee: &Callee,
    ) -> Result<(Callable, Option<DictRef>), ScriptError> {
        let expr = match callee {
            Callee::Named(name) => return Ok((self.resolve_named(frame, name)?, None)),
            Callee::Expr(expr) => expr,
        };
        let (value, self_dict) = match expr.as_ref() {
            Expr::Dot(base, key) => match self.eval(host, frame, base)? {
                Value::Dict(dict) => {
                    let member = dict.borrow().get(key).cloned();
                    let member = member.ok_or_else(|| ScriptError::KeyNotPresent(key.clone()))?;
                    (member, Some(dict))
                }
                _ => (self.eval(host, frame, expr)?, None),
            },
            other => (self.eval(host, frame, other)?, None),
        };
        match value {
            Value::Funcref(f) => Ok((Callable::Funcref(f), self_dict)),
            Value::Str(name) => Ok((self.resolve_named(frame, &VarName::parse(&name))?, self_dict)),
            other => Err(ScriptError::UnknownFunction(other.to_echo())),
        }
    }

    pub(crate) fn invoke(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        target: Callable,
        args: Vec<Value>,
        self_dict: Option<DictRef>,
        range: Option<(usize, usize)>,
    ) -> Result<Value, ScriptError> {
        match target {
            Callable::Builtin(name) => builtins::call(self, host, frame, name, args),
            Callable::User(handler) => self.call_user(host, &handler, args, self_dict, range),
            Callable::Funcref(f) => self.call_funcref(host, frame, &f, args, self_dict),
        }
    }

    pub(crate) fn call_funcref(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        f: &Funcref,
        args: Vec<Value>,
        self_dict: Option<DictRef>,
    ) -> Result<Value, ScriptError> {
        let mut all = f.bound_args.clone();
        all.extend(args);
        let self_dict = f.bound_self.clone().or(self_dict);
        match &f.target {
            FuncTarget::Named(name) => {
                let key = FunctionKey::from_display_name(name);
                if let Some(handler) = self.functions.lookup(&key).cloned() {
                    return self.call_user(host, &handler, all, self_dict, None);
                }
                match builtins::lookup(name) {
                    Some(builtin) => builtins::call(self, host, frame, builtin, all),
                    None => Err(ScriptError::UnknownFunction(name.clone())),
                }
            }
            FuncTarget::Lambda {
                id,
                def,
                captured,
                script,
            } => self.call_lambda(host, *id, def, captured, *script, all),
        }
    }

    fn enter_call(&mut self) -> Result<(), ScriptError> {
        if self.call_depth >= self.settings.maxfuncdepth.min(MAX_CALL_DEPTH) {
            return Err(ScriptError::CallDepth);
        }
        self.call_depth += 1;
        Ok(())
    }

    fn call_user(
        &mut self,
        host: &mut dyn ScriptHost,
        handler: &FunctionHandler,
        args: Vec<Value>,
        self_dict: Option<DictRef>,
        range: Option<(usize, usize)>,
    ) -> Result<Value, ScriptError> {
        let def = Rc::clone(&handler.def);
        let name = handler.key.display_name();
        if args.len() < def.required_params() {
            return Err(ScriptError::NotEnoughArguments(name));
        }
        if args.len() > def.params.len() && !def.varargs {
            return Err(ScriptError::TooManyArguments(name));
        }
        if def.flags.contains(FunctionFlags::DICT) && self_dict.is_none() {
            return Err(ScriptError::DictFunctionWithoutDict(name));
        }

        let locals = new_scope();
        let arg_scope = new_scope();
        if let Some(dict) = &self_dict {
            locals
                .borrow_mut()
                .insert("self".into(), Value::Dict(Rc::clone(dict)));
        }
        let frame = Frame {
            locals: Some(locals),
            args: Some(Rc::clone(&arg_scope)),
            closure: handler.closure.clone(),
            script: handler.script,
            loop_depth: 0,
            global_fallback: false,
        };
        let caret_line = host.surface().caret().line;
        let (first, last) = range.unwrap_or((caret_line, caret_line));
        {
            let mut a = arg_scope.borrow_mut();
            a.insert("firstline".into(), Value::Number(first as i64 + 1));
            a.insert("lastline".into(), Value::Number(last as i64 + 1));
        }
        let mut args = args.into_iter();
        for (param, default) in def.params.iter().zip(def.defaults.iter()) {
            let value = match (args.next(), default) {
                (Some(v), _) => v,
                (None, Some(expr)) => self.eval(host, &frame, expr)?,
                (None, None) => return Err(ScriptError::NotEnoughArguments(name)),
            };
            arg_scope.borrow_mut().insert(param.name.clone(), value);
        }
        let extra: Vec<Value> = args.collect();
        {
            let mut a = arg_scope.borrow_mut();
            a.insert("0".into(), Value::Number(extra.len() as i64));
            for (i, v) in extra.iter().enumerate() {
                a.insert((i + 1).to_string(), v.clone());
            }
            a.insert("000".into(), Value::list(extra));
        }

        self.enter_call()?;
        self.functions.enter(&handler.key);
        debug!(target: "script.functions", name = %name, depth = self.call_depth, "function_call");
        let mut frame = frame;
        let result = self.exec_block(host, &def.body, &mut frame);
        self.functions.leave(&handler.key);
        self.call_depth -= 1;
        match result? {
            ExecutionResult::Finish(v) => Ok(v),
            _ => Ok(Value::Number(0)),
        }
    }

    fn call_lambda(
        &mut self,
        host: &mut dyn ScriptHost,
        id: u32,
        def: &LambdaDef,
        captured: &[ScopeRef],
        script: Option<ScriptId>,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let name = format!("<lambda>{id}");
        if args.len() < def.params.len() {
            return Err(ScriptError::NotEnoughArguments(name));
        }
        if args.len() > def.params.len() {
            return Err(ScriptError::TooManyArguments(name));
        }
        let locals = new_scope();
        for (param, value) in def.params.iter().zip(args) {
            locals.borrow_mut().insert(param.clone(), value);
        }
        let frame = Frame {
            locals: Some(Rc::clone(&locals)),
            args: Some(locals),
            closure: captured.to_vec(),
            script,
            loop_depth: 0,
            global_fallback: true,
        };
        self.enter_call()?;
        let result = self.eval(host, &frame, &def.body);
        self.call_depth -= 1;
        result
    }

    fn eval_call(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        callee: &Callee,
        arg_exprs: &[Expr],
        receiver: Option<Value>,
    ) -> Result<Value, ScriptError> {
        let mut args = Vec::with_capacity(arg_exprs.len() + 1);
        args.extend(receiver);
        for arg in arg_exprs {
            args.push(self.eval(host, frame, arg)?);
        }
        let (target, self_dict) = self.resolve_callee(host, frame, callee)?;
        self.invoke(host, frame, target, args, self_dict, None)
    }

    // --------------------------------------------------------------------------------------------
    // Expressions
    // --------------------------------------------------------------------------------------------

    pub(crate) fn eval(
        &mut self,
        host: &mut dyn ScriptHost,
        frame: &Frame,
        expr: &Expr,
    ) -> Result<Value, ScriptError> {
        Ok(match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Float(f) => Value::Float(*f),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(host, frame, item)?);
                }
                Value::list(out)
            }
            Expr::Dict(entries) => {
                let mut out = std::collections::BTreeMap::new();
                for (k, v) in entries {
                    let key = self.eval(host, frame, k)?.to_str()?;
                    let value = self.eval(host, frame, v)?;
                    out.insert(key, value);
                }
                Value::dict(out)
            }
            Expr::Var(name) => self.get_var(frame, name)?,
            Expr::Option(name) => host
                .option(name)
                .ok_or_else(|| ScriptError::UnknownOption(name.clone()))?,
            Expr::Register(reg) => {
                Value::Str(host.surface().register(*reg).map(|r| r.text).unwrap_or_default())
            }
            Expr::Env(name) => Value::Str(self.env_var(name)),
            Expr::Unary(op, operand) => {
                let v = self.eval(host, frame, operand)?;
                match (op, v) {
                    (UnaryOp::Not, v) => Value::bool(!v.truthy()?),
                    (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
                    (UnaryOp::Neg, v) => Value::Number(v.to_number()?.wrapping_neg()),
                    (UnaryOp::Plus, Value::Float(f)) => Value::Float(f),
                    (UnaryOp::Plus, v) => Value::Number(v.to_number()?),
                }
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                let l = self.eval(host, frame, lhs)?.truthy()?;
                Value::bool(l || self.eval(host, frame, rhs)?.truthy()?)
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                let l = self.eval(host, frame, lhs)?.truthy()?;
                Value::bool(l && self.eval(host, frame, rhs)?.truthy()?)
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(host, frame, lhs)?;
                let r = self.eval(host, frame, rhs)?;
                binary(*op, l, r)?
            }
            Expr::Compare { op, case, lhs, rhs } => {
                let l = self.eval(host, frame, lhs)?;
                let r = self.eval(host, frame, rhs)?;
                Value::bool(self.compare(host, *op, *case, &l, &r)?)
            }
            Expr::Ternary(cond, then, otherwise) => {
                if self.eval(host, frame, cond)?.truthy()? {
                    self.eval(host, frame, then)?
                } else {
                    self.eval(host, frame, otherwise)?
                }
            }
            Expr::Index(base, index) => {
                let base = self.eval(host, frame, base)?;
                let index = self.eval(host, frame, index)?;
                index_value(&base, &index)?
            }
            Expr::Slice(base, start, end) => {
                let base = self.eval(host, frame, base)?;
                let start = match start {
                    Some(e) => Some(self.eval(host, frame, e)?.to_number()?),
                    None => None,
                };
                let end = match end {
                    Some(e) => Some(self.eval(host, frame, e)?.to_number()?),
                    None => None,
                };
                slice_value(&base, start, end)?
            }
            Expr::Dot(base, key) => match self.eval(host, frame, base)? {
                Value::Dict(dict) => dict
                    .borrow()
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ScriptError::KeyNotPresent(key.clone()))?,
                other => {
                    let rhs = self.get_var(frame, &VarName::parse(key))?;
                    Value::Str(other.to_str()? + &rhs.to_str()?)
                }
            },
            Expr::Call { callee, args } => self.eval_call(host, frame, callee, args, None)?,
            Expr::Method { base, callee, args } => {
                let receiver = self.eval(host, frame, base)?;
                self.eval_call(host, frame, callee, args, Some(receiver))?
            }
            Expr::Lambda(def) => {
                self.next_lambda += 1;
                Value::Funcref(Rc::new(Funcref {
                    target: FuncTarget::Lambda {
                        id: self.next_lambda,
                        def: Rc::clone(def),
                        captured: frame.captured(),
                        script: frame.script,
                    },
                    bound_args: Vec::new(),
                    bound_self: None,
                    anchor: None,
                }))
            }
        })
    }

    pub(crate) fn ignore_case(&self, case: CaseMode) -> bool {
        match case {
            CaseMode::Option => self.settings.ignorecase,
            CaseMode::Match => false,
            CaseMode::Ignore => true,
        }
    }

    fn compare(
        &self,
        host: &dyn ScriptHost,
        op: CompareOp,
        case: CaseMode,
        l: &Value,
        r: &Value,
    ) -> Result<bool, ScriptError> {
        let ic = self.ignore_case(case);
        Ok(match op {
            CompareOp::Is => l.identical(r),
            CompareOp::IsNot => !l.identical(r),
            CompareOp::Eq => l.loose_eq(r, ic)?,
            CompareOp::Ne => !l.loose_eq(r, ic)?,
            CompareOp::Match | CompareOp::NoMatch => {
                let matched = host.regex().is_match(&r.to_str()?, &l.to_str()?, ic)?;
                matched == (op == CompareOp::Match)
            }
            CompareOp::Gt => ordering(l, r, ic)? == Ordering::Greater,
            CompareOp::Ge => ordering(l, r, ic)? != Ordering::Less,
            CompareOp::Lt => ordering(l, r, ic)? == Ordering::Less,
            CompareOp::Le => ordering(l, r, ic)? != Ordering::Greater,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Operators
// ------------------------------------------------------------------------------------------------

pub(crate) fn ordering(l: &Value, r: &Value, ic: bool) -> Result<Ordering, ScriptError> {
    match (l, r) {
        (Value::List(_), _) | (_, Value::List(_)) => Err(ScriptError::ListOperation),
        (Value::Dict(_), _) | (_, Value::Dict(_)) => Err(ScriptError::DictOperation),
        (Value::Funcref(_), _) | (_, Value::Funcref(_)) => Err(ScriptError::FuncrefOperation),
        (Value::Str(a), Value::Str(b)) => Ok(if ic {
            a.to_lowercase().cmp(&b.to_lowercase())
        } else {
            a.cmp(b)
        }),
        (Value::Float(_), _) | (_, Value::Float(_)) => Ok(l
            .to_float()?
            .partial_cmp(&r.to_float()?)
            .unwrap_or(Ordering::Equal)),
        _ => Ok(l.to_number()?.cmp(&r.to_number()?)),
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, ScriptError> {
    if op == BinaryOp::Concat {
        return Ok(Value::Str(l.to_str()? + &r.to_str()?));
    }
    if let (BinaryOp::Add, Value::List(a), Value::List(b)) = (op, &l, &r) {
        let mut items = a.borrow().clone();
        items.extend(b.borrow().iter().cloned());
        return Ok(Value::list(items));
    }
    if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        let (a, b) = (l.to_float()?, r.to_float()?);
        return Ok(Value::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => return Err(ScriptError::FloatModulo),
            _ => return Err(ScriptError::InvalidArgument),
        }));
    }
    let (a, b) = (l.to_number()?, r.to_number()?);
    Ok(Value::Number(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b == 0 => match a.cmp(&0) {
            Ordering::Greater => i64::MAX,
            Ordering::Less => -i64::MAX,
            Ordering::Equal => i64::MIN,
        },
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Mod if b == 0 => 0,
        BinaryOp::Mod => a.wrapping_rem(b),
        _ => return Err(ScriptError::InvalidArgument),
    }))
}

fn compound(op: AssignOp, current: Value, value: Value) -> Result<Value, ScriptError> {
    let wrong_type = || ScriptError::WrongTypeForOperator(op.symbol().to_string());
    match (op, &current) {
        (AssignOp::Add, Value::List(list)) => {
            let extra = value.as_list().map_err(|_| wrong_type())?.borrow().clone();
            list.borrow_mut().extend(extra);
            Ok(current)
        }
        (_, Value::List(_) | Value::Dict(_) | Value::Funcref(_)) => Err(wrong_type()),
        (AssignOp::Concat, Value::Float(_)) => Err(wrong_type()),
        (AssignOp::Concat, _) => binary(BinaryOp::Concat, current, value),
        (AssignOp::Add, _) => binary(BinaryOp::Add, current, value),
        (AssignOp::Sub, _) => binary(BinaryOp::Sub, current, value),
        (AssignOp::Mul, _) => binary(BinaryOp::Mul, current, value),
        (AssignOp::Div, _) => binary(BinaryOp::Div, current, value),
        (AssignOp::Mod, _) => binary(BinaryOp::Mod, current, value),
        (AssignOp::Set, _) => Ok(value),
    }
}

/// Resolve a possibly negative list index.
pub(crate) fn list_index(len: usize, index: i64) -> Result<usize, ScriptError> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ScriptError::IndexOutOfRange(index));
    }
    Ok(resolved as usize)
}

fn index_value(base: &Value, index: &Value) -> Result<Value, ScriptError> {
    match base {
        Value::List(list) => {
            let list = list.borrow();
            let i = list_index(list.len(), index.to_number()?)?;
            Ok(list[i].clone())
        }
        Value::Dict(dict) => {
            let key = index.to_str()?;
            dict.borrow()
                .get(&key)
                .cloned()
                .ok_or(ScriptError::KeyNotPresent(key))
        }
        Value::Str(_) | Value::Number(_) => {
            let s = base.to_str()?;
            let i = index.to_number()?;
            let byte = usize::try_from(i).ok().and_then(|i| s.as_bytes().get(i..i + 1));
            Ok(Value::Str(
                byte.map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default(),
            ))
        }
        _ => Err(ScriptError::NotIndexable),
    }
}

/// Inclusive `[start:end]` bounds clamped to `len`; `None` when empty.
fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = start.unwrap_or(0);
    let mut end = end.unwrap_or(len - 1);
    if start < 0 {
        start = (len + start).max(0);
    }
    if end < 0 {
        end += len;
    }
    end = end.min(len - 1);
    if start > end || start >= len {
        return None;
    }
    Some((start as usize, end as usize))
}

fn slice_value(base: &Value, start: Option<i64>, end: Option<i64>) -> Result<Value, ScriptError> {
    match base {
        Value::List(list) => {
            let list = list.borrow();
            Ok(Value::list(match slice_bounds(list.len(), start, end) {
                Some((a, b)) => list[a..=b].to_vec(),
                None => Vec::new(),
            }))
        }
        Value::Str(_) | Value::Number(_) => {
            let s = base.to_str()?;
            Ok(Value::Str(match slice_bounds(s.len(), start, end) {
                Some((a, b)) => String::from_utf8_lossy(&s.as_bytes()[a..=b]).into_owned(),
                None => String::new(),
            }))
        }
        _ => Err(ScriptError::NotIndexable),
    }
}
