//! Builtin functions.
//!
//! Each entry carries its arity; argument count errors are raised before the
//! implementation runs, so implementations index `args` freely.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use core_state::{Position, RegisterContent};
use tracing::trace;

use crate::ScriptError;
use crate::ast::{Expr, VarName};
use crate::eval::{Callable, Frame, Interpreter, ScriptHost, list_index, ordering};
use crate::parser::parse_expression;
use crate::value::{FuncTarget, Funcref, Value, str_to_number};

/// `(name, min args, max args)`
const BUILTINS: &[(&str, usize, usize)] = &[
    ("abs", 1, 1),
    ("add", 2, 2),
    ("call", 2, 3),
    ("col", 1, 1),
    ("copy", 1, 1),
    ("count", 2, 3),
    ("deepcopy", 1, 1),
    ("empty", 1, 1),
    ("escape", 2, 2),
    ("exists", 1, 1),
    ("filter", 2, 2),
    ("funcref", 1, 3),
    ("function", 1, 3),
    ("get", 2, 3),
    ("getline", 1, 2),
    ("getreg", 0, 1),
    ("has_key", 2, 2),
    ("index", 2, 3),
    ("insert", 2, 3),
    ("items", 1, 1),
    ("join", 1, 2),
    ("keys", 1, 1),
    ("len", 1, 1),
    ("line", 1, 1),
    ("map", 2, 2),
    ("match", 2, 3),
    ("matchstr", 2, 3),
    ("max", 1, 1),
    ("min", 1, 1),
    ("mode", 0, 1),
    ("printf", 1, 20),
    ("range", 1, 3),
    ("remove", 2, 3),
    ("repeat", 2, 2),
    ("reverse", 1, 1),
    ("setline", 2, 2),
    ("setreg", 2, 3),
    ("sort", 1, 2),
    ("split", 1, 3),
    ("str2nr", 1, 2),
    ("stridx", 2, 3),
    ("string", 1, 1),
    ("strlen", 1, 1),
    ("strpart", 2, 3),
    ("substitute", 4, 4),
    ("tolower", 1, 1),
    ("toupper", 1, 1),
    ("trim", 1, 2),
    ("type", 1, 1),
    ("values", 1, 1),
];

/// Canonical name of the builtin `name`, if there is one.
pub fn lookup(name: &str) -> Option<&'static str> {
    BUILTINS.iter().find(|(n, _, _)| *n == name).map(|(n, _, _)| *n)
}

pub(crate) fn call(
    interp: &mut Interpreter,
    host: &mut dyn ScriptHost,
    frame: &Frame,
    name: &'static str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    if let Some((_, min, max)) = BUILTINS.iter().find(|(n, _, _)| *n == name) {
        if args.len() < *min {
            return Err(ScriptError::NotEnoughArguments(name.to_string()));
        }
        if args.len() > *max {
            return Err(ScriptError::TooManyArguments(name.to_string()));
        }
    }
    trace!(target: "script.builtins", name, argc = args.len(), "builtin_call");
    let arg = |i: usize| args.get(i).cloned();
    Ok(match name {
        "abs" => match &args[0] {
            Value::Float(f) => Value::Float(f.abs()),
            v => Value::Number(v.to_number()?.wrapping_abs()),
        },
        "add" => {
            args[0].as_list()?.borrow_mut().push(args[1].clone());
            args[0].clone()
        }
        "call" => {
            let list = args[1].as_list()?.borrow().clone();
            let self_dict = match arg(2) {
                Some(d) => Some(d.as_dict()?.clone()),
                None => None,
            };
            let target = match &args[0] {
                Value::Funcref(f) => Callable::Funcref(Rc::clone(f)),
                other => interp.resolve_named(frame, &VarName::parse(&other.to_str()?))?,
            };
            interp.invoke(host, frame, target, list, self_dict, None)?
        }
        "col" => {
            let caret = host.surface().caret();
            match args[0].to_str()?.as_str() {
                "." => Value::Number(caret.byte as i64 + 1),
                "$" => {
                    let len = host.surface().line(caret.line).map_or(0, |l| l.len());
                    Value::Number(len as i64 + 1)
                }
                _ => Value::Number(0),
            }
        }
        "copy" => args[0].copy(false),
        "count" => {
            let ic = arg(2).map(|v| v.truthy()).transpose()?.unwrap_or(false);
            let needle = &args[1];
            let n = match &args[0] {
                Value::List(l) => count_matches(l.borrow().iter(), needle, ic)?,
                Value::Dict(d) => count_matches(d.borrow().values(), needle, ic)?,
                Value::Str(s) => {
                    let pat = needle.to_str()?;
                    if pat.is_empty() {
                        0
                    } else if ic {
                        s.to_lowercase().matches(&pat.to_lowercase()).count()
                    } else {
                        s.matches(&pat).count()
                    }
                }
                _ => return Err(ScriptError::ListRequired),
            };
            Value::Number(n as i64)
        }
        "deepcopy" => args[0].copy(true),
        "empty" => Value::bool(match &args[0] {
            Value::Number(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::List(l) => l.borrow().is_empty(),
            Value::Dict(d) => d.borrow().is_empty(),
            Value::Funcref(_) => false,
            Value::Bool(b) => !b,
            Value::None => true,
        }),
        "escape" => {
            let chars = args[1].to_str()?;
            let mut out = String::new();
            for c in args[0].to_str()?.chars() {
                if chars.contains(c) {
                    out.push('\\');
                }
                out.push(c);
            }
            Value::Str(out)
        }
        "exists" => Value::bool(exists(interp, host, frame, &args[0].to_str()?)),
        "filter" | "map" => filter_map(interp, host, frame, name == "map", &args[0], &args[1])?,
        "function" | "funcref" => make_funcref(interp, frame, &args)?,
        "get" => {
            let default = arg(2).unwrap_or(Value::Number(0));
            match &args[0] {
                Value::List(l) => {
                    let l = l.borrow();
                    match list_index(l.len(), args[1].to_number()?) {
                        Ok(i) => l[i].clone(),
                        Err(_) => default,
                    }
                }
                Value::Dict(d) => d.borrow().get(&args[1].to_str()?).cloned().unwrap_or(default),
                _ => return Err(ScriptError::InvalidArgumentValue("get()".into())),
            }
        }
        "getline" => {
            let first = line_arg(host, &args[0])?;
            match arg(1) {
                None => Value::Str(first.and_then(|l| host.surface().line(l)).unwrap_or_default()),
                Some(end) => {
                    let last = line_arg(host, &end)?;
                    let mut out = Vec::new();
                    if let (Some(a), Some(b)) = (first, last) {
                        for l in a..=b {
                            out.extend(host.surface().line(l).map(Value::Str));
                        }
                    }
                    Value::list(out)
                }
            }
        }
        "getreg" => {
            let reg = match arg(0) {
                Some(v) => v.to_str()?.chars().next().unwrap_or('"'),
                None => '"',
            };
            Value::Str(host.surface().register(reg).map(|r| r.text).unwrap_or_default())
        }
        "has_key" => Value::bool(args[0].as_dict()?.borrow().contains_key(&args[1].to_str()?)),
        "index" => {
            let list = args[0].as_list()?.borrow().clone();
            let ic = false;
            let start = match arg(2) {
                Some(v) => list_index(list.len(), v.to_number()?).unwrap_or(list.len()),
                None => 0,
            };
            let mut found = -1;
            for (i, item) in list.iter().enumerate().skip(start) {
                if item.type_code() == args[1].type_code() && item.loose_eq(&args[1], ic)? {
                    found = i as i64;
                    break;
                }
            }
            Value::Number(found)
        }
        "insert" => {
            let list = args[0].as_list()?;
            let len = list.borrow().len() as i64;
            let at = match arg(2) {
                Some(v) => v.to_number()?,
                None => 0,
            };
            let at = if at < 0 { len + at } else { at };
            if at < 0 || at > len {
                return Err(ScriptError::IndexOutOfRange(at));
            }
            list.borrow_mut().insert(at as usize, args[1].clone());
            args[0].clone()
        }
        "items" => Value::list(
            args[0]
                .as_dict()?
                .borrow()
                .iter()
                .map(|(k, v)| Value::list(vec![Value::str(k.clone()), v.clone()]))
                .collect(),
        ),
        "join" => {
            let sep = match arg(1) {
                Some(v) => v.to_str()?,
                None => " ".into(),
            };
            let mut parts = Vec::new();
            for item in args[0].as_list()?.borrow().iter() {
                parts.push(match item {
                    Value::Str(s) => s.clone(),
                    other => other.to_repr(),
                });
            }
            Value::Str(parts.join(&sep))
        }
        "keys" => Value::list(
            args[0]
                .as_dict()?
                .borrow()
                .keys()
                .map(|k| Value::str(k.clone()))
                .collect(),
        ),
        "len" => Value::Number(match &args[0] {
            Value::List(l) => l.borrow().len() as i64,
            Value::Dict(d) => d.borrow().len() as i64,
            Value::Funcref(_) => return Err(ScriptError::FuncrefAsString),
            v => v.to_str()?.len() as i64,
        }),
        "line" => {
            let line = line_arg(host, &args[0])?;
            Value::Number(line.map_or(0, |l| l as i64 + 1))
        }
        "match" | "matchstr" => {
            let text = args[0].to_str()?;
            let pattern = args[1].to_str()?;
            let start = match arg(2) {
                Some(v) => usize::try_from(v.to_number()?).unwrap_or(0).min(text.len()),
                None => 0,
            };
            let ic = interp.settings().ignorecase;
            let found = host.regex().find(&pattern, &text, start, ic)?;
            match (name, found) {
                ("match", Some((a, _))) => Value::Number(a as i64),
                ("match", None) => Value::Number(-1),
                (_, Some((a, b))) => Value::Str(text[a..b].to_string()),
                (_, None) => Value::str(""),
            }
        }
        "max" | "min" => {
            let items: Vec<Value> = match &args[0] {
                Value::List(l) => l.borrow().clone(),
                Value::Dict(d) => d.borrow().values().cloned().collect(),
                _ => return Err(ScriptError::ListRequired),
            };
            let mut best: Option<i64> = None;
            for item in items {
                let n = item.to_number()?;
                best = Some(match best {
                    None => n,
                    Some(b) if name == "max" => b.max(n),
                    Some(b) => b.min(n),
                });
            }
            Value::Number(best.unwrap_or(0))
        }
        "mode" => Value::str(host.mode().code()),
        "printf" => Value::Str(printf(&args[0].to_str()?, &args[1..])?),
        "range" => range(&args)?,
        "remove" => remove(&args)?,
        "repeat" => {
            let n = usize::try_from(args[1].to_number()?).unwrap_or(0);
            match &args[0] {
                Value::List(l) => {
                    let items = l.borrow();
                    let mut out = Vec::with_capacity(items.len() * n);
                    for _ in 0..n {
                        out.extend(items.iter().cloned());
                    }
                    Value::list(out)
                }
                v => Value::Str(v.to_str()?.repeat(n)),
            }
        }
        "reverse" => {
            args[0].as_list()?.borrow_mut().reverse();
            args[0].clone()
        }
        "setline" => {
            let Some(line) = line_arg(host, &args[0])? else {
                return Ok(Value::Number(1));
            };
            let lines: Vec<String> = match &args[1] {
                Value::List(l) => l.borrow().iter().map(Value::to_str).collect::<Result<_, _>>()?,
                v => vec![v.to_str()?],
            };
            let surface = host.surface_mut();
            for (i, text) in lines.iter().enumerate() {
                let idx = line + i;
                if idx < surface.line_count() {
                    let len = surface.line(idx).map_or(0, |l| l.len());
                    let range = core_state::TextRange::chars(
                        Position::new(idx, 0),
                        Position::new(idx, len),
                    );
                    surface.replace(&range, text)?;
                } else {
                    let last = surface.last_line();
                    let end = surface.line(last).map_or(0, |l| l.len());
                    surface.insert(Position::new(last, end), &format!("\n{text}"))?;
                }
            }
            Value::Number(0)
        }
        "setreg" => {
            let reg = args[0].to_str()?.chars().next().unwrap_or('"');
            let linewise = match arg(2) {
                Some(opts) => opts.to_str()?.contains('l') || opts.to_str()?.contains('V'),
                None => false,
            };
            let content = match &args[1] {
                Value::List(l) => {
                    let mut text = String::new();
                    for item in l.borrow().iter() {
                        text.push_str(&item.to_str()?);
                        text.push('\n');
                    }
                    RegisterContent::lines(text)
                }
                v if linewise => {
                    let mut text = v.to_str()?;
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                    RegisterContent::lines(text)
                }
                v => RegisterContent::chars(v.to_str()?),
            };
            host.surface_mut().set_register(reg, content)?;
            Value::Number(0)
        }
        "sort" => sort(interp, host, frame, &args[0], arg(1))?,
        "split" => {
            let text = args[0].to_str()?;
            let keepempty = arg(2).map(|v| v.truthy()).transpose()?.unwrap_or(false);
            let parts: Vec<String> = match arg(1) {
                Some(p) => {
                    let pattern = p.to_str()?;
                    split_on_pattern(host, &text, &pattern, interp.settings().ignorecase)?
                }
                None => text.split_whitespace().map(str::to_string).collect(),
            };
            Value::list(
                parts
                    .into_iter()
                    .filter(|s| keepempty || !s.is_empty())
                    .map(Value::Str)
                    .collect(),
            )
        }
        "str2nr" => {
            let text = args[0].to_str()?;
            let base = match arg(1) {
                Some(b) => b.to_number()?,
                None => 10,
            };
            let t = text.trim_start();
            let (neg, body) = match t.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, t),
            };
            let n = match base {
                16 => {
                    let body = body.trim_start_matches("0x").trim_start_matches("0X");
                    radix_prefix(body, 16)
                }
                8 => radix_prefix(body.trim_start_matches("0o"), 8),
                2 => radix_prefix(body.trim_start_matches("0b").trim_start_matches("0B"), 2),
                10 => radix_prefix(body, 10),
                _ => return Err(ScriptError::InvalidArgument),
            };
            Value::Number(if neg { -n } else { n })
        }
        "stridx" => {
            let hay = args[0].to_str()?;
            let needle = args[1].to_str()?;
            let start = match arg(2) {
                Some(v) => usize::try_from(v.to_number()?).unwrap_or(0),
                None => 0,
            };
            Value::Number(
                hay.get(start..)
                    .and_then(|h| h.find(&needle))
                    .map_or(-1, |i| (i + start) as i64),
            )
        }
        "string" => Value::Str(args[0].to_repr()),
        "strlen" => Value::Number(args[0].to_str()?.len() as i64),
        "strpart" => {
            let s = args[0].to_str()?;
            let start = args[1].to_number()?;
            let len = match arg(2) {
                Some(v) => v.to_number()?,
                None => s.len() as i64,
            };
            let a = start.clamp(0, s.len() as i64) as usize;
            let b = (start + len).clamp(0, s.len() as i64) as usize;
            Value::Str(if a < b {
                String::from_utf8_lossy(&s.as_bytes()[a..b]).into_owned()
            } else {
                String::new()
            })
        }
        "substitute" => {
            let flags = args[3].to_str()?;
            let ic = interp.settings().ignorecase;
            Value::Str(host.regex().substitute(
                &args[1].to_str()?,
                &args[0].to_str()?,
                &args[2].to_str()?,
                flags.contains('g'),
                ic,
            )?)
        }
        "tolower" => Value::Str(args[0].to_str()?.to_lowercase()),
        "toupper" => Value::Str(args[0].to_str()?.to_uppercase()),
        "trim" => {
            let s = args[0].to_str()?;
            Value::Str(match arg(1) {
                Some(chars) => {
                    let chars = chars.to_str()?;
                    s.trim_matches(|c| chars.contains(c)).to_string()
                }
                None => s.trim_matches(|c: char| c.is_whitespace()).to_string(),
            })
        }
        "type" => Value::Number(args[0].type_code()),
        "values" => Value::list(args[0].as_dict()?.borrow().values().cloned().collect()),
        other => return Err(ScriptError::UnknownFunction(other.to_string())),
    })
}

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

fn count_matches<'a>(
    items: impl Iterator<Item = &'a Value>,
    needle: &Value,
    ic: bool,
) -> Result<usize, ScriptError> {
    let mut n = 0;
    for item in items {
        if item.type_code() == needle.type_code() && item.loose_eq(needle, ic)? {
            n += 1;
        }
    }
    Ok(n)
}

fn radix_prefix(body: &str, radix: u32) -> i64 {
    let end = body.find(|c: char| !c.is_digit(radix)).unwrap_or(body.len());
    i64::from_str_radix(&body[..end], radix).unwrap_or(0)
}

/// `line()` style argument: `"."`, `"$"`, `"'x"` or a one-based number.
fn line_arg(host: &dyn ScriptHost, v: &Value) -> Result<Option<usize>, ScriptError> {
    let surface = host.surface();
    if let Value::Str(s) = v {
        return Ok(match s.as_str() {
            "." => Some(surface.caret().line),
            "$" => Some(surface.last_line()),
            s if s.starts_with('\'') => s[1..]
                .chars()
                .next()
                .and_then(|m| surface.mark(m))
                .map(|p| p.line),
            s => usize::try_from(str_to_number(s)).ok().and_then(|n| n.checked_sub(1)),
        });
    }
    let n = v.to_number()?;
    Ok(usize::try_from(n)
        .ok()
        .and_then(|n| n.checked_sub(1))
        .filter(|l| *l < surface.line_count()))
}

fn exists(interp: &Interpreter, host: &dyn ScriptHost, frame: &Frame, what: &str) -> bool {
    if let Some(opt) = what.strip_prefix('&') {
        return host.option(opt).is_some();
    }
    if let Some(var) = what.strip_prefix('$') {
        return !interp.env_var(var).is_empty();
    }
    if let Some(func) = what.strip_prefix('*') {
        return interp.resolve_named(frame, &VarName::parse(func)).is_ok();
    }
    if let Some(cmd) = what.strip_prefix(':') {
        return core_ex::canonical_builtin(cmd).is_some();
    }
    interp
        .lookup_var(frame, &VarName::parse(what))
        .is_some()
}

fn make_funcref(
    interp: &Interpreter,
    frame: &Frame,
    args: &[Value],
) -> Result<Value, ScriptError> {
    let mut bound_args = Vec::new();
    let mut bound_self = None;
    let mut anchor = None;
    for extra in &args[1..] {
        match extra {
            Value::List(l) => bound_args = l.borrow().clone(),
            Value::Dict(d) => bound_self = Some(Rc::clone(d)),
            _ => return Err(ScriptError::InvalidArgument),
        }
    }
    let target = match &args[0] {
        Value::Funcref(f) => {
            let mut all = f.bound_args.clone();
            all.extend(bound_args);
            bound_args = all;
            bound_self = bound_self.or_else(|| f.bound_self.clone());
            anchor = f.anchor.clone();
            f.target.clone()
        }
        v => FuncTarget::Named(interp.funcref_name(frame, &v.to_str()?)?),
    };
    Ok(Value::Funcref(Rc::new(Funcref {
        target,
        bound_args,
        bound_self,
        anchor,
    })))
}

/// `filter()` and `map()`. String expressions see `v:key` and `v:val`;
/// funcrefs get `(key, val)`.
fn filter_map(
    interp: &mut Interpreter,
    host: &mut dyn ScriptHost,
    frame: &Frame,
    is_map: bool,
    container: &Value,
    func: &Value,
) -> Result<Value, ScriptError> {
    let expr = match func {
        Value::Funcref(_) => None,
        other => Some(parse_expression(&other.to_str()?)?),
    };
    match container {
        Value::List(list) => {
            let items = list.borrow().clone();
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let result = apply(interp, host, frame, expr.as_ref(), func, Value::Number(i as i64), item.clone())?;
                if is_map {
                    out.push(result);
                } else if result.truthy()? {
                    out.push(item);
                }
            }
            *list.borrow_mut() = out;
        }
        Value::Dict(dict) => {
            let items = dict.borrow().clone();
            let mut out = BTreeMap::new();
            for (k, v) in items {
                let result = apply(interp, host, frame, expr.as_ref(), func, Value::str(k.clone()), v.clone())?;
                if is_map {
                    out.insert(k, result);
                } else if result.truthy()? {
                    out.insert(k, v);
                }
            }
            *dict.borrow_mut() = out;
        }
        _ => return Err(ScriptError::ListRequired),
    }
    Ok(container.clone())
}

fn apply(
    interp: &mut Interpreter,
    host: &mut dyn ScriptHost,
    frame: &Frame,
    expr: Option<&Expr>,
    func: &Value,
    key: Value,
    val: Value,
) -> Result<Value, ScriptError> {
    match (expr, func) {
        (Some(expr), _) => {
            interp.set_vim_var("key", key);
            interp.set_vim_var("val", val);
            interp.eval(host, frame, expr)
        }
        (None, Value::Funcref(f)) => interp.call_funcref(host, frame, f, vec![key, val], None),
        (None, _) => Err(ScriptError::InvalidArgument),
    }
}

fn sort(
    interp: &mut Interpreter,
    host: &mut dyn ScriptHost,
    frame: &Frame,
    list: &Value,
    how: Option<Value>,
) -> Result<Value, ScriptError> {
    let list_ref = list.as_list()?;
    let mut items = list_ref.borrow().clone();
    let mut failure = None;
    match how {
        Some(Value::Funcref(f)) => items.sort_by(|a, b| {
            if failure.is_some() {
                return Ordering::Equal;
            }
            match interp.call_funcref(host, frame, &f, vec![a.clone(), b.clone()], None) {
                Ok(v) => v.to_number().unwrap_or(0).cmp(&0),
                Err(e) => {
                    failure = Some(e);
                    Ordering::Equal
                }
            }
        }),
        Some(Value::Str(s)) if s == "n" => {
            items.sort_by(|a, b| {
                a.to_number()
                    .unwrap_or(0)
                    .cmp(&b.to_number().unwrap_or(0))
            });
        }
        Some(v) => {
            let ic = matches!(&v, Value::Str(s) if s == "i") || matches!(v, Value::Number(1));
            items.sort_by(|a, b| {
                let (a, b) = (a.to_echo(), b.to_echo());
                if ic {
                    a.to_lowercase().cmp(&b.to_lowercase())
                } else {
                    a.cmp(&b)
                }
            });
        }
        None => items.sort_by(|a, b| {
            ordering(a, b, false).unwrap_or_else(|_| a.to_echo().cmp(&b.to_echo()))
        }),
    }
    if let Some(err) = failure {
        return Err(err);
    }
    *list_ref.borrow_mut() = items;
    Ok(list.clone())
}

fn range(args: &[Value]) -> Result<Value, ScriptError> {
    let nums: Vec<i64> = args.iter().map(Value::to_number).collect::<Result<_, _>>()?;
    let (start, end, stride) = match nums.as_slice() {
        [n] => (0, n - 1, 1),
        [a, b] => (*a, *b, 1),
        [a, b, s] => (*a, *b, *s),
        _ => return Err(ScriptError::InvalidArgument),
    };
    if stride == 0 {
        return Err(ScriptError::StrideZero);
    }
    let mut out = Vec::new();
    let mut i = start;
    while (stride > 0 && i <= end) || (stride < 0 && i >= end) {
        out.push(Value::Number(i));
        i += stride;
    }
    Ok(Value::list(out))
}

fn remove(args: &[Value]) -> Result<Value, ScriptError> {
    match &args[0] {
        Value::List(l) => {
            let mut l = l.borrow_mut();
            let first = list_index(l.len(), args[1].to_number()?)?;
            match args.get(2) {
                None => Ok(l.remove(first)),
                Some(end) => {
                    let last = list_index(l.len(), end.to_number()?)?;
                    if last < first {
                        return Err(ScriptError::InvalidArgumentValue(last.to_string()));
                    }
                    Ok(Value::list(l.drain(first..=last).collect()))
                }
            }
        }
        Value::Dict(d) => {
            let key = args[1].to_str()?;
            d.borrow_mut()
                .remove(&key)
                .ok_or(ScriptError::KeyNotPresent(key))
        }
        _ => Err(ScriptError::ListRequired),
    }
}

fn split_on_pattern(
    host: &dyn ScriptHost,
    text: &str,
    pattern: &str,
    ic: bool,
) -> Result<Vec<String>, ScriptError> {
    let mut out = Vec::new();
    let mut from = 0;
    let mut search = 0;
    while search <= text.len() {
        let Some((a, b)) = host.regex().find(pattern, text, search, ic)? else {
            break;
        };
        if b == a {
            // Empty match: split between characters.
            let step = text[a..].chars().next().map_or(1, char::len_utf8);
            if a > from {
                out.push(text[from..a].to_string());
                from = a;
            }
            search = a + step;
            continue;
        }
        out.push(text[from..a].to_string());
        from = b;
        search = b;
    }
    out.push(text[from..].to_string());
    Ok(out)
}

/// `printf()` with `%s`, `%d`, `%x`, `%X`, `%o`, `%c`, `%f` and `%%`, plus
/// `-`/`0` flags, width and precision.
fn printf(fmt: &str, args: &[Value]) -> Result<String, ScriptError> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut left = false;
        let mut zero = false;
        while let Some(&f) = chars.peek() {
            match f {
                '-' => left = true,
                '0' => zero = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            precision = Some(p);
        }
        let Some(conv) = chars.next() else {
            out.push('%');
            break;
        };
        if conv == '%' {
            out.push('%');
            continue;
        }
        let value = args
            .next()
            .ok_or_else(|| ScriptError::InvalidArgumentValue(fmt.to_string()))?;
        let body = match conv {
            's' => {
                let s = value.to_echo();
                match precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                }
            }
            'd' => value.to_number()?.to_string(),
            'x' => format!("{:x}", value.to_number()?),
            'X' => format!("{:X}", value.to_number()?),
            'o' => format!("{:o}", value.to_number()?),
            'c' => char::from_u32(value.to_number()? as u32)
                .map(String::from)
                .unwrap_or_default(),
            'f' => format!("{:.*}", precision.unwrap_or(6), value.to_float()?),
            other => return Err(ScriptError::InvalidArgumentValue(format!("%{other}"))),
        };
        let pad = width.saturating_sub(body.chars().count());
        if left {
            out.push_str(&body);
            out.extend(std::iter::repeat_n(' ', pad));
        } else if zero && conv != 's' {
            let (sign, digits) = match body.strip_prefix('-') {
                Some(d) => ("-", d),
                None => ("", body.as_str()),
            };
            out.push_str(sign);
            out.extend(std::iter::repeat_n('0', pad));
            out.push_str(digits);
        } else {
            out.extend(std::iter::repeat_n(' ', pad));
            out.push_str(&body);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn printf_formats() {
        let args = [Value::Number(7), Value::str("ab"), Value::Number(255)];
        assert_eq!(printf("%03d|%-4s|%x%%", &args).unwrap(), "007|ab  |ff%");
        assert_eq!(printf("%.2f", &[Value::Float(1.005)]).unwrap(), "1.00");
    }

    #[test]
    fn range_arguments() {
        let r = range(&[Value::Number(3)]).unwrap();
        assert_eq!(r.to_repr(), "[0, 1, 2]");
        let r = range(&[Value::Number(5), Value::Number(1), Value::Number(-2)]).unwrap();
        assert_eq!(r.to_repr(), "[5, 3, 1]");
        assert_eq!(
            range(&[Value::Number(1), Value::Number(2), Value::Number(0)])
                .unwrap_err()
                .to_string(),
            "E726: Stride is zero"
        );
    }

    #[test]
    fn remove_from_list_and_dict() {
        let list = Value::list(vec![1.into(), 2.into(), 3.into()]);
        assert_eq!(remove(&[list.clone(), Value::Number(-1)]).unwrap(), Value::Number(3));
        assert_eq!(list.to_repr(), "[1, 2]");
        let dict = Value::dict(BTreeMap::from([("a".to_string(), Value::Number(1))]));
        assert!(matches!(
            remove(&[dict, Value::str("b")]),
            Err(ScriptError::KeyNotPresent(_))
        ));
    }

    #[test]
    fn builtin_names_are_unique_and_sorted() {
        let names: Vec<&str> = BUILTINS.iter().map(|(n, _, _)| *n).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }
}
