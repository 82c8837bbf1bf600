//! Runtime values and Vim's coercion rules.
//!
//! Lists and dictionaries have reference semantics (`let b = a` aliases), so
//! they live behind `Rc<RefCell<..>>`; `copy()`/`deepcopy()` break the alias.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::ScriptError;
use crate::ast::LambdaDef;
use crate::functions::FunctionKey;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictRef = Rc<RefCell<BTreeMap<String, Value>>>;
/// A variable scope (`g:`, `l:`, `a:`, `s:` of one script, ...).
pub type ScopeRef = Rc<RefCell<BTreeMap<String, Value>>>;

pub fn new_scope() -> ScopeRef {
    Rc::new(RefCell::new(BTreeMap::new()))
}

#[derive(Debug, Clone)]
pub enum FuncTarget {
    /// Resolved through the function table at call time.
    Named(String),
    Lambda {
        id: u32,
        def: Rc<LambdaDef>,
        /// Local scopes visible where the lambda was created, innermost first.
        captured: Vec<ScopeRef>,
        /// Script the lambda was created in.
        script: Option<crate::functions::ScriptId>,
    },
}

#[derive(Debug, Clone)]
pub struct Funcref {
    pub target: FuncTarget,
    pub bound_args: Vec<Value>,
    pub bound_self: Option<DictRef>,
    /// Keeps a numbered dictionary function alive while this reference exists.
    pub anchor: Option<Rc<FunctionKey>>,
}

impl Funcref {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            target: FuncTarget::Named(name.into()),
            bound_args: Vec::new(),
            bound_self: None,
            anchor: None,
        }
    }

    /// Reference to the numbered function `anchor` names.
    pub fn anchored(anchor: Rc<FunctionKey>) -> Self {
        Self {
            anchor: Some(Rc::clone(&anchor)),
            ..Self::named(anchor.display_name())
        }
    }

    pub fn name(&self) -> String {
        match &self.target {
            FuncTarget::Named(n) => n.clone(),
            FuncTarget::Lambda { id, .. } => format!("<lambda>{id}"),
        }
    }

    fn same_target(&self, other: &Funcref) -> bool {
        match (&self.target, &other.target) {
            (FuncTarget::Named(a), FuncTarget::Named(b)) => a == b,
            (FuncTarget::Lambda { id: a, .. }, FuncTarget::Lambda { id: b, .. }) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Number(i64),
    Float(f64),
    Str(String),
    List(ListRef),
    Dict(DictRef),
    Funcref(Rc<Funcref>),
    Bool(bool),
    /// `v:null` / `v:none`
    None,
}

/// `type()` codes.
pub mod type_code {
    pub const NUMBER: i64 = 0;
    pub const STRING: i64 = 1;
    pub const FUNCREF: i64 = 2;
    pub const LIST: i64 = 3;
    pub const DICT: i64 = 4;
    pub const FLOAT: i64 = 5;
    pub const BOOL: i64 = 6;
    pub const NONE: i64 = 7;
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(entries: BTreeMap<String, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn bool(b: bool) -> Self {
        Value::Number(i64::from(b))
    }

    pub fn type_code(&self) -> i64 {
        match self {
            Value::Number(_) => type_code::NUMBER,
            Value::Str(_) => type_code::STRING,
            Value::Funcref(_) => type_code::FUNCREF,
            Value::List(_) => type_code::LIST,
            Value::Dict(_) => type_code::DICT,
            Value::Float(_) => type_code::FLOAT,
            Value::Bool(_) => type_code::BOOL,
            Value::None => type_code::NONE,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Funcref(_) => "Funcref",
            Value::List(_) => "List",
            Value::Dict(_) => "Dictionary",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Boolean",
            Value::None => "None",
        }
    }

    pub fn to_number(&self) -> Result<i64, ScriptError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Str(s) => Ok(str_to_number(s)),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::None => Ok(0),
            Value::Float(_) => Err(ScriptError::FloatAsNumber),
            Value::List(_) => Err(ScriptError::ListAsNumber),
            Value::Dict(_) => Err(ScriptError::DictAsNumber),
            Value::Funcref(_) => Err(ScriptError::FuncrefAsNumber),
        }
    }

    pub fn to_float(&self) -> Result<f64, ScriptError> {
        match self {
            Value::Float(f) => Ok(*f),
            other => other.to_number().map(|n| n as f64),
        }
    }

    /// String conversion used by concatenation and string arguments.
    pub fn to_str(&self) -> Result<String, ScriptError> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(if *b { "v:true" } else { "v:false" }.to_string()),
            Value::None => Ok("v:null".to_string()),
            Value::Float(_) => Err(ScriptError::FloatAsString),
            Value::List(_) => Err(ScriptError::ListAsString),
            Value::Dict(_) => Err(ScriptError::DictAsString),
            Value::Funcref(_) => Err(ScriptError::FuncrefAsString),
        }
    }

    pub fn truthy(&self) -> Result<bool, ScriptError> {
        match self {
            Value::Float(f) => Ok(*f != 0.0),
            other => Ok(other.to_number()? != 0),
        }
    }

    pub fn as_list(&self) -> Result<&ListRef, ScriptError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(ScriptError::ListRequired),
        }
    }

    pub fn as_dict(&self) -> Result<&DictRef, ScriptError> {
        match self {
            Value::Dict(d) => Ok(d),
            _ => Err(ScriptError::DictRequired),
        }
    }

    /// Text shown by `:echo`: strings raw, everything else as `string()`.
    pub fn to_echo(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_repr(),
        }
    }

    /// `string()` representation.
    pub fn to_repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        match self {
            Value::Number(n) => {
                let _ = write!(out, "{n}");
            }
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => {
                out.push('\'');
                out.push_str(&s.replace('\'', "''"));
                out.push('\'');
            }
            Value::Bool(b) => out.push_str(if *b { "v:true" } else { "v:false" }),
            Value::None => out.push_str("v:null"),
            Value::List(l) => {
                if depth > 100 {
                    out.push_str("[...]");
                    return;
                }
                out.push('[');
                for (i, v) in l.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    v.write_repr(out, depth + 1);
                }
                out.push(']');
            }
            Value::Dict(d) => {
                if depth > 100 {
                    out.push_str("{...}");
                    return;
                }
                out.push('{');
                for (i, (k, v)) in d.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "'{}': ", k.replace('\'', "''"));
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Funcref(f) => {
                let _ = write!(out, "function('{}'", f.name());
                if !f.bound_args.is_empty() {
                    out.push_str(", ");
                    Value::list(f.bound_args.clone()).write_repr(out, depth + 1);
                }
                if let Some(d) = &f.bound_self {
                    out.push_str(", ");
                    Value::Dict(d.clone()).write_repr(out, depth + 1);
                }
                out.push(')');
            }
        }
    }

    /// `copy()` when `deep` is false, `deepcopy()` otherwise.
    pub fn copy(&self, deep: bool) -> Value {
        match self {
            Value::List(l) => Value::list(
                l.borrow()
                    .iter()
                    .map(|v| if deep { v.copy(true) } else { v.clone() })
                    .collect(),
            ),
            Value::Dict(d) => Value::dict(
                d.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), if deep { v.copy(true) } else { v.clone() }))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// `==` with Vim's loose rules; `ic` folds case for strings.
    pub fn loose_eq(&self, other: &Value, ic: bool) -> Result<bool, ScriptError> {
        Ok(match (self, other) {
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.strict_type_eq(y, ic)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::List(_), _) | (_, Value::List(_)) => return Err(ScriptError::CompareList),
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (k, x) in a.iter() {
                    match b.get(k) {
                        Some(y) if x.strict_type_eq(y, ic)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Value::Dict(_), _) | (_, Value::Dict(_)) => return Err(ScriptError::CompareDict),
            (Value::Funcref(a), Value::Funcref(b)) => a.same_target(b),
            (Value::Funcref(_), _) | (_, Value::Funcref(_)) => false,
            (Value::Str(a), Value::Str(b)) => {
                if ic {
                    a.to_lowercase() == b.to_lowercase()
                } else {
                    a == b
                }
            }
            (Value::Float(_), _) | (_, Value::Float(_)) => self.to_float()? == other.to_float()?,
            _ => self.to_number()? == other.to_number()?,
        })
    }

    /// Equality inside containers: values of different types are unequal.
    fn strict_type_eq(&self, other: &Value, ic: bool) -> Result<bool, ScriptError> {
        if self.type_code() != other.type_code() {
            return Ok(false);
        }
        self.loose_eq(other, ic)
    }

    /// `is`: identity for containers, type-strict equality otherwise.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Funcref(a), Value::Funcref(b)) => a.same_target(b),
            _ => self.strict_type_eq(other, false).unwrap_or(false),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_type_eq(other, false).unwrap_or(false)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Leading numeric prefix of `s` (`"12abc"` is 12, `"abc"` is 0). Hex and
/// binary prefixes are honoured.
pub fn str_to_number(s: &str) -> i64 {
    let t = s.trim_start();
    let (neg, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let lower = body.get(..2).map(|p| p.to_ascii_lowercase());
    let (radix, digits) = match lower.as_deref() {
        Some("0x") => (16, &body[2..]),
        Some("0b") => (2, &body[2..]),
        _ => (10, body),
    };
    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    let n = i64::from_str_radix(&digits[..end], radix).unwrap_or(if end == 0 {
        0
    } else {
        i64::MAX
    });
    if neg { -n } else { n }
}

/// Float text the way `:echo` prints it (`1.0`, `3.141593`, `1.0e20`).
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs == 0.0 || (1e-3..1e7).contains(&abs) {
        let mut s = format!("{f:.6}");
        while s.ends_with('0') && !s.ends_with(".0") {
            s.pop();
        }
        return s;
    }
    let exp = abs.log10().floor() as i32;
    let mantissa = f / 10f64.powi(exp);
    let mut m = format!("{mantissa:.6}");
    while m.ends_with('0') && !m.ends_with(".0") {
        m.pop();
    }
    format!("{m}e{exp}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn string_to_number_prefix() {
        assert_eq!(str_to_number("12abc"), 12);
        assert_eq!(str_to_number("abc"), 0);
        assert_eq!(str_to_number("-7"), -7);
        assert_eq!(str_to_number("0x1f"), 31);
        assert_eq!(Value::str("3").to_number().unwrap(), 3);
    }

    #[test]
    fn repr_of_nested_values() {
        let v = Value::list(vec![
            Value::Number(1),
            Value::str("it's"),
            Value::list(vec![]),
            Value::dict(BTreeMap::from([("k".to_string(), Value::Float(1.5))])),
        ]);
        assert_eq!(v.to_repr(), "[1, 'it''s', [], {'k': 1.5}]");
        assert_eq!(v.to_echo(), v.to_repr());
        assert_eq!(Value::str("raw").to_echo(), "raw");
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(3.14159265), "3.141593");
        assert_eq!(format_float(1e20), "1.0e20");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn container_coercions_fail_with_codes() {
        let l = Value::list(vec![]);
        assert_eq!(l.to_number().unwrap_err().to_string(), "E745: Using a List as a Number");
        assert_eq!(l.to_str().unwrap_err().to_string(), "E730: Using List as a String");
        assert_eq!(
            l.loose_eq(&Value::Number(1), false).unwrap_err(),
            ScriptError::CompareList
        );
    }

    #[test]
    fn equality_is_loose_at_top_level_and_strict_inside() {
        assert!(Value::str("1").loose_eq(&Value::Number(1), false).unwrap());
        let a = Value::list(vec![Value::str("1")]);
        let b = Value::list(vec![Value::Number(1)]);
        assert!(!a.loose_eq(&b, false).unwrap());
        assert!(Value::str("ABC").loose_eq(&Value::str("abc"), true).unwrap());
    }

    #[test]
    fn copy_breaks_aliasing() {
        let inner = Value::list(vec![Value::Number(1)]);
        let outer = Value::list(vec![inner.clone()]);
        let shallow = outer.copy(false);
        let deep = outer.copy(true);
        inner.as_list().unwrap().borrow_mut().push(Value::Number(2));
        assert_eq!(shallow.to_repr(), "[[1, 2]]");
        assert_eq!(deep.to_repr(), "[[1]]");
    }
}
