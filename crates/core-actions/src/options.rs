//! Session option store behind `:set`, `&option` and `exists('&name')`.
//!
//! Only options the dispatcher or the interpreter actually consult are
//! known; anything else is `E518`.

use std::collections::BTreeMap;
use std::fmt;

use core_config::Config;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Number(i64),
    String(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", i64::from(*b)),
            OptionValue::Number(n) => write!(f, "{n}"),
            OptionValue::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("E518: Unknown option: {0}")]
    Unknown(String),
    #[error("E521: Number required after =: {0}")]
    NumberRequired(String),
    #[error("E474: Invalid argument: {0}")]
    InvalidArgument(String),
}

struct OptionDef {
    name: &'static str,
    short: &'static str,
    default: fn() -> OptionValue,
}

const OPTIONS: &[OptionDef] = &[
    OptionDef {
        name: "gdefault",
        short: "gd",
        default: || OptionValue::Bool(false),
    },
    OptionDef {
        name: "ignorecase",
        short: "ic",
        default: || OptionValue::Bool(false),
    },
    OptionDef {
        name: "maxfuncdepth",
        short: "mfd",
        default: || OptionValue::Number(100),
    },
    OptionDef {
        name: "maxmapdepth",
        short: "mmd",
        default: || OptionValue::Number(1000),
    },
    OptionDef {
        name: "selection",
        short: "sel",
        default: || OptionValue::String("inclusive".into()),
    },
    OptionDef {
        name: "shiftwidth",
        short: "sw",
        default: || OptionValue::Number(8),
    },
    OptionDef {
        name: "smartcase",
        short: "scs",
        default: || OptionValue::Bool(false),
    },
    OptionDef {
        name: "textwidth",
        short: "tw",
        default: || OptionValue::Number(0),
    },
    OptionDef {
        name: "timeout",
        short: "to",
        default: || OptionValue::Bool(true),
    },
    OptionDef {
        name: "timeoutlen",
        short: "tm",
        default: || OptionValue::Number(1000),
    },
    OptionDef {
        name: "wrapscan",
        short: "ws",
        default: || OptionValue::Bool(true),
    },
];

fn canonical(name: &str) -> Option<&'static str> {
    OPTIONS
        .iter()
        .find(|d| d.name == name || d.short == name)
        .map(|d| d.name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    values: BTreeMap<&'static str, OptionValue>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            values: OPTIONS.iter().map(|d| (d.name, (d.default)())).collect(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut opts = Self::default();
        let input = &config.file.input;
        let script = &config.file.script;
        opts.values.insert("timeout", OptionValue::Bool(input.timeout));
        opts.values
            .insert("timeoutlen", OptionValue::Number(i64::from(input.timeoutlen)));
        opts.values
            .insert("maxmapdepth", OptionValue::Number(i64::from(input.maxmapdepth)));
        opts.values
            .insert("maxfuncdepth", OptionValue::Number(i64::from(script.maxfuncdepth)));
        opts.values.insert("ignorecase", OptionValue::Bool(script.ignorecase));
        opts
    }

    /// Full name for a full or short option name.
    pub fn canonical_name(name: &str) -> Option<&'static str> {
        canonical(name)
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(canonical(name)?)
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(OptionValue::Bool(true)))
    }

    pub fn number(&self, name: &str) -> i64 {
        match self.get(name) {
            Some(OptionValue::Number(n)) => *n,
            Some(OptionValue::Bool(b)) => i64::from(*b),
            _ => 0,
        }
    }

    /// Store `value`, converting it to the option's type.
    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<(), OptionError> {
        let key = canonical(name).ok_or_else(|| OptionError::Unknown(name.to_string()))?;
        let converted = match (&self.values[key], value) {
            (OptionValue::Bool(_), OptionValue::Bool(b)) => OptionValue::Bool(b),
            (OptionValue::Bool(_), OptionValue::Number(n)) => OptionValue::Bool(n != 0),
            (OptionValue::Number(_), OptionValue::Number(n)) => OptionValue::Number(n),
            (OptionValue::Number(_), OptionValue::String(s)) => {
                OptionValue::Number(s.trim().parse().map_err(|_| OptionError::NumberRequired(s))?)
            }
            (OptionValue::String(_), OptionValue::String(s)) => OptionValue::String(s),
            (OptionValue::String(_), OptionValue::Number(n)) => OptionValue::String(n.to_string()),
            (_, other) => return Err(OptionError::InvalidArgument(format!("{name}={other}"))),
        };
        debug!(target: "runtime.options", option = key, value = %converted, "option_set");
        self.values.insert(key, converted);
        Ok(())
    }

    /// Apply one `:set` argument. Returns text to echo for queries.
    pub fn apply(&mut self, arg: &str) -> Result<Option<String>, OptionError> {
        if arg == "all" {
            return Ok(Some(self.listing()));
        }
        if let Some((name, op, value)) = split_assignment(arg) {
            let key = canonical(name).ok_or_else(|| OptionError::Unknown(name.to_string()))?;
            let current = self.values[key].clone();
            let new = match (&current, op) {
                (OptionValue::Bool(_), _) => {
                    return Err(OptionError::InvalidArgument(arg.to_string()));
                }
                (OptionValue::Number(n), op) => {
                    let v: i64 = value
                        .parse()
                        .map_err(|_| OptionError::NumberRequired(arg.to_string()))?;
                    OptionValue::Number(match op {
                        "+=" => n + v,
                        "-=" => n - v,
                        "^=" => n * v,
                        _ => v,
                    })
                }
                (OptionValue::String(s), "+=") => OptionValue::String(format!("{s}{value}")),
                (OptionValue::String(s), "^=") => OptionValue::String(format!("{value}{s}")),
                (OptionValue::String(s), "-=") => OptionValue::String(s.replace(value, "")),
                (OptionValue::String(_), _) => OptionValue::String(value.to_string()),
            };
            self.set(key, new)?;
            return Ok(None);
        }
        if let Some(name) = arg.strip_suffix('?') {
            let key = canonical(name).ok_or_else(|| OptionError::Unknown(name.to_string()))?;
            return Ok(Some(self.show(key)));
        }
        let (name, toggle) = match arg.strip_suffix('!') {
            Some(n) => (n, true),
            None => (arg, false),
        };
        let name = name.strip_prefix("inv").filter(|n| canonical(n).is_some());
        let (name, toggle) = match name {
            Some(n) => (n, true),
            None => (arg.trim_end_matches('!'), toggle),
        };
        if let Some(key) = canonical(name) {
            return match &self.values[key] {
                OptionValue::Bool(b) => {
                    let value = if toggle { !*b } else { true };
                    self.set(key, OptionValue::Bool(value))?;
                    Ok(None)
                }
                _ if toggle => Err(OptionError::InvalidArgument(arg.to_string())),
                _ => Ok(Some(self.show(key))),
            };
        }
        if let Some(key) = name.strip_prefix("no").and_then(canonical)
            && matches!(self.values[key], OptionValue::Bool(_))
        {
            self.set(key, OptionValue::Bool(false))?;
            return Ok(None);
        }
        Err(OptionError::Unknown(arg.to_string()))
    }

    fn show(&self, key: &str) -> String {
        match &self.values[key] {
            OptionValue::Bool(true) => format!("  {key}"),
            OptionValue::Bool(false) => format!("no{key}"),
            other => format!("  {key}={other}"),
        }
    }

    fn listing(&self) -> String {
        let mut out = String::from("--- Options ---");
        for key in self.values.keys() {
            out.push('\n');
            out.push_str(&self.show(key));
        }
        out
    }
}

fn split_assignment(arg: &str) -> Option<(&str, &'static str, &str)> {
    let idx = arg.find(['=', ':'])?;
    let (head, value) = (&arg[..idx], &arg[idx + 1..]);
    for op in ["+", "-", "^"] {
        if let Some(name) = head.strip_suffix(op) {
            let op = match op {
                "+" => "+=",
                "-" => "-=",
                _ => "^=",
            };
            return Some((name, op, value));
        }
    }
    Some((head, "=", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn boolean_forms() {
        let mut o = Options::new();
        o.apply("ic").unwrap();
        assert!(o.flag("ignorecase"));
        o.apply("noic").unwrap();
        assert!(!o.flag("ignorecase"));
        o.apply("invic").unwrap();
        assert!(o.flag("ignorecase"));
        o.apply("ignorecase!").unwrap();
        assert!(!o.flag("ignorecase"));
        assert_eq!(o.apply("ic?").unwrap().as_deref(), Some("noignorecase"));
    }

    #[test]
    fn number_forms() {
        let mut o = Options::new();
        o.apply("tm=250").unwrap();
        assert_eq!(o.number("timeoutlen"), 250);
        o.apply("timeoutlen+=50").unwrap();
        assert_eq!(o.number("tm"), 300);
        o.apply("sw-=4").unwrap();
        assert_eq!(o.number("shiftwidth"), 4);
        assert_eq!(o.apply("tm").unwrap().as_deref(), Some("  timeoutlen=300"));
        assert_eq!(
            o.apply("tm=abc").unwrap_err().to_string(),
            "E521: Number required after =: tm=abc"
        );
    }

    #[test]
    fn unknown_option() {
        let mut o = Options::new();
        assert_eq!(
            o.apply("frobnicate").unwrap_err().to_string(),
            "E518: Unknown option: frobnicate"
        );
        assert_eq!(
            o.apply("nofrob").unwrap_err().to_string(),
            "E518: Unknown option: nofrob"
        );
    }

    #[test]
    fn seeded_from_config() {
        let cfg = Config::from_toml("[input]\ntimeout = false\ntimeoutlen = 40\n").unwrap();
        let o = Options::from_config(&cfg);
        assert!(!o.flag("timeout"));
        assert_eq!(o.number("timeoutlen"), 40);
        assert_eq!(o.number("maxmapdepth"), 1000);
    }
}
