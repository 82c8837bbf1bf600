//! Expression tokenizer.
//!
//! Tokens remember whether whitespace preceded them: `d.key` (member access)
//! and `a . b` (concatenation) differ only in spacing.

use core_events::parse_vim_script_string;

use crate::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(i64),
    Float(f64),
    Str(String),
    /// Identifier, possibly scoped (`g:x`, `a:0`) or autoloaded (`foo#bar`).
    Ident(String),
    Option(String),
    Register(char),
    Env(String),
    /// Punctuation and operators, including comparison variants such as `==#`.
    Op(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub space_before: bool,
    /// Byte offset in the source text.
    pub offset: usize,
}

/// Operators, longest first so that greedy matching works.
const OPERATORS: &[&str] = &[
    "..=", "==#", "==?", "!=#", "!=?", ">=#", ">=?", "<=#", "<=?", "=~#", "=~?", "!~#", "!~?",
    "...", "#{", "..", "==", "!=", ">=", "<=", "=~", "!~", "&&", "||", "->", "+=", "-=", "*=",
    "/=", "%=", ".=", ">#", ">?", "<#", "<?", "(", ")", "[", "]", "{", "}", ",", ":", "?", ".",
    "+", "-", "*", "/", "%", "!", "<", ">", "=", ";",
];

pub fn tokenize(src: &str) -> Result<Vec<Token>, ScriptError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut space_before = false;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b' ' || c == b'\t' {
            space_before = true;
            i += 1;
            continue;
        }
        let start = i;
        let tok = match c {
            b'0'..=b'9' => {
                let (tok, len) = lex_number(&src[i..]);
                i += len;
                tok
            }
            b'\'' => {
                let (s, len) = lex_single_quoted(&src[i..])?;
                i += len;
                Tok::Str(s)
            }
            b'"' => match lex_double_quoted(&src[i..]) {
                Ok((s, len)) => {
                    i += len;
                    Tok::Str(s)
                }
                // An unterminated quote after an operand starts a comment.
                Err(_) if space_before && !out.is_empty() => break,
                Err(e) => return Err(e),
            },
            b'&' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic()) => {
                let len = ident_len(&src[i + 1..], true);
                let name = src[i + 1..i + 1 + len].to_string();
                i += 1 + len;
                Tok::Option(name)
            }
            b'@' => {
                let reg = src[i + 1..].chars().next().unwrap_or('"');
                i += 1 + reg.len_utf8();
                Tok::Register(reg)
            }
            b'$' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') => {
                let len = src[i + 1..]
                    .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                    .unwrap_or(src.len() - i - 1);
                let name = src[i + 1..i + 1 + len].to_string();
                i += 1 + len;
                Tok::Env(name)
            }
            b'<' if src[i..].starts_with("<SID>") => {
                let len = ident_len(&src[i + 5..], false);
                let name = format!("s:{}", &src[i + 5..i + 5 + len]);
                i += 5 + len;
                Tok::Ident(name)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let len = ident_len(&src[i..], true);
                let mut name = src[i..i + len].to_string();
                i += len;
                // `is#`, `isnot?`: comparison case suffixes stick to the keyword.
                if (name == "is" || name == "isnot")
                    && let Some(sfx @ (b'#' | b'?')) = bytes.get(i).copied()
                {
                    name.push(sfx as char);
                    i += 1;
                }
                Tok::Ident(name)
            }
            _ => {
                let rest = &src[i..];
                let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                    return Err(ScriptError::InvalidExpression(src.to_string()));
                };
                i += op.len();
                Tok::Op(op)
            }
        };
        out.push(Token {
            tok,
            space_before,
            offset: start,
        });
        space_before = false;
    }
    Ok(out)
}

/// Length of an identifier at the start of `s`. With `scoped`, a leading
/// `x:` scope prefix is included when a name (or digit, for `a:0`) follows.
fn ident_len(s: &str, scoped: bool) -> usize {
    let b = s.as_bytes();
    let mut i = 0;
    if scoped
        && b.len() > 2
        && b[1] == b':'
        && b"gslavbwt".contains(&b[0])
        && (b[2].is_ascii_alphanumeric() || b[2] == b'_')
    {
        i = 2;
    }
    while i < b.len() {
        let c = b[i];
        let autoload = c == b'#' && b.get(i + 1).is_some_and(|n| n.is_ascii_alphanumeric() || *n == b'_');
        if c.is_ascii_alphanumeric() || c == b'_' || autoload {
            i += 1;
        } else {
            break;
        }
    }
    i
}

fn lex_number(s: &str) -> (Tok, usize) {
    let b = s.as_bytes();
    let radix_prefix = |p: u8| b.len() > 2 && b[0] == b'0' && (b[1] | 0x20) == p;
    for (p, radix) in [(b'x', 16), (b'b', 2), (b'o', 8)] {
        if radix_prefix(p) {
            let digits: usize = s[2..]
                .find(|c: char| !c.is_digit(radix))
                .unwrap_or(s.len() - 2);
            if digits > 0 {
                let n = i64::from_str_radix(&s[2..2 + digits], radix).unwrap_or(i64::MAX);
                return (Tok::Number(n), 2 + digits);
            }
        }
    }
    let int_len = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    // Float: digits '.' digits [e[+-]digits]
    if b.get(int_len) == Some(&b'.') && b.get(int_len + 1).is_some_and(|c| c.is_ascii_digit()) {
        let mut end = int_len + 1;
        while end < b.len() && b[end].is_ascii_digit() {
            end += 1;
        }
        if end < b.len() && (b[end] | 0x20) == b'e' {
            let mut exp = end + 1;
            if exp < b.len() && (b[exp] == b'+' || b[exp] == b'-') {
                exp += 1;
            }
            if exp < b.len() && b[exp].is_ascii_digit() {
                while exp < b.len() && b[exp].is_ascii_digit() {
                    exp += 1;
                }
                end = exp;
            }
        }
        let f = s[..end].parse().unwrap_or(0.0);
        return (Tok::Float(f), end);
    }
    let text = &s[..int_len];
    let n = if text.len() > 1 && text.starts_with('0') && text.bytes().all(|d| d < b'8') {
        i64::from_str_radix(text, 8).unwrap_or(i64::MAX)
    } else {
        text.parse().unwrap_or(i64::MAX)
    };
    (Tok::Number(n), int_len)
}

fn lex_single_quoted(s: &str) -> Result<(String, usize), ScriptError> {
    let mut out = String::new();
    let mut iter = s.char_indices().skip(1).peekable();
    while let Some((i, c)) = iter.next() {
        if c == '\'' {
            if iter.peek().is_some_and(|(_, n)| *n == '\'') {
                iter.next();
                out.push('\'');
                continue;
            }
            return Ok((out, i + 1));
        }
        out.push(c);
    }
    Err(ScriptError::MissingSingleQuote(s.to_string()))
}

fn lex_double_quoted(s: &str) -> Result<(String, usize), ScriptError> {
    let b = s.as_bytes();
    let mut i = 1;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            b'"' => return Ok((parse_vim_script_string(&s[1..i]), i + 1)),
            _ => i += 1,
        }
    }
    Err(ScriptError::MissingDoubleQuote(s.to_string()))
}
