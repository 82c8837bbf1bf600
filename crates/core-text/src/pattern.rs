//! Vim's pattern dialect on top of the `regex` crate.
//!
//! Patterns are read with 'magic' set: `.`, `*`, `[]`, `^` and `$` are
//! special as typed; `\(`, `\)`, `\|`, `\+`, `\=`, `\?`, `\{n,m}`, `\<` and
//! `\>` carry a backslash. `\c` / `\C` anywhere in the pattern force case
//! folding on or off.

use ::regex::{Captures, Regex, RegexBuilder};
use core_state::HostError;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct VimRegex {
    regex: Regex,
}

impl VimRegex {
    pub fn new(pattern: &str, ignore_case: bool) -> Result<Self, HostError> {
        let invalid = || HostError::InvalidPattern(pattern.to_string());
        let (source, case) = translate(pattern).ok_or_else(invalid)?;
        trace!(target: "text.pattern", pattern, %source, "translated");
        let regex = RegexBuilder::new(&source)
            .case_insensitive(case.unwrap_or(ignore_case))
            .build()
            .map_err(|_| invalid())?;
        Ok(Self { regex })
    }

    /// Byte span of the first match starting at or after `start`.
    pub fn find_at(&self, haystack: &str, start: usize) -> Option<(usize, usize)> {
        if start > haystack.len() {
            return None;
        }
        self.regex
            .find_at(haystack, start)
            .map(|m| (m.start(), m.end()))
    }

    /// Last match starting before `before`.
    pub fn rfind_before(&self, haystack: &str, before: usize) -> Option<(usize, usize)> {
        self.regex
            .find_iter(haystack)
            .take_while(|m| m.start() < before)
            .last()
            .map(|m| (m.start(), m.end()))
    }

    /// Replace the first match (or all of them) using a Vim replacement
    /// string.
    pub fn substitute(&self, haystack: &str, replacement: &str, global: bool) -> String {
        let limit = if global { 0 } else { 1 };
        self.regex
            .replacen(haystack, limit, |caps: &Captures<'_>| expand(caps, replacement))
            .into_owned()
    }
}

/// Rewrite a magic Vim pattern into `regex` syntax. Returns the case
/// override from `\c` / `\C`, or `None` for an unsupported construct.
fn translate(pattern: &str) -> Option<(String, Option<bool>)> {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut case = None;
    let mut chars = pattern.chars().peekable();
    // `^` anchors and `*` repeats only where Vim treats them so.
    let mut at_start = true;
    while let Some(c) = chars.next() {
        let was_start = at_start;
        at_start = false;
        match c {
            '\\' => match chars.next() {
                None => out.push_str(r"\\"),
                Some('(') => {
                    out.push('(');
                    at_start = true;
                }
                Some(')') => out.push(')'),
                Some('|') => {
                    out.push('|');
                    at_start = true;
                }
                Some('+') => out.push('+'),
                Some('=' | '?') => out.push('?'),
                Some('{') => out.push_str(&brace_quantifier(&mut chars)?),
                Some('<' | '>') => out.push_str(r"\b"),
                Some(ch @ ('s' | 'S' | 'd' | 'D' | 'w' | 'W')) => {
                    out.push('\\');
                    out.push(ch);
                }
                Some('a') => out.push_str("[A-Za-z]"),
                Some('A') => out.push_str("[^A-Za-z]"),
                Some('l') => out.push_str("[a-z]"),
                Some('L') => out.push_str("[^a-z]"),
                Some('u') => out.push_str("[A-Z]"),
                Some('U') => out.push_str("[^A-Z]"),
                Some('x') => out.push_str("[0-9A-Fa-f]"),
                Some('X') => out.push_str("[^0-9A-Fa-f]"),
                Some('o') => out.push_str("[0-7]"),
                Some('h') => out.push_str("[A-Za-z_]"),
                Some('n') => out.push_str(r"\n"),
                Some('t') => out.push_str(r"\t"),
                Some('e') => out.push_str(r"\x1b"),
                Some('r') => out.push_str(r"\r"),
                Some('c') => case = Some(true),
                Some('C') => case = Some(false),
                Some(ch) if !ch.is_alphanumeric() => out.push_str(&::regex::escape(&ch.to_string())),
                Some(_) => return None,
            },
            '.' => out.push('.'),
            '*' if was_start => out.push_str(r"\*"),
            '*' => out.push('*'),
            '^' if was_start => out.push('^'),
            '$' if at_branch_end(&chars) => out.push('$'),
            '[' => match bracket_class(&mut chars) {
                Some(class) => out.push_str(&class),
                None => out.push_str(r"\["),
            },
            other => out.push_str(&::regex::escape(&other.to_string())),
        }
    }
    Some((out, case))
}

fn at_branch_end(chars: &std::iter::Peekable<std::str::Chars<'_>>) -> bool {
    let mut rest = chars.clone();
    match rest.next() {
        None => true,
        Some('\\') => matches!(rest.next(), Some(')' | '|')),
        Some(_) => false,
    }
}

/// `\{n,m}`, `\{n}`, `\{,m}`, `\{}` and their lazy `\{-...}` forms; the
/// opening `\{` is already consumed.
fn brace_quantifier(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut body = String::new();
    loop {
        match chars.next()? {
            '}' => break,
            '\\' if chars.peek() == Some(&'}') => {
                chars.next();
                break;
            }
            ch => body.push(ch),
        }
    }
    let (lazy, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body.as_str()),
    };
    if !body.chars().all(|c| c.is_ascii_digit() || c == ',') || body.matches(',').count() > 1 {
        return None;
    }
    let mut quant = match body {
        "" | "," => "*".to_string(),
        b if b.starts_with(',') => format!("{{0{b}}}"),
        b => format!("{{{b}}}"),
    };
    if lazy {
        quant.push('?');
    }
    Some(quant)
}

/// Copy a `[...]` collection; `None` when it never closes, in which case
/// the `[` is literal.
fn bracket_class(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut probe = chars.clone();
    let mut class = String::from("[");
    if probe.peek() == Some(&'^') {
        probe.next();
        class.push('^');
    }
    if probe.peek() == Some(&']') {
        probe.next();
        class.push_str(r"\]");
    }
    loop {
        match probe.next()? {
            ']' => break,
            '\\' => match probe.next()? {
                'n' => class.push_str(r"\n"),
                't' => class.push_str(r"\t"),
                'e' => class.push_str(r"\x1b"),
                ch => class.push_str(&::regex::escape(&ch.to_string())),
            },
            '[' if probe.peek() == Some(&':') => {
                class.push_str("[:");
                probe.next();
                loop {
                    let ch = probe.next()?;
                    class.push(ch);
                    if ch == ']' {
                        break;
                    }
                }
            }
            ch @ ('[' | '&' | '~') => {
                class.push('\\');
                class.push(ch);
            }
            ch => class.push(ch),
        }
    }
    class.push(']');
    *chars = probe;
    Some(class)
}

#[derive(Clone, Copy)]
enum Case {
    Upper,
    Lower,
}

impl Case {
    fn apply(self, c: char, out: &mut String) {
        match self {
            Case::Upper => out.extend(c.to_uppercase()),
            Case::Lower => out.extend(c.to_lowercase()),
        }
    }
}

/// `\u`/`\l` affect the next character, `\U`/`\L` everything up to `\e`
/// or `\E`.
#[derive(Default)]
struct CaseState {
    once: Option<Case>,
    span: Option<Case>,
}

impl CaseState {
    fn push(&mut self, out: &mut String, text: &str) {
        for c in text.chars() {
            match self.once.take().or(self.span) {
                Some(case) => case.apply(c, out),
                None => out.push(c),
            }
        }
    }
}

fn expand(caps: &Captures<'_>, template: &str) -> String {
    let mut out = String::new();
    let mut case = CaseState::default();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        match c {
            '&' => case.push(&mut out, caps.get(0).map_or("", |m| m.as_str())),
            '\r' => out.push('\n'),
            '\\' => match chars.next() {
                Some(d @ '0'..='9') => {
                    let idx = d as usize - '0' as usize;
                    case.push(&mut out, caps.get(idx).map_or("", |m| m.as_str()));
                }
                Some('r') => out.push('\n'),
                Some('n') => out.push('\0'),
                Some('t') => out.push('\t'),
                Some('u') => case.once = Some(Case::Upper),
                Some('l') => case.once = Some(Case::Lower),
                Some('U') => case.span = Some(Case::Upper),
                Some('L') => case.span = Some(Case::Lower),
                Some('e' | 'E') => case.span = None,
                Some(other) => case.push(&mut out, &other.to_string()),
                None => out.push('\\'),
            },
            other => case.push(&mut out, &other.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn src(pattern: &str) -> String {
        translate(pattern).map(|(s, _)| s).unwrap_or_default()
    }

    #[test]
    fn magic_translation() {
        assert_eq!(src(r"\(foo\|bar\)\+"), "(foo|bar)+");
        assert_eq!(src(r"\<word\>"), r"\bword\b");
        assert_eq!(src(r"a\{2,3}b\{-1,}"), "a{2,3}b{1,}?");
        assert_eq!(src("(x)?"), r"\(x\)\?");
        assert_eq!(src("*a^b$c$"), r"\*a\^b\$c$");
        assert_eq!(src("[a-z]*"), "[a-z]*");
        assert_eq!(src("[]x]"), r"[\]x]");
        assert_eq!(src("a["), r"a\[");
        assert_eq!(translate(r"\zs"), None);
    }

    #[test]
    fn case_overrides() {
        let re = VimRegex::new(r"foo\c", false).unwrap();
        assert_eq!(re.find_at("xFOO", 0), Some((1, 4)));
        let re = VimRegex::new(r"\Cfoo", true).unwrap();
        assert_eq!(re.find_at("FOO foo", 0), Some((4, 7)));
    }

    #[test]
    fn search_in_both_directions() {
        let re = VimRegex::new("ab", false).unwrap();
        assert_eq!(re.find_at("ab ab ab", 1), Some((3, 5)));
        assert_eq!(re.rfind_before("ab ab ab", 6), Some((3, 5)));
        assert_eq!(re.rfind_before("ab ab ab", 0), None);
        assert_eq!(re.find_at("ab", 9), None);
    }

    #[test]
    fn replacement_syntax() {
        let re = VimRegex::new(r"\(\w\+\)=\(\w\+\)", false).unwrap();
        assert_eq!(re.substitute("a=b c=d", r"\2=\1", true), "b=a d=c");
        assert_eq!(re.substitute("a=b c=d", "[&]", false), "[a=b] c=d");
        assert_eq!(re.substitute("a=b", r"\&\\", false), r"&\");
        assert_eq!(re.substitute("ab=cd", r"\u\1\r\U\2\E!", false), "Ab\nCD!");
    }

    #[test]
    fn invalid_patterns_are_reported() {
        let err = VimRegex::new(r"\(", false).unwrap_err();
        assert_eq!(err.to_string(), r"E383: Invalid search string: \(");
    }
}
