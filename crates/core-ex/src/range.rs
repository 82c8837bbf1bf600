//! Line ranges of ex commands.
//!
//! Parsing is purely syntactic. Every address, including numbers and
//! patterns, is resolved when the command runs, against the host's caret,
//! marks and the regex capability.
//!
//! Grammar handled here:
//! * addresses: `N`, `.`, `$`, `'x`, `/pat/`, `?pat?`, `\/`, `\?`
//! * offsets: any run of `+N`, `-N`, `+`, `-` (a missing address means `.`)
//! * separators: `,` and `;` (`;` moves the caret to the previous address
//!   before the next one is evaluated)
//! * `%` as shorthand for `1,$`

use core_state::{HostSurface, RegexEngine};
use tracing::trace;

use crate::ExError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// One-based line number as typed; `0` is accepted and clamps to the first line.
    Line(usize),
    Current,
    Last,
    Mark(char),
    SearchForward(String),
    SearchBackward(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpec {
    pub address: Address,
    pub offset: isize,
    /// Separated from the previous spec by `;`.
    pub after_semicolon: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Range {
    pub specs: Vec<LineSpec>,
}

/// Resolved zero-based, inclusive line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
    /// Number of addresses the user typed (1 for `:5`, 2 for `:1,5`).
    pub given: usize,
}

impl LineRange {
    pub fn single(line: usize) -> Self {
        Self {
            start: line,
            end: line,
            given: 0,
        }
    }

    pub fn line_count(&self) -> usize {
        self.end - self.start + 1
    }
}

impl Range {
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Resolve against the host. A backwards range is swapped.
    pub fn resolve(
        &self,
        host: &dyn HostSurface,
        regex: &dyn RegexEngine,
        ignore_case: bool,
    ) -> Result<LineRange, ExError> {
        let last = host.last_line();
        let mut cursor = host.caret().line;
        let mut lines = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let base = match &spec.address {
                Address::Line(n) => n.saturating_sub(1) as isize,
                Address::Current => cursor as isize,
                Address::Last => last as isize,
                Address::Mark(c) => host.mark(*c).ok_or(ExError::MarkNotSet)?.line as isize,
                Address::SearchForward(pat) => {
                    search_lines(host, regex, pat, cursor, true, ignore_case)? as isize
                }
                Address::SearchBackward(pat) => {
                    search_lines(host, regex, pat, cursor, false, ignore_case)? as isize
                }
            };
            let line = base + spec.offset;
            if line < 0 || line as usize > last {
                return Err(ExError::InvalidRange);
            }
            let line = line as usize;
            lines.push(line);
            if let Some(next) = self.specs.get(lines.len())
                && next.after_semicolon
            {
                cursor = line;
            }
        }
        let (start, end) = match lines.as_slice() {
            [] => (host.caret().line, host.caret().line),
            [only] => (*only, *only),
            [.., a, b] => (*a, *b),
        };
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        trace!(target: "ex.range", start, end, given = lines.len(), "range_resolved");
        Ok(LineRange {
            start,
            end,
            given: lines.len(),
        })
    }
}

/// Line of the next (or previous) line matching `pattern`, wrapping around the
/// buffer. The line the caret is on is searched last.
fn search_lines(
    host: &dyn HostSurface,
    regex: &dyn RegexEngine,
    pattern: &str,
    from: usize,
    forward: bool,
    ignore_case: bool,
) -> Result<usize, ExError> {
    let pattern = if pattern.is_empty() {
        host.register('/')
            .map(|r| r.text)
            .ok_or(ExError::NoPreviousPattern)?
    } else {
        pattern.to_string()
    };
    let count = host.line_count();
    for step in 1..=count {
        let idx = if forward {
            (from + step) % count
        } else {
            (from + count - step % count) % count
        };
        let text = host.line(idx).unwrap_or_default();
        if regex.find(&pattern, &text, 0, ignore_case)?.is_some() {
            return Ok(idx);
        }
    }
    Err(ExError::PatternNotFound(pattern))
}

/// Split a leading range off `input`, returning it with the unparsed rest.
pub fn parse_range(input: &str) -> Result<(Option<Range>, &str), ExError> {
    let mut rest = input.trim_start_matches([' ', '\t', ':']);
    let mut range = Range::default();
    if let Some(r) = rest.strip_prefix('%') {
        range.specs.push(LineSpec {
            address: Address::Line(1),
            offset: 0,
            after_semicolon: false,
        });
        range.specs.push(LineSpec {
            address: Address::Last,
            offset: 0,
            after_semicolon: false,
        });
        rest = r;
    }
    let mut after_semicolon = false;
    let mut expect_more = range.is_empty();
    while expect_more {
        rest = rest.trim_start_matches([' ', '\t']);
        let (address, r) = parse_address(rest)?;
        rest = r;
        let (offset, r, had_offset) = parse_offsets(rest)?;
        rest = r;
        let address = match address {
            Some(a) => Some(a),
            None if had_offset => Some(Address::Current),
            None if !range.is_empty() => Some(Address::Current),
            None => None,
        };
        let Some(address) = address else {
            break;
        };
        range.specs.push(LineSpec {
            address,
            offset,
            after_semicolon,
        });
        rest = rest.trim_start_matches([' ', '\t']);
        if let Some(r) = rest.strip_prefix(',') {
            after_semicolon = false;
            rest = r;
        } else if let Some(r) = rest.strip_prefix(';') {
            after_semicolon = true;
            rest = r;
        } else {
            expect_more = false;
        }
    }
    let range = (!range.is_empty()).then_some(range);
    Ok((range, rest))
}

fn parse_address(input: &str) -> Result<(Option<Address>, &str), ExError> {
    let mut chars = input.chars();
    let Some(first) = chars.next() else {
        return Ok((None, input));
    };
    let after = &input[first.len_utf8()..];
    let parsed = match first {
        '0'..='9' => {
            let end = input
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(input.len());
            let n = input[..end].parse().map_err(|_| ExError::InvalidRange)?;
            (Some(Address::Line(n)), &input[end..])
        }
        '.' => (Some(Address::Current), after),
        '$' => (Some(Address::Last), after),
        '\'' => {
            let mark = chars.next().ok_or(ExError::InvalidAddress)?;
            (Some(Address::Mark(mark)), &after[mark.len_utf8()..])
        }
        '/' | '?' => {
            let (pat, r) = take_pattern(after, first);
            let addr = if first == '/' {
                Address::SearchForward(pat)
            } else {
                Address::SearchBackward(pat)
            };
            (Some(addr), r)
        }
        '\\' => match chars.next() {
            Some('/') => (Some(Address::SearchForward(String::new())), &after[1..]),
            Some('?') => (Some(Address::SearchBackward(String::new())), &after[1..]),
            _ => return Err(ExError::InvalidAddress),
        },
        _ => (None, input),
    };
    Ok(parsed)
}

/// Pattern up to an unescaped `delim` (or end of input). `\delim` is unescaped.
fn take_pattern(input: &str, delim: char) -> (String, &str) {
    let mut out = String::new();
    let mut iter = input.char_indices();
    while let Some((i, c)) = iter.next() {
        if c == delim {
            return (out, &input[i + c.len_utf8()..]);
        }
        if c == '\\' {
            match iter.next() {
                Some((_, n)) if n == delim => out.push(n),
                Some((_, n)) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            }
            continue;
        }
        out.push(c);
    }
    (out, "")
}

fn parse_offsets(input: &str) -> Result<(isize, &str, bool), ExError> {
    let mut total: isize = 0;
    let mut rest = input;
    let mut any = false;
    loop {
        let sign = match rest.chars().next() {
            Some('+') => 1,
            Some('-') => -1,
            _ => break,
        };
        any = true;
        rest = &rest[1..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let n: isize = if end == 0 {
            1
        } else {
            rest[..end].parse().map_err(|_| ExError::InvalidRange)?
        };
        total = total.saturating_add(sign * n);
        rest = &rest[end..];
    }
    Ok((total, rest, any))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(address: Address, offset: isize, after_semicolon: bool) -> LineSpec {
        LineSpec {
            address,
            offset,
            after_semicolon,
        }
    }

    #[test]
    fn no_range_leaves_input() {
        let (r, rest) = parse_range("echo 1").unwrap();
        assert_eq!(r, None);
        assert_eq!(rest, "echo 1");
    }

    #[test]
    fn percent_is_whole_buffer() {
        let (r, rest) = parse_range("%s/a/b/").unwrap();
        let r = r.unwrap();
        assert_eq!(r.specs[0].address, Address::Line(1));
        assert_eq!(r.specs[1].address, Address::Last);
        assert_eq!(rest, "s/a/b/");
    }

    #[test]
    fn offsets_and_separators() {
        let (r, rest) = parse_range(".,+2d").unwrap();
        assert_eq!(
            r.unwrap().specs,
            vec![
                spec(Address::Current, 0, false),
                spec(Address::Current, 2, false)
            ]
        );
        assert_eq!(rest, "d");
        let (r, _) = parse_range("'a;/end/-1y").unwrap();
        assert_eq!(
            r.unwrap().specs,
            vec![
                spec(Address::Mark('a'), 0, false),
                spec(Address::SearchForward("end".into()), -1, true)
            ]
        );
    }

    #[test]
    fn escaped_delimiter_in_pattern() {
        let (r, rest) = parse_range(r"/a\/b/p").unwrap();
        assert_eq!(
            r.unwrap().specs[0].address,
            Address::SearchForward("a/b".into())
        );
        assert_eq!(rest, "p");
    }

    #[test]
    fn bare_number_and_trailing_comma() {
        let (r, rest) = parse_range("12").unwrap();
        assert_eq!(r.unwrap().specs, vec![spec(Address::Line(12), 0, false)]);
        assert_eq!(rest, "");
        let (r, _) = parse_range("3,").unwrap();
        assert_eq!(r.unwrap().specs.len(), 2);
    }
}
