//! Command line parsing: `[range] name [!] [argument]`.
//!
//! [`split_command`] is the lenient first pass used by the script parser (no
//! registry lookup, nothing validated). [`parse_command_line`] resolves the
//! name against a [`CommandRegistry`] and enforces the command's range,
//! bang and argument requirements.

use tracing::trace;

use crate::registry::{ArgumentFlag, CommandRegistry, CommandSpec, RangeFlag, builtin_spec};
use crate::{ExError, Range, parse_range};

/// Syntactic pieces of one command, borrowed from the source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts<'a> {
    pub range: Option<Range>,
    /// Name as typed (possibly abbreviated); empty for a bare range.
    pub name: &'a str,
    pub bang: bool,
    pub argument: &'a str,
}

/// A validated command ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExCommandLine {
    pub range: Option<Range>,
    pub spec: CommandSpec,
    pub bang: bool,
    pub argument: String,
}

impl ExCommandLine {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

const SYMBOL_COMMANDS: &[char] = &['!', '&', '<', '>', '=', '@', '#', '~'];

pub fn split_command(line: &str) -> Result<CommandParts<'_>, ExError> {
    let (range, rest) = parse_range(line)?;
    let rest = rest.trim_start();
    let name_len = match rest.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len()),
        Some(c) if SYMBOL_COMMANDS.contains(&c) => c.len_utf8(),
        _ => 0,
    };
    let mut name = &rest[..name_len];
    let mut after = &rest[name_len..];
    // `:ka` sets mark `a`: the letter is glued to the command.
    if name.len() == 2 && name.starts_with('k') && builtin_spec(name).is_none() {
        name = &rest[..1];
        after = &rest[1..];
    }
    let bang = name != "!" && after.starts_with('!');
    if bang {
        after = &after[1..];
    }
    let argument = after.trim_start();
    trace!(target: "ex.parse", name, bang, has_range = range.is_some(), "command_split");
    Ok(CommandParts {
        range,
        name,
        bang,
        argument,
    })
}

/// Parse and validate one command (no `|` handling). `Ok(None)` for an empty
/// line or a comment.
pub fn parse_command_line(
    line: &str,
    registry: &CommandRegistry,
) -> Result<Option<ExCommandLine>, ExError> {
    if is_comment_or_empty(line) {
        return Ok(None);
    }
    let parts = split_command(line)?;
    let spec = if parts.name.is_empty() {
        if parts.range.is_none() {
            if parts.argument.is_empty() || parts.argument.starts_with('"') {
                return Ok(None);
            }
            return Err(ExError::NotAnEditorCommand(line.trim().to_string()));
        }
        CommandSpec::goto_line()
    } else {
        registry
            .lookup(parts.name)
            .map_err(|e| match e {
                ExError::NotAnEditorCommand(_) => {
                    ExError::NotAnEditorCommand(line.trim_start_matches([' ', '\t', ':']).to_string())
                }
                other => other,
            })?
            .clone()
    };
    if parts.range.is_some() && spec.range == RangeFlag::Forbidden {
        return Err(ExError::NoRangeAllowed);
    }
    if parts.bang && !spec.bang {
        return Err(ExError::NoBangAllowed);
    }
    let mut argument = parts.argument;
    match spec.argument {
        ArgumentFlag::Forbidden if argument.starts_with('"') => argument = "",
        ArgumentFlag::Forbidden if !argument.is_empty() => {
            return Err(ExError::TrailingCharacters(argument.to_string()));
        }
        ArgumentFlag::Required if argument.is_empty() => return Err(ExError::ArgumentRequired),
        _ => {}
    }
    Ok(Some(ExCommandLine {
        range: parts.range,
        spec,
        bang: parts.bang,
        argument: argument.to_string(),
    }))
}

pub fn is_comment_or_empty(line: &str) -> bool {
    let t = line.trim_start_matches([' ', '\t', ':']);
    t.is_empty() || t.starts_with('"')
}

/// Commands whose argument is an expression; `|` inside string literals and
/// the `||` operator do not separate commands there.
const EXPRESSION_COMMANDS: &[&str] = &[
    "let", "unlet", "if", "elseif", "while", "for", "return", "call", "echo", "echon", "echomsg",
    "echoerr", "execute",
];

/// Split a line at command-separating `|` characters.
pub fn split_bars(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = line;
    while !rest.trim().is_empty() {
        let spec = command_name(rest).and_then(builtin_spec);
        if spec.is_some_and(|s| s.bar_in_argument) {
            out.push(rest.trim_start().to_string());
            break;
        }
        let expression = spec.is_some_and(|s| EXPRESSION_COMMANDS.contains(&s.name.as_str()));
        let end = find_separator(rest, expression);
        let segment = rest[..end].trim();
        if !segment.is_empty() {
            out.push(segment.to_string());
        }
        rest = rest.get(end + 1..).unwrap_or("");
    }
    out
}

fn command_name(line: &str) -> Option<&str> {
    split_command(line).ok().map(|p| p.name).filter(|n| !n.is_empty())
}

fn find_separator(s: &str, expression: bool) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') => {
                if b == b'\\' {
                    i += 1;
                } else if b == b'"' {
                    quote = None;
                }
            }
            Some(q) => {
                if b == q {
                    if bytes.get(i + 1) == Some(&q) {
                        i += 1;
                    } else {
                        quote = None;
                    }
                }
            }
            None => match b {
                b'\\' => i += 1,
                b'"' | b'\'' if expression => quote = Some(b),
                b'|' if expression && bytes.get(i + 1) == Some(&b'|') => i += 1,
                b'|' => return i,
                _ => {}
            },
        }
        i += 1;
    }
    s.len()
}

/// Join continuation lines (next line starting with `\`) and drop `"\ `
/// continuation comments. Returns one-based starting line numbers.
pub fn join_continuation_lines(source: &str) -> Vec<(usize, String)> {
    let mut out: Vec<(usize, String)> = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let trimmed = raw.trim_start();
        if trimmed.starts_with("\"\\ ") {
            continue;
        }
        if let Some(cont) = trimmed.strip_prefix('\\')
            && let Some((_, last)) = out.last_mut()
        {
            last.push_str(cont);
            continue;
        }
        out.push((idx + 1, raw.to_string()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;
    use pretty_assertions::assert_eq;

    fn parse(line: &str) -> Result<Option<ExCommandLine>, ExError> {
        parse_command_line(line, &CommandRegistry::with_builtins())
    }

    #[test]
    fn name_bang_and_argument() {
        let cmd = parse(":delf! F1").unwrap().unwrap();
        assert_eq!(cmd.name(), "delfunction");
        assert!(cmd.bang);
        assert_eq!(cmd.argument, "F1");
    }

    #[test]
    fn substitute_without_space() {
        let cmd = parse("%s/a/b/g").unwrap().unwrap();
        assert_eq!(cmd.name(), "substitute");
        assert_eq!(cmd.argument, "/a/b/g");
        assert_eq!(cmd.range.unwrap().specs.len(), 2);
        let cmd = parse("s#x#y#").unwrap().unwrap();
        assert_eq!(cmd.argument, "#x#y#");
    }

    #[test]
    fn mark_letter_follows_k() {
        let cmd = parse("ka").unwrap().unwrap();
        assert_eq!(cmd.name(), "k");
        assert_eq!(cmd.argument, "a");
    }

    #[test]
    fn bare_range_moves_to_line() {
        let cmd = parse("12").unwrap().unwrap();
        assert_eq!(cmd.name(), "");
        assert_eq!(cmd.range.unwrap().specs[0].address, Address::Line(12));
    }

    #[test]
    fn structured_failures() {
        assert_eq!(
            parse("1,2echo 'x'").unwrap_err().to_string(),
            "E481: No range allowed"
        );
        assert_eq!(parse("echo! 1").unwrap_err().to_string(), "E477: No ! allowed");
        assert_eq!(parse("normal").unwrap_err().to_string(), "E471: Argument required");
        assert_eq!(
            parse("endif foo").unwrap_err().to_string(),
            "E488: Trailing characters: foo"
        );
        assert_eq!(
            parse("frob 1").unwrap_err().to_string(),
            "E492: Not an editor command: frob 1"
        );
        assert!(parse("endif \" done").unwrap().is_some());
        assert!(parse("  \" comment").unwrap().is_none());
    }

    #[test]
    fn filter_argument_is_verbatim() {
        let cmd = parse("!echo '\"test\"'").unwrap().unwrap();
        assert_eq!(cmd.name(), "!");
        assert_eq!(cmd.argument, "echo '\"test\"'");
    }

    #[test]
    fn bars_split_commands() {
        assert_eq!(
            split_bars("function F1() | return 10 | endfunction"),
            vec!["function F1()", "return 10", "endfunction"]
        );
        assert_eq!(
            split_bars("echo 'a|b' | let x = 1 || 0"),
            vec!["echo 'a|b'", "let x = 1 || 0"]
        );
        assert_eq!(split_bars("nnoremap x :echo 1<Bar>| y"), vec!["nnoremap x :echo 1<Bar>| y"]);
        assert_eq!(
            split_bars("normal! dd | echo 1"),
            vec!["normal! dd | echo 1"]
        );
    }

    #[test]
    fn continuation_lines_join() {
        let src = "let x = [1,\n      \\ 2,\n      \"\\ comment\n      \\ 3]\necho x";
        let lines = join_continuation_lines(src);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (1, "let x = [1, 2, 3]".to_string()));
        assert_eq!(lines[1].0, 5);
    }
}
