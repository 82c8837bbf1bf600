//! Builtin ex commands.
//!
//! The interpreter handles script statements itself and passes every other
//! command line here. The line is parsed against the session's registry,
//! its range resolved against the host, and the command run. Commands with
//! [`Access::Write`] run inside their own (nested) undo transaction.

use std::path::PathBuf;

use core_events::{KeyEvent, keys_to_notation, parse_keys, string_to_keys};
use core_ex::{Access, Address, ExCommandLine, ExError, LineRange, parse_command_line};
use core_keymap::{MapModes, MappingEntry, MappingFlags, MappingScope, MappingTarget};
use core_script::{Interpreter, ScriptId};
use core_state::{Position, RegexEngine, RegisterContent, TextRange};
use tracing::debug;

use super::{Core, LastSubstitute};
use crate::command::{Command, Motion, Operator, OperatorTarget};
use crate::executor::EditorHost;
use crate::{ActionError, DispatchError};

pub(super) fn execute<H: EditorHost>(
    core: &mut Core<H>,
    interp: &mut Interpreter,
    line: &str,
    script: Option<ScriptId>,
) -> Result<(), DispatchError> {
    let Some(cmd) = parse_command_line(line, &core.registry)? else {
        return Ok(());
    };
    debug!(
        target: "runtime.session",
        command = cmd.name(),
        bang = cmd.bang,
        has_range = cmd.range.is_some(),
        "ex_command"
    );
    let write = cmd.spec.access == Access::Write;
    if write {
        core.host.begin_undo_transaction();
    }
    let result = run(core, interp, &cmd, script);
    if write {
        core.host.end_undo_transaction();
    }
    result
}

fn run<H: EditorHost>(
    core: &mut Core<H>,
    interp: &mut Interpreter,
    cmd: &ExCommandLine,
    script: Option<ScriptId>,
) -> Result<(), DispatchError> {
    if !cmd.spec.builtin {
        return core.run_command(interp, Command::HostAction(host_command_text(cmd)));
    }
    if let Some((modes, kind)) = map_family(cmd.name(), cmd.bang) {
        return map_command(core, interp, modes, kind, &cmd.argument);
    }
    match cmd.name() {
        "" => {
            let line = resolve_lines(core, cmd)?.end;
            core.run_command(
                interp,
                Command::Motion {
                    motion: Motion::GotoLine(line + 1),
                    count: 1,
                },
            )
        }
        "set" => set(core, interp, &cmd.argument),
        "normal" => normal(core, interp, cmd),
        "source" => {
            let path = expand_home(interp, cmd.argument.trim());
            interp.source_file(core, &path)?;
            Ok(())
        }
        "delete" => lines_operator(core, cmd, Operator::Delete),
        "yank" => lines_operator(core, cmd, Operator::Yank),
        ">" => shift(core, cmd, Operator::Indent, '>'),
        "<" => shift(core, cmd, Operator::Outdent, '<'),
        "put" => put(core, cmd),
        "join" => join(core, cmd),
        "substitute" => substitute(core, interp, cmd, script),
        "k" | "mark" => mark(core, cmd),
        "registers" | "display" => {
            registers(core, &cmd.argument);
            Ok(())
        }
        "marks" => {
            marks(core, &cmd.argument);
            Ok(())
        }
        "delmarks" => delmarks(core, cmd),
        "undo" | "redo" => {
            if !cmd.argument.trim().is_empty() {
                return Err(ExError::TrailingCharacters(cmd.argument.clone()).into());
            }
            let command = if cmd.name() == "undo" {
                Command::Undo { count: 1 }
            } else {
                Command::Redo { count: 1 }
            };
            core.run_command(interp, command)
        }
        "action" => core.run_command(interp, Command::HostAction(cmd.argument.trim().to_string())),
        "!" => Err(ActionError::Unsupported(format!("!{}", cmd.argument)).into()),
        other => Err(ActionError::Unsupported(other.to_string()).into()),
    }
}

fn host_command_text(cmd: &ExCommandLine) -> String {
    let mut text = cmd.name().to_string();
    if cmd.bang {
        text.push('!');
    }
    if !cmd.argument.is_empty() {
        text.push(' ');
        text.push_str(&cmd.argument);
    }
    text
}

/// Lines the command applies to; the caret line when no range was typed.
fn resolve_lines<H: EditorHost>(core: &Core<H>, cmd: &ExCommandLine) -> Result<LineRange, ExError> {
    match &cmd.range {
        Some(range) => range.resolve(&core.host, &core.host, core.options.flag("ignorecase")),
        None => Ok(LineRange::single(core.host.caret().line)),
    }
}

/// Narrow `lines` to `count` lines starting at its last line (`:d 3`).
fn apply_count<H: EditorHost>(core: &Core<H>, lines: &mut LineRange, count: Option<usize>) {
    if let Some(n) = count {
        lines.start = lines.end;
        lines.end = (lines.end + n - 1).min(core.host.last_line());
    }
}

/// `[x] [count]` argument of `:delete`, `:yank` and friends.
fn register_and_count(arg: &str) -> Result<(Option<char>, Option<usize>), ExError> {
    let arg = arg.trim();
    let (register, rest) = match arg.chars().next() {
        Some(c) if !c.is_ascii_digit() => (Some(c), arg[c.len_utf8()..].trim_start()),
        _ => (None, arg),
    };
    Ok((register, parse_count(rest)?))
}

fn parse_count(arg: &str) -> Result<Option<usize>, ExError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(None);
    }
    match arg.parse::<usize>() {
        Ok(0) => Err(ExError::InvalidRange),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(ExError::TrailingCharacters(arg.to_string())),
    }
}

fn first_non_blank(line: &str) -> usize {
    line.find(|c: char| !c.is_whitespace()).unwrap_or(0)
}

// ------------------------------------------------------------------------------------------------
// Editing
// ------------------------------------------------------------------------------------------------

fn lines_operator<H: EditorHost>(
    core: &mut Core<H>,
    cmd: &ExCommandLine,
    op: Operator,
) -> Result<(), DispatchError> {
    let (register, count) = register_and_count(&cmd.argument)?;
    let mut lines = resolve_lines(core, cmd)?;
    apply_count(core, &mut lines, count);
    let caret = core.host.caret();
    core.host.set_caret(Position::new(lines.start, 0));
    core.execute(&Command::Operator {
        op,
        target: OperatorTarget::Lines,
        count: lines.line_count(),
        register,
    })?;
    if op == Operator::Yank {
        core.host.set_caret(caret);
    }
    Ok(())
}

/// `:>` and `:<`; every extra `>` or `<` shifts one more `shiftwidth`.
fn shift<H: EditorHost>(
    core: &mut Core<H>,
    cmd: &ExCommandLine,
    op: Operator,
    symbol: char,
) -> Result<(), DispatchError> {
    let extra = cmd
        .argument
        .chars()
        .take_while(|&c| c == symbol || c == ' ')
        .filter(|&c| c == symbol)
        .count();
    let rest = cmd.argument.trim_start_matches([symbol, ' ']);
    let mut lines = resolve_lines(core, cmd)?;
    apply_count(core, &mut lines, parse_count(rest)?);
    for _ in 0..=extra {
        core.host.set_caret(Position::new(lines.start, 0));
        core.execute(&Command::Operator {
            op,
            target: OperatorTarget::Lines,
            count: lines.line_count(),
            register: None,
        })?;
    }
    let last = core.host.line(lines.end).unwrap_or_default();
    core.host.set_caret(Position::new(lines.end, first_non_blank(&last)));
    Ok(())
}

/// `:put [x]` always puts whole lines, below the range line or above it with
/// `!` or for line `0`.
fn put<H: EditorHost>(core: &mut Core<H>, cmd: &ExCommandLine) -> Result<(), DispatchError> {
    let name = cmd.argument.trim().chars().next().unwrap_or('"');
    let content = core
        .host
        .register(name)
        .ok_or(ActionError::EmptyRegister(name))?;
    let line = resolve_lines(core, cmd)?.end;
    let line_zero = cmd.range.as_ref().and_then(|r| r.specs.last()).is_some_and(|spec| {
        spec.address == Address::Line(0) && spec.offset == 0
    });
    let above = cmd.bang || line_zero;
    let mut text = content.text;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    let inserted = text.lines().count().max(1);
    let target = if above { line } else { line + 1 };
    if target <= core.host.last_line() {
        core.host.insert(Position::new(target, 0), &text)?;
    } else {
        let last = core.host.last_line();
        let end = core.host.line(last).map_or(0, |l| l.len());
        let body = text.strip_suffix('\n').unwrap_or(&text);
        core.host.insert(Position::new(last, end), &format!("\n{body}"))?;
    }
    let caret_line = target + inserted - 1;
    let first = core.host.line(caret_line).unwrap_or_default();
    core.host.set_caret(Position::new(caret_line, first_non_blank(&first)));
    Ok(())
}

fn join<H: EditorHost>(core: &mut Core<H>, cmd: &ExCommandLine) -> Result<(), DispatchError> {
    let mut lines = resolve_lines(core, cmd)?;
    match parse_count(&cmd.argument)? {
        Some(n) => {
            lines.start = lines.end;
            lines.end = lines.end + n - 1;
        }
        None if lines.given < 2 => lines.end = lines.start + 1,
        None => {}
    }
    lines.end = lines.end.min(core.host.last_line());
    if lines.start >= lines.end {
        return Ok(());
    }
    if cmd.bang {
        let joined: String = (lines.start..=lines.end)
            .filter_map(|l| core.host.line(l))
            .collect();
        core.host
            .replace(&TextRange::lines(lines.start, lines.end), &format!("{joined}\n"))?;
        core.host.set_caret(Position::new(lines.start, 0));
        return Ok(());
    }
    core.host.set_caret(Position::new(lines.start, 0));
    core.execute(&Command::JoinLines {
        count: lines.line_count(),
    })
}

fn mark<H: EditorHost>(core: &mut Core<H>, cmd: &ExCommandLine) -> Result<(), DispatchError> {
    let arg = cmd.argument.trim();
    let mut chars = arg.chars();
    let Some(name) = chars.next() else {
        return Err(ExError::ArgumentRequired.into());
    };
    if chars.next().is_some() {
        return Err(ExError::TrailingCharacters(arg.to_string()).into());
    }
    let line = resolve_lines(core, cmd)?.end;
    core.host.set_mark(name, Position::new(line, 0))?;
    Ok(())
}

fn delmarks<H: EditorHost>(core: &mut Core<H>, cmd: &ExCommandLine) -> Result<(), DispatchError> {
    let arg = cmd.argument.trim();
    if cmd.bang {
        if !arg.is_empty() {
            return Err(ExError::TrailingCharacters(arg.to_string()).into());
        }
        for name in 'a'..='z' {
            core.host.delete_mark(name)?;
        }
        return Ok(());
    }
    if arg.is_empty() {
        return Err(ExError::ArgumentRequired.into());
    }
    let chars: Vec<char> = arg.chars().filter(|c| !c.is_whitespace()).collect();
    let mut idx = 0;
    while idx < chars.len() {
        let from = chars[idx];
        if chars.get(idx + 1) == Some(&'-')
            && let Some(&to) = chars.get(idx + 2)
        {
            if to < from || from.is_ascii_lowercase() != to.is_ascii_lowercase() {
                return Err(ExError::TrailingCharacters(arg.to_string()).into());
            }
            for name in from..=to {
                core.host.delete_mark(name)?;
            }
            idx += 3;
        } else {
            core.host.delete_mark(from)?;
            idx += 1;
        }
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// :substitute
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SubstituteFlags {
    global: bool,
    ignore_case: Option<bool>,
    no_error: bool,
    count_only: bool,
}

/// Split `s` at the first unescaped `delim`. An escaped delimiter loses its
/// backslash; other escapes are kept for the regex engine.
fn split_delimited(s: &str, delim: char) -> (String, Option<&str>) {
    let mut out = String::new();
    let mut chars = s.char_indices();
    while let Some((idx, c)) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some((_, next)) if next == delim => out.push(delim),
                Some((_, next)) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else if c == delim {
            return (out, Some(&s[idx + c.len_utf8()..]));
        } else {
            out.push(c);
        }
    }
    (out, None)
}

fn parse_flags(s: &str) -> Result<(SubstituteFlags, Option<usize>), ExError> {
    let mut flags = SubstituteFlags::default();
    let mut rest = s;
    for (idx, c) in s.char_indices() {
        match c {
            'g' => flags.global = !flags.global,
            'i' => flags.ignore_case = Some(true),
            'I' => flags.ignore_case = Some(false),
            'e' => flags.no_error = true,
            'n' => flags.count_only = true,
            // Interactive confirmation and flag reuse have no effect here.
            'c' | '&' => {}
            _ => {
                rest = &s[idx..];
                break;
            }
        }
        rest = &s[idx + c.len_utf8()..];
    }
    Ok((flags, parse_count(rest)?))
}

/// A `\=` result is inserted literally.
fn escape_replacement(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '&') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn substitute<H: EditorHost>(
    core: &mut Core<H>,
    interp: &mut Interpreter,
    cmd: &ExCommandLine,
    script: Option<ScriptId>,
) -> Result<(), DispatchError> {
    let arg = cmd.argument.as_str();
    let (pattern, replacement, flags_text) = match arg.chars().next() {
        None => {
            let last = core
                .last_substitute
                .clone()
                .ok_or(ExError::NoPreviousPattern)?;
            (last.pattern, last.replacement, "")
        }
        Some(delim) if delim.is_alphanumeric() || matches!(delim, '\\' | '"' | '|' | ' ') => {
            return Err(ExError::TrailingCharacters(arg.to_string()).into());
        }
        Some(delim) => {
            let (pattern, rest) = split_delimited(&arg[delim.len_utf8()..], delim);
            let (replacement, flags) = match rest {
                Some(rest) => split_delimited(rest, delim),
                None => (String::new(), None),
            };
            (pattern, replacement, flags.unwrap_or(""))
        }
    };
    let pattern = if pattern.is_empty() {
        core.host
            .register('/')
            .map(|r| r.text)
            .filter(|p| !p.is_empty())
            .ok_or(ExError::NoPreviousPattern)?
    } else {
        pattern
    };
    let (mut flags, count) = parse_flags(flags_text.trim_start())?;
    if core.options.flag("gdefault") {
        flags.global = !flags.global;
    }
    let ignore_case = flags.ignore_case.unwrap_or_else(|| {
        core.options.flag("ignorecase")
            && !(core.options.flag("smartcase") && pattern.chars().any(char::is_uppercase))
    });
    core.last_substitute = Some(LastSubstitute {
        pattern: pattern.clone(),
        replacement: replacement.clone(),
    });
    core.host
        .set_register('/', RegisterContent::chars(pattern.clone()))?;
    core.handler.set_last_search(&pattern, false);

    let mut lines = resolve_lines(core, cmd)?;
    apply_count(core, &mut lines, count);
    let expression = replacement.strip_prefix("\\=").map(str::to_string);

    let mut matches = 0usize;
    let mut changed_lines = 0usize;
    let mut last_changed = None;
    let mut line = lines.start;
    let mut end = lines.end;
    while line <= end {
        let text = core.host.line(line).unwrap_or_default();
        let found = count_matches(&core.host, &pattern, &text, flags.global, ignore_case)?;
        if found == 0 {
            line += 1;
            continue;
        }
        matches += found;
        changed_lines += 1;
        if flags.count_only {
            line += 1;
            continue;
        }
        let rep = match &expression {
            Some(expr) => escape_replacement(&interp.evaluate(core, expr, script)?.to_str()?),
            None => replacement.clone(),
        };
        let new = core
            .host
            .substitute(&pattern, &text, &rep, flags.global, ignore_case)?;
        let added = new.matches('\n').count();
        core.host
            .replace(&TextRange::lines(line, line), &format!("{new}\n"))?;
        last_changed = Some(line + added);
        line += added + 1;
        end += added;
    }
    debug!(target: "runtime.session", matches, lines = changed_lines, "substitute");

    if matches == 0 {
        if flags.no_error {
            return Ok(());
        }
        return Err(ExError::PatternNotFound(pattern).into());
    }
    if flags.count_only {
        core.messages.push(format!(
            "{} on {}",
            plural(matches, "match"),
            plural(changed_lines, "line")
        ));
        return Ok(());
    }
    if let Some(line) = last_changed {
        let text = core.host.line(line).unwrap_or_default();
        core.host.set_caret(Position::new(line, first_non_blank(&text)));
    }
    if changed_lines > 2 {
        core.messages.push(format!(
            "{} on {}",
            plural(matches, "substitution"),
            plural(changed_lines, "line")
        ));
    }
    Ok(())
}

fn count_matches(
    regex: &dyn RegexEngine,
    pattern: &str,
    text: &str,
    global: bool,
    ignore_case: bool,
) -> Result<usize, DispatchError> {
    let mut found = 0;
    let mut start = 0;
    while start <= text.len() {
        let Some((s, e)) = regex.find(pattern, text, start, ignore_case)? else {
            break;
        };
        found += 1;
        if !global {
            break;
        }
        start = if e > s {
            e
        } else {
            text[s..].chars().next().map_or(text.len() + 1, |c| s + c.len_utf8())
        };
    }
    Ok(found)
}

// ------------------------------------------------------------------------------------------------
// Environment
// ------------------------------------------------------------------------------------------------

fn set<H: EditorHost>(
    core: &mut Core<H>,
    interp: &mut Interpreter,
    argument: &str,
) -> Result<(), DispatchError> {
    let args = split_set_args(argument);
    if args.is_empty() {
        if let Some(listing) = core.options.apply("all")? {
            core.messages.push(listing);
        }
        return Ok(());
    }
    for arg in args {
        if let Some(text) = core.options.apply(&arg)? {
            core.messages.push(text);
        }
    }
    core.sync_settings(interp);
    Ok(())
}

/// Split `:set` arguments at blanks; `\ ` keeps a blank in a value.
fn split_set_args(argument: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut chars = argument.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.push(chars.next().unwrap_or('\\')),
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

fn normal<H: EditorHost>(
    core: &mut Core<H>,
    interp: &mut Interpreter,
    cmd: &ExCommandLine,
) -> Result<(), DispatchError> {
    let keys = string_to_keys(&cmd.argument);
    let remap = !cmd.bang;
    if cmd.range.is_none() {
        return core.run_normal(interp, &keys, remap);
    }
    let lines = resolve_lines(core, cmd)?;
    for line in lines.start..=lines.end {
        if line > core.host.last_line() {
            break;
        }
        core.host.set_caret(Position::new(line, 0));
        core.run_normal(interp, &keys, remap)?;
    }
    Ok(())
}

fn expand_home(interp: &Interpreter, path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => PathBuf::from(interp.env_var("HOME")).join(rest),
        None => PathBuf::from(path),
    }
}

fn registers<H: EditorHost>(core: &mut Core<H>, argument: &str) {
    let filter: Vec<char> = argument.chars().filter(|c| !c.is_whitespace()).collect();
    let mut out = vec!["Type Name Content".to_string()];
    for name in core.host.register_names() {
        if !filter.is_empty() && !filter.contains(&name) {
            continue;
        }
        let Some(content) = core.host.register(name) else {
            continue;
        };
        let kind = if content.linewise { 'l' } else { 'c' };
        out.push(format!(
            "  {kind}  \"{name}   {}",
            content.text.replace('\n', "^J")
        ));
    }
    core.messages.push(out.join("\n"));
}

const MARK_ORDER: &str = "'abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789\"[]^.<>";

fn marks<H: EditorHost>(core: &mut Core<H>, argument: &str) {
    let filter: Vec<char> = argument.chars().filter(|c| !c.is_whitespace()).collect();
    let mut out = vec!["mark line  col file/text".to_string()];
    for name in MARK_ORDER.chars() {
        if !filter.is_empty() && !filter.contains(&name) {
            continue;
        }
        if let Some(pos) = core.host.mark(name) {
            let text = core.host.line(pos.line).unwrap_or_default();
            out.push(format!(" {name} {:>6} {:>4} {}", pos.line + 1, pos.byte, text.trim()));
        }
    }
    core.messages.push(out.join("\n"));
}

// ------------------------------------------------------------------------------------------------
// Mapping family
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapKind {
    Map,
    Noremap,
    Unmap,
    Clear,
}

/// Modes and action of a `:map`-family command, `None` for any other name.
fn map_family(name: &str, bang: bool) -> Option<(MapModes, MapKind)> {
    let (prefix, kind) = if let Some(p) = name.strip_suffix("mapclear") {
        (p, MapKind::Clear)
    } else if let Some(p) = name.strip_suffix("unmap") {
        (p, MapKind::Unmap)
    } else if let Some(p) = name.strip_suffix("noremap") {
        (p, MapKind::Noremap)
    } else if let Some(p) = name.strip_suffix("map") {
        (p, MapKind::Map)
    } else {
        return None;
    };
    let modes = match prefix {
        "" if bang => MapModes::INSERT_CMDLINE,
        "" => MapModes::NVO,
        "n" => MapModes::NORMAL,
        "v" => MapModes::VISUAL | MapModes::SELECT,
        "x" => MapModes::VISUAL,
        "s" => MapModes::SELECT,
        "o" => MapModes::OP_PENDING,
        "i" => MapModes::INSERT,
        "c" => MapModes::CMDLINE,
        _ => return None,
    };
    Some((modes, kind))
}

const MAP_MODIFIERS: &[&str] = &[
    "<buffer>", "<silent>", "<expr>", "<nowait>", "<unique>", "<special>", "<script>",
];

/// Strip leading `<buffer>`, `<silent>`, ... modifiers.
fn map_modifiers(arg: &str) -> (MappingScope, MappingFlags, &str) {
    let mut rest = arg.trim_start();
    let mut scope = MappingScope::Global;
    let mut flags = MappingFlags::empty();
    while let Some(modifier) = MAP_MODIFIERS.iter().find(|m| {
        rest.get(..m.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(m))
    }) {
        match *modifier {
            "<buffer>" => scope = MappingScope::BufferLocal,
            "<silent>" => flags |= MappingFlags::SILENT,
            "<expr>" => flags |= MappingFlags::EXPR,
            "<nowait>" => flags |= MappingFlags::NOWAIT,
            "<unique>" => flags |= MappingFlags::UNIQUE,
            _ => {}
        }
        rest = rest[modifier.len()..].trim_start();
    }
    (scope, flags, rest)
}

/// Replace `<Leader>` and `<LocalLeader>` with `g:mapleader` and
/// `g:maplocalleader` (default backslash).
fn expand_leader(interp: &Interpreter, text: &str) -> String {
    let leader = |name: &str| {
        interp
            .global(name)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "\\".to_string())
    };
    let text = replace_ignore_case(text, "<leader>", &leader("mapleader"));
    replace_ignore_case(&text, "<localleader>", &leader("maplocalleader"))
}

fn replace_ignore_case(text: &str, pattern: &str, with: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (idx, _) in lower.match_indices(pattern) {
        out.push_str(&text[last..idx]);
        out.push_str(with);
        last = idx + pattern.len();
    }
    out.push_str(&text[last..]);
    out
}

fn map_command<H: EditorHost>(
    core: &mut Core<H>,
    interp: &Interpreter,
    modes: MapModes,
    kind: MapKind,
    argument: &str,
) -> Result<(), DispatchError> {
    let (scope, flags, rest) = map_modifiers(argument);
    match kind {
        MapKind::Clear => {
            core.mappings.clear(modes, scope);
            Ok(())
        }
        MapKind::Unmap => {
            let lhs = parse_keys(&expand_leader(interp, rest.trim_end()));
            core.mappings.remove(modes, &lhs, scope)?;
            Ok(())
        }
        MapKind::Map | MapKind::Noremap => {
            let (lhs_text, rhs_text) = match rest.find([' ', '\t']) {
                Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
                None => (rest, ""),
            };
            let lhs = parse_keys(&expand_leader(interp, lhs_text));
            if rhs_text.is_empty() {
                list_mappings(core, modes, &lhs);
                return Ok(());
            }
            let mut flags = flags;
            if kind == MapKind::Map {
                flags |= MappingFlags::RECURSIVE;
            }
            let rhs = if flags.contains(MappingFlags::EXPR) {
                MappingTarget::Expression(rhs_text.to_string())
            } else if let Some(name) = action_name(rhs_text) {
                MappingTarget::Action(name.to_string())
            } else {
                MappingTarget::Keys(parse_keys(&expand_leader(interp, rhs_text)))
            };
            core.mappings.add(
                modes,
                MappingEntry {
                    lhs,
                    rhs,
                    scope,
                    flags,
                },
            )?;
            Ok(())
        }
    }
}

/// Name in an `<Action>(name)` right-hand side.
fn action_name(rhs: &str) -> Option<&str> {
    let head = rhs.get(..9)?;
    if !head.eq_ignore_ascii_case("<action>(") {
        return None;
    }
    rhs[9..].strip_suffix(')')
}

fn list_mappings<H: EditorHost>(core: &mut Core<H>, modes: MapModes, prefix: &[KeyEvent]) {
    let entries = core.mappings.list(modes, prefix);
    if entries.is_empty() {
        core.messages.push("No mapping found".to_string());
        return;
    }
    let lines: Vec<String> = entries
        .iter()
        .map(|(modes, entry)| {
            format!(
                "{}  {:<12} {}{}{}",
                modes.listing_tag(),
                keys_to_notation(&entry.lhs),
                if entry.is_recursive() { ' ' } else { '*' },
                if entry.scope == MappingScope::BufferLocal {
                    '@'
                } else {
                    ' '
                },
                entry.rhs_display()
            )
        })
        .collect();
    core.messages.push(lines.join("\n"));
}
