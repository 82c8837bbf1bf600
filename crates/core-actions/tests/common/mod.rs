#![allow(dead_code)] // Shared across integration tests; each test binary uses a subset of helpers.

use std::collections::HashMap;

use core_actions::{ActionError, ActionExecutor, Command, ExecContext, Motion, Operator, OperatorTarget, Session};
use core_state::{
    HostError, HostSurface, Mode, Position, RegexEngine, RegisterContent, Selection, TextRange,
};

/// Host that keeps plain lines and records every command it is asked to run.
///
/// Only the few edits the ex command tests need are carried out; everything
/// else is just recorded together with the mode it was issued in.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub lines: Vec<String>,
    pub caret: Position,
    pub selection: Option<Selection>,
    pub registers: HashMap<char, RegisterContent>,
    pub marks: HashMap<char, Position>,
    pub executed: Vec<(Command, Mode)>,
    pub undo_depth: usize,
    pub transactions: usize,
}

impl RecordingHost {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(String::from).collect(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    fn insert_at_caret(&mut self, text: &str) {
        let Position { line, byte } = self.caret;
        if let Some(l) = self.lines.get_mut(line) {
            l.insert_str(byte.min(l.len()), text);
            self.caret.byte = byte + text.len();
        }
    }
}

impl HostSurface for RecordingHost {
    fn caret(&self) -> Position {
        self.caret
    }
    fn set_caret(&mut self, pos: Position) {
        self.caret = pos;
    }
    fn selection(&self) -> Option<Selection> {
        self.selection
    }
    fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }
    fn line_count(&self) -> usize {
        self.lines.len()
    }
    fn line(&self, idx: usize) -> Option<String> {
        self.lines.get(idx).cloned()
    }
    fn text(&self, range: &TextRange) -> Result<String, HostError> {
        let mut out = String::new();
        for l in range.start.line..=range.end.line {
            out.push_str(self.lines.get(l).ok_or(HostError::OutOfRange)?);
            out.push('\n');
        }
        Ok(out)
    }
    fn replace(&mut self, range: &TextRange, text: &str) -> Result<(), HostError> {
        if range.end.line >= self.lines.len() {
            return Err(HostError::OutOfRange);
        }
        if range.kind == core_state::SelectionKind::Linewise {
            let new: Vec<String> = match text.strip_suffix('\n') {
                Some(body) => body.split('\n').map(String::from).collect(),
                None => Vec::new(),
            };
            self.lines.splice(range.start.line..=range.end.line, new);
            if self.lines.is_empty() {
                self.lines.push(String::new());
            }
            return Ok(());
        }
        let mut all = self.lines.join("\n");
        let offset = |p: Position| -> usize {
            self.lines[..p.line].iter().map(|l| l.len() + 1).sum::<usize>() + p.byte
        };
        let (start, end) = (offset(range.start), offset(range.end));
        all.replace_range(start..end, text);
        self.lines = all.split('\n').map(String::from).collect();
        Ok(())
    }
    fn begin_undo_transaction(&mut self) {
        if self.undo_depth == 0 {
            self.transactions += 1;
        }
        self.undo_depth += 1;
    }
    fn end_undo_transaction(&mut self) {
        self.undo_depth = self.undo_depth.saturating_sub(1);
    }
    fn register(&self, name: char) -> Option<RegisterContent> {
        self.registers.get(&name).cloned()
    }
    fn set_register(&mut self, name: char, content: RegisterContent) -> Result<(), HostError> {
        self.registers.insert(name, content);
        Ok(())
    }
    fn register_names(&self) -> Vec<char> {
        let mut names: Vec<char> = self.registers.keys().copied().collect();
        names.sort_unstable();
        names
    }
    fn mark(&self, name: char) -> Option<Position> {
        self.marks.get(&name).copied()
    }
    fn set_mark(&mut self, name: char, pos: Position) -> Result<(), HostError> {
        if !(name.is_ascii_alphabetic() || "'`<>[]".contains(name)) {
            return Err(HostError::InvalidMark);
        }
        self.marks.insert(name, pos);
        Ok(())
    }
    fn delete_mark(&mut self, name: char) -> Result<(), HostError> {
        self.marks.remove(&name);
        Ok(())
    }
}

impl RegexEngine for RecordingHost {
    fn find(
        &self,
        pattern: &str,
        haystack: &str,
        start: usize,
        _ignore_case: bool,
    ) -> Result<Option<(usize, usize)>, HostError> {
        Ok(haystack
            .get(start..)
            .and_then(|h| h.find(pattern))
            .map(|i| (start + i, start + i + pattern.len())))
    }
    fn substitute(
        &self,
        pattern: &str,
        haystack: &str,
        replacement: &str,
        global: bool,
        _ignore_case: bool,
    ) -> Result<String, HostError> {
        Ok(if global {
            haystack.replace(pattern, replacement)
        } else {
            haystack.replacen(pattern, replacement, 1)
        })
    }
}

impl ActionExecutor for RecordingHost {
    fn execute(&mut self, cmd: &Command, ctx: &ExecContext) -> Result<(), ActionError> {
        self.executed.push((cmd.clone(), ctx.mode));
        match cmd {
            Command::Motion { motion, count } => {
                let last = self.lines.len().saturating_sub(1);
                match motion {
                    Motion::GotoLine(n) => self.caret = Position::new(n.saturating_sub(1).min(last), 0),
                    Motion::Down => self.caret.line = (self.caret.line + count).min(last),
                    Motion::Up => self.caret.line = self.caret.line.saturating_sub(*count),
                    Motion::Right => self.caret.byte += count,
                    Motion::Search { pattern, .. } => {
                        let found = self.lines.iter().position(|l| l.contains(pattern.as_str()));
                        let line = found.ok_or_else(|| ActionError::PatternNotFound(pattern.clone()))?;
                        self.caret = Position::new(line, 0);
                    }
                    _ => {}
                }
            }
            Command::Operator {
                op: Operator::Delete,
                target: OperatorTarget::Lines,
                count,
                register,
            } => {
                let start = self.caret.line;
                let end = (start + count - 1).min(self.lines.len() - 1);
                let removed: Vec<String> = self.lines.drain(start..=end).collect();
                if self.lines.is_empty() {
                    self.lines.push(String::new());
                }
                let content = RegisterContent::lines(format!("{}\n", removed.join("\n")));
                self.registers.insert(register.unwrap_or('"'), content);
                self.caret = Position::new(start.min(self.lines.len() - 1), 0);
            }
            Command::Operator {
                op: Operator::Yank,
                target: OperatorTarget::Lines,
                count,
                register,
            } => {
                let start = self.caret.line;
                let end = (start + count - 1).min(self.lines.len() - 1);
                let content = RegisterContent::lines(format!("{}\n", self.lines[start..=end].join("\n")));
                self.registers.insert(register.unwrap_or('"'), content);
            }
            Command::InsertText(text) => self.insert_at_caret(text),
            Command::LeaveInsert => self.caret.byte = self.caret.byte.saturating_sub(1),
            _ => {}
        }
        Ok(())
    }
}

pub fn session(text: &str) -> Session<RecordingHost> {
    Session::new(RecordingHost::new(text))
}

/// Commands the host was asked to run, without the mode.
pub fn executed(session: &Session<RecordingHost>) -> Vec<Command> {
    session.host().executed.iter().map(|(c, _)| c.clone()).collect()
}

pub fn clear_log(session: &mut Session<RecordingHost>) {
    session.host_mut().executed.clear();
}

pub fn op(op: Operator, target: OperatorTarget, count: usize) -> Command {
    Command::Operator {
        op,
        target,
        count,
        register: None,
    }
}

pub fn motion(motion: Motion, count: usize) -> Command {
    Command::Motion { motion, count }
}

/// Run `f` on a thread with the 8 MiB stack deep recursion tests need in
/// debug builds.
pub fn with_stack(f: impl FnOnce() + Send + 'static) {
    std::thread::Builder::new()
        .stack_size(8 << 20)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap();
}
