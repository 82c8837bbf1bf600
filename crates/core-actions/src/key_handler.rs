//! KeyHandler: stateful key -> [`Command`] resolution.
//!
//! Keys reach the handler after mapping expansion. The handler accumulates a
//! [`PendingState`] and emits a command once the key sequence is complete.
//!
//! State machine:
//! * Idle: digits `1`-`9` start a count and any digit extends it. A leading
//!   `0` is the `LineStart` motion, never a count.
//! * Operator keys (`d`, `y`, `c`, `<`, `>`, `gu`, `gU`, `g~`) move the
//!   captured count to the operator count and wait for a motion or text
//!   object. The emitted command carries `operator count x motion count`.
//!   Typing the operator again (`dd`, `gUU`, `gUgU`) acts on whole lines.
//! * Keys that need one more key (`"`, `f`/`t`/`F`/`T`, `r`, `m`, `'`/`` ` ``,
//!   `g`, `z`, `[`, `]`, `i`/`a` after an operator) park in an awaiting
//!   sub-state. While a literal character is awaited, mappings are not
//!   applied (see [`KeyHandler::wants_literal`]).
//! * `/` and `?` collect a pattern until `<CR>`; the result is a motion, so
//!   `d/foo<CR>` works like any other operator + motion.
//! * `<Esc>` clears everything and yields [`Command::Escape`] without error.
//!
//! Any invalid combination returns an error and leaves the handler idle.

use core_events::{KeyCode, KeyEvent, KeyModifiers, to_key_notation};
use core_state::{Mode, SelectionKind};
use tracing::trace;

use crate::bindings::{self, ShorthandTarget};
use crate::command::{
    Command, FindKind, InsertEntry, Motion, Operator, OperatorTarget, ScrollAnchor,
};
use crate::{ActionError, DispatchError};

/// Counts are clamped so arithmetic on them never overflows.
const MAX_COUNT: usize = 999_999;

/// Accumulated prefix of the command being typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingState {
    pub count: Option<usize>,
    pub register: Option<char>,
    pub operator: Option<Operator>,
    /// Count typed before the operator (`2` in `2d3w`).
    pub operator_count: Option<usize>,
}

impl PendingState {
    pub fn is_empty(&self) -> bool {
        *self == PendingState::default()
    }

    /// Product of the typed counts, `None` when no count was typed at all.
    pub fn total_count(&self) -> Option<usize> {
        match (self.operator_count, self.count) {
            (None, None) => None,
            (a, b) => Some((a.unwrap_or(1) * b.unwrap_or(1)).min(MAX_COUNT)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Awaiting {
    #[default]
    Nothing,
    Register,
    FindChar(FindKind),
    ReplaceChar,
    SetMark,
    MarkJump {
        linewise: bool,
    },
    /// `g`, `z`, `[` or `]` was typed.
    Prefix(char),
    TextObject {
        inner: bool,
    },
    Search {
        backward: bool,
        text: String,
    },
}

/// Result of feeding one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The key was consumed; the command is not complete yet.
    Pending,
    Done(Command),
}

#[derive(Debug, Default)]
pub struct KeyHandler {
    pending: PendingState,
    awaiting: Awaiting,
    last_find: Option<(FindKind, char)>,
    last_search: Option<(String, bool)>,
}

impl KeyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &PendingState {
        &self.pending
    }

    /// Nothing typed yet: no count, register, operator or awaited key.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.awaiting == Awaiting::Nothing
    }

    pub fn operator_pending(&self) -> bool {
        self.pending.operator.is_some()
    }

    /// The next key is taken literally and must bypass mappings.
    pub fn wants_literal(&self) -> bool {
        matches!(
            self.awaiting,
            Awaiting::Register
                | Awaiting::FindChar(_)
                | Awaiting::ReplaceChar
                | Awaiting::SetMark
                | Awaiting::MarkJump { .. }
                | Awaiting::Search { .. }
        )
    }

    /// Pattern typed so far after `/` or `?`.
    pub fn search_text(&self) -> Option<&str> {
        match &self.awaiting {
            Awaiting::Search { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Last `/` or `?` pattern and whether it searched backward.
    pub fn last_search(&self) -> Option<(&str, bool)> {
        self.last_search.as_ref().map(|(p, b)| (p.as_str(), *b))
    }

    pub fn set_last_search(&mut self, pattern: &str, backward: bool) {
        self.last_search = Some((pattern.to_string(), backward));
    }

    pub fn last_find(&self) -> Option<(FindKind, char)> {
        self.last_find
    }

    /// Drop every pending piece. Remembered finds and searches survive.
    pub fn reset(&mut self) {
        self.pending = PendingState::default();
        self.awaiting = Awaiting::Nothing;
    }

    /// Feed one key typed in `mode`. On error the handler is reset.
    pub fn handle(&mut self, mode: Mode, key: &KeyEvent) -> Result<Step, DispatchError> {
        let result = match mode {
            Mode::Insert | Mode::Replace => Ok(insert_key(key)),
            Mode::Select(_) if self.awaiting == Awaiting::Nothing => self.select_key(key),
            _ => self.command_key(mode, key),
        };
        match &result {
            Ok(Step::Done(cmd)) => {
                trace!(target: "input.context", mode = %mode, command = ?cmd, "command_resolved");
            }
            Ok(Step::Pending) => {}
            Err(err) => {
                trace!(target: "input.context", mode = %mode, error = %err, "key_rejected");
                self.reset();
            }
        }
        result
    }

    // --------------------------------------------------------------------------------------------
    // Normal / Visual / Operator-pending
    // --------------------------------------------------------------------------------------------

    fn command_key(&mut self, mode: Mode, key: &KeyEvent) -> Result<Step, DispatchError> {
        if key.code == KeyCode::Esc || key.is_ctrl('c') || key.is_ctrl('[') {
            self.reset();
            return Ok(Step::Done(Command::Escape));
        }
        match std::mem::take(&mut self.awaiting) {
            Awaiting::Nothing => self.fresh_key(mode, key),
            Awaiting::Register => {
                let ch = literal(key)?;
                if self.pending.operator.is_some() || !valid_register(ch) {
                    return Err(invalid(&format!("\"{ch}")));
                }
                self.pending.register = Some(ch);
                Ok(Step::Pending)
            }
            Awaiting::FindChar(kind) => {
                let ch = literal(key)?;
                self.last_find = Some((kind, ch));
                self.complete_motion(mode, Motion::FindChar { kind, ch })
            }
            Awaiting::ReplaceChar => {
                let ch = match key.code {
                    KeyCode::Enter => '\n',
                    _ => literal(key)?,
                };
                let count = self.take_count();
                self.reset();
                Ok(Step::Done(Command::ReplaceChar { ch, count }))
            }
            Awaiting::SetMark => {
                let ch = literal(key)?;
                self.reset();
                Ok(Step::Done(Command::SetMark(ch)))
            }
            Awaiting::MarkJump { linewise } => {
                let name = literal(key)?;
                self.complete_motion(mode, Motion::Mark { name, linewise })
            }
            Awaiting::Prefix(prefix) => self.prefixed(mode, prefix, key),
            Awaiting::TextObject { inner } => {
                let ch = literal(key)?;
                let object = bindings::text_object(ch, inner)
                    .ok_or_else(|| invalid(&format!("{}{ch}", if inner { 'i' } else { 'a' })))?;
                if mode.has_selection() {
                    self.reset();
                    return Ok(Step::Done(Command::SelectTextObject(object)));
                }
                self.complete_target(OperatorTarget::TextObject(object))
            }
            Awaiting::Search { backward, mut text } => match key.code {
                KeyCode::Enter => {
                    let pattern = if text.is_empty() {
                        match &self.last_search {
                            Some((p, _)) => p.clone(),
                            None => return Err(ActionError::NoPreviousPattern.into()),
                        }
                    } else {
                        text
                    };
                    self.last_search = Some((pattern.clone(), backward));
                    self.complete_motion(mode, Motion::Search { pattern, backward })
                }
                KeyCode::Backspace if text.is_empty() => {
                    self.reset();
                    Ok(Step::Done(Command::Escape))
                }
                KeyCode::Backspace => {
                    text.pop();
                    self.awaiting = Awaiting::Search { backward, text };
                    Ok(Step::Pending)
                }
                _ if key.is_ctrl('u') => {
                    self.awaiting = Awaiting::Search {
                        backward,
                        text: String::new(),
                    };
                    Ok(Step::Pending)
                }
                _ => {
                    text.push(literal(key)?);
                    self.awaiting = Awaiting::Search { backward, text };
                    Ok(Step::Pending)
                }
            },
        }
    }

    fn fresh_key(&mut self, mode: Mode, key: &KeyEvent) -> Result<Step, DispatchError> {
        let visual = mode.has_selection();
        if let Some(digit) = key.plain_char().and_then(|c| c.to_digit(10))
            && (digit != 0 || self.pending.count.is_some())
        {
            let count = self.pending.count.unwrap_or(0) * 10 + digit as usize;
            self.pending.count = Some(count.min(MAX_COUNT));
            return Ok(Step::Pending);
        }
        if let Some(motion) = bindings::motion(key) {
            return self.complete_motion(mode, motion);
        }
        if key.mods == KeyModifiers::CTRL {
            return self.ctrl_key(mode, key);
        }
        if key.code == KeyCode::Insert && !visual && !self.operator_pending() {
            return self.done(Command::Insert(InsertEntry::Before));
        }
        let Some(ch) = key.plain_char() else {
            return Err(invalid(&to_key_notation(key)));
        };
        // Keys valid in every command mode.
        match ch {
            '"' => {
                self.awaiting = Awaiting::Register;
                return Ok(Step::Pending);
            }
            'g' | 'z' | '[' | ']' => {
                self.awaiting = Awaiting::Prefix(ch);
                return Ok(Step::Pending);
            }
            'f' | 't' | 'F' | 'T' => {
                let kind = match ch {
                    'f' => FindKind::Forward,
                    't' => FindKind::ForwardTill,
                    'F' => FindKind::Backward,
                    _ => FindKind::BackwardTill,
                };
                self.awaiting = Awaiting::FindChar(kind);
                return Ok(Step::Pending);
            }
            ';' | ',' => {
                let (kind, c) = self.last_find.ok_or_else(|| invalid(&ch.to_string()))?;
                let kind = if ch == ',' { kind.reversed() } else { kind };
                return self.complete_motion(mode, Motion::FindChar { kind, ch: c });
            }
            '\'' | '`' => {
                self.awaiting = Awaiting::MarkJump {
                    linewise: ch == '\'',
                };
                return Ok(Step::Pending);
            }
            '/' | '?' => {
                self.awaiting = Awaiting::Search {
                    backward: ch == '?',
                    text: String::new(),
                };
                return Ok(Step::Pending);
            }
            'n' | 'N' => {
                let (pattern, backward) = self
                    .last_search
                    .clone()
                    .ok_or(DispatchError::Action(ActionError::NoPreviousPattern))?;
                let backward = backward != (ch == 'N');
                return self.complete_motion(mode, Motion::Search { pattern, backward });
            }
            'G' => return self.complete_motion(mode, Motion::FileEnd),
            _ => {}
        }
        if (self.operator_pending() || visual) && (ch == 'i' || ch == 'a') {
            self.awaiting = Awaiting::TextObject { inner: ch == 'i' };
            return Ok(Step::Pending);
        }
        if visual {
            return self.visual_key(mode, ch);
        }
        if let Some(op) = bindings::operator(ch) {
            return self.operator_key(mode, op);
        }
        // `guu`, `gUU`, `g~~`
        if let Some(pending) = self.pending.operator
            && bindings::g_operator(ch) == Some(pending)
        {
            return self.complete_target(OperatorTarget::Lines);
        }
        if self.operator_pending() {
            return Err(invalid(&format!(
                "{}{ch}",
                self.pending.operator.map(Operator::keys).unwrap_or_default()
            )));
        }
        if let Some((op, target)) = bindings::shorthand(ch) {
            let target = match target {
                ShorthandTarget::Motion(m) => OperatorTarget::Motion(m),
                ShorthandTarget::Lines => OperatorTarget::Lines,
            };
            self.pending.operator = Some(op);
            return self.complete_target(target);
        }
        if let Some(entry) = bindings::insert_entry(ch) {
            return self.done(Command::Insert(entry));
        }
        let count = self.pending.count;
        let register = self.pending.register;
        let cmd = match ch {
            'R' => Command::Replace,
            'p' | 'P' => Command::Put {
                before: ch == 'P',
                count: count.unwrap_or(1),
                register,
            },
            'r' => {
                self.awaiting = Awaiting::ReplaceChar;
                return Ok(Step::Pending);
            }
            'm' => {
                self.awaiting = Awaiting::SetMark;
                return Ok(Step::Pending);
            }
            'J' => Command::JoinLines {
                count: count.unwrap_or(2).max(2),
            },
            'u' => Command::Undo {
                count: count.unwrap_or(1),
            },
            'v' => Command::Visual(SelectionKind::Characterwise),
            'V' => Command::Visual(SelectionKind::Linewise),
            ':' => Command::CommandLine(match count {
                None => String::new(),
                Some(1) => ".".to_string(),
                Some(n) => format!(".,.+{}", n - 1),
            }),
            '.' => Command::RepeatLastChange { count },
            _ => return Err(invalid(&ch.to_string())),
        };
        self.done(cmd)
    }

    fn ctrl_key(&mut self, mode: Mode, key: &KeyEvent) -> Result<Step, DispatchError> {
        if self.operator_pending() {
            return Err(invalid(&to_key_notation(key)));
        }
        let count = self.pending.count;
        let cmd = match key.code {
            KeyCode::Char('r') if !mode.has_selection() => Command::Redo {
                count: count.unwrap_or(1),
            },
            KeyCode::Char('v') => Command::Visual(SelectionKind::Blockwise),
            KeyCode::Char('g') if mode.has_selection() => Command::ToggleSelect,
            _ => return Err(invalid(&to_key_notation(key))),
        };
        self.done(cmd)
    }

    fn visual_key(&mut self, mode: Mode, ch: char) -> Result<Step, DispatchError> {
        if let Some(op) = bindings::visual_operator(ch) {
            return self.operator_key(mode, op);
        }
        if ch == 'r' {
            self.awaiting = Awaiting::ReplaceChar;
            return Ok(Step::Pending);
        }
        let register = self.pending.register;
        let cmd = match ch {
            'o' | 'O' => Command::SwapSelectionEnds,
            'v' => Command::Visual(SelectionKind::Characterwise),
            'V' => Command::Visual(SelectionKind::Linewise),
            ':' => Command::CommandLine("'<,'>".to_string()),
            'J' => Command::JoinLines { count: 2 },
            'p' | 'P' => Command::Put {
                before: ch == 'P',
                count: self.pending.count.unwrap_or(1),
                register,
            },
            _ => return Err(invalid(&ch.to_string())),
        };
        self.done(cmd)
    }

    fn prefixed(&mut self, mode: Mode, prefix: char, key: &KeyEvent) -> Result<Step, DispatchError> {
        let bad = || invalid(&format!("{prefix}{}", to_key_notation(key)));
        let ch = key.plain_char();
        match (prefix, ch) {
            ('g', Some('g')) => self.complete_motion(mode, Motion::FileStart),
            ('g', Some(c)) if bindings::g_operator(c).is_some() => {
                let op = bindings::g_operator(c).ok_or_else(bad)?;
                self.operator_key(mode, op)
            }
            ('g', Some('v')) if !self.operator_pending() && !mode.has_selection() => {
                self.done(Command::Reselect)
            }
            ('z', _) if !self.operator_pending() => {
                let anchor = match key.code {
                    KeyCode::Char('z') | KeyCode::Char('.') => ScrollAnchor::Center,
                    KeyCode::Char('t') | KeyCode::Enter => ScrollAnchor::Top,
                    KeyCode::Char('b') | KeyCode::Char('-') => ScrollAnchor::Bottom,
                    _ => return Err(bad()),
                };
                self.done(Command::Scroll(anchor))
            }
            ('[', Some('[')) => self.complete_motion(mode, Motion::SectionBackward),
            (']', Some(']')) => self.complete_motion(mode, Motion::SectionForward),
            _ => Err(bad()),
        }
    }

    fn select_key(&mut self, key: &KeyEvent) -> Result<Step, DispatchError> {
        if key.code == KeyCode::Esc || key.is_ctrl('c') {
            self.reset();
            return Ok(Step::Done(Command::Escape));
        }
        if key.is_ctrl('g') {
            return self.done(Command::ToggleSelect);
        }
        if let Some(motion) = bindings::motion(key).filter(|_| key.plain_char().is_none()) {
            return self.done(Command::Motion { motion, count: 1 });
        }
        let cmd = match key.code {
            KeyCode::Backspace | KeyCode::Delete => Command::Operator {
                op: Operator::Delete,
                target: OperatorTarget::Selection,
                count: 1,
                register: None,
            },
            KeyCode::Enter => Command::ReplaceSelection("\n".to_string()),
            KeyCode::Tab => Command::ReplaceSelection("\t".to_string()),
            KeyCode::Char(c) if key.mods.is_empty() => Command::ReplaceSelection(c.to_string()),
            _ => return Err(invalid(&to_key_notation(key))),
        };
        self.done(cmd)
    }

    // --------------------------------------------------------------------------------------------
    // Completion helpers
    // --------------------------------------------------------------------------------------------

    fn operator_key(&mut self, mode: Mode, op: Operator) -> Result<Step, DispatchError> {
        if mode.has_selection() {
            let register = self.pending.register;
            let count = self.pending.count.unwrap_or(1);
            return self.done(Command::Operator {
                op,
                target: OperatorTarget::Selection,
                count,
                register,
            });
        }
        match self.pending.operator {
            Some(pending) if pending == op => self.complete_target(OperatorTarget::Lines),
            Some(pending) => Err(invalid(&format!("{}{}", pending.keys(), op.keys()))),
            None => {
                self.pending.operator = Some(op);
                self.pending.operator_count = self.pending.count.take();
                trace!(target: "input.context", op = op.keys(), "operator_pending");
                Ok(Step::Pending)
            }
        }
    }

    fn complete_motion(&mut self, mode: Mode, motion: Motion) -> Result<Step, DispatchError> {
        // `G` and `gg` take the count as a line number, `%` as a percentage.
        let motion = match (motion, self.pending.total_count()) {
            (Motion::FileStart | Motion::FileEnd, Some(line)) => Motion::GotoLine(line),
            (Motion::MatchPair, Some(percent)) => Motion::Percent(percent),
            (m, _) => m,
        };
        if matches!(motion, Motion::GotoLine(_) | Motion::Percent(_)) {
            self.pending.count = None;
            self.pending.operator_count = None;
        }
        if self.operator_pending() && !mode.has_selection() {
            return self.complete_target(OperatorTarget::Motion(motion));
        }
        let count = self.take_count();
        self.done(Command::Motion { motion, count })
    }

    fn complete_target(&mut self, target: OperatorTarget) -> Result<Step, DispatchError> {
        let Some(op) = self.pending.operator else {
            return Err(invalid("operator"));
        };
        let count = self.pending.total_count().unwrap_or(1);
        let register = self.pending.register;
        self.done(Command::Operator {
            op,
            target,
            count,
            register,
        })
    }

    fn take_count(&mut self) -> usize {
        self.pending.total_count().unwrap_or(1)
    }

    fn done(&mut self, cmd: Command) -> Result<Step, DispatchError> {
        self.reset();
        Ok(Step::Done(cmd))
    }
}

/// Insert and Replace mode keys.
fn insert_key(key: &KeyEvent) -> Step {
    let cmd = match key.code {
        KeyCode::Esc => Command::LeaveInsert,
        KeyCode::Enter => Command::InsertNewline,
        KeyCode::Backspace => Command::InsertBackspace,
        KeyCode::Delete => Command::InsertDelete,
        KeyCode::Insert => Command::ToggleInsertReplace,
        KeyCode::Tab => Command::InsertText("\t".to_string()),
        KeyCode::Char(c) if key.mods.is_empty() => Command::InsertText(c.to_string()),
        _ if key.is_ctrl('c') || key.is_ctrl('[') => Command::LeaveInsert,
        _ if key.is_ctrl('o') => Command::InsertNormalOnce,
        _ if key.is_ctrl('h') => Command::InsertBackspace,
        _ if key.is_ctrl('j') || key.is_ctrl('m') => Command::InsertNewline,
        _ if key.is_ctrl('w') => Command::Operator {
            op: Operator::Delete,
            target: OperatorTarget::Motion(Motion::WordBackward),
            count: 1,
            register: Some('_'),
        },
        _ => match bindings::motion(key).filter(|_| key.plain_char().is_none()) {
            Some(motion) => Command::Motion { motion, count: 1 },
            None => return Step::Pending,
        },
    };
    Step::Done(cmd)
}

fn literal(key: &KeyEvent) -> Result<char, DispatchError> {
    match key.code {
        KeyCode::Char(c) if key.mods.is_empty() => Ok(c),
        KeyCode::Tab => Ok('\t'),
        _ => Err(invalid(&to_key_notation(key))),
    }
}

fn valid_register(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || "\"-_*+/:.%#=".contains(ch)
}

fn invalid(keys: &str) -> DispatchError {
    DispatchError::InvalidKey(keys.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{TextObject, TextObjectKind};
    use core_events::parse_keys;
    use pretty_assertions::assert_eq;

    /// Feed `keys` in Normal mode (or OperatorPending once an operator is
    /// pending) and return the last step.
    fn feed(h: &mut KeyHandler, mode: Mode, keys: &str) -> Result<Step, DispatchError> {
        let mut last = Ok(Step::Pending);
        for key in parse_keys(keys) {
            last = h.handle(mode, &key);
            if last.is_err() {
                break;
            }
        }
        last
    }

    fn command(keys: &str) -> Command {
        let mut h = KeyHandler::new();
        match feed(&mut h, Mode::Normal, keys).unwrap() {
            Step::Done(cmd) => {
                assert!(h.is_idle(), "handler not idle after {keys}");
                cmd
            }
            Step::Pending => panic!("{keys} left the command pending"),
        }
    }

    fn op(op: Operator, target: OperatorTarget, count: usize) -> Command {
        Command::Operator {
            op,
            target,
            count,
            register: None,
        }
    }

    #[test]
    fn counts_multiply() {
        assert_eq!(
            command("2d3w"),
            op(Operator::Delete, OperatorTarget::Motion(Motion::WordForward), 6)
        );
        assert_eq!(
            command("d3w"),
            op(Operator::Delete, OperatorTarget::Motion(Motion::WordForward), 3)
        );
        assert_eq!(
            command("10j"),
            Command::Motion {
                motion: Motion::Down,
                count: 10
            }
        );
    }

    #[test]
    fn zero_after_operator_is_line_start() {
        assert_eq!(
            command("d0"),
            op(Operator::Delete, OperatorTarget::Motion(Motion::LineStart), 1)
        );
        assert_eq!(
            command("10l"),
            Command::Motion {
                motion: Motion::Right,
                count: 10
            }
        );
    }

    #[test]
    fn doubled_operators_are_linewise() {
        assert_eq!(command("3dd"), op(Operator::Delete, OperatorTarget::Lines, 3));
        assert_eq!(command("gUU"), op(Operator::Uppercase, OperatorTarget::Lines, 1));
        assert_eq!(command("gugu"), op(Operator::Lowercase, OperatorTarget::Lines, 1));
        assert_eq!(command("g~~"), op(Operator::ToggleCase, OperatorTarget::Lines, 1));
        assert_eq!(command(">>"), op(Operator::Indent, OperatorTarget::Lines, 1));
    }

    #[test]
    fn register_prefix() {
        assert_eq!(
            command("\"a2yy"),
            Command::Operator {
                op: Operator::Yank,
                target: OperatorTarget::Lines,
                count: 2,
                register: Some('a'),
            }
        );
        assert_eq!(
            command("\"bp"),
            Command::Put {
                before: false,
                count: 1,
                register: Some('b')
            }
        );
    }

    #[test]
    fn goto_line_uses_count_as_line_number() {
        assert_eq!(
            command("5G"),
            Command::Motion {
                motion: Motion::GotoLine(5),
                count: 1
            }
        );
        assert_eq!(
            command("gg"),
            Command::Motion {
                motion: Motion::FileStart,
                count: 1
            }
        );
        assert_eq!(
            command("d3gg"),
            op(Operator::Delete, OperatorTarget::Motion(Motion::GotoLine(3)), 1)
        );
    }

    #[test]
    fn percent_with_and_without_count() {
        assert_eq!(
            command("%"),
            Command::Motion {
                motion: Motion::MatchPair,
                count: 1
            }
        );
        assert_eq!(
            command("50%"),
            Command::Motion {
                motion: Motion::Percent(50),
                count: 1
            }
        );
        assert_eq!(
            command("y%"),
            op(Operator::Yank, OperatorTarget::Motion(Motion::MatchPair), 1)
        );
        assert_eq!(
            command("2d5%"),
            op(Operator::Delete, OperatorTarget::Motion(Motion::Percent(10)), 1)
        );
    }

    #[test]
    fn text_objects_after_operator() {
        assert_eq!(
            command("ci\""),
            op(
                Operator::Change,
                OperatorTarget::TextObject(TextObject {
                    kind: TextObjectKind::Quote('"'),
                    inner: true
                }),
                1
            )
        );
        assert_eq!(
            command("2daw"),
            op(
                Operator::Delete,
                OperatorTarget::TextObject(TextObject {
                    kind: TextObjectKind::Word,
                    inner: false
                }),
                2
            )
        );
    }

    #[test]
    fn shorthands_expand() {
        assert_eq!(
            command("3x"),
            op(Operator::Delete, OperatorTarget::Motion(Motion::Right), 3)
        );
        assert_eq!(
            command("D"),
            op(Operator::Delete, OperatorTarget::Motion(Motion::LineEnd), 1)
        );
        assert_eq!(command("S"), op(Operator::Change, OperatorTarget::Lines, 1));
        assert_eq!(command("Y"), op(Operator::Yank, OperatorTarget::Lines, 1));
    }

    #[test]
    fn find_and_repeat() {
        let mut h = KeyHandler::new();
        feed(&mut h, Mode::Normal, "fx").unwrap();
        assert_eq!(h.last_find(), Some((FindKind::Forward, 'x')));
        assert_eq!(
            feed(&mut h, Mode::Normal, ",").unwrap(),
            Step::Done(Command::Motion {
                motion: Motion::FindChar {
                    kind: FindKind::Backward,
                    ch: 'x'
                },
                count: 1
            })
        );
        assert_eq!(
            command("dt)"),
            op(
                Operator::Delete,
                OperatorTarget::Motion(Motion::FindChar {
                    kind: FindKind::ForwardTill,
                    ch: ')'
                }),
                1
            )
        );
    }

    #[test]
    fn search_collects_pattern() {
        let mut h = KeyHandler::new();
        assert_eq!(feed(&mut h, Mode::Normal, "d/fo").unwrap(), Step::Pending);
        assert!(h.wants_literal());
        assert_eq!(h.search_text(), Some("fo"));
        let step = feed(&mut h, Mode::Normal, "o<CR>").unwrap();
        assert_eq!(
            step,
            Step::Done(op(
                Operator::Delete,
                OperatorTarget::Motion(Motion::Search {
                    pattern: "foo".into(),
                    backward: false
                }),
                1
            ))
        );
        assert_eq!(
            feed(&mut h, Mode::Normal, "N").unwrap(),
            Step::Done(Command::Motion {
                motion: Motion::Search {
                    pattern: "foo".into(),
                    backward: true
                },
                count: 1
            })
        );
    }

    #[test]
    fn escape_clears_pending_state() {
        let mut h = KeyHandler::new();
        feed(&mut h, Mode::Normal, "\"a3d2").unwrap();
        assert!(h.operator_pending());
        assert_eq!(
            h.pending().clone(),
            PendingState {
                count: Some(2),
                register: Some('a'),
                operator: Some(Operator::Delete),
                operator_count: Some(3),
            }
        );
        assert_eq!(
            feed(&mut h, Mode::OperatorPending, "<Esc>").unwrap(),
            Step::Done(Command::Escape)
        );
        assert!(h.is_idle());
    }

    #[test]
    fn invalid_combinations_reset() {
        let mut h = KeyHandler::new();
        let err = feed(&mut h, Mode::Normal, "dy").unwrap_err();
        assert_eq!(err.to_string(), "Invalid key sequence: dy");
        assert!(h.is_idle());
        assert!(feed(&mut h, Mode::Normal, "2dQ").is_err());
        assert!(h.is_idle());
        assert!(feed(&mut h, Mode::Normal, "zq").is_err());
        assert!(h.is_idle());
    }

    #[test]
    fn visual_keys() {
        let mut h = KeyHandler::new();
        let visual = Mode::Visual(SelectionKind::Characterwise);
        assert_eq!(
            feed(&mut h, visual, "d").unwrap(),
            Step::Done(op(Operator::Delete, OperatorTarget::Selection, 1))
        );
        assert_eq!(
            feed(&mut h, visual, "U").unwrap(),
            Step::Done(op(Operator::Uppercase, OperatorTarget::Selection, 1))
        );
        assert_eq!(
            feed(&mut h, visual, "iw").unwrap(),
            Step::Done(Command::SelectTextObject(TextObject {
                kind: TextObjectKind::Word,
                inner: true
            }))
        );
        assert_eq!(
            feed(&mut h, visual, ":").unwrap(),
            Step::Done(Command::CommandLine("'<,'>".into()))
        );
        assert_eq!(
            feed(&mut h, visual, "<C-G>").unwrap(),
            Step::Done(Command::ToggleSelect)
        );
    }

    #[test]
    fn command_line_prefill_from_count() {
        assert_eq!(command(":"), Command::CommandLine(String::new()));
        assert_eq!(command("3:"), Command::CommandLine(".,.+2".into()));
    }

    #[test]
    fn insert_mode_keys() {
        let mut h = KeyHandler::new();
        let step = |h: &mut KeyHandler, k: &str| feed(h, Mode::Insert, k).unwrap();
        assert_eq!(step(&mut h, "x"), Step::Done(Command::InsertText("x".into())));
        assert_eq!(step(&mut h, "<CR>"), Step::Done(Command::InsertNewline));
        assert_eq!(step(&mut h, "<C-O>"), Step::Done(Command::InsertNormalOnce));
        assert_eq!(step(&mut h, "<Insert>"), Step::Done(Command::ToggleInsertReplace));
        assert_eq!(step(&mut h, "<Esc>"), Step::Done(Command::LeaveInsert));
        assert_eq!(command("O"), Command::Insert(InsertEntry::OpenAbove));
    }

    #[test]
    fn select_mode_typing_replaces() {
        let mut h = KeyHandler::new();
        let select = Mode::Select(SelectionKind::Characterwise);
        assert_eq!(
            feed(&mut h, select, "a").unwrap(),
            Step::Done(Command::ReplaceSelection("a".into()))
        );
        assert_eq!(
            feed(&mut h, select, "<Right>").unwrap(),
            Step::Done(Command::Motion {
                motion: Motion::Right,
                count: 1
            })
        );
    }

    mod count_law {
        use super::*;
        use proptest::prelude::*;

        fn motion_key() -> impl Strategy<Value = (&'static str, Motion)> {
            prop_oneof![
                Just(("w", Motion::WordForward)),
                Just(("b", Motion::WordBackward)),
                Just(("e", Motion::WordEnd)),
                Just(("j", Motion::Down)),
                Just(("$", Motion::LineEnd)),
            ]
        }

        proptest! {
            #[test]
            fn operator_count_times_motion_count(
                a in 1usize..60,
                b in 1usize..60,
                (key, motion) in motion_key(),
            ) {
                let expected = op(Operator::Delete, OperatorTarget::Motion(motion), a * b);
                prop_assert_eq!(command(&format!("{a}d{b}{key}")), expected.clone());
                prop_assert_eq!(command(&format!("d{}{key}", a * b)), expected);
            }

            #[test]
            fn doubled_operator_takes_the_product(a in 1usize..60, b in 1usize..60) {
                prop_assert_eq!(
                    command(&format!("{a}y{b}y")),
                    Command::Operator {
                        op: Operator::Yank,
                        target: OperatorTarget::Lines,
                        count: a * b,
                        register: None,
                    }
                );
            }
        }
    }
}
