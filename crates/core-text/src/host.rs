//! [`TextHost`]: a complete host over a single [`Buffer`].
//!
//! It keeps the caret, the live selection, Vim's register rules, marks and a
//! transactional undo history, and runs every resolved [`Command`] against
//! the buffer. Named host actions are only recorded; a caller embedding the
//! host reads them back with [`TextHost::take_actions`].

use std::collections::HashMap;

use core_actions::{
    ActionError, ActionExecutor, Command, ExecContext, InsertEntry, Motion, MotionClass, Operator,
    OperatorTarget, TextObject,
};
use core_state::{
    HostError, HostSurface, Mode, Position, RegexEngine, RegisterContent, Registers, Selection,
    SelectionKind, TextRange,
};
use tracing::{debug, trace};

use crate::pattern::VimRegex;
use crate::undo::UndoEngine;
use crate::{Buffer, grapheme, motion, text_object};

/// Columns a tab advances to when measuring indent.
const TABSTOP: usize = 8;

#[derive(Debug, Default)]
pub struct TextHost {
    buffer: Buffer,
    caret: Position,
    selection: Option<Selection>,
    registers: Registers,
    marks: HashMap<char, Position>,
    undo: UndoEngine,
    /// Visual column `j` and `k` try to keep; `usize::MAX` after `$`.
    sticky_col: Option<usize>,
    actions: Vec<String>,
    read_only: bool,
}

impl TextHost {
    pub fn new(text: &str) -> Self {
        Self::from_buffer(Buffer::from_str("", text))
    }

    pub fn from_buffer(buffer: Buffer) -> Self {
        Self {
            buffer,
            ..Self::default()
        }
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn contents(&self) -> String {
        self.buffer.text()
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn undo_history(&self) -> &UndoEngine {
        &self.undo
    }

    /// Host actions requested so far (`<Action>(name)`, `:action`, user
    /// commands), oldest first.
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn take_actions(&mut self) -> Vec<String> {
        std::mem::take(&mut self.actions)
    }

    /// Refuse every text change with E21.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn writable(&self) -> Result<(), HostError> {
        if self.read_only {
            Err(HostError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn line_text(&self, idx: usize) -> String {
        self.buffer.line(idx).unwrap_or_default()
    }

    fn last_line_idx(&self) -> usize {
        self.buffer.line_count().saturating_sub(1)
    }

    fn first_non_blank_pos(&self, line: usize) -> Position {
        let mut pos = Position::new(line.min(self.last_line_idx()), 0);
        motion::first_non_blank(&self.buffer, &mut pos);
        pos
    }

    /// Position just past the grapheme at `pos`.
    fn after(&self, pos: Position) -> Position {
        let line = self.line_text(pos.line);
        Position::new(pos.line, grapheme::next_boundary(&line, pos.byte))
    }

    fn note_change(&mut self, start: Position, end: Position) {
        self.marks.insert('[', start);
        self.marks.insert(']', end);
        self.marks.insert('.', start);
    }
}

// ------------------------------------------------------------------------------------------------
// HostSurface
// ------------------------------------------------------------------------------------------------

fn mark_slot(name: char) -> Result<char, HostError> {
    match name {
        '`' => Ok('\''),
        c if c.is_ascii_alphabetic() => Ok(c),
        '\'' | '<' | '>' | '[' | ']' | '.' | '^' | '"' => Ok(name),
        _ => Err(HostError::InvalidMark),
    }
}

impl HostSurface for TextHost {
    fn caret(&self) -> Position {
        self.caret
    }

    fn set_caret(&mut self, pos: Position) {
        let mut pos = pos;
        motion::clamp_line(&self.buffer, &mut pos);
        self.caret = pos;
        self.sticky_col = None;
    }

    fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    fn line_count(&self) -> usize {
        self.buffer.line_count()
    }

    fn line(&self, idx: usize) -> Option<String> {
        self.buffer.line(idx)
    }

    fn text(&self, range: &TextRange) -> Result<String, HostError> {
        if range.end.line > self.last_line_idx() {
            return Err(HostError::OutOfRange);
        }
        Ok(match range.kind {
            SelectionKind::Characterwise => self.buffer.slice(range.start, range.end),
            SelectionKind::Linewise => (range.start.line..=range.end.line)
                .map(|l| format!("{}\n", self.line_text(l)))
                .collect(),
            SelectionKind::Blockwise => (range.start.line..=range.end.line)
                .map(|l| {
                    let line = self.line_text(l);
                    let (s, e) = block_columns(&line, range);
                    format!("{}\n", &line[s..e])
                })
                .collect(),
        })
    }

    fn replace(&mut self, range: &TextRange, text: &str) -> Result<(), HostError> {
        self.writable()?;
        let last = self.last_line_idx();
        if range.end.line > last {
            return Err(HostError::OutOfRange);
        }
        trace!(target: "text.host", ?range, len = text.len(), "replace");
        match range.kind {
            SelectionKind::Characterwise => {
                let start = self.buffer.offset(range.start);
                let end = self.buffer.offset(range.end);
                self.buffer.replace_bytes(start, end, text);
            }
            SelectionKind::Linewise => {
                let start = self.buffer.offset(Position::new(range.start.line, 0));
                if range.end.line < last {
                    let end = self.buffer.offset(Position::new(range.end.line + 1, 0));
                    self.buffer.replace_bytes(start, end, text);
                } else if text.is_empty() {
                    // The final line has no terminator: take the one before it.
                    let start = start.saturating_sub(1);
                    self.buffer.replace_bytes(start, self.buffer.len_bytes(), "");
                } else {
                    let body = text.strip_suffix('\n').unwrap_or(text);
                    self.buffer.replace_bytes(start, self.buffer.len_bytes(), body);
                }
            }
            SelectionKind::Blockwise => {
                let rows: Vec<&str> = text.split('\n').collect();
                for (i, l) in (range.start.line..=range.end.line).enumerate() {
                    let line = self.line_text(l);
                    let (s, e) = block_columns(&line, range);
                    let piece = if rows.len() > 1 {
                        rows.get(i).copied().unwrap_or("")
                    } else {
                        text
                    };
                    let base = self.buffer.offset(Position::new(l, 0));
                    self.buffer.replace_bytes(base + s, base + e, piece);
                }
            }
        }
        motion::clamp_line(&self.buffer, &mut self.caret);
        Ok(())
    }

    fn begin_undo_transaction(&mut self) {
        self.undo.begin(self.caret, &self.buffer);
    }

    fn end_undo_transaction(&mut self) {
        self.undo.end(&self.buffer);
    }

    fn register(&self, name: char) -> Option<RegisterContent> {
        self.registers.get(name)
    }

    fn set_register(&mut self, name: char, content: RegisterContent) -> Result<(), HostError> {
        self.registers.set(name, content)
    }

    fn register_names(&self) -> Vec<char> {
        self.registers.names()
    }

    fn mark(&self, name: char) -> Option<Position> {
        let slot = mark_slot(name).ok()?;
        self.marks.get(&slot).copied()
    }

    fn set_mark(&mut self, name: char, pos: Position) -> Result<(), HostError> {
        let slot = mark_slot(name)?;
        self.marks.insert(slot, pos);
        Ok(())
    }

    fn delete_mark(&mut self, name: char) -> Result<(), HostError> {
        let slot = mark_slot(name)?;
        self.marks.remove(&slot);
        Ok(())
    }
}

/// Byte columns of `range` on one line of a block, clamped to the line.
fn block_columns(line: &str, range: &TextRange) -> (usize, usize) {
    let left = range.start.byte.min(range.end.byte).min(line.len());
    let right = range.start.byte.max(range.end.byte).min(line.len());
    (left, right)
}

// ------------------------------------------------------------------------------------------------
// RegexEngine
// ------------------------------------------------------------------------------------------------

impl RegexEngine for TextHost {
    fn find(
        &self,
        pattern: &str,
        haystack: &str,
        start: usize,
        ignore_case: bool,
    ) -> Result<Option<(usize, usize)>, HostError> {
        Ok(VimRegex::new(pattern, ignore_case)?.find_at(haystack, start))
    }

    fn substitute(
        &self,
        pattern: &str,
        haystack: &str,
        replacement: &str,
        global: bool,
        ignore_case: bool,
    ) -> Result<String, HostError> {
        Ok(VimRegex::new(pattern, ignore_case)?.substitute(haystack, replacement, global))
    }
}

// ------------------------------------------------------------------------------------------------
// ActionExecutor
// ------------------------------------------------------------------------------------------------

/// Commands that change text.
fn modifies(cmd: &Command) -> bool {
    match cmd {
        Command::Operator { op, .. } => *op != Operator::Yank,
        Command::Insert(entry) => matches!(entry, InsertEntry::OpenBelow | InsertEntry::OpenAbove),
        Command::Put { .. }
        | Command::ReplaceChar { .. }
        | Command::JoinLines { .. }
        | Command::Undo { .. }
        | Command::Redo { .. }
        | Command::InsertText(_)
        | Command::InsertNewline
        | Command::InsertBackspace
        | Command::InsertDelete => true,
        _ => false,
    }
}

/// Commands after which the caret may rest past the last character.
fn leaves_caret_in_text(cmd: &Command, mode: Mode) -> bool {
    match cmd {
        Command::Insert(_) | Command::Replace => true,
        Command::Operator { op, .. } => *op == Operator::Change || mode.is_text_entry(),
        Command::LeaveInsert => false,
        _ => mode.is_text_entry(),
    }
}

impl ActionExecutor for TextHost {
    fn execute(&mut self, cmd: &Command, ctx: &ExecContext) -> Result<(), ActionError> {
        if modifies(cmd) {
            self.writable()?;
        }
        let keep_sticky = matches!(
            cmd,
            Command::Motion {
                motion: Motion::Up | Motion::Down | Motion::LineEnd,
                ..
            }
        );
        let result = self.dispatch(cmd, ctx);
        if !keep_sticky {
            self.sticky_col = None;
        }
        if leaves_caret_in_text(cmd, ctx.mode) {
            motion::clamp_line(&self.buffer, &mut self.caret);
        } else {
            motion::normalize_normal_mode_position(&self.buffer, &mut self.caret);
        }
        result
    }
}

impl TextHost {
    fn dispatch(&mut self, cmd: &Command, ctx: &ExecContext) -> Result<(), ActionError> {
        match cmd {
            Command::Motion { motion, count } => self.run_motion(motion, *count, ctx),
            Command::Operator {
                op,
                target,
                count,
                register,
            } => self.run_operator(*op, target, *count, *register, ctx),
            Command::Put {
                before,
                count,
                register,
            } => self.put(*before, *count, *register, ctx),
            Command::ReplaceChar { ch, count } => self.replace_char(*ch, *count, ctx),
            Command::JoinLines { count } => {
                self.join_lines(*count, ctx);
                Ok(())
            }
            Command::Undo { count } => {
                for _ in 0..*count {
                    if !self.undo.undo(&mut self.caret, &mut self.buffer) {
                        debug!(target: "text.host", "already_at_oldest_change");
                        break;
                    }
                }
                Ok(())
            }
            Command::Redo { count } => {
                for _ in 0..*count {
                    if !self.undo.redo(&mut self.caret, &mut self.buffer) {
                        debug!(target: "text.host", "already_at_newest_change");
                        break;
                    }
                }
                Ok(())
            }
            Command::SetMark(name) => Ok(self.set_mark(*name, self.caret)?),
            Command::Insert(entry) => {
                self.enter_insert(*entry);
                Ok(())
            }
            Command::SelectTextObject(obj) => {
                self.select_text_object(*obj);
                Ok(())
            }
            Command::HostAction(name) => {
                debug!(target: "text.host", action = %name, "host_action");
                self.actions.push(name.clone());
                Ok(())
            }
            Command::InsertText(text) => {
                self.insert_text(text, ctx.mode == Mode::Replace);
                Ok(())
            }
            Command::InsertNewline => {
                self.buffer.insert_newline(&mut self.caret);
                Ok(())
            }
            Command::InsertBackspace => {
                if ctx.mode == Mode::Replace {
                    motion::left(&self.buffer, &mut self.caret);
                } else {
                    self.buffer.delete_grapheme_before(&mut self.caret);
                }
                Ok(())
            }
            Command::InsertDelete => {
                self.buffer.delete_grapheme_at(&self.caret);
                Ok(())
            }
            Command::LeaveInsert => {
                self.marks.insert('^', self.caret);
                motion::left(&self.buffer, &mut self.caret);
                Ok(())
            }
            // Mode changes, selection bookkeeping and the command line are
            // handled by the session; there is no viewport to scroll.
            Command::Replace
            | Command::Visual(_)
            | Command::SwapSelectionEnds
            | Command::Reselect
            | Command::ToggleSelect
            | Command::ReplaceSelection(_)
            | Command::CommandLine(_)
            | Command::RepeatLastChange { .. }
            | Command::Scroll(_)
            | Command::Escape
            | Command::ToggleInsertReplace
            | Command::InsertNormalOnce => Ok(()),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Motions
    // --------------------------------------------------------------------------------------------

    fn run_motion(&mut self, m: &Motion, count: usize, ctx: &ExecContext) -> Result<(), ActionError> {
        if let Some(target) = self.motion_target(m, count, ctx)? {
            self.caret = target;
        }
        if *m == Motion::LineEnd {
            self.sticky_col = Some(usize::MAX);
        }
        Ok(())
    }

    /// Where `m` leads from the caret; `None` when it cannot move at all.
    fn motion_target(
        &mut self,
        m: &Motion,
        count: usize,
        ctx: &ExecContext,
    ) -> Result<Option<Position>, ActionError> {
        let count = count.max(1);
        let buf = &self.buffer;
        let last = self.last_line_idx();
        let mut pos = self.caret;
        match m {
            Motion::Left => (0..count).for_each(|_| motion::left(buf, &mut pos)),
            Motion::Right => (0..count).for_each(|_| motion::right(buf, &mut pos)),
            Motion::Up | Motion::Down => {
                let mut sticky = self.sticky_col;
                for _ in 0..count {
                    sticky = if *m == Motion::Up {
                        motion::up(buf, &mut pos, sticky)
                    } else {
                        motion::down(buf, &mut pos, sticky)
                    };
                }
                if pos.line == self.caret.line {
                    return Ok(None);
                }
                self.sticky_col = sticky;
            }
            Motion::WordForward | Motion::BigWordForward => {
                let big = *m == Motion::BigWordForward;
                (0..count).for_each(|_| motion::word_forward(buf, &mut pos, big));
            }
            Motion::WordBackward | Motion::BigWordBackward => {
                let big = *m == Motion::BigWordBackward;
                (0..count).for_each(|_| motion::word_backward(buf, &mut pos, big));
            }
            Motion::WordEnd | Motion::BigWordEnd => {
                let big = *m == Motion::BigWordEnd;
                (0..count).for_each(|_| motion::word_end(buf, &mut pos, big));
            }
            Motion::LineStart => motion::line_start(buf, &mut pos),
            Motion::FirstNonBlank => motion::first_non_blank(buf, &mut pos),
            Motion::LineEnd => {
                pos.line = (pos.line + count - 1).min(last);
                motion::line_end(buf, &mut pos);
            }
            Motion::FileStart => pos = self.first_non_blank_pos(0),
            Motion::FileEnd => pos = self.first_non_blank_pos(last),
            Motion::GotoLine(n) => pos = self.first_non_blank_pos(n.saturating_sub(1)),
            Motion::Percent(n) => {
                if *n > 100 {
                    return Ok(None);
                }
                let line = (n * buf.line_count()).div_ceil(100);
                pos = self.first_non_blank_pos(line.saturating_sub(1));
            }
            Motion::MatchPair => {
                if !motion::match_pair(buf, &mut pos) {
                    return Ok(None);
                }
            }
            Motion::FindChar { kind, ch } => {
                if !motion::find_char(buf, &mut pos, *kind, *ch, count) {
                    return Ok(None);
                }
            }
            Motion::Mark { name, linewise } => {
                let mut at = self.mark(*name).ok_or(ActionError::MarkNotSet)?;
                motion::clamp_line(buf, &mut at);
                pos = if *linewise {
                    self.first_non_blank_pos(at.line)
                } else {
                    at
                };
            }
            Motion::Search { pattern, backward } => {
                pos = self.search(pattern, *backward, count, ctx)?;
            }
            Motion::ParagraphForward => {
                (0..count).for_each(|_| motion::paragraph_forward(buf, &mut pos));
            }
            Motion::ParagraphBackward => {
                (0..count).for_each(|_| motion::paragraph_backward(buf, &mut pos));
            }
            Motion::SectionForward => {
                (0..count).for_each(|_| motion::section_forward(buf, &mut pos));
            }
            Motion::SectionBackward => {
                (0..count).for_each(|_| motion::section_backward(buf, &mut pos));
            }
        }
        Ok(Some(pos))
    }

    fn search(
        &self,
        pattern: &str,
        backward: bool,
        count: usize,
        ctx: &ExecContext,
    ) -> Result<Position, ActionError> {
        if pattern.is_empty() {
            return Err(ActionError::NoPreviousPattern);
        }
        let re = VimRegex::new(pattern, ctx.ignorecase)?;
        let mut pos = self.caret;
        for _ in 0..count {
            let found = if backward {
                self.search_backward(&re, pos, ctx.wrapscan)
            } else {
                self.search_forward(&re, pos, ctx.wrapscan)
            };
            pos = found.ok_or_else(|| ActionError::PatternNotFound(pattern.to_string()))?;
        }
        trace!(target: "text.host", pattern, ?pos, "search_hit");
        Ok(pos)
    }

    fn search_forward(&self, re: &VimRegex, from: Position, wrap: bool) -> Option<Position> {
        let line = self.line_text(from.line);
        let start = grapheme::next_boundary(&line, from.byte);
        if start > from.byte
            && let Some((s, _)) = re.find_at(&line, start)
        {
            return Some(Position::new(from.line, s));
        }
        for l in from.line + 1..self.buffer.line_count() {
            if let Some((s, _)) = re.find_at(&self.line_text(l), 0) {
                return Some(Position::new(l, s));
            }
        }
        if !wrap {
            return None;
        }
        debug!(target: "text.host", "search_hit_bottom");
        (0..=from.line).find_map(|l| {
            let (s, _) = re.find_at(&self.line_text(l), 0)?;
            (l < from.line || s <= from.byte).then(|| Position::new(l, s))
        })
    }

    fn search_backward(&self, re: &VimRegex, from: Position, wrap: bool) -> Option<Position> {
        let line = self.line_text(from.line);
        if let Some((s, _)) = re.rfind_before(&line, from.byte) {
            return Some(Position::new(from.line, s));
        }
        for l in (0..from.line).rev() {
            let text = self.line_text(l);
            if let Some((s, _)) = re.rfind_before(&text, text.len() + 1) {
                return Some(Position::new(l, s));
            }
        }
        if !wrap {
            return None;
        }
        debug!(target: "text.host", "search_hit_top");
        (from.line..self.buffer.line_count()).rev().find_map(|l| {
            let text = self.line_text(l);
            let (s, _) = re.rfind_before(&text, text.len() + 1)?;
            (l > from.line || s >= from.byte).then(|| Position::new(l, s))
        })
    }

    // --------------------------------------------------------------------------------------------
    // Operators
    // --------------------------------------------------------------------------------------------

    fn run_operator(
        &mut self,
        op: Operator,
        target: &OperatorTarget,
        count: usize,
        register: Option<char>,
        ctx: &ExecContext,
    ) -> Result<(), ActionError> {
        let range = match target {
            OperatorTarget::Motion(m) => Some(self.motion_range(op, m, count, ctx)?),
            OperatorTarget::TextObject(obj) => {
                text_object::select(&self.buffer, self.caret, *obj, count)
            }
            OperatorTarget::Lines => {
                let first = self.caret.line;
                let last = (first + count.max(1) - 1).min(self.last_line_idx());
                Some(TextRange::lines(first, last))
            }
            OperatorTarget::Selection => self.selection_range(),
        };
        let Some(range) = range else {
            debug!(target: "text.host", ?op, "no_text_object");
            return Ok(());
        };
        trace!(target: "text.host", ?op, ?range, "operator");
        self.apply_operator(op, range, register, ctx)
    }

    fn motion_range(
        &mut self,
        op: Operator,
        m: &Motion,
        count: usize,
        ctx: &ExecContext,
    ) -> Result<TextRange, ActionError> {
        let from = self.caret;
        let big = *m == Motion::BigWordForward;
        // `cw` on a word changes to its end, like `ce`.
        if op == Operator::Change
            && matches!(m, Motion::WordForward | Motion::BigWordForward)
            && !motion::on_blank(&self.buffer, from)
        {
            let mut to = from;
            let mut steps = count.max(1);
            if motion::at_word_end(&self.buffer, from, big) {
                steps -= 1;
            }
            (0..steps).for_each(|_| motion::word_end(&self.buffer, &mut to, big));
            return Ok(TextRange::chars(from, self.after(to)));
        }
        let to = self
            .motion_target(m, count, ctx)?
            .ok_or(ActionError::EmptyRegion)?;
        let (start, end) = if from <= to { (from, to) } else { (to, from) };
        Ok(match m.class() {
            MotionClass::Linewise => TextRange::lines(start.line, end.line),
            MotionClass::Inclusive => TextRange::chars(start, self.after(end)),
            MotionClass::Exclusive => self.exclusive_range(m, start, end),
        })
    }

    fn exclusive_range(&self, m: &Motion, start: Position, mut end: Position) -> TextRange {
        // A word motion that ran onto the next line stops at the end of the
        // word it moved over.
        if matches!(m, Motion::WordForward | Motion::BigWordForward)
            && end.line > start.line
            && end.byte <= grapheme::first_non_blank(&self.line_text(end.line))
        {
            let prev = end.line - 1;
            end = Position::new(prev, self.buffer.line_byte_len(prev));
        }
        if end.line > start.line && end.byte == 0 {
            let prev = end.line - 1;
            end = Position::new(prev, self.buffer.line_byte_len(prev));
            let indent = grapheme::first_non_blank(&self.line_text(start.line));
            if start.byte <= indent {
                return TextRange::lines(start.line, end.line);
            }
        }
        TextRange::chars(start, end)
    }

    /// The live selection as a range; charwise selections include the
    /// grapheme under the far end, or the line break past an empty line.
    fn selection_range(&self) -> Option<TextRange> {
        let sel = self.selection?;
        let (start, end) = if sel.anchor <= sel.head {
            (sel.anchor, sel.head)
        } else {
            (sel.head, sel.anchor)
        };
        Some(match sel.kind {
            SelectionKind::Linewise => TextRange::lines(start.line, end.line),
            SelectionKind::Characterwise => {
                let len = self.buffer.line_byte_len(end.line);
                let stop = if end.byte >= len && end.line < self.last_line_idx() {
                    Position::new(end.line + 1, 0)
                } else {
                    self.after(end)
                };
                TextRange::chars(start, stop)
            }
            SelectionKind::Blockwise => {
                let left = start.byte.min(end.byte);
                let right_at = Position::new(end.line, start.byte.max(end.byte));
                let right = self.after(right_at).byte.max(right_at.byte);
                TextRange::new(
                    Position::new(start.line, left),
                    Position::new(end.line, right),
                    SelectionKind::Blockwise,
                )
            }
        })
    }

    fn apply_operator(
        &mut self,
        op: Operator,
        range: TextRange,
        register: Option<char>,
        ctx: &ExecContext,
    ) -> Result<(), ActionError> {
        let linewise = range.kind == SelectionKind::Linewise;
        let content = |text: String| RegisterContent { text, linewise };
        match op {
            Operator::Yank => {
                let text = self.text(&range)?;
                self.registers.record_yank(register, content(text));
                self.marks.insert('[', range.start);
                self.marks.insert(']', range.end);
                self.caret = if linewise {
                    Position::new(range.start.line.min(self.caret.line), self.caret.byte)
                } else {
                    range.start
                };
            }
            Operator::Delete => {
                let text = self.text(&range)?;
                self.registers.record_delete(register, content(text));
                self.replace(&range, "")?;
                self.caret = if linewise {
                    self.first_non_blank_pos(range.start.line)
                } else {
                    range.start
                };
                self.note_change(range.start, range.start);
            }
            Operator::Change => {
                let text = self.text(&range)?;
                self.registers.record_delete(register, content(text));
                if linewise {
                    let indent = self.line_text(range.start.line);
                    let indent = &indent[..grapheme::first_non_blank(&indent)];
                    let fresh = format!("{indent}\n");
                    self.replace(&range, &fresh)?;
                    self.caret = Position::new(range.start.line, fresh.len() - 1);
                } else {
                    self.replace(&range, "")?;
                    self.caret = range.start;
                }
                self.note_change(range.start, range.start);
            }
            Operator::Indent | Operator::Outdent => {
                for line in range.start.line..=range.end.line {
                    self.shift_line(line, op == Operator::Indent, ctx.shiftwidth.max(1));
                }
                self.caret = self.first_non_blank_pos(range.start.line);
                self.note_change(
                    Position::new(range.start.line, 0),
                    Position::new(range.end.line, 0),
                );
            }
            Operator::Lowercase | Operator::Uppercase | Operator::ToggleCase => {
                let text = self.text(&range)?;
                let changed: String = text
                    .chars()
                    .flat_map(|c| -> Box<dyn Iterator<Item = char>> {
                        match op {
                            Operator::Lowercase => Box::new(c.to_lowercase()),
                            Operator::Uppercase => Box::new(c.to_uppercase()),
                            _ if c.is_uppercase() => Box::new(c.to_lowercase()),
                            _ => Box::new(c.to_uppercase()),
                        }
                    })
                    .collect();
                self.replace(&range, &changed)?;
                self.caret = if linewise {
                    Position::new(range.start.line, 0)
                } else {
                    range.start
                };
                self.note_change(range.start, range.end);
            }
        }
        Ok(())
    }

    fn shift_line(&mut self, line: usize, indent: bool, shiftwidth: usize) {
        let text = self.line_text(line);
        if text.is_empty() {
            return;
        }
        let lead = grapheme::first_non_blank(&text);
        let width = text[..lead].chars().fold(0, |col, c| {
            if c == '\t' {
                (col / TABSTOP + 1) * TABSTOP
            } else {
                col + 1
            }
        });
        let new_width = if indent {
            (width / shiftwidth + 1) * shiftwidth
        } else {
            width.saturating_sub(1) / shiftwidth * shiftwidth
        };
        let new_width = if !indent && width == 0 { 0 } else { new_width };
        let base = self.buffer.offset(Position::new(line, 0));
        self.buffer
            .replace_bytes(base, base + lead, &" ".repeat(new_width));
    }

    // --------------------------------------------------------------------------------------------
    // Other edits
    // --------------------------------------------------------------------------------------------

    /// Insert whole lines (`text` ends in `\n`) so the first becomes line
    /// `at`; `at` may be one past the last line.
    fn insert_lines(&mut self, at: usize, text: &str) {
        if at <= self.last_line_idx() {
            let offset = self.buffer.offset(Position::new(at, 0));
            self.buffer.replace_bytes(offset, offset, text);
        } else {
            let end = self.buffer.len_bytes();
            let body = text.strip_suffix('\n').unwrap_or(text);
            self.buffer.replace_bytes(end, end, &format!("\n{body}"));
        }
    }

    fn put(
        &mut self,
        before: bool,
        count: usize,
        register: Option<char>,
        ctx: &ExecContext,
    ) -> Result<(), ActionError> {
        let name = register.unwrap_or('"');
        let content = self
            .registers
            .get(name)
            .ok_or(ActionError::EmptyRegister(name))?;
        let mut text = content.text.repeat(count.max(1));
        if ctx.mode.has_selection()
            && let Some(range) = self.selection_range()
        {
            let replaced = self.text(&range)?;
            self.replace(&range, "")?;
            if range.kind == SelectionKind::Linewise {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                self.insert_lines(range.start.line, &text);
                self.caret = self.first_non_blank_pos(range.start.line);
            } else {
                self.caret = range.start;
                self.insert_chars(&text);
            }
            self.registers.record_delete(
                None,
                RegisterContent {
                    text: replaced,
                    linewise: range.kind == SelectionKind::Linewise,
                },
            );
            return Ok(());
        }
        if content.linewise {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            let at = if before {
                self.caret.line
            } else {
                self.caret.line + 1
            };
            self.insert_lines(at, &text);
            let inserted = text.matches('\n').count();
            self.note_change(Position::new(at, 0), Position::new(at + inserted - 1, 0));
            self.caret = self.first_non_blank_pos(at);
        } else {
            if !before && self.buffer.line_byte_len(self.caret.line) > 0 {
                self.caret = self.after(self.caret);
            }
            self.insert_chars(&text);
        }
        Ok(())
    }

    /// Put characterwise text at the caret, leaving the caret on its last
    /// character (or its first, for text spanning lines).
    fn insert_chars(&mut self, text: &str) {
        let start = self.caret;
        let at = self.buffer.offset(start);
        self.buffer.replace_bytes(at, at, text);
        let end = self.buffer.position(at + text.len());
        self.note_change(start, end);
        self.caret = if text.contains('\n') {
            start
        } else {
            let line = self.line_text(end.line);
            Position::new(end.line, grapheme::prev_boundary(&line, end.byte))
        };
    }

    fn replace_char(&mut self, ch: char, count: usize, ctx: &ExecContext) -> Result<(), ActionError> {
        if ctx.mode.has_selection() {
            let Some(range) = self.selection_range() else {
                return Ok(());
            };
            let text = self.text(&range)?;
            let replaced: String = grapheme::iter(&text)
                .map(|g| if g == "\n" { '\n' } else { ch })
                .collect();
            self.replace(&range, &replaced)?;
            self.caret = range.start;
            return Ok(());
        }
        let line = self.line_text(self.caret.line);
        let start = self.caret.byte;
        let clusters: Vec<&str> = grapheme::iter(&line[start.min(line.len())..])
            .take(count.max(1))
            .collect();
        if clusters.len() < count.max(1) {
            debug!(target: "text.host", count, "replace_char_past_line_end");
            return Ok(());
        }
        let end = start + clusters.iter().map(|g| g.len()).sum::<usize>();
        let line_idx = self.caret.line;
        let base = self.buffer.offset(Position::new(line_idx, 0));
        if ch == '\r' || ch == '\n' {
            self.buffer.replace_bytes(base + start, base + end, "\n");
            self.caret = Position::new(self.caret.line + 1, 0);
        } else {
            let fill = ch.to_string().repeat(count.max(1));
            self.buffer.replace_bytes(base + start, base + end, &fill);
            self.caret.byte = start + fill.len() - ch.len_utf8();
        }
        self.note_change(Position::new(line_idx, start), self.caret);
        Ok(())
    }

    fn join_lines(&mut self, count: usize, ctx: &ExecContext) {
        let (first, lines) = match self.selection_range() {
            Some(range) if ctx.mode.has_selection() => {
                (range.start.line, range.end.line - range.start.line + 1)
            }
            _ => (self.caret.line, count),
        };
        let joins = lines.max(2) - 1;
        let joins = joins.min(self.last_line_idx().saturating_sub(first));
        for _ in 0..joins {
            let current = self.line_text(first);
            let next = self.line_text(first + 1);
            let lead = grapheme::first_non_blank(&next);
            let rest = &next[lead..];
            let sep = if current.is_empty()
                || rest.is_empty()
                || current.ends_with([' ', '\t'])
                || rest.starts_with(')')
            {
                ""
            } else {
                " "
            };
            let from = self.buffer.offset(Position::new(first, current.len()));
            let to = self.buffer.offset(Position::new(first + 1, lead));
            self.buffer.replace_bytes(from, to, sep);
            self.caret = Position::new(first, current.len());
        }
    }

    fn enter_insert(&mut self, entry: InsertEntry) {
        let line = self.line_text(self.caret.line);
        match entry {
            InsertEntry::Before => {}
            InsertEntry::After => {
                if !line.is_empty() {
                    self.caret = self.after(self.caret);
                }
            }
            InsertEntry::LineStart => {
                self.caret.byte = grapheme::first_non_blank(&line);
            }
            InsertEntry::LineEnd => self.caret.byte = line.len(),
            InsertEntry::OpenBelow => {
                let mut end = Position::new(self.caret.line, line.len());
                self.buffer.insert_newline(&mut end);
                self.caret = end;
            }
            InsertEntry::OpenAbove => {
                let mut start = Position::new(self.caret.line, 0);
                self.buffer.insert_newline(&mut start);
                self.caret = Position::new(self.caret.line, 0);
            }
        }
    }

    fn insert_text(&mut self, text: &str, overwrite: bool) {
        if overwrite {
            for g in grapheme::iter(text) {
                let line = self.line_text(self.caret.line);
                if self.caret.byte < line.len() {
                    self.buffer.delete_grapheme_at(&self.caret);
                }
                self.buffer.insert_grapheme(&mut self.caret, g);
            }
            return;
        }
        let at = self.buffer.offset(self.caret);
        self.buffer.replace_bytes(at, at, text);
        self.caret = self.buffer.position(at + text.len());
    }

    fn select_text_object(&mut self, obj: TextObject) {
        let Some(range) = text_object::select(&self.buffer, self.caret, obj, 1) else {
            return;
        };
        let kind = self
            .selection
            .map_or(SelectionKind::Characterwise, |s| s.kind);
        let head = if range.kind == SelectionKind::Linewise {
            Position::new(range.end.line, 0)
        } else if range.end.byte > 0 {
            let line = self.line_text(range.end.line);
            Position::new(range.end.line, grapheme::prev_boundary(&line, range.end.byte))
        } else if range.end.line > range.start.line {
            let prev = range.end.line - 1;
            Position::new(prev, self.buffer.line_byte_len(prev))
        } else {
            range.end
        };
        self.selection = Some(Selection {
            anchor: range.start,
            head,
            kind,
        });
        self.caret = head;
    }
}
