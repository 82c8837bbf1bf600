//! Command execution and mode transitions.
//!
//! The executor only moves the caret and edits text. Everything modal lives
//! here: entering and leaving Visual, Select, Insert and command-line mode,
//! the `'<`/`'>` marks, the `.` history and `<C-O>` from Insert mode.

use core_script::Interpreter;
use core_state::{Mode, Position, RegisterContent, Selection, SelectionKind};
use tracing::{debug, trace};

use super::Core;
use super::typeahead::QueuedKey;
use crate::DispatchError;
use crate::command::{Command, Motion, Operator, OperatorTarget};
use crate::executor::EditorHost;
use crate::key_handler::Step;

impl<H: EditorHost> Core<H> {
    /// Hand one key that survived mapping expansion to the key handler.
    pub(super) fn dispatch_key(
        &mut self,
        interp: &mut Interpreter,
        queued: QueuedKey,
    ) -> Result<(), DispatchError> {
        let was_once = self.insert_once;
        if self.mode == Mode::CommandLine {
            self.cmdline_key(interp, queued.key)?;
        } else {
            match self.handler.handle(self.mode, &queued.key)? {
                Step::Pending => {
                    if self.mode == Mode::Normal && self.handler.operator_pending() {
                        self.mode = Mode::OperatorPending;
                    }
                }
                Step::Done(cmd) => {
                    if self.mode == Mode::OperatorPending {
                        self.mode = Mode::Normal;
                    }
                    self.run_command(interp, cmd)?;
                }
            }
        }
        if was_once {
            self.settle_insert_once();
        }
        Ok(())
    }

    /// After `<C-O>`, return to Insert mode once the Normal-mode command is
    /// complete.
    fn settle_insert_once(&mut self) {
        if !self.insert_once {
            return;
        }
        if self.mode.is_text_entry() {
            self.insert_once = false;
        } else if self.mode == Mode::Normal && self.handler.is_idle() {
            self.insert_once = false;
            self.mode = Mode::Insert;
        }
    }

    pub(super) fn run_command(
        &mut self,
        interp: &mut Interpreter,
        cmd: Command,
    ) -> Result<(), DispatchError> {
        trace!(target: "runtime.session", mode = %self.mode, ?cmd, "command");
        match cmd {
            Command::Escape => {
                self.escape();
                Ok(())
            }
            Command::Motion { ref motion, .. } => self.run_motion(&cmd, motion),
            Command::Operator { .. } => self.run_operator(cmd),
            Command::Put { .. } | Command::ReplaceChar { .. } | Command::JoinLines { .. } => {
                let on_selection = self.mode.has_selection();
                self.execute(&cmd)?;
                if on_selection {
                    self.leave_visual()?;
                } else {
                    self.remember(cmd);
                }
                Ok(())
            }
            Command::Undo { .. }
            | Command::Redo { .. }
            | Command::SetMark(_)
            | Command::Scroll(_)
            | Command::HostAction(_)
            | Command::SelectTextObject(_) => self.execute(&cmd),
            Command::Insert(_) | Command::Replace => {
                self.execute(&cmd)?;
                self.mode = if cmd == Command::Replace {
                    Mode::Replace
                } else {
                    Mode::Insert
                };
                self.remember(cmd);
                Ok(())
            }
            Command::Visual(kind) => self.toggle_visual(kind),
            Command::SwapSelectionEnds => {
                if let Some(sel) = self.host.selection() {
                    let swapped = Selection {
                        anchor: sel.head,
                        head: sel.anchor,
                        kind: sel.kind,
                    };
                    self.host.set_selection(Some(swapped));
                    self.host.set_caret(swapped.head);
                }
                Ok(())
            }
            Command::Reselect => {
                if let Some(sel) = self.last_visual {
                    self.host.set_selection(Some(sel));
                    self.host.set_caret(sel.head);
                    self.mode = Mode::Visual(sel.kind);
                }
                Ok(())
            }
            Command::ToggleSelect => {
                self.mode = match self.mode {
                    Mode::Visual(kind) => Mode::Select(kind),
                    Mode::Select(kind) => Mode::Visual(kind),
                    other => other,
                };
                Ok(())
            }
            Command::ReplaceSelection(text) => {
                self.run_operator(Command::Operator {
                    op: Operator::Change,
                    target: OperatorTarget::Selection,
                    count: 1,
                    register: None,
                })?;
                self.run_command(interp, Command::InsertText(text))
            }
            Command::CommandLine(prefill) => {
                if self.mode.has_selection() {
                    self.leave_visual()?;
                }
                self.cmdline = Some(prefill);
                self.mode = Mode::CommandLine;
                Ok(())
            }
            Command::RepeatLastChange { count } => self.repeat_last_change(interp, count),
            Command::InsertText(_)
            | Command::InsertNewline
            | Command::InsertBackspace
            | Command::InsertDelete => {
                self.execute(&cmd)?;
                self.record_insert(cmd);
                Ok(())
            }
            Command::LeaveInsert => {
                self.execute(&cmd)?;
                self.mode = Mode::Normal;
                if let Some(change) = self.recording.take()
                    && !self.replaying
                {
                    self.last_change = Some(change);
                }
                Ok(())
            }
            Command::ToggleInsertReplace => {
                self.mode = match self.mode {
                    Mode::Insert => Mode::Replace,
                    Mode::Replace => Mode::Insert,
                    other => other,
                };
                Ok(())
            }
            Command::InsertNormalOnce => {
                self.mode = Mode::Normal;
                self.insert_once = true;
                Ok(())
            }
        }
    }

    fn escape(&mut self) {
        match self.mode {
            Mode::Visual(_) | Mode::Select(_) => {
                if let Err(err) = self.leave_visual() {
                    debug!(target: "runtime.session", error = %err, "visual_marks_not_set");
                }
            }
            Mode::CommandLine => self.cmdline = None,
            _ => {}
        }
        self.mode = Mode::Normal;
    }

    fn run_motion(&mut self, cmd: &Command, motion: &Motion) -> Result<(), DispatchError> {
        if let Motion::Search { pattern, .. } = motion
            && !pattern.is_empty()
        {
            self.host
                .set_register('/', RegisterContent::chars(pattern.clone()))?;
        }
        let from = self.host.caret();
        self.execute(cmd)?;
        if motion.is_jump() && self.host.caret() != from {
            self.host.set_mark('\'', from)?;
        }
        if self.mode.has_selection() {
            self.follow_caret();
        }
        Ok(())
    }

    fn run_operator(&mut self, cmd: Command) -> Result<(), DispatchError> {
        let (op, register, on_selection) = match &cmd {
            Command::Operator {
                op,
                target,
                register,
                ..
            } => (*op, *register, matches!(target, OperatorTarget::Selection)),
            _ => return self.execute(&cmd),
        };
        let typed_in_insert = self.mode.is_text_entry();
        let replay = if on_selection {
            let selection = self.host.selection();
            let result = self.execute(&cmd);
            self.leave_visual()?;
            result?;
            // Only linewise selections have a shape `.` can reproduce.
            selection
                .filter(|s| s.kind == SelectionKind::Linewise)
                .map(|s| Command::Operator {
                    op,
                    target: OperatorTarget::Lines,
                    count: s.anchor.line.abs_diff(s.head.line) + 1,
                    register,
                })
        } else {
            self.execute(&cmd)?;
            Some(cmd)
        };
        if typed_in_insert {
            if let Some(cmd) = replay {
                self.record_insert(cmd);
            }
            return Ok(());
        }
        if op == Operator::Change {
            self.mode = Mode::Insert;
        }
        if let Some(cmd) = replay
            && op.is_change()
        {
            self.remember(cmd);
        }
        Ok(())
    }

    fn toggle_visual(&mut self, kind: SelectionKind) -> Result<(), DispatchError> {
        match self.mode {
            Mode::Visual(current) if current == kind => self.leave_visual()?,
            Mode::Visual(_) | Mode::Select(_) => {
                if let Some(mut sel) = self.host.selection() {
                    sel.kind = kind;
                    self.host.set_selection(Some(sel));
                }
                self.mode = Mode::Visual(kind);
            }
            _ => {
                let caret = self.host.caret();
                self.host.set_selection(Some(Selection {
                    anchor: caret,
                    head: caret,
                    kind,
                }));
                self.mode = Mode::Visual(kind);
            }
        }
        Ok(())
    }

    fn follow_caret(&mut self) {
        if let Some(mut sel) = self.host.selection() {
            sel.head = self.host.caret();
            self.host.set_selection(Some(sel));
        }
    }

    /// Drop the selection, remembering it for `gv` and in `'<` and `'>`.
    fn leave_visual(&mut self) -> Result<(), DispatchError> {
        if self.mode.has_selection() {
            self.mode = Mode::Normal;
        }
        let Some(sel) = self.host.selection() else {
            return Ok(());
        };
        self.last_visual = Some(sel);
        self.host.set_selection(None);
        let (start, end) = if sel.anchor <= sel.head {
            (sel.anchor, sel.head)
        } else {
            (sel.head, sel.anchor)
        };
        let (start, end) = match sel.kind {
            SelectionKind::Linewise => {
                let end_len = self.host.line(end.line).map_or(0, |l| l.len());
                (
                    Position::new(start.line, 0),
                    Position::new(end.line, end_len.saturating_sub(1)),
                )
            }
            _ => (start, end),
        };
        self.host.set_mark('<', start)?;
        self.host.set_mark('>', end)?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // `.` history
    // --------------------------------------------------------------------------------------------

    fn remember(&mut self, cmd: Command) {
        if self.replaying {
            return;
        }
        if self.mode.is_text_entry() {
            self.recording = Some(vec![cmd]);
        } else {
            self.recording = None;
            self.last_change = Some(vec![cmd]);
        }
    }

    fn record_insert(&mut self, cmd: Command) {
        if self.replaying {
            return;
        }
        if let Some(recording) = self.recording.as_mut() {
            recording.push(cmd);
        }
    }

    fn repeat_last_change(
        &mut self,
        interp: &mut Interpreter,
        count: Option<usize>,
    ) -> Result<(), DispatchError> {
        let Some(mut change) = self.last_change.clone() else {
            return Ok(());
        };
        if let (Some(n), Some(first)) = (count, change.first_mut()) {
            *first = first.with_count(n);
        }
        debug!(target: "runtime.session", commands = change.len(), ?count, "repeat_change");
        self.replaying = true;
        let result = self.replay(interp, &change);
        self.replaying = false;
        if result.is_ok() && count.is_some() {
            self.last_change = Some(change);
        }
        result
    }

    fn replay(&mut self, interp: &mut Interpreter, change: &[Command]) -> Result<(), DispatchError> {
        for cmd in change {
            self.run_command(interp, cmd.clone())?;
        }
        if self.mode.is_text_entry() {
            self.run_command(interp, Command::LeaveInsert)?;
        }
        Ok(())
    }

    /// Finish whatever a `:normal` key sequence left incomplete, as `<Esc>`
    /// would.
    pub(super) fn abandon_pending(&mut self, interp: &mut Interpreter) -> Result<(), DispatchError> {
        self.handler.reset();
        match self.mode {
            Mode::Insert | Mode::Replace => self.run_command(interp, Command::LeaveInsert),
            Mode::Visual(_) | Mode::Select(_) | Mode::OperatorPending | Mode::CommandLine => {
                self.escape();
                Ok(())
            }
            Mode::Normal => Ok(()),
        }
    }
}
