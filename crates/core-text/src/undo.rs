//! Snapshot undo history with nested transactions.
//!
//! The outermost `begin` captures the buffer; the matching `end` commits that
//! snapshot as one undo step if the text changed in between. A whole Insert
//! session or a multi-line `:s` therefore undoes at once.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use core_state::Position;
use tracing::trace;

use crate::Buffer;

/// Maximum number of snapshots retained in undo history.
pub const UNDO_HISTORY_MAX: usize = 200;

#[derive(Debug, Clone)]
pub struct EditSnapshot {
    pub buffer: Buffer,
    pub position: Position,
    /// Content hash of the buffer at capture.
    pub hash: u64,
}

impl EditSnapshot {
    fn capture(buffer: &Buffer, position: Position) -> Self {
        Self {
            buffer: buffer.clone(),
            position,
            hash: buffer_hash(buffer),
        }
    }

    fn matches(&self, buffer: &Buffer) -> bool {
        self.hash == buffer_hash(buffer) && self.buffer.same_text(buffer)
    }
}

#[derive(Debug, Default)]
pub struct UndoEngine {
    undo_stack: Vec<EditSnapshot>,
    redo_stack: Vec<EditSnapshot>,
    depth: usize,
    /// State when the outermost open transaction began.
    pending: Option<EditSnapshot>,
    /// Transactions that ended without changing the text.
    snapshots_skipped: u64,
}

impl UndoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn transaction_depth(&self) -> usize {
        self.depth
    }

    pub fn snapshots_skipped(&self) -> u64 {
        self.snapshots_skipped
    }

    pub fn begin(&mut self, cursor: Position, buffer: &Buffer) {
        if self.depth == 0 {
            self.pending = Some(EditSnapshot::capture(buffer, cursor));
        }
        self.depth += 1;
        trace!(target: "state.undo", depth = self.depth, "transaction_begin");
    }

    pub fn end(&mut self, buffer: &Buffer) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        trace!(target: "state.undo", depth = self.depth, "transaction_end");
        if self.depth == 0 {
            self.commit_pending(buffer);
        }
    }

    fn commit_pending(&mut self, buffer: &Buffer) {
        let Some(before) = self.pending.take() else {
            return;
        };
        if before.matches(buffer) {
            self.snapshots_skipped += 1;
            trace!(target: "state.undo", undo_depth = self.undo_stack.len(), "snapshot_dedupe_skip");
            return;
        }
        self.undo_stack.push(before);
        trace!(target: "state.undo", undo_depth = self.undo_stack.len(), redo_depth = self.redo_stack.len(), lines = buffer.line_count(), "push_snapshot");
        if self.undo_stack.len() > UNDO_HISTORY_MAX {
            self.undo_stack.remove(0);
            trace!(target: "state.undo", "undo_stack_trimmed");
        }
        self.redo_stack.clear();
    }

    /// Changes made so far in an open transaction become their own undo
    /// step, and the transaction restarts from the current state.
    fn settle_open_transaction(&mut self, cursor: Position, buffer: &Buffer) {
        if self.depth > 0 {
            self.commit_pending(buffer);
            self.pending = Some(EditSnapshot::capture(buffer, cursor));
        }
    }

    pub fn undo(&mut self, cursor: &mut Position, buffer: &mut Buffer) -> bool {
        self.settle_open_transaction(*cursor, buffer);
        let Some(last) = self.undo_stack.pop() else {
            return false;
        };
        trace!(target: "state.undo", undo_depth = self.undo_stack.len(), redo_depth = self.redo_stack.len(), "undo_pop");
        self.redo_stack.push(EditSnapshot::capture(buffer, *cursor));
        *buffer = last.buffer;
        *cursor = last.position;
        self.restart_pending(*cursor, buffer);
        true
    }

    pub fn redo(&mut self, cursor: &mut Position, buffer: &mut Buffer) -> bool {
        self.settle_open_transaction(*cursor, buffer);
        let Some(next) = self.redo_stack.pop() else {
            return false;
        };
        trace!(target: "state.undo", redo_depth = self.redo_stack.len(), undo_depth = self.undo_stack.len(), "redo_pop");
        let current = EditSnapshot::capture(buffer, *cursor);
        self.undo_stack.push(current);
        *buffer = next.buffer;
        *cursor = next.position;
        self.restart_pending(*cursor, buffer);
        true
    }

    fn restart_pending(&mut self, cursor: Position, buffer: &Buffer) {
        if self.depth > 0 {
            self.pending = Some(EditSnapshot::capture(buffer, cursor));
        }
    }
}

fn buffer_hash(buf: &Buffer) -> u64 {
    let mut h = DefaultHasher::new();
    for i in 0..buf.line_count() {
        if let Some(l) = buf.line(i) {
            h.write(l.as_bytes());
            h.write_u8(b'\n');
        }
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn edit(engine: &mut UndoEngine, buf: &mut Buffer, text: &str) {
        engine.begin(Position::new(0, 0), buf);
        *buf = Buffer::from_str("t", text);
        engine.end(buf);
    }

    #[test]
    fn nested_transactions_make_one_step() {
        let mut engine = UndoEngine::new();
        let mut buf = Buffer::from_str("t", "a");
        engine.begin(Position::new(0, 0), &buf);
        edit(&mut engine, &mut buf, "ab");
        edit(&mut engine, &mut buf, "abc");
        assert_eq!(engine.undo_depth(), 0);
        engine.end(&buf);
        assert_eq!(engine.undo_depth(), 1);

        let mut cursor = Position::new(0, 2);
        assert!(engine.undo(&mut cursor, &mut buf));
        assert_eq!(buf.text(), "a");
        assert_eq!(cursor, Position::new(0, 0));
        assert!(engine.redo(&mut cursor, &mut buf));
        assert_eq!(buf.text(), "abc");
        assert!(!engine.redo(&mut cursor, &mut buf));
    }

    #[test]
    fn unchanged_transactions_are_skipped() {
        let mut engine = UndoEngine::new();
        let buf = Buffer::from_str("t", "same");
        engine.begin(Position::new(0, 0), &buf);
        engine.end(&buf);
        engine.end(&buf);
        assert_eq!(engine.undo_depth(), 0);
        assert_eq!(engine.snapshots_skipped(), 1);
        assert_eq!(engine.transaction_depth(), 0);
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut engine = UndoEngine::new();
        let mut buf = Buffer::from_str("t", "1");
        edit(&mut engine, &mut buf, "2");
        let mut cursor = Position::default();
        engine.undo(&mut cursor, &mut buf);
        assert_eq!(engine.redo_depth(), 1);
        edit(&mut engine, &mut buf, "3");
        assert_eq!(engine.redo_depth(), 0);
        assert_eq!(engine.undo_depth(), 1);
    }

    #[test]
    fn undo_inside_an_open_transaction() {
        let mut engine = UndoEngine::new();
        let mut buf = Buffer::from_str("t", "1");
        edit(&mut engine, &mut buf, "2");
        engine.begin(Position::default(), &buf);
        buf = Buffer::from_str("t", "3");
        let mut cursor = Position::default();
        assert!(engine.undo(&mut cursor, &mut buf));
        assert_eq!(buf.text(), "2");
        engine.end(&buf);
        // The undo itself is not recorded as a change.
        assert_eq!(engine.undo_depth(), 1);
        assert_eq!(engine.redo_depth(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let mut engine = UndoEngine::new();
        let mut buf = Buffer::from_str("t", "");
        for i in 0..UNDO_HISTORY_MAX + 5 {
            edit(&mut engine, &mut buf, &i.to_string());
        }
        assert_eq!(engine.undo_depth(), UNDO_HISTORY_MAX);
    }
}
