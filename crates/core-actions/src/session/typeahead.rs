//! Typeahead and mapping expansion.
//!
//! Keys wait in a queue tagged with whether they may still be remapped and
//! how many expansions produced them. A remappable key joins the map buffer
//! and the buffer is looked up in the table of the current mode:
//! * strict prefix of a longer mapping: wait for more keys or the timeout;
//! * complete match: the consumed keys are replaced by the right-hand side;
//! * no match: the first buffered key runs unmapped and the rest are looked
//!   up again.

use std::sync::atomic::Ordering;
use std::time::Duration;

use core_events::{KeyEvent, keys_to_notation, string_to_keys};
use core_keymap::{MapModes, MappingEntry, MappingTarget, Resolution};
use core_script::{Interpreter, ScriptError};
use core_state::Mode;
use tracing::{debug, trace};

use super::Core;
use crate::DispatchError;
use crate::command::Command;
use crate::executor::EditorHost;

/// Nested `:normal` levels allowed regardless of 'maxmapdepth'. Each level
/// re-enters the whole dispatcher on the native stack.
const MAX_NORMAL_DEPTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct QueuedKey {
    pub key: KeyEvent,
    pub remap: bool,
    /// Number of mapping expansions that produced this key.
    pub depth: usize,
}

impl QueuedKey {
    pub(super) fn typed(key: KeyEvent) -> Self {
        Self {
            key,
            remap: true,
            depth: 0,
        }
    }
}

impl<H: EditorHost> Core<H> {
    /// Mapping table consulted in the current mode.
    pub(super) fn map_mode(&self) -> MapModes {
        match self.mode {
            Mode::Normal => MapModes::NORMAL,
            Mode::OperatorPending => MapModes::OP_PENDING,
            Mode::Visual(_) => MapModes::VISUAL,
            Mode::Select(_) => MapModes::SELECT,
            Mode::Insert | Mode::Replace => MapModes::INSERT,
            Mode::CommandLine => MapModes::CMDLINE,
        }
    }

    /// Process queued keys until the queue is empty or a mapping prefix is
    /// left waiting.
    pub(super) fn drain(&mut self, interp: &mut Interpreter) -> Result<(), DispatchError> {
        let interrupt = interp.interrupt_handle();
        while let Some(queued) = self.typeahead.pop_front() {
            if interrupt.swap(false, Ordering::Relaxed) {
                debug!(target: "input.map", pending = self.typeahead.len(), "typeahead_interrupted");
                return Err(ScriptError::Interrupted.into());
            }
            self.process(interp, queued)?;
        }
        Ok(())
    }

    fn process(&mut self, interp: &mut Interpreter, queued: QueuedKey) -> Result<(), DispatchError> {
        if !queued.remap || self.handler.wants_literal() {
            if !self.map_buffer.is_empty() {
                // An unmappable key ends the ambiguity.
                self.typeahead.push_front(queued);
                return self.resolve_ambiguity(interp);
            }
            return self.dispatch_key(interp, queued);
        }
        self.map_buffer.push(queued);
        let keys: Vec<KeyEvent> = self.map_buffer.iter().map(|q| q.key).collect();
        let found = match self.mappings.resolve(self.map_mode(), &keys) {
            Resolution::NoMatch => None,
            Resolution::Prefix { .. } => {
                self.deadline = self.options.flag("timeout").then(|| {
                    let ms = self.options.number("timeoutlen").max(0) as u64;
                    self.now + Duration::from_millis(ms)
                });
                trace!(target: "input.map", keys = %keys_to_notation(&keys), "mapping_prefix");
                return Ok(());
            }
            Resolution::Match { consumed, value } => Some((consumed, value.clone())),
        };
        match found {
            Some((consumed, entry)) => self.expand(interp, consumed, entry),
            None => self.replay_unmatched(interp),
        }
    }

    /// End a pending prefix: the longest complete mapping inside the buffer
    /// fires, otherwise the buffered keys run unmapped.
    pub(super) fn resolve_ambiguity(&mut self, interp: &mut Interpreter) -> Result<(), DispatchError> {
        self.deadline = None;
        if self.map_buffer.is_empty() {
            return Ok(());
        }
        let keys: Vec<KeyEvent> = self.map_buffer.iter().map(|q| q.key).collect();
        let found = match self.mappings.resolve(self.map_mode(), &keys) {
            Resolution::Prefix {
                fallback: Some((consumed, value)),
            }
            | Resolution::Match { consumed, value } => Some((consumed, value.clone())),
            _ => None,
        };
        match found {
            Some((consumed, entry)) => self.expand(interp, consumed, entry),
            None => self.replay_unmatched(interp),
        }
    }

    fn expand(
        &mut self,
        interp: &mut Interpreter,
        consumed: usize,
        entry: MappingEntry,
    ) -> Result<(), DispatchError> {
        self.deadline = None;
        let mut buffered = std::mem::take(&mut self.map_buffer);
        let rest = buffered.split_off(consumed.min(buffered.len()));
        for q in rest.into_iter().rev() {
            self.typeahead.push_front(q);
        }
        let depth = buffered.iter().map(|q| q.depth).max().unwrap_or(0) + 1;
        if depth > self.max_depth() {
            debug!(target: "input.map", depth, "mapping_depth_exceeded");
            return Err(DispatchError::RecursiveMapping);
        }
        trace!(
            target: "input.map",
            lhs = %keys_to_notation(&entry.lhs),
            rhs = %entry.rhs_display(),
            depth,
            "mapping_expanded"
        );
        let keys = match &entry.rhs {
            MappingTarget::Keys(keys) => keys.clone(),
            MappingTarget::Expression(src) => {
                let value = interp.evaluate(self, src, None)?;
                string_to_keys(&value.to_str()?)
            }
            MappingTarget::Action(name) => {
                return self.run_command(interp, Command::HostAction(name.clone()));
            }
        };
        let recursive = entry.is_recursive();
        // `:map x xy` would never terminate: a right-hand side starting with
        // its own lhs takes those keys literally.
        let literal_head = if recursive && keys.starts_with(&entry.lhs) {
            entry.lhs.len()
        } else {
            0
        };
        for (idx, key) in keys.into_iter().enumerate().rev() {
            self.typeahead.push_front(QueuedKey {
                key,
                remap: recursive && idx >= literal_head,
                depth,
            });
        }
        Ok(())
    }

    fn replay_unmatched(&mut self, interp: &mut Interpreter) -> Result<(), DispatchError> {
        self.deadline = None;
        let mut buffered = std::mem::take(&mut self.map_buffer).into_iter();
        let Some(first) = buffered.next() else {
            return Ok(());
        };
        let rest: Vec<QueuedKey> = buffered.collect();
        for q in rest.into_iter().rev() {
            self.typeahead.push_front(q);
        }
        self.dispatch_key(interp, first)
    }

    /// Run `keys` to completion as `:normal` does: a trailing mapping prefix
    /// is resolved at once and an unfinished command or mode is abandoned.
    pub(super) fn run_normal(
        &mut self,
        interp: &mut Interpreter,
        keys: &[KeyEvent],
        remap: bool,
    ) -> Result<(), DispatchError> {
        if self.normal_depth >= self.max_depth().min(MAX_NORMAL_DEPTH) {
            return Err(DispatchError::NormalTooDeep);
        }
        self.normal_depth += 1;
        let saved_typeahead = std::mem::take(&mut self.typeahead);
        let saved_buffer = std::mem::take(&mut self.map_buffer);
        let saved_deadline = self.deadline.take();
        self.typeahead.extend(keys.iter().map(|&key| QueuedKey {
            key,
            remap,
            depth: 0,
        }));
        trace!(target: "input.map", keys = keys.len(), remap, depth = self.normal_depth, "normal_keys");
        let result = self
            .drain_to_end(interp)
            .and_then(|()| self.abandon_pending(interp));
        self.typeahead = saved_typeahead;
        self.map_buffer = saved_buffer;
        self.deadline = saved_deadline;
        self.normal_depth -= 1;
        result
    }

    fn drain_to_end(&mut self, interp: &mut Interpreter) -> Result<(), DispatchError> {
        loop {
            self.drain(interp)?;
            if self.map_buffer.is_empty() {
                return Ok(());
            }
            self.resolve_ambiguity(interp)?;
        }
    }
}
