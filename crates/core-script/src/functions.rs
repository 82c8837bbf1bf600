//! User function table.
//!
//! Functions are keyed by scope and name. Script-local functions carry the
//! [`ScriptId`] of their defining script; the id is a plain handle into the
//! interpreter's script list, never an owning pointer.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::ScriptError;
use crate::ast::FunctionDef;
use crate::value::ScopeRef;

/// Handle of a sourced script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionScope {
    Global,
    Script(ScriptId),
    /// Numbered functions created by `function dict.key()`.
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    pub scope: FunctionScope,
    pub name: String,
}

impl FunctionKey {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            scope: FunctionScope::Global,
            name: name.into(),
        }
    }

    pub fn script(id: ScriptId, name: impl Into<String>) -> Self {
        Self {
            scope: FunctionScope::Script(id),
            name: name.into(),
        }
    }

    /// Name as used in messages and funcrefs (`s:` functions render as
    /// `<SNR>{id}_name`).
    pub fn display_name(&self) -> String {
        match self.scope {
            FunctionScope::Global | FunctionScope::Anonymous => self.name.clone(),
            FunctionScope::Script(ScriptId(id)) => format!("<SNR>{id}_{}", self.name),
        }
    }

    /// Inverse of [`display_name`](Self::display_name).
    pub fn from_display_name(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix("<SNR>")
            && let Some((id, name)) = rest.split_once('_')
            && let Ok(id) = id.parse()
        {
            return Self::script(ScriptId(id), name);
        }
        if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            return Self {
                scope: FunctionScope::Anonymous,
                name: text.to_string(),
            };
        }
        Self::global(text)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionHandler {
    pub key: FunctionKey,
    pub def: Rc<FunctionDef>,
    /// Script the function was defined in, if any.
    pub script: Option<ScriptId>,
    /// Scopes of the enclosing function for `closure` functions.
    pub closure: Vec<ScopeRef>,
}

#[derive(Debug, Default)]
pub struct FunctionStorage {
    functions: HashMap<FunctionKey, FunctionHandler>,
    running: HashMap<FunctionKey, usize>,
    next_anonymous: u32,
    /// Numbered functions live as long as some funcref holds their anchor.
    anchors: HashMap<FunctionKey, Weak<FunctionKey>>,
}

impl FunctionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Store `handler` under `key`. An existing entry is only replaced with
    /// `overwrite`, and never while it is running.
    pub fn register(
        &mut self,
        key: FunctionKey,
        handler: FunctionHandler,
        overwrite: bool,
    ) -> Result<(), ScriptError> {
        if self.functions.contains_key(&key) {
            if !overwrite {
                return Err(ScriptError::FunctionExists(key.display_name()));
            }
            if self.is_running(&key) {
                return Err(ScriptError::FunctionInUse(key.display_name()));
            }
        }
        debug!(target: "script.functions", name = %key.display_name(), overwrite, "function_registered");
        self.functions.insert(key, handler);
        Ok(())
    }

    pub fn lookup(&self, key: &FunctionKey) -> Option<&FunctionHandler> {
        self.functions.get(key)
    }

    pub fn delete(&mut self, key: &FunctionKey, ignore_missing: bool) -> Result<(), ScriptError> {
        if !self.functions.contains_key(key) {
            if ignore_missing {
                return Ok(());
            }
            return Err(ScriptError::DeleteUnknownFunction(key.display_name()));
        }
        if self.is_running(key) {
            return Err(ScriptError::FunctionInUse(key.display_name()));
        }
        self.functions.remove(key);
        self.anchors.remove(key);
        debug!(target: "script.functions", name = %key.display_name(), "function_deleted");
        Ok(())
    }

    /// Allocate a key for a numbered dictionary function. Numbered functions
    /// no longer referenced from anywhere are dropped first.
    pub fn next_anonymous_key(&mut self) -> FunctionKey {
        self.reclaim();
        self.next_anonymous += 1;
        FunctionKey {
            scope: FunctionScope::Anonymous,
            name: self.next_anonymous.to_string(),
        }
    }

    /// Shared handle tying the numbered function `key` to the funcrefs that
    /// name it.
    pub fn anchor(&mut self, key: &FunctionKey) -> Rc<FunctionKey> {
        let anchor = Rc::new(key.clone());
        self.anchors.insert(key.clone(), Rc::downgrade(&anchor));
        anchor
    }

    /// Delete numbered functions whose anchor is gone and that are not
    /// running. Returns how many were removed.
    pub fn reclaim(&mut self) -> usize {
        let dead: Vec<FunctionKey> = self
            .anchors
            .iter()
            .filter(|(key, anchor)| anchor.strong_count() == 0 && !self.running.contains_key(*key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            self.anchors.remove(key);
            self.functions.remove(key);
            debug!(target: "script.functions", name = %key.display_name(), "function_reclaimed");
        }
        dead.len()
    }

    pub fn enter(&mut self, key: &FunctionKey) {
        *self.running.entry(key.clone()).or_default() += 1;
    }

    pub fn leave(&mut self, key: &FunctionKey) {
        if let Some(n) = self.running.get_mut(key) {
            *n -= 1;
            if *n == 0 {
                self.running.remove(key);
            }
        }
    }

    pub fn is_running(&self, key: &FunctionKey) -> bool {
        self.running.contains_key(key)
    }

    /// Sorted display names of all named functions.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .keys()
            .filter(|k| k.scope != FunctionScope::Anonymous)
            .map(FunctionKey::display_name)
            .collect();
        names.sort();
        names
    }
}
