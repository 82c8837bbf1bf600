//! Session: the modal dispatcher.
//!
//! A session owns everything that sits between raw keys and the host: the
//! mapping tables, the [`KeyHandler`], the ex command registry, the option
//! store and the script interpreter. Every public entry point is one
//! dispatch turn:
//! * keys are queued as typeahead and expanded through the mapping tables;
//! * surviving keys reach the handler, and completed commands update the
//!   mode here before the host's [`ActionExecutor`](crate::ActionExecutor)
//!   changes text;
//! * a failure anywhere records the message, flushes the typeahead and
//!   resets to Normal mode before the error is handed back.
//!
//! The turn opens one undo transaction on the host. While the session sits
//! in Insert or Replace mode the transaction stays open so a whole insert
//! undoes as one change.
//!
//! Sub-modules:
//! * `typeahead` - mapping expansion and the ambiguity timeout
//! * `mode`      - command execution, mode transitions and `.`
//! * `cmdline`   - command-line mode editing
//! * `ex`        - builtin ex commands

mod cmdline;
mod ex;
mod mode;
mod typeahead;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use core_config::Config;
use core_events::{KeyEvent, parse_keys};
use core_ex::CommandRegistry;
use core_keymap::KeyMappings;
use core_script::ast::EchoKind;
use core_script::{Interpreter, ScriptError, ScriptHost, ScriptId, ScriptSettings, Value};
use core_state::{HostSurface, Mode, RegexEngine, Selection};
use tracing::debug;

use crate::command::Command;
use crate::executor::{EditorHost, ExecContext};
use crate::key_handler::{KeyHandler, PendingState};
use crate::options::{OptionError, OptionValue, Options};
use crate::DispatchError;

use typeahead::QueuedKey;

/// Last `:substitute` pattern and replacement, reused by a bare `:s`.
#[derive(Debug, Clone)]
struct LastSubstitute {
    pattern: String,
    replacement: String,
}

/// Dispatcher state shared by the sub-modules. It is also the
/// [`ScriptHost`] the interpreter talks to.
struct Core<H> {
    host: H,
    mode: Mode,
    handler: KeyHandler,
    mappings: KeyMappings,
    registry: CommandRegistry,
    options: Options,
    messages: Vec<String>,
    last_error: Option<String>,

    typeahead: VecDeque<QueuedKey>,
    /// Keys held back while they are a strict prefix of some mapping.
    map_buffer: Vec<QueuedKey>,
    deadline: Option<Instant>,
    /// Time of the current turn.
    now: Instant,

    cmdline: Option<String>,
    last_substitute: Option<LastSubstitute>,

    /// Commands `.` replays: a change and, when it entered Insert mode,
    /// everything typed until Insert mode was left.
    last_change: Option<Vec<Command>>,
    recording: Option<Vec<Command>>,
    replaying: bool,
    last_visual: Option<Selection>,
    /// `<C-O>` was typed in Insert mode.
    insert_once: bool,
    normal_depth: usize,
    undo_open: bool,
}

pub struct Session<H> {
    core: Core<H>,
    interp: Interpreter,
}

impl<H: EditorHost> Session<H> {
    pub fn new(host: H) -> Self {
        Self::build(host, Options::new())
    }

    /// Session seeded from the configuration file: input timeouts, recursion
    /// limits and `g:mapleader`.
    pub fn with_config(host: H, config: &Config) -> Self {
        let mut session = Self::build(host, Options::from_config(config));
        session
            .interp
            .set_global("mapleader", Value::str(config.file.leader.key.clone()));
        session
    }

    fn build(host: H, options: Options) -> Self {
        let mut interp = Interpreter::new(ScriptSettings::default());
        let core = Core {
            host,
            mode: Mode::Normal,
            handler: KeyHandler::new(),
            mappings: KeyMappings::new(),
            registry: CommandRegistry::with_builtins(),
            options,
            messages: Vec::new(),
            last_error: None,
            typeahead: VecDeque::new(),
            map_buffer: Vec::new(),
            deadline: None,
            now: Instant::now(),
            cmdline: None,
            last_substitute: None,
            last_change: None,
            recording: None,
            replaying: false,
            last_visual: None,
            insert_once: false,
            normal_depth: 0,
            undo_open: false,
        };
        core.sync_settings(&mut interp);
        Self { core, interp }
    }

    // --------------------------------------------------------------------------------------------
    // Accessors
    // --------------------------------------------------------------------------------------------

    pub fn host(&self) -> &H {
        &self.core.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.core.host
    }

    pub fn into_host(self) -> H {
        self.core.host
    }

    pub fn mode(&self) -> Mode {
        self.core.mode
    }

    /// Count, register and operator typed so far.
    pub fn pending(&self) -> &PendingState {
        self.core.handler.pending()
    }

    /// Keys held back because they may still complete a longer mapping.
    pub fn pending_keys(&self) -> Vec<KeyEvent> {
        self.core.map_buffer.iter().map(|q| q.key).collect()
    }

    pub fn mappings(&self) -> &KeyMappings {
        &self.core.mappings
    }

    pub fn mappings_mut(&mut self) -> &mut KeyMappings {
        &mut self.core.mappings
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.core.registry
    }

    /// Host commands registered here are forwarded to the executor as
    /// [`Command::HostAction`] with the command text.
    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.core.registry
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interp
    }

    /// Setting the flag aborts a running script or mapping expansion at the
    /// next key or loop iteration.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interp.interrupt_handle()
    }

    pub fn options(&self) -> &Options {
        &self.core.options
    }

    pub fn messages(&self) -> &[String] {
        &self.core.messages
    }

    pub fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.core.messages)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.core.last_error.as_deref()
    }

    /// Text typed after `:` while in command-line mode.
    pub fn command_line(&self) -> Option<&str> {
        self.core.cmdline.as_deref()
    }

    /// Pattern typed so far after `/` or `?`.
    pub fn search_text(&self) -> Option<&str> {
        self.core.handler.search_text()
    }

    /// When the pending mapping prefix times out, if it does.
    pub fn deadline(&self) -> Option<Instant> {
        self.core.deadline
    }

    // --------------------------------------------------------------------------------------------
    // Input
    // --------------------------------------------------------------------------------------------

    pub fn feed_key(&mut self, key: KeyEvent) -> Result<(), DispatchError> {
        self.feed_key_at(key, Instant::now())
    }

    /// Feed one key typed at `now`; `now` starts the ambiguity timeout when
    /// the key leaves a mapping prefix pending.
    pub fn feed_key_at(&mut self, key: KeyEvent, now: Instant) -> Result<(), DispatchError> {
        let Self { core, interp } = self;
        core.turn(interp, now, |core, interp| {
            core.typeahead.push_back(QueuedKey::typed(key));
            core.drain(interp)
        })
    }

    /// Feed keys in Vim notation one at a time, as if typed. Every key is fed
    /// even after a failure; the first error is returned.
    pub fn feed_keys(&mut self, notation: &str) -> Result<(), DispatchError> {
        let mut first = None;
        for key in parse_keys(notation) {
            if let Err(err) = self.feed_key(key) {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Resolve a pending mapping prefix whose deadline has passed: the
    /// longest complete mapping fires, otherwise the keys run unmapped.
    pub fn flush_timeout(&mut self, now: Instant) -> Result<(), DispatchError> {
        if self.core.deadline.is_none_or(|d| d > now) {
            return Ok(());
        }
        let Self { core, interp } = self;
        core.turn(interp, now, |core, interp| {
            debug!(target: "input.map", keys = core.map_buffer.len(), "mapping_timeout");
            core.resolve_ambiguity(interp)?;
            core.drain(interp)
        })
    }

    // --------------------------------------------------------------------------------------------
    // Ex and script
    // --------------------------------------------------------------------------------------------

    /// Run one command line as if typed after `:`.
    pub fn execute_ex(&mut self, line: &str) -> Result<(), DispatchError> {
        let Self { core, interp } = self;
        core.turn(interp, Instant::now(), |core, interp| core.run_ex_line(interp, line))
    }

    pub fn source(&mut self, path: &Path) -> Result<ScriptId, DispatchError> {
        let Self { core, interp } = self;
        core.turn(interp, Instant::now(), |core, interp| {
            Ok(interp.source_file(core, path)?)
        })
    }

    /// Run script source at top level.
    pub fn run_script(&mut self, src: &str) -> Result<(), DispatchError> {
        let Self { core, interp } = self;
        core.turn(interp, Instant::now(), |core, interp| {
            Ok(interp.execute(core, src, None)?)
        })
    }

    pub fn evaluate(&mut self, expr: &str) -> Result<Value, DispatchError> {
        let Self { core, interp } = self;
        core.turn(interp, Instant::now(), |core, interp| {
            Ok(interp.evaluate(core, expr, None)?)
        })
    }
}

impl<H: EditorHost> Core<H> {
    fn turn<T>(
        &mut self,
        interp: &mut Interpreter,
        now: Instant,
        f: impl FnOnce(&mut Self, &mut Interpreter) -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        self.now = now;
        if !self.undo_open {
            self.host.begin_undo_transaction();
            self.undo_open = true;
        }
        let result = f(self, interp);
        if let Err(err) = &result {
            self.fail(interp, err);
        }
        self.sync_settings(interp);
        if !self.mode.is_text_entry() {
            self.host.end_undo_transaction();
            self.undo_open = false;
        }
        result
    }

    /// Record `err` and return to a clean Normal-mode state.
    fn fail(&mut self, interp: &mut Interpreter, err: &DispatchError) {
        let msg = err.to_string();
        debug!(target: "runtime.session", mode = %self.mode, error = %msg, "turn_failed");
        interp.set_vim_var("errmsg", Value::str(msg.clone()));
        self.messages.push(msg.clone());
        self.last_error = Some(msg);
        self.typeahead.clear();
        self.map_buffer.clear();
        self.deadline = None;
        self.handler.reset();
        if self.mode.has_selection() {
            self.last_visual = self.host.selection();
            self.host.set_selection(None);
        }
        self.cmdline = None;
        self.recording = None;
        self.insert_once = false;
        self.mode = Mode::Normal;
    }

    /// Push option values the interpreter caches.
    fn sync_settings(&self, interp: &mut Interpreter) {
        let settings = interp.settings_mut();
        settings.maxfuncdepth = self.options.number("maxfuncdepth").max(1) as usize;
        settings.ignorecase = self.options.flag("ignorecase");
    }

    fn exec_context(&self) -> ExecContext {
        ExecContext {
            mode: self.mode,
            shiftwidth: self.options.number("shiftwidth").max(1) as usize,
            ignorecase: self.options.flag("ignorecase"),
            wrapscan: self.options.flag("wrapscan"),
        }
    }

    fn execute(&mut self, cmd: &Command) -> Result<(), DispatchError> {
        let ctx = self.exec_context();
        self.host.execute(cmd, &ctx)?;
        Ok(())
    }

    fn run_ex_line(&mut self, interp: &mut Interpreter, line: &str) -> Result<(), DispatchError> {
        interp.execute(self, line, None)?;
        Ok(())
    }

    fn max_depth(&self) -> usize {
        self.options.number("maxmapdepth").max(1) as usize
    }
}

impl<H: EditorHost> ScriptHost for Core<H> {
    fn surface(&self) -> &dyn HostSurface {
        &self.host
    }

    fn surface_mut(&mut self) -> &mut dyn HostSurface {
        &mut self.host
    }

    fn regex(&self) -> &dyn RegexEngine {
        &self.host
    }

    fn execute_ex(
        &mut self,
        interp: &mut Interpreter,
        line: &str,
        script: Option<ScriptId>,
    ) -> Result<(), ScriptError> {
        ex::execute(self, interp, line, script).map_err(ScriptError::from)
    }

    fn echo(&mut self, kind: EchoKind, text: &str) {
        debug!(target: "runtime.session", ?kind, len = text.len(), "echo");
        self.messages.push(text.to_string());
    }

    fn option(&self, name: &str) -> Option<Value> {
        let value = match self.options.get(name)? {
            OptionValue::Bool(b) => Value::Number(i64::from(*b)),
            OptionValue::Number(n) => Value::Number(*n),
            OptionValue::String(s) => Value::str(s.clone()),
        };
        Some(value)
    }

    fn set_option(&mut self, name: &str, value: &Value) -> Result<(), ScriptError> {
        let converted = match value {
            Value::Number(n) => OptionValue::Number(*n),
            Value::Bool(b) => OptionValue::Bool(*b),
            other => OptionValue::String(other.to_str()?),
        };
        self.options.set(name, converted).map_err(|err| match err {
            OptionError::Unknown(name) => ScriptError::UnknownOption(name),
            other => ScriptError::User(other.to_string()),
        })
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}
