//! Ex command table.
//!
//! Names are written the way `:help` documents them: `delf[unction]` accepts
//! `delf`, `delfu`, ... `delfunction`. An exact full-name match always wins;
//! otherwise an abbreviation that fits several builtins picks the first one in
//! table order, and any tie involving a host-registered command is ambiguous.

use std::sync::LazyLock;

use tracing::debug;

use crate::ExError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeFlag {
    Forbidden,
    Optional,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentFlag {
    Forbidden,
    Optional,
    Required,
}

/// How a command interacts with the host's undo transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    /// Runs inside one undo transaction opened by the dispatcher.
    Write,
    /// Manages its own transactions (runs other commands or keys).
    SelfSynchronized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    /// Shortest accepted abbreviation.
    pub min_len: usize,
    pub range: RangeFlag,
    pub argument: ArgumentFlag,
    pub access: Access,
    pub bang: bool,
    /// `|` belongs to the argument instead of separating commands.
    pub bar_in_argument: bool,
    pub builtin: bool,
}

impl CommandSpec {
    /// `pattern` uses the `abbr[rest]` notation.
    pub fn new(pattern: &str, range: RangeFlag, argument: ArgumentFlag, access: Access) -> Self {
        let (name, min_len) = match pattern.find('[') {
            Some(open) => {
                let rest = pattern[open + 1..].trim_end_matches(']');
                (format!("{}{}", &pattern[..open], rest), open)
            }
            None => (pattern.to_string(), pattern.len()),
        };
        Self {
            name,
            min_len,
            range,
            argument,
            access,
            bang: false,
            bar_in_argument: false,
            builtin: false,
        }
    }

    pub fn with_bang(mut self) -> Self {
        self.bang = true;
        self
    }

    pub fn with_bar_argument(mut self) -> Self {
        self.bar_in_argument = true;
        self
    }

    fn builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    /// Pseudo command for a bare range (`:12`), which moves the caret.
    pub fn goto_line() -> Self {
        Self::new("", RangeFlag::Required, ArgumentFlag::Forbidden, Access::ReadOnly).builtin()
    }

    pub fn accepts(&self, typed: &str) -> bool {
        typed.len() >= self.min_len && self.name.starts_with(typed)
    }
}

fn builtin_table() -> Vec<CommandSpec> {
    use Access::*;
    use ArgumentFlag as A;
    use RangeFlag as R;
    let spec = CommandSpec::new;
    let mut table = vec![
        // Vim script statements.
        spec("let", R::Forbidden, A::Optional, ReadOnly),
        spec("unl[et]", R::Forbidden, A::Required, ReadOnly).with_bang(),
        spec("if", R::Forbidden, A::Required, SelfSynchronized),
        spec("elsei[f]", R::Forbidden, A::Required, SelfSynchronized),
        spec("el[se]", R::Forbidden, A::Forbidden, SelfSynchronized),
        spec("en[dif]", R::Forbidden, A::Forbidden, SelfSynchronized),
        spec("wh[ile]", R::Forbidden, A::Required, SelfSynchronized),
        spec("endw[hile]", R::Forbidden, A::Forbidden, SelfSynchronized),
        spec("for", R::Forbidden, A::Required, SelfSynchronized),
        spec("endfo[r]", R::Forbidden, A::Forbidden, SelfSynchronized),
        spec("fu[nction]", R::Forbidden, A::Optional, ReadOnly).with_bang(),
        spec("endf[unction]", R::Forbidden, A::Forbidden, ReadOnly),
        spec("retu[rn]", R::Forbidden, A::Optional, SelfSynchronized),
        spec("brea[k]", R::Forbidden, A::Forbidden, ReadOnly),
        spec("con[tinue]", R::Forbidden, A::Forbidden, ReadOnly),
        spec("delf[unction]", R::Forbidden, A::Required, ReadOnly).with_bang(),
        spec("cal[l]", R::Optional, A::Required, SelfSynchronized),
        spec("ec[ho]", R::Forbidden, A::Optional, ReadOnly),
        spec("echon", R::Forbidden, A::Optional, ReadOnly),
        spec("echom[sg]", R::Forbidden, A::Optional, ReadOnly),
        spec("echoe[rr]", R::Forbidden, A::Optional, ReadOnly),
        spec("exe[cute]", R::Forbidden, A::Optional, SelfSynchronized),
        // Editing.
        spec("s[ubstitute]", R::Optional, A::Optional, SelfSynchronized),
        spec("d[elete]", R::Optional, A::Optional, Write),
        spec("y[ank]", R::Optional, A::Optional, ReadOnly),
        spec("j[oin]", R::Optional, A::Optional, Write).with_bang(),
        spec("pu[t]", R::Optional, A::Optional, Write).with_bang(),
        spec("k", R::Optional, A::Required, ReadOnly),
        spec("ma[rk]", R::Optional, A::Required, ReadOnly),
        spec("u[ndo]", R::Forbidden, A::Optional, Write),
        spec("red[o]", R::Forbidden, A::Forbidden, Write),
        spec(">", R::Optional, A::Optional, Write),
        spec("<", R::Optional, A::Optional, Write),
        spec("norm[al]", R::Optional, A::Required, SelfSynchronized)
            .with_bang()
            .with_bar_argument(),
        spec("action", R::Forbidden, A::Required, SelfSynchronized),
        spec("!", R::Optional, A::Required, ReadOnly).with_bar_argument(),
        // Environment.
        spec("reg[isters]", R::Forbidden, A::Optional, ReadOnly),
        spec("di[splay]", R::Forbidden, A::Optional, ReadOnly),
        spec("marks", R::Forbidden, A::Optional, ReadOnly),
        spec("se[t]", R::Forbidden, A::Optional, ReadOnly),
        spec("so[urce]", R::Forbidden, A::Required, SelfSynchronized),
        spec("delm[arks]", R::Forbidden, A::Optional, ReadOnly).with_bang(),
    ];
    // Mapping family: (modes prefix, map, noremap, unmap, mapclear)
    let maps: [(&str, &str, &str, &str); 8] = [
        ("map", "no[remap]", "unm[ap]", "mapc[lear]"),
        ("nm[ap]", "nn[oremap]", "nun[map]", "nmapc[lear]"),
        ("vm[ap]", "vn[oremap]", "vu[nmap]", "vmapc[lear]"),
        ("xm[ap]", "xn[oremap]", "xu[nmap]", "xmapc[lear]"),
        ("smap", "snor[emap]", "sunm[ap]", "smapc[lear]"),
        ("om[ap]", "ono[remap]", "ou[nmap]", "omapc[lear]"),
        ("im[ap]", "ino[remap]", "iu[nmap]", "imapc[lear]"),
        ("cm[ap]", "cno[remap]", "cu[nmap]", "cmapc[lear]"),
    ];
    for (map, noremap, unmap, clear) in maps {
        for name in [map, noremap] {
            table.push(
                spec(name, R::Forbidden, A::Optional, ReadOnly)
                    .with_bang()
                    .with_bar_argument(),
            );
        }
        table.push(
            spec(unmap, R::Forbidden, A::Required, ReadOnly)
                .with_bang()
                .with_bar_argument(),
        );
        table.push(spec(clear, R::Forbidden, A::Optional, ReadOnly).with_bang());
    }
    table.into_iter().map(CommandSpec::builtin).collect()
}

static BUILTINS: LazyLock<Vec<CommandSpec>> = LazyLock::new(builtin_table);

/// Builtin command `typed` names or abbreviates, if any.
pub fn builtin_spec(typed: &str) -> Option<&'static CommandSpec> {
    if typed.is_empty() {
        return None;
    }
    BUILTINS
        .iter()
        .find(|s| s.name == typed)
        .or_else(|| BUILTINS.iter().find(|s| s.accepts(typed)))
}

/// Full name of the builtin command `typed` abbreviates, if any.
pub fn canonical_builtin(typed: &str) -> Option<&'static str> {
    builtin_spec(typed).map(|s| s.name.as_str())
}

#[derive(Debug, Clone)]
pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CommandRegistry {
    pub fn with_builtins() -> Self {
        Self {
            specs: BUILTINS.clone(),
        }
    }

    /// Register a host command. Replacing an existing host command needs
    /// `overwrite`; builtins can never be replaced.
    pub fn register(&mut self, spec: CommandSpec, overwrite: bool) -> Result<(), ExError> {
        match self.specs.iter().position(|s| s.name == spec.name) {
            Some(idx) if overwrite && !self.specs[idx].builtin => self.specs[idx] = spec,
            Some(_) => return Err(ExError::CommandExists(spec.name)),
            None => {
                debug!(target: "ex.registry", name = %spec.name, "command_registered");
                self.specs.push(spec);
            }
        }
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.specs.len();
        self.specs.retain(|s| s.builtin || s.name != name);
        before != self.specs.len()
    }

    pub fn lookup(&self, typed: &str) -> Result<&CommandSpec, ExError> {
        if let Some(exact) = self.specs.iter().find(|s| s.name == typed) {
            return Ok(exact);
        }
        let mut builtin = None;
        let mut hosted = Vec::new();
        for spec in self.specs.iter().filter(|s| s.accepts(typed)) {
            if spec.builtin {
                builtin.get_or_insert(spec);
            } else {
                hosted.push(spec);
            }
        }
        match (builtin, hosted.as_slice()) {
            (Some(spec), []) => Ok(spec),
            (None, [only]) => Ok(*only),
            (None, []) => Err(ExError::NotAnEditorCommand(typed.to_string())),
            _ => Err(ExError::Ambiguous(typed.to_string())),
        }
    }
}
