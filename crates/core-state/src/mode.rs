//! Editing modes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    Characterwise,
    Linewise,
    Blockwise,
}

impl SelectionKind {
    /// Key that enters Visual mode with this kind (`v`, `V`, `<C-V>`).
    pub fn visual_key_name(self) -> &'static str {
        match self {
            SelectionKind::Characterwise => "v",
            SelectionKind::Linewise => "V",
            SelectionKind::Blockwise => "<C-V>",
        }
    }
}

/// Current editor mode. Exactly one is active per dispatch context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Normal,
    Insert,
    Visual(SelectionKind),
    Select(SelectionKind),
    Replace,
    /// An operator was typed and waits for its motion or text object.
    OperatorPending,
    CommandLine,
}

impl Mode {
    pub fn is_visual(self) -> bool {
        matches!(self, Mode::Visual(_))
    }

    /// Visual or Select: a selection is live.
    pub fn has_selection(self) -> bool {
        matches!(self, Mode::Visual(_) | Mode::Select(_))
    }

    pub fn selection_kind(self) -> Option<SelectionKind> {
        match self {
            Mode::Visual(k) | Mode::Select(k) => Some(k),
            _ => None,
        }
    }

    /// Insert-like modes where typed characters become text.
    pub fn is_text_entry(self) -> bool {
        matches!(self, Mode::Insert | Mode::Replace)
    }

    /// Short code reported by the `mode()` builtin.
    pub fn code(self) -> &'static str {
        match self {
            Mode::Normal => "n",
            Mode::Insert => "i",
            Mode::Visual(SelectionKind::Characterwise) => "v",
            Mode::Visual(SelectionKind::Linewise) => "V",
            Mode::Visual(SelectionKind::Blockwise) => "\x16",
            Mode::Select(SelectionKind::Characterwise) => "s",
            Mode::Select(SelectionKind::Linewise) => "S",
            Mode::Select(SelectionKind::Blockwise) => "\x13",
            Mode::Replace => "R",
            Mode::OperatorPending => "no",
            Mode::CommandLine => "c",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Normal => "NORMAL",
            Mode::Insert => "INSERT",
            Mode::Visual(SelectionKind::Characterwise) => "VISUAL",
            Mode::Visual(SelectionKind::Linewise) => "VISUAL LINE",
            Mode::Visual(SelectionKind::Blockwise) => "VISUAL BLOCK",
            Mode::Select(SelectionKind::Characterwise) => "SELECT",
            Mode::Select(SelectionKind::Linewise) => "SELECT LINE",
            Mode::Select(SelectionKind::Blockwise) => "SELECT BLOCK",
            Mode::Replace => "REPLACE",
            Mode::OperatorPending => "OP PENDING",
            Mode::CommandLine => "COMMAND",
        };
        f.write_str(name)
    }
}
