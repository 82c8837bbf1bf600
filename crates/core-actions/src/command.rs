//! Resolved editing commands.
//!
//! The key handler turns keys into [`Command`] values; the session applies
//! mode effects and hands host-facing work to an
//! [`ActionExecutor`](crate::ActionExecutor). Counts stored here are final:
//! operator count and motion count have already been multiplied.

use core_state::SelectionKind;

/// How a motion's end position relates to the range an operator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionClass {
    /// The character under the end position is not included (`w`, `h`).
    Exclusive,
    /// The character under the end position is included (`e`, `$`, `f`).
    Inclusive,
    /// Whole lines from start to end (`j`, `G`).
    Linewise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindKind {
    /// `f`
    Forward,
    /// `t`
    ForwardTill,
    /// `F`
    Backward,
    /// `T`
    BackwardTill,
}

impl FindKind {
    pub fn reversed(self) -> Self {
        match self {
            FindKind::Forward => FindKind::Backward,
            FindKind::ForwardTill => FindKind::BackwardTill,
            FindKind::Backward => FindKind::Forward,
            FindKind::BackwardTill => FindKind::ForwardTill,
        }
    }

    pub fn is_forward(self) -> bool {
        matches!(self, FindKind::Forward | FindKind::ForwardTill)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    Up,
    Down,
    WordForward,
    WordBackward,
    WordEnd,
    BigWordForward,
    BigWordBackward,
    BigWordEnd,
    /// `0`
    LineStart,
    /// `^`
    FirstNonBlank,
    /// `$`; a count moves down `count - 1` lines first.
    LineEnd,
    /// `gg` without a count.
    FileStart,
    /// `G` without a count.
    FileEnd,
    /// `{count}G` / `{count}gg`, one-based.
    GotoLine(usize),
    FindChar {
        kind: FindKind,
        ch: char,
    },
    /// `'x` (linewise) or `` `x `` (exact position).
    Mark {
        name: char,
        linewise: bool,
    },
    Search {
        pattern: String,
        backward: bool,
    },
    /// `}`
    ParagraphForward,
    /// `{`
    ParagraphBackward,
    /// `]]`
    SectionForward,
    /// `[[`
    SectionBackward,
    /// `%` without a count: the partner of the next bracket on the line.
    MatchPair,
    /// `{count}%`: the line `count` percent into the buffer.
    Percent(usize),
}

impl Motion {
    pub fn class(&self) -> MotionClass {
        use Motion::*;
        match self {
            Up | Down | FileStart | FileEnd | GotoLine(_) | Percent(_) | SectionForward
            | SectionBackward => MotionClass::Linewise,
            Mark { linewise: true, .. } => MotionClass::Linewise,
            WordEnd | BigWordEnd | LineEnd | MatchPair => MotionClass::Inclusive,
            FindChar { kind, .. } if kind.is_forward() => MotionClass::Inclusive,
            _ => MotionClass::Exclusive,
        }
    }

    /// Motions that set the `'` mark before moving.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Motion::FileStart
                | Motion::FileEnd
                | Motion::GotoLine(_)
                | Motion::Mark { .. }
                | Motion::Search { .. }
                | Motion::ParagraphForward
                | Motion::ParagraphBackward
                | Motion::SectionForward
                | Motion::SectionBackward
                | Motion::MatchPair
                | Motion::Percent(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Delete,
    Yank,
    Change,
    Indent,
    Outdent,
    Lowercase,
    Uppercase,
    ToggleCase,
}

impl Operator {
    /// Keys that start the operator in Normal mode.
    pub fn keys(self) -> &'static str {
        match self {
            Operator::Delete => "d",
            Operator::Yank => "y",
            Operator::Change => "c",
            Operator::Indent => ">",
            Operator::Outdent => "<",
            Operator::Lowercase => "gu",
            Operator::Uppercase => "gU",
            Operator::ToggleCase => "g~",
        }
    }

    /// Operators that modify text (and are therefore repeatable with `.`).
    pub fn is_change(self) -> bool {
        self != Operator::Yank
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextObjectKind {
    Word,
    BigWord,
    /// `i"`, `a'`, ... with the quote character.
    Quote(char),
    /// `i(`, `a{`, ... with the open and close characters.
    Bracket(char, char),
    Paragraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextObject {
    pub kind: TextObjectKind,
    /// `i` (inner) rather than `a`.
    pub inner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorTarget {
    Motion(Motion),
    TextObject(TextObject),
    /// Doubled operator (`dd`, `>>`, `gUU`): `count` whole lines.
    Lines,
    /// The host's current selection.
    Selection,
}

/// Where `i`, `a`, `I`, `A`, `o` and `O` put the caret before Insert starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertEntry {
    Before,
    After,
    LineStart,
    LineEnd,
    OpenBelow,
    OpenAbove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAnchor {
    Center,
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Motion {
        motion: Motion,
        count: usize,
    },
    Operator {
        op: Operator,
        target: OperatorTarget,
        count: usize,
        register: Option<char>,
    },
    Put {
        before: bool,
        count: usize,
        register: Option<char>,
    },
    ReplaceChar {
        ch: char,
        count: usize,
    },
    JoinLines {
        count: usize,
    },
    Undo {
        count: usize,
    },
    Redo {
        count: usize,
    },
    SetMark(char),
    Insert(InsertEntry),
    /// `R`
    Replace,
    Visual(SelectionKind),
    /// `o` in Visual mode.
    SwapSelectionEnds,
    /// `gv`
    Reselect,
    /// `<C-G>` between Visual and Select.
    ToggleSelect,
    /// Extend the selection to a text object (`viw`).
    SelectTextObject(TextObject),
    /// Typed text replaces the selection (Select mode).
    ReplaceSelection(String),
    /// `:` with the text already on the command line.
    CommandLine(String),
    RepeatLastChange {
        count: Option<usize>,
    },
    Scroll(ScrollAnchor),
    /// Named host action (`<Action>(name)` mappings and `:action`).
    HostAction(String),
    Escape,

    // Insert / Replace mode.
    InsertText(String),
    InsertNewline,
    InsertBackspace,
    InsertDelete,
    LeaveInsert,
    ToggleInsertReplace,
    /// `<C-O>`: run one Normal-mode command, then come back.
    InsertNormalOnce,
}

impl Command {
    /// Whether `.` should remember this command.
    pub fn is_change(&self) -> bool {
        match self {
            Command::Operator { op, .. } => op.is_change(),
            Command::Put { .. }
            | Command::ReplaceChar { .. }
            | Command::JoinLines { .. }
            | Command::Insert(_)
            | Command::Replace => true,
            _ => false,
        }
    }

    /// Same command with its count replaced (used by `3.`).
    pub fn with_count(&self, new: usize) -> Command {
        let mut cmd = self.clone();
        match &mut cmd {
            Command::Motion { count, .. }
            | Command::Operator { count, .. }
            | Command::Put { count, .. }
            | Command::ReplaceChar { count, .. }
            | Command::JoinLines { count }
            | Command::Undo { count }
            | Command::Redo { count } => *count = new,
            _ => {}
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn motion_classes() {
        assert_eq!(Motion::WordForward.class(), MotionClass::Exclusive);
        assert_eq!(Motion::WordEnd.class(), MotionClass::Inclusive);
        assert_eq!(Motion::Down.class(), MotionClass::Linewise);
        let f = Motion::FindChar {
            kind: FindKind::Forward,
            ch: 'x',
        };
        assert_eq!(f.class(), MotionClass::Inclusive);
        let big_f = Motion::FindChar {
            kind: FindKind::Backward,
            ch: 'x',
        };
        assert_eq!(big_f.class(), MotionClass::Exclusive);
        assert_eq!(FindKind::ForwardTill.reversed(), FindKind::BackwardTill);
    }

    #[test]
    fn count_replacement_keeps_everything_else() {
        let cmd = Command::Operator {
            op: Operator::Delete,
            target: OperatorTarget::Motion(Motion::WordForward),
            count: 2,
            register: Some('a'),
        };
        assert_eq!(
            cmd.with_count(5),
            Command::Operator {
                op: Operator::Delete,
                target: OperatorTarget::Motion(Motion::WordForward),
                count: 5,
                register: Some('a'),
            }
        );
        assert!(cmd.is_change());
        assert!(!Command::Undo { count: 1 }.is_change());
    }
}
