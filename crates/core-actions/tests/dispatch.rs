mod common;

use common::{clear_log, executed, motion, op, session};
use core_actions::{Command, InsertEntry, Motion, Operator, OperatorTarget};
use core_script::Value;
use core_state::{Mode, Position, RegisterContent, SelectionKind};
use pretty_assertions::assert_eq;

#[test]
fn operator_and_motion_counts_multiply() {
    let mut s = session("one two three four five six seven");
    s.feed_keys("2d3w").unwrap();
    assert_eq!(
        executed(&s),
        vec![op(Operator::Delete, OperatorTarget::Motion(Motion::WordForward), 6)]
    );
    assert_eq!(s.mode(), Mode::Normal);
    assert!(s.pending().is_empty());
}

#[test]
fn operator_waits_in_operator_pending_mode() {
    let mut s = session("abc");
    s.feed_keys("3d").unwrap();
    assert_eq!(s.mode(), Mode::OperatorPending);
    assert_eq!(s.pending().operator, Some(Operator::Delete));
    assert_eq!(s.pending().operator_count, Some(3));

    s.feed_keys("<Esc>").unwrap();
    assert_eq!(s.mode(), Mode::Normal);
    assert!(s.pending().is_empty());
    assert!(executed(&s).is_empty());
}

#[test]
fn invalid_sequence_reports_and_resets() {
    let mut s = session("abc");
    let err = s.feed_keys("dq").unwrap_err();
    assert_eq!(err.to_string(), "Invalid key sequence: dq");
    assert_eq!(s.last_error(), Some("Invalid key sequence: dq"));
    assert_eq!(s.mode(), Mode::Normal);
    assert!(s.pending().is_empty());
    assert_eq!(
        s.interpreter().vim_var("errmsg"),
        Some(Value::str("Invalid key sequence: dq"))
    );

    // The handler is usable again right away.
    s.feed_keys("x").unwrap();
    assert_eq!(executed(&s), vec![op(Operator::Delete, OperatorTarget::Motion(Motion::Right), 1)]);
}

#[test]
fn shorthands_resolve_to_operators() {
    let mut s = session("abc");
    s.feed_keys("3x").unwrap();
    s.feed_keys("D").unwrap();
    s.feed_keys("\"ayy").unwrap();
    assert_eq!(
        executed(&s),
        vec![
            op(Operator::Delete, OperatorTarget::Motion(Motion::Right), 3),
            op(Operator::Delete, OperatorTarget::Motion(Motion::LineEnd), 1),
            Command::Operator {
                op: Operator::Yank,
                target: OperatorTarget::Lines,
                count: 1,
                register: Some('a'),
            },
        ]
    );
    assert_eq!(s.host().registers.get(&'a'), Some(&RegisterContent::lines("abc\n")));
}

#[test]
fn linewise_visual_sets_marks_and_repeats_as_lines() {
    let mut s = session("a\nbb\nc\nd\ne");
    s.feed_keys("Vj").unwrap();
    assert_eq!(s.mode(), Mode::Visual(SelectionKind::Linewise));
    let sel = s.host().selection.unwrap();
    assert_eq!((sel.anchor.line, sel.head.line), (0, 1));

    s.feed_keys("d").unwrap();
    assert_eq!(s.mode(), Mode::Normal);
    assert_eq!(s.host().selection, None);
    assert_eq!(s.host().marks.get(&'<'), Some(&Position::new(0, 0)));
    assert_eq!(s.host().marks.get(&'>'), Some(&Position::new(1, 1)));

    clear_log(&mut s);
    s.feed_keys(".").unwrap();
    assert_eq!(executed(&s), vec![op(Operator::Delete, OperatorTarget::Lines, 2)]);
    assert_eq!(s.host().text(), "a\nd\ne");
}

#[test]
fn repeat_count_replaces_and_sticks() {
    let mut s = session("1\n2\n3\n4\n5\n6");
    s.feed_keys("dd").unwrap();
    s.feed_keys("3.").unwrap();
    assert_eq!(s.host().text(), "5\n6");
    clear_log(&mut s);
    s.feed_keys(".").unwrap();
    assert_eq!(executed(&s), vec![op(Operator::Delete, OperatorTarget::Lines, 3)]);
    assert_eq!(s.host().text(), "");
}

#[test]
fn yank_is_not_repeated() {
    let mut s = session("1\n2\n3");
    s.feed_keys("dd").unwrap();
    s.feed_keys("yy").unwrap();
    clear_log(&mut s);
    s.feed_keys(".").unwrap();
    assert_eq!(executed(&s), vec![op(Operator::Delete, OperatorTarget::Lines, 1)]);
}

#[test]
fn insert_session_is_one_change() {
    let mut s = session("");
    s.feed_keys("ihi").unwrap();
    assert_eq!(s.mode(), Mode::Insert);
    assert_eq!(s.host().undo_depth, 1);
    s.feed_keys("<Esc>").unwrap();
    assert_eq!(s.mode(), Mode::Normal);
    assert_eq!(s.host().undo_depth, 0);
    assert_eq!(s.host().transactions, 1);
    assert_eq!(s.host().text(), "hi");

    clear_log(&mut s);
    s.feed_keys(".").unwrap();
    assert_eq!(
        executed(&s),
        vec![
            Command::Insert(InsertEntry::Before),
            Command::InsertText("h".into()),
            Command::InsertText("i".into()),
            Command::LeaveInsert,
        ]
    );
    assert_eq!(s.host().text(), "hhii");
}

#[test]
fn ctrl_o_runs_one_normal_command() {
    let mut s = session("a\nb");
    s.feed_keys("ix<C-O>").unwrap();
    assert_eq!(s.mode(), Mode::Normal);
    s.feed_keys("d").unwrap();
    assert_eq!(s.mode(), Mode::OperatorPending);
    s.feed_keys("d").unwrap();
    assert_eq!(s.mode(), Mode::Insert);
    assert_eq!(s.host().text(), "b");
}

#[test]
fn counted_colon_prefills_a_range() {
    let mut s = session("a\nb\nc");
    s.feed_keys("3:").unwrap();
    assert_eq!(s.mode(), Mode::CommandLine);
    assert_eq!(s.command_line(), Some(".,.+2"));
    s.feed_keys("<Esc>").unwrap();
    assert_eq!(s.mode(), Mode::Normal);
    assert_eq!(s.command_line(), None);

    s.feed_keys("v:").unwrap();
    assert_eq!(s.command_line(), Some("'<,'>"));
    assert_eq!(s.host().selection, None);
}

#[test]
fn jumps_and_searches_update_marks_and_registers() {
    let mut s = session("a\nb\nneedle\nd");
    s.feed_keys("3G").unwrap();
    assert_eq!(s.host().caret, Position::new(2, 0));
    assert_eq!(s.host().marks.get(&'\''), Some(&Position::new(0, 0)));

    s.feed_keys("gg/d<CR>").unwrap();
    assert_eq!(
        executed(&s).last(),
        Some(&motion(
            Motion::Search {
                pattern: "d".into(),
                backward: false,
            },
            1
        ))
    );
    assert_eq!(s.host().registers.get(&'/'), Some(&RegisterContent::chars("d")));
}

#[test]
fn failed_search_reports_pattern() {
    let mut s = session("a\nb");
    let err = s.feed_keys("/zzz<CR>").unwrap_err();
    assert_eq!(err.to_string(), "E486: Pattern not found: zzz");
    assert_eq!(s.mode(), Mode::Normal);
    assert_eq!(s.search_text(), None);
}

#[test]
fn n_without_previous_search_fails() {
    let mut s = session("a");
    let err = s.feed_keys("n").unwrap_err();
    assert_eq!(err.to_string(), "E35: No previous regular expression");
}
