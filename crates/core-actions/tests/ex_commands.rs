mod common;

use common::{executed, motion, op, session};
use core_actions::{Command, Motion, Operator, OperatorTarget};
use core_ex::{Access, ArgumentFlag, CommandSpec, RangeFlag};
use core_state::{Mode, Position, RegisterContent};
use pretty_assertions::assert_eq;

#[test]
fn delete_with_range_and_register() {
    let mut s = session("1\n2\n3\n4\n5");
    s.execute_ex("2,3d").unwrap();
    assert_eq!(s.host().text(), "1\n4\n5");
    assert_eq!(s.host().registers.get(&'"'), Some(&RegisterContent::lines("2\n3\n")));

    s.execute_ex("1d a 2").unwrap();
    assert_eq!(s.host().text(), "5");
    assert_eq!(s.host().registers.get(&'a'), Some(&RegisterContent::lines("1\n4\n")));
}

#[test]
fn bare_range_moves_the_caret() {
    let mut s = session("a\nb\nc\nd");
    s.execute_ex("3").unwrap();
    assert_eq!(s.host().caret, Position::new(2, 0));
    assert_eq!(executed(&s), vec![motion(Motion::GotoLine(3), 1)]);
    assert_eq!(s.host().marks.get(&'\''), Some(&Position::new(0, 0)));

    let err = s.execute_ex("9").unwrap_err();
    assert_eq!(err.to_string(), "E16: Invalid range");
}

#[test]
fn unknown_command_is_rejected() {
    let mut s = session("a");
    let err = s.execute_ex("frobnicate").unwrap_err();
    assert_eq!(err.to_string(), "E492: Not an editor command: frobnicate");
    assert_eq!(s.last_error(), Some("E492: Not an editor command: frobnicate"));
}

#[test]
fn substitute_across_lines() {
    let mut s = session("foo bar foo\nfoo\nbaz");
    s.execute_ex("%s/foo/X/g").unwrap();
    assert_eq!(s.host().text(), "X bar X\nX\nbaz");
    assert_eq!(s.host().caret, Position::new(1, 0));
    assert_eq!(s.host().registers.get(&'/'), Some(&RegisterContent::chars("foo")));
    assert!(s.messages().is_empty());
}

#[test]
fn substitute_counts_without_changing() {
    let mut s = session("foo bar foo\nfoo\nbaz");
    s.execute_ex("%s/foo//gn").unwrap();
    assert_eq!(s.host().text(), "foo bar foo\nfoo\nbaz");
    assert_eq!(s.take_messages(), vec!["3 matches on 2 lines".to_string()]);
}

#[test]
fn substitute_reports_many_lines() {
    let mut s = session("a\na\na\na");
    s.execute_ex("%s/a/b/").unwrap();
    assert_eq!(s.host().text(), "b\nb\nb\nb");
    assert_eq!(s.take_messages(), vec!["4 substitutions on 4 lines".to_string()]);
}

#[test]
fn substitute_without_match() {
    let mut s = session("abc");
    let err = s.execute_ex("s/zzz/y/").unwrap_err();
    assert_eq!(err.to_string(), "E486: Pattern not found: zzz");
    s.execute_ex("s/zzz/y/e").unwrap();
    assert_eq!(s.host().text(), "abc");
}

#[test]
fn substitute_expression_and_repeat() {
    let mut s = session("foo foo\nfoo");
    s.execute_ex("s/foo/\\=1+1/").unwrap();
    assert_eq!(s.host().text(), "2 foo\nfoo");

    s.execute_ex("2").unwrap();
    s.execute_ex("s").unwrap();
    assert_eq!(s.host().text(), "2 foo\n2");
}

#[test]
fn normal_uses_mappings_unless_banged() {
    let mut s = session("a\nb\nc");
    s.execute_ex("nnoremap x dd").unwrap();
    s.execute_ex("normal x").unwrap();
    assert_eq!(s.host().text(), "b\nc");
    s.execute_ex("normal! x").unwrap();
    assert_eq!(
        executed(&s).last(),
        Some(&op(Operator::Delete, OperatorTarget::Motion(Motion::Right), 1))
    );
}

#[test]
fn normal_over_a_range_finishes_insert() {
    let mut s = session("a\nb\nc");
    s.execute_ex("%normal ihey").unwrap();
    assert_eq!(s.host().text(), "heya\nheyb\nheyc");
    assert_eq!(s.mode(), Mode::Normal);
    assert_eq!(
        executed(&s).iter().filter(|c| **c == Command::LeaveInsert).count(),
        3
    );
}

#[test]
fn set_and_query_options() {
    let mut s = session("a");
    s.execute_ex("set sw=4 ic").unwrap();
    assert_eq!(s.options().number("shiftwidth"), 4);
    assert!(s.options().flag("ignorecase"));
    s.execute_ex("set sw?").unwrap();
    assert_eq!(s.take_messages(), vec!["  shiftwidth=4".to_string()]);

    let err = s.execute_ex("set frobnicate").unwrap_err();
    assert_eq!(err.to_string(), "E518: Unknown option: frobnicate");
    assert_eq!(s.evaluate("&shiftwidth").unwrap(), core_script::Value::Number(4));
}

#[test]
fn put_lines_below_above_and_at_end() {
    let mut s = session("1\n2");
    s.host_mut().registers.insert('a', RegisterContent::lines("x\n"));
    s.execute_ex("put a").unwrap();
    assert_eq!(s.host().text(), "1\nx\n2");
    assert_eq!(s.host().caret.line, 1);

    s.execute_ex("0put a").unwrap();
    assert_eq!(s.host().text(), "x\n1\nx\n2");

    s.execute_ex("$put a").unwrap();
    assert_eq!(s.host().text(), "x\n1\nx\n2\nx");
    assert_eq!(s.host().caret.line, 4);

    let err = s.execute_ex("put b").unwrap_err();
    assert_eq!(err.to_string(), "E353: Nothing in register b");
}

#[test]
fn typed_command_line_runs_and_is_remembered() {
    let mut s = session("1\n2\n3\n4");
    s.feed_keys(":2,3d").unwrap();
    assert_eq!(s.mode(), Mode::CommandLine);
    assert_eq!(s.command_line(), Some("2,3d"));
    s.feed_keys("<CR>").unwrap();
    assert_eq!(s.mode(), Mode::Normal);
    assert_eq!(s.host().text(), "1\n4");
    assert_eq!(s.host().registers.get(&':'), Some(&RegisterContent::chars("2,3d")));
}

#[test]
fn command_line_editing_keys() {
    let mut s = session("a");
    s.feed_keys(":set foo<C-W>").unwrap();
    assert_eq!(s.command_line(), Some("set "));
    s.feed_keys("<C-U>").unwrap();
    assert_eq!(s.command_line(), Some(""));
    s.feed_keys("<BS>").unwrap();
    assert_eq!(s.mode(), Mode::Normal);
    assert_eq!(s.command_line(), None);
}

#[test]
fn marks_can_be_set_and_deleted() {
    let mut s = session("a\nb\nc");
    s.execute_ex("2mark b").unwrap();
    s.execute_ex("3k c").unwrap();
    assert_eq!(s.host().marks.get(&'b'), Some(&Position::new(1, 0)));
    assert_eq!(s.host().marks.get(&'c'), Some(&Position::new(2, 0)));
    s.execute_ex("delmarks b-c").unwrap();
    assert!(s.host().marks.is_empty());
}

#[test]
fn undo_takes_no_argument() {
    let mut s = session("a");
    s.execute_ex("undo").unwrap();
    assert_eq!(executed(&s), vec![Command::Undo { count: 1 }]);
    let err = s.execute_ex("undo 3").unwrap_err();
    assert_eq!(err.to_string(), "E488: Trailing characters: 3");
}

#[test]
fn host_commands_are_forwarded() {
    let mut s = session("a");
    s.registry_mut()
        .register(
            CommandSpec::new("Fmt", RangeFlag::Forbidden, ArgumentFlag::Optional, Access::Write)
                .with_bang(),
            false,
        )
        .unwrap();
    s.execute_ex("Fmt! all").unwrap();
    assert_eq!(executed(&s), vec![Command::HostAction("Fmt! all".into())]);
}

#[test]
fn registers_listing_shows_line_breaks() {
    let mut s = session("one\ntwo");
    s.execute_ex("%y x").unwrap();
    s.take_messages();
    s.execute_ex("registers x").unwrap();
    assert_eq!(
        s.take_messages(),
        vec!["Type Name Content\n  l  \"x   one^Jtwo^J".to_string()]
    );
}
