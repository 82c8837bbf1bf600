mod common;

use std::io::Write;

use common::{at, caret, contents, session};
use core_script::Value;
use core_state::HostSurface;
use pretty_assertions::assert_eq;

#[test]
fn substitute_with_groups() {
    let mut s = session("foo bar\nbaz qux");
    s.execute_ex(r"s/\(\w\+\) \(\w\+\)/\2 \1/").unwrap();
    assert_eq!(contents(&s), "bar foo\nbaz qux");

    s.execute_ex(r"%s/a/A/g").unwrap();
    assert_eq!(contents(&s), "bAr foo\nbAz qux");
    assert_eq!(caret(&s), at(1, 0));
}

#[test]
fn substitute_can_split_lines() {
    let mut s = session("a,b,c");
    s.execute_ex(r"s/,/\r/g").unwrap();
    assert_eq!(contents(&s), "a\nb\nc");
    assert_eq!(caret(&s), at(2, 0));
    s.feed_keys("u").unwrap();
    assert_eq!(contents(&s), "a,b,c");
}

#[test]
fn substitute_case_modifiers_and_expressions() {
    let mut s = session("hello world");
    s.execute_ex(r"s/\w\+/\u&/g").unwrap();
    assert_eq!(contents(&s), "Hello World");
    s.execute_ex(r"s/World/\=toupper('world')/").unwrap();
    assert_eq!(contents(&s), "Hello WORLD");
}

#[test]
fn substitute_reports_missing_pattern() {
    let mut s = session("abc");
    let err = s.execute_ex("s/x/y/").unwrap_err();
    assert_eq!(err.to_string(), "E486: Pattern not found: x");
    s.execute_ex("s/x/y/e").unwrap();
    assert_eq!(contents(&s), "abc");
}

#[test]
fn line_commands() {
    let mut s = session("a\nb\nc");
    s.execute_ex("1,2yank").unwrap();
    s.execute_ex("$put").unwrap();
    assert_eq!(contents(&s), "a\nb\nc\na\nb");
    s.execute_ex("2,3delete").unwrap();
    assert_eq!(contents(&s), "a\na\nb");
    s.execute_ex("join").unwrap();
    assert_eq!(contents(&s), "a\na b");
}

#[test]
fn normal_command_runs_keys() {
    let mut s = session("one\ntwo");
    s.execute_ex("normal! dd").unwrap();
    assert_eq!(contents(&s), "two");
    // An unfinished insert is closed as if by <Esc>.
    s.execute_ex("normal! Ax").unwrap();
    assert_eq!(contents(&s), "twox");
    assert_eq!(s.mode(), core_state::Mode::Normal);
}

#[test]
fn mappings_from_script() {
    let mut s = session("a\nb\nc");
    s.run_script("nnoremap Q dd\nlet g:count = 0").unwrap();
    s.feed_keys("Q").unwrap();
    assert_eq!(contents(&s), "b\nc");
    assert_eq!(s.evaluate("getline(1)").unwrap(), Value::str("b"));
}

#[test]
fn script_edits_buffer() {
    let mut s = session("x");
    s.run_script("call setline(1, 'changed')\nlet g:n = line('$')").unwrap();
    assert_eq!(contents(&s), "changed");
    assert_eq!(s.evaluate("g:n").unwrap(), Value::Number(1));
}

#[test]
fn source_file_defines_mapping() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "let g:greeting = 'hi'").unwrap();
    writeln!(file, "nnoremap Z x").unwrap();
    let mut s = session("abc");
    s.source(file.path()).unwrap();
    s.feed_keys("Z").unwrap();
    assert_eq!(contents(&s), "bc");
    assert_eq!(s.evaluate("g:greeting").unwrap(), Value::str("hi"));
}

#[test]
fn host_actions_reach_the_host() {
    let mut s = session("");
    s.execute_ex("action SaveAll").unwrap();
    assert_eq!(s.host_mut().take_actions(), vec!["SaveAll".to_string()]);
}

#[test]
fn marks_from_ex() {
    let mut s = session("a\nb\nc");
    s.execute_ex("3mark q").unwrap();
    assert_eq!(s.host().mark('q'), Some(at(2, 0)));
    s.execute_ex("'qdelete").unwrap();
    assert_eq!(contents(&s), "a\nb");
}

#[test]
fn self_sourcing_script_is_cut_off() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loop.vim");
    std::fs::write(&path, format!("let g:n = exists('g:n') ? g:n + 1 : 1\nsource {}\n", path.display())).unwrap();
    std::thread::Builder::new()
        .stack_size(8 << 20)
        .spawn(move || {
            let mut s = session("");
            let err = s.source(&path).unwrap_err();
            assert_eq!(err.to_string(), "E169: Command too recursive");
            assert_eq!(s.evaluate("g:n").unwrap(), Value::Number(50));
        })
        .unwrap()
        .join()
        .unwrap();
}
