mod common;

use common::{at, caret, contents, typed};
use core_state::{HostSurface, Mode, RegisterContent};
use pretty_assertions::assert_eq;

#[test]
fn visual_delete_is_inclusive() {
    let s = typed("abcdef", "lvld");
    assert_eq!(contents(&s), "adef");
    assert_eq!(caret(&s), at(0, 1));
    assert_eq!(s.mode(), Mode::Normal);
    assert_eq!(s.host().selection(), None);
    assert_eq!(s.host().mark('<'), Some(at(0, 1)));
    assert_eq!(s.host().mark('>'), Some(at(0, 2)));
}

#[test]
fn visual_line_delete() {
    let s = typed("a\nb\nc", "Vjd");
    assert_eq!(contents(&s), "c");
    assert_eq!(s.host().register('"'), Some(RegisterContent::lines("a\nb\n")));
}

#[test]
fn visual_block_delete() {
    let s = typed("abc\ndef", "<C-v>jld");
    assert_eq!(contents(&s), "c\nf");
}

#[test]
fn visual_put_swaps_with_selection() {
    let s = typed("foo bar", "yiwwviwp");
    assert_eq!(contents(&s), "foo foo");
    assert_eq!(s.host().register('"'), Some(RegisterContent::chars("bar")));
}

#[test]
fn visual_replace_and_join() {
    let s = typed("abcd", "vllrx");
    assert_eq!(contents(&s), "xxxd");
    assert_eq!(caret(&s), at(0, 0));

    assert_eq!(contents(&typed("a\nb\nc", "VjJ")), "a b\nc");
}

#[test]
fn visual_change_enters_insert() {
    let s = typed("one two", "vecONE<Esc>");
    assert_eq!(contents(&s), "ONE two");
    assert_eq!(s.mode(), Mode::Normal);
}

#[test]
fn linewise_visual_change_repeats() {
    let mut s = typed("a\nb\nc\nd", "Vj>");
    assert_eq!(contents(&s), "\ta\n\tb\nc\nd".replace('\t', "        "));
    s.feed_keys("jj.").unwrap();
    assert_eq!(contents(&s), "\ta\n\tb\n\tc\n\td".replace('\t', "        "));
}

#[test]
fn insert_and_append() {
    let s = typed("", "ihello<Esc>");
    assert_eq!(contents(&s), "hello");
    assert_eq!(caret(&s), at(0, 4));

    assert_eq!(contents(&typed("hi", "A!<Esc>")), "hi!");
    assert_eq!(contents(&typed("ab", "a<CR><Esc>")), "a\nb");
    assert_eq!(contents(&typed("  x", "Iy<Esc>")), "  yx");
}

#[test]
fn open_lines() {
    let s = typed("a", "oline<Esc>");
    assert_eq!(contents(&s), "a\nline");
    assert_eq!(caret(&s), at(1, 3));
    assert_eq!(contents(&typed("a", "Onew<Esc>")), "new\na");
}

#[test]
fn backspace_and_delete_in_insert() {
    assert_eq!(contents(&typed("ab", "A<BS><BS>x<Esc>")), "x");
    assert_eq!(contents(&typed("ab\ncd", "ji<BS><Esc>")), "abcd");
    assert_eq!(contents(&typed("abc", "i<Del><Esc>")), "bc");
}

#[test]
fn replace_mode_overwrites() {
    let s = typed("abcd", "Rxy<Esc>");
    assert_eq!(contents(&s), "xycd");
    assert_eq!(caret(&s), at(0, 1));
    assert_eq!(contents(&typed("ab", "Rxyz<Esc>")), "xyz");
}

#[test]
fn dot_repeats_an_insert() {
    let s = typed("a\nb", "A!<Esc>j.");
    assert_eq!(contents(&s), "a!\nb!");
    assert_eq!(s.mode(), Mode::Normal);
}

#[test]
fn insert_normal_once() {
    let s = typed("abc", "A<C-O>0X<Esc>");
    assert_eq!(contents(&s), "Xabc");
    assert_eq!(s.mode(), Mode::Normal);
}
