mod common;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::{executed, motion, op, session};
use core_actions::{Command, Motion, Operator, OperatorTarget};
use core_events::KeyEvent;
use core_state::Mode;
use pretty_assertions::assert_eq;

fn delete_right(count: usize) -> Command {
    op(Operator::Delete, OperatorTarget::Motion(Motion::Right), count)
}

fn delete_line() -> Command {
    op(Operator::Delete, OperatorTarget::Lines, 1)
}

#[test]
fn noremap_and_recursive_maps() {
    let mut s = session("a\nb\nc\nd");
    s.execute_ex("nnoremap x dd").unwrap();
    s.execute_ex("nmap Q x").unwrap();
    s.execute_ex("nnoremap W x").unwrap();

    s.feed_keys("x").unwrap();
    s.feed_keys("Q").unwrap();
    s.feed_keys("W").unwrap();
    assert_eq!(executed(&s), vec![delete_line(), delete_line(), delete_right(1)]);
    assert_eq!(s.host().text(), "c\nd");
}

#[test]
fn mutual_recursion_hits_the_depth_limit() {
    let mut s = session("a");
    s.execute_ex("set maxmapdepth=20").unwrap();
    s.execute_ex("nmap a b").unwrap();
    s.execute_ex("nmap b a").unwrap();
    let err = s.feed_keys("a").unwrap_err();
    assert_eq!(err.to_string(), "E223: recursive mapping");
    assert_eq!(s.mode(), Mode::Normal);
    assert!(s.pending_keys().is_empty());
    assert!(executed(&s).is_empty());
}

#[test]
fn rhs_starting_with_lhs_does_not_loop() {
    let mut s = session("a\nb");
    s.execute_ex("nmap j jx").unwrap();
    s.feed_keys("j").unwrap();
    assert_eq!(executed(&s), vec![motion(Motion::Down, 1), delete_right(1)]);
}

#[test]
fn ambiguous_prefix_waits_for_timeout() {
    let mut s = session("a\nb\nc");
    s.execute_ex("nnoremap QQ dd").unwrap();
    s.execute_ex("nnoremap Q x").unwrap();

    let t0 = Instant::now();
    s.feed_key_at(KeyEvent::char('Q'), t0).unwrap();
    assert_eq!(s.pending_keys(), vec![KeyEvent::char('Q')]);
    assert_eq!(s.deadline(), Some(t0 + Duration::from_millis(1000)));
    assert!(executed(&s).is_empty());

    s.flush_timeout(t0 + Duration::from_millis(500)).unwrap();
    assert!(executed(&s).is_empty());

    s.flush_timeout(t0 + Duration::from_millis(1000)).unwrap();
    assert_eq!(executed(&s), vec![delete_right(1)]);
    assert_eq!(s.deadline(), None);
    assert!(s.pending_keys().is_empty());
}

#[test]
fn longer_mapping_wins_when_completed() {
    let mut s = session("a\nb\nc");
    s.execute_ex("nnoremap QQ dd").unwrap();
    s.execute_ex("nnoremap Q x").unwrap();
    s.feed_keys("QQ").unwrap();
    assert_eq!(executed(&s), vec![delete_line()]);
}

#[test]
fn diverging_key_fires_the_shorter_mapping() {
    let mut s = session("a\nb\nc");
    s.execute_ex("nnoremap QQ dd").unwrap();
    s.execute_ex("nnoremap Q x").unwrap();
    s.feed_keys("Qj").unwrap();
    assert_eq!(executed(&s), vec![delete_right(1), motion(Motion::Down, 1)]);
}

#[test]
fn timeout_disabled_keeps_waiting() {
    let mut s = session("a");
    s.execute_ex("set notimeout").unwrap();
    s.execute_ex("nnoremap QQ dd").unwrap();
    s.execute_ex("nnoremap Q x").unwrap();
    s.feed_keys("Q").unwrap();
    assert_eq!(s.deadline(), None);
    s.flush_timeout(Instant::now() + Duration::from_secs(60)).unwrap();
    assert_eq!(s.pending_keys(), vec![KeyEvent::char('Q')]);
}

#[test]
fn insert_mode_mapping_leaves_insert() {
    let mut s = session("");
    s.execute_ex("inoremap jk <Esc>").unwrap();
    s.feed_keys("ijk").unwrap();
    assert_eq!(s.mode(), Mode::Normal);
    assert!(!executed(&s).iter().any(|c| matches!(c, Command::InsertText(_))));
    assert_eq!(s.host().text(), "");
}

#[test]
fn expression_mappings_are_evaluated() {
    let mut s = session("a\nb");
    s.run_script("let g:n = 2").unwrap();
    s.execute_ex("nnoremap <expr> Q g:n . 'x'").unwrap();
    s.feed_keys("Q").unwrap();
    assert_eq!(executed(&s), vec![delete_right(2)]);
}

#[test]
fn action_mappings_reach_the_host() {
    let mut s = session("a");
    s.execute_ex("nnoremap Q <Action>(SaveAll)").unwrap();
    s.feed_keys("Q").unwrap();
    assert_eq!(executed(&s), vec![Command::HostAction("SaveAll".into())]);
}

#[test]
fn leader_is_expanded_when_mapping() {
    let mut s = session("a\nb");
    s.run_script("let mapleader = ','").unwrap();
    s.execute_ex("nnoremap <Leader>d dd").unwrap();
    s.feed_keys(",d").unwrap();
    assert_eq!(executed(&s), vec![delete_line()]);
}

#[test]
fn failure_discards_the_rest_of_the_expansion() {
    let mut s = session("a\nb");
    s.execute_ex("nnoremap Q /zzz<CR>dd").unwrap();
    let err = s.feed_keys("Q").unwrap_err();
    assert_eq!(err.to_string(), "E486: Pattern not found: zzz");
    assert!(!executed(&s).iter().any(|c| matches!(c, Command::Operator { .. })));
    assert_eq!(s.host().text(), "a\nb");
}

#[test]
fn interrupt_flushes_typeahead() {
    let mut s = session("a");
    s.interrupt_handle().store(true, Ordering::Relaxed);
    let err = s.feed_keys("x").unwrap_err();
    assert_eq!(err.to_string(), "Interrupted");
    assert!(executed(&s).is_empty());
    s.feed_keys("x").unwrap();
    assert_eq!(executed(&s), vec![delete_right(1)]);
}

#[test]
fn listing_and_unmapping() {
    let mut s = session("a");
    s.execute_ex("nnoremap Q dd").unwrap();
    s.take_messages();
    s.execute_ex("nmap").unwrap();
    let listing = s.take_messages().join("\n");
    assert!(listing.contains("n  Q            * dd"), "{listing}");

    s.execute_ex("nmap Z").unwrap();
    assert_eq!(s.take_messages(), vec!["No mapping found".to_string()]);

    s.execute_ex("nunmap Q").unwrap();
    let err = s.execute_ex("nunmap Q").unwrap_err();
    assert_eq!(err.to_string(), "E31: No such mapping");
}
