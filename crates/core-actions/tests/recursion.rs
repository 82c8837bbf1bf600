mod common;

use common::{session, with_stack};
use core_state::Mode;
use pretty_assertions::assert_eq;

#[test]
fn runaway_function_recursion_stops_at_maxfuncdepth() {
    with_stack(|| {
        let mut s = session("a");
        s.run_script("function! R()\n  call R()\nendfunction").unwrap();
        let err = s.execute_ex("call R()").unwrap_err();
        assert_eq!(err.to_string(), "E132: Function call depth is higher than 'maxfuncdepth'");

        // A larger setting is capped rather than trusted.
        s.execute_ex("set maxfuncdepth=100000").unwrap();
        let err = s.execute_ex("call R()").unwrap_err();
        assert_eq!(err.to_string(), "E132: Function call depth is higher than 'maxfuncdepth'");
        assert_eq!(s.mode(), Mode::Normal);
    });
}

#[test]
fn self_invoking_normal_is_cut_off() {
    with_stack(|| {
        let mut s = session("a");
        s.execute_ex("nnoremap Z :normal Z<CR>").unwrap();
        let err = s.feed_keys("Z").unwrap_err();
        assert_eq!(err.to_string(), "E192: Recursive use of :normal too deep");
        assert_eq!(s.mode(), Mode::Normal);
        assert!(s.pending_keys().is_empty());

        // The session is usable afterwards.
        s.execute_ex("normal! x").unwrap();
        assert!(!common::executed(&s).is_empty());
    });
}

#[test]
fn deeply_nested_expression_is_an_error() {
    with_stack(|| {
        let mut s = session("");
        let src = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        let err = s.evaluate(&src).unwrap_err();
        assert!(err.to_string().starts_with("E1169: Expression too recursive"), "{err}");
        assert_eq!(s.evaluate("((1))").unwrap(), core_script::Value::Number(1));
    });
}

#[test]
fn statements_require_their_argument() {
    let mut s = session("");
    for cmd in ["unlet", "delfunction", "delfunction!", "call"] {
        let err = s.execute_ex(cmd).unwrap_err();
        assert_eq!(err.to_string(), "E471: Argument required", "{cmd}");
        assert_eq!(s.last_error(), Some("E471: Argument required"));
    }
}
