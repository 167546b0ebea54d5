use crate::rewrite_async;
use cc_diag::Rewrite;
use cc_stub::{StubAttr, StubKind, StubNode, StubTree};

/// Stub stream for a single-function source: an async Decl plus a Block
/// spanning the given lines.
fn async_stubs(name: &str, first: u32, last: u32) -> StubTree {
    let mut t = StubTree::new("t.cc");
    let d = t.push(
        StubNode::new(StubKind::Decl, -1)
            .named(name)
            .typed("int")
            .with_attrs(StubAttr::ASYNC)
            .at(first, 1, last, 1),
    );
    t.push(StubNode::new(StubKind::Block, d as i32).at(first, 1, last, 1));
    t
}

fn decl_item(t: &mut StubTree, block: usize, name: &str, ty: &str, line: u32) {
    t.push(
        StubNode::new(StubKind::DeclItem, block as i32)
            .named(name)
            .typed(ty)
            .at(line, 1, line, 1),
    );
}

#[test]
fn single_await_function_matches_protocol() {
    let src = "@async int g(int n) {\nint y = await h(n);\nreturn y + 1;\n}\n";
    let mut stubs = async_stubs("g", 1, 4);
    decl_item(&mut stubs, 1, "y", "int", 2);

    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);

    // Frame layout: state, return slot, locals, await temps, params, tasks.
    let frame_at = out.find("typedef struct {").unwrap();
    let st_at = out.find("int __st;").unwrap();
    let r_at = out.find("intptr_t __r;").unwrap();
    let y_at = out.find("int y;").unwrap();
    let aw_at = out.find("intptr_t __cc_aw0;").unwrap();
    let p_at = out.find("int __p_n;").unwrap();
    let t_at = out.find("CCTaskIntptr __t[1];").unwrap();
    assert!(frame_at < st_at && st_at < r_at && r_at < y_at && y_at < aw_at);
    assert!(aw_at < p_at && p_at < t_at);
    assert!(out.contains("} __cc_async_g_frame;"));

    // Await protocol in the poll function.
    assert!(out.contains("__f->__t[0] = (h(__f->__p_n));"));
    assert!(out.contains("CCFutureStatus s = cc_task_intptr_poll(&__f->__t[0], &v, &err);"));
    assert!(out.contains("if (s == CC_FUTURE_PENDING) return CC_FUTURE_PENDING;"));
    assert!(out.contains("cc_task_intptr_free(&__f->__t[0]);"));
    assert!(out.contains("__f->__cc_aw0 = v;"));
    assert!(out.contains("__f->y = __f->__cc_aw0;"));

    // Return path feeds the terminal state.
    assert!(out.contains("__f->__r = (intptr_t)(__f->y + 1);"));
    assert!(out.contains("case 999: {"));
    assert!(out.contains("*__out = __f->__r;"));
    assert!(out.contains("return CC_FUTURE_READY;"));

    // Constructor copies parameters and wires poll + drop.
    assert!(out.contains("CCTaskIntptr g(int n) {"));
    assert!(out.contains("calloc(1, sizeof(*__f));"));
    assert!(out.contains("__f->__st = 1;"));
    assert!(out.contains("__f->__p_n = n;"));
    assert!(out.contains(
        "return cc_task_intptr_make_poll_ex(__cc_async_g_poll, __cc_async_g_drop, __f);"
    ));

    // Drop releases every task slot.
    assert!(out.contains("for (int __i = 0; __i < 1; __i++) cc_task_intptr_free(&__f->__t[__i]);"));
    assert!(out.contains("free(__f);"));

    // No trace of the original body or marker survives (the protocol
    // comment still names the awaited operand).
    assert!(!out.contains("@async"));
    assert!(!out.contains("int y = await"));
    assert!(out.contains("/* await h(n) */"));
    assert!(out.contains("#line 1 \"t.cc\""));
}

#[test]
fn states_cover_awaits_plus_terminal() {
    let src = "@async int g(void) {\nint a = await p();\nint b = await q();\nreturn a + b;\n}\n";
    let mut stubs = async_stubs("g", 1, 5);
    decl_item(&mut stubs, 1, "a", "int", 2);
    decl_item(&mut stubs, 1, "b", "int", 3);

    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);
    // Two awaits: at least 2*2 + 1 dispatchable states.
    let case_count = out.matches("case ").count();
    assert!(case_count >= 5, "expected >= 5 states, found {case_count}");
    assert!(out.contains("CCTaskIntptr __t[2];"));
    assert!(out.contains("intptr_t __cc_aw1;"));
}

#[test]
fn zero_await_function_still_terminates() {
    let src = "@async int g(void) {\nreturn 41;\n}\n";
    let stubs = async_stubs("g", 1, 3);
    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);
    assert!(out.contains("case 1: {"));
    assert!(out.contains("__f->__r = (intptr_t)(41);"));
    assert!(out.contains("__f->__st = 999;"));
    assert!(out.contains("case 999: {"));
    // No task slots for a function that never suspends.
    assert!(!out.contains("__t["));
    assert!(out.contains("CCTaskIntptr g(void) {"));
}

#[test]
fn statement_level_await_discards_value() {
    let src = "@async int g(void) {\nawait step();\nreturn 0;\n}\n";
    let stubs = async_stubs("g", 1, 4);
    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);
    assert!(out.contains("(void)v;"));
    assert!(!out.contains("__cc_aw0 = v;"));
}

#[test]
fn while_loop_edges() {
    let src = "@async int g(void) {\nwhile (more()) {\nawait tick();\nif (done()) break;\n}\nreturn 0;\n}\n";
    let stubs = async_stubs("g", 1, 7);
    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);
    // The loop condition branches between body and after states.
    assert!(out.contains("if (more()) { __f->__st ="));
    // break transitions to a state, not a C break.
    assert!(out.contains("if (done()) { __f->__st ="));
    assert!(!out.contains("break;"));
}

#[test]
fn for_loop_allocates_header_states() {
    let src = "@async int g(int n) {\nint i;\nfor (i = 0; i < n; i++) {\nawait put(i);\n}\nreturn 0;\n}\n";
    let mut stubs = async_stubs("g", 1, 7);
    decl_item(&mut stubs, 1, "i", "int", 2);
    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);
    assert!(out.contains("__f->i = 0;"));
    assert!(out.contains("if (__f->i < __f->__p_n) { __f->__st ="));
    assert!(out.contains("__f->i++;"));
}

#[test]
fn if_else_branches_rejoin() {
    let src = "@async int g(int n) {\nif (n > 0) {\nreturn 1;\n} else {\nreturn 2;\n}\n}\n";
    let stubs = async_stubs("g", 1, 7);
    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);
    assert!(out.contains("if (__f->__p_n > 0) { __f->__st ="));
    assert!(out.contains("__f->__r = (intptr_t)(1);"));
    assert!(out.contains("__f->__r = (intptr_t)(2);"));
}

#[test]
fn pure_declarations_are_dropped_from_the_body() {
    let src = "@async int g(void) {\nint y;\ny = 3;\nreturn y;\n}\n";
    let mut stubs = async_stubs("g", 1, 5);
    decl_item(&mut stubs, 1, "y", "int", 2);
    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);
    assert!(!out.contains("int y;\n__f"), "declaration must not survive in the poll body");
    assert!(out.contains("__f->y = 3;"));
    assert!(out.contains("__f->__r = (intptr_t)(__f->y);"));
}

#[test]
fn non_async_source_is_unchanged() {
    let mut t = StubTree::new("t.cc");
    t.push(StubNode::new(StubKind::Decl, -1).named("f").typed("int"));
    assert_eq!(
        rewrite_async("int f(void) { return 1; }", &t, "t.cc").unwrap(),
        Rewrite::Unchanged
    );
}

#[test]
fn await_outside_async_is_reported() {
    let mut t = StubTree::new("t.cc");
    let d = t.push(StubNode::new(StubKind::Decl, -1).named("f").typed("int"));
    let b = t.push(StubNode::new(StubKind::Block, d as i32));
    t.push(StubNode::new(StubKind::Await, b as i32).at(2, 5, 2, 12));

    let err = rewrite_async("int f(void) { await g(); }", &t, "t.cc").unwrap_err();
    assert_eq!(err.category(), "unsupported");
    let msg = err.to_string();
    assert!(msg.starts_with("t.cc:2:5"));
    assert!(msg.contains("mark the enclosing function @async"));
}

#[test]
fn await_inside_arena_is_reported() {
    let mut t = StubTree::new("t.cc");
    let d = t.push(
        StubNode::new(StubKind::Decl, -1)
            .named("f")
            .with_attrs(StubAttr::ASYNC),
    );
    let b = t.push(StubNode::new(StubKind::Block, d as i32));
    let arena = t.push(StubNode::new(StubKind::StmtArena, b as i32));
    let ab = t.push(StubNode::new(StubKind::Block, arena as i32));
    t.push(StubNode::new(StubKind::Await, ab as i32).at(3, 1, 3, 8));

    let err = rewrite_async("", &t, "t.cc").unwrap_err();
    assert_eq!(err.category(), "unsupported");
    assert!(err.to_string().contains("@arena"));
}

#[test]
fn two_async_functions_rewrite_independently() {
    let src = "@async int a(void) {\nreturn 1;\n}\n@async int b(void) {\nreturn 2;\n}\n";
    let mut t = StubTree::new("t.cc");
    let d1 = t.push(
        StubNode::new(StubKind::Decl, -1)
            .named("a")
            .with_attrs(StubAttr::ASYNC)
            .at(1, 1, 3, 1),
    );
    t.push(StubNode::new(StubKind::Block, d1 as i32).at(1, 1, 3, 1));
    let d2 = t.push(
        StubNode::new(StubKind::Decl, -1)
            .named("b")
            .with_attrs(StubAttr::ASYNC)
            .at(4, 1, 6, 1),
    );
    t.push(StubNode::new(StubKind::Block, d2 as i32).at(4, 1, 6, 1));

    let out = rewrite_async(src, &t, "t.cc").unwrap().into_text(src);
    assert!(out.contains("__cc_async_a_frame;"));
    assert!(out.contains("__cc_async_b_frame;"));
    assert!(out.contains("CCTaskIntptr a(void) {"));
    assert!(out.contains("CCTaskIntptr b(void) {"));
}

#[test]
fn await_in_string_literal_is_not_a_suspension_point() {
    let src = "@async int g(void) {\nlog(\"await later\");\nreturn 0;\n}\n";
    let stubs = async_stubs("g", 1, 4);
    let out = rewrite_async(src, &stubs, "t.cc").unwrap().into_text(src);
    assert!(out.contains("log(\"await later\");"));
    assert!(!out.contains("__t["));
}
