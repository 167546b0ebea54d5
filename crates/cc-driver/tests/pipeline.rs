//! End-to-end pipeline coverage: text-only lowering, the fake-parser AST
//! path, and the async rewrite through the full scheduler.

use cc_diag::LowerError;
use cc_stub::{StubAttr, StubKind, StubNode, StubParser, StubTree};
use ccfront::Frontend;

#[test]
fn text_only_lowering_covers_the_pass_vocabulary() {
    let src = r#"#include <stdio.h>
#include "chan.h"

int!>(IoError) read_header(void);

void producer(void) {
    [int~4>] tx;
    [int~4<] rx;
    channel_pair(&tx, &rx);
    with_deadline(ms(100)) {
        @match {
            case tx.send(42): puts("sent");
            case is_cancelled(): puts("late");
        }
    }
}

CCResult_int_CCError consume(int[:] xs) {
    @defer release(xs);
    @defer(err) rollback();
    int? head = first(xs);
    int v = try decode(*head);
    CCClosure1 scale = make_scale(2);
    return cc_ok(scale(v));
}
"#;
    let out = Frontend::new().lower_string(src, "unit.cc").unwrap();

    // Header and includes survive with the line anchor first.
    assert!(out.starts_with("#line 1 \"unit.cc\""));
    assert!(out.contains("#include <stdio.h>"));
    assert!(out.contains("#include \"chan.h\""));

    // Channel vocabulary.
    assert!(out.contains("CCChanTx tx;"));
    assert!(out.contains("CCChanRx rx;"));
    assert!(out.contains("cc_chan_pair_create_full(4, CC_CHAN_MODE_BLOCK, 0, sizeof(int), 0, CC_CHAN_TOPO_DEFAULT, &tx, &rx)"));

    // Deadline + match.
    assert!(out.contains("CCDeadline __cc_dl0 = cc_deadline_make((ms(100)));"));
    assert!(out.contains("cc_chan_match_select"));
    assert!(out.contains("if (cc_is_cancelled())"));

    // Types and expression sugar.
    assert!(out.contains("CCResult_int_CCIoError read_header(void);"));
    assert!(out.contains("CCSlice xs"));
    assert!(out.contains("__CC_OPTIONAL(int) head"));
    assert!(out.contains("cc_try(decode(cc_unwrap_opt(head)))"));
    assert!(out.contains("cc_ok_CCResult_int_CCError"));
    assert!(out.contains("cc_closure1_call(scale, (intptr_t)("));

    // Defer materialized at the conditional return.
    assert!(out.contains("int __cc_ret_err = !__cc_ret.ok;"));
    assert!(out.contains("release(xs);"));
    assert!(out.contains("if (__cc_ret_err) {"));
    assert!(out.contains("rollback();"));

    // Registry declarations sit after the includes, before the code.
    let decl_at = out.find("__CC_RESULT(int, IoError, int, CCIoError);").unwrap();
    let include_at = out.find("#include \"chan.h\"").unwrap();
    let first_fn = out.find("read_header").unwrap();
    assert!(include_at < decl_at && decl_at < first_fn);
    assert!(out.contains("__CC_OPTIONAL_DECL(int, int);"));

    // No CC surface syntax survives.
    for token in ["@match", "@defer", "with_deadline", "channel_pair", "[:]", "!>("] {
        assert!(!out.contains(token), "leftover construct: {token}");
    }
}

#[test]
fn lowering_is_stable_on_plain_c() {
    let src = "#include <stdio.h>\nint main(void) { return 0; }\n";
    let out = Frontend::new().lower_string(src, "plain.cc").unwrap();
    assert_eq!(out, format!("#line 1 \"plain.cc\"\n{src}"));
}

#[test]
fn match_error_aborts_the_unit() {
    let err = Frontend::new()
        .lower_string("void f(void) { @match { case tx.send(1): a(); ", "bad.cc")
        .unwrap_err();
    assert!(matches!(err, LowerError::Syntax { .. }));
    assert!(err.to_string().contains("bad.cc"));
}

/// Canned host parser for the async path: the stub stream describes the
/// single-function fixture below, with lines matching the `#line`-prefixed
/// buffer the pipeline feeds it.
struct FixtureParser;

impl StubParser for FixtureParser {
    fn parse(&self, _source: &str, _virtual_path: &str) -> Result<StubTree, LowerError> {
        let mut t = StubTree::new("async.cc");
        let d = t.push(
            StubNode::new(StubKind::Decl, -1)
                .named("g")
                .typed("int")
                .with_attrs(StubAttr::ASYNC)
                .at(2, 1, 5, 1),
        );
        let b = t.push(StubNode::new(StubKind::Block, d as i32).at(2, 1, 5, 1));
        t.push(
            StubNode::new(StubKind::DeclItem, b as i32)
                .named("y")
                .typed("int")
                .at(3, 1, 3, 1),
        );
        Ok(t)
    }
}

#[test]
fn async_function_lowers_through_the_scheduler() {
    let src = "@async int g(int n) {\nint y = await h(n);\nreturn y + 1;\n}\n";
    let frontend = Frontend::new().with_parser(Box::new(FixtureParser));
    let out = frontend.lower_string(src, "async.cc").unwrap();

    assert!(out.contains("typedef struct {"));
    assert!(out.contains("int y;"));
    assert!(out.contains("intptr_t __cc_aw0;"));
    assert!(out.contains("int __p_n;"));
    assert!(out.contains("CCTaskIntptr __t[1];"));
    assert!(out.contains("CCTaskIntptr g(int n) {"));
    assert!(out.contains("case 999: {"));
    assert!(!out.contains("@async"));
}

#[test]
fn parse_string_requires_a_parser() {
    let err = Frontend::new().parse_string("int x;", "a.cc").unwrap_err();
    assert!(matches!(err, LowerError::Internal { .. }));
}

#[test]
fn parse_string_builds_the_typed_ast() {
    let frontend = Frontend::new().with_parser(Box::new(FixtureParser));
    let ast = frontend.parse_string("@async int g(int n) {}", "async.cc").unwrap();
    let cc_ast::NodeKind::File { items, .. } = &ast.kind else {
        panic!("expected File root")
    };
    assert_eq!(items.len(), 1);
    assert!(matches!(
        &items[0].kind,
        cc_ast::NodeKind::FuncDecl { name, .. } if name == "g"
    ));
}

#[test]
fn lower_file_round_trips_through_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("main.cc");
    let output = dir.path().join("main.c");
    std::fs::write(&input, "int main(void) { int v = try run(); return v; }\n").unwrap();

    Frontend::new().lower_file(&input, &output).unwrap();
    let lowered = std::fs::read_to_string(&output).unwrap();
    assert!(lowered.contains("int v = cc_try(run());"));
}

#[test]
fn missing_input_is_an_io_error() {
    let err = Frontend::new()
        .lower_file(
            std::path::Path::new("__missing__.cc"),
            std::path::Path::new("__out__.c"),
        )
        .unwrap_err();
    assert!(matches!(err, LowerError::Io { .. }));
}

#[test]
fn dump_lowered_config_writes_a_copy() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.c");
    let mut cfg = ccfront::Config::default();
    cfg.file.output.dump_lowered = Some(dump.clone());
    let frontend = Frontend::new().with_config(cfg);
    let out = frontend.lower_string("int x = try f();", "d.cc").unwrap();
    assert_eq!(std::fs::read_to_string(&dump).unwrap(), out);
}
