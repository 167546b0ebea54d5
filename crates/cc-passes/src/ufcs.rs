//! UFCS lowering over the AST.
//!
//! `recv.m(args)` becomes `Type_m(&recv, args...)`: the receiver's type
//! qualifies the function name, and a value receiver is passed by address.
//! Receivers that are already pointers pass through unchanged, so chains
//! like `a.add(1).mul(2)` take the address exactly once. Children lower
//! first; a second run over the tree finds no `Method` nodes.

use cc_ast::{Node, NodeKind, UnOp};
use tracing::debug;

const PRIMITIVES: &[&str] = &["int", "char", "void", "float", "double", "long", "short"];

/// Rewrite every `Method` node under `node`. Returns the rewrite count.
pub fn rewrite_ufcs(node: &mut Node) -> usize {
    let mut count = 0;
    for child in node.children_mut() {
        count += rewrite_ufcs(child);
    }
    if matches!(node.kind, NodeKind::Method { .. }) {
        lower_method(node);
        count += 1;
    }
    count
}

fn lower_method(node: &mut Node) {
    let NodeKind::Method { recv, name, args } =
        std::mem::replace(&mut node.kind, NodeKind::NoneCtor)
    else {
        unreachable!("caller matched Method");
    };
    let recv_ty = recv.ty.clone();
    let callee_name = qualified_name(recv_ty.as_deref(), &name);
    let is_ptr = recv_ty.as_deref().map(|t| t.trim_end().ends_with('*')).unwrap_or(
        // Unknown type: only an explicit address-of proves pointer-ness.
        matches!(recv.kind, NodeKind::Unary { op: UnOp::AddrOf, .. }),
    );

    let receiver = if is_ptr {
        *recv
    } else {
        let span = recv.span.clone();
        Node::new(NodeKind::Unary {
            op: UnOp::AddrOf,
            operand: recv,
        })
        .with_span(span)
    };

    debug!(target: "pipeline.passes", method = %name, callee = %callee_name, "ufcs lowered");
    let mut call_args = Vec::with_capacity(args.len() + 1);
    call_args.push(receiver);
    call_args.extend(args);
    let callee = Node::ident(callee_name, node.span.clone());
    node.kind = NodeKind::Call {
        callee: Box::new(callee),
        args: call_args,
    };
}

/// `Point_m` for a known non-primitive receiver type, plain `m` otherwise.
fn qualified_name(recv_ty: Option<&str>, method: &str) -> String {
    let Some(ty) = recv_ty else {
        return method.to_string();
    };
    let base: String = ty
        .split_whitespace()
        .filter(|w| !matches!(*w, "const" | "volatile" | "struct" | "union" | "enum"))
        .collect::<Vec<_>>()
        .join(" ");
    let base = base.trim_end_matches(['*', ' ']).trim();
    if base.is_empty() || PRIMITIVES.contains(&base) {
        return method.to_string();
    }
    format!("{base}_{method}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_ast::Span;

    fn ident(name: &str, ty: Option<&str>) -> Node {
        let mut n = Node::ident(name, Span::synthetic());
        n.ty = ty.map(str::to_string);
        n
    }

    fn method(recv: Node, name: &str, args: Vec<Node>, ty: Option<&str>) -> Node {
        let mut m = Node::method(recv, name, args, Span::synthetic());
        m.ty = ty.map(str::to_string);
        m
    }

    #[test]
    fn value_receiver_takes_address() {
        let mut m = method(
            ident("p", Some("Point")),
            "scale",
            vec![Node::int_lit(2, Span::synthetic())],
            None,
        );
        rewrite_ufcs(&mut m);
        let NodeKind::Call { callee, args } = &m.kind else { panic!("expected Call") };
        assert!(matches!(&callee.kind, NodeKind::Ident { name } if name == "Point_scale"));
        assert_eq!(args.len(), 2);
        let NodeKind::Unary { op: UnOp::AddrOf, operand } = &args[0].kind else {
            panic!("value receiver must be passed by address")
        };
        assert!(matches!(&operand.kind, NodeKind::Ident { name } if name == "p"));
    }

    #[test]
    fn chained_calls_take_address_once() {
        // a.add(1).mul(2) with Point_add returning Point *.
        let inner = method(
            ident("a", Some("Point")),
            "add",
            vec![Node::int_lit(1, Span::synthetic())],
            Some("Point *"),
        );
        let mut outer = method(inner, "mul", vec![Node::int_lit(2, Span::synthetic())], None);
        rewrite_ufcs(&mut outer);

        let NodeKind::Call { callee, args } = &outer.kind else { panic!() };
        assert!(matches!(&callee.kind, NodeKind::Ident { name } if name == "Point_mul"));
        // Receiver is the inner call, not an address-of.
        let NodeKind::Call { callee: inner_callee, args: inner_args } = &args[0].kind else {
            panic!("pointer receiver must pass through unchanged")
        };
        assert!(matches!(&inner_callee.kind, NodeKind::Ident { name } if name == "Point_add"));
        assert!(matches!(
            &inner_args[0].kind,
            NodeKind::Unary { op: UnOp::AddrOf, .. }
        ));
    }

    #[test]
    fn primitive_receiver_is_not_qualified() {
        let mut m = method(ident("n", Some("int")), "abs", vec![], None);
        rewrite_ufcs(&mut m);
        let NodeKind::Call { callee, .. } = &m.kind else { panic!() };
        assert!(matches!(&callee.kind, NodeKind::Ident { name } if name == "abs"));
    }

    #[test]
    fn struct_keyword_is_stripped_from_qualifier() {
        let mut m = method(ident("s", Some("struct State *")), "tick", vec![], None);
        rewrite_ufcs(&mut m);
        let NodeKind::Call { callee, args } = &m.kind else { panic!() };
        assert!(matches!(&callee.kind, NodeKind::Ident { name } if name == "State_tick"));
        assert!(matches!(&args[0].kind, NodeKind::Ident { name } if name == "s"));
    }

    #[test]
    fn second_run_is_idempotent() {
        let mut m = method(ident("p", Some("Point")), "norm", vec![], None);
        assert_eq!(rewrite_ufcs(&mut m), 1);
        assert_eq!(rewrite_ufcs(&mut m), 0);
    }

    #[test]
    fn methods_nested_in_statements_are_found() {
        let mut blk = Node::block(Span::synthetic());
        blk.list_push(Node::ret(
            Some(method(ident("p", Some("Vec2")), "len", vec![], None)),
            Span::synthetic(),
        ));
        assert_eq!(rewrite_ufcs(&mut blk), 1);
        let stmts = blk.as_block().unwrap();
        let NodeKind::Return { value: Some(v) } = &stmts[0].kind else { panic!() };
        assert!(matches!(&v.kind, NodeKind::Call { .. }));
    }
}
