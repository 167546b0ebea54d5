//! Per-node stub-to-AST conversion.
//!
//! Conversion is local: operand slots that the stub stream cannot express
//! yet are filled with a placeholder expression and completed (or salvaged)
//! during linking.

use crate::{fn_attrs, span_of};
use cc_ast::{BinOp, DeferCond, Node, NodeKind, UnOp};
use cc_stub::{StubAttr, StubKind, StubNode};
use std::sync::Arc;

/// Placeholder for an operand slot the stream has not yet delivered.
/// Linking either fills it or the node is dropped as unusable.
pub(crate) fn missing_expr() -> Node {
    Node::new(NodeKind::Ident { name: String::new() })
}

pub(crate) fn is_missing(n: &Node) -> bool {
    matches!(&n.kind, NodeKind::Ident { name } if name.is_empty())
}

fn ty_node(spelling: &str) -> Node {
    let trimmed = spelling.trim();
    if let Some(inner) = trimmed.strip_suffix('*') {
        Node::new(NodeKind::TypePtr {
            inner: Box::new(ty_node(inner)),
        })
    } else {
        Node::new(NodeKind::TypeName {
            name: trimmed.to_string(),
        })
    }
}

fn s1(stub: &StubNode) -> String {
    stub.s1.clone().unwrap_or_default()
}

/// Map one stub entry to its AST node. `None` drops the node (unknown kind
/// or unintelligible operator spelling).
pub(crate) fn convert(stub: &StubNode, unit_file: &Arc<str>) -> Option<Node> {
    let kind = match stub.kind {
        StubKind::Decl => NodeKind::FuncDecl {
            name: s1(stub),
            ret: stub.s2.as_deref().map(|t| Box::new(ty_node(t))),
            params: Vec::new(),
            body: None,
            attrs: fn_attrs(stub.attrs()),
        },
        StubKind::DeclItem => NodeKind::VarDecl {
            name: s1(stub),
            var_ty: stub.s2.as_deref().map(|t| Box::new(ty_node(t))),
            init: None,
        },
        StubKind::Param => NodeKind::Param {
            name: s1(stub),
            param_ty: stub.s2.as_deref().map(|t| Box::new(ty_node(t))),
        },
        StubKind::Typedef => NodeKind::Typedef {
            name: s1(stub),
            aliased: stub.s2.as_deref().map(|t| Box::new(ty_node(t))),
        },
        StubKind::StructDecl => NodeKind::StructDecl {
            name: s1(stub),
            fields: Vec::new(),
            is_union: stub.attrs().contains(StubAttr::UNION),
        },
        StubKind::StructField => NodeKind::StructField {
            name: s1(stub),
            field_ty: stub.s2.as_deref().map(|t| Box::new(ty_node(t))),
        },
        StubKind::EnumDecl => NodeKind::EnumDecl {
            name: s1(stub),
            values: Vec::new(),
        },
        StubKind::EnumValue => NodeKind::EnumValue {
            name: s1(stub),
            value: None,
        },
        StubKind::Block | StubKind::Then | StubKind::Else => NodeKind::Block { stmts: Vec::new() },
        StubKind::StmtIf => NodeKind::If {
            cond: None,
            then_branch: None,
            else_branch: None,
        },
        StubKind::StmtWhile => NodeKind::While {
            cond: None,
            body: None,
        },
        StubKind::StmtFor => NodeKind::For {
            init: None,
            cond: None,
            post: None,
            body: None,
        },
        StubKind::StmtForAwait => NodeKind::ForAwait {
            binding: s1(stub),
            source: None,
            body: None,
        },
        StubKind::StmtSwitch => NodeKind::Switch {
            scrutinee: None,
            body: None,
        },
        StubKind::StmtReturn => NodeKind::Return { value: None },
        StubKind::StmtBreak => NodeKind::Break,
        StubKind::StmtContinue => NodeKind::Continue,
        StubKind::StmtGoto => NodeKind::Goto { label: s1(stub) },
        StubKind::StmtLabel => NodeKind::Label { name: s1(stub) },
        StubKind::StmtExpr => NodeKind::ExprStmt {
            expr: Box::new(missing_expr()),
        },
        StubKind::StmtNursery => NodeKind::Nursery { body: None },
        StubKind::StmtArena => NodeKind::Arena { body: None },
        StubKind::StmtDefer => NodeKind::Defer {
            cond: match stub.aux1 {
                1 => DeferCond::OnOk,
                2 => DeferCond::OnErr,
                _ => DeferCond::Always,
            },
            stmt: None,
        },
        StubKind::StmtSpawn => NodeKind::Spawn { call: None },
        StubKind::StmtMatch => NodeKind::Match { arms: Vec::new() },
        StubKind::MatchArm => NodeKind::MatchArm {
            header: None,
            body: None,
        },
        StubKind::Ident => NodeKind::Ident { name: s1(stub) },
        StubKind::IntLit => {
            let value = stub
                .s1
                .as_deref()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(stub.aux1 as i64);
            NodeKind::IntLit { value }
        }
        StubKind::FloatLit => NodeKind::FloatLit { text: s1(stub) },
        StubKind::StrLit => NodeKind::StringLit { value: s1(stub) },
        StubKind::CharLit => NodeKind::CharLit { value: s1(stub) },
        StubKind::Call => NodeKind::Call {
            callee: Box::new(Node::new(NodeKind::Ident { name: s1(stub) })),
            args: Vec::new(),
        },
        StubKind::Method => NodeKind::Method {
            recv: Box::new(missing_expr()),
            name: s1(stub),
            args: Vec::new(),
        },
        StubKind::Field => NodeKind::FieldAccess {
            obj: Box::new(missing_expr()),
            field: s1(stub),
            arrow: stub.attrs().contains(StubAttr::ARROW),
        },
        StubKind::Index => NodeKind::IndexExpr {
            array: Box::new(missing_expr()),
            index: Box::new(missing_expr()),
        },
        StubKind::Unary => {
            let op = UnOp::from_spelling(stub.s2.as_deref().unwrap_or(""))?;
            NodeKind::Unary {
                op,
                operand: Box::new(missing_expr()),
            }
        }
        StubKind::Binary => {
            let op = BinOp::from_spelling(stub.s2.as_deref().unwrap_or(""))?;
            NodeKind::Binary {
                op,
                lhs: Box::new(missing_expr()),
                rhs: Box::new(missing_expr()),
            }
        }
        StubKind::Ternary => NodeKind::Ternary {
            cond: Box::new(missing_expr()),
            then_val: Box::new(missing_expr()),
            else_val: Box::new(missing_expr()),
        },
        StubKind::Cast => NodeKind::Cast {
            to: Box::new(ty_node(stub.s2.as_deref().unwrap_or("void"))),
            expr: Box::new(missing_expr()),
        },
        StubKind::SizeOf => NodeKind::SizeOf {
            arg: Box::new(missing_expr()),
        },
        StubKind::Assign | StubKind::Compound => {
            let spelling = stub.s2.as_deref().unwrap_or("=");
            match spelling.strip_suffix('=').filter(|s| !s.is_empty()) {
                Some(op_text) if spelling != "==" => {
                    let op = BinOp::from_spelling(op_text)?;
                    NodeKind::CompoundAssign {
                        op,
                        lhs: Box::new(missing_expr()),
                        rhs: Box::new(missing_expr()),
                    }
                }
                _ => NodeKind::Assign {
                    lhs: Box::new(missing_expr()),
                    rhs: Box::new(missing_expr()),
                },
            }
        }
        StubKind::InitList => NodeKind::InitList { items: Vec::new() },
        StubKind::Closure => NodeKind::Closure {
            id: stub.aux1,
            params: Vec::new(),
            captures: Vec::new(),
            capture_tys: Vec::new(),
            body: None,
        },
        StubKind::Await => NodeKind::Await { operand: None },
        StubKind::ChanSend => NodeKind::ChanSend {
            chan: Box::new(missing_expr()),
            value: Box::new(missing_expr()),
        },
        StubKind::ChanRecv => NodeKind::ChanRecv {
            chan: Box::new(missing_expr()),
            dest: None,
        },
        StubKind::OkCtor => NodeKind::OkCtor { value: None },
        StubKind::ErrCtor => NodeKind::ErrCtor { value: None },
        StubKind::SomeCtor => NodeKind::SomeCtor { value: None },
        StubKind::NoneCtor => NodeKind::NoneCtor,
        StubKind::Try => NodeKind::Try {
            expr: Box::new(missing_expr()),
        },
        StubKind::Designator => NodeKind::Designator {
            field: s1(stub),
            value: None,
        },
        StubKind::Other => return None,
    };
    let mut node = Node::new(kind).with_span(span_of(stub, unit_file));
    if let Some(t) = &stub.s2 {
        // The secondary spelling doubles as the type annotation for value
        // nodes (identifiers, calls, declarations, method receivers).
        if matches!(
            node.kind,
            NodeKind::Ident { .. }
                | NodeKind::VarDecl { .. }
                | NodeKind::Param { .. }
                | NodeKind::Call { .. }
                | NodeKind::Method { .. }
        ) {
            node.ty = Some(t.clone());
        }
    }
    Some(node)
}
