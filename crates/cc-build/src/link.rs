//! Child linking and salvage.
//!
//! The stub stream does not distinguish an identifier used as a callee, as a
//! bare expression statement, or as the left operand of a binary that the
//! parser reported afterwards. Linking therefore applies a small set of
//! salvage rules while attaching children to their (already converted)
//! parents. Every rule is local: it looks only at the incoming child and the
//! last already-attached sibling.

use crate::convert::is_missing;
use cc_ast::{Node, NodeKind, UnOp};
use cc_stub::{StubKind, StubTree};
use tracing::debug;

/// Materialize stub `i` and its recorded children into one AST node.
/// Children are attached in stream order, which reconstructs source order.
pub(crate) fn build_node(
    stubs: &StubTree,
    slots: &mut [Option<Node>],
    kids: &mut [Vec<usize>],
    i: usize,
) -> Option<Node> {
    let mut node = slots[i].take()?;
    let kid_idxs = std::mem::take(&mut kids[i]);
    for k in kid_idxs {
        let stub_kind = stubs.node(k).map(|n| n.kind).unwrap_or(StubKind::Other);
        let Some(child) = build_node(stubs, slots, kids, k) else {
            continue;
        };
        attach(&mut node, child, stub_kind);
    }
    if let NodeKind::Block { stmts } = &mut node.kind {
        // Bare expressions that survived linking become expression
        // statements; placeholders that were never completed are dropped.
        let mut wrapped = Vec::with_capacity(stmts.len());
        for stmt in stmts.drain(..) {
            if is_missing(&stmt) {
                continue;
            }
            if is_expr(&stmt) {
                let span = stmt.span.clone();
                wrapped.push(
                    Node::new(NodeKind::ExprStmt {
                        expr: Box::new(stmt),
                    })
                    .with_span(span),
                );
            } else {
                wrapped.push(stmt);
            }
        }
        *stmts = wrapped;
    }
    Some(node)
}

/// True for expression-shaped nodes (the ones a block must wrap).
fn is_expr(n: &Node) -> bool {
    matches!(
        n.kind,
        NodeKind::Ident { .. }
            | NodeKind::IntLit { .. }
            | NodeKind::FloatLit { .. }
            | NodeKind::StringLit { .. }
            | NodeKind::CharLit { .. }
            | NodeKind::Call { .. }
            | NodeKind::Method { .. }
            | NodeKind::FieldAccess { .. }
            | NodeKind::IndexExpr { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Binary { .. }
            | NodeKind::Ternary { .. }
            | NodeKind::Cast { .. }
            | NodeKind::SizeOf { .. }
            | NodeKind::Assign { .. }
            | NodeKind::CompoundAssign { .. }
            | NodeKind::InitList { .. }
            | NodeKind::Closure { .. }
            | NodeKind::Await { .. }
            | NodeKind::ChanSend { .. }
            | NodeKind::ChanRecv { .. }
            | NodeKind::OkCtor { .. }
            | NodeKind::ErrCtor { .. }
            | NodeKind::SomeCtor { .. }
            | NodeKind::NoneCtor
            | NodeKind::Try { .. }
    )
}

/// A sibling shape the salvage rules may adopt as an operand: identifier,
/// field or index access, pointer dereference, call, or method.
fn viable_operand(n: &Node) -> bool {
    match &n.kind {
        NodeKind::Ident { name } => !name.is_empty(),
        NodeKind::FieldAccess { .. }
        | NodeKind::IndexExpr { .. }
        | NodeKind::Call { .. }
        | NodeKind::Method { .. } => true,
        NodeKind::Unary { op, .. } => *op == UnOp::Deref,
        _ => false,
    }
}

/// Unwrap an expression statement down to its expression.
fn unwrap_expr(n: Node) -> Node {
    match n.kind {
        NodeKind::ExprStmt { expr } => *expr,
        _ => n,
    }
}

fn last_viable(stmts: &[Node]) -> bool {
    stmts
        .last()
        .map(|s| match &s.kind {
            NodeKind::ExprStmt { expr } => viable_operand(expr),
            _ => viable_operand(s),
        })
        .unwrap_or(false)
}

fn set_expr_slot(slot: &mut Box<Node>, value: Node) -> bool {
    if is_missing(slot) {
        **slot = value;
        true
    } else {
        false
    }
}

/// Attach one built child to its built parent according to the parent's
/// variant. `stub_kind` is the child's stub kind: `Then`/`Else` wrappers are
/// indistinguishable from blocks once converted.
pub(crate) fn attach(parent: &mut Node, child: Node, stub_kind: StubKind) {
    match &mut parent.kind {
        NodeKind::Block { stmts } => attach_to_block(stmts, child, stub_kind),

        NodeKind::FuncDecl {
            ret, params, body, ..
        } => match child.kind {
            NodeKind::Param { .. } => params.push(child),
            NodeKind::Block { .. } if body.is_none() => *body = Some(Box::new(child)),
            NodeKind::TypeName { .. } | NodeKind::TypePtr { .. } if ret.is_none() => {
                *ret = Some(Box::new(child))
            }
            _ => {}
        },

        NodeKind::VarDecl { var_ty, init, .. } => match &child.kind {
            NodeKind::TypeName { .. } | NodeKind::TypePtr { .. } if var_ty.is_none() => {
                *var_ty = Some(Box::new(child))
            }
            _ if is_expr(&child) && init.is_none() => *init = Some(Box::new(child)),
            _ => {}
        },

        NodeKind::Typedef { aliased, .. } => {
            if aliased.is_none() {
                *aliased = Some(Box::new(child));
            }
        }
        NodeKind::StructDecl { fields, .. } => {
            if matches!(child.kind, NodeKind::StructField { .. }) {
                fields.push(child);
            }
        }
        NodeKind::EnumDecl { values, .. } => {
            if matches!(child.kind, NodeKind::EnumValue { .. }) {
                values.push(child);
            }
        }
        NodeKind::EnumValue { value, .. } => {
            if value.is_none() && is_expr(&child) {
                *value = Some(Box::new(child));
            }
        }
        NodeKind::Param { param_ty, .. } | NodeKind::StructField { field_ty: param_ty, .. } => {
            if param_ty.is_none() {
                *param_ty = Some(Box::new(child));
            }
        }

        NodeKind::Return { value } => {
            if value.is_none() && is_expr(&child) {
                *value = Some(Box::new(child));
            }
        }

        NodeKind::If {
            cond,
            then_branch,
            else_branch,
        } => match stub_kind {
            StubKind::Then => *then_branch = Some(Box::new(child)),
            StubKind::Else => *else_branch = Some(Box::new(child)),
            _ if is_expr(&child) && cond.is_none() => *cond = Some(Box::new(child)),
            _ if then_branch.is_none() => *then_branch = Some(Box::new(child)),
            _ if else_branch.is_none() => *else_branch = Some(Box::new(child)),
            _ => {}
        },

        NodeKind::While { cond, body } => {
            if is_expr(&child) && cond.is_none() {
                *cond = Some(Box::new(child));
            } else if body.is_none() {
                *body = Some(Box::new(child));
            }
        }

        NodeKind::For {
            init,
            cond,
            post,
            body,
        } => match &child.kind {
            NodeKind::Block { .. } => {
                if body.is_none() {
                    *body = Some(Box::new(child));
                }
            }
            _ if init.is_none() => *init = Some(Box::new(child)),
            _ if cond.is_none() => *cond = Some(Box::new(child)),
            _ if post.is_none() => *post = Some(Box::new(child)),
            _ if body.is_none() => *body = Some(Box::new(child)),
            _ => {}
        },

        NodeKind::ForAwait { source, body, .. } => {
            if is_expr(&child) && source.is_none() {
                *source = Some(Box::new(child));
            } else if body.is_none() {
                *body = Some(Box::new(child));
            }
        }

        NodeKind::Switch { scrutinee, body } => {
            if is_expr(&child) && scrutinee.is_none() {
                *scrutinee = Some(Box::new(child));
            } else if body.is_none() {
                *body = Some(Box::new(child));
            }
        }

        NodeKind::Nursery { body } | NodeKind::Arena { body } => {
            if body.is_none() {
                *body = Some(Box::new(child));
            }
        }
        NodeKind::Defer { stmt, .. } => {
            if stmt.is_none() {
                *stmt = Some(Box::new(child));
            }
        }
        NodeKind::Spawn { call } => {
            if call.is_none() {
                *call = Some(Box::new(unwrap_expr(child)));
            }
        }
        NodeKind::Match { arms } => {
            if matches!(child.kind, NodeKind::MatchArm { .. }) {
                arms.push(child);
            }
        }
        NodeKind::MatchArm { header, body } => {
            if is_expr(&child) && header.is_none() {
                *header = Some(Box::new(child));
            } else if body.is_none() {
                *body = Some(Box::new(child));
            }
        }

        NodeKind::ExprStmt { expr } => {
            set_expr_slot(expr, child);
        }

        NodeKind::Call { callee, args } => {
            // The host parser sometimes re-emits the callee identifier as the
            // first child; it is a duplicate, not an argument.
            if args.is_empty()
                && let (NodeKind::Ident { name: callee_name }, NodeKind::Ident { name }) =
                    (&callee.kind, &child.kind)
                && callee_name == name
            {
                debug!(target: "build", callee = %name, "dropping duplicate callee child");
                return;
            }
            args.push(child);
        }

        NodeKind::Method { recv, args, .. } => {
            if is_missing(recv) {
                **recv = child;
            } else {
                args.push(child);
            }
        }

        NodeKind::FieldAccess { obj, .. } => {
            set_expr_slot(obj, child);
        }
        NodeKind::IndexExpr { array, index } => {
            if is_missing(array) {
                **array = child;
            } else if is_missing(index) {
                **index = child;
            }
        }
        NodeKind::Unary { operand, .. } => {
            set_expr_slot(operand, child);
        }
        NodeKind::Binary { lhs, rhs, .. } => {
            if is_missing(lhs) {
                **lhs = child;
            } else if is_missing(rhs) {
                **rhs = child;
            }
        }
        NodeKind::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            if is_missing(cond) {
                **cond = child;
            } else if is_missing(then_val) {
                **then_val = child;
            } else if is_missing(else_val) {
                **else_val = child;
            }
        }
        NodeKind::Cast { expr, .. } | NodeKind::Try { expr } => {
            set_expr_slot(expr, child);
        }
        NodeKind::SizeOf { arg } => {
            set_expr_slot(arg, child);
        }
        NodeKind::Assign { lhs, rhs } | NodeKind::CompoundAssign { lhs, rhs, .. } => {
            if is_missing(lhs) {
                **lhs = child;
            } else if is_missing(rhs) {
                **rhs = child;
            }
        }
        NodeKind::InitList { items } => items.push(child),
        NodeKind::Closure {
            params,
            captures,
            capture_tys,
            body,
            ..
        } => match &child.kind {
            NodeKind::Param { .. } => params.push(child),
            NodeKind::Block { .. } => {
                if body.is_none() {
                    *body = Some(Box::new(child));
                }
            }
            NodeKind::Ident { .. } => {
                capture_tys.push(child.ty.clone().unwrap_or_default());
                captures.push(child);
            }
            _ => {}
        },
        NodeKind::Await { operand } => {
            if operand.is_none() {
                *operand = Some(Box::new(unwrap_expr(child)));
            }
        }
        NodeKind::ChanSend { chan, value } => {
            if is_missing(chan) {
                **chan = child;
            } else if is_missing(value) {
                **value = child;
            }
        }
        NodeKind::ChanRecv { chan, dest } => {
            if is_missing(chan) {
                **chan = child;
            } else if dest.is_none() {
                *dest = Some(Box::new(child));
            }
        }
        NodeKind::OkCtor { value } | NodeKind::ErrCtor { value } | NodeKind::SomeCtor { value } => {
            if value.is_none() {
                *value = Some(Box::new(child));
            }
        }
        NodeKind::Designator { value, .. } => {
            if value.is_none() {
                *value = Some(Box::new(child));
            }
        }

        // Leaves and the file node (assembled separately) take no children.
        _ => {}
    }
}

/// Attachment into a block, including every sibling-salvage rule.
fn attach_to_block(stmts: &mut Vec<Node>, mut child: Node, stub_kind: StubKind) {
    // Dimension hint: a bare integer literal right after an array-typed
    // variable declaration restates the array length.
    if matches!(child.kind, NodeKind::IntLit { .. })
        && let Some(last) = stmts.last()
        && matches!(&last.kind, NodeKind::VarDecl { .. })
        && last.ty.as_deref().is_some_and(|t| t.contains('['))
    {
        debug!(target: "build", "discarding array dimension hint literal");
        return;
    }

    match &mut child.kind {
        // Adopt the preceding bare expression as the left operand. When the
        // stream delivered only the right operand it occupies the lhs slot,
        // so the existing operand shifts right first.
        NodeKind::Binary { lhs, rhs, .. }
        | NodeKind::Assign { lhs, rhs }
        | NodeKind::CompoundAssign { lhs, rhs, .. }
            if is_missing(rhs) && last_viable(stmts) =>
        {
            let operand = unwrap_expr(stmts.pop().expect("last_viable checked"));
            debug!(target: "build", adopted = operand.kind.tag(), "binary adopts preceding sibling as lhs");
            if is_missing(lhs) {
                **lhs = operand;
            } else {
                **rhs = std::mem::replace(&mut **lhs, operand);
            }
        }
        // A call whose callee was also pushed as a bare identifier sibling.
        NodeKind::Call { callee, .. } => {
            if let NodeKind::Ident { name: callee_name } = &callee.kind
                && let Some(last) = stmts.last()
                && matches!(&last.kind, NodeKind::Ident { name } if name == callee_name)
            {
                debug!(target: "build", callee = %callee_name, "dropping duplicate callee sibling");
                stmts.pop();
            }
        }
        NodeKind::Unary { operand, .. } if is_missing(operand) && last_viable(stmts) => {
            **operand = unwrap_expr(stmts.pop().expect("last_viable checked"));
        }
        NodeKind::FieldAccess { obj, .. } if is_missing(obj) && last_viable(stmts) => {
            **obj = unwrap_expr(stmts.pop().expect("last_viable checked"));
        }
        NodeKind::IndexExpr { array, index } if is_missing(index) && last_viable(stmts) => {
            let operand = unwrap_expr(stmts.pop().expect("last_viable checked"));
            if is_missing(array) {
                **array = operand;
            } else {
                **index = std::mem::replace(&mut **array, operand);
            }
        }
        // `await recv.m(..)` / `await f(..)` split across siblings.
        NodeKind::Await { operand: Some(op) } => {
            let sib_name = stmts.last().and_then(|n| match &n.kind {
                NodeKind::Ident { name } => Some(name.clone()),
                NodeKind::ExprStmt { expr } => match &expr.kind {
                    NodeKind::Ident { name } => Some(name.clone()),
                    _ => None,
                },
                _ => None,
            });
            if let Some(sib) = sib_name {
                match &mut op.kind {
                    NodeKind::Method { recv, .. } if is_missing(recv) => {
                        let ident = unwrap_expr(stmts.pop().expect("checked above"));
                        debug!(target: "build", receiver = %sib, "await adopts receiver identifier");
                        **recv = ident;
                    }
                    NodeKind::Call { callee, args } => {
                        let callee_name = match &callee.kind {
                            NodeKind::Ident { name } => name.clone(),
                            _ => String::new(),
                        };
                        let ident = unwrap_expr(stmts.pop().expect("checked above"));
                        if callee_name != sib {
                            // UFCS shape: the identifier is the first argument.
                            args.insert(0, ident);
                        }
                        // Equal names: plain duplicate, already popped.
                    }
                    _ => {}
                }
            }
        }
        // A wrapper block around a nursery is bookkeeping, not scope.
        NodeKind::Block { stmts: inner } if stub_kind == StubKind::Block => {
            if inner
                .iter()
                .any(|n| matches!(n.kind, NodeKind::Nursery { .. }))
            {
                debug!(target: "build", "unwrapping block around nursery");
                stmts.append(inner);
                return;
            }
        }
        _ => {}
    }
    stmts.push(child);
}
