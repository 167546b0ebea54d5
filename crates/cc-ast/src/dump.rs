//! Recursive human-readable tree dump, used by the `CC_DEBUG_*` hooks and
//! by test failure output.

use crate::{Node, NodeKind};
use std::fmt::Write as _;

pub(crate) fn dump_into(node: &Node, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    let label = summary(node);
    let _ = write!(out, "{pad}{}", node.kind.tag());
    if !label.is_empty() {
        let _ = write!(out, " {label}");
    }
    if let Some(ty) = &node.ty {
        let _ = write!(out, " : {ty}");
    }
    if node.span.start.line != 0 {
        let _ = write!(
            out,
            " @{}:{}",
            node.span.start.line, node.span.start.col
        );
    }
    out.push('\n');
    for child in node.children() {
        dump_into(child, indent + 1, out);
    }
}

fn summary(node: &Node) -> String {
    match &node.kind {
        NodeKind::File { name, .. } => name.clone(),
        NodeKind::Include { path, system } => {
            if *system {
                format!("<{path}>")
            } else {
                format!("\"{path}\"")
            }
        }
        NodeKind::FuncDecl { name, attrs, .. } => {
            if attrs.is_empty() {
                name.clone()
            } else {
                format!("{name} [{attrs:?}]")
            }
        }
        NodeKind::VarDecl { name, .. }
        | NodeKind::Typedef { name, .. }
        | NodeKind::StructField { name, .. }
        | NodeKind::EnumDecl { name, .. }
        | NodeKind::EnumValue { name, .. }
        | NodeKind::Param { name, .. }
        | NodeKind::TypeName { name }
        | NodeKind::Label { name }
        | NodeKind::Ident { name } => name.clone(),
        NodeKind::StructDecl { name, is_union, .. } => {
            if *is_union {
                format!("union {name}")
            } else {
                format!("struct {name}")
            }
        }
        NodeKind::Goto { label } => label.clone(),
        NodeKind::IntLit { value } => value.to_string(),
        NodeKind::FloatLit { text } => text.clone(),
        NodeKind::StringLit { value } => format!("{value:?}"),
        NodeKind::CharLit { value } => format!("'{value}'"),
        NodeKind::Method { name, .. } => format!(".{name}"),
        NodeKind::FieldAccess { field, arrow, .. } => {
            if *arrow {
                format!("->{field}")
            } else {
                format!(".{field}")
            }
        }
        NodeKind::Unary { op, .. } => format!("{op:?}"),
        NodeKind::Binary { op, .. } => op.spelling().to_string(),
        NodeKind::CompoundAssign { op, .. } => format!("{}=", op.spelling()),
        NodeKind::Defer { cond, .. } => format!("{cond:?}"),
        NodeKind::Closure { id, .. } => format!("#{id}"),
        NodeKind::Designator { field, .. } => format!(".{field}"),
        NodeKind::TypeSlice { unique, .. } => {
            if *unique {
                "[:!]".to_string()
            } else {
                "[:]".to_string()
            }
        }
        _ => String::new(),
    }
}
