//! Reconstructs the typed AST from the host parser's flat stub stream.
//!
//! The stub stream is a low-fidelity skeleton: parent indices plus a couple
//! of strings per node. Reconstruction therefore has four repair-oriented
//! phases on top of plain conversion:
//!
//! 1. per-node conversion (stub kind -> AST tag, aux strings -> names/types,
//!    aux integers -> attribute flags),
//! 2. misparent repair (trailing sibling statements misattached under a
//!    control statement's bookkeeping node are hoisted to the grandparent),
//! 3. child linking with salvage rules (see `link`),
//! 4. body adoption for function declarations whose block arrived as a
//!    sibling, then file-root collection and the include scan.
//!
//! Malformed stubs never panic the builder: unconvertible nodes and children
//! of missing parents are dropped, and whatever remains is linked. Only a
//! structurally invalid stream (cyclic or out-of-range parents) aborts.

use cc_ast::{FnAttrs, Loc, Node, NodeKind, Span};
use cc_diag::LowerError;
use cc_stub::{StubAttr, StubKind, StubNode, StubTree};
use std::sync::Arc;
use tracing::debug;

mod convert;
mod link;

/// Build the `File` node for one translation unit.
pub fn build_file(stubs: &StubTree, source: &str, unit_path: &str) -> Result<Node, LowerError> {
    stubs.validate()?;
    let unit_file: Arc<str> = Arc::from(unit_path);

    // Phase 1: per-node conversion. Unknown kinds drop through to None.
    let mut slots: Vec<Option<Node>> = stubs
        .nodes()
        .iter()
        .map(|n| convert::convert(n, &unit_file))
        .collect();

    // Phase 2: misparent repair.
    let parents = repair_parents(stubs);

    // Shadow child lists in stream order; materialization walks these.
    let n = stubs.len();
    let mut kids: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots: Vec<usize> = Vec::new();
    for i in 0..n {
        if slots[i].is_none() {
            continue;
        }
        match parents[i] {
            p if p < 0 => roots.push(i),
            p => {
                let p = p as usize;
                if slots[p].is_some() {
                    kids[p].push(i);
                } else {
                    // Missing parent: the child is dropped, not fatal.
                    debug!(target: "build", child = i, parent = p, "dropping child of unconverted parent");
                    slots[i] = None;
                }
            }
        }
    }

    // Phase 4 (on the shadow lists): a FuncDecl with no Block child adopts
    // the next sibling Block from the same list.
    adopt_function_bodies(stubs, &mut roots, &mut kids);
    let lists: Vec<usize> = (0..n).collect();
    for i in lists {
        if !kids[i].is_empty() {
            let mut list = std::mem::take(&mut kids[i]);
            adopt_function_bodies(stubs, &mut list, &mut kids);
            kids[i] = list;
        }
    }

    // Phase 3: materialize the tree, applying the salvage rules.
    let mut items: Vec<Node> = Vec::new();
    let mut orphans = 0usize;
    for r in roots {
        let Some(node) = link::build_node(stubs, &mut slots, &mut kids, r) else {
            continue;
        };
        if !root_belongs(stubs.node(r).expect("root index valid"), &node, unit_path) {
            orphans += 1;
            continue;
        }
        items.push(node);
    }
    // Anything never transferred is released here by Drop.
    orphans += slots.iter().filter(|s| s.is_some()).count();
    if orphans > 0 {
        debug!(target: "build", orphans, "dropped unattached stub nodes");
    }

    // Phase 5/6: includes first, then declarations in source order.
    let mut file_items = scan_includes(source, &unit_file);
    file_items.extend(items);

    Ok(Node::new(NodeKind::File {
        name: unit_path.to_string(),
        items: file_items,
    })
    .with_span(Span::new(&unit_file, Loc::new(1, 1), Loc::new(1, 1))))
}

/// Compute post-repair parent indices. A statement hanging under an
/// `if`/`while`/`for`/`switch` bookkeeping node that is not the body wrapper
/// moves up to the grandparent; header expressions and declaration items
/// stay put.
fn repair_parents(stubs: &StubTree) -> Vec<i32> {
    let mut parents: Vec<i32> = stubs.nodes().iter().map(|n| n.parent).collect();
    for (i, node) in stubs.nodes().iter().enumerate() {
        if node.parent < 0 {
            continue;
        }
        let p = node.parent as usize;
        let Some(parent) = stubs.node(p) else { continue };
        if parent.kind.is_control_stmt() && node.kind.is_stmt() && !node.kind.is_body_wrapper() {
            debug!(
                target: "build",
                node = i,
                from = p,
                to = parent.parent,
                kind = ?node.kind,
                "misparent repair"
            );
            parents[i] = parent.parent;
        }
    }
    parents
}

/// For every FuncDecl in `list` without a Block child, adopt the next Block
/// element of the same list as its body.
fn adopt_function_bodies(stubs: &StubTree, list: &mut Vec<usize>, kids: &mut [Vec<usize>]) {
    let mut i = 0;
    while i < list.len() {
        let idx = list[i];
        let is_fn = stubs.node(idx).map(|n| n.kind == StubKind::Decl).unwrap_or(false);
        let has_block = kids[idx]
            .iter()
            .any(|&k| stubs.node(k).map(|n| n.kind == StubKind::Block).unwrap_or(false));
        if is_fn && !has_block {
            // Search forward, stopping at the next declaration.
            let mut found = None;
            for (j, &cand) in list.iter().enumerate().skip(i + 1) {
                match stubs.node(cand).map(|n| n.kind) {
                    Some(StubKind::Block) => {
                        found = Some(j);
                        break;
                    }
                    Some(StubKind::Decl) => break,
                    _ => {}
                }
            }
            if let Some(j) = found {
                let block = list.remove(j);
                debug!(target: "build", func = idx, block, "adopting sibling block as function body");
                kids[idx].push(block);
            }
        }
        i += 1;
    }
}

/// Top-level filter: only declarations from this translation unit belong to
/// the `File`, and parser-stub declarations (`CC`/`__CC`/`__cc` prefixes)
/// are dropped.
fn root_belongs(stub: &StubNode, node: &Node, unit_path: &str) -> bool {
    if let Some(file) = &stub.file
        && basename(file) != basename(unit_path)
    {
        return false;
    }
    let name = match &node.kind {
        NodeKind::FuncDecl { name, .. }
        | NodeKind::VarDecl { name, .. }
        | NodeKind::Typedef { name, .. }
        | NodeKind::StructDecl { name, .. }
        | NodeKind::EnumDecl { name, .. } => name.as_str(),
        // Stray non-declaration roots are not file items.
        _ => return false,
    };
    !(name.starts_with("CC") || name.starts_with("__CC") || name.starts_with("__cc"))
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Line-oriented scan of the original (pre-parse) source for `#include`
/// directives, in source order.
fn scan_includes(source: &str, unit_file: &Arc<str>) -> Vec<Node> {
    let mut out = Vec::new();
    for (lineno, raw) in source.lines().enumerate() {
        let line = raw.trim_start();
        let Some(rest) = line.strip_prefix("#include") else { continue };
        let rest = rest.trim_start();
        let (system, open, close) = match rest.chars().next() {
            Some('"') => (false, '"', '"'),
            Some('<') => (true, '<', '>'),
            _ => continue,
        };
        let inner = &rest[open.len_utf8()..];
        let Some(end) = inner.find(close) else { continue };
        let span = Span::new(
            unit_file,
            Loc::new(lineno as u32 + 1, 1),
            Loc::new(lineno as u32 + 1, raw.len() as u32 + 1),
        );
        out.push(
            Node::new(NodeKind::Include {
                path: inner[..end].to_string(),
                system,
            })
            .with_span(span),
        );
    }
    out
}

pub(crate) fn span_of(stub: &StubNode, unit_file: &Arc<str>) -> Span {
    let file = match &stub.file {
        Some(f) => Arc::from(f.as_str()),
        None => Arc::clone(unit_file),
    };
    Span {
        file,
        start: Loc::new(stub.start_line, stub.start_col),
        end: Loc::new(stub.end_line, stub.end_col),
    }
}

pub(crate) fn fn_attrs(attrs: StubAttr) -> FnAttrs {
    let mut out = FnAttrs::empty();
    if attrs.contains(StubAttr::ASYNC) {
        out |= FnAttrs::ASYNC;
    }
    if attrs.contains(StubAttr::STATIC) {
        out |= FnAttrs::STATIC;
    }
    if attrs.contains(StubAttr::NOBLOCK) {
        out |= FnAttrs::NOBLOCK;
    }
    if attrs.contains(StubAttr::UNSAFE) {
        out |= FnAttrs::UNSAFE;
    }
    out
}
