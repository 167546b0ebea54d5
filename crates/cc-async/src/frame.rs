//! Frame inventory: what gets hoisted out of an `@async` function body.
//!
//! Locals come from the stub stream's declaration items inside the body
//! block, validated against the source line so prelude-typed dummies are
//! never hoisted. Parameters are parsed from the source parameter list.
//! Await sites are counted textually, capped at [`MAX_AWAITS`].

use cc_stub::{StubKind, StubTree};
use cc_text::CodeMap;
use std::collections::HashMap;
use tracing::debug;

/// Upper bound on await sites per function; the task-slot array is sized by
/// the actual count.
pub const MAX_AWAITS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameVar {
    pub name: String,
    /// Original C type spelling, preserved verbatim.
    pub ty: String,
}

#[derive(Debug, Default)]
pub struct Frame {
    pub locals: Vec<FrameVar>,
    pub params: Vec<FrameVar>,
    pub await_count: usize,
}

impl Frame {
    /// Identifier map from hoisted names to frame slots.
    pub fn name_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for l in &self.locals {
            map.insert(l.name.clone(), format!("__f->{}", l.name));
        }
        for p in &self.params {
            map.insert(p.name.clone(), format!("__f->__p_{}", p.name));
        }
        map
    }
}

/// Collect the frame for one async function.
///
/// `body_block` is the tightest stub BLOCK enclosing the body; when the stub
/// stream has no usable block the line range alone filters declaration
/// items.
pub fn collect_frame(
    src: &str,
    stubs: &StubTree,
    body_block: Option<usize>,
    body_lines: (u32, u32),
    params_text: &str,
    body_text: &str,
) -> Frame {
    let mut frame = Frame::default();

    for (i, node) in stubs.nodes().iter().enumerate() {
        if node.kind != StubKind::DeclItem {
            continue;
        }
        let in_body = match body_block {
            Some(b) => stubs.is_within(i, b),
            None => node.start_line >= body_lines.0 && node.end_line <= body_lines.1,
        };
        if !in_body {
            continue;
        }
        let Some(name) = node.s1.clone() else { continue };
        // Compiler-introduced temporaries are short-lived; never hoisted.
        if name.starts_with("__cc_ab_") || name.starts_with("__cc_ns_c") {
            continue;
        }
        let ty = node.s2.clone().unwrap_or_else(|| "intptr_t".to_string());
        // Dummy int-typed stubs appear for prelude types; the source line
        // must actually open with an int spelling for the item to be real.
        if ty == "int" && !line_starts_with_int(src, node.start_line) {
            debug!(target: "pipeline.async", name = %name, line = node.start_line, "rejecting dummy int decl item");
            continue;
        }
        if frame.locals.iter().any(|l| l.name == name) {
            continue;
        }
        frame.locals.push(FrameVar { name, ty });
    }

    frame.params = parse_params(params_text);
    frame.await_count = count_awaits(body_text).min(MAX_AWAITS);
    frame
}

fn line_starts_with_int(src: &str, line: u32) -> bool {
    if line == 0 {
        return false;
    }
    let Some(text) = src.lines().nth(line as usize - 1) else {
        return false;
    };
    let t = text.trim_start();
    ["int", "intptr_t", "CCAbIntptr"]
        .iter()
        .any(|p| t.starts_with(p))
}

/// Parse a parenthesized parameter list: the last identifier of each
/// comma-separated chunk is the name, everything before it the type.
pub fn parse_params(text: &str) -> Vec<FrameVar> {
    let inner = text.trim();
    if inner.is_empty() || inner == "void" {
        return Vec::new();
    }
    let mut out = Vec::new();
    for chunk in split_commas(inner) {
        let chunk = chunk.trim();
        if chunk.is_empty() || chunk == "..." {
            continue;
        }
        let bytes = chunk.as_bytes();
        let mut end = bytes.len();
        while end > 0 && !cc_text::is_ident_char(bytes[end - 1] as char) {
            end -= 1;
        }
        let mut start = end;
        while start > 0 && cc_text::is_ident_char(bytes[start - 1] as char) {
            start -= 1;
        }
        if start == end {
            continue;
        }
        let name = chunk[start..end].to_string();
        let ty = chunk[..start].trim().to_string();
        if ty.is_empty() {
            continue;
        }
        out.push(FrameVar { name, ty });
    }
    out
}

fn split_commas(s: &str) -> Vec<&str> {
    let map = CodeMap::new(s);
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut parts = Vec::new();
    let mut from = 0;
    for i in 0..bytes.len() {
        if !map.is_code(i) {
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&s[from..i]);
                from = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[from..]);
    parts
}

/// Word-boundary, literal-safe count of `await` sites.
pub fn count_awaits(body: &str) -> usize {
    let map = CodeMap::new(body);
    let mut n = 0;
    let mut at = 0;
    while let Some(pos) = map.find_token(body, at, "await") {
        n += 1;
        at = pos + 5;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_stub::{StubNode, StubTree};

    #[test]
    fn params_parse_names_and_types() {
        let ps = parse_params("int n, const char *name, size_t len");
        assert_eq!(
            ps,
            vec![
                FrameVar { name: "n".into(), ty: "int".into() },
                FrameVar { name: "name".into(), ty: "const char *".into() },
                FrameVar { name: "len".into(), ty: "size_t".into() },
            ]
        );
    }

    #[test]
    fn void_and_empty_param_lists() {
        assert!(parse_params("void").is_empty());
        assert!(parse_params("  ").is_empty());
    }

    #[test]
    fn await_count_skips_literals() {
        assert_eq!(count_awaits("x = await f(); y = await g();"), 2);
        assert_eq!(count_awaits("s = \"await\"; /* await */"), 0);
        assert_eq!(count_awaits("awaited();"), 0);
    }

    #[test]
    fn dummy_int_items_are_rejected() {
        let src = "void g(void);\nint y = 0;\n";
        let mut t = StubTree::new("t.cc");
        let d = t.push(StubNode::new(StubKind::Decl, -1).named("f"));
        let b = t.push(StubNode::new(StubKind::Block, d as i32));
        // Line 1 does not start with int: a prelude dummy.
        t.push(
            StubNode::new(StubKind::DeclItem, b as i32)
                .named("ghost")
                .typed("int")
                .at(1, 1, 1, 5),
        );
        // Line 2 is a real int declaration.
        t.push(
            StubNode::new(StubKind::DeclItem, b as i32)
                .named("y")
                .typed("int")
                .at(2, 1, 2, 5),
        );
        let frame = collect_frame(src, &t, Some(b), (1, 2), "", "");
        assert_eq!(frame.locals.len(), 1);
        assert_eq!(frame.locals[0].name, "y");
    }

    #[test]
    fn compiler_temporaries_are_rejected() {
        let src = "intptr_t __cc_ab_0 = 0;\n";
        let mut t = StubTree::new("t.cc");
        let d = t.push(StubNode::new(StubKind::Decl, -1).named("f"));
        let b = t.push(StubNode::new(StubKind::Block, d as i32));
        t.push(
            StubNode::new(StubKind::DeclItem, b as i32)
                .named("__cc_ab_0")
                .typed("intptr_t")
                .at(1, 1, 1, 5),
        );
        t.push(
            StubNode::new(StubKind::DeclItem, b as i32)
                .named("__cc_ns_c1")
                .typed("int")
                .at(1, 1, 1, 5),
        );
        let frame = collect_frame(src, &t, Some(b), (1, 1), "", "");
        assert!(frame.locals.is_empty());
    }

    #[test]
    fn name_map_prefixes_params() {
        let mut frame = Frame::default();
        frame.locals.push(FrameVar { name: "y".into(), ty: "int".into() });
        frame.params.push(FrameVar { name: "n".into(), ty: "int".into() });
        let map = frame.name_map();
        assert_eq!(map["y"], "__f->y");
        assert_eq!(map["n"], "__f->__p_n");
    }

    #[test]
    fn await_cap_is_enforced() {
        let body = "x = await f();".repeat(100);
        let frame = collect_frame("", &StubTree::new("t.cc"), None, (1, 1), "", &body);
        assert_eq!(frame.await_count, MAX_AWAITS);
    }
}
