//! Async state-machine rewriter.
//!
//! Every `@async` function body is replaced by four artifacts: a frame
//! struct holding hoisted locals, parameters, await temporaries and task
//! slots; a poll function implementing a switch-per-state coroutine; a drop
//! function releasing pending tasks and the frame; and a constructor with
//! the original signature returning a task handle.
//!
//! The rewriter runs against the text produced by the earlier passes plus a
//! fresh stub parse of that text: stubs supply the async flags and the
//! declaration items to hoist, the text supplies exact byte ranges.

use cc_diag::{LowerError, Rewrite, SourcePos};
use cc_stub::{StubAttr, StubKind, StubTree};
use cc_text::{CodeMap, EditBuffer, line_col};
use tracing::{debug, warn};

mod emit;
mod frame;
pub mod ir;

pub use frame::{Frame, FrameVar, MAX_AWAITS};
pub use ir::Stmt;

/// One located rewrite target.
struct Target {
    name: String,
    /// Start of the `@async` token.
    start: usize,
    /// Parameter list text (inside the parens).
    params: String,
    /// Body braces.
    lbrace: usize,
    rbrace: usize,
}

pub fn rewrite_async(src: &str, stubs: &StubTree, file: &str) -> Result<Rewrite, LowerError> {
    check_await_placement(stubs, file)?;

    let async_names: Vec<&str> = stubs
        .nodes()
        .iter()
        .filter(|n| n.kind == StubKind::Decl && n.attrs().contains(StubAttr::ASYNC))
        .filter_map(|n| n.s1.as_deref())
        .collect();
    if async_names.is_empty() {
        return Ok(Rewrite::Unchanged);
    }

    let map = CodeMap::new(src);
    let mut edits = EditBuffer::new();
    let mut rewritten = 0usize;
    let mut at = 0;
    while let Some(pos) = map.find_token(src, at, "@async") {
        at = pos + "@async".len();
        let Some(target) = locate(src, &map, pos) else {
            warn!(target: "pipeline.async", "could not locate function after @async marker");
            continue;
        };
        if !async_names.contains(&target.name.as_str()) {
            warn!(
                target: "pipeline.async",
                name = %target.name,
                "@async function missing from the stub stream; skipping"
            );
            continue;
        }
        let replacement = lower_function(src, stubs, file, &target)?;
        edits.add(target.start, target.rbrace + 1, replacement, 0, 0);
        rewritten += 1;
        at = target.rbrace + 1;
    }
    if rewritten == 0 {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("async edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}

/// `await` must sit under an `@async` declaration and never under `@arena`.
fn check_await_placement(stubs: &StubTree, file: &str) -> Result<(), LowerError> {
    for (i, node) in stubs.nodes().iter().enumerate() {
        if node.kind != StubKind::Await {
            continue;
        }
        let pos = SourcePos::new(file, node.start_line, node.start_col);
        let mut cursor = i;
        let mut owner_async = false;
        while let Some(p) = stubs.parent_of(cursor) {
            let parent = stubs.node(p).expect("validated parent");
            match parent.kind {
                StubKind::StmtArena => {
                    return Err(LowerError::unsupported(
                        pos,
                        "await inside an @arena block",
                        "arena memory cannot outlive an await point; move the await out of the arena",
                    ));
                }
                StubKind::Decl => {
                    owner_async = parent.attrs().contains(StubAttr::ASYNC);
                }
                _ => {}
            }
            cursor = p;
        }
        if !owner_async {
            return Err(LowerError::unsupported(
                pos,
                "await outside of an @async function",
                "mark the enclosing function @async",
            ));
        }
    }
    Ok(())
}

/// From an `@async` marker, find the function name (last identifier before
/// the parameter list), the parameter text, and the body brace range.
fn locate(src: &str, map: &CodeMap, async_pos: usize) -> Option<Target> {
    let bytes = src.as_bytes();
    let mut i = map.skip_ws(src, async_pos + "@async".len());
    let mut last_ident: Option<(usize, usize)> = None;
    loop {
        let c = *bytes.get(i)?;
        if cc_text::is_ident_start(c as char) {
            let mut end = i + 1;
            while end < bytes.len() && cc_text::is_ident_char(bytes[end] as char) {
                end += 1;
            }
            last_ident = Some((i, end));
            i = map.skip_ws(src, end);
        } else if c == b'*' {
            i = map.skip_ws(src, i + 1);
        } else if c == b'(' {
            break;
        } else {
            return None;
        }
    }
    let (ns, ne) = last_ident?;
    let lp = i;
    let rp = map.match_paren(src, lp)?;
    let lb = map.skip_ws(src, rp + 1);
    if bytes.get(lb) != Some(&b'{') {
        return None; // prototype
    }
    let rb = map.match_brace(src, lb)?;
    Some(Target {
        name: src[ns..ne].to_string(),
        start: async_pos,
        params: src[lp + 1..rp].to_string(),
        lbrace: lb,
        rbrace: rb,
    })
}

fn lower_function(
    src: &str,
    stubs: &StubTree,
    file: &str,
    target: &Target,
) -> Result<String, LowerError> {
    let body = &src[target.lbrace + 1..target.rbrace];
    let (lb_line, _) = line_col(src, target.lbrace);
    let (rb_line, _) = line_col(src, target.rbrace);
    let (fn_line, _) = line_col(src, target.start);

    let body_block = tightest_block(stubs, lb_line, rb_line);
    let frame = frame::collect_frame(src, stubs, body_block, (lb_line, rb_line), &target.params, body);
    let stmts = ir::parse_body_fragment(body, file)?;
    debug!(
        target: "pipeline.async",
        name = %target.name,
        locals = frame.locals.len(),
        params = frame.params.len(),
        awaits = frame.await_count,
        "lowering async function"
    );

    let names = frame.name_map();
    let emitter = emit::Emitter::new(&names);
    let cases = emitter.emit_body(&stmts)?;

    let mut out = emit::render_function(&target.name, &frame, cases, &target.params, fn_line, file);
    out.push_str(&format!("#line {} \"{}\"", rb_line + 1, file));
    Ok(out)
}

/// Human-readable statement-IR dump of every `@async` function, for the
/// async debug hook.
pub fn debug_ir(src: &str, file: &str) -> Result<String, LowerError> {
    use std::fmt::Write as _;
    let map = CodeMap::new(src);
    let mut out = String::new();
    let mut at = 0;
    while let Some(pos) = map.find_token(src, at, "@async") {
        at = pos + "@async".len();
        let Some(target) = locate(src, &map, pos) else { continue };
        let body = &src[target.lbrace + 1..target.rbrace];
        let stmts = ir::parse_body_fragment(body, file)?;
        let _ = writeln!(out, "@async {}:\n{stmts:#?}", target.name);
        at = target.rbrace + 1;
    }
    Ok(out)
}

/// Tightest stub BLOCK whose line span encloses the body braces.
fn tightest_block(stubs: &StubTree, first: u32, last: u32) -> Option<usize> {
    stubs
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, n)| n.kind == StubKind::Block && n.spans_lines(first, last))
        .min_by_key(|(_, n)| n.end_line.saturating_sub(n.start_line))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests;
