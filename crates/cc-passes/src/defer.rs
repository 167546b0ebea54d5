//! `@defer` lowering.
//!
//! Deferred statements are recorded per lexical brace depth and materialized
//! at every exit: closing braces emit the depth's unconditional entries in
//! reverse registration order, and `return` statements materialize every
//! active entry. When a conditional entry (`@defer(ok)` / `@defer(err)`) is
//! in scope, the return value is bound first so the ok/err branch can be
//! tested; the unconditional shape binds the value too, so deferred cleanup
//! never runs before the return expression is evaluated.
//!
//! Every materialized statement is preceded by a `#line` directive restoring
//! its original defer position, and the surrounding line is re-asserted
//! afterwards so downstream diagnostics stay anchored.

use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer, is_ident_char, is_ident_start, line_col};
use smallvec::SmallVec;
use std::fmt::Write as _;
use tracing::warn;

/// Scopes deeper than this share the last stack; registration still works,
/// only the depth accounting saturates.
const MAX_DEFER_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cond {
    Always,
    OnOk,
    OnErr,
}

#[derive(Debug, Clone)]
struct Entry {
    line: u32,
    text: String,
    cond: Cond,
}

pub fn rewrite_defer(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let probe = CodeMap::new(src);
    if probe.find_token(src, 0, "@defer").is_none() {
        return Ok(Rewrite::Unchanged);
    }
    if let Some(at) = probe.find_token(src, 0, "cancel") {
        return Err(LowerError::unsupported(
            ctx.pos(src, at),
            "the identifier `cancel` is reserved",
            "use is_cancelled() to observe cancellation",
        ));
    }

    // Single-line `if (...) return ...;` bodies get braces first so the
    // return expansion below stays well-formed.
    let src = wrap_single_line_returns(ctx, src, &probe)?;
    let map = CodeMap::new(&src);
    let bytes = src.as_bytes();

    let mut out = String::with_capacity(src.len() + 256);
    let mut copied = 0usize;
    let mut depth = 0usize;
    let mut stacks: Vec<SmallVec<[Entry; 4]>> = Vec::new();
    let mut depth_warned = false;

    let mut i = 0usize;
    while i < bytes.len() {
        if !map.is_code(i) {
            i += 1;
            continue;
        }
        match bytes[i] {
            b'{' => {
                depth += 1;
                if depth >= MAX_DEFER_DEPTH && !depth_warned {
                    warn!(target: "pipeline.passes", depth, "defer stack depth cap reached; deeper scopes share one stack");
                    depth_warned = true;
                }
                i += 1;
            }
            b'}' => {
                let d = depth.min(MAX_DEFER_DEPTH - 1);
                if let Some(stack) = stacks.get_mut(d) {
                    let always: Vec<Entry> = stack
                        .iter()
                        .rev()
                        .filter(|e| e.cond == Cond::Always)
                        .cloned()
                        .collect();
                    if !always.is_empty() {
                        out.push_str(&src[copied..i]);
                        copied = i;
                        let cur = line_col(&src, i).0;
                        emit_entries(&mut out, &always, &ctx.file);
                        restore_line(&mut out, cur, &ctx.file);
                    }
                    stack.clear();
                }
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b'@' if matches_token(&src, i, "@defer") => {
                let reg_line = line_col(&src, i).0;
                let mut j = i + "@defer".len();
                let mut cond = Cond::Always;
                let after = map.skip_ws(&src, j);
                if bytes.get(after) == Some(&b'(') {
                    let rp = map.match_paren(&src, after).ok_or_else(|| {
                        LowerError::syntax(ctx.pos(&src, i), "malformed @defer condition")
                    })?;
                    cond = match src[after + 1..rp].trim() {
                        "ok" => Cond::OnOk,
                        "err" => Cond::OnErr,
                        other => {
                            return Err(LowerError::syntax(
                                ctx.pos(&src, after),
                                format!("unknown @defer condition `{other}`"),
                            ));
                        }
                    };
                    j = rp + 1;
                }
                let stmt_start = map.skip_ws(&src, j);
                let semi = find_semicolon(&src, &map, stmt_start).ok_or_else(|| {
                    LowerError::syntax(ctx.pos(&src, i), "malformed @defer: missing `;`")
                })?;
                let text = src[stmt_start..semi].trim().to_string();
                if text.is_empty() {
                    return Err(LowerError::syntax(
                        ctx.pos(&src, i),
                        "malformed @defer: empty statement",
                    ));
                }
                let d = depth.min(MAX_DEFER_DEPTH - 1);
                if stacks.len() <= d {
                    stacks.resize_with(d + 1, SmallVec::new);
                }
                stacks[d].push(Entry {
                    line: reg_line,
                    text,
                    cond,
                });
                // The @defer statement itself vanishes from the output.
                out.push_str(&src[copied..i]);
                copied = semi + 1;
                i = semi + 1;
            }
            c if is_ident_start(c as char) => {
                let end = word_end(&src, i);
                if &src[i..end] == "return" && stacks.iter().any(|s| !s.is_empty()) {
                    let semi = find_semicolon(&src, &map, end).ok_or_else(|| {
                        LowerError::syntax(ctx.pos(&src, i), "unterminated return statement")
                    })?;
                    let expr = src[end..semi].trim().to_string();
                    let cur = line_col(&src, i).0;
                    out.push_str(&src[copied..i]);
                    copied = semi + 1;
                    emit_return(ctx, &mut out, &stacks, &expr, cur, i, &src)?;
                    i = semi + 1;
                } else {
                    i = end;
                }
            }
            _ => i += 1,
        }
    }
    out.push_str(&src[copied..]);
    Ok(Rewrite::Changed(out))
}

fn matches_token(src: &str, i: usize, tok: &str) -> bool {
    src[i..].starts_with(tok)
        && src[i + tok.len()..]
            .chars()
            .next()
            .map(|c| !is_ident_char(c))
            .unwrap_or(true)
}

fn word_end(src: &str, i: usize) -> usize {
    let bytes = src.as_bytes();
    let mut end = i;
    while end < bytes.len() && is_ident_char(bytes[end] as char) {
        end += 1;
    }
    end
}

/// Forward scan for the statement-terminating `;`, honouring nesting. `None`
/// when a top-level closer or the end of the buffer arrives first.
fn find_semicolon(src: &str, map: &CodeMap, from: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0i32;
    let mut i = from;
    while i < bytes.len() {
        if map.is_code(i) {
            match bytes[i] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    if depth == 0 {
                        return None;
                    }
                    depth -= 1;
                }
                b';' if depth == 0 => return Some(i),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn emit_entries(out: &mut String, entries: &[Entry], file: &str) {
    for e in entries {
        let _ = write!(out, "\n#line {} \"{}\"\n{};", e.line, file, e.text);
    }
}

fn restore_line(out: &mut String, line: u32, file: &str) {
    let _ = write!(out, "\n#line {line} \"{file}\"\n");
}

/// Entries active at a return, innermost scope first, reverse registration
/// within each scope, filtered to one condition.
fn active<'a>(stacks: &'a [SmallVec<[Entry; 4]>], cond: Cond) -> Vec<&'a Entry> {
    let mut out = Vec::new();
    for stack in stacks.iter().rev() {
        for e in stack.iter().rev() {
            if e.cond == cond {
                out.push(e);
            }
        }
    }
    out
}

fn emit_return(
    ctx: &LowerCtx,
    out: &mut String,
    stacks: &[SmallVec<[Entry; 4]>],
    expr: &str,
    cur_line: u32,
    at: usize,
    src: &str,
) -> Result<(), LowerError> {
    let always = active(stacks, Cond::Always);
    let on_ok = active(stacks, Cond::OnOk);
    let on_err = active(stacks, Cond::OnErr);
    let conditional = !on_ok.is_empty() || !on_err.is_empty();

    if conditional && expr.is_empty() {
        return Err(LowerError::syntax(
            ctx.pos(src, at),
            "conditional @defer requires a value-returning return",
        ));
    }

    out.push_str("{ ");
    if !expr.is_empty() {
        let _ = write!(out, "typeof({expr}) __cc_ret = ({expr});");
        if conditional {
            out.push_str(" int __cc_ret_err = !__cc_ret.ok;");
        }
    }
    for e in &always {
        let _ = write!(out, "\n#line {} \"{}\"\n{};", e.line, ctx.file, e.text);
    }
    if !on_err.is_empty() {
        out.push_str("\nif (__cc_ret_err) {");
        for e in &on_err {
            let _ = write!(out, "\n#line {} \"{}\"\n{};", e.line, ctx.file, e.text);
        }
        out.push_str("\n}");
    }
    if !on_ok.is_empty() {
        out.push_str("\nif (!__cc_ret_err) {");
        for e in &on_ok {
            let _ = write!(out, "\n#line {} \"{}\"\n{};", e.line, ctx.file, e.text);
        }
        out.push_str("\n}");
    }
    restore_line(out, cur_line, &ctx.file);
    if expr.is_empty() {
        out.push_str("return; }");
    } else {
        out.push_str("return __cc_ret; }");
    }
    Ok(())
}

/// Brace `if (...) return ...;` and `else return ...;` so later expansion of
/// the return has a block to grow into.
fn wrap_single_line_returns(
    ctx: &LowerCtx,
    src: &str,
    map: &CodeMap,
) -> Result<String, LowerError> {
    let mut edits = EditBuffer::new();
    let bytes = src.as_bytes();
    for kw in ["if", "else"] {
        let mut at = 0;
        while let Some(pos) = map.find_token(src, at, kw) {
            at = pos + kw.len();
            let mut after = map.skip_ws(src, pos + kw.len());
            if kw == "if" {
                if bytes.get(after) != Some(&b'(') {
                    continue;
                }
                let Some(rp) = map.match_paren(src, after) else { continue };
                after = map.skip_ws(src, rp + 1);
            }
            if !matches_token(src, after, "return") {
                continue;
            }
            let Some(semi) = find_semicolon(src, map, after + "return".len()) else {
                return Err(LowerError::syntax(
                    ctx.pos(src, after),
                    "unterminated return statement",
                ));
            };
            edits.add(after, after, "{ ", 0, 0);
            edits.add(semi + 1, semi + 1, " }", 0, 0);
        }
    }
    if edits.is_empty() {
        return Ok(src.to_string());
    }
    edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("return wrap merge: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Rewrite, LowerError> {
        let mut ctx = LowerCtx::new("t.cc");
        rewrite_defer(&mut ctx, src)
    }

    fn lowered(src: &str) -> String {
        run(src).unwrap().into_text(src)
    }

    #[test]
    fn source_without_defer_is_unchanged() {
        assert_eq!(run("int f(void) { return 1; }").unwrap(), Rewrite::Unchanged);
        assert_eq!(run("").unwrap(), Rewrite::Unchanged);
    }

    #[test]
    fn scope_exit_emits_deferred_statement() {
        let out = lowered("void f(void) { @defer x(); }");
        assert!(!out.contains("@defer"));
        let x_at = out.find("x();").expect("deferred statement emitted");
        let close = out.rfind('}').unwrap();
        assert!(x_at < close);
        assert!(out.contains("#line 1 \"t.cc\""));
    }

    #[test]
    fn reverse_registration_order_at_scope_exit() {
        let out = lowered("void f(void) { @defer a(); @defer b(); }");
        let a_at = out.find("a();").unwrap();
        let b_at = out.find("b();").unwrap();
        assert!(b_at < a_at, "later registration runs first");
    }

    #[test]
    fn plain_return_binds_value_before_defers() {
        let out = lowered("int f(void) { @defer free(p); return use(p); }");
        let bind = out.find("typeof(use(p)) __cc_ret = (use(p));").unwrap();
        let free_at = out.find("free(p);").unwrap();
        let ret_at = out.find("return __cc_ret;").unwrap();
        assert!(bind < free_at && free_at < ret_at);
    }

    #[test]
    fn conditional_defers_branch_on_result_flag() {
        let out = lowered(
            "CCResult_int_CCError f(void) { @defer free(p); @defer(err) rollback(); return cc_ok(x); }",
        );
        assert!(out.contains("int __cc_ret_err = !__cc_ret.ok;"));
        let free_at = out.find("free(p);").unwrap();
        let err_guard = out.find("if (__cc_ret_err) {").unwrap();
        let rollback = out.find("rollback();").unwrap();
        assert!(free_at < err_guard && err_guard < rollback);
        assert!(out.contains("return __cc_ret;"));
        assert!(!out.contains("if (!__cc_ret_err)"), "no ok-entries registered");
    }

    #[test]
    fn ok_defers_guard_on_success() {
        let out = lowered("CCResult_int_CCIoError f(void) { @defer(ok) commit(); return r; }");
        assert!(out.contains("if (!__cc_ret_err) {"));
        assert!(out.contains("commit();"));
    }

    #[test]
    fn single_line_if_return_is_braced_first() {
        let out = lowered("int f(void) { @defer a(); if (x) return 1; return 2; }");
        // Both returns expand inside their own braces.
        assert_eq!(out.matches("typeof(").count(), 2);
        assert_eq!(out.matches("a();").count(), 3, "two returns plus scope exit");
    }

    #[test]
    fn defers_survive_for_later_returns_in_same_scope() {
        let out = lowered("int f(void) { @defer a(); if (x) { return 1; } return 2; }");
        assert_eq!(out.matches("a();").count(), 3);
    }

    #[test]
    fn inner_scope_defers_do_not_leak_out() {
        let out = lowered("void f(void) { { @defer inner(); } outer(); }");
        let inner_at = out.find("inner();").unwrap();
        let outer_at = out.find("outer();").unwrap();
        assert!(inner_at < outer_at, "inner defer runs at inner scope exit");
        assert_eq!(out.matches("inner();").count(), 1);
    }

    #[test]
    fn cancel_identifier_is_rejected() {
        let err = run("void f(void) { @defer a(); cancel; }").unwrap_err();
        assert_eq!(err.category(), "unsupported");
    }

    #[test]
    fn malformed_defer_is_a_syntax_error() {
        let err = run("void f(void) { @defer a() }").unwrap_err();
        assert_eq!(err.category(), "syntax");
    }

    #[test]
    fn conditional_defer_with_void_return_is_rejected() {
        let err = run("void f(void) { @defer(err) a(); return; }").unwrap_err();
        assert_eq!(err.category(), "syntax");
    }

    #[test]
    fn defer_in_string_is_untouched() {
        assert_eq!(run("char *s = \"@defer x();\";").unwrap(), Rewrite::Unchanged);
    }
}
