//! Inferred result constructors.
//!
//! Inside a function returning `CCResult_T_E`, bare `cc_ok(v)` / `cc_err(e)`
//! resolve to the typed constructors `cc_ok_CCResult_T_E(v)` /
//! `cc_err_CCResult_T_E(e)`. Error arguments spelled as `CC_ERR_*` or
//! `CC_IO_*` constants are wrapped in `cc_error(...)` / `cc_io_error(...)`,
//! with the constant's own spelling as the default message when none is
//! given. The enclosing return type is detected at signature level and
//! tracked by brace depth.

use crate::tags;
use crate::util::{split_top_commas, token_end};
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer, is_ident_start};

#[derive(Debug)]
struct Enclosing {
    ret: String,
    /// Brace depth of the function body; leaving it clears the tracking.
    body_depth: usize,
}

pub fn rewrite_result_ctors(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let map = CodeMap::new(src);
    let bytes = src.as_bytes();
    let mut edits = EditBuffer::new();
    let mut depth = 0usize;
    let mut enclosing: Option<Enclosing> = None;

    let mut i = 0;
    while i < bytes.len() {
        if !map.is_code(i) {
            i += 1;
            continue;
        }
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                if let Some(e) = &enclosing
                    && depth == e.body_depth
                {
                    enclosing = None;
                }
                depth = depth.saturating_sub(1);
                i += 1;
            }
            c if is_ident_start(c as char) && (i == 0 || !cc_text::is_ident_char(bytes[i - 1] as char)) => {
                let end = token_end(src, i);
                let word = &src[i..end];
                if depth == 0 && word.starts_with("CCResult_") {
                    // Signature shape: CCResult_T_E name(...) {
                    if let Some(body) = signature_body(src, &map, end) {
                        enclosing = Some(Enclosing {
                            ret: word.to_string(),
                            body_depth: depth + 1,
                        });
                        depth += 1;
                        i = body + 1;
                        continue;
                    }
                } else if let Some(e) = &enclosing {
                    if word == "cc_ok" || word == "cc_err" {
                        let lp = map.skip_ws(src, end);
                        if bytes.get(lp) == Some(&b'(') {
                            let rp = map.match_paren(src, lp).ok_or_else(|| {
                                LowerError::syntax(ctx.pos(src, i), "unterminated constructor call")
                            })?;
                            edits.add(i, end, format!("{word}_{}", e.ret), 0, tags::RESULT_CTOR);
                            if word == "cc_err" {
                                wrap_error_argument(src, lp, rp, &mut edits);
                            }
                            i = rp + 1;
                            continue;
                        }
                    }
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    if edits.is_empty() {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("result ctor edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}

/// After a `CCResult_*` return type at file scope, a function signature is
/// `name (params) {`. Returns the index of the body `{`.
fn signature_body(src: &str, map: &CodeMap, after_ty: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let name_at = map.skip_ws(src, after_ty);
    if !bytes.get(name_at).map(|b| is_ident_start(*b as char))? {
        return None;
    }
    let lp = map.skip_ws(src, token_end(src, name_at));
    if bytes.get(lp) != Some(&b'(') {
        return None;
    }
    let rp = map.match_paren(src, lp)?;
    let lb = map.skip_ws(src, rp + 1);
    if bytes.get(lb) == Some(&b'{') { Some(lb) } else { None }
}

/// Wrap a bare `CC_ERR_*` / `CC_IO_*` argument in its error constructor,
/// supplying the constant's spelling as the message when absent.
fn wrap_error_argument(src: &str, lp: usize, rp: usize, edits: &mut EditBuffer) {
    let arg = src[lp + 1..rp].trim();
    let wrapper = if arg.starts_with("CC_ERR_") {
        "cc_error"
    } else if arg.starts_with("CC_IO_") {
        "cc_io_error"
    } else {
        return;
    };
    let parts = split_top_commas(arg);
    let repl = if parts.len() == 1 {
        format!("{wrapper}({arg}, \"{arg}\")")
    } else {
        format!("{wrapper}({arg})")
    };
    edits.add(lp + 1, rp, repl, 0, tags::RESULT_CTOR);
}
