//! Result type sigils and macros.
//!
//! `T!>(E)`, `CCRes(T, E)`, and `CCResPtr(T, E)` all lower to the
//! `CCResult_<mT>_<mE>` identifier, registering the pair for declaration
//! emission. Literal `CCResult_*_*` identifiers already present in the
//! source populate the registry without rewriting, so re-lowering lowered
//! source stays stable.

use crate::registry::{mangle_type, result_type_name, ResultPair};
use crate::tags;
use crate::util::{scan_type_back, split_top_commas, token_end};
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer};

pub fn rewrite_results(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let map = CodeMap::new(src);
    let bytes = src.as_bytes();
    let mut edits = EditBuffer::new();

    // T!>(E)
    let mut i = 0;
    while let Some(bang) = map.find_char(src, i, '!') {
        i = bang + 1;
        if bytes.get(bang + 1) != Some(&b'>') {
            continue;
        }
        let lp = map.skip_ws(src, bang + 2);
        if bytes.get(lp) != Some(&b'(') {
            return Err(LowerError::syntax(
                ctx.pos(src, bang),
                "result sigil `!>` requires a parenthesized error type",
            ));
        }
        let rp = map.match_paren(src, lp).ok_or_else(|| {
            LowerError::syntax(ctx.pos(src, bang), "unterminated result sigil `!>(`")
        })?;
        let Some((ty_start, raw_ok)) = scan_type_back(src, &map, bang) else {
            return Err(LowerError::syntax(
                ctx.pos(src, bang),
                "result sigil without an ok type",
            ));
        };
        let raw_err = src[lp + 1..rp].trim().to_string();
        let name = register(ctx, &raw_ok, &raw_err, false);
        edits.add(ty_start, rp + 1, name, 0, tags::RESULT);
        i = rp + 1;
    }

    // CCRes(T, E) / CCResPtr(T, E)
    for (macro_name, ptr) in [("CCResPtr", true), ("CCRes", false)] {
        let mut at = 0;
        while let Some(pos) = map.find_token(src, at, macro_name) {
            at = pos + macro_name.len();
            let lp = map.skip_ws(src, pos + macro_name.len());
            if bytes.get(lp) != Some(&b'(') {
                continue;
            }
            let rp = map.match_paren(src, lp).ok_or_else(|| {
                LowerError::syntax(ctx.pos(src, pos), format!("unterminated {macro_name}(...)"))
            })?;
            let args = split_top_commas(&src[lp + 1..rp]);
            if args.len() != 2 {
                return Err(LowerError::syntax(
                    ctx.pos(src, pos),
                    format!("{macro_name} takes exactly two type arguments"),
                ));
            }
            let name = register(ctx, args[0], args[1], ptr);
            edits.add(pos, rp + 1, name, 0, tags::RESULT);
            at = rp + 1;
        }
    }

    // Already-lowered identifiers populate the registry only.
    scan_literal_results(ctx, src, &map);

    if edits.is_empty() {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("result edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}

fn register(ctx: &mut LowerCtx, raw_ok: &str, raw_err: &str, ptr_ok: bool) -> String {
    let mut m_ok = mangle_type(raw_ok);
    let raw_ok = if ptr_ok {
        m_ok.push_str("ptr");
        format!("{} *", raw_ok.trim())
    } else {
        raw_ok.trim().to_string()
    };
    let m_err = mangle_type(raw_err);
    let name = result_type_name(&m_ok, &m_err);
    ctx.results.register(ResultPair {
        m_ok,
        m_err,
        raw_ok,
        raw_err: raw_err.trim().to_string(),
    });
    name
}

/// Known error-type spellings used to split a mangled `CCResult_` tail.
const KNOWN_ERRORS: &[&str] = &["CCError", "CCIoError"];

fn scan_literal_results(ctx: &mut LowerCtx, src: &str, map: &CodeMap) {
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if map.is_code(i)
            && cc_text::is_ident_start(bytes[i] as char)
            && (i == 0 || !cc_text::is_ident_char(bytes[i - 1] as char))
        {
            let end = token_end(src, i);
            let word = &src[i..end];
            if let Some(tail) = word.strip_prefix("CCResult_")
                && !tail.is_empty()
            {
                let (m_ok, m_err) = split_mangled_tail(tail);
                if !m_ok.is_empty() && !m_err.is_empty() {
                    ctx.results.register(ResultPair {
                        m_ok: m_ok.to_string(),
                        m_err: m_err.to_string(),
                        raw_ok: m_ok.to_string(),
                        raw_err: m_err.to_string(),
                    });
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }
}

/// Split `<mangled_ok>_<mangled_err>`: prefer the underscore before a known
/// error spelling, else the first underscore.
fn split_mangled_tail(tail: &str) -> (&str, &str) {
    for err in KNOWN_ERRORS {
        if let Some(stripped) = tail.strip_suffix(err)
            && let Some(ok) = stripped.strip_suffix('_')
        {
            return (ok, err);
        }
    }
    match tail.split_once('_') {
        Some((ok, err)) => (ok, err),
        None => ("", ""),
    }
}
