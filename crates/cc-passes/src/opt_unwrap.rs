//! Optional unwrap: `*opt` becomes `cc_unwrap_opt(opt)` for identifiers
//! declared with an optional type.
//!
//! Two passes over the buffer: collect the names declared as
//! `__CC_OPTIONAL(T)` or `CCOptional_T`, then rewrite prefix dereferences
//! of exactly those names. A `*` that could be a multiplication (preceded by
//! a value) is never rewritten.

use crate::tags;
use crate::util::token_end;
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer, is_ident_char, is_ident_start};
use std::collections::HashSet;

pub fn rewrite_opt_unwrap(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let map = CodeMap::new(src);
    let names = collect_optional_names(src, &map);
    if names.is_empty() {
        return Ok(Rewrite::Unchanged);
    }
    let bytes = src.as_bytes();
    let mut edits = EditBuffer::new();
    let mut i = 0;
    while let Some(star) = map.find_char(src, i, '*') {
        i = star + 1;
        // Prefix position only: preceded by nothing value-like.
        let prev = map.skip_ws_back(src, star);
        if prev > 0 {
            let p = bytes[prev - 1];
            if is_ident_char(p as char) || p == b')' || p == b']' || p == b'*' {
                continue;
            }
        }
        let name_at = star + 1;
        if bytes
            .get(name_at)
            .map(|b| !is_ident_start(*b as char))
            .unwrap_or(true)
        {
            continue;
        }
        let end = token_end(src, name_at);
        let name = &src[name_at..end];
        if !names.contains(name) {
            continue;
        }
        edits.add(star, end, format!("cc_unwrap_opt({name})"), 0, tags::OPT_UNWRAP);
        i = end;
    }
    if edits.is_empty() {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("optional unwrap edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}

fn collect_optional_names(src: &str, map: &CodeMap) -> HashSet<String> {
    let bytes = src.as_bytes();
    let mut names = HashSet::new();

    let mut at = 0;
    while let Some(pos) = map.find_token(src, at, "__CC_OPTIONAL") {
        at = pos + "__CC_OPTIONAL".len();
        let lp = map.skip_ws(src, pos + "__CC_OPTIONAL".len());
        if bytes.get(lp) != Some(&b'(') {
            continue;
        }
        let Some(rp) = map.match_paren(src, lp) else { continue };
        push_declared_name(src, map, rp + 1, &mut names);
        at = rp + 1;
    }

    // CCOptional_T name, the typedef'd spelling of the same thing.
    let mut i = 0;
    while i < bytes.len() {
        if map.is_code(i)
            && is_ident_start(bytes[i] as char)
            && (i == 0 || !is_ident_char(bytes[i - 1] as char))
        {
            let end = token_end(src, i);
            if src[i..end].starts_with("CCOptional_") {
                push_declared_name(src, map, end, &mut names);
            }
            i = end;
        } else {
            i += 1;
        }
    }
    names
}

fn push_declared_name(src: &str, map: &CodeMap, after_ty: usize, names: &mut HashSet<String>) {
    let bytes = src.as_bytes();
    let name_at = map.skip_ws(src, after_ty);
    if bytes
        .get(name_at)
        .map(|b| is_ident_start(*b as char))
        .unwrap_or(false)
    {
        let end = token_end(src, name_at);
        names.insert(src[name_at..end].to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Rewrite, LowerError> {
        let mut ctx = LowerCtx::new("t.cc");
        rewrite_opt_unwrap(&mut ctx, src)
    }

    #[test]
    fn declared_optional_is_unwrapped() {
        let src = "__CC_OPTIONAL(int) found = look(k); int v = *found;";
        let out = run(src).unwrap().into_text(src);
        assert!(out.ends_with("int v = cc_unwrap_opt(found);"));
    }

    #[test]
    fn typedef_spelling_is_recognized() {
        let src = "CCOptional_long cache; use(*cache);";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains("use(cc_unwrap_opt(cache));"));
    }

    #[test]
    fn plain_pointers_are_untouched() {
        let src = "__CC_OPTIONAL(int) o; int *p; int v = *p + *o;";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains("*p + cc_unwrap_opt(o)"));
    }

    #[test]
    fn multiplication_is_untouched() {
        let src = "__CC_OPTIONAL(int) n; int v = a * n;";
        assert_eq!(run(src).unwrap(), Rewrite::Unchanged);
    }

    #[test]
    fn no_optionals_means_no_work() {
        assert_eq!(run("int v = *p;").unwrap(), Rewrite::Unchanged);
    }

    #[test]
    fn double_star_is_untouched() {
        let src = "__CC_OPTIONAL(int) o; int **pp = &q; use(**pp);";
        assert_eq!(run(src).unwrap(), Rewrite::Unchanged);
    }
}
