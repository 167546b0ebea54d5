//! Optional type sigils: `T? name` becomes `__CC_OPTIONAL(T) name`, and the
//! mangled `T` is recorded for declaration emission.
//!
//! The sigil is recognized only in declaration shape: the `?` must directly
//! follow the type spelling and be followed by an identifier that ends the
//! declarator (`=`, `;`, `,`, or `)`). A ternary can never match: its second
//! arm is followed by `:`.

use crate::tags;
use crate::util::{scan_type_back, token_end};
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer, is_ident_char, is_ident_start};

pub fn rewrite_optionals(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let map = CodeMap::new(src);
    let bytes = src.as_bytes();
    let mut edits = EditBuffer::new();
    let mut i = 0;
    while let Some(q) = map.find_char(src, i, '?') {
        i = q + 1;
        // Type spelling must touch the `?` (identifier char or `*`).
        let prev_ok = q > 0
            && map.is_code(q - 1)
            && (is_ident_char(bytes[q - 1] as char) || bytes[q - 1] == b'*');
        if !prev_ok {
            continue;
        }
        let name_at = map.skip_ws(src, q + 1);
        if bytes
            .get(name_at)
            .map(|b| !is_ident_start(*b as char))
            .unwrap_or(true)
        {
            continue;
        }
        let name_end = token_end(src, name_at);
        let after = map.skip_ws(src, name_end);
        if !matches!(bytes.get(after), Some(b'=' | b';' | b',' | b')')) {
            continue;
        }
        let Some((ty_start, raw)) = scan_type_back(src, &map, q) else {
            continue;
        };
        ctx.optionals.register(&raw);
        edits.add(
            ty_start,
            q + 1,
            format!("__CC_OPTIONAL({raw})"),
            0,
            tags::OPTIONAL,
        );
    }
    if edits.is_empty() {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("optional edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> (Result<Rewrite, LowerError>, LowerCtx) {
        let mut ctx = LowerCtx::new("t.cc");
        let r = rewrite_optionals(&mut ctx, src);
        (r, ctx)
    }

    #[test]
    fn declaration_with_initializer() {
        let (r, ctx) = run("int? x = find(k);");
        assert_eq!(r.unwrap().into_text(""), "__CC_OPTIONAL(int) x = find(k);");
        assert!(ctx.optionals.contains("int"));
    }

    #[test]
    fn bare_declaration_and_parameter() {
        let (r, _) = run("void f(char*? s) { long? v; }");
        let out = r.unwrap().into_text("");
        assert_eq!(out, "void f(__CC_OPTIONAL(char*) s) { __CC_OPTIONAL(long) v; }");
    }

    #[test]
    fn ternary_is_untouched() {
        let (r, _) = run("x = a ? b : c;");
        assert_eq!(r.unwrap(), Rewrite::Unchanged);
        let (r, _) = run("x = cond? yes : no;");
        assert_eq!(r.unwrap(), Rewrite::Unchanged);
    }

    #[test]
    fn mangled_type_registered_for_pointers() {
        let (_, ctx) = run("char*? s;");
        assert!(ctx.optionals.contains("charptr"));
        assert_eq!(
            ctx.optionals.declarations(),
            "__CC_OPTIONAL_DECL(char*, charptr);\n"
        );
    }

    #[test]
    fn question_in_string_is_untouched() {
        let (r, _) = run("char *s = \"int? x;\";");
        assert_eq!(r.unwrap(), Rewrite::Unchanged);
    }
}
