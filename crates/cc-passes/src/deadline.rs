//! `with_deadline(expr) { body }` lowering.
//!
//! The construct becomes a brace-scoped block that materializes a deadline
//! from the expression, pushes it on the thread-local deadline stack, runs
//! the body, and pops on the way out. Nesting works because the rewrite only
//! touches the header and the closing brace; inner occurrences edit disjoint
//! ranges of the same buffer.

use crate::LowerCtx;
use crate::tags;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer};
use tracing::trace;

pub fn rewrite_deadline(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let map = CodeMap::new(src);
    let mut edits = EditBuffer::new();
    let mut at = 0;
    while let Some(kw) = map.find_token(src, at, "with_deadline") {
        let after_kw = map.skip_ws(src, kw + "with_deadline".len());
        if src.as_bytes().get(after_kw) != Some(&b'(') {
            return Err(LowerError::syntax(
                ctx.pos(src, kw),
                "with_deadline requires a parenthesized deadline expression",
            ));
        }
        let rparen = map.match_paren(src, after_kw).ok_or_else(|| {
            LowerError::syntax(ctx.pos(src, after_kw), "unterminated with_deadline expression")
        })?;
        let expr = src[after_kw + 1..rparen].trim();
        let lbrace = map.skip_ws(src, rparen + 1);
        if src.as_bytes().get(lbrace) != Some(&b'{') {
            return Err(LowerError::syntax(
                ctx.pos(src, lbrace.min(src.len().saturating_sub(1))),
                "with_deadline requires a braced body",
            ));
        }
        let rbrace = map.match_brace(src, lbrace).ok_or_else(|| {
            LowerError::syntax(ctx.pos(src, lbrace), "unterminated with_deadline body")
        })?;

        let id = ctx.next_id();
        let header = format!(
            "{{ CCDeadline __cc_dl{id} = cc_deadline_make(({expr})); \
             cc_deadline_push(&__cc_dl{id}); {{"
        );
        edits.add(kw, lbrace + 1, header, 0, tags::DEADLINE);
        edits.add(
            rbrace,
            rbrace + 1,
            format!("}} cc_deadline_pop(&__cc_dl{id}); }}"),
            0,
            tags::DEADLINE,
        );
        trace!(target: "pipeline.passes", id, "with_deadline rewritten");
        at = lbrace + 1;
    }
    if edits.is_empty() {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("deadline edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}
