//! Slice type sigils: `T[:]` becomes `CCSlice`, `T[:!]` becomes
//! `CCSliceUnique`. The element type is erased (the runtime slice is
//! untyped); leading `const`/`volatile` qualifiers survive.

use crate::tags;
use crate::util::scan_type_back;
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer};

pub fn rewrite_slices(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let map = CodeMap::new(src);
    let bytes = src.as_bytes();
    let mut edits = EditBuffer::new();
    let mut i = 0;
    while let Some(open) = map.find_char(src, i, '[') {
        i = open + 1;
        let mut j = map.skip_ws(src, open + 1);
        if bytes.get(j) != Some(&b':') {
            continue;
        }
        j = map.skip_ws(src, j + 1);
        let unique = bytes.get(j) == Some(&b'!');
        if unique {
            j = map.skip_ws(src, j + 1);
        }
        if bytes.get(j) != Some(&b']') {
            return Err(LowerError::syntax(
                ctx.pos(src, open),
                "unterminated slice type (expected `]`)",
            ));
        }
        let Some((ty_start, raw)) = scan_type_back(src, &map, open) else {
            return Err(LowerError::syntax(
                ctx.pos(src, open),
                "slice sigil without an element type",
            ));
        };
        let quals: Vec<&str> = raw
            .split_whitespace()
            .filter(|w| *w == "const" || *w == "volatile")
            .collect();
        let mut repl = quals.join(" ");
        if !repl.is_empty() {
            repl.push(' ');
        }
        repl.push_str(if unique { "CCSliceUnique" } else { "CCSlice" });
        edits.add(ty_start, j + 1, repl, 0, tags::SLICE);
        i = j + 1;
    }
    if edits.is_empty() {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("slice edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}
