//! `channel_pair(&tx, &rx)` lowering.
//!
//! Both endpoint declarations are resolved backwards from the call site so
//! their bracket attributes can be compared; any mismatch (element type,
//! capacity, direction, mode, backpressure, topology) is a hard error. The
//! call lowers to the returning form in expression position and to a
//! `do { ... } while (0)` statement otherwise. This pass reads the same
//! un-edited buffer as the handle-type pass; the shared edit merge applies
//! both at once.

use crate::chan_type::{find_chan_decls, ChanDecl, ChanDir};
use crate::tags;
use crate::util::split_top_commas;
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer};
use tracing::trace;

pub fn collect_chan_pairs(
    ctx: &mut LowerCtx,
    src: &str,
    edits: &mut EditBuffer,
) -> Result<bool, LowerError> {
    let map = CodeMap::new(src);
    let decls = find_chan_decls(ctx, src, &map)?;
    let bytes = src.as_bytes();
    let mut changed = false;
    let mut at = 0;
    while let Some(pos) = map.find_token(src, at, "channel_pair") {
        at = pos + "channel_pair".len();
        let lp = map.skip_ws(src, pos + "channel_pair".len());
        if bytes.get(lp) != Some(&b'(') {
            continue;
        }
        let rp = map
            .match_paren(src, lp)
            .ok_or_else(|| LowerError::syntax(ctx.pos(src, pos), "unterminated channel_pair call"))?;
        let args = split_top_commas(&src[lp + 1..rp]);
        if args.len() != 2 {
            return Err(LowerError::syntax(
                ctx.pos(src, pos),
                "channel_pair takes exactly (&tx, &rx)",
            ));
        }
        let tx = resolve(ctx, src, &decls, args[0], pos)?;
        let rx = resolve(ctx, src, &decls, args[1], pos)?;
        if tx.spec.dir != ChanDir::Tx {
            return Err(LowerError::syntax(
                ctx.pos(src, pos),
                format!("channel_pair direction mismatch: `{}` is not a sender", args[0]),
            ));
        }
        if rx.spec.dir != ChanDir::Rx {
            return Err(LowerError::syntax(
                ctx.pos(src, pos),
                format!("channel_pair direction mismatch: `{}` is not a receiver", args[1]),
            ));
        }
        let attrs = [
            ("element type", tx.spec.elem.clone(), rx.spec.elem.clone()),
            ("capacity", tx.spec.cap.clone(), rx.spec.cap.clone()),
            ("mode", tx.spec.mode.to_string(), rx.spec.mode.to_string()),
            ("backpressure", tx.spec.bp.to_string(), rx.spec.bp.to_string()),
            ("topology", tx.spec.topo.to_string(), rx.spec.topo.to_string()),
        ];
        for (attr, a, b) in attrs {
            if a != b {
                return Err(LowerError::syntax(
                    ctx.pos(src, pos),
                    format!("channel_pair endpoint {attr} mismatch: `{a}` vs `{b}`"),
                ));
            }
        }

        let call = format!(
            "cc_chan_pair_create_full({}, {}, {}, sizeof({}), 0, {}, {}, {})",
            tx.spec.cap, tx.spec.mode, tx.spec.bp, tx.spec.elem, tx.spec.topo, args[0], args[1]
        );
        let prev = map.skip_ws_back(src, pos);
        let is_expr = prev > 0 && bytes[prev - 1] == b'=';
        if is_expr {
            let repl = format!(
                "cc_chan_pair_create_returning({}, {}, {}, sizeof({}), 0, {}, {}, {})",
                tx.spec.cap, tx.spec.mode, tx.spec.bp, tx.spec.elem, tx.spec.topo, args[0], args[1]
            );
            edits.add(pos, rp + 1, repl, 0, tags::CHAN_PAIR);
        } else {
            let semi = map.skip_ws(src, rp + 1);
            let stmt_end = if bytes.get(semi) == Some(&b';') { semi + 1 } else { rp + 1 };
            let repl = format!("do {{ int __cc_cp_err = {call}; if (__cc_cp_err) abort(); }} while (0);");
            edits.add(pos, stmt_end, repl, 0, tags::CHAN_PAIR);
        }
        trace!(target: "pipeline.passes", expr = is_expr, "channel_pair rewritten");
        changed = true;
        at = rp + 1;
    }
    Ok(changed)
}

/// Nearest declaration of the named endpoint before the call site.
fn resolve<'a>(
    ctx: &LowerCtx,
    src: &str,
    decls: &'a [ChanDecl],
    arg: &str,
    call_at: usize,
) -> Result<&'a ChanDecl, LowerError> {
    let name = arg.trim().strip_prefix('&').unwrap_or(arg.trim()).trim();
    decls
        .iter()
        .filter(|d| d.open < call_at && d.name.as_deref() == Some(name))
        .next_back()
        .ok_or_else(|| {
            LowerError::syntax(
                ctx.pos(src, call_at),
                format!("channel_pair argument `{arg}` has no channel declaration in scope"),
            )
        })
}

/// Stand-alone form of the pass for callers outside the shared edit merge.
pub fn rewrite_chan_pairs(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let mut edits = EditBuffer::new();
    if !collect_chan_pairs(ctx, src, &mut edits)? {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("channel_pair edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Rewrite, LowerError> {
        let mut ctx = LowerCtx::new("t.cc");
        rewrite_chan_pairs(&mut ctx, src)
    }

    #[test]
    fn statement_form_expands_to_do_while() {
        let src = "[int~4>] tx; [int~4<] rx; channel_pair(&tx, &rx);";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains(
            "do { int __cc_cp_err = cc_chan_pair_create_full(4, CC_CHAN_MODE_BLOCK, 0, sizeof(int), 0, CC_CHAN_TOPO_DEFAULT, &tx, &rx); if (__cc_cp_err) abort(); } while (0);"
        ));
        // Declarations themselves are left to the handle-type pass.
        assert!(out.starts_with("[int~4>] tx;"));
    }

    #[test]
    fn expression_form_uses_returning_variant() {
        let src = "[int~2>] tx; [int~2<] rx; int err = channel_pair(&tx, &rx);";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains(
            "int err = cc_chan_pair_create_returning(2, CC_CHAN_MODE_BLOCK, 0, sizeof(int), 0, CC_CHAN_TOPO_DEFAULT, &tx, &rx);"
        ));
        assert!(!out.contains("do {"));
    }

    #[test]
    fn direction_mismatch_is_hard_error() {
        let err = run("[int~4>] tx; [int~4>] rx; channel_pair(&tx, &rx);").unwrap_err();
        assert!(err.to_string().contains("not a receiver"));
    }

    #[test]
    fn swapped_arguments_are_hard_error() {
        let err = run("[int~4>] tx; [int~4<] rx; channel_pair(&rx, &tx);").unwrap_err();
        assert!(err.to_string().contains("not a sender"));
    }

    #[test]
    fn element_type_mismatch_is_hard_error() {
        let err = run("[int~4>] tx; [long~4<] rx; channel_pair(&tx, &rx);").unwrap_err();
        assert!(err.to_string().contains("element type mismatch"));
    }

    #[test]
    fn capacity_mismatch_is_hard_error() {
        let err = run("[int~4>] tx; [int~8<] rx; channel_pair(&tx, &rx);").unwrap_err();
        assert!(err.to_string().contains("capacity mismatch"));
    }

    #[test]
    fn mode_mismatch_is_hard_error() {
        let err =
            run("[int~4>, async] tx; [int~4<] rx; channel_pair(&tx, &rx);").unwrap_err();
        assert!(err.to_string().contains("mode mismatch"));
    }

    #[test]
    fn missing_declaration_is_hard_error() {
        let err = run("channel_pair(&tx, &rx);").unwrap_err();
        assert!(err.to_string().contains("no channel declaration"));
    }

    #[test]
    fn no_call_is_unchanged() {
        assert_eq!(run("[int~4>] tx;").unwrap(), Rewrite::Unchanged);
    }
}
