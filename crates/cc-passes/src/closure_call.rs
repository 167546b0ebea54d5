//! Closure-call typing.
//!
//! A call through a variable declared `CCClosure1` / `CCClosure2` cannot be
//! a plain C call; it lowers to the runtime trampoline with `intptr_t`-cast
//! arguments: `f(a)` becomes `cc_closure1_call(f, (intptr_t)(a))` and
//! `f(a, b)` becomes `cc_closure2_call(f, (intptr_t)(a), (intptr_t)(b))`.
//! Arguments are processed inside-out so nested closure calls lower too.

use crate::util::{split_top_commas, token_end};
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, is_ident_char, is_ident_start};
use std::collections::HashMap;
use tracing::trace;

pub fn rewrite_closure_calls(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let map = CodeMap::new(src);
    let arities = collect_closure_names(src, &map);
    if arities.is_empty() {
        return Ok(Rewrite::Unchanged);
    }
    let out = process(ctx, src, &arities)?;
    if out == src {
        Ok(Rewrite::Unchanged)
    } else {
        Ok(Rewrite::Changed(out))
    }
}

fn collect_closure_names(src: &str, map: &CodeMap) -> HashMap<String, usize> {
    let bytes = src.as_bytes();
    let mut out = HashMap::new();
    for (ty, arity) in [("CCClosure1", 1usize), ("CCClosure2", 2usize)] {
        let mut at = 0;
        while let Some(pos) = map.find_token(src, at, ty) {
            at = pos + ty.len();
            let name_at = map.skip_ws(src, pos + ty.len());
            if bytes
                .get(name_at)
                .map(|b| is_ident_start(*b as char))
                .unwrap_or(false)
            {
                let end = token_end(src, name_at);
                out.insert(src[name_at..end].to_string(), arity);
            }
        }
    }
    out
}

fn process(
    ctx: &mut LowerCtx,
    src: &str,
    arities: &HashMap<String, usize>,
) -> Result<String, LowerError> {
    let map = CodeMap::new(src);
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        if map.is_code(i)
            && is_ident_start(bytes[i] as char)
            && (i == 0 || !is_ident_char(bytes[i - 1] as char))
        {
            let end = token_end(src, i);
            let word = &src[i..end];
            // Member calls keep their spelling; only free closures lower.
            let before = src[..i].trim_end();
            let is_member = before.ends_with('.') || before.ends_with("->");
            if let Some(&arity) = arities.get(word).filter(|_| !is_member) {
                let lp = map.skip_ws(src, end);
                if bytes.get(lp) == Some(&b'(') {
                    let rp = map.match_paren(src, lp).ok_or_else(|| {
                        LowerError::syntax(ctx.pos(src, i), "unterminated closure call")
                    })?;
                    let args = split_top_commas(&src[lp + 1..rp]);
                    let args: Vec<&str> = args.into_iter().filter(|a| !a.is_empty()).collect();
                    if args.len() == arity {
                        let mut lowered = Vec::with_capacity(arity);
                        for a in &args {
                            lowered.push(process(ctx, a, arities)?);
                        }
                        out.push_str(&src[copied..i]);
                        out.push_str(&format!("cc_closure{arity}_call({word}"));
                        for a in &lowered {
                            out.push_str(&format!(", (intptr_t)({a})"));
                        }
                        out.push(')');
                        trace!(target: "pipeline.passes", closure = word, arity, "closure call lowered");
                        copied = rp + 1;
                        i = rp + 1;
                        continue;
                    }
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }
    out.push_str(&src[copied..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Rewrite, LowerError> {
        let mut ctx = LowerCtx::new("t.cc");
        rewrite_closure_calls(&mut ctx, src)
    }

    #[test]
    fn unary_closure_call() {
        let src = "CCClosure1 add1 = make_adder(1); int v = add1(x);";
        let out = run(src).unwrap().into_text(src);
        assert!(out.ends_with("int v = cc_closure1_call(add1, (intptr_t)(x));"));
    }

    #[test]
    fn binary_closure_call() {
        let src = "CCClosure2 acc = make_acc(); acc(a, b + 1);";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains("cc_closure2_call(acc, (intptr_t)(a), (intptr_t)(b + 1));"));
    }

    #[test]
    fn nested_closure_calls_lower_inside_out() {
        let src = "CCClosure1 f = mk(); CCClosure1 g = mk(); use(f(g(x)));";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains(
            "use(cc_closure1_call(f, (intptr_t)(cc_closure1_call(g, (intptr_t)(x)))));"
        ));
    }

    #[test]
    fn arity_mismatch_is_left_alone() {
        let src = "CCClosure1 f = mk(); f(a, b);";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains("f(a, b);"), "two args to a one-arg closure stay put");
    }

    #[test]
    fn unrelated_calls_are_untouched() {
        assert_eq!(run("int v = plain(x);").unwrap(), Rewrite::Unchanged);
    }

    #[test]
    fn declaration_itself_is_untouched() {
        let src = "CCClosure1 f = mk();";
        assert_eq!(run(src).unwrap(), Rewrite::Unchanged);
    }
}
