//! `try expr` lowering to `cc_try(expr)`.
//!
//! The operand extends to the nearest top-level `;`, `,`, or unbalanced
//! closer. Operands are processed inside-out so `try f(try g())` nests
//! correctly.

use crate::util::find_expr_end;
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::CodeMap;

pub fn rewrite_try(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let out = process(ctx, src)?;
    if out == src {
        Ok(Rewrite::Unchanged)
    } else {
        Ok(Rewrite::Changed(out))
    }
}

fn process(ctx: &mut LowerCtx, src: &str) -> Result<String, LowerError> {
    let map = CodeMap::new(src);
    let mut out = String::with_capacity(src.len());
    let mut copied = 0;
    let mut at = 0;
    while let Some(pos) = map.find_token(src, at, "try") {
        let operand_start = map.skip_ws(src, pos + 3);
        let end = find_expr_end(src, &map, operand_start);
        let operand = src[operand_start..end].trim();
        if operand.is_empty() {
            return Err(LowerError::syntax(ctx.pos(src, pos), "try without an expression"));
        }
        let inner = process(ctx, operand)?;
        out.push_str(&src[copied..pos]);
        out.push_str("cc_try(");
        out.push_str(&inner);
        out.push(')');
        copied = end;
        at = end;
    }
    out.push_str(&src[copied..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Rewrite, LowerError> {
        let mut ctx = LowerCtx::new("t.cc");
        rewrite_try(&mut ctx, src)
    }

    #[test]
    fn simple_try_statement() {
        let out = run("int v = try read_all(fd);").unwrap().into_text("");
        assert_eq!(out, "int v = cc_try(read_all(fd));");
    }

    #[test]
    fn try_operand_stops_at_comma() {
        let out = run("use(try open(path), mode);").unwrap().into_text("");
        assert_eq!(out, "use(cc_try(open(path)), mode);");
    }

    #[test]
    fn try_operand_stops_at_closer() {
        let out = run("f(try g());").unwrap().into_text("");
        assert_eq!(out, "f(cc_try(g()));");
    }

    #[test]
    fn nested_try_expressions() {
        let out = run("int v = try f(try g(), h);").unwrap().into_text("");
        assert_eq!(out, "int v = cc_try(f(cc_try(g()), h));");
    }

    #[test]
    fn no_token_is_unchanged() {
        assert_eq!(run("int entry = table[i];").unwrap(), Rewrite::Unchanged);
        assert_eq!(run("retry();").unwrap(), Rewrite::Unchanged);
    }

    #[test]
    fn try_in_comment_is_untouched() {
        assert_eq!(run("/* try it */ f();").unwrap(), Rewrite::Unchanged);
    }
}
