//! `@match { case <header>: <body> ... }` lowering over channel operations.
//!
//! Recognised headers are `<chan>.send(expr)`, `<chan>.recv(ptr)`, and
//! `is_cancelled()`. The construct becomes a local case-descriptor array, a
//! select over the channel cases, and a switch dispatching to the bodies.
//! Channel cases are numbered by their position in the descriptor array;
//! the cancellation case, when present, takes the next index and is checked
//! before the select so a cancelled task never blocks.

use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, is_ident_char, is_ident_start};
use std::fmt::Write as _;
use tracing::trace;

enum Header {
    Send { chan: String, value: String },
    Recv { chan: String, dest: String },
    Cancelled,
}

struct Case {
    header: Header,
    body: String,
}

pub fn rewrite_match(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
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
    while let Some(pos) = map.find_token(src, at, "@match") {
        let lb = map.skip_ws(src, pos + "@match".len());
        if src.as_bytes().get(lb) != Some(&b'{') {
            return Err(LowerError::syntax(
                ctx.pos(src, pos),
                "@match requires a braced case list",
            ));
        }
        let rb = map
            .match_brace(src, lb)
            .ok_or_else(|| LowerError::syntax(ctx.pos(src, pos), "unterminated @match"))?;
        let id = ctx.next_id();
        let cases = parse_cases(ctx, src, &map, lb + 1, rb)?;
        if cases.is_empty() {
            return Err(LowerError::syntax(ctx.pos(src, pos), "empty @match"));
        }
        // Bodies may nest further @match blocks.
        let cases = cases
            .into_iter()
            .map(|c| {
                Ok(Case {
                    body: process(ctx, &c.body)?,
                    header: c.header,
                })
            })
            .collect::<Result<Vec<_>, LowerError>>()?;
        let repl = generate(id, &cases);
        trace!(target: "pipeline.passes", id, cases = cases.len(), "@match rewritten");
        out.push_str(&src[copied..pos]);
        out.push_str(&repl);
        copied = rb + 1;
        at = rb + 1;
    }
    out.push_str(&src[copied..]);
    Ok(out)
}

/// Split `[start, end)` into `case <header>: <body>` chunks at region depth
/// zero.
fn parse_cases(
    ctx: &LowerCtx,
    src: &str,
    map: &CodeMap,
    start: usize,
    end: usize,
) -> Result<Vec<Case>, LowerError> {
    let mut case_starts = Vec::new();
    let bytes = src.as_bytes();
    let mut depth = 0i32;
    let mut i = start;
    while i < end {
        if map.is_code(i) {
            match bytes[i] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b'c' if depth == 0
                    && src[i..].starts_with("case")
                    && !is_ident_char(bytes.get(i + 4).map(|b| *b as char).unwrap_or(' '))
                    && (i == 0 || !is_ident_char(bytes[i - 1] as char)) =>
                {
                    case_starts.push(i);
                    i += 4;
                    continue;
                }
                _ => {}
            }
        }
        i += 1;
    }
    let mut cases = Vec::new();
    for (n, &cs) in case_starts.iter().enumerate() {
        let body_end = case_starts.get(n + 1).copied().unwrap_or(end);
        let colon = find_colon(src, map, cs + 4, body_end).ok_or_else(|| {
            LowerError::syntax(ctx.pos(src, cs), "@match case header missing `:`")
        })?;
        let header = parse_header(ctx, src, map, cs + 4, colon)?;
        let body = src[colon + 1..body_end].trim().to_string();
        cases.push(Case { header, body });
    }
    Ok(cases)
}

fn find_colon(src: &str, map: &CodeMap, from: usize, end: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0i32;
    for i in from..end {
        if !map.is_code(i) {
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_header(
    ctx: &LowerCtx,
    src: &str,
    map: &CodeMap,
    start: usize,
    end: usize,
) -> Result<Header, LowerError> {
    let text = src[start..end].trim();
    let at = map.skip_ws(src, start);
    if let Some(rest) = text.strip_prefix("is_cancelled") {
        let rest = rest.trim();
        if rest == "()" {
            return Ok(Header::Cancelled);
        }
        return Err(LowerError::syntax(
            ctx.pos(src, at),
            "is_cancelled takes no arguments in a @match header",
        ));
    }
    // <chan>.send(expr) / <chan>.recv(ptr)
    let bytes = text.as_bytes();
    if bytes.first().map(|b| is_ident_start(*b as char)).unwrap_or(false) {
        let mut i = 0;
        while i < bytes.len() && is_ident_char(bytes[i] as char) {
            i += 1;
        }
        let chan = &text[..i];
        if let Some(rest) = text[i..].strip_prefix('.') {
            let (op, tail) = if let Some(t) = rest.strip_prefix("send") {
                ("send", t)
            } else if let Some(t) = rest.strip_prefix("recv") {
                ("recv", t)
            } else {
                return Err(LowerError::syntax(
                    ctx.pos(src, at),
                    "@match case header must be send, recv, or is_cancelled",
                ));
            };
            let tail = tail.trim();
            if tail.starts_with('(') && tail.ends_with(')') {
                let arg = tail[1..tail.len() - 1].trim().to_string();
                return Ok(match op {
                    "send" => Header::Send {
                        chan: chan.to_string(),
                        value: arg,
                    },
                    _ => Header::Recv {
                        chan: chan.to_string(),
                        dest: arg,
                    },
                });
            }
        }
    }
    Err(LowerError::syntax(
        ctx.pos(src, at),
        format!("unrecognized @match case header `{text}`"),
    ))
}

fn generate(id: u32, cases: &[Case]) -> String {
    let chan_cases: Vec<(usize, &Case)> = cases
        .iter()
        .filter(|c| !matches!(c.header, Header::Cancelled))
        .enumerate()
        .map(|(k, c)| (k, c))
        .collect();
    let n = chan_cases.len();
    let cancel = cases.iter().find(|c| matches!(c.header, Header::Cancelled));

    // Cancellation-only form short-circuits the whole select.
    if n == 0 {
        let body = &cancel.expect("cases nonempty").body;
        return format!("{{ if (cc_is_cancelled()) {{ {body} }} }}");
    }

    let mut out = String::new();
    out.push_str("{\n");
    for (k, c) in &chan_cases {
        if let Header::Send { value, .. } = &c.header {
            let _ = writeln!(out, "typeof(({value})) __cc_m{id}_v{k} = ({value});");
        }
    }
    let _ = writeln!(out, "CCChanMatchCase __cc_m{id}_cases[] = {{");
    for (k, c) in &chan_cases {
        match &c.header {
            Header::Send { chan, .. } => {
                let _ = writeln!(
                    out,
                    "{{ (void *)&{chan}, CC_CHAN_MATCH_SEND, (void *)&__cc_m{id}_v{k} }},"
                );
            }
            Header::Recv { chan, dest } => {
                let _ = writeln!(
                    out,
                    "{{ (void *)&{chan}, CC_CHAN_MATCH_RECV, (void *)({dest}) }},"
                );
            }
            Header::Cancelled => unreachable!("filtered above"),
        }
    }
    out.push_str("};\n");
    let _ = writeln!(out, "int __cc_m{id}_idx;");
    if cancel.is_some() {
        let _ = writeln!(
            out,
            "if (cc_is_cancelled()) {{ __cc_m{id}_idx = {n}; }} else {{ __cc_m{id}_idx = cc_chan_match_select(__cc_m{id}_cases, {n}); }}"
        );
    } else {
        let _ = writeln!(
            out,
            "__cc_m{id}_idx = cc_chan_match_select(__cc_m{id}_cases, {n});"
        );
    }
    let _ = writeln!(out, "switch (__cc_m{id}_idx) {{");
    let mut arr_k = 0usize;
    for c in cases {
        let label = if matches!(c.header, Header::Cancelled) {
            n
        } else {
            let l = arr_k;
            arr_k += 1;
            l
        };
        let _ = writeln!(out, "case {label}: {{ {} }} break;", c.body);
    }
    out.push_str("}\n}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Rewrite, LowerError> {
        let mut ctx = LowerCtx::new("t.cc");
        rewrite_match(&mut ctx, src)
    }

    #[test]
    fn no_match_token_is_unchanged() {
        assert_eq!(run("int x; switch (y) { case 1: break; }").unwrap(), Rewrite::Unchanged);
    }

    #[test]
    fn send_and_recv_cases_build_descriptor_array() {
        let src = "@match { case tx.send(v + 1): a(); case rx.recv(&slot): b(); }";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains("typeof((v + 1)) __cc_m0_v0 = (v + 1);"));
        assert!(out.contains("{ (void *)&tx, CC_CHAN_MATCH_SEND, (void *)&__cc_m0_v0 },"));
        assert!(out.contains("{ (void *)&rx, CC_CHAN_MATCH_RECV, (void *)(&slot) },"));
        assert!(out.contains("cc_chan_match_select(__cc_m0_cases, 2)"));
        assert!(out.contains("case 0: { a(); } break;"));
        assert!(out.contains("case 1: { b(); } break;"));
        assert!(!out.contains("cc_is_cancelled"));
    }

    #[test]
    fn cancel_case_short_circuits_before_select() {
        let src = "@match { case rx.recv(&m): handle(); case is_cancelled(): bail(); }";
        let out = run(src).unwrap().into_text(src);
        let check = out.find("if (cc_is_cancelled()) { __cc_m0_idx = 1; }").unwrap();
        let select = out.find("cc_chan_match_select").unwrap();
        assert!(check < select, "cancellation is tested before the select");
        assert!(out.contains("case 1: { bail(); } break;"));
    }

    #[test]
    fn cancel_only_match_skips_select_entirely() {
        let src = "@match { case is_cancelled(): bail(); }";
        let out = run(src).unwrap().into_text(src);
        assert_eq!(out, "{ if (cc_is_cancelled()) { bail(); } }");
    }

    #[test]
    fn cancel_case_in_middle_keeps_array_indices_dense() {
        let src = "@match { case tx.send(x): a(); case is_cancelled(): c(); case rx.recv(&y): b(); }";
        let out = run(src).unwrap().into_text(src);
        // Two channel cases -> indices 0 and 1; cancel takes 2.
        assert!(out.contains("cc_chan_match_select(__cc_m0_cases, 2)"));
        assert!(out.contains("__cc_m0_idx = 2;"));
        assert!(out.contains("case 0: { a(); } break;"));
        assert!(out.contains("case 2: { c(); } break;"));
        assert!(out.contains("case 1: { b(); } break;"));
    }

    #[test]
    fn nested_match_gets_fresh_names() {
        let src = "@match { case rx.recv(&m): @match { case tx.send(m): f(); } }";
        let out = run(src).unwrap().into_text(src);
        assert!(out.contains("__cc_m0_cases"));
        assert!(out.contains("__cc_m1_cases"));
    }

    #[test]
    fn unterminated_match_is_syntax_error() {
        let err = run("@match { case tx.send(x): a();").unwrap_err();
        assert_eq!(err.category(), "syntax");
        assert!(err.to_string().contains("unterminated @match"));
    }

    #[test]
    fn unknown_header_is_syntax_error() {
        let err = run("@match { case frobnicate(): a(); }").unwrap_err();
        assert_eq!(err.category(), "syntax");
    }
}
