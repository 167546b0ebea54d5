//! Channel handle types.
//!
//! A declaration like `[int~4>] tx;` carries the element type, capacity,
//! direction, and optional mode / backpressure / topology tokens inside the
//! bracket. The bracket lowers to the runtime handle type (`CCChanTx` or
//! `CCChanRx`); the parsed attributes stay available to `chan_pair`, which
//! scans the same un-edited buffer.

use crate::tags;
use crate::util::token_end;
use crate::LowerCtx;
use cc_diag::{LowerError, Rewrite};
use cc_text::{CodeMap, EditBuffer, is_ident_char, is_ident_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Tx,
    Rx,
}

/// Parsed channel bracket attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanSpec {
    pub elem: String,
    pub cap: String,
    pub dir: ChanDir,
    pub mode: &'static str,
    pub bp: &'static str,
    pub topo: &'static str,
}

impl ChanSpec {
    pub fn handle_type(&self) -> &'static str {
        match self.dir {
            ChanDir::Tx => "CCChanTx",
            ChanDir::Rx => "CCChanRx",
        }
    }
}

/// A channel bracket found in source: its range and, when present, the
/// declared variable name that follows it.
#[derive(Debug, Clone)]
pub struct ChanDecl {
    pub open: usize,
    pub close: usize,
    pub name: Option<String>,
    pub spec: ChanSpec,
}

/// Find every channel bracket in `src`. Index expressions (`buf[~mask]`)
/// are excluded by their syntactic position: an index is preceded by a
/// value, a declaration is not.
pub fn find_chan_decls(
    ctx: &LowerCtx,
    src: &str,
    map: &CodeMap,
) -> Result<Vec<ChanDecl>, LowerError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while let Some(open) = map.find_char(src, i, '[') {
        i = open + 1;
        let prev = map.skip_ws_back(src, open);
        if prev > 0 {
            let p = bytes[prev - 1];
            if is_ident_char(p as char) || p == b']' || p == b')' {
                continue; // subscript on a value
            }
        }
        let Some(close) = map.match_bracket(src, open) else {
            continue;
        };
        let inner = &src[open + 1..close];
        if !inner.contains('~') {
            continue;
        }
        let spec = parse_spec(ctx, src, open, inner)?;
        let name_at = map.skip_ws(src, close + 1);
        let name = if bytes
            .get(name_at)
            .map(|b| is_ident_start(*b as char))
            .unwrap_or(false)
        {
            let end = token_end(src, name_at);
            Some(src[name_at..end].to_string())
        } else {
            None
        };
        out.push(ChanDecl {
            open,
            close,
            name,
            spec,
        });
        i = close + 1;
    }
    Ok(out)
}

fn parse_spec(
    ctx: &LowerCtx,
    src: &str,
    open: usize,
    inner: &str,
) -> Result<ChanSpec, LowerError> {
    let tilde = inner.find('~').expect("caller checked");
    let elem = inner[..tilde].trim();
    if elem.is_empty() {
        return Err(LowerError::syntax(
            ctx.pos(src, open),
            "channel type missing element type before `~`",
        ));
    }
    let rest = &inner[tilde + 1..];
    let dir_at = rest.find(['>', '<']).ok_or_else(|| {
        LowerError::syntax(ctx.pos(src, open), "channel type missing direction (`>` or `<`)")
    })?;
    let cap = rest[..dir_at].trim();
    if cap.is_empty() {
        return Err(LowerError::syntax(
            ctx.pos(src, open),
            "channel type missing capacity",
        ));
    }
    let dir = if rest.as_bytes()[dir_at] == b'>' {
        ChanDir::Tx
    } else {
        ChanDir::Rx
    };
    let mut spec = ChanSpec {
        elem: elem.to_string(),
        cap: cap.to_string(),
        dir,
        mode: "CC_CHAN_MODE_BLOCK",
        bp: "0",
        topo: "CC_CHAN_TOPO_DEFAULT",
    };
    for opt in rest[dir_at + 1..].split(',') {
        let opt = opt.trim();
        if opt.is_empty() {
            continue;
        }
        match opt {
            "sync" => spec.mode = "CC_CHAN_MODE_BLOCK",
            "async" => spec.mode = "CC_CHAN_MODE_ASYNC",
            "drop" => spec.bp = "CC_CHAN_BP_DROP",
            "dropold" => spec.bp = "CC_CHAN_BP_DROP_OLD",
            "dropnew" => spec.bp = "CC_CHAN_BP_DROP_NEW",
            "1:1" => spec.topo = "CC_CHAN_TOPO_1_1",
            "1:N" | "1:n" => spec.topo = "CC_CHAN_TOPO_1_N",
            "N:1" | "n:1" => spec.topo = "CC_CHAN_TOPO_N_1",
            "N:N" | "n:n" => spec.topo = "CC_CHAN_TOPO_N_N",
            other => {
                return Err(LowerError::syntax(
                    ctx.pos(src, open),
                    format!("unknown channel option token `{other}`"),
                ));
            }
        }
    }
    Ok(spec)
}

/// Record handle-type edits into the shared buffer. Returns whether any
/// bracket was found.
pub fn collect_chan_types(
    ctx: &mut LowerCtx,
    src: &str,
    edits: &mut EditBuffer,
) -> Result<bool, LowerError> {
    let map = CodeMap::new(src);
    let decls = find_chan_decls(ctx, src, &map)?;
    for d in &decls {
        edits.add(d.open, d.close + 1, d.spec.handle_type(), 0, tags::CHAN_TYPE);
    }
    Ok(!decls.is_empty())
}

/// Stand-alone form of the pass for callers outside the shared edit merge.
pub fn rewrite_chan_types(ctx: &mut LowerCtx, src: &str) -> Result<Rewrite, LowerError> {
    let mut edits = EditBuffer::new();
    if !collect_chan_types(ctx, src, &mut edits)? {
        return Ok(Rewrite::Unchanged);
    }
    let out = edits
        .apply(src)
        .map_err(|e| LowerError::internal(format!("channel type edit merge: {e}")))?;
    Ok(Rewrite::Changed(out))
}
