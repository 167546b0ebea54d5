//! Fixed-order lowering pipeline.
//!
//! Later passes depend on vocabulary the earlier ones introduce, so the
//! order here is part of the contract:
//!
//! 1. `#line` injection, 2. stub parse, 3. AST build, 4. UFCS over the AST,
//! 5. text passes (`with_deadline`; channel types + `channel_pair` into one
//! edit buffer; `@match`; `@defer`; slice/optional/result types; `try`;
//! inferred result constructors; optional unwrap; closure calls),
//! 6. registry declaration emission, 7. re-parse with the runtime prelude,
//! 8. async state-machine rewrite.
//!
//! Without a host parser the AST stages and the async rewrite are skipped;
//! every text pass still runs.

use crate::prelude;
use cc_ast::Node;
use cc_diag::{LowerError, Rewrite};
use cc_passes::{
    chan_match, chan_pair, chan_type, closure_call, deadline, defer, opt_unwrap, optional, result,
    result_ctor, slice, try_expr, ufcs, LowerCtx,
};
use cc_stub::StubParser;
use cc_text::EditBuffer;
use tracing::{debug, info, warn};

pub struct LowerOutput {
    pub text: String,
    /// Present when a host parser produced a stub stream.
    pub ast: Option<Node>,
    /// Stub dump captured for the debug hook, before the text passes ran.
    pub stub_dump: Option<String>,
}

pub fn lower(
    parser: Option<&dyn StubParser>,
    source: &str,
    file: &str,
) -> Result<LowerOutput, LowerError> {
    let mut ctx = LowerCtx::new(file);
    let mut text = prelude::preprocess_simple(source, file);
    info!(target: "pipeline", file, bytes = source.len(), "lowering translation unit");

    // First parse + AST build + AST passes.
    let mut ast = None;
    let mut stub_dump = None;
    if let Some(parser) = parser {
        let stubs = parser.parse(&text, file)?;
        stub_dump = Some(stubs.dump());
        let mut file_node = cc_build::build_file(&stubs, &text, file)?;
        let rewritten = ufcs::rewrite_ufcs(&mut file_node);
        debug!(target: "pipeline", ufcs = rewritten, "ast passes complete");
        ast = Some(file_node);
    } else {
        warn!(target: "pipeline", "no host parser wired in; running text passes only");
    }

    // Text passes, in contract order.
    text = run(&mut ctx, text, "with_deadline", deadline::rewrite_deadline)?;

    // Channel handle types and channel_pair share one edit buffer: the pair
    // resolver must still see the original bracket declarations.
    {
        let mut edits = EditBuffer::new();
        let mut any = chan_type::collect_chan_types(&mut ctx, &text, &mut edits)?;
        any |= chan_pair::collect_chan_pairs(&mut ctx, &text, &mut edits)?;
        if any {
            text = edits
                .apply(&text)
                .map_err(|e| LowerError::internal(format!("channel edit merge: {e}")))?;
            debug!(target: "pipeline.passes", pass = "channel", "changed");
        }
    }

    text = run(&mut ctx, text, "@match", chan_match::rewrite_match)?;
    text = run(&mut ctx, text, "@defer", defer::rewrite_defer)?;
    text = run(&mut ctx, text, "slice types", slice::rewrite_slices)?;
    text = run(&mut ctx, text, "optional types", optional::rewrite_optionals)?;
    text = run(&mut ctx, text, "result types", result::rewrite_results)?;
    text = run(&mut ctx, text, "try", try_expr::rewrite_try)?;
    text = run(&mut ctx, text, "result ctors", result_ctor::rewrite_result_ctors)?;
    text = run(&mut ctx, text, "optional unwrap", opt_unwrap::rewrite_opt_unwrap)?;
    text = run(&mut ctx, text, "closure calls", closure_call::rewrite_closure_calls)?;

    // Registry declarations land after the includes.
    text = emit_registry_declarations(&ctx, &text);

    // Re-parse the rewritten source (with the runtime prelude) and run the
    // async state-machine rewrite against the fresh stub stream.
    if let Some(parser) = parser {
        let reparse_input = prelude::with_prelude(&text, file);
        let stubs = parser.parse(&reparse_input, file)?;
        match cc_async::rewrite_async(&text, &stubs, file)? {
            Rewrite::Changed(out) => {
                debug!(target: "pipeline.async", "async functions rewritten");
                text = out;
            }
            Rewrite::Unchanged => {}
        }
    }

    Ok(LowerOutput {
        text,
        ast,
        stub_dump,
    })
}

fn run(
    ctx: &mut LowerCtx,
    text: String,
    name: &str,
    pass: fn(&mut LowerCtx, &str) -> Result<Rewrite, LowerError>,
) -> Result<String, LowerError> {
    match pass(ctx, &text)? {
        Rewrite::Unchanged => {
            debug!(target: "pipeline.passes", pass = name, "unchanged");
            Ok(text)
        }
        Rewrite::Changed(out) => {
            debug!(target: "pipeline.passes", pass = name, "changed");
            Ok(out)
        }
    }
}

/// Insert the collected result/optional declarations after the last
/// `#include` (or after the initial `#line` when there are none).
fn emit_registry_declarations(ctx: &LowerCtx, text: &str) -> String {
    let mut decls = String::new();
    decls.push_str(&ctx.results.declarations());
    decls.push_str(&ctx.optionals.declarations());
    if decls.is_empty() {
        return text.to_string();
    }
    let mut insert_at = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with("#include") || trimmed.starts_with("#line") {
            insert_at = offset + line.len();
        } else if !trimmed.is_empty() && !trimmed.starts_with("//") {
            // Declarations go before the first real line of code.
            break;
        }
        offset += line.len();
    }
    let mut out = String::with_capacity(text.len() + decls.len());
    out.push_str(&text[..insert_at]);
    out.push_str(&decls);
    out.push_str(&text[insert_at..]);
    out
}
