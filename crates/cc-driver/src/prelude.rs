//! `#line` injection and the runtime prelude.
//!
//! The prelude is prepended only for the re-parse between the text passes
//! and the async rewrite, so the host parser recognizes the runtime types
//! the passes minted. It never reaches the emitted translation unit; the
//! `#line` reset keeps stub spans anchored to the real source.

/// Inject the initial `#line` directive only.
pub fn preprocess_simple(source: &str, filename: &str) -> String {
    format!("#line 1 \"{filename}\"\n{source}")
}

/// Forward declarations for every runtime name the lowered vocabulary uses.
pub const RUNTIME_PRELUDE: &str = r#"typedef enum { CC_FUTURE_PENDING, CC_FUTURE_READY } CCFutureStatus;
typedef struct CCTaskIntptr CCTaskIntptr;
CCTaskIntptr cc_task_intptr_make_poll_ex(CCFutureStatus (*poll)(void *, intptr_t *, int *), void (*drop)(void *), void *frame);
CCFutureStatus cc_task_intptr_poll(CCTaskIntptr *task, intptr_t *value, int *err);
void cc_task_intptr_free(CCTaskIntptr *task);
typedef struct CCChanTx CCChanTx;
typedef struct CCChanRx CCChanRx;
typedef struct CCChanMatchCase { void *chan; int dir; void *data; } CCChanMatchCase;
int cc_chan_match_select(const CCChanMatchCase *cases, int count);
typedef struct CCSlice CCSlice;
typedef struct CCSliceUnique CCSliceUnique;
typedef struct CCDeadline CCDeadline;
CCDeadline cc_deadline_make(long long millis);
void cc_deadline_push(CCDeadline *deadline);
void cc_deadline_pop(CCDeadline *deadline);
CCDeadline *cc_current_deadline(void);
int cc_is_cancelled(void);
typedef struct CCClosure1 CCClosure1;
typedef struct CCClosure2 CCClosure2;
intptr_t cc_closure1_call(CCClosure1 *closure, intptr_t a);
intptr_t cc_closure2_call(CCClosure2 *closure, intptr_t a, intptr_t b);
"#;

/// Prelude + reset + source, handed to the re-parse.
pub fn with_prelude(source: &str, filename: &str) -> String {
    format!("{RUNTIME_PRELUDE}#line 1 \"{filename}\"\n{source}")
}

/// Full CC preprocessing to a string: `#line` injection plus the rewrites
/// that belong to the text stage proper (today that is `with_deadline`).
pub fn preprocess_to_string(source: &str, filename: &str) -> Result<String, cc_diag::LowerError> {
    let mut ctx = cc_passes::LowerCtx::new(filename);
    let text = preprocess_simple(source, filename);
    match cc_passes::deadline::rewrite_deadline(&mut ctx, &text)? {
        cc_diag::Rewrite::Unchanged => Ok(text),
        cc_diag::Rewrite::Changed(out) => Ok(out),
    }
}

/// File-mode preprocessing, kept for the legacy fallback path.
pub fn preprocess_file(
    path: &std::path::Path,
    out_path: &std::path::Path,
) -> Result<(), cc_diag::LowerError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| cc_diag::LowerError::io(format!("reading {}", path.display()), e))?;
    let text = preprocess_to_string(&source, &path.to_string_lossy())?;
    std::fs::write(out_path, text)
        .map_err(|e| cc_diag::LowerError::io(format!("writing {}", out_path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_preprocess_prepends_line_directive() {
        let out = preprocess_simple("int x;\n", "a.cc");
        assert!(out.starts_with("#line 1 \"a.cc\"\nint x;"));
    }

    #[test]
    fn prelude_declares_the_runtime_vocabulary() {
        for name in [
            "CCFutureStatus",
            "CCTaskIntptr",
            "cc_task_intptr_poll",
            "cc_chan_match_select",
            "CCSlice",
            "CCDeadline",
            "cc_is_cancelled",
            "cc_closure2_call",
        ] {
            assert!(RUNTIME_PRELUDE.contains(name), "prelude must declare {name}");
        }
    }

    #[test]
    fn with_prelude_resets_line_numbers() {
        let out = with_prelude("int x;", "a.cc");
        assert!(out.contains("#line 1 \"a.cc\"\nint x;"));
        assert!(out.starts_with("typedef enum"));
    }

    #[test]
    fn preprocess_to_string_applies_the_deadline_rewrite() {
        let out = preprocess_to_string("with_deadline(ms(5)) { f(); }", "a.cc").unwrap();
        assert!(out.starts_with("#line 1 \"a.cc\""));
        assert!(out.contains("cc_deadline_push(&__cc_dl0);"));
        assert!(!out.contains("with_deadline"));
    }
}
