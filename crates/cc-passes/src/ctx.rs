//! Per-translation-unit lowering context.
//!
//! The generated-symbol counter and the type registries are deliberately not
//! process-global: two translation units lowered by one process must not
//! share them, so everything travels through this explicit context.

use crate::registry::{OptionalRegistry, ResultRegistry};
use cc_diag::SourcePos;
use cc_text::line_col;

#[derive(Debug)]
pub struct LowerCtx {
    /// Virtual file name for diagnostics and `#line` directives.
    pub file: String,
    counter: u32,
    pub results: ResultRegistry,
    pub optionals: OptionalRegistry,
}

impl LowerCtx {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            counter: 0,
            results: ResultRegistry::default(),
            optionals: OptionalRegistry::default(),
        }
    }

    /// Fresh id for generated symbol names. Monotone within the unit.
    pub fn next_id(&mut self) -> u32 {
        let id = self.counter;
        self.counter += 1;
        id
    }

    /// Diagnostic anchor for byte offset `idx` of `src`.
    pub fn pos(&self, src: &str, idx: usize) -> SourcePos {
        let (line, col) = line_col(src, idx);
        SourcePos::new(&self.file, line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_fresh_and_monotone() {
        let mut ctx = LowerCtx::new("a.cc");
        assert_eq!(ctx.next_id(), 0);
        assert_eq!(ctx.next_id(), 1);
        assert_eq!(ctx.next_id(), 2);
    }

    #[test]
    fn pos_points_into_file() {
        let ctx = LowerCtx::new("a.cc");
        let p = ctx.pos("ab\ncd", 3);
        assert_eq!(p.to_string(), "a.cc:2:1");
    }
}
