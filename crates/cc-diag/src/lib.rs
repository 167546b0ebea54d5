//! Diagnostics for the CC lowering pipeline.
//!
//! Every error carries a `file:line:col` anchor and a category tag so the
//! driver can render deterministic, line-oriented output. Passes report
//! errors through [`LowerError`]; success is the tri-state [`Rewrite`] so
//! the scheduler can skip re-allocation when a pass found nothing to do.

use std::fmt;
use thiserror::Error;

/// 1-based source anchor attached to every reportable condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl SourcePos {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Error taxonomy for one translation unit. A `LowerError` aborts the TU;
/// recoverable stub anomalies are handled by dropping nodes, not by errors.
#[derive(Debug, Error)]
pub enum LowerError {
    /// Malformed CC construct: unterminated `@match`, bad `@defer`, channel
    /// direction mismatch, unterminated slice sigil, and friends.
    #[error("{pos}: syntax: {msg}")]
    Syntax { pos: SourcePos, msg: String },

    /// Construct the front end refuses to lower; `hint` names the fix.
    #[error("{pos}: unsupported: {msg} (hint: {hint})")]
    Unsupported {
        pos: SourcePos,
        msg: String,
        hint: String,
    },

    /// Filesystem or resource failure, reported once with OS context.
    #[error("i/o: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Pipeline bug candidate: malformed stub stream, unreachable rewrite
    /// state. Always worth a report upstream.
    #[error("internal: {msg} (this is a bug in the CC front end)")]
    Internal { msg: String },
}

impl LowerError {
    pub fn syntax(pos: SourcePos, msg: impl Into<String>) -> Self {
        Self::Syntax {
            pos,
            msg: msg.into(),
        }
    }

    pub fn unsupported(pos: SourcePos, msg: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Unsupported {
            pos,
            msg: msg.into(),
            hint: hint.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { msg: msg.into() }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax",
            Self::Unsupported { .. } => "unsupported",
            Self::Io { .. } => "io",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Outcome of a rewrite pass over one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// The pass found nothing to do; the caller keeps its buffer.
    Unchanged,
    /// The pass produced a new buffer.
    Changed(String),
}

impl Rewrite {
    /// The resulting source, borrowing the input when unchanged.
    pub fn text<'a>(&'a self, prior: &'a str) -> &'a str {
        match self {
            Rewrite::Unchanged => prior,
            Rewrite::Changed(s) => s,
        }
    }

    /// Collapse into an owned buffer.
    pub fn into_text(self, prior: &str) -> String {
        match self {
            Rewrite::Unchanged => prior.to_string(),
            Rewrite::Changed(s) => s,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, Rewrite::Changed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_renders_anchor_first() {
        let e = LowerError::syntax(SourcePos::new("main.cc", 12, 5), "unterminated @match");
        assert_eq!(e.to_string(), "main.cc:12:5: syntax: unterminated @match");
        assert_eq!(e.category(), "syntax");
    }

    #[test]
    fn unsupported_error_carries_hint() {
        let e = LowerError::unsupported(
            SourcePos::new("a.cc", 3, 1),
            "await outside @async function",
            "mark the enclosing function @async",
        );
        let s = e.to_string();
        assert!(s.starts_with("a.cc:3:1: unsupported:"));
        assert!(s.contains("hint:"));
    }

    #[test]
    fn rewrite_text_borrows_prior_when_unchanged() {
        let prior = "source";
        assert_eq!(Rewrite::Unchanged.text(prior), "source");
        assert_eq!(Rewrite::Changed("new".into()).into_text(prior), "new");
    }
}
