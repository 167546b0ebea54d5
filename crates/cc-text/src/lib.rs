//! Comment- and string-safe scanning primitives for C-family source.
//!
//! Every rewrite in the pipeline walks raw source text, so every scan here
//! must agree on one rule: a match never lands inside a line comment, a block
//! comment, a string literal, or a character literal. Rather than re-deriving
//! literal state in each scanner, [`CodeMap`] precomputes a per-byte "is code"
//! mask once per buffer and the individual helpers consult it.
//!
//! Offsets are byte offsets into the original buffer. Line/column reporting is
//! 1-based to match `#line` semantics and compiler diagnostics.

use smallvec::SmallVec;

pub mod edit;
pub mod subst;

pub use edit::{EditBuffer, EditError};

/// True for the first character of a C identifier.
pub fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

/// True for any subsequent character of a C identifier.
pub fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment,
    Str,
    Char,
}

/// Per-byte classification of a source buffer: `code[i]` is true when byte
/// `i` belongs to executable source text rather than a comment or literal.
/// Quote characters and comment delimiters themselves count as non-code.
pub struct CodeMap {
    code: Vec<bool>,
}

impl CodeMap {
    pub fn new(src: &str) -> Self {
        let bytes = src.as_bytes();
        let mut code = vec![true; bytes.len()];
        let mut state = LexState::Code;
        let mut i = 0;
        while i < bytes.len() {
            match state {
                LexState::Code => match bytes[i] {
                    b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                        state = LexState::LineComment;
                        code[i] = false;
                        code[i + 1] = false;
                        i += 2;
                        continue;
                    }
                    b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                        state = LexState::BlockComment;
                        code[i] = false;
                        code[i + 1] = false;
                        i += 2;
                        continue;
                    }
                    b'"' => {
                        state = LexState::Str;
                        code[i] = false;
                    }
                    b'\'' => {
                        state = LexState::Char;
                        code[i] = false;
                    }
                    _ => {}
                },
                LexState::LineComment => {
                    if bytes[i] == b'\n' {
                        state = LexState::Code;
                        // The newline itself is code: brace scanners rely on it.
                    } else {
                        code[i] = false;
                    }
                }
                LexState::BlockComment => {
                    code[i] = false;
                    if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                        code[i + 1] = false;
                        state = LexState::Code;
                        i += 2;
                        continue;
                    }
                }
                LexState::Str | LexState::Char => {
                    code[i] = false;
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        code[i + 1] = false;
                        i += 2;
                        continue;
                    }
                    let closer = if state == LexState::Str { b'"' } else { b'\'' };
                    if bytes[i] == closer {
                        state = LexState::Code;
                    }
                }
            }
            i += 1;
        }
        Self { code }
    }

    pub fn is_code(&self, idx: usize) -> bool {
        self.code.get(idx).copied().unwrap_or(false)
    }

    /// Find the next occurrence of `ch` at or after `from` that lies in code.
    pub fn find_char(&self, src: &str, from: usize, ch: char) -> Option<usize> {
        let bytes = src.as_bytes();
        let mut i = from;
        while i < bytes.len() {
            if self.is_code(i) && bytes[i] == ch as u8 {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Find the next word-boundary occurrence of identifier-like token `tok`
    /// at or after `from`, skipping comments and literals.
    pub fn find_token(&self, src: &str, from: usize, tok: &str) -> Option<usize> {
        let bytes = src.as_bytes();
        let tb = tok.as_bytes();
        if tb.is_empty() || from >= bytes.len() {
            return None;
        }
        let mut i = from;
        while i + tb.len() <= bytes.len() {
            if self.is_code(i) && &bytes[i..i + tb.len()] == tb {
                let pre_ok = i == 0 || !is_ident_char(bytes[i - 1] as char);
                let post = i + tb.len();
                let post_ok = post >= bytes.len() || !is_ident_char(bytes[post] as char);
                if pre_ok && post_ok {
                    return Some(i);
                }
            }
            i += 1;
        }
        None
    }

    /// Skip forward over whitespace and non-code bytes starting at `idx`.
    pub fn skip_ws(&self, src: &str, mut idx: usize) -> usize {
        let bytes = src.as_bytes();
        while idx < bytes.len() {
            if !self.is_code(idx) || (bytes[idx] as char).is_ascii_whitespace() {
                idx += 1;
            } else {
                break;
            }
        }
        idx
    }

    /// Skip backward over whitespace and non-code bytes; returns the index one
    /// past the previous code byte (0 when none).
    pub fn skip_ws_back(&self, src: &str, mut idx: usize) -> usize {
        let bytes = src.as_bytes();
        while idx > 0 {
            let p = idx - 1;
            if !self.is_code(p) || (bytes[p] as char).is_ascii_whitespace() {
                idx -= 1;
            } else {
                break;
            }
        }
        idx
    }

    fn match_delim(&self, src: &str, open: usize) -> Option<usize> {
        let bytes = src.as_bytes();
        if open >= bytes.len() || !self.is_code(open) {
            return None;
        }
        let mut stack: SmallVec<[u8; 16]> = SmallVec::new();
        let mut i = open;
        while i < bytes.len() {
            if self.is_code(i) {
                match bytes[i] {
                    b'(' | b'[' | b'{' => stack.push(bytes[i]),
                    b')' | b']' | b'}' => {
                        let want = match bytes[i] {
                            b')' => b'(',
                            b']' => b'[',
                            _ => b'{',
                        };
                        match stack.pop() {
                            Some(top) if top == want => {
                                if stack.is_empty() {
                                    return Some(i);
                                }
                            }
                            // Mismatched nesting: give up rather than guess.
                            _ => return None,
                        }
                    }
                    _ => {}
                }
            }
            i += 1;
        }
        None
    }

    /// Index of the `)` matching the `(` at `open`, honouring nesting of all
    /// three delimiter kinds and literal/comment state.
    pub fn match_paren(&self, src: &str, open: usize) -> Option<usize> {
        debug_assert_eq!(src.as_bytes().get(open), Some(&b'('));
        self.match_delim(src, open)
    }

    /// Index of the `]` matching the `[` at `open`.
    pub fn match_bracket(&self, src: &str, open: usize) -> Option<usize> {
        debug_assert_eq!(src.as_bytes().get(open), Some(&b'['));
        self.match_delim(src, open)
    }

    /// Index of the `}` matching the `{` at `open`.
    pub fn match_brace(&self, src: &str, open: usize) -> Option<usize> {
        debug_assert_eq!(src.as_bytes().get(open), Some(&b'{'));
        self.match_delim(src, open)
    }
}

/// Word-boundary substring search for `tok` within `src[start..end)`,
/// honouring comment and literal state of the full buffer.
pub fn range_contains_token(src: &str, start: usize, end: usize, tok: &str) -> bool {
    let end = end.min(src.len());
    if start >= end {
        return false;
    }
    let map = CodeMap::new(src);
    match map.find_token(src, start, tok) {
        Some(pos) => pos + tok.len() <= end,
        None => false,
    }
}

/// 1-based (line, column) of byte offset `idx`. Columns count bytes, which is
/// exact for the ASCII source these passes manipulate.
pub fn line_col(src: &str, idx: usize) -> (u32, u32) {
    let idx = idx.min(src.len());
    let mut line = 1u32;
    let mut col = 1u32;
    for b in src.as_bytes()[..idx].iter() {
        if *b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Read the identifier starting at `idx`, if any.
pub fn ident_at(src: &str, idx: usize) -> Option<&str> {
    let bytes = src.as_bytes();
    if idx >= bytes.len() || !is_ident_start(bytes[idx] as char) {
        return None;
    }
    let mut end = idx + 1;
    while end < bytes.len() && is_ident_char(bytes[end] as char) {
        end += 1;
    }
    Some(&src[idx..end])
}

/// Read the identifier ending just before `idx` (scanning backwards), if any.
pub fn ident_before(src: &str, idx: usize) -> Option<(usize, &str)> {
    let bytes = src.as_bytes();
    let mut start = idx;
    while start > 0 && is_ident_char(bytes[start - 1] as char) {
        start -= 1;
    }
    if start == idx || !is_ident_start(bytes[start] as char) {
        return None;
    }
    Some((start, &src[start..idx]))
}
