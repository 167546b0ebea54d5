//! Scan helpers shared by the text passes.

use cc_text::{CodeMap, ident_before, is_ident_char};

const TYPE_QUALIFIERS: &[&str] = &[
    "const", "volatile", "unsigned", "signed", "struct", "union", "enum", "long", "short",
];

/// Walk backwards from `end` over the C type spelling that precedes it:
/// trailing stars, then the base word, then any qualifier words. Returns the
/// start offset and the spelling with whitespace collapsed.
pub(crate) fn scan_type_back(src: &str, map: &CodeMap, end: usize) -> Option<(usize, String)> {
    let bytes = src.as_bytes();
    let mut pos = map.skip_ws_back(src, end);
    let mut start = pos;
    let mut saw_word = false;
    loop {
        if pos == 0 {
            break;
        }
        let prev = bytes[pos - 1] as char;
        if prev == '*' && map.is_code(pos - 1) {
            pos -= 1;
            start = pos;
            pos = map.skip_ws_back(src, pos);
            continue;
        }
        if is_ident_char(prev) && map.is_code(pos - 1) {
            let (word_start, word) = ident_before(src, pos)?;
            if saw_word && !TYPE_QUALIFIERS.contains(&word) {
                break;
            }
            saw_word = true;
            start = word_start;
            pos = map.skip_ws_back(src, word_start);
            continue;
        }
        break;
    }
    if !saw_word {
        return None;
    }
    let raw: String = collapse_ws(src[start..end].trim());
    Some((start, raw))
}

/// Collapse internal whitespace (and any comment bytes) to single spaces.
pub(crate) fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending = false;
    for c in s.chars() {
        if c.is_whitespace() {
            pending = true;
            continue;
        }
        if pending && !out.is_empty() {
            out.push(' ');
        }
        pending = false;
        out.push(c);
    }
    out
}

/// End (exclusive) of the expression starting at `from`: the nearest
/// top-level `;`, `,`, or unbalanced closer, honouring nesting and literal
/// state. Returns `src.len()` when the buffer ends first.
pub(crate) fn find_expr_end(src: &str, map: &CodeMap, from: usize) -> usize {
    let bytes = src.as_bytes();
    let mut depth = 0i32;
    let mut i = from;
    while i < bytes.len() {
        if map.is_code(i) {
            match bytes[i] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    if depth == 0 {
                        return i;
                    }
                    depth -= 1;
                }
                b';' | b',' if depth == 0 => return i,
                _ => {}
            }
        }
        i += 1;
    }
    bytes.len()
}

/// Split a parenthesis-free-at-top-level argument list at its top-level
/// commas.
pub(crate) fn split_top_commas(s: &str) -> Vec<&str> {
    let map = CodeMap::new(s);
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut parts = Vec::new();
    let mut start = 0;
    for i in 0..bytes.len() {
        if !map.is_code(i) {
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// The identifier token starting at `idx` ends where identifier characters
/// stop.
pub(crate) fn token_end(src: &str, idx: usize) -> usize {
    let bytes = src.as_bytes();
    let mut end = idx;
    while end < bytes.len() && is_ident_char(bytes[end] as char) {
        end += 1;
    }
    end
}
