//! Word-boundary identifier substitution.
//!
//! The async rewriter maps hoisted locals and parameters onto frame slots
//! (`y` becomes `__f->y`). The substitution must respect identifier
//! boundaries and must never touch comments, string literals, or character
//! literals embedded in the fragment being rewritten.

use crate::{CodeMap, is_ident_char, is_ident_start};
use std::collections::HashMap;

/// Replace every word-boundary occurrence of a key in `map` with its value.
/// Member accesses (`x.name`, `x->name`) keep their member spelling: only
/// free-standing identifiers are mapped.
pub fn replace_idents(src: &str, map: &HashMap<String, String>) -> String {
    if map.is_empty() {
        return src.to_string();
    }
    let code = CodeMap::new(src);
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len() + 16);
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if code.is_code(i) && is_ident_start(c) {
            let mut end = i + 1;
            while end < bytes.len() && is_ident_char(bytes[end] as char) {
                end += 1;
            }
            let word = &src[i..end];
            let is_member = {
                let before = src[..i].trim_end();
                before.ends_with('.') || before.ends_with("->")
            };
            match map.get(word) {
                Some(repl) if !is_member => out.push_str(repl),
                _ => out.push_str(word),
            }
            i = end;
        } else {
            // Copy the full UTF-8 scalar so multi-byte payloads in literals
            // survive untouched.
            let ch_len = src[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
            out.push_str(&src[i..i + ch_len]);
            i += ch_len;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn maps_free_identifiers_only() {
        let m = map(&[("y", "__f->y")]);
        assert_eq!(replace_idents("y = y + yy;", &m), "__f->y = __f->y + yy;");
    }

    #[test]
    fn member_access_is_not_mapped() {
        let m = map(&[("len", "__f->len")]);
        assert_eq!(replace_idents("s.len + len", &m), "s.len + __f->len");
        assert_eq!(replace_idents("p->len + len", &m), "p->len + __f->len");
    }

    #[test]
    fn string_payloads_survive() {
        let m = map(&[("n", "__f->n")]);
        assert_eq!(
            replace_idents("printf(\"n=%d\", n);", &m),
            "printf(\"n=%d\", __f->n);"
        );
    }

    #[test]
    fn comment_payloads_survive() {
        let m = map(&[("n", "__f->n")]);
        assert_eq!(replace_idents("n; /* n */", &m), "__f->n; /* n */");
    }

    #[test]
    fn empty_map_is_identity() {
        assert_eq!(replace_idents("a b c", &HashMap::new()), "a b c");
    }
}
