//! Result- and optional-type registries.
//!
//! The type passes mint `CCResult_<ok>_<err>` and `__CC_OPTIONAL(T)`
//! spellings as they rewrite sigils; the registries remember each distinct
//! pair so the driver can emit one declaration per type after the text
//! passes ran. Keys are mangled spellings, deduplicated per translation
//! unit. Built-in pairs and every pair whose error type is `CCError` ship
//! with the runtime already and must not be re-declared.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Pairs predeclared by the runtime.
const BUILTIN_PAIRS: &[(&str, &str)] = &[("size_t", "CCIoError")];

/// Raw type spellings with a runtime shorthand.
const SHORTCUTS: &[(&str, &str)] = &[("IoError", "CCIoError"), ("Error", "CCError")];

/// Mangle a C type spelling into an identifier fragment: whitespace runs
/// become `_`, `*` becomes `ptr`, known shorthands are applied first.
pub fn mangle_type(raw: &str) -> String {
    let trimmed = raw.trim();
    for (from, to) in SHORTCUTS {
        if trimmed == *from {
            return (*to).to_string();
        }
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut pending_ws = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            pending_ws = true;
            continue;
        }
        if c == '*' {
            // `char *` and `char*` mangle identically.
            out.push_str("ptr");
            pending_ws = false;
            continue;
        }
        if pending_ws && !out.is_empty() {
            out.push('_');
        }
        pending_ws = false;
        out.push(c);
    }
    out
}

/// The `CCResult_<ok>_<err>` identifier for a mangled pair.
pub fn result_type_name(m_ok: &str, m_err: &str) -> String {
    format!("CCResult_{m_ok}_{m_err}")
}

/// One registered result pair: mangled key halves plus the raw spellings
/// needed by the declaration macro.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResultPair {
    pub m_ok: String,
    pub m_err: String,
    pub raw_ok: String,
    pub raw_err: String,
}

#[derive(Debug, Default)]
pub struct ResultRegistry {
    // Keyed (and ordered) by the mangled pair so declaration emission is
    // deterministic.
    pairs: BTreeMap<(String, String), ResultPair>,
}

impl ResultRegistry {
    /// Record a pair unless it is built in or carries the `CCError` error
    /// type. Returns whether the pair was added.
    pub fn register(&mut self, pair: ResultPair) -> bool {
        if pair.m_err == "CCError" {
            return false;
        }
        if BUILTIN_PAIRS
            .iter()
            .any(|(ok, err)| pair.m_ok == *ok && pair.m_err == *err)
        {
            return false;
        }
        let key = (pair.m_ok.clone(), pair.m_err.clone());
        self.pairs.entry(key).or_insert(pair);
        true
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn contains(&self, m_ok: &str, m_err: &str) -> bool {
        self.pairs
            .contains_key(&(m_ok.to_string(), m_err.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResultPair> {
        self.pairs.values()
    }

    /// `__CC_RESULT(raw_ok, raw_err, m_ok, m_err);` lines, one per pair.
    pub fn declarations(&self) -> String {
        let mut out = String::new();
        for p in self.pairs.values() {
            let _ = writeln!(
                out,
                "__CC_RESULT({}, {}, {}, {});",
                p.raw_ok, p.raw_err, p.m_ok, p.m_err
            );
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct OptionalRegistry {
    /// mangled -> raw spelling.
    entries: BTreeMap<String, String>,
}

impl OptionalRegistry {
    pub fn register(&mut self, raw: &str) {
        let mangled = mangle_type(raw);
        self.entries.entry(mangled).or_insert_with(|| raw.trim().to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, mangled: &str) -> bool {
        self.entries.contains_key(mangled)
    }

    /// `__CC_OPTIONAL_DECL(raw, mangled);` lines, one per type.
    pub fn declarations(&self) -> String {
        let mut out = String::new();
        for (mangled, raw) in &self.entries {
            let _ = writeln!(out, "__CC_OPTIONAL_DECL({raw}, {mangled});");
        }
        out
    }
}
