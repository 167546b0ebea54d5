//! Statement IR for async lowering.
//!
//! The rewriter only needs control-flow shape; everything else rides along
//! as raw source slices. `Semi` holds one statement trimmed of its trailing
//! `;`. CC block-like statements that survive earlier passes (`@nursery`,
//! `@arena`), `do`/`while` tails, and `switch` blocks are opaque `Semi`
//! payloads bounded by their matching braces.

use cc_diag::{LowerError, SourcePos};
use cc_text::{CodeMap, is_ident_char, is_ident_start};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Semi(String),
    Block(Vec<Stmt>),
    If {
        cond: String,
        then_s: Vec<Stmt>,
        else_s: Option<Vec<Stmt>>,
    },
    While {
        cond: String,
        body: Vec<Stmt>,
    },
    For {
        init: String,
        cond: String,
        post: String,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(String),
}

pub(crate) struct IrParser<'a> {
    src: &'a str,
    map: CodeMap,
    file: &'a str,
}

impl<'a> IrParser<'a> {
    pub fn new(src: &'a str, file: &'a str) -> Self {
        Self {
            src,
            map: CodeMap::new(src),
            file,
        }
    }

    fn pos(&self, idx: usize) -> SourcePos {
        let (line, col) = cc_text::line_col(self.src, idx);
        SourcePos::new(self.file, line, col)
    }

    /// Parse the whole fragment as a statement list.
    pub fn parse(&self) -> Result<Vec<Stmt>, LowerError> {
        let (stmts, end) = self.parse_list(0, self.src.len())?;
        debug_assert!(end <= self.src.len());
        Ok(stmts)
    }

    fn parse_list(&self, mut i: usize, end: usize) -> Result<(Vec<Stmt>, usize), LowerError> {
        let mut out = Vec::new();
        loop {
            i = self.map.skip_ws(self.src, i);
            if i >= end {
                return Ok((out, i));
            }
            if self.src.as_bytes()[i] == b'}' {
                return Ok((out, i));
            }
            let (stmt, next) = self.parse_stmt(i)?;
            out.push(stmt);
            i = next;
        }
    }

    fn parse_stmt(&self, i: usize) -> Result<(Stmt, usize), LowerError> {
        let bytes = self.src.as_bytes();
        match bytes[i] {
            b'{' => {
                let close = self.map.match_brace(self.src, i).ok_or_else(|| {
                    LowerError::syntax(self.pos(i), "unterminated block")
                })?;
                let (stmts, _) = self.parse_list(i + 1, close)?;
                Ok((Stmt::Block(stmts), close + 1))
            }
            b'@' => {
                // CC block-like statement: `@word (...)? { ... }` rides as an
                // opaque payload. Without braces it is a plain statement.
                let word_end = self.word_end(i + 1);
                let mut j = self.map.skip_ws(self.src, word_end);
                if bytes.get(j) == Some(&b'(') {
                    let rp = self.map.match_paren(self.src, j).ok_or_else(|| {
                        LowerError::syntax(self.pos(j), "unterminated parenthesis")
                    })?;
                    j = self.map.skip_ws(self.src, rp + 1);
                }
                if bytes.get(j) == Some(&b'{') {
                    let close = self.map.match_brace(self.src, j).ok_or_else(|| {
                        LowerError::syntax(self.pos(j), "unterminated block")
                    })?;
                    return Ok((Stmt::Semi(self.src[i..close + 1].trim().to_string()), close + 1));
                }
                self.parse_semi(i)
            }
            c if is_ident_start(c as char) => {
                let end = self.word_end(i);
                match &self.src[i..end] {
                    "if" => self.parse_if(i, end),
                    "while" => self.parse_while(i, end),
                    "for" => self.parse_for(i, end),
                    "break" => self.parse_jump(i, end, Stmt::Break),
                    "continue" => self.parse_jump(i, end, Stmt::Continue),
                    "return" => {
                        let semi = self.find_semi(end)?;
                        Ok((
                            Stmt::Return(self.src[end..semi].trim().to_string()),
                            semi + 1,
                        ))
                    }
                    "do" | "switch" => self.parse_opaque_braced(i, end),
                    _ => self.parse_semi(i),
                }
            }
            _ => self.parse_semi(i),
        }
    }

    fn parse_if(&self, kw: usize, after_kw: usize) -> Result<(Stmt, usize), LowerError> {
        let (cond, after_cond) = self.parse_paren_header(kw, after_kw)?;
        let (then_s, mut i) = self.parse_body(after_cond)?;
        let probe = self.map.skip_ws(self.src, i);
        let mut else_s = None;
        if self.token_at(probe, "else") {
            let after_else = self.map.skip_ws(self.src, probe + 4);
            if self.token_at(after_else, "if") {
                // `else if` chains recurse into a single-element else list.
                let (chained, next) = self.parse_stmt(after_else)?;
                else_s = Some(vec![chained]);
                i = next;
            } else {
                let (body, next) = self.parse_body(after_else)?;
                else_s = Some(body);
                i = next;
            }
        }
        Ok((Stmt::If { cond, then_s, else_s }, i))
    }

    fn parse_while(&self, kw: usize, after_kw: usize) -> Result<(Stmt, usize), LowerError> {
        let (cond, after_cond) = self.parse_paren_header(kw, after_kw)?;
        let (body, i) = self.parse_body(after_cond)?;
        Ok((Stmt::While { cond, body }, i))
    }

    fn parse_for(&self, kw: usize, after_kw: usize) -> Result<(Stmt, usize), LowerError> {
        let lp = self.map.skip_ws(self.src, after_kw);
        if self.src.as_bytes().get(lp) != Some(&b'(') {
            return Err(LowerError::syntax(self.pos(kw), "for requires a parenthesized header"));
        }
        let rp = self
            .map
            .match_paren(self.src, lp)
            .ok_or_else(|| LowerError::syntax(self.pos(lp), "unterminated for header"))?;
        let header = &self.src[lp + 1..rp];
        let (init, cond, post) = split_for_header(header).ok_or_else(|| {
            LowerError::syntax(self.pos(lp), "for header requires two top-level `;`")
        })?;
        let (body, i) = self.parse_body(rp + 1)?;
        Ok((
            Stmt::For {
                init: init.trim().to_string(),
                cond: cond.trim().to_string(),
                post: post.trim().to_string(),
                body,
            },
            i,
        ))
    }

    fn parse_jump(&self, kw: usize, after_kw: usize, stmt: Stmt) -> Result<(Stmt, usize), LowerError> {
        let semi = self.map.skip_ws(self.src, after_kw);
        if self.src.as_bytes().get(semi) != Some(&b';') {
            return Err(LowerError::syntax(self.pos(kw), "expected `;`"));
        }
        Ok((stmt, semi + 1))
    }

    /// `do { ... } while (...);` and `switch (...) { ... }` pass through as
    /// opaque statements ending at their structural close.
    fn parse_opaque_braced(&self, kw: usize, after_kw: usize) -> Result<(Stmt, usize), LowerError> {
        let bytes = self.src.as_bytes();
        let mut j = self.map.skip_ws(self.src, after_kw);
        if bytes.get(j) == Some(&b'(') {
            let rp = self
                .map
                .match_paren(self.src, j)
                .ok_or_else(|| LowerError::syntax(self.pos(j), "unterminated parenthesis"))?;
            j = self.map.skip_ws(self.src, rp + 1);
        }
        if bytes.get(j) != Some(&b'{') {
            return self.parse_semi(kw);
        }
        let close = self
            .map
            .match_brace(self.src, j)
            .ok_or_else(|| LowerError::syntax(self.pos(j), "unterminated block"))?;
        let mut end = close + 1;
        // do-while tail
        let probe = self.map.skip_ws(self.src, end);
        if self.token_at(probe, "while") {
            let lp = self.map.skip_ws(self.src, probe + 5);
            if bytes.get(lp) == Some(&b'(') {
                let rp = self
                    .map
                    .match_paren(self.src, lp)
                    .ok_or_else(|| LowerError::syntax(self.pos(lp), "unterminated while"))?;
                let semi = self.map.skip_ws(self.src, rp + 1);
                if bytes.get(semi) == Some(&b';') {
                    end = semi + 1;
                }
            }
        }
        Ok((Stmt::Semi(self.src[kw..end].trim().trim_end_matches(';').trim().to_string()), end))
    }

    fn parse_paren_header(&self, kw: usize, after_kw: usize) -> Result<(String, usize), LowerError> {
        let lp = self.map.skip_ws(self.src, after_kw);
        if self.src.as_bytes().get(lp) != Some(&b'(') {
            return Err(LowerError::syntax(self.pos(kw), "expected `(`"));
        }
        let rp = self
            .map
            .match_paren(self.src, lp)
            .ok_or_else(|| LowerError::syntax(self.pos(lp), "unterminated condition"))?;
        Ok((self.src[lp + 1..rp].trim().to_string(), rp + 1))
    }

    /// A body is a block or a single statement; both become a list.
    fn parse_body(&self, i: usize) -> Result<(Vec<Stmt>, usize), LowerError> {
        let i = self.map.skip_ws(self.src, i);
        if self.src.as_bytes().get(i) == Some(&b'{') {
            let close = self
                .map
                .match_brace(self.src, i)
                .ok_or_else(|| LowerError::syntax(self.pos(i), "unterminated block"))?;
            let (stmts, _) = self.parse_list(i + 1, close)?;
            Ok((stmts, close + 1))
        } else {
            let (stmt, next) = self.parse_stmt(i)?;
            Ok((vec![stmt], next))
        }
    }

    fn parse_semi(&self, i: usize) -> Result<(Stmt, usize), LowerError> {
        let semi = self.find_semi(i)?;
        Ok((
            Stmt::Semi(self.src[i..semi].trim().to_string()),
            semi + 1,
        ))
    }

    fn find_semi(&self, from: usize) -> Result<usize, LowerError> {
        let bytes = self.src.as_bytes();
        let mut depth = 0i32;
        let mut i = from;
        while i < bytes.len() {
            if self.map.is_code(i) {
                match bytes[i] {
                    b'(' | b'[' | b'{' => depth += 1,
                    b')' | b']' | b'}' => {
                        if depth == 0 {
                            return Err(LowerError::syntax(self.pos(from), "unterminated statement"));
                        }
                        depth -= 1;
                    }
                    b';' if depth == 0 => return Ok(i),
                    _ => {}
                }
            }
            i += 1;
        }
        Err(LowerError::syntax(self.pos(from), "unterminated statement"))
    }

    fn word_end(&self, i: usize) -> usize {
        let bytes = self.src.as_bytes();
        let mut end = i;
        while end < bytes.len() && is_ident_char(bytes[end] as char) {
            end += 1;
        }
        end
    }

    fn token_at(&self, i: usize, tok: &str) -> bool {
        self.src[i.min(self.src.len())..].starts_with(tok)
            && self.src[(i + tok.len()).min(self.src.len())..]
                .chars()
                .next()
                .map(|c| !is_ident_char(c))
                .unwrap_or(true)
            && self.map.is_code(i)
    }
}

/// Split a `for` header at its two top-level semicolons.
fn split_for_header(header: &str) -> Option<(&str, &str, &str)> {
    let map = CodeMap::new(header);
    let bytes = header.as_bytes();
    let mut depth = 0i32;
    let mut semis = Vec::with_capacity(2);
    for i in 0..bytes.len() {
        if !map.is_code(i) {
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b';' if depth == 0 => semis.push(i),
            _ => {}
        }
    }
    if semis.len() != 2 {
        return None;
    }
    Some((
        &header[..semis[0]],
        &header[semis[0] + 1..semis[1]],
        &header[semis[1] + 1..],
    ))
}

/// Parse one function body fragment (without its outer braces).
pub fn parse_body_fragment(src: &str, file: &str) -> Result<Vec<Stmt>, LowerError> {
    IrParser::new(src, file).parse()
}
