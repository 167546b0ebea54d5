//! Switch-based coroutine emission.
//!
//! One `case` per allocated state; every transition stores the next state
//! and returns `CC_FUTURE_PENDING`, so a poll call executes exactly one
//! state. State 1 is the entry, 999 the terminal that moves the return
//! slot out and reports `CC_FUTURE_READY`.

use crate::frame::{Frame, MAX_AWAITS};
use crate::ir::Stmt;
use cc_diag::LowerError;
use cc_text::subst::replace_idents;
use cc_text::{CodeMap, is_ident_char};
use std::collections::HashMap;
use std::fmt::Write as _;

pub(crate) const TERMINAL_STATE: u32 = 999;

pub(crate) struct Emitter<'a> {
    cases: String,
    next_state: u32,
    awaits_used: usize,
    map: &'a HashMap<String, String>,
    loops: Vec<(u32, u32)>,
    open: bool,
}

impl<'a> Emitter<'a> {
    pub fn new(map: &'a HashMap<String, String>) -> Self {
        Self {
            cases: String::new(),
            next_state: 2,
            awaits_used: 0,
            map,
            loops: Vec::new(),
            open: false,
        }
    }

    /// Emit the whole body and return the `case` block text.
    pub fn emit_body(mut self, stmts: &[Stmt]) -> Result<String, LowerError> {
        self.open_case(1);
        self.emit_stmts(stmts)?;
        if self.open {
            self.goto_state(TERMINAL_STATE);
        }
        Ok(self.cases)
    }

    fn fresh(&mut self) -> u32 {
        let s = self.next_state;
        self.next_state += 1;
        s
    }

    fn open_case(&mut self, s: u32) {
        debug_assert!(!self.open, "previous case must be closed");
        let _ = writeln!(self.cases, "case {s}: {{");
        self.open = true;
    }

    fn close_case(&mut self) {
        self.cases.push_str("}\n");
        self.open = false;
    }

    fn goto_state(&mut self, s: u32) {
        let _ = writeln!(self.cases, "__f->__st = {s};\nreturn CC_FUTURE_PENDING;");
        self.close_case();
    }

    fn branch(&mut self, cond: &str, on_true: u32, on_false: u32) {
        let _ = writeln!(
            self.cases,
            "if ({cond}) {{ __f->__st = {on_true}; }} else {{ __f->__st = {on_false}; }}\nreturn CC_FUTURE_PENDING;"
        );
        self.close_case();
    }

    fn mapped(&self, text: &str) -> String {
        replace_idents(text, self.map)
    }

    fn emit_stmts(&mut self, stmts: &[Stmt]) -> Result<(), LowerError> {
        for s in stmts {
            if !self.open {
                // Unreachable code after a return/break still needs a home.
                let s_id = self.fresh();
                self.open_case(s_id);
            }
            self.emit_stmt(s)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        match stmt {
            Stmt::Semi(text) => self.emit_semi(text),
            Stmt::Block(inner) => self.emit_stmts(inner),
            Stmt::Return(expr) => {
                let ex = self.expand_awaits(expr, false)?;
                if !ex.trim().is_empty() {
                    let _ = writeln!(self.cases, "__f->__r = (intptr_t)({});", self.mapped(&ex));
                }
                self.goto_state(TERMINAL_STATE);
                Ok(())
            }
            Stmt::Break => {
                let (_, brk) = *self.loops.last().ok_or_else(|| {
                    LowerError::internal("break outside of a loop in async body")
                })?;
                self.goto_state(brk);
                Ok(())
            }
            Stmt::Continue => {
                let (cont, _) = *self.loops.last().ok_or_else(|| {
                    LowerError::internal("continue outside of a loop in async body")
                })?;
                self.goto_state(cont);
                Ok(())
            }
            Stmt::If { cond, then_s, else_s } => {
                let c = self.expand_awaits(cond, false)?;
                let c = self.mapped(&c);
                let t = self.fresh();
                let e = else_s.as_ref().map(|_| self.fresh());
                let after = self.fresh();
                self.branch(&c, t, e.unwrap_or(after));
                self.open_case(t);
                self.emit_stmts(then_s)?;
                if self.open {
                    self.goto_state(after);
                }
                if let (Some(e_state), Some(else_stmts)) = (e, else_s.as_ref()) {
                    self.open_case(e_state);
                    self.emit_stmts(else_stmts)?;
                    if self.open {
                        self.goto_state(after);
                    }
                }
                self.open_case(after);
                Ok(())
            }
            Stmt::While { cond, body } => {
                let cond_s = self.fresh();
                let body_s = self.fresh();
                let after = self.fresh();
                self.goto_state(cond_s);
                self.open_case(cond_s);
                let c = if cond.trim().is_empty() {
                    "1".to_string()
                } else {
                    let e = self.expand_awaits(cond, false)?;
                    self.mapped(&e)
                };
                self.branch(&c, body_s, after);
                self.open_case(body_s);
                self.loops.push((cond_s, after));
                self.emit_stmts(body)?;
                self.loops.pop();
                if self.open {
                    self.goto_state(cond_s);
                }
                self.open_case(after);
                Ok(())
            }
            Stmt::For { init, cond, post, body } => {
                let init_s = self.fresh();
                let cond_s = self.fresh();
                let body_s = self.fresh();
                let post_s = self.fresh();
                let after = self.fresh();
                self.goto_state(init_s);
                self.open_case(init_s);
                self.emit_semi(init)?;
                self.goto_state(cond_s);
                self.open_case(cond_s);
                let c = if cond.trim().is_empty() {
                    "1".to_string()
                } else {
                    let e = self.expand_awaits(cond, false)?;
                    self.mapped(&e)
                };
                self.branch(&c, body_s, after);
                self.open_case(body_s);
                self.loops.push((post_s, after));
                self.emit_stmts(body)?;
                self.loops.pop();
                if self.open {
                    self.goto_state(post_s);
                }
                self.open_case(post_s);
                self.emit_semi(post)?;
                self.goto_state(cond_s);
                self.open_case(after);
                Ok(())
            }
        }
    }

    fn emit_semi(&mut self, text: &str) -> Result<(), LowerError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if let Some((name, init)) = self.split_hoisted_decl(text) {
            let Some(init) = init else {
                // Pure declaration: the frame already owns the slot.
                return Ok(());
            };
            let ex = self.expand_awaits(&init, false)?;
            let _ = writeln!(self.cases, "__f->{name} = {};", self.mapped(&ex));
            return Ok(());
        }
        // The value of a statement-level await is unused.
        let ex = self.expand_awaits(text, true)?;
        if !ex.trim().is_empty() {
            let _ = writeln!(self.cases, "{};", self.mapped(&ex));
        }
        Ok(())
    }

    /// Recognize `ty name` / `ty name = init` where `name` is frame-hoisted.
    /// The type spelling may only contain identifier words and `*`.
    fn split_hoisted_decl(&self, text: &str) -> Option<(String, Option<String>)> {
        let map = CodeMap::new(text);
        let eq = find_plain_assign(text, &map);
        let (lhs, rhs) = match eq {
            Some(i) => (&text[..i], Some(text[i + 1..].trim().to_string())),
            None => (text, None),
        };
        let lhs = lhs.trim();
        let bytes = lhs.as_bytes();
        let mut start = lhs.len();
        while start > 0 && is_ident_char(bytes[start - 1] as char) {
            start -= 1;
        }
        if start == lhs.len() {
            return None;
        }
        let name = &lhs[start..];
        let ty = lhs[..start].trim();
        if ty.is_empty() || !self.map.contains_key(name) {
            return None;
        }
        if !ty
            .chars()
            .all(|c| is_ident_char(c) || c.is_whitespace() || c == '*')
        {
            return None;
        }
        Some((name.to_string(), rhs))
    }

    /// Replace each `await <operand>` with its frame temporary, emitting the
    /// await protocol along the way. `top_unused` marks a statement-level
    /// await whose value nobody reads.
    fn expand_awaits(&mut self, expr: &str, top_unused: bool) -> Result<String, LowerError> {
        let map = CodeMap::new(expr);
        let Some(pos) = map.find_token(expr, 0, "await") else {
            return Ok(expr.to_string());
        };
        let op_start = map.skip_ws(expr, pos + "await".len());
        let op_end = expr_end(expr, &map, op_start);
        let operand = expr[op_start..op_end].trim();
        if operand.is_empty() {
            return Err(LowerError::internal("await without an operand"));
        }
        // Inner awaits resolve before the outer task is constructed.
        let operand = self.expand_awaits(operand, false)?;
        let whole_stmt =
            expr[..pos].trim().is_empty() && expr[op_end..].trim_matches([' ', '\t']).is_empty();
        let unused = top_unused && whole_stmt;
        let repl = self.emit_await(&operand, unused)?;
        let rest = format!("{}{}{}", &expr[..pos], repl, &expr[op_end..]);
        self.expand_awaits(&rest, top_unused)
    }

    fn emit_await(&mut self, operand: &str, unused: bool) -> Result<String, LowerError> {
        let slot = self.awaits_used;
        if slot >= MAX_AWAITS {
            return Err(LowerError::internal("await slot count exceeds the frame cap"));
        }
        self.awaits_used += 1;
        let poll_s = self.fresh();
        let cont_s = self.fresh();
        let op = self.mapped(operand);
        let _ = writeln!(self.cases, "/* await {} */", operand.trim());
        let _ = writeln!(self.cases, "__f->__t[{slot}] = ({op});");
        self.goto_state(poll_s);
        self.open_case(poll_s);
        let _ = writeln!(self.cases, "intptr_t v; int err;");
        let _ = writeln!(
            self.cases,
            "CCFutureStatus s = cc_task_intptr_poll(&__f->__t[{slot}], &v, &err);"
        );
        self.cases.push_str("if (s == CC_FUTURE_PENDING) return CC_FUTURE_PENDING;\n");
        let _ = writeln!(self.cases, "cc_task_intptr_free(&__f->__t[{slot}]);");
        if unused {
            self.cases.push_str("(void)v;\n");
        } else {
            let _ = writeln!(self.cases, "__f->__cc_aw{slot} = v;");
        }
        self.goto_state(cont_s);
        self.open_case(cont_s);
        Ok(if unused {
            String::new()
        } else {
            format!("__f->__cc_aw{slot}")
        })
    }
}

/// First top-level plain `=` (never `==`, `!=`, `<=`, `+=`, ...).
fn find_plain_assign(text: &str, map: &CodeMap) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for i in 0..bytes.len() {
        if !map.is_code(i) {
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'=' if depth == 0 => {
                let prev = if i > 0 { bytes[i - 1] } else { 0 };
                let next = bytes.get(i + 1).copied().unwrap_or(0);
                let compound = matches!(
                    prev,
                    b'=' | b'!' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|' | b'^'
                );
                if !compound && next != b'=' {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// End of an await operand: nearest top-level `,`, `;`, or unbalanced
/// closer.
fn expr_end(src: &str, map: &CodeMap, from: usize) -> usize {
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

/// The full generated replacement for one async function.
pub(crate) fn render_function(
    fn_name: &str,
    frame: &Frame,
    cases: String,
    params_text: &str,
    fn_line: u32,
    file: &str,
) -> String {
    let frame_ty = format!("__cc_async_{fn_name}_frame");
    let mut out = String::new();
    let _ = writeln!(out, "#line {fn_line} \"{file}\"");

    // Frame struct: state, return slot, locals, await temporaries,
    // parameters, task slots.
    let _ = writeln!(out, "typedef struct {{");
    out.push_str("int __st;\nintptr_t __r;\n");
    for l in &frame.locals {
        let _ = writeln!(out, "{};", declare(&l.ty, &l.name));
    }
    for i in 0..frame.await_count {
        let _ = writeln!(out, "intptr_t __cc_aw{i};");
    }
    for p in &frame.params {
        let _ = writeln!(out, "{};", declare(&p.ty, &format!("__p_{}", p.name)));
    }
    if frame.await_count > 0 {
        let _ = writeln!(out, "CCTaskIntptr __t[{}];", frame.await_count);
    }
    let _ = writeln!(out, "}} {frame_ty};");

    // Poll function.
    let _ = writeln!(
        out,
        "static CCFutureStatus __cc_async_{fn_name}_poll(void *__fp, intptr_t *__out, int *__err) {{"
    );
    let _ = writeln!(out, "{frame_ty} *__f = ({frame_ty} *)__fp;");
    out.push_str("(void)__err;\nswitch (__f->__st) {\n");
    out.push_str(&cases);
    let _ = writeln!(
        out,
        "case {TERMINAL_STATE}: {{\n*__out = __f->__r;\nreturn CC_FUTURE_READY;\n}}"
    );
    out.push_str("}\nreturn CC_FUTURE_READY;\n}\n");

    // Drop function: release pending task slots, then the frame.
    let _ = writeln!(out, "static void __cc_async_{fn_name}_drop(void *__fp) {{");
    let _ = writeln!(out, "{frame_ty} *__f = ({frame_ty} *)__fp;");
    if frame.await_count > 0 {
        let _ = writeln!(
            out,
            "for (int __i = 0; __i < {}; __i++) cc_task_intptr_free(&__f->__t[__i]);",
            frame.await_count
        );
    }
    out.push_str("free(__f);\n}\n");

    // Constructor with the original parameter list.
    let params = if params_text.trim().is_empty() {
        "void".to_string()
    } else {
        params_text.trim().to_string()
    };
    let _ = writeln!(out, "#line {fn_line} \"{file}\"");
    let _ = writeln!(out, "CCTaskIntptr {fn_name}({params}) {{");
    let _ = writeln!(
        out,
        "{frame_ty} *__f = ({frame_ty} *)calloc(1, sizeof(*__f));"
    );
    out.push_str("__f->__st = 1;\n");
    for p in &frame.params {
        let _ = writeln!(out, "__f->__p_{} = {};", p.name, p.name);
    }
    let _ = writeln!(
        out,
        "return cc_task_intptr_make_poll_ex(__cc_async_{fn_name}_poll, __cc_async_{fn_name}_drop, __f);"
    );
    out.push_str("}\n");
    out
}

/// `int *` + `p` -> `int *p`; plain types get a space.
fn declare(ty: &str, name: &str) -> String {
    let ty = ty.trim();
    if ty.ends_with('*') {
        format!("{ty}{name}")
    } else {
        format!("{ty} {name}")
    }
}
