//! Typed AST for CC constructs.
//!
//! Every CC construct that exists prior to C lowering has a variant here.
//! The tree is a strict ownership tree: each child lives in exactly one
//! parent slot, every string is owned, and back-references (when a pass
//! needs them) are indexes held outside the tree, never pointers into it.
//! Deep clone is `#[derive(Clone)]`; postorder release is `Drop`.
//!
//! The `ty` annotation slot on [`Node`] is unset until a caller that knows
//! types (the stub stream's type strings, or a later checker) fills it in.

use bitflags::bitflags;
use std::sync::Arc;

mod dump;

/// 1-based source point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
}

impl Loc {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// Pair of source points plus the owning file name. The file name is shared,
/// not duplicated per node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub file: Arc<str>,
    pub start: Loc,
    pub end: Loc,
}

impl Span {
    pub fn new(file: &Arc<str>, start: Loc, end: Loc) -> Self {
        Self {
            file: Arc::clone(file),
            start,
            end,
        }
    }

    /// Span for generated nodes with no source anchor.
    pub fn synthetic() -> Self {
        Self {
            file: Arc::from(""),
            start: Loc::default(),
            end: Loc::default(),
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::synthetic()
    }
}

bitflags! {
    /// Function declaration attributes surfaced by the parser.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FnAttrs: u32 {
        const ASYNC   = 1 << 0;
        const STATIC  = 1 << 1;
        const NOBLOCK = 1 << 2;
        const UNSAFE  = 1 << 3;
    }
}

/// Binary operators. Closed set: the builder maps operator spellings here
/// and anything unknown stays a raw expression statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogAnd,
    LogOr,
}

impl BinOp {
    pub fn from_spelling(s: &str) -> Option<Self> {
        Some(match s {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "<<" => Self::Shl,
            ">>" => Self::Shr,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "&" => Self::BitAnd,
            "^" => Self::BitXor,
            "|" => Self::BitOr,
            "&&" => Self::LogAnd,
            "||" => Self::LogOr,
            _ => return None,
        })
    }

    pub fn spelling(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::LogAnd => "&&",
            Self::LogOr => "||",
        }
    }
}

/// Unary operators, distinct from [`BinOp`] so tagged fields cannot be
/// confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    LogNot,
    BitNot,
    Deref,
    AddrOf,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnOp {
    pub fn from_spelling(s: &str) -> Option<Self> {
        Some(match s {
            "-" => Self::Neg,
            "!" => Self::LogNot,
            "~" => Self::BitNot,
            "*" => Self::Deref,
            "&" => Self::AddrOf,
            "++" => Self::PreInc,
            "--" => Self::PreDec,
            _ => return None,
        })
    }
}

/// Compound-assignment operator component (`lhs op= rhs`).
pub type CompoundOp = BinOp;

/// When a deferred statement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferCond {
    Always,
    OnOk,
    OnErr,
}

/// AST node: a span, an optional type annotation, and the tagged payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub span: Span,
    /// Type annotation as a C type spelling; `None` before type checking.
    pub ty: Option<String>,
    pub kind: NodeKind,
}

/// One variant per CC construct. Children are owned; no variant shares
/// fields with another.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // ---------------------------------------------------------------------
    // Top level
    // ---------------------------------------------------------------------
    /// Translation unit: imports first, then declarations in source order.
    File { name: String, items: Vec<Node> },
    Include { path: String, system: bool },
    FuncDecl {
        name: String,
        ret: Option<Box<Node>>,
        params: Vec<Node>,
        /// `Some` iff the declaration has a body; `None` for prototypes.
        body: Option<Box<Node>>,
        attrs: FnAttrs,
    },
    VarDecl {
        name: String,
        var_ty: Option<Box<Node>>,
        /// Always an expression node when present.
        init: Option<Box<Node>>,
    },
    Typedef { name: String, aliased: Option<Box<Node>> },
    StructDecl { name: String, fields: Vec<Node>, is_union: bool },
    StructField { name: String, field_ty: Option<Box<Node>> },
    EnumDecl { name: String, values: Vec<Node> },
    EnumValue { name: String, value: Option<Box<Node>> },
    Param { name: String, param_ty: Option<Box<Node>> },

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------
    TypeName { name: String },
    TypePtr { inner: Box<Node> },
    TypeArray { elem: Box<Node>, len: Option<Box<Node>> },
    /// `T[:]` (shared) or `T[:!]` (unique).
    TypeSlice { elem: Box<Node>, unique: bool },
    TypeChanTx { elem: Box<Node> },
    TypeChanRx { elem: Box<Node> },
    TypeOptional { inner: Box<Node> },
    TypeResult { ok: Box<Node>, err: Box<Node> },
    TypeFunc { ret: Box<Node>, params: Vec<Node> },

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------
    /// Statement order equals source order.
    Block { stmts: Vec<Node> },
    ExprStmt { expr: Box<Node> },
    Return { value: Option<Box<Node>> },
    If {
        cond: Option<Box<Node>>,
        then_branch: Option<Box<Node>>,
        else_branch: Option<Box<Node>>,
    },
    While { cond: Option<Box<Node>>, body: Option<Box<Node>> },
    For {
        init: Option<Box<Node>>,
        cond: Option<Box<Node>>,
        post: Option<Box<Node>>,
        body: Option<Box<Node>>,
    },
    ForAwait {
        binding: String,
        source: Option<Box<Node>>,
        body: Option<Box<Node>>,
    },
    Switch { scrutinee: Option<Box<Node>>, body: Option<Box<Node>> },
    Break,
    Continue,
    Goto { label: String },
    Label { name: String },
    Nursery { body: Option<Box<Node>> },
    Arena { body: Option<Box<Node>> },
    Defer { cond: DeferCond, stmt: Option<Box<Node>> },
    Spawn { call: Option<Box<Node>> },
    Match { arms: Vec<Node> },
    MatchArm { header: Option<Box<Node>>, body: Option<Box<Node>> },

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------
    Ident { name: String },
    IntLit { value: i64 },
    FloatLit { text: String },
    StringLit { value: String },
    CharLit { value: String },
    Call { callee: Box<Node>, args: Vec<Node> },
    /// `recv.name(args)` before UFCS lowering; absent afterwards.
    Method { recv: Box<Node>, name: String, args: Vec<Node> },
    FieldAccess { obj: Box<Node>, field: String, arrow: bool },
    IndexExpr { array: Box<Node>, index: Box<Node> },
    Unary { op: UnOp, operand: Box<Node> },
    Binary { op: BinOp, lhs: Box<Node>, rhs: Box<Node> },
    Ternary {
        cond: Box<Node>,
        then_val: Box<Node>,
        else_val: Box<Node>,
    },
    Cast { to: Box<Node>, expr: Box<Node> },
    SizeOf { arg: Box<Node> },
    Assign { lhs: Box<Node>, rhs: Box<Node> },
    CompoundAssign { op: CompoundOp, lhs: Box<Node>, rhs: Box<Node> },
    InitList { items: Vec<Node> },
    Closure {
        id: u32,
        params: Vec<Node>,
        captures: Vec<Node>,
        capture_tys: Vec<String>,
        body: Option<Box<Node>>,
    },
    Await { operand: Option<Box<Node>> },
    ChanSend { chan: Box<Node>, value: Box<Node> },
    ChanRecv { chan: Box<Node>, dest: Option<Box<Node>> },
    OkCtor { value: Option<Box<Node>> },
    ErrCtor { value: Option<Box<Node>> },
    SomeCtor { value: Option<Box<Node>> },
    NoneCtor,
    Try { expr: Box<Node> },
    Designator { field: String, value: Option<Box<Node>> },
}

impl Node {
    /// Bare node with the tag set and everything else zeroed.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            span: Span::synthetic(),
            ty: None,
            kind,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_ty(mut self, ty: impl Into<String>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    // -- constructors ------------------------------------------------------

    pub fn ident(name: impl Into<String>, span: Span) -> Self {
        Self::new(NodeKind::Ident { name: name.into() }).with_span(span)
    }

    pub fn int_lit(value: i64, span: Span) -> Self {
        Self::new(NodeKind::IntLit { value }).with_span(span)
    }

    pub fn string_lit(value: impl Into<String>, span: Span) -> Self {
        Self::new(NodeKind::StringLit {
            value: value.into(),
        })
        .with_span(span)
    }

    pub fn call(callee: Node, args: Vec<Node>, span: Span) -> Self {
        Self::new(NodeKind::Call {
            callee: Box::new(callee),
            args,
        })
        .with_span(span)
    }

    pub fn method(recv: Node, name: impl Into<String>, args: Vec<Node>, span: Span) -> Self {
        Self::new(NodeKind::Method {
            recv: Box::new(recv),
            name: name.into(),
            args,
        })
        .with_span(span)
    }

    pub fn block(span: Span) -> Self {
        Self::new(NodeKind::Block { stmts: Vec::new() }).with_span(span)
    }

    pub fn ret(value: Option<Node>, span: Span) -> Self {
        Self::new(NodeKind::Return {
            value: value.map(Box::new),
        })
        .with_span(span)
    }

    // -- accessors ---------------------------------------------------------

    /// Statement list of a `Block`, or `None` for any other tag.
    pub fn as_block_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.kind {
            NodeKind::Block { stmts } => Some(stmts),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Block { stmts } => Some(stmts),
            _ => None,
        }
    }

    /// Append a child to a list-bearing node. Amortised constant.
    /// Returns `false` when the tag carries no child list.
    pub fn list_push(&mut self, child: Node) -> bool {
        match &mut self.kind {
            NodeKind::Block { stmts } => stmts.push(child),
            NodeKind::File { items, .. } => items.push(child),
            NodeKind::Call { args, .. } => args.push(child),
            NodeKind::Method { args, .. } => args.push(child),
            NodeKind::InitList { items } => items.push(child),
            NodeKind::Match { arms } => arms.push(child),
            NodeKind::StructDecl { fields, .. } => fields.push(child),
            NodeKind::EnumDecl { values, .. } => values.push(child),
            NodeKind::FuncDecl { params, .. } => params.push(child),
            _ => return false,
        }
        true
    }

    /// Direct children in source order. Used by the dumper and by passes
    /// that walk the whole tree.
    pub fn children(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.kind.collect_children(|n| out.push(n));
        out
    }

    /// Mutable variant of [`Node::children`]. The returned references are
    /// disjoint slots of `self`.
    pub fn children_mut(&mut self) -> Vec<&mut Node> {
        let mut out = Vec::new();
        self.kind.collect_children_mut(|n| out.push(n));
        out
    }

    /// Human-readable recursive dump for diagnostics.
    pub fn dump(&self, indent: usize) -> String {
        let mut out = String::new();
        dump::dump_into(self, indent, &mut out);
        out
    }
}

macro_rules! each_child {
    ($kind:expr, $push:ident, $($ref_kw:tt)*) => {
        match $kind {
            NodeKind::File { items, .. } => items.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::Include { .. } => {}
            NodeKind::FuncDecl { ret, params, body, .. } => {
                ret.$($ref_kw)*().for_each(|n| $push(n));
                params.$($ref_kw)*().for_each(|n| $push(n));
                body.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::VarDecl { var_ty, init, .. } => {
                var_ty.$($ref_kw)*().for_each(|n| $push(n));
                init.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::Typedef { aliased, .. } => aliased.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::StructDecl { fields, .. } => fields.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::StructField { field_ty, .. } => field_ty.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::EnumDecl { values, .. } => values.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::EnumValue { value, .. } => value.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::Param { param_ty, .. } => param_ty.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::TypeName { .. } => {}
            NodeKind::TypePtr { inner } => $push(inner),
            NodeKind::TypeArray { elem, len } => {
                $push(elem);
                len.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::TypeSlice { elem, .. } => $push(elem),
            NodeKind::TypeChanTx { elem } => $push(elem),
            NodeKind::TypeChanRx { elem } => $push(elem),
            NodeKind::TypeOptional { inner } => $push(inner),
            NodeKind::TypeResult { ok, err } => {
                $push(ok);
                $push(err);
            }
            NodeKind::TypeFunc { ret, params } => {
                $push(ret);
                params.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::Block { stmts } => stmts.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::ExprStmt { expr } => $push(expr),
            NodeKind::Return { value } => value.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::If { cond, then_branch, else_branch } => {
                cond.$($ref_kw)*().for_each(|n| $push(n));
                then_branch.$($ref_kw)*().for_each(|n| $push(n));
                else_branch.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::While { cond, body } => {
                cond.$($ref_kw)*().for_each(|n| $push(n));
                body.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::For { init, cond, post, body } => {
                init.$($ref_kw)*().for_each(|n| $push(n));
                cond.$($ref_kw)*().for_each(|n| $push(n));
                post.$($ref_kw)*().for_each(|n| $push(n));
                body.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::ForAwait { source, body, .. } => {
                source.$($ref_kw)*().for_each(|n| $push(n));
                body.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::Switch { scrutinee, body } => {
                scrutinee.$($ref_kw)*().for_each(|n| $push(n));
                body.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::Break | NodeKind::Continue => {}
            NodeKind::Goto { .. } | NodeKind::Label { .. } => {}
            NodeKind::Nursery { body } => body.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::Arena { body } => body.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::Defer { stmt, .. } => stmt.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::Spawn { call } => call.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::Match { arms } => arms.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::MatchArm { header, body } => {
                header.$($ref_kw)*().for_each(|n| $push(n));
                body.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::Ident { .. }
            | NodeKind::IntLit { .. }
            | NodeKind::FloatLit { .. }
            | NodeKind::StringLit { .. }
            | NodeKind::CharLit { .. }
            | NodeKind::NoneCtor => {}
            NodeKind::Call { callee, args } => {
                $push(callee);
                args.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::Method { recv, args, .. } => {
                $push(recv);
                args.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::FieldAccess { obj, .. } => $push(obj),
            NodeKind::IndexExpr { array, index } => {
                $push(array);
                $push(index);
            }
            NodeKind::Unary { operand, .. } => $push(operand),
            NodeKind::Binary { lhs, rhs, .. } => {
                $push(lhs);
                $push(rhs);
            }
            NodeKind::Ternary { cond, then_val, else_val } => {
                $push(cond);
                $push(then_val);
                $push(else_val);
            }
            NodeKind::Cast { to, expr } => {
                $push(to);
                $push(expr);
            }
            NodeKind::SizeOf { arg } => $push(arg),
            NodeKind::Assign { lhs, rhs } => {
                $push(lhs);
                $push(rhs);
            }
            NodeKind::CompoundAssign { lhs, rhs, .. } => {
                $push(lhs);
                $push(rhs);
            }
            NodeKind::InitList { items } => items.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::Closure { params, captures, body, .. } => {
                params.$($ref_kw)*().for_each(|n| $push(n));
                captures.$($ref_kw)*().for_each(|n| $push(n));
                body.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::Await { operand } => operand.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::ChanSend { chan, value } => {
                $push(chan);
                $push(value);
            }
            NodeKind::ChanRecv { chan, dest } => {
                $push(chan);
                dest.$($ref_kw)*().for_each(|n| $push(n));
            }
            NodeKind::OkCtor { value }
            | NodeKind::ErrCtor { value }
            | NodeKind::SomeCtor { value } => value.$($ref_kw)*().for_each(|n| $push(n)),
            NodeKind::Try { expr } => $push(expr),
            NodeKind::Designator { value, .. } => value.$($ref_kw)*().for_each(|n| $push(n)),
        }
    };
}

impl NodeKind {
    fn collect_children<'a>(&'a self, mut push: impl FnMut(&'a Node)) {
        each_child!(self, push, iter);
    }

    fn collect_children_mut<'a>(&'a mut self, mut push: impl FnMut(&'a mut Node)) {
        each_child!(self, push, iter_mut);
    }

    /// Short tag name for dumps and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::File { .. } => "File",
            NodeKind::Include { .. } => "Include",
            NodeKind::FuncDecl { .. } => "FuncDecl",
            NodeKind::VarDecl { .. } => "VarDecl",
            NodeKind::Typedef { .. } => "Typedef",
            NodeKind::StructDecl { .. } => "StructDecl",
            NodeKind::StructField { .. } => "StructField",
            NodeKind::EnumDecl { .. } => "EnumDecl",
            NodeKind::EnumValue { .. } => "EnumValue",
            NodeKind::Param { .. } => "Param",
            NodeKind::TypeName { .. } => "TypeName",
            NodeKind::TypePtr { .. } => "TypePtr",
            NodeKind::TypeArray { .. } => "TypeArray",
            NodeKind::TypeSlice { .. } => "TypeSlice",
            NodeKind::TypeChanTx { .. } => "TypeChanTx",
            NodeKind::TypeChanRx { .. } => "TypeChanRx",
            NodeKind::TypeOptional { .. } => "TypeOptional",
            NodeKind::TypeResult { .. } => "TypeResult",
            NodeKind::TypeFunc { .. } => "TypeFunc",
            NodeKind::Block { .. } => "Block",
            NodeKind::ExprStmt { .. } => "ExprStmt",
            NodeKind::Return { .. } => "Return",
            NodeKind::If { .. } => "If",
            NodeKind::While { .. } => "While",
            NodeKind::For { .. } => "For",
            NodeKind::ForAwait { .. } => "ForAwait",
            NodeKind::Switch { .. } => "Switch",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::Goto { .. } => "Goto",
            NodeKind::Label { .. } => "Label",
            NodeKind::Nursery { .. } => "Nursery",
            NodeKind::Arena { .. } => "Arena",
            NodeKind::Defer { .. } => "Defer",
            NodeKind::Spawn { .. } => "Spawn",
            NodeKind::Match { .. } => "Match",
            NodeKind::MatchArm { .. } => "MatchArm",
            NodeKind::Ident { .. } => "Ident",
            NodeKind::IntLit { .. } => "IntLit",
            NodeKind::FloatLit { .. } => "FloatLit",
            NodeKind::StringLit { .. } => "StringLit",
            NodeKind::CharLit { .. } => "CharLit",
            NodeKind::Call { .. } => "Call",
            NodeKind::Method { .. } => "Method",
            NodeKind::FieldAccess { .. } => "FieldAccess",
            NodeKind::IndexExpr { .. } => "IndexExpr",
            NodeKind::Unary { .. } => "Unary",
            NodeKind::Binary { .. } => "Binary",
            NodeKind::Ternary { .. } => "Ternary",
            NodeKind::Cast { .. } => "Cast",
            NodeKind::SizeOf { .. } => "SizeOf",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::CompoundAssign { .. } => "CompoundAssign",
            NodeKind::InitList { .. } => "InitList",
            NodeKind::Closure { .. } => "Closure",
            NodeKind::Await { .. } => "Await",
            NodeKind::ChanSend { .. } => "ChanSend",
            NodeKind::ChanRecv { .. } => "ChanRecv",
            NodeKind::OkCtor { .. } => "OkCtor",
            NodeKind::ErrCtor { .. } => "ErrCtor",
            NodeKind::SomeCtor { .. } => "SomeCtor",
            NodeKind::NoneCtor => "NoneCtor",
            NodeKind::Try { .. } => "Try",
            NodeKind::Designator { .. } => "Designator",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::synthetic()
    }

    #[test]
    fn constructors_set_tags() {
        let n = Node::ident("x", span());
        assert_eq!(n.kind.tag(), "Ident");
        let c = Node::call(Node::ident("f", span()), vec![Node::int_lit(1, span())], span());
        assert_eq!(c.children().len(), 2);
    }

    #[test]
    fn clone_is_deep() {
        let mut blk = Node::block(span());
        blk.list_push(Node::ret(Some(Node::ident("x", span())), span()));
        let mut copy = blk.clone();
        // Mutating the copy must not affect the original.
        copy.as_block_mut().unwrap().clear();
        assert_eq!(blk.as_block().unwrap().len(), 1);
        assert_eq!(copy.as_block().unwrap().len(), 0);
    }

    #[test]
    fn clone_preserves_strings_and_spans() {
        let file: Arc<str> = Arc::from("unit.cc");
        let s = Span::new(&file, Loc::new(3, 1), Loc::new(3, 9));
        let n = Node::string_lit("hello", s.clone()).with_ty("char *");
        let c = n.clone();
        assert_eq!(c, n);
        assert_eq!(c.span.file.as_ref(), "unit.cc");
    }

    #[test]
    fn list_push_rejects_non_list_tags() {
        let mut n = Node::int_lit(4, span());
        assert!(!n.list_push(Node::ident("x", span())));
        let mut blk = Node::block(span());
        assert!(blk.list_push(Node::ident("x", span())));
    }

    #[test]
    fn block_order_is_push_order() {
        let mut blk = Node::block(span());
        for name in ["a", "b", "c"] {
            blk.list_push(Node::ident(name, span()));
        }
        let names: Vec<_> = blk
            .as_block()
            .unwrap()
            .iter()
            .map(|n| match &n.kind {
                NodeKind::Ident { name } => name.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn children_mut_visits_every_slot() {
        let mut f = Node::new(NodeKind::FuncDecl {
            name: "f".into(),
            ret: Some(Box::new(Node::new(NodeKind::TypeName { name: "int".into() }))),
            params: vec![Node::new(NodeKind::Param {
                name: "x".into(),
                param_ty: None,
            })],
            body: Some(Box::new(Node::block(span()))),
            attrs: FnAttrs::ASYNC,
        });
        assert_eq!(f.children_mut().len(), 3);
        assert_eq!(f.children().len(), 3);
    }

    #[test]
    fn operator_spellings_round_trip() {
        for op in [BinOp::Add, BinOp::Shl, BinOp::LogAnd, BinOp::Ne] {
            assert_eq!(BinOp::from_spelling(op.spelling()), Some(op));
        }
        assert_eq!(BinOp::from_spelling("=>"), None);
        assert_eq!(UnOp::from_spelling("~"), Some(UnOp::BitNot));
    }
}
