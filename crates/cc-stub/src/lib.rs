//! Flat stub-node view over the host parser's output.
//!
//! The host C parser reports only a coarse skeleton: a flat array of nodes,
//! each with a parent index, a span, two auxiliary integers (attribute
//! bit-fields), and up to two strings (names, types, or operator spellings).
//! This crate defines that contract ([`StubNode`], [`StubTree`]) and the
//! [`StubParser`] boundary behind which the concrete parser lives. The tree
//! builder in `cc-build` reconstructs a proper AST from this view.
//!
//! Node order is production order: a child always appears after its parent
//! except for deliberately re-parented repair cases, and `parent` never forms
//! a cycle. [`StubTree::validate`] checks the cheap half of that invariant.

use bitflags::bitflags;
use cc_diag::LowerError;
use std::fmt::Write as _;

/// Stub node kinds. The host parser distinguishes only these coarse shapes;
/// everything finer (e.g. which identifier is a callee) is reconstructed by
/// the tree builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubKind {
    // Declarations
    Decl,
    DeclItem,
    Param,
    Typedef,
    StructDecl,
    StructField,
    EnumDecl,
    EnumValue,
    // Blocks and bookkeeping wrappers
    Block,
    Then,
    Else,
    // Statements
    StmtIf,
    StmtWhile,
    StmtFor,
    StmtForAwait,
    StmtSwitch,
    StmtReturn,
    StmtBreak,
    StmtContinue,
    StmtGoto,
    StmtLabel,
    StmtExpr,
    StmtNursery,
    StmtArena,
    StmtDefer,
    StmtSpawn,
    StmtMatch,
    MatchArm,
    // Expressions
    Ident,
    IntLit,
    FloatLit,
    StrLit,
    CharLit,
    Call,
    Method,
    Field,
    Index,
    Unary,
    Binary,
    Ternary,
    Cast,
    SizeOf,
    Assign,
    Compound,
    InitList,
    Closure,
    Await,
    ChanSend,
    ChanRecv,
    OkCtor,
    ErrCtor,
    SomeCtor,
    NoneCtor,
    Try,
    Designator,
    /// Anything the adapter could not classify; dropped by the builder.
    Other,
}

impl StubKind {
    /// Control-flow statements whose bookkeeping children are subject to
    /// misparent repair.
    pub fn is_control_stmt(self) -> bool {
        matches!(
            self,
            StubKind::StmtIf | StubKind::StmtWhile | StubKind::StmtFor | StubKind::StmtSwitch
        )
    }

    /// Nodes that legitimately hang under a control statement as its body.
    pub fn is_body_wrapper(self) -> bool {
        matches!(self, StubKind::Block | StubKind::Then | StubKind::Else)
    }

    /// Statement-shaped kinds. Header expressions and declaration items are
    /// excluded: under a control statement those are legitimate children.
    pub fn is_stmt(self) -> bool {
        matches!(
            self,
            StubKind::StmtIf
                | StubKind::StmtWhile
                | StubKind::StmtFor
                | StubKind::StmtForAwait
                | StubKind::StmtSwitch
                | StubKind::StmtReturn
                | StubKind::StmtBreak
                | StubKind::StmtContinue
                | StubKind::StmtGoto
                | StubKind::StmtLabel
                | StubKind::StmtExpr
                | StubKind::StmtNursery
                | StubKind::StmtArena
                | StubKind::StmtDefer
                | StubKind::StmtSpawn
                | StubKind::StmtMatch
        )
    }
}

bitflags! {
    /// Attribute bits carried in a stub node's first auxiliary integer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StubAttr: u32 {
        const ASYNC   = 1 << 0;
        const STATIC  = 1 << 1;
        const NOBLOCK = 1 << 2;
        const UNION   = 1 << 3;
        const ARROW   = 1 << 4;
        const UNSAFE  = 1 << 5;
    }
}

/// One entry of the flat stub stream.
#[derive(Debug, Clone)]
pub struct StubNode {
    pub kind: StubKind,
    /// Index of the parent node; negative for roots.
    pub parent: i32,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    /// Attribute bit-field (see [`StubAttr`]).
    pub aux0: u32,
    /// Secondary integer: arity, literal payload, or unused.
    pub aux1: u32,
    /// Primary spelling: declared name, identifier, callee, literal text.
    pub s1: Option<String>,
    /// Secondary spelling: type text or operator spelling.
    pub s2: Option<String>,
    /// Originating file, when it differs from the translation unit.
    pub file: Option<String>,
}

impl StubNode {
    pub fn new(kind: StubKind, parent: i32) -> Self {
        Self {
            kind,
            parent,
            start_line: 0,
            start_col: 0,
            end_line: 0,
            end_col: 0,
            aux0: 0,
            aux1: 0,
            s1: None,
            s2: None,
            file: None,
        }
    }

    pub fn at(mut self, start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        self.start_line = start_line;
        self.start_col = start_col;
        self.end_line = end_line;
        self.end_col = end_col;
        self
    }

    pub fn named(mut self, s1: impl Into<String>) -> Self {
        self.s1 = Some(s1.into());
        self
    }

    pub fn typed(mut self, s2: impl Into<String>) -> Self {
        self.s2 = Some(s2.into());
        self
    }

    pub fn with_attrs(mut self, attrs: StubAttr) -> Self {
        self.aux0 = attrs.bits();
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn attrs(&self) -> StubAttr {
        StubAttr::from_bits_truncate(self.aux0)
    }

    /// True when this node's span encloses (or equals) the given line range.
    pub fn spans_lines(&self, first: u32, last: u32) -> bool {
        self.start_line <= first && self.end_line >= last
    }
}

/// The flat, immutable node stream for one translation unit.
#[derive(Debug, Default)]
pub struct StubTree {
    nodes: Vec<StubNode>,
    path: String,
    lowered_path: Option<String>,
}

impl StubTree {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            nodes: Vec::new(),
            path: path.into(),
            lowered_path: None,
        }
    }

    pub fn with_lowered_path(mut self, p: impl Into<String>) -> Self {
        self.lowered_path = Some(p.into());
        self
    }

    /// Append a node, returning its index.
    pub fn push(&mut self, node: StubNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lowered_path(&self) -> Option<&str> {
        self.lowered_path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> Option<&StubNode> {
        self.nodes.get(idx)
    }

    pub fn nodes(&self) -> &[StubNode] {
        &self.nodes
    }

    pub fn parent_of(&self, idx: usize) -> Option<usize> {
        let p = self.nodes.get(idx)?.parent;
        if p < 0 { None } else { Some(p as usize) }
    }

    /// Indices of the direct children of `idx`, in stream order.
    pub fn children_of(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.parent == idx as i32)
            .map(|(i, _)| i)
    }

    /// True when `ancestor` is on `idx`'s parent chain (or equal to it).
    pub fn is_within(&self, mut idx: usize, ancestor: usize) -> bool {
        loop {
            if idx == ancestor {
                return true;
            }
            match self.parent_of(idx) {
                Some(p) if p != idx => idx = p,
                _ => return false,
            }
        }
    }

    /// Cheap structural check: every parent index is in range and no node is
    /// its own parent. Cycle freedom over well-formed streams follows from
    /// the host parser's production order; self-loops are the one corruption
    /// observed in practice, so they are what we reject.
    pub fn validate(&self) -> Result<(), LowerError> {
        for (i, n) in self.nodes.iter().enumerate() {
            if n.parent >= 0 {
                let p = n.parent as usize;
                if p >= self.nodes.len() {
                    return Err(LowerError::internal(format!(
                        "stub node {i} has out-of-range parent {p}"
                    )));
                }
                if p == i {
                    return Err(LowerError::internal(format!("stub node {i} is its own parent")));
                }
            }
        }
        Ok(())
    }

    /// Human-readable dump for `CC_DEBUG_TCC_NODES`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, n) in self.nodes.iter().enumerate() {
            let _ = writeln!(
                out,
                "#{i:<4} {:?} parent={} span={}:{}..{}:{} attrs={:?} s1={:?} s2={:?}",
                n.kind,
                n.parent,
                n.start_line,
                n.start_col,
                n.end_line,
                n.end_col,
                n.attrs(),
                n.s1,
                n.s2,
            );
        }
        out
    }
}

/// Boundary behind which the host C parser lives. Implementations own all
/// parser state; the returned tree is released by `Drop`. `virtual_path` is
/// the name that spans and `#line` directives should carry, which may differ
/// from any on-disk path when the source was preprocessed to a temp file.
pub trait StubParser {
    fn parse(&self, source: &str, virtual_path: &str) -> Result<StubTree, LowerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> StubTree {
        let mut t = StubTree::new("t.cc");
        let f = t.push(StubNode::new(StubKind::Decl, -1).named("f").typed("int"));
        let b = t.push(StubNode::new(StubKind::Block, f as i32));
        t.push(StubNode::new(StubKind::StmtReturn, b as i32));
        t
    }

    #[test]
    fn children_in_stream_order() {
        let t = small_tree();
        assert_eq!(t.children_of(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(t.children_of(1).collect::<Vec<_>>(), vec![2]);
        assert_eq!(t.parent_of(0), None);
    }

    #[test]
    fn is_within_walks_parent_chain() {
        let t = small_tree();
        assert!(t.is_within(2, 0));
        assert!(t.is_within(2, 2));
        assert!(!t.is_within(0, 2));
    }

    #[test]
    fn attrs_decode_from_aux() {
        let n = StubNode::new(StubKind::Decl, -1).with_attrs(StubAttr::ASYNC | StubAttr::STATIC);
        assert!(n.attrs().contains(StubAttr::ASYNC));
        assert!(!n.attrs().contains(StubAttr::UNION));
        // Unknown high bits must not panic the decoder.
        let mut raw = n;
        raw.aux0 |= 1 << 30;
        assert!(raw.attrs().contains(StubAttr::STATIC));
    }

    #[test]
    fn validate_rejects_self_parent() {
        let mut t = StubTree::new("t.cc");
        t.push(StubNode::new(StubKind::Ident, 0));
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_parent() {
        let mut t = StubTree::new("t.cc");
        t.push(StubNode::new(StubKind::Ident, 7));
        assert!(t.validate().is_err());
    }

    #[test]
    fn control_stmt_classification() {
        assert!(StubKind::StmtIf.is_control_stmt());
        assert!(StubKind::StmtSwitch.is_control_stmt());
        assert!(!StubKind::StmtReturn.is_control_stmt());
        assert!(StubKind::Then.is_body_wrapper());
        assert!(!StubKind::StmtExpr.is_body_wrapper());
    }
}
