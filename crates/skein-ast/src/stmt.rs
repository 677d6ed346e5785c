// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement syntax nodes.

use crate::expr::Expr;
use crate::{NodeId, Span};

/// A statement in the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
    pub span: Span,
}

/// The kind of statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression statement
    Expr(Expr),
    /// Local declaration
    Let {
        name: String,
        ty: Option<String>,
        init: Expr,
    },
    /// Nested statement list
    Block(Vec<Stmt>),
    /// Two-way conditional
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    /// Break statement, optionally labelled
    Break(Option<String>),
    /// Continue statement, optionally labelled
    Continue(Option<String>),
    /// Return statement
    Return(Option<Expr>),
    /// Throw statement
    Throw(Expr),
    /// Collection iteration loop
    ForEach(ForEach),
}

/// `[label:] [await] foreach (target in iter) { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct ForEach {
    pub label: Option<String>,
    pub is_async: bool,
    pub target: ForTarget,
    pub iter: Expr,
    pub body: Vec<Stmt>,
}

/// How the element is bound to the loop variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RefKind {
    #[default]
    Value,
    Ref,
    RefReadOnly,
}

/// The element target written between `foreach (` and `in`.
#[derive(Debug, Clone, PartialEq)]
pub enum ForTarget {
    /// `T x`, `var x`, `ref T x`, `ref readonly var x`; `ty == None` means inferred.
    Declaration {
        name: String,
        ty: Option<String>,
        ref_kind: RefKind,
        span: Span,
    },
    /// `_` or `var _`
    Discard(Span),
    /// `(a, b)`, `var (a, b)`, `(T a, (var b, _))`
    Tuple {
        elements: Vec<ForTarget>,
        span: Span,
    },
    /// An expression in target position: an existing variable, member or
    /// element access, or (invalid) an invocation.
    Expr(Expr),
}

impl ForTarget {
    pub fn span(&self) -> Span {
        match self {
            ForTarget::Declaration { span, .. } => *span,
            ForTarget::Discard(span) => *span,
            ForTarget::Tuple { span, .. } => *span,
            ForTarget::Expr(e) => e.span,
        }
    }
}

impl Stmt {
    pub fn new(id: NodeId, kind: StmtKind, span: Span) -> Self {
        Self { id, kind, span }
    }
}
