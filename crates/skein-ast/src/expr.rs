// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression syntax nodes.
//!
//! Only the shapes iteration lowering needs to tell apart are modelled;
//! everything else the outer binder hands over is an opaque expression with
//! a node id and a type recorded elsewhere.

use crate::{NodeId, Span};

/// An expression in the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

/// The kind of expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// The untyped `null` literal
    Null,
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// String literal
    String(String),
    /// Identifier
    Ident(String),
    /// Member access (`a.b`)
    Field {
        object: Box<Expr>,
        field: String,
    },
    /// Element access (`a[i]`)
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// Invocation (`f(x)`)
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Method invocation (`a.m(x)`)
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// Simple assignment (`a = b`)
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// Anything else the outer binder already bound
    Opaque(String),
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, span: Span) -> Self {
        Self { id, kind, span }
    }

    /// Whether this expression denotes a storage location that can be
    /// assigned to (variable, member, or element access).
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Ident(_) | ExprKind::Field { .. } | ExprKind::Index { .. }
        )
    }

    /// Short source-like rendering used in graph dumps and diagnostics.
    pub fn describe(&self) -> String {
        match &self.kind {
            ExprKind::Null => "null".to_string(),
            ExprKind::Bool(b) => b.to_string(),
            ExprKind::Int(n) => n.to_string(),
            ExprKind::String(s) => format!("{:?}", s),
            ExprKind::Ident(name) => name.clone(),
            ExprKind::Field { object, field } => format!("{}.{}", object.describe(), field),
            ExprKind::Index { object, index } => {
                format!("{}[{}]", object.describe(), index.describe())
            }
            ExprKind::Call { func, args } => {
                format!("{}({})", func.describe(), describe_args(args))
            }
            ExprKind::MethodCall { object, method, args } => {
                format!("{}.{}({})", object.describe(), method, describe_args(args))
            }
            ExprKind::Assign { target, value } => {
                format!("{} = {}", target.describe(), value.describe())
            }
            ExprKind::Opaque(text) => text.clone(),
        }
    }
}

fn describe_args(args: &[Expr]) -> String {
    args.iter()
        .map(Expr::describe)
        .collect::<Vec<_>>()
        .join(", ")
}
