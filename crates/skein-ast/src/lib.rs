// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Syntax tree types for iteration statements and their bodies.
//!
//! This crate is the hand-off point between the parser/outer binder and the
//! iteration lowering passes. Static types are not stored on the nodes; the
//! outer binder records them per `NodeId` (see `skein_types::NodeTypes`).

pub mod span;
pub mod expr;
pub mod stmt;

pub use span::{Span, LineMap};
pub use expr::{Expr, ExprKind};
pub use stmt::{ForEach, ForTarget, RefKind, Stmt, StmtKind};

/// Unique identifier for syntax nodes.
///
/// Used by semantic analysis passes to attach types and resolution results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    pub const DUMMY: NodeId = NodeId(u32::MAX);
}
