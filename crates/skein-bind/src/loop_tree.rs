// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Loop tree construction.
//!
//! Validates the syntactic `foreach` and canonicalizes it into a [`LoopTree`]
//! that carries no CFG concerns. Invalid pieces are reported and replaced by
//! placeholders so later phases always receive a complete tree.

use std::collections::HashMap;
use std::fmt;

use skein_ast::{Expr, ExprKind, ForEach, ForTarget, NodeId, RefKind, Span, Stmt};
use skein_types::{NodeTypes, SemanticOracle, Type};

use crate::errors::LoopTreeError;
use crate::scope::ScopeChain;
use crate::sink::DiagnosticSink;

/// A jump target, bound to a block during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Hands out labels unique within one method body.
#[derive(Debug, Default)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> LabelId {
        let id = LabelId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLabels {
    /// Loop head; target of `continue`.
    pub continue_label: LabelId,
    /// Target of `break`.
    pub break_label: LabelId,
    /// Where control goes when the collection is exhausted.
    pub exit_label: LabelId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableTarget {
    pub name: String,
    /// Written type; `None` when inferred from the element type.
    pub declared_type: Option<Type>,
    /// `false` when assigning to an existing variable.
    pub is_declaration: bool,
    pub ref_kind: RefKind,
    pub span: Span,
}

/// Where each element goes.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementTarget {
    SingleVariable(VariableTarget),
    Discard(Span),
    Destructuring { elements: Vec<ElementTarget>, span: Span },
    /// Member or element access inside a destructuring pattern.
    AssignableExpression { expr: Expr, ty: Type },
}

impl ElementTarget {
    pub fn span(&self) -> Span {
        match self {
            ElementTarget::SingleVariable(v) => v.span,
            ElementTarget::Discard(span) => *span,
            ElementTarget::Destructuring { span, .. } => *span,
            ElementTarget::AssignableExpression { expr, .. } => expr.span,
        }
    }

    /// Freshly declared variables, in source order.
    pub fn declared_variables(&self) -> Vec<&VariableTarget> {
        let mut out = Vec::new();
        self.collect_declared(&mut out);
        out
    }

    fn collect_declared<'a>(&'a self, out: &mut Vec<&'a VariableTarget>) {
        match self {
            ElementTarget::SingleVariable(v) if v.is_declaration => out.push(v),
            ElementTarget::Destructuring { elements, .. } => {
                for e in elements {
                    e.collect_declared(out);
                }
            }
            _ => {}
        }
    }
}

/// The collection expression as handed over by the outer binder.
#[derive(Debug, Clone)]
pub struct CollectionExpr {
    pub expr: Expr,
    /// Static type; the error type for the bare `null` literal.
    pub ty: Type,
}

/// One canonicalized loop construct. Consumed once by lowering.
#[derive(Debug, Clone)]
pub struct LoopTree {
    pub id: NodeId,
    pub span: Span,
    pub element_target: ElementTarget,
    pub collection: CollectionExpr,
    pub body: Vec<Stmt>,
    pub labels: LoopLabels,
    pub is_async: bool,
    pub user_label: Option<String>,
    pub has_errors: bool,
}

/// Builds loop trees for one method body.
pub struct LoopTreeBuilder<'a> {
    oracle: &'a dyn SemanticOracle,
    node_types: &'a NodeTypes,
    sink: &'a dyn DiagnosticSink,
    scopes: ScopeChain,
}

impl<'a> LoopTreeBuilder<'a> {
    pub fn new(
        oracle: &'a dyn SemanticOracle,
        node_types: &'a NodeTypes,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        Self { oracle, node_types, sink, scopes: ScopeChain::new() }
    }

    pub fn enter_block(&mut self) {
        self.scopes.push();
    }

    pub fn exit_block(&mut self) {
        self.scopes.pop();
    }

    /// Declare a parameter or local in the current scope.
    pub fn declare_local(&mut self, name: &str, span: Span) {
        if let Err(previous) = self.scopes.define(name, span) {
            self.sink.report(LoopTreeError::duplicate(name.to_string(), span, previous).into());
        }
    }

    /// Build the tree for one loop and enter a scope holding its element
    /// variables. Call [`LoopTreeBuilder::exit_loop`] after the body.
    pub fn build(
        &mut self,
        id: NodeId,
        span: Span,
        foreach: &ForEach,
        labels: &mut LabelAllocator,
    ) -> LoopTree {
        let mut has_errors = false;

        let collection = self.collection(&foreach.iter, &mut has_errors);

        let mut seen = HashMap::new();
        let element_target = self.target(&foreach.target, true, &mut seen, &mut has_errors);

        // Names only become visible inside the body.
        self.scopes.push();
        for var in element_target.declared_variables() {
            // Clashes were reported by `target`; the loop variable shadows.
            let _ = self.scopes.define(&var.name, var.span);
        }

        let labels = LoopLabels {
            continue_label: labels.fresh(),
            break_label: labels.fresh(),
            exit_label: labels.fresh(),
        };

        tracing::debug!(
            loop_id = id.0,
            is_async = foreach.is_async,
            has_errors,
            "built loop tree"
        );

        LoopTree {
            id,
            span,
            element_target,
            collection,
            body: foreach.body.clone(),
            labels,
            is_async: foreach.is_async,
            user_label: foreach.label.clone(),
            has_errors,
        }
    }

    pub fn exit_loop(&mut self) {
        self.scopes.pop();
    }

    fn collection(&self, iter: &Expr, has_errors: &mut bool) -> CollectionExpr {
        let ty = if matches!(iter.kind, ExprKind::Null) {
            self.report(LoopTreeError::null_collection(iter.span), has_errors);
            Type::Error
        } else {
            match self.node_types.get(iter.id) {
                Some(ty) => {
                    if ty.is_error() {
                        *has_errors = true;
                    }
                    ty.clone()
                }
                // Untyped but not `null`: the outer binder already reported it.
                None => {
                    *has_errors = true;
                    Type::Error
                }
            }
        };
        CollectionExpr { expr: iter.clone(), ty }
    }

    fn target(
        &mut self,
        target: &ForTarget,
        top_level: bool,
        seen: &mut HashMap<String, Span>,
        has_errors: &mut bool,
    ) -> ElementTarget {
        match target {
            ForTarget::Declaration { name, ty, ref_kind, span } => {
                let mut ref_kind = *ref_kind;
                if !top_level && ref_kind != RefKind::Value {
                    self.report(
                        LoopTreeError::invalid_target(
                            "by-reference variables cannot appear in a destructuring pattern",
                            *span,
                        ),
                        has_errors,
                    );
                    ref_kind = RefKind::Value;
                }

                let declared_type = ty.as_ref().map(|text| match self.oracle.parse_type(text) {
                    Ok(t) => t,
                    Err(err) => {
                        self.report(LoopTreeError::invalid_target(err.to_string(), *span), has_errors);
                        Type::Error
                    }
                });

                let previous = seen.get(name).copied().or_else(|| self.scopes.lookup(name));
                if let Some(previous) = previous {
                    self.report(LoopTreeError::duplicate(name.clone(), *span, previous), has_errors);
                }
                seen.insert(name.clone(), *span);

                ElementTarget::SingleVariable(VariableTarget {
                    name: name.clone(),
                    declared_type,
                    is_declaration: true,
                    ref_kind,
                    span: *span,
                })
            }
            ForTarget::Discard(span) => ElementTarget::Discard(*span),
            ForTarget::Tuple { elements, span } => {
                if elements.len() < 2 {
                    self.report(
                        LoopTreeError::invalid_target(
                            "a destructuring pattern needs at least two elements",
                            *span,
                        ),
                        has_errors,
                    );
                }
                let elements = elements
                    .iter()
                    .map(|e| self.target(e, false, seen, has_errors))
                    .collect();
                ElementTarget::Destructuring { elements, span: *span }
            }
            ForTarget::Expr(expr) => self.expression_target(expr, top_level, has_errors),
        }
    }

    fn expression_target(&mut self, expr: &Expr, top_level: bool, has_errors: &mut bool) -> ElementTarget {
        let ty = self.node_types.get(expr.id).cloned();
        match &expr.kind {
            ExprKind::Ident(name) => {
                if self.scopes.lookup(name).is_none() && ty.is_none() {
                    self.report(
                        LoopTreeError::invalid_target(format!("`{}` is not a variable in scope", name), expr.span),
                        has_errors,
                    );
                    return ElementTarget::Discard(expr.span);
                }
                ElementTarget::SingleVariable(VariableTarget {
                    name: name.clone(),
                    declared_type: Some(ty.unwrap_or(Type::Error)),
                    is_declaration: false,
                    ref_kind: RefKind::Value,
                    span: expr.span,
                })
            }
            ExprKind::Field { .. } | ExprKind::Index { .. } if !top_level => {
                ElementTarget::AssignableExpression { expr: expr.clone(), ty: ty.unwrap_or(Type::Error) }
            }
            _ => {
                let what = match &expr.kind {
                    ExprKind::Call { .. } | ExprKind::MethodCall { .. } => "an invocation",
                    ExprKind::Index { .. } => "an element access",
                    ExprKind::Field { .. } => "a member access",
                    _ => "this expression",
                };
                self.report(
                    LoopTreeError::invalid_target(
                        format!("{} (`{}`) cannot be used as the loop variable", what, expr.describe()),
                        expr.span,
                    ),
                    has_errors,
                );
                ElementTarget::Discard(expr.span)
            }
        }
    }

    fn report(&self, err: LoopTreeError, has_errors: &mut bool) {
        *has_errors = true;
        self.sink.report(err.into());
    }
}
