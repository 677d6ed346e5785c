// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Lowering - method bodies to region-structured CFGs.
//!
//! Statement lowering here is only as rich as iteration needs: locals,
//! expression statements, blocks, `if`, `break`/`continue`, `return`,
//! `throw`, and loops, which are built, resolved and lowered in turn.

mod loops;
mod stmt;

pub use loops::LoweredLoop;

use std::collections::HashMap;

use skein_ast::{Expr, ExprKind, LineMap, Span, Stmt};
use skein_bind::{DiagnosticSink, IterationConfig, IterationResolver, LoopTreeBuilder};
use skein_types::{CallSiteContext, ConstValue, NodeTypes, SemanticOracle};

use crate::builder::GraphBuilder;
use crate::graph::{BlockId, ControlFlowGraph, LocalId, Place, RegionId, RegionKind, Value};
use crate::transform::suspension;

/// Everything a method lowering reads. Shareable across threads.
#[derive(Clone, Copy)]
pub struct LoweringContext<'a> {
    pub oracle: &'a dyn SemanticOracle,
    pub node_types: &'a NodeTypes,
    pub config: &'a IterationConfig,
    pub sink: &'a dyn DiagnosticSink,
    pub file_path: &'a str,
    /// Used for caller-line default arguments; line 0 without it.
    pub line_map: Option<&'a LineMap>,
}

/// Where `break` and `continue` go for one enclosing loop.
#[derive(Debug, Clone)]
pub(crate) struct LoopContext {
    pub label: Option<String>,
    pub break_block: BlockId,
    pub continue_block: BlockId,
}

pub struct MethodLowerer<'a> {
    ctx: LoweringContext<'a>,
    name: String,
    builder: GraphBuilder,
    trees: LoopTreeBuilder<'a>,
    resolver: IterationResolver<'a>,
    loop_stack: Vec<LoopContext>,
    scopes: Vec<HashMap<String, LocalId>>,
}

/// Lower a whole method body.
pub fn lower_method(name: &str, body: &[Stmt], ctx: LoweringContext<'_>) -> ControlFlowGraph {
    let mut lowerer = MethodLowerer::new(name, ctx);
    lowerer.lower_statements(body);
    lowerer.finish()
}

impl<'a> MethodLowerer<'a> {
    pub fn new(name: &str, ctx: LoweringContext<'a>) -> Self {
        Self {
            ctx,
            name: name.to_string(),
            builder: GraphBuilder::new(name),
            trees: LoopTreeBuilder::new(ctx.oracle, ctx.node_types, ctx.sink),
            resolver: IterationResolver::new(ctx.oracle, ctx.config),
            loop_stack: Vec::new(),
            scopes: vec![HashMap::new()],
        }
    }

    /// Lower statements into the current block, in the current scope.
    pub fn lower_statements(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
    }

    pub fn finish(self) -> ControlFlowGraph {
        let graph = self.builder.finish();
        debug_assert_eq!(suspension::verify(&graph), Ok(()));
        tracing::debug!(
            method = %graph.name,
            blocks = graph.layout.len(),
            regions = graph.regions.len(),
            suspensions = graph.suspensions.len(),
            "lowered method"
        );
        graph
    }

    fn call_site(&self, span: Span) -> CallSiteContext {
        CallSiteContext {
            member_name: self.name.clone(),
            file_path: self.ctx.file_path.to_string(),
            line: self.ctx.line_map.map_or(0, |m| m.line_of(span)),
            span,
        }
    }

    // ── Scopes ──────────────────────────────────────────────────────

    /// Open a region and continue in a fresh block inside it.
    fn open_scope(&mut self, kind: RegionKind) -> RegionId {
        let region = self.builder.open_region(kind);
        self.continue_in_new_block();
        region
    }

    /// Close a region and continue in a fresh block after it.
    fn close_scope(&mut self, region: RegionId) {
        let next = self.builder.reserve_block();
        if self.builder.current_block_unterminated() {
            self.builder.goto(next);
        }
        self.builder.close_region(region);
        self.builder.place_block(next);
    }

    fn continue_in_new_block(&mut self) {
        let next = self.builder.reserve_block();
        if self.builder.current_block_unterminated() {
            self.builder.goto(next);
        }
        self.builder.place_block(next);
    }

    fn declare_variable(&mut self, name: &str, local: LocalId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), local);
        }
    }

    fn lookup_variable(&self, name: &str) -> Option<LocalId> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    // ── Values ──────────────────────────────────────────────────────

    fn value_of(&self, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::Null => Value::Const(ConstValue::Null),
            ExprKind::Bool(b) => Value::Const(ConstValue::Bool(*b)),
            ExprKind::Int(n) => Value::Const(ConstValue::Int(*n)),
            ExprKind::String(s) => Value::Const(ConstValue::Str(s.clone())),
            ExprKind::Ident(name) => match self.lookup_variable(name) {
                Some(local) => Value::Local(local),
                None => Value::Expr { node: expr.id, text: name.clone() },
            },
            _ => Value::Expr { node: expr.id, text: expr.describe() },
        }
    }

    fn place_of(&self, expr: &Expr) -> Place {
        match &expr.kind {
            ExprKind::Ident(name) => match self.lookup_variable(name) {
                Some(local) => Place::Local(local),
                None => Place::Named(name.clone()),
            },
            _ => Place::Expr { node: expr.id, text: expr.describe() },
        }
    }
}
