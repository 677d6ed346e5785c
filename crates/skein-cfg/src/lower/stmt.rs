// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Statement lowering.

use std::collections::HashMap;

use skein_ast::{Expr, ExprKind, RefKind, Span, Stmt, StmtKind};
use skein_bind::LoweringError;
use skein_types::Type;

use super::{LoopContext, MethodLowerer};
use crate::graph::{Edge, Operation, Place, RegionKind, Rvalue, Terminator};

impl<'a> MethodLowerer<'a> {
    pub(super) fn lower_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(e) => self.lower_expr_stmt(e),

            StmtKind::Let { name, ty, init } => {
                let ty = ty
                    .as_deref()
                    .and_then(|text| self.ctx.oracle.parse_type(text).ok())
                    .or_else(|| self.ctx.node_types.get(init.id).cloned())
                    .unwrap_or(Type::Error);
                let value = self.value_of(init);
                let local = self.builder.declare_local(Some(name.clone()), ty, RefKind::Value);
                self.trees.declare_local(name, stmt.span);
                self.declare_variable(name, local);
                self.builder.push(Operation::Assign { place: Place::Local(local), value: Rvalue::Use(value) });
            }

            StmtKind::Block(stmts) => self.lower_nested(stmts),

            StmtKind::If { cond, then_branch, else_branch } => {
                self.lower_if(cond, then_branch, else_branch.as_deref())
            }

            StmtKind::Break(label) => self.lower_break(label.as_deref(), stmt.span),

            StmtKind::Continue(label) => self.lower_continue(label.as_deref(), stmt.span),

            StmtKind::Return(opt_expr) => {
                let value = opt_expr.as_ref().map(|e| self.value_of(e));
                let exit = self.builder.exit_block();
                self.builder.terminate(Terminator::Return { value, edge: Edge::to(exit) });
                self.builder.start_dead_block();
            }

            StmtKind::Throw(e) => {
                let value = self.value_of(e);
                self.builder.terminate(Terminator::Throw(value));
                self.builder.start_dead_block();
            }

            StmtKind::ForEach(foreach) => {
                self.lower_foreach(stmt.id, stmt.span, foreach);
            }
        }
    }

    fn lower_expr_stmt(&mut self, expr: &Expr) {
        let op = match &expr.kind {
            ExprKind::Assign { target, value } => Operation::Assign {
                place: self.place_of(target),
                value: Rvalue::Use(self.value_of(value)),
            },
            _ => Operation::Eval(Rvalue::Use(self.value_of(expr))),
        };
        self.builder.push(op);
    }

    /// A nested statement list. It gets its own locals scope only when it
    /// declares something.
    fn lower_nested(&mut self, stmts: &[Stmt]) {
        self.trees.enter_block();
        self.scopes.push(HashMap::new());
        let declares = stmts.iter().any(|s| matches!(s.kind, StmtKind::Let { .. }));
        let region = declares.then(|| self.open_scope(RegionKind::LocalsScope));

        for stmt in stmts {
            self.lower_stmt(stmt);
        }

        if let Some(region) = region {
            self.close_scope(region);
        }
        self.scopes.pop();
        self.trees.exit_block();
    }

    fn lower_if(&mut self, cond: &Expr, then_branch: &[Stmt], else_branch: Option<&[Stmt]>) {
        let then_block = self.builder.reserve_block();
        let join_block = self.builder.reserve_block();
        let else_block = match else_branch {
            Some(_) => self.builder.reserve_block(),
            None => join_block,
        };

        let condition = Rvalue::Use(self.value_of(cond));
        self.builder.terminate(Terminator::ConditionalGoto {
            condition,
            jump_if_true: false,
            target: Edge::to(else_block),
            fallthrough: Edge::to(then_block),
        });

        self.builder.place_block(then_block);
        self.lower_nested(then_branch);
        if self.builder.current_block_unterminated() {
            self.builder.goto(join_block);
        }

        if let Some(stmts) = else_branch {
            self.builder.place_block(else_block);
            self.lower_nested(stmts);
            if self.builder.current_block_unterminated() {
                self.builder.goto(join_block);
            }
        }

        self.builder.place_block(join_block);
    }

    /// Break statement - jump to the loop's exit, leaving every region the
    /// loop opened.
    fn lower_break(&mut self, label: Option<&str>, span: Span) {
        match self.find_loop(label, "break", span) {
            Ok(ctx) => {
                let target = ctx.break_block;
                self.builder.goto(target);
                self.builder.start_dead_block();
            }
            Err(err) => self.ctx.sink.report(err.into()),
        }
    }

    /// Continue statement - jump to the loop's condition block.
    fn lower_continue(&mut self, label: Option<&str>, span: Span) {
        match self.find_loop(label, "continue", span) {
            Ok(ctx) => {
                let target = ctx.continue_block;
                self.builder.goto(target);
                self.builder.start_dead_block();
            }
            Err(err) => self.ctx.sink.report(err.into()),
        }
    }

    /// Find the loop context for a break/continue, optionally by label.
    fn find_loop(&self, label: Option<&str>, keyword: &'static str, span: Span) -> Result<&LoopContext, LoweringError> {
        match label {
            None => self.loop_stack.last().ok_or_else(|| LoweringError::outside_loop(keyword, span)),
            Some(lbl) => self
                .loop_stack
                .iter()
                .rev()
                .find(|ctx| ctx.label.as_deref() == Some(lbl))
                .ok_or_else(|| {
                    let in_scope = self.loop_stack.iter().rev().filter_map(|ctx| ctx.label.clone()).collect();
                    LoweringError::unknown_label(lbl.to_string(), in_scope, span)
                }),
        }
    }
}
