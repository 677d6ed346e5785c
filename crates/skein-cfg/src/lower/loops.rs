// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Loop lowering.
//!
//! ```text
//! pre-header   [locals T0]  T0 = acquire(convert(collection))
//!              [try]        (only when the enumerator is disposed)
//! condition                 if !advance(T0) goto exit        <- continue
//! body         [locals x]   x = convert(current(T0)); body; goto condition
//!              [finally]    if T0 != null: dispose(T0)
//! exit                                                       <- break
//! ```
//!
//! Built-in shapes keep the collection in T0 and walk it with an index local.

use skein_ast::{ExprKind, ForEach, NodeId, RefKind, Span};
use skein_bind::{
    Disposal, ElementConversion, ElementTarget, IterationBinding, LabelId, LoopTree, VariableTarget,
};
use skein_types::{ArgValue, ArgumentList, Conversion, Type};

use super::{LoopContext, MethodLowerer};
use crate::graph::{
    BlockId, CaptureId, Edge, LocalId, Operation, Pattern, Place, RegionKind, Rvalue, SuspensionSite,
    Terminator, Value,
};
use crate::transform::suspension;

/// Where a lowered loop sits in the enclosing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoweredLoop {
    /// Pre-header; the enclosing block jumps here.
    pub entry_block: BlockId,
    /// Reached when the collection is exhausted or on `break`.
    pub exit_block: BlockId,
    pub break_label: LabelId,
    pub continue_label: LabelId,
}

/// The enumerator (or collection) capture and, for built-ins, the index.
#[derive(Clone, Copy)]
struct Cursor {
    t0: CaptureId,
    index: Option<LocalId>,
}

impl<'a> MethodLowerer<'a> {
    /// Build, resolve and lower one loop statement.
    pub(super) fn lower_foreach(&mut self, id: NodeId, span: Span, foreach: &ForEach) -> LoweredLoop {
        let tree = self.trees.build(id, span, foreach, self.builder.labels_mut());
        let site = self.call_site(span);
        let resolution = self.resolver.resolve(&tree, &site);
        for diag in resolution.diagnostics {
            self.ctx.sink.report(diag.into());
        }
        let lowered = self.lower_loop(&tree, &resolution.binding);
        self.trees.exit_loop();
        lowered
    }

    /// Splice the loop into the graph at the current block and continue in
    /// its exit block.
    pub fn lower_loop(&mut self, tree: &LoopTree, binding: &IterationBinding) -> LoweredLoop {
        tracing::debug!(
            loop_id = tree.id.0,
            protocol = %binding.protocol,
            is_async = tree.is_async,
            disposed = binding.disposal.is_some(),
            "lowering loop"
        );
        let labels = tree.labels;
        let exit = self.builder.label_block(labels.exit_label);
        self.builder.bind_label(labels.break_label, exit);
        let condition = self.builder.label_block(labels.continue_label);

        // Pre-header.
        let outer = self.builder.open_region(RegionKind::LocalsScope);
        let entry = self.builder.reserve_block();
        if self.builder.current_block_unterminated() {
            self.builder.goto(entry);
        }
        self.builder.place_block(entry);
        let cursor = self.emit_acquisition(tree, binding, entry);

        let protected = binding.disposal.as_ref().map(|_| {
            let try_finally = self.builder.open_region(RegionKind::TryFinally);
            let try_region = self.builder.open_region(RegionKind::Try);
            (try_finally, try_region)
        });

        // Condition.
        self.builder.goto(condition);
        self.builder.place_block(condition);
        let body = self.builder.reserve_block();
        let advance = self.advance(binding, cursor);
        self.builder.terminate(Terminator::ConditionalGoto {
            condition: advance,
            jump_if_true: false,
            target: Edge::to(exit),
            fallthrough: Edge::to(body),
        });
        if binding.advance.is_suspending {
            suspension::annotate(&mut self.builder, condition, tree.id, SuspensionSite::Advance);
        }

        // Body.
        let body_scope = self.builder.open_region(RegionKind::LocalsScope);
        self.builder.place_block(body);
        self.scopes.push(Default::default());
        let current = self.current(binding, cursor, &tree.element_target);
        self.bind_element(&tree.element_target, &binding.element_conversion, current);

        self.loop_stack.push(LoopContext {
            label: tree.user_label.clone(),
            break_block: exit,
            continue_block: condition,
        });
        for stmt in &tree.body {
            self.lower_stmt(stmt);
        }
        self.loop_stack.pop();

        if self.builder.current_block_unterminated() {
            self.builder.goto(condition);
        }
        self.scopes.pop();
        self.builder.close_region(body_scope);

        if let (Some((try_finally, try_region)), Some(disposal)) = (protected, &binding.disposal) {
            self.builder.close_region(try_region);
            let finally = self.builder.open_region(RegionKind::Finally);
            self.emit_disposal(tree.id, disposal, cursor.t0);
            self.builder.close_region(finally);
            self.builder.close_region(try_finally);
        }
        self.builder.close_region(outer);
        self.builder.place_block(exit);

        tracing::debug!(loop_id = tree.id.0, entry = entry.0, exit = exit.0, "lowered loop");
        LoweredLoop {
            entry_block: entry,
            exit_block: exit,
            break_label: labels.break_label,
            continue_label: labels.continue_label,
        }
    }

    // ── Call sites ──────────────────────────────────────────────────

    fn emit_acquisition(&mut self, tree: &LoopTree, binding: &IterationBinding, entry: BlockId) -> Cursor {
        let source = if tree.collection.ty.is_error() || matches!(tree.collection.expr.kind, ExprKind::Null) {
            Value::Invalid
        } else {
            self.value_of(&tree.collection.expr)
        };
        let collection = converted(Rvalue::Use(source), &binding.collection_conversion);

        if binding.protocol.is_builtin() {
            let t0 = self.builder.capture(binding.collection_conversion.to.clone());
            self.builder.push(Operation::Capture { id: t0, value: collection });
            let index = self.builder.declare_local(None, binding.enumerator_type.clone(), RefKind::Value);
            self.builder.push(Operation::Assign {
                place: Place::Local(index),
                value: Rvalue::Call {
                    member: binding.acquisition.member.clone(),
                    receiver: Some(Box::new(Rvalue::Use(Value::Capture(t0)))),
                    args: Vec::new(),
                },
            });
            return Cursor { t0, index: Some(index) };
        }

        let t0 = self.builder.capture(binding.enumerator_type.clone());
        let call = Rvalue::Call {
            member: binding.acquisition.member.clone(),
            receiver: Some(Box::new(collection)),
            args: arguments(&binding.acquisition.args),
        };
        let value = suspend_if(call, binding.acquisition.is_suspending);
        self.builder.push(Operation::Capture { id: t0, value });
        if binding.acquisition.is_suspending {
            suspension::annotate(&mut self.builder, entry, tree.id, SuspensionSite::Acquisition);
        }
        Cursor { t0, index: None }
    }

    fn advance(&self, binding: &IterationBinding, cursor: Cursor) -> Rvalue {
        let args = match cursor.index {
            Some(index) => vec![Value::Local(index)],
            None => arguments(&binding.advance.args),
        };
        let call = Rvalue::Call {
            member: binding.advance.member.clone(),
            receiver: Some(Box::new(Rvalue::Use(Value::Capture(cursor.t0)))),
            args,
        };
        suspend_if(call, binding.advance.is_suspending)
    }

    /// The element read. Only a `ref`/`ref readonly` variable aliases the
    /// element; every other target gets a copy.
    fn current(&self, binding: &IterationBinding, cursor: Cursor, target: &ElementTarget) -> Rvalue {
        let call = Rvalue::Call {
            member: binding.current.member.clone(),
            receiver: Some(Box::new(Rvalue::Use(Value::Capture(cursor.t0)))),
            args: cursor.index.map(Value::Local).into_iter().collect(),
        };
        match target {
            ElementTarget::SingleVariable(var) if binding.current.is_by_ref && var.ref_kind != RefKind::Value => {
                Rvalue::ElementRef {
                    value: Box::new(call),
                    read_only: binding.current.is_read_only_ref || var.ref_kind == RefKind::RefReadOnly,
                }
            }
            _ => call,
        }
    }

    /// Finally handler body: optional null guard, then the disposal call.
    fn emit_disposal(&mut self, loop_id: NodeId, disposal: &Disposal, t0: CaptureId) {
        self.builder.create_block();
        let target = match &disposal.conversion {
            Some(conversion) if !conversion.is_identity() => {
                let t = self.builder.capture(conversion.to.clone());
                let value = converted(Rvalue::Use(Value::Capture(t0)), conversion);
                self.builder.push(Operation::Capture { id: t, value });
                Value::Capture(t)
            }
            _ => Value::Capture(t0),
        };

        let end = if disposal.requires_null_guard {
            let call_block = self.builder.reserve_block();
            let end = self.builder.reserve_block();
            self.builder.terminate(Terminator::ConditionalGoto {
                condition: Rvalue::IsNull(target.clone()),
                jump_if_true: true,
                target: Edge::to(end),
                fallthrough: Edge::to(call_block),
            });
            self.builder.place_block(call_block);
            Some(end)
        } else {
            None
        };

        let call = Rvalue::Call {
            member: disposal.member.clone(),
            receiver: Some(Box::new(Rvalue::Use(target))),
            args: arguments(&disposal.args),
        };
        self.builder.push(Operation::Eval(suspend_if(call, disposal.is_suspending)));
        if disposal.is_suspending {
            let block = self.builder.current_block();
            suspension::annotate(&mut self.builder, block, loop_id, SuspensionSite::Disposal);
        }

        if let Some(end) = end {
            self.builder.goto(end);
            self.builder.place_block(end);
        }
        self.builder.terminate(Terminator::EndFinally);
    }

    // ── Element binding ─────────────────────────────────────────────

    fn bind_element(&mut self, target: &ElementTarget, conversion: &ElementConversion, value: Rvalue) {
        let op = match target {
            ElementTarget::Destructuring { .. } => Operation::Deconstruct { pattern: self.pattern(target, conversion), value },
            _ => {
                let (place, leaf) = self.leaf(target, conversion);
                Operation::Assign { place, value: converted(value, &leaf) }
            }
        };
        self.builder.push(op);
    }

    fn pattern(&mut self, target: &ElementTarget, conversion: &ElementConversion) -> Pattern {
        match (target, conversion) {
            (ElementTarget::Destructuring { elements, .. }, ElementConversion::Deconstruct { from, elements: parts }) => {
                Pattern::Tuple {
                    from: from.clone(),
                    elements: elements.iter().zip(parts).map(|(t, c)| self.pattern(t, c)).collect(),
                }
            }
            _ => {
                let (place, conversion) = self.leaf(target, conversion);
                Pattern::Bind { place, conversion }
            }
        }
    }

    /// Destination of one leaf, declaring fresh variables in the body scope.
    fn leaf(&mut self, target: &ElementTarget, conversion: &ElementConversion) -> (Place, Conversion) {
        let conversion = match conversion {
            ElementConversion::Leaf(c) => c.clone(),
            ElementConversion::Deconstruct { from, .. } => Conversion::invalid(from.clone(), Type::Error),
        };
        let place = match target {
            ElementTarget::SingleVariable(var) if var.is_declaration => {
                Place::Local(self.declare_element(var, &conversion))
            }
            ElementTarget::SingleVariable(var) => match self.lookup_variable(&var.name) {
                Some(local) => Place::Local(local),
                None => Place::Named(var.name.clone()),
            },
            ElementTarget::AssignableExpression { expr, .. } => Place::Expr { node: expr.id, text: expr.describe() },
            ElementTarget::Discard(_) | ElementTarget::Destructuring { .. } => Place::Discard,
        };
        (place, conversion)
    }

    fn declare_element(&mut self, var: &VariableTarget, conversion: &Conversion) -> LocalId {
        let ty = var.declared_type.clone().unwrap_or_else(|| conversion.to.clone());
        let local = self.builder.declare_local(Some(var.name.clone()), ty, var.ref_kind);
        self.declare_variable(&var.name, local);
        local
    }
}

fn converted(value: Rvalue, conversion: &Conversion) -> Rvalue {
    if !conversion.is_valid() {
        Rvalue::Use(Value::Invalid)
    } else if conversion.is_identity() {
        value
    } else {
        Rvalue::Convert { value: Box::new(value), conversion: conversion.clone() }
    }
}

fn suspend_if(call: Rvalue, is_suspending: bool) -> Rvalue {
    if is_suspending {
        Rvalue::Await(Box::new(call))
    } else {
        call
    }
}

fn arguments(args: &ArgumentList) -> Vec<Value> {
    args.iter()
        .map(|arg| match &arg.value {
            ArgValue::Const(c) => Value::Const(c.clone()),
            ArgValue::EmptyCollection(elem) => Value::EmptyCollection(elem.clone()),
            // Loop call sites never supply arguments.
            ArgValue::Supplied(_) => Value::Invalid,
        })
        .collect()
}
