// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! End-to-end lowering of method bodies containing loops.

use pretty_assertions::assert_eq;
use skein_ast::{Expr, ExprKind, ForEach, ForTarget, NodeId, RefKind, Span, Stmt, StmtKind};
use skein_bind::{BindDiagnostic, DiagnosticBag, IterationConfig, LoweringErrorKind, MemberRef};
use skein_cfg::analysis::{reachable_blocks, validate};
use skein_cfg::transform::suspension;
use skein_cfg::{
    BlockId, ControlFlowGraph, Local, LoweringContext, Operation, Place, RegionId, RegionKind, Rvalue,
    SuspensionSite, Terminator,
};
use skein_types::{Capability, NodeTypes, Type, TypeKind, TypeTable};

/// Hands out node ids and records the static types the outer binder would.
#[derive(Default)]
struct Ast {
    next: u32,
    types: NodeTypes,
}

impl Ast {
    fn id(&mut self) -> NodeId {
        self.next += 1;
        NodeId(self.next)
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        let id = self.id();
        Expr::new(id, kind, Span::new(0, 1))
    }

    /// An outer variable of static type `ty`.
    fn var(&mut self, name: &str, ty: Type) -> Expr {
        let e = self.expr(ExprKind::Ident(name.into()));
        self.types.record(e.id, ty);
        e
    }

    fn call(&mut self, func: &str, arg: &str) -> Stmt {
        let func = self.expr(ExprKind::Ident(func.into()));
        let arg = self.expr(ExprKind::Ident(arg.into()));
        let call = self.expr(ExprKind::Call { func: Box::new(func), args: vec![arg] });
        self.stmt(StmtKind::Expr(call))
    }

    fn stmt(&mut self, kind: StmtKind) -> Stmt {
        let id = self.id();
        Stmt::new(id, kind, Span::new(0, 1))
    }

    fn foreach(&mut self, label: Option<&str>, is_async: bool, target: ForTarget, iter: Expr, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::ForEach(ForEach {
            label: label.map(str::to_string),
            is_async,
            target,
            iter,
            body,
        }))
    }
}

fn decl(name: &str) -> ForTarget {
    ForTarget::Declaration { name: name.into(), ty: None, ref_kind: RefKind::Value, span: Span::new(0, 1) }
}

fn lower(table: &TypeTable, ast: &Ast, body: &[Stmt]) -> (ControlFlowGraph, Vec<BindDiagnostic>) {
    let config = IterationConfig::default();
    let bag = DiagnosticBag::new();
    let ctx = LoweringContext {
        oracle: table,
        node_types: &ast.types,
        config: &config,
        sink: &bag,
        file_path: "/work/main.sk",
        line_map: None,
    };
    let graph = skein_cfg::lower_method("run", body, ctx);
    (graph, bag.into_vec())
}

/// A class implementing the generic enumerable capability only.
fn list_type(table: &mut TypeTable) -> Type {
    let list = table.define("List", TypeKind::Class).implements(Type::enumerable(Type::I32)).finish().unwrap();
    Type::Named(list)
}

fn count<T>(g: &ControlFlowGraph, kind: T) -> usize
where
    T: Fn(&Rvalue) -> bool,
{
    g.blocks_in_order()
        .flat_map(|b| b.operations.iter().map(Operation::rvalue))
        .filter(|rv| kind(rv))
        .count()
}

fn calls(name: &'static str) -> impl Fn(&Rvalue) -> bool {
    move |rv| rv.called_member().is_some_and(|m| m.name() == name)
}

fn has_null_guard(g: &ControlFlowGraph) -> bool {
    g.blocks_in_order()
        .any(|b| matches!(&b.terminator, Terminator::ConditionalGoto { condition: Rvalue::IsNull(_), .. }))
}

/// The loop head: the block branching on the advance call.
fn condition_blocks(g: &ControlFlowGraph) -> Vec<BlockId> {
    g.blocks_in_order()
        .filter(|b| match &b.terminator {
            Terminator::ConditionalGoto { condition, .. } => condition
                .called_member()
                .is_some_and(|m| m.name().starts_with("move_next") || m.name() == "advance"),
            _ => false,
        })
        .map(|b| b.id)
        .collect()
}

fn exhausted_edge(g: &ControlFlowGraph, cond: BlockId) -> skein_cfg::Edge {
    match &g.block(cond).terminator {
        Terminator::ConditionalGoto { target, jump_if_true: false, .. } => target.clone(),
        other => panic!("not a loop head: {:?}", other),
    }
}

/// The assignment binding the element to the loop variable `name`.
fn element_read<'g>(g: &'g ControlFlowGraph, name: &str) -> (&'g Local, &'g Rvalue) {
    g.blocks_in_order()
        .flat_map(|b| b.operations.iter())
        .find_map(|op| match op {
            Operation::Assign { place: Place::Local(id), value } if g.local(*id).name.as_deref() == Some(name) => {
                Some((g.local(*id), value))
            }
            _ => None,
        })
        .expect("loop variable is assigned")
}

fn only_finally(g: &ControlFlowGraph) -> RegionId {
    let finals: Vec<RegionId> = g.regions_of_kind(RegionKind::Finally).map(|r| r.id).collect();
    assert_eq!(finals.len(), 1);
    finals[0]
}

#[test]
fn array_loop_has_no_disposal() {
    let table = TypeTable::new();
    let mut ast = Ast::default();
    let items = ast.var("items", Type::array(Type::I32));
    let use_x = ast.call("use", "x");
    let body = vec![ast.foreach(None, false, decl("x"), items, vec![use_x])];
    let (g, diags) = lower(&table, &ast, &body);

    assert_eq!(diags, vec![]);
    assert_eq!(g.regions_of_kind(RegionKind::TryFinally).count(), 0);
    assert!(!has_null_guard(&g));
    assert_eq!(count(&g, calls("dispose")), 0);
    assert_eq!(validate(&g), vec![]);

    let expected = "\
method run {
  r1: locals in r0, _0: i32, t0: [i32]
  r2: locals in r1, x: i32 (_1)

  bb0:
    goto bb4
  bb4: r1
    t0 = items
    _0 = t0.start()
    goto bb3
  bb3: r1
    if !(t0.advance(_0)) goto bb2 else bb5
  bb5: r2
    _1 = t0.current(_0)
    use(x)
    goto bb3
  bb2:
    return -> bb1
  bb1:
    exit
}";
    assert_eq!(g.to_string(), expected);
}

#[test]
fn capability_enumerator_is_disposed_with_a_null_guard() {
    let mut table = TypeTable::new();
    let list = list_type(&mut table);
    let mut ast = Ast::default();
    let items = ast.var("items", list);
    let body = vec![ast.foreach(None, false, decl("x"), items, vec![])];
    let (g, diags) = lower(&table, &ast, &body);

    assert_eq!(diags, vec![]);
    assert_eq!(g.regions_of_kind(RegionKind::TryFinally).count(), 1);
    let finally = only_finally(&g);
    assert_eq!(count(&g, calls("dispose")), 1);
    assert!(has_null_guard(&g));

    // The guard and the call both live in the handler.
    for block in g.blocks_in_order() {
        let disposes = block.operations.iter().any(|op| calls("dispose")(op.rvalue()));
        let guards = matches!(&block.terminator, Terminator::ConditionalGoto { condition: Rvalue::IsNull(_), .. });
        if disposes || guards {
            assert!(g.is_within(block.region, finally));
        }
    }

    let conds = condition_blocks(&g);
    assert_eq!(conds.len(), 1);
    let exhausted = exhausted_edge(&g, conds[0]);
    assert_eq!(exhausted.finalizing, vec![finally]);
    assert_eq!(validate(&g), vec![]);
    assert!(reachable_blocks(&g).contains(&g.region(finally).first_block.unwrap()));
}

#[test]
fn break_runs_the_disposal_once() {
    let mut table = TypeTable::new();
    let list = list_type(&mut table);
    let mut ast = Ast::default();
    let items = ast.var("items", list);
    let brk = ast.stmt(StmtKind::Break(None));
    let body = vec![ast.foreach(None, false, decl("x"), items, vec![brk])];
    let (g, diags) = lower(&table, &ast, &body);

    assert_eq!(diags, vec![]);
    let finally = only_finally(&g);
    let exit = exhausted_edge(&g, condition_blocks(&g)[0]).target;
    let into_exit: Vec<_> = g.edges().filter(|(_, e)| e.target == exit).map(|(_, e)| e.clone()).collect();
    // The exhausted edge and the break.
    assert_eq!(into_exit.len(), 2);
    for edge in into_exit {
        assert_eq!(edge.finalizing, vec![finally]);
    }
    assert_eq!(count(&g, calls("dispose")), 1);
    assert_eq!(validate(&g), vec![]);
}

#[test]
fn async_value_enumerator_disposal_suspends() {
    let mut table = TypeTable::new();
    let cursor = table
        .define("AsyncCursor", TypeKind::Struct)
        .implements(Type::capability(Capability::AsyncDisposable))
        .method("move_next_async", vec![], Type::awaitable(Type::Bool))
        .property("current", Type::I32)
        .method("dispose_async", vec![], Type::awaitable(Type::Unit))
        .finish()
        .unwrap();
    let stream = table
        .define("Stream", TypeKind::Class)
        .sealed()
        .method("get_async_enumerator", vec![], Type::Named(cursor))
        .finish()
        .unwrap();

    let mut ast = Ast::default();
    let items = ast.var("items", Type::Named(stream));
    let use_x = ast.call("use", "x");
    let stmt = ast.foreach(None, true, decl("x"), items, vec![use_x]);
    let loop_id = stmt.id;
    let (g, diags) = lower(&table, &ast, &[stmt]);

    assert_eq!(diags, vec![]);
    assert!(!has_null_guard(&g));
    let finally = only_finally(&g);
    assert_eq!(count(&g, |rv| rv.is_await() && calls("dispose_async")(rv)), 1);

    let sites: Vec<SuspensionSite> = g.suspensions.iter().map(|p| p.site).collect();
    assert_eq!(sites, vec![SuspensionSite::Advance, SuspensionSite::Disposal]);
    let points = suspension::points_for_loop(&g, loop_id);
    assert_eq!(points.len(), 2);
    assert!(g.is_within(g.block(points[1].block).region, finally));
    assert_eq!(points[0].block, condition_blocks(&g)[0]);
    assert_eq!(suspension::verify(&g), Ok(()));
    assert_eq!(validate(&g), vec![]);
}

#[test]
fn destructuring_declares_one_scope_and_continue_leaves_it() {
    let table = TypeTable::new();
    let mut ast = Ast::default();
    let elem = Type::Tuple(vec![Type::String, Type::Tuple(vec![Type::I32, Type::Bool])]);
    let items = ast.var("items", Type::array(elem));
    let target = ForTarget::Tuple {
        elements: vec![
            decl("a"),
            ForTarget::Tuple { elements: vec![decl("b"), decl("c")], span: Span::new(0, 1) },
        ],
        span: Span::new(0, 1),
    };
    let cont = ast.stmt(StmtKind::Continue(None));
    let body = vec![ast.foreach(None, false, target, items, vec![cont])];
    let (g, diags) = lower(&table, &ast, &body);

    assert_eq!(diags, vec![]);
    let scopes: Vec<_> = g
        .regions_of_kind(RegionKind::LocalsScope)
        .filter(|r| r.locals.iter().any(|l| g.local(*l).name.is_some()))
        .collect();
    assert_eq!(scopes.len(), 1);
    let scope = scopes[0];
    let names: Vec<_> = scope.locals.iter().filter_map(|l| g.local(*l).name.clone()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(g.local(scope.locals[1]).ty, Type::I32);

    let deconstructs = g
        .blocks_in_order()
        .flat_map(|b| &b.operations)
        .filter(|op| matches!(op, Operation::Deconstruct { .. }))
        .count();
    assert_eq!(deconstructs, 1);

    let cond = condition_blocks(&g)[0];
    let back_edges: Vec<_> = g
        .edges()
        .filter(|(src, e)| e.target == cond && g.is_within(g.block(*src).region, scope.id))
        .map(|(_, e)| e.clone())
        .collect();
    assert!(!back_edges.is_empty());
    for edge in back_edges {
        assert_eq!(edge.leaving, vec![scope.id]);
        assert!(edge.finalizing.is_empty());
    }
    assert_eq!(validate(&g), vec![]);
}

#[test]
fn dynamic_collection_uses_deferred_members() {
    let table = TypeTable::new();
    let mut ast = Ast::default();
    let items = ast.var("items", Type::Dynamic);
    let body = vec![ast.foreach(None, false, decl("x"), items, vec![])];
    let (g, diags) = lower(&table, &ast, &body);

    assert_eq!(diags, vec![]);
    assert!(has_null_guard(&g));
    assert_eq!(g.regions_of_kind(RegionKind::TryFinally).count(), 1);
    let deferred = count(&g, |rv| matches!(rv.called_member(), Some(MemberRef::Deferred { .. })));
    // Acquisition, current and disposal; advance sits in the terminator.
    assert_eq!(deferred, 3);
    let cond = condition_blocks(&g)[0];
    assert!(matches!(
        &g.block(cond).terminator,
        Terminator::ConditionalGoto { condition, .. }
            if matches!(condition.called_member(), Some(MemberRef::Deferred { .. }))
    ));
    assert_eq!(validate(&g), vec![]);
}

#[test]
fn labelled_break_leaves_both_loops() {
    let mut table = TypeTable::new();
    let list = list_type(&mut table);
    let mut ast = Ast::default();
    let outer_items = ast.var("lists", list);
    let inner_items = ast.var("values", Type::array(Type::I32));
    let brk = ast.stmt(StmtKind::Break(Some("outer".into())));
    let inner = ast.foreach(None, false, decl("y"), inner_items, vec![brk]);
    let body = vec![ast.foreach(Some("outer"), false, decl("x"), outer_items, vec![inner])];
    let (g, diags) = lower(&table, &ast, &body);

    assert_eq!(diags, vec![]);
    let finally = only_finally(&g);
    let conds = condition_blocks(&g);
    assert_eq!(conds.len(), 2);
    let outer_exit = exhausted_edge(&g, conds[0]).target;

    let breaks: Vec<_> = g
        .edges()
        .filter(|(src, e)| e.target == outer_exit && *src != conds[0])
        .map(|(_, e)| e.clone())
        .collect();
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].finalizing, vec![finally]);
    // Both body scopes, the inner pre-header scope, try, try/finally and the
    // outer pre-header scope.
    assert_eq!(breaks[0].leaving.len(), 6);
    assert_eq!(validate(&g), vec![]);
}

#[test]
fn return_and_throw_run_the_handler() {
    let mut table = TypeTable::new();
    let list = list_type(&mut table);
    let mut ast = Ast::default();

    let items = ast.var("items", list.clone());
    let ret = ast.stmt(StmtKind::Return(None));
    let body = vec![ast.foreach(None, false, decl("x"), items, vec![ret])];
    let (g, _) = lower(&table, &ast, &body);
    let finally = only_finally(&g);
    let returns: Vec<_> = g
        .blocks_in_order()
        .filter_map(|b| match &b.terminator {
            Terminator::Return { edge, .. } if !edge.leaving.is_empty() => Some(edge.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].target, g.exit);
    assert_eq!(returns[0].finalizing, vec![finally]);

    let items = ast.var("items", list);
    let err = ast.expr(ExprKind::Opaque("new Error()".into()));
    let throw = ast.stmt(StmtKind::Throw(err));
    let body = vec![ast.foreach(None, false, decl("x"), items, vec![throw])];
    let (g, _) = lower(&table, &ast, &body);
    let finally = only_finally(&g);
    let thrower = g
        .blocks_in_order()
        .find(|b| matches!(b.terminator, Terminator::Throw(_)))
        .map(|b| b.id)
        .unwrap();
    assert_eq!(g.unwind_handlers(thrower), vec![finally]);
    assert_eq!(validate(&g), vec![]);
}

#[test]
fn transfers_without_a_loop_are_reported() {
    let table = TypeTable::new();
    let mut ast = Ast::default();
    let items = ast.var("items", Type::array(Type::I32));
    let brk = ast.stmt(StmtKind::Break(Some("missing".into())));
    let cont = ast.stmt(StmtKind::Continue(None));
    let body = vec![ast.foreach(None, false, decl("x"), items, vec![brk]), cont];
    let (g, diags) = lower(&table, &ast, &body);

    let kinds: Vec<_> = diags
        .iter()
        .map(|d| match d {
            BindDiagnostic::Lowering(e) => e.kind.clone(),
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            LoweringErrorKind::UnknownLoopLabel { label: "missing".into(), in_scope: vec![] },
            LoweringErrorKind::TransferOutsideLoop { keyword: "continue" },
        ]
    );
    assert_eq!(validate(&g), vec![]);
}

#[test]
fn null_collection_still_lowers() {
    let table = TypeTable::new();
    let mut ast = Ast::default();
    let null = ast.expr(ExprKind::Null);
    let body = vec![ast.foreach(None, false, decl("x"), null, vec![])];
    let (g, diags) = lower(&table, &ast, &body);

    assert!(!diags.is_empty());
    assert!(diags.iter().all(BindDiagnostic::is_error));
    assert_eq!(validate(&g), vec![]);
}

#[test]
fn methods_lower_concurrently() {
    let mut table = TypeTable::new();
    let list = list_type(&mut table);
    let mut ast = Ast::default();
    let bodies: Vec<Vec<Stmt>> = (0..4)
        .map(|i| {
            let ty = if i % 2 == 0 { list.clone() } else { Type::array(Type::I64) };
            let items = ast.var("items", ty);
            vec![ast.foreach(None, false, decl("x"), items, vec![])]
        })
        .collect();

    let config = IterationConfig::default();
    let bag = DiagnosticBag::new();
    let ctx = LoweringContext {
        oracle: &table,
        node_types: &ast.types,
        config: &config,
        sink: &bag,
        file_path: "/work/main.sk",
        line_map: None,
    };
    let graphs: Vec<ControlFlowGraph> = std::thread::scope(|s| {
        let handles: Vec<_> = bodies
            .iter()
            .enumerate()
            .map(|(i, body)| s.spawn(move || skein_cfg::lower_method(&format!("m{}", i), body, ctx)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(bag.is_empty());
    for (i, g) in graphs.iter().enumerate() {
        let expected = if i % 2 == 0 { 1 } else { 0 };
        assert_eq!(g.regions_of_kind(RegionKind::TryFinally).count(), expected);
        assert_eq!(validate(g), vec![]);
    }
}

#[test]
fn span_elements_are_copied_unless_bound_by_ref() {
    let table = TypeTable::new();
    let mut ast = Ast::default();
    let view = ast.var("view", Type::span(Type::I32));
    let by_value = ast.foreach(None, false, decl("x"), view, vec![]);
    let view = ast.var("view", Type::span(Type::I32));
    let ref_y = ForTarget::Declaration { name: "y".into(), ty: None, ref_kind: RefKind::Ref, span: Span::new(0, 1) };
    let by_ref = ast.foreach(None, false, ref_y, view, vec![]);
    let (g, diags) = lower(&table, &ast, &[by_value, by_ref]);
    assert!(diags.is_empty(), "{:?}", diags);

    let (x, read) = element_read(&g, "x");
    assert_eq!(x.ref_kind, RefKind::Value);
    assert!(matches!(read, Rvalue::Call { .. }), "copied, got {}", read);

    let (y, read) = element_read(&g, "y");
    assert_eq!(y.ref_kind, RefKind::Ref);
    assert!(matches!(read, Rvalue::ElementRef { read_only: false, .. }), "aliased, got {}", read);
}
