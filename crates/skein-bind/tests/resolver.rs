// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Iteration protocol resolution against a small type table.

use skein_ast::{Expr, ExprKind, ForEach, ForTarget, NodeId, RefKind, Span};
use skein_bind::{
    CursorOp, DiagnosticBag, ElementConversion, IterationConfig, IterationErrorKind,
    IterationResolver, LabelAllocator, LoopTree, LoopTreeBuilder, MemberRef, ProtocolKind,
    Resolution, StructuralDisposal,
};
use skein_types::{
    ArgValue, CallSiteContext, CallerInfo, Capability, ConstValue, ConversionKind, MemberOwner,
    MemberSig, NodeTypes, ParamDef, Type, TypeKind, TypeTable,
};

fn site() -> CallSiteContext {
    CallSiteContext {
        member_name: "Main".to_string(),
        file_path: "/work/main.sk".to_string(),
        line: 7,
        span: Span::new(100, 140),
    }
}

fn resolve(table: &TypeTable, ty: &Type, is_async: bool) -> Resolution {
    let config = IterationConfig::default();
    IterationResolver::new(table, &config).resolve_protocol(ty, is_async, &site())
}

fn kinds(res: &Resolution) -> Vec<IterationErrorKind> {
    res.diagnostics.iter().map(|d| d.kind.clone()).collect()
}

/// Builds a loop over a collection of `ty` with the given target.
fn tree(table: &TypeTable, ty: Type, target: ForTarget, is_async: bool) -> LoopTree {
    let mut types = NodeTypes::new();
    types.record(NodeId(1), ty);
    let bag = DiagnosticBag::new();
    let mut labels = LabelAllocator::new();
    let mut builder = LoopTreeBuilder::new(table, &types, &bag);
    let foreach = ForEach {
        label: None,
        is_async,
        target,
        iter: Expr::new(NodeId(1), ExprKind::Ident("items".into()), Span::new(20, 25)),
        body: vec![],
    };
    let tree = builder.build(NodeId(0), Span::new(0, 40), &foreach, &mut labels);
    assert!(bag.is_empty(), "unexpected loop tree diagnostics: {:?}", bag.snapshot());
    tree
}

fn decl(name: &str, ty: Option<&str>, ref_kind: RefKind) -> ForTarget {
    ForTarget::Declaration {
        name: name.into(),
        ty: ty.map(str::to_string),
        ref_kind,
        span: Span::new(9, 9 + name.len()),
    }
}

/// A sealed class `Bag` whose `get_enumerator` returns `enumerator`.
fn pattern_collection(table: &mut TypeTable, enumerator: Type) -> Type {
    let bag = table
        .define("Bag", TypeKind::Class)
        .sealed()
        .method("get_enumerator", vec![], enumerator)
        .finish()
        .unwrap();
    Type::Named(bag)
}

#[test]
fn array_uses_builtin_shape() {
    let table = TypeTable::new();
    let res = resolve(&table, &Type::array(Type::I32), false);
    let b = res.binding;
    assert_eq!(b.protocol, ProtocolKind::Array);
    assert_eq!(b.element_type, Type::I32);
    assert!(b.disposal.is_none());
    assert_eq!(b.acquisition.member, MemberRef::Intrinsic(CursorOp::Start));
    assert!(!b.has_errors);
    assert!(res.diagnostics.is_empty());
}

#[test]
fn disabled_fast_paths_use_the_capability() {
    let table = TypeTable::new();
    let config = IterationConfig { builtin_fast_paths: false, ..IterationConfig::default() };
    let res = IterationResolver::new(&table, &config).resolve_protocol(&Type::String, false, &site());
    let b = res.binding;
    assert_eq!(b.protocol, ProtocolKind::InterfaceDispatch);
    assert_eq!(b.element_type, Type::Char);
    assert_eq!(b.collection_conversion.kind, ConversionKind::ImplicitReference);
    assert_eq!(b.enumerator_type, Type::enumerator(Type::Char));
    let disposal = b.disposal.expect("enumerator is disposable");
    assert!(disposal.requires_null_guard);
    assert!(!disposal.is_suspending);
}

#[test]
fn string_and_span_builtins() {
    let table = TypeTable::new();
    let s = resolve(&table, &Type::String, false).binding;
    assert_eq!(s.protocol, ProtocolKind::StringIndexed);
    assert_eq!(s.element_type, Type::Char);

    let span = resolve(&table, &Type::readonly_span(Type::I64), false).binding;
    assert_eq!(span.protocol, ProtocolKind::SpanLike);
    assert!(span.current.is_by_ref);
    assert!(span.current.is_read_only_ref);
    assert!(span.disposal.is_none());
}

#[test]
fn ref_element_over_spans() {
    let table = TypeTable::new();
    let config = IterationConfig::default();
    let resolver = IterationResolver::new(&table, &config);

    let ok = tree(&table, Type::span(Type::I32), decl("x", Some("i32"), RefKind::Ref), false);
    let res = resolver.resolve(&ok, &site());
    assert!(res.diagnostics.is_empty());

    let read_only = tree(&table, Type::readonly_span(Type::I32), decl("x", None, RefKind::Ref), false);
    let res = resolver.resolve(&read_only, &site());
    assert!(matches!(kinds(&res).as_slice(), [IterationErrorKind::InvalidRefElement { .. }]));
    assert!(res.binding.has_errors);

    let array = tree(&table, Type::array(Type::I32), decl("x", None, RefKind::RefReadOnly), false);
    let res = resolver.resolve(&array, &site());
    assert!(matches!(kinds(&res).as_slice(), [IterationErrorKind::InvalidRefElement { .. }]));
}

#[test]
fn structural_pattern_with_sealed_enumerator_has_no_disposal() {
    let mut table = TypeTable::new();
    let cursor = table
        .define("Cursor", TypeKind::Class)
        .sealed()
        .method("move_next", vec![], Type::Bool)
        .property("current", Type::String)
        .finish()
        .unwrap();
    let bag = pattern_collection(&mut table, Type::Named(cursor));
    let b = resolve(&table, &bag, false).binding;
    assert_eq!(b.protocol, ProtocolKind::StructuralPattern);
    assert_eq!(b.element_type, Type::String);
    assert!(b.disposal.is_none());
    assert!(b.collection_conversion.is_identity());
}

#[test]
fn value_enumerator_with_capability_is_disposed_unconditionally() {
    let mut table = TypeTable::new();
    let cursor = table
        .define("Cursor", TypeKind::Struct)
        .implements(Type::capability(Capability::Disposable))
        .method("move_next", vec![], Type::Bool)
        .property("current", Type::I32)
        .method("dispose", vec![], Type::Unit)
        .finish()
        .unwrap();
    let bag = pattern_collection(&mut table, Type::Named(cursor));
    let disposal = resolve(&table, &bag, false).binding.disposal.expect("disposable");
    assert!(!disposal.requires_null_guard);
    assert!(disposal.conversion.is_none());
    match &disposal.member {
        MemberRef::Member(m) => assert_eq!(m.owner, MemberOwner::Type(table.lookup("Cursor").unwrap())),
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn structural_disposal_policy() {
    let mut table = TypeTable::new();
    let view = table
        .define("ViewCursor", TypeKind::Struct)
        .ref_like()
        .method("move_next", vec![], Type::Bool)
        .property("current", Type::U8)
        .method("dispose", vec![], Type::Unit)
        .finish()
        .unwrap();
    let plain = table
        .define("PlainCursor", TypeKind::Struct)
        .method("move_next", vec![], Type::Bool)
        .property("current", Type::U8)
        .method("dispose", vec![], Type::Unit)
        .finish()
        .unwrap();
    let views = table.define("Views", TypeKind::Class).method("get_enumerator", vec![], Type::Named(view)).finish().unwrap();
    let plains = table.define("Plains", TypeKind::Class).method("get_enumerator", vec![], Type::Named(plain)).finish().unwrap();

    let view_disposal = resolve(&table, &Type::Named(views), false).binding.disposal;
    assert!(view_disposal.is_some_and(|d| !d.requires_null_guard));
    assert!(resolve(&table, &Type::Named(plains), false).binding.disposal.is_none());

    let config = IterationConfig { structural_disposal: StructuralDisposal::AllExact, ..IterationConfig::default() };
    let b = IterationResolver::new(&table, &config).resolve_protocol(&Type::Named(plains), false, &site()).binding;
    assert!(b.disposal.is_some_and(|d| !d.requires_null_guard));
}

#[test]
fn instance_pattern_wins_over_capability() {
    let mut table = TypeTable::new();
    let cursor = table
        .define("Cursor", TypeKind::Struct)
        .method("move_next", vec![], Type::Bool)
        .property("current", Type::I32)
        .finish()
        .unwrap();
    let list = table
        .define("List", TypeKind::Class)
        .implements(Type::enumerable(Type::I32))
        .method("get_enumerator", vec![], Type::Named(cursor))
        .finish()
        .unwrap();
    let b = resolve(&table, &Type::Named(list), false).binding;
    assert_eq!(b.protocol, ProtocolKind::StructuralPattern);
    assert_eq!(b.enumerator_type, Type::Named(cursor));
}

#[test]
fn inapplicable_pattern_warns_and_falls_back() {
    let mut table = TypeTable::new();
    let list = table
        .define("List", TypeKind::Class)
        .implements(Type::enumerable(Type::I32))
        .method("get_enumerator", vec![ParamDef::required("n", Type::I32)], Type::Object)
        .finish()
        .unwrap();
    let res = resolve(&table, &Type::Named(list), false);
    assert!(matches!(kinds(&res).as_slice(), [IterationErrorKind::PatternNotApplicable { .. }]));
    assert_eq!(res.binding.protocol, ProtocolKind::InterfaceDispatch);
    assert!(!res.binding.has_errors);
}

#[test]
fn extension_acquisition() {
    let mut table = TypeTable::new();
    let cursor = table
        .define("Cursor", TypeKind::Class)
        .method("move_next", vec![], Type::Bool)
        .property("current", Type::String)
        .finish()
        .unwrap();
    let range = table.define("Range", TypeKind::Struct).finish().unwrap();
    let scope = table.open_extension_scope("RangeExtensions");
    table
        .add_extension(
            scope,
            MemberSig::method(
                "get_enumerator",
                vec![ParamDef::required("self", Type::Named(range))],
                Type::Named(cursor),
            ),
        )
        .unwrap();

    let b = resolve(&table, &Type::Named(range), false).binding;
    assert_eq!(b.protocol, ProtocolKind::ExtensionSuppliedPattern);
    assert!(b.collection_conversion.is_identity());
    // Unsealed class enumerator: runtime-tested disposal.
    let disposal = b.disposal.expect("may be disposable at runtime");
    assert!(disposal.requires_null_guard);
    assert_eq!(disposal.conversion.map(|c| c.kind), Some(ConversionKind::ExplicitReference));

    let config = IterationConfig { extension_acquisition: false, ..IterationConfig::default() };
    let res = IterationResolver::new(&table, &config).resolve_protocol(&Type::Named(range), false, &site());
    assert!(matches!(kinds(&res).as_slice(), [IterationErrorKind::NoIterationProtocol { .. }]));
}

#[test]
fn two_generic_enumerables_are_ambiguous() {
    let mut table = TypeTable::new();
    let both = table
        .define("Both", TypeKind::Class)
        .implements(Type::enumerable(Type::I32))
        .implements(Type::enumerable(Type::String))
        .finish()
        .unwrap();
    let res = resolve(&table, &Type::Named(both), false);
    assert!(matches!(kinds(&res).as_slice(), [IterationErrorKind::AmbiguousAcquisition { .. }]));
    let b = res.binding;
    assert!(b.has_errors);
    assert_eq!(b.protocol, ProtocolKind::InterfaceDispatch);
    assert_eq!(b.element_type, Type::Error);
    assert!(b.disposal.is_some_and(|d| d.requires_null_guard));
}

#[test]
fn non_generic_enumerable_yields_objects() {
    let mut table = TypeTable::new();
    let legacy = table
        .define("Legacy", TypeKind::Class)
        .implements(Type::capability(Capability::Enumerable))
        .finish()
        .unwrap();
    let b = resolve(&table, &Type::Named(legacy), false).binding;
    assert_eq!(b.protocol, ProtocolKind::InterfaceDispatch);
    assert_eq!(b.element_type, Type::Object);
    assert_eq!(b.enumerator_type, Type::capability(Capability::Enumerator));
}

#[test]
fn no_protocol_recovers() {
    let table = TypeTable::new();
    let res = resolve(&table, &Type::I32, false);
    assert!(matches!(kinds(&res).as_slice(), [IterationErrorKind::NoIterationProtocol { is_async: false, .. }]));
    assert!(res.binding.has_errors);
    assert_eq!(res.binding.element_type, Type::Error);
}

#[test]
fn dynamic_defers_to_runtime() {
    let table = TypeTable::new();
    let b = resolve(&table, &Type::Dynamic, false).binding;
    assert_eq!(b.protocol, ProtocolKind::DynamicDispatch);
    assert_eq!(b.element_type, Type::Dynamic);
    assert!(matches!(b.acquisition.member, MemberRef::Deferred { ref name, fallback: Some(_) } if name == "get_enumerator"));
    assert!(matches!(b.advance.member, MemberRef::Deferred { .. }));
    assert!(matches!(b.current.member, MemberRef::Deferred { .. }));
    let disposal = b.disposal.expect("dynamic always has guarded disposal");
    assert!(disposal.requires_null_guard);
    assert!(matches!(disposal.member, MemberRef::Deferred { .. }));
    assert_eq!(b.collection_conversion.kind, ConversionKind::Dynamic);
}

#[test]
fn async_value_enumerator_disposes_with_suspension() {
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
    let b = resolve(&table, &Type::Named(stream), true).binding;
    assert_eq!(b.protocol, ProtocolKind::StructuralPattern);
    assert!(b.advance.is_suspending);
    assert!(!b.acquisition.is_suspending);
    let disposal = b.disposal.as_ref().expect("async disposable");
    assert!(!disposal.requires_null_guard);
    assert!(disposal.is_suspending);
    assert_eq!(b.suspending_sites().collect::<Vec<_>>(), vec!["advance", "disposal"]);
}

#[test]
fn async_capability_gets_cancellation_default() {
    let table = TypeTable::new();
    let b = resolve(&table, &Type::async_enumerable(Type::String), true).binding;
    assert_eq!(b.protocol, ProtocolKind::InterfaceDispatch);
    assert_eq!(b.acquisition.args.len(), 1);
    assert_eq!(
        b.acquisition.args[0].value,
        ArgValue::Const(ConstValue::Default(table.cancellation_token()))
    );
    let disposal = b.disposal.expect("async enumerators are async-disposable");
    assert!(disposal.requires_null_guard);
    assert!(disposal.is_suspending);
}

#[test]
fn arrays_are_not_async_iterable() {
    let table = TypeTable::new();
    let res = resolve(&table, &Type::array(Type::I32), true);
    assert!(matches!(kinds(&res).as_slice(), [IterationErrorKind::NoIterationProtocol { is_async: true, .. }]));
}

#[test]
fn malformed_enumerator() {
    let mut table = TypeTable::new();
    let broken = table
        .define("Broken", TypeKind::Class)
        .sealed()
        .method("move_next", vec![], Type::I32)
        .property("current", Type::I32)
        .finish()
        .unwrap();
    let bag = pattern_collection(&mut table, Type::Named(broken));
    let res = resolve(&table, &bag, false);
    match kinds(&res).as_slice() {
        [IterationErrorKind::MalformedAdvanceOrCurrentShape { member, .. }] => assert_eq!(member, "move_next"),
        other => panic!("unexpected diagnostics {:?}", other),
    }
    assert!(res.binding.has_errors);
}

#[test]
fn caller_info_is_materialized_from_the_loop_site() {
    let mut table = TypeTable::new();
    let cursor = table
        .define("Cursor", TypeKind::Class)
        .sealed()
        .method("move_next", vec![], Type::Bool)
        .property("current", Type::I32)
        .finish()
        .unwrap();
    let bag = table
        .define("Bag", TypeKind::Class)
        .method(
            "get_enumerator",
            vec![
                ParamDef::caller("caller", Type::String, CallerInfo::MemberName, ConstValue::Str(String::new())),
                ParamDef::caller("line", Type::I32, CallerInfo::LineNumber, ConstValue::Int(0)),
                ParamDef::params("extra", Type::I32),
            ],
            Type::Named(cursor),
        )
        .finish()
        .unwrap();
    let first = resolve(&table, &Type::Named(bag), false).binding;
    let values: Vec<_> = first.acquisition.args.iter().map(|a| a.value.clone()).collect();
    assert_eq!(
        values,
        vec![
            ArgValue::Const(ConstValue::Str("Main".into())),
            ArgValue::Const(ConstValue::Int(7)),
            ArgValue::EmptyCollection(Type::I32),
        ]
    );
    let second = resolve(&table, &Type::Named(bag), false).binding;
    assert_eq!(first.acquisition.args, second.acquisition.args);
}

#[test]
fn element_conversions() {
    let table = TypeTable::new();
    let config = IterationConfig::default();
    let resolver = IterationResolver::new(&table, &config);

    let widening = tree(&table, Type::array(Type::I32), decl("x", Some("i64"), RefKind::Value), false);
    let res = resolver.resolve(&widening, &site());
    assert!(matches!(
        res.binding.element_conversion,
        ElementConversion::Leaf(ref c) if c.kind == ConversionKind::ImplicitNumeric
    ));

    // Explicit conversions are allowed for the loop variable.
    let narrowing = tree(&table, Type::array(Type::I64), decl("x", Some("i8"), RefKind::Value), false);
    assert!(resolver.resolve(&narrowing, &site()).diagnostics.is_empty());

    let missing = tree(&table, Type::array(Type::I32), decl("x", Some("string"), RefKind::Value), false);
    let res = resolver.resolve(&missing, &site());
    assert!(matches!(kinds(&res).as_slice(), [IterationErrorKind::ElementConversionMissing { .. }]));
    assert!(!res.binding.element_conversion.is_valid());
    assert!(res.binding.has_errors);
}

#[test]
fn destructuring_conversions() {
    let table = TypeTable::new();
    let config = IterationConfig::default();
    let resolver = IterationResolver::new(&table, &config);
    let pattern = || ForTarget::Tuple {
        elements: vec![
            decl("a", None, RefKind::Value),
            ForTarget::Tuple {
                elements: vec![decl("b", Some("i64"), RefKind::Value), decl("c", None, RefKind::Value)],
                span: Span::new(12, 20),
            },
        ],
        span: Span::new(9, 21),
    };

    let elem = Type::Tuple(vec![Type::String, Type::Tuple(vec![Type::I32, Type::Bool])]);
    let ok = tree(&table, Type::array(elem), pattern(), false);
    let res = resolver.resolve(&ok, &site());
    assert!(res.diagnostics.is_empty());
    match &res.binding.element_conversion {
        ElementConversion::Deconstruct { elements, .. } => {
            assert_eq!(elements.len(), 2);
            assert!(matches!(&elements[1], ElementConversion::Deconstruct { elements, .. } if elements.len() == 2));
        }
        other => panic!("unexpected conversion {:?}", other),
    }

    let wrong = tree(&table, Type::array(Type::Tuple(vec![Type::I32, Type::I32, Type::I32])), pattern(), false);
    let res = resolver.resolve(&wrong, &site());
    assert!(matches!(
        kinds(&res).as_slice(),
        [IterationErrorKind::DestructuringArityMismatch { expected: 2, found: Some(3), .. }]
    ));
    assert!(res.binding.element_conversion.is_valid());
}
