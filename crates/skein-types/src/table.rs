// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Central type registry.

use std::collections::HashMap;

use indexmap::IndexMap;
use skein_ast::{NodeId, RefKind};

use crate::errors::TypeError;
use crate::types::{Capability, ConstValue, Type, TypeClass, TypeId};

/// Unique identifier for a member (method or property) in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Property,
}

/// Where a member is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOwner {
    Type(TypeId),
    /// Synthesized member of a well-known interface; `generic` selects the
    /// instantiated form.
    Capability { cap: Capability, generic: bool },
    /// Extension member declared in the extension scope at this index.
    Extension(usize),
}

/// Compiler-supplied value for a parameter marked with caller information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerInfo {
    MemberName,
    LineNumber,
    FilePath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub ty: Type,
    pub default: Option<ConstValue>,
    pub caller_info: Option<CallerInfo>,
    /// Variadic tail (`params T[] xs`); `ty` is the array type.
    pub is_params: bool,
}

impl ParamDef {
    pub fn required(name: &str, ty: Type) -> Self {
        Self { name: name.to_string(), ty, default: None, caller_info: None, is_params: false }
    }

    pub fn optional(name: &str, ty: Type, default: ConstValue) -> Self {
        Self { default: Some(default), ..Self::required(name, ty) }
    }

    pub fn caller(name: &str, ty: Type, info: CallerInfo, default: ConstValue) -> Self {
        Self { caller_info: Some(info), ..Self::optional(name, ty, default) }
    }

    pub fn params(name: &str, elem: Type) -> Self {
        Self { is_params: true, ..Self::required(name, Type::array(elem)) }
    }

    /// Can be left out at a call site.
    pub fn is_optional(&self) -> bool {
        self.default.is_some() || self.caller_info.is_some() || self.is_params
    }
}

/// Member signature, before it is registered on an owner.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSig {
    pub name: String,
    pub kind: MemberKind,
    pub is_static: bool,
    pub params: Vec<ParamDef>,
    pub ret: Type,
    pub ret_ref: RefKind,
}

impl MemberSig {
    pub fn method(name: &str, params: Vec<ParamDef>, ret: Type) -> Self {
        Self {
            name: name.to_string(),
            kind: MemberKind::Method,
            is_static: false,
            params,
            ret,
            ret_ref: RefKind::Value,
        }
    }

    pub fn property(name: &str, ty: Type) -> Self {
        Self { kind: MemberKind::Property, ..Self::method(name, Vec::new(), ty) }
    }

    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn returning_ref(mut self, ref_kind: RefKind) -> Self {
        self.ret_ref = ref_kind;
        self
    }
}

/// A registered member.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDef {
    pub id: MemberId,
    pub owner: MemberOwner,
    pub name: String,
    pub kind: MemberKind,
    pub is_static: bool,
    pub params: Vec<ParamDef>,
    pub ret: Type,
    pub ret_ref: RefKind,
}

/// A user-defined type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub id: TypeId,
    pub name: String,
    pub kind: TypeKind,
    pub sealed: bool,
    pub ref_like: bool,
    pub base: Option<TypeId>,
    pub interfaces: Vec<Type>,
    pub members: IndexMap<String, Vec<MemberId>>,
}

/// Extension members brought into scope by one lexical scope.
#[derive(Debug, Clone)]
pub struct ExtensionScope {
    pub name: String,
    pub members: IndexMap<String, Vec<MemberId>>,
}

/// Static types the outer binder attached to expressions.
///
/// An expression with no entry is typeless (the bare `null` literal).
#[derive(Debug, Clone, Default)]
pub struct NodeTypes {
    types: HashMap<NodeId, Type>,
}

impl NodeTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: NodeId, ty: Type) {
        self.types.insert(id, ty);
    }

    pub fn get(&self, id: NodeId) -> Option<&Type> {
        self.types.get(&id)
    }
}

/// Central registry of all types and members.
///
/// Read-only once built; lookups take `&self` so one table can be shared
/// across threads lowering different method bodies.
#[derive(Debug)]
pub struct TypeTable {
    types: Vec<TypeDef>,
    type_names: HashMap<String, TypeId>,
    /// Built-in type names mapped to Type.
    pub(crate) builtins: HashMap<String, Type>,
    members: Vec<MemberDef>,
    capability_members: HashMap<(Capability, bool), IndexMap<String, Vec<MemberId>>>,
    /// Outermost first.
    extension_scopes: Vec<ExtensionScope>,
    cancellation_token: TypeId,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            type_names: HashMap::new(),
            builtins: HashMap::new(),
            members: Vec::new(),
            capability_members: HashMap::new(),
            extension_scopes: Vec::new(),
            cancellation_token: TypeId(0),
        };
        table.register_builtins();
        table
    }

    fn register_builtins(&mut self) {
        for (name, ty) in [
            ("()", Type::Unit),
            ("bool", Type::Bool),
            ("char", Type::Char),
            ("i8", Type::I8),
            ("i16", Type::I16),
            ("i32", Type::I32),
            ("i64", Type::I64),
            ("u8", Type::U8),
            ("u16", Type::U16),
            ("u32", Type::U32),
            ("u64", Type::U64),
            ("f32", Type::F32),
            ("f64", Type::F64),
            ("int", Type::I32),
            ("long", Type::I64),
            ("string", Type::String),
            ("object", Type::Object),
            ("dynamic", Type::Dynamic),
        ] {
            self.builtins.insert(name.to_string(), ty);
        }

        let token = TypeDef {
            id: TypeId(self.types.len() as u32),
            name: "CancellationToken".to_string(),
            kind: TypeKind::Struct,
            sealed: true,
            ref_like: false,
            base: None,
            interfaces: Vec::new(),
            members: IndexMap::new(),
        };
        self.cancellation_token = token.id;
        self.type_names.insert(token.name.clone(), token.id);
        self.types.push(token);

        let token_ty = Type::Named(self.cancellation_token);
        let enumerator_t = Type::enumerator(Type::Elem);
        let async_enumerator_t = Type::async_enumerator(Type::Elem);
        let capability_sigs = [
            (Capability::Enumerable, true, MemberSig::method("get_enumerator", vec![], enumerator_t)),
            (
                Capability::Enumerable,
                false,
                MemberSig::method("get_enumerator", vec![], Type::capability(Capability::Enumerator)),
            ),
            (Capability::Enumerator, true, MemberSig::property("current", Type::Elem)),
            (Capability::Enumerator, false, MemberSig::method("move_next", vec![], Type::Bool)),
            (Capability::Enumerator, false, MemberSig::property("current", Type::Object)),
            (
                Capability::AsyncEnumerable,
                true,
                MemberSig::method(
                    "get_async_enumerator",
                    vec![ParamDef::optional("token", token_ty.clone(), ConstValue::Default(token_ty))],
                    async_enumerator_t,
                ),
            ),
            (
                Capability::AsyncEnumerator,
                true,
                MemberSig::method("move_next_async", vec![], Type::awaitable(Type::Bool)),
            ),
            (Capability::AsyncEnumerator, true, MemberSig::property("current", Type::Elem)),
            (Capability::Disposable, false, MemberSig::method("dispose", vec![], Type::Unit)),
            (
                Capability::AsyncDisposable,
                false,
                MemberSig::method("dispose_async", vec![], Type::awaitable(Type::Unit)),
            ),
        ];
        for (cap, generic, sig) in capability_sigs {
            let id = self.push_member(MemberOwner::Capability { cap, generic }, sig);
            let name = self.members[id.0 as usize].name.clone();
            self.capability_members
                .entry((cap, generic))
                .or_default()
                .entry(name)
                .or_default()
                .push(id);
        }
    }

    fn push_member(&mut self, owner: MemberOwner, sig: MemberSig) -> MemberId {
        let id = MemberId(self.members.len() as u32);
        self.members.push(MemberDef {
            id,
            owner,
            name: sig.name,
            kind: sig.kind,
            is_static: sig.is_static,
            params: sig.params,
            ret: sig.ret,
            ret_ref: sig.ret_ref,
        });
        id
    }

    /// Start defining a named type. Nothing is registered until
    /// [`TypeBuilder::finish`].
    pub fn define(&mut self, name: &str, kind: TypeKind) -> TypeBuilder<'_> {
        TypeBuilder {
            table: self,
            name: name.to_string(),
            kind,
            sealed: false,
            ref_like: false,
            base: None,
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Open an extension scope nested inside every scope opened so far.
    pub fn open_extension_scope(&mut self, name: &str) -> usize {
        self.extension_scopes.push(ExtensionScope {
            name: name.to_string(),
            members: IndexMap::new(),
        });
        self.extension_scopes.len() - 1
    }

    /// Declare an extension member; the first parameter is the receiver.
    pub fn add_extension(&mut self, scope: usize, sig: MemberSig) -> Result<MemberId, TypeError> {
        if scope >= self.extension_scopes.len() {
            return Err(TypeError::UnknownExtensionScope(scope));
        }
        if sig.params.is_empty() {
            return Err(TypeError::ExtensionWithoutReceiver { name: sig.name });
        }
        let name = sig.name.clone();
        let id = self.push_member(MemberOwner::Extension(scope), sig.with_static());
        self.extension_scopes[scope].members.entry(name).or_default().push(id);
        Ok(id)
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id.0 as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    pub fn member(&self, id: MemberId) -> Option<&MemberDef> {
        self.members.get(id.0 as usize)
    }

    pub fn cancellation_token(&self) -> Type {
        Type::Named(self.cancellation_token)
    }

    pub(crate) fn extension_scopes(&self) -> &[ExtensionScope] {
        &self.extension_scopes
    }

    /// Human-readable name, resolving named types.
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Named(id) => self
                .get(*id)
                .map(|def| def.name.clone())
                .unwrap_or_else(|| ty.to_string()),
            Type::Array(elem) => format!("[{}]", self.type_name(elem)),
            Type::Span { elem, read_only: false } => format!("span<{}>", self.type_name(elem)),
            Type::Span { elem, read_only: true } => {
                format!("readonly_span<{}>", self.type_name(elem))
            }
            Type::Tuple(elems) => {
                let parts: Vec<_> = elems.iter().map(|e| self.type_name(e)).collect();
                format!("({})", parts.join(", "))
            }
            Type::Capability { cap, arg: Some(arg) } => {
                format!("{}<{}>", cap, self.type_name(arg))
            }
            other => other.to_string(),
        }
    }

    pub fn classify(&self, ty: &Type) -> TypeClass {
        match ty {
            Type::Unit
            | Type::Bool
            | Type::Char
            | Type::I8
            | Type::I16
            | Type::I32
            | Type::I64
            | Type::U8
            | Type::U16
            | Type::U32
            | Type::U64
            | Type::F32
            | Type::F64
            | Type::Tuple(_) => TypeClass::Value,
            Type::Span { .. } => TypeClass::RefLikeValue,
            Type::String | Type::Array(_) => TypeClass::SealedRef,
            Type::Object => TypeClass::UnsealedRef,
            Type::Dynamic => TypeClass::Dynamic,
            Type::Capability { .. } => TypeClass::Interface,
            Type::Named(id) => match self.get(*id) {
                Some(def) => match def.kind {
                    TypeKind::Struct if def.ref_like => TypeClass::RefLikeValue,
                    TypeKind::Struct => TypeClass::Value,
                    TypeKind::Class if def.sealed => TypeClass::SealedRef,
                    TypeKind::Class => TypeClass::UnsealedRef,
                    TypeKind::Interface => TypeClass::Interface,
                },
                None => TypeClass::Error,
            },
            Type::Elem | Type::Error => TypeClass::Error,
        }
    }

    /// Base classes of a class type, nearest first.
    pub(crate) fn base_chain(&self, id: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut next = self.get(id).and_then(|d| d.base);
        while let Some(base) = next {
            if chain.contains(&base) || base == id {
                break;
            }
            chain.push(base);
            next = self.get(base).and_then(|d| d.base);
        }
        chain
    }

    /// Every interface `ty` implements, transitively, in declaration order.
    /// An interface type does not list itself.
    pub fn all_interfaces(&self, ty: &Type) -> Vec<Type> {
        let mut out: Vec<Type> = Vec::new();
        let mut pending: Vec<Type> = match ty {
            Type::Named(id) => {
                let mut direct = Vec::new();
                for owner in std::iter::once(*id).chain(self.base_chain(*id)) {
                    if let Some(def) = self.get(owner) {
                        direct.extend(def.interfaces.iter().cloned());
                    }
                }
                direct
            }
            Type::Capability { cap, arg } => capability_bases(*cap, arg.as_deref()),
            Type::Array(elem) => vec![Type::enumerable((**elem).clone())],
            Type::String => vec![Type::enumerable(Type::Char)],
            _ => Vec::new(),
        };
        pending.reverse();
        while let Some(iface) = pending.pop() {
            if out.contains(&iface) {
                continue;
            }
            let mut inherited = match &iface {
                Type::Named(id) => self.get(*id).map(|d| d.interfaces.clone()).unwrap_or_default(),
                Type::Capability { cap, arg } => capability_bases(*cap, arg.as_deref()),
                _ => Vec::new(),
            };
            out.push(iface);
            inherited.reverse();
            pending.extend(inherited);
        }
        out
    }

    /// `ty` is, or implements, the capability in some instantiation.
    pub fn implements(&self, ty: &Type, cap: Capability) -> bool {
        let is_cap = |t: &Type| matches!(t.as_capability(), Some((c, _)) if c == cap);
        is_cap(ty) || self.all_interfaces(ty).iter().any(is_cap)
    }

    /// Instantiations of a generic capability `ty` is or implements.
    pub fn capability_instances(&self, ty: &Type, cap: Capability) -> Vec<Type> {
        let mut out = Vec::new();
        for candidate in std::iter::once(ty.clone()).chain(self.all_interfaces(ty)) {
            if let Some((c, Some(_))) = candidate.as_capability() {
                if c == cap && !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// Member tables searched for instance lookup on `ty`, most derived
    /// first, each with the element type its signatures are instantiated at.
    pub(crate) fn instance_scopes(
        &self,
        ty: &Type,
    ) -> Vec<(&IndexMap<String, Vec<MemberId>>, Type)> {
        let mut scopes = Vec::new();
        match ty {
            Type::Named(id) => {
                let is_interface = self.get(*id).map(|d| d.kind == TypeKind::Interface);
                for owner in std::iter::once(*id).chain(self.base_chain(*id)) {
                    if let Some(def) = self.get(owner) {
                        scopes.push((&def.members, Type::Object));
                    }
                }
                if is_interface == Some(true) {
                    for iface in self.all_interfaces(ty) {
                        match &iface {
                            Type::Named(iid) => {
                                if let Some(def) = self.get(*iid) {
                                    scopes.push((&def.members, Type::Object));
                                }
                            }
                            Type::Capability { cap, arg } => {
                                self.push_capability_scope(&mut scopes, *cap, arg.as_deref())
                            }
                            _ => {}
                        }
                    }
                }
            }
            Type::Capability { cap, arg } => {
                self.push_capability_scope(&mut scopes, *cap, arg.as_deref());
                for iface in self.all_interfaces(ty) {
                    if let Some((c, a)) = iface.as_capability() {
                        self.push_capability_scope(&mut scopes, c, a);
                    }
                }
            }
            _ => {}
        }
        scopes
    }

    fn push_capability_scope<'a>(
        &'a self,
        scopes: &mut Vec<(&'a IndexMap<String, Vec<MemberId>>, Type)>,
        cap: Capability,
        arg: Option<&Type>,
    ) {
        let elem = arg.cloned().unwrap_or(Type::Object);
        if let Some(members) = self.capability_members.get(&(cap, arg.is_some())) {
            scopes.push((members, elem));
        }
    }
}

/// Interfaces a well-known interface inherits.
fn capability_bases(cap: Capability, arg: Option<&Type>) -> Vec<Type> {
    match (cap, arg) {
        (Capability::Enumerable, Some(_)) => vec![Type::capability(Capability::Enumerable)],
        (Capability::Enumerator, Some(_)) => vec![
            Type::capability(Capability::Enumerator),
            Type::capability(Capability::Disposable),
        ],
        (Capability::AsyncEnumerator, Some(_)) => {
            vec![Type::capability(Capability::AsyncDisposable)]
        }
        _ => Vec::new(),
    }
}

/// Collects a type definition before registering it.
pub struct TypeBuilder<'t> {
    table: &'t mut TypeTable,
    name: String,
    kind: TypeKind,
    sealed: bool,
    ref_like: bool,
    base: Option<TypeId>,
    interfaces: Vec<Type>,
    members: Vec<MemberSig>,
}

impl<'t> TypeBuilder<'t> {
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Stack-only struct. Implies sealed.
    pub fn ref_like(mut self) -> Self {
        self.ref_like = true;
        self.sealed = true;
        self
    }

    pub fn base(mut self, base: TypeId) -> Self {
        self.base = Some(base);
        self
    }

    pub fn implements(mut self, iface: Type) -> Self {
        self.interfaces.push(iface);
        self
    }

    pub fn member(mut self, sig: MemberSig) -> Self {
        self.members.push(sig);
        self
    }

    pub fn method(self, name: &str, params: Vec<ParamDef>, ret: Type) -> Self {
        self.member(MemberSig::method(name, params, ret))
    }

    pub fn property(self, name: &str, ty: Type) -> Self {
        self.member(MemberSig::property(name, ty))
    }

    pub fn finish(self) -> Result<TypeId, TypeError> {
        let TypeBuilder { table, name, kind, sealed, ref_like, base, interfaces, members } = self;
        if table.type_names.contains_key(&name) || table.builtins.contains_key(&name) {
            return Err(TypeError::DuplicateType(name));
        }
        if ref_like && kind != TypeKind::Struct {
            return Err(TypeError::RefLikeNotStruct(name));
        }
        if let Some(base) = base {
            if table.get(base).map(|d| d.kind) != Some(TypeKind::Class) || kind != TypeKind::Class {
                return Err(TypeError::InvalidBase { name });
            }
        }
        let id = TypeId(table.types.len() as u32);
        let mut member_map: IndexMap<String, Vec<MemberId>> = IndexMap::new();
        for sig in members {
            let member_name = sig.name.clone();
            let mid = table.push_member(MemberOwner::Type(id), sig);
            member_map.entry(member_name).or_default().push(mid);
        }
        table.type_names.insert(name.clone(), id);
        table.types.push(TypeDef {
            id,
            name,
            kind,
            sealed: sealed || kind == TypeKind::Struct,
            ref_like,
            base,
            interfaces,
            members: member_map,
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_is_registered() {
        let table = TypeTable::new();
        let token = table.lookup("CancellationToken").unwrap();
        assert_eq!(table.cancellation_token(), Type::Named(token));
        assert_eq!(table.classify(&Type::Named(token)), TypeClass::Value);
    }

    #[test]
    fn classify_named_kinds() {
        let mut table = TypeTable::new();
        let open = table.define("Open", TypeKind::Class).finish().unwrap();
        let closed = table.define("Closed", TypeKind::Class).sealed().finish().unwrap();
        let view = table.define("View", TypeKind::Struct).ref_like().finish().unwrap();
        let iface = table.define("IThing", TypeKind::Interface).finish().unwrap();
        assert_eq!(table.classify(&Type::Named(open)), TypeClass::UnsealedRef);
        assert_eq!(table.classify(&Type::Named(closed)), TypeClass::SealedRef);
        assert_eq!(table.classify(&Type::Named(view)), TypeClass::RefLikeValue);
        assert_eq!(table.classify(&Type::Named(iface)), TypeClass::Interface);
        assert_eq!(table.classify(&Type::array(Type::I32)), TypeClass::SealedRef);
        assert_eq!(table.classify(&Type::Dynamic), TypeClass::Dynamic);
    }

    #[test]
    fn duplicate_type_rejected() {
        let mut table = TypeTable::new();
        table.define("Bag", TypeKind::Class).finish().unwrap();
        let err = table.define("Bag", TypeKind::Struct).finish().unwrap_err();
        assert!(matches!(err, TypeError::DuplicateType(name) if name == "Bag"));
        assert!(table.define("string", TypeKind::Class).finish().is_err());
    }

    #[test]
    fn interfaces_are_transitive_and_inherited() {
        let mut table = TypeTable::new();
        let ilist = table
            .define("IList", TypeKind::Interface)
            .implements(Type::enumerable(Type::I32))
            .finish()
            .unwrap();
        let base = table.define("Base", TypeKind::Class).implements(Type::Named(ilist)).finish().unwrap();
        let derived = table.define("Derived", TypeKind::Class).base(base).finish().unwrap();

        let all = table.all_interfaces(&Type::Named(derived));
        assert_eq!(
            all,
            vec![
                Type::Named(ilist),
                Type::enumerable(Type::I32),
                Type::capability(Capability::Enumerable),
            ]
        );
        assert!(table.implements(&Type::Named(derived), Capability::Enumerable));
        assert!(!table.implements(&Type::Named(derived), Capability::Disposable));
        assert_eq!(
            table.capability_instances(&Type::Named(derived), Capability::Enumerable),
            vec![Type::enumerable(Type::I32)]
        );
    }

    #[test]
    fn generic_enumerator_is_disposable() {
        let table = TypeTable::new();
        assert!(table.implements(&Type::enumerator(Type::String), Capability::Disposable));
        assert!(!table.implements(&Type::capability(Capability::Enumerator), Capability::Disposable));
        assert!(table.implements(&Type::async_enumerator(Type::I32), Capability::AsyncDisposable));
    }

    #[test]
    fn type_names_resolve_named() {
        let mut table = TypeTable::new();
        let bag = table.define("Bag", TypeKind::Class).finish().unwrap();
        assert_eq!(
            table.type_name(&Type::enumerable(Type::array(Type::Named(bag)))),
            "Enumerable<[Bag]>"
        );
    }

    #[test]
    fn extension_requires_receiver() {
        let mut table = TypeTable::new();
        let scope = table.open_extension_scope("Ext");
        let err = table
            .add_extension(scope, MemberSig::method("get_enumerator", vec![], Type::Unit))
            .unwrap_err();
        assert!(matches!(err, TypeError::ExtensionWithoutReceiver { .. }));
        assert!(matches!(
            table.add_extension(7, MemberSig::method("x", vec![], Type::Unit)),
            Err(TypeError::UnknownExtensionScope(7))
        ));
    }
}
