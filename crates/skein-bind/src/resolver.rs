// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Iteration protocol resolution.
//!
//! Given the static type of a collection, decide how it is iterated. The
//! order of the checks matters:
//!
//! 1. `dynamic` collections defer everything to runtime.
//! 2. Arrays, strings and spans use index-based built-in shapes.
//! 3. An instance `get_enumerator` (or `get_async_enumerator`) whose result
//!    has `move_next` and `current` is used structurally.
//! 4. Failing that, extension scopes are searched, innermost first.
//! 5. Failing that, the enumerable capability the type implements.
//!
//! Resolution never fails outright. When nothing applies, an error is
//! returned alongside a placeholder binding over the non-generic enumerable
//! capability with an error-typed element.

use skein_ast::{RefKind, Span};
use skein_types::{
    ArgumentList, CallSiteContext, Capability, Conversion, MemberBinding, MemberOwner, MemberQuery,
    MemberResolution, SemanticOracle, Type, TypeClass,
};

use crate::binding::{
    Acquisition, Advance, CursorOp, Current, Disposal, ElementConversion, IterationBinding,
    MemberRef, ProtocolKind,
};
use crate::config::{IterationConfig, StructuralDisposal};
use crate::errors::IterationError;
use crate::loop_tree::{ElementTarget, LoopTree};

/// Member names of the enumeration protocol, by asynchrony.
struct ProtocolNames {
    acquire: &'static str,
    advance: &'static str,
    current: &'static str,
    enumerable: Capability,
}

const SYNC_NAMES: ProtocolNames = ProtocolNames {
    acquire: "get_enumerator",
    advance: "move_next",
    current: "current",
    enumerable: Capability::Enumerable,
};

const ASYNC_NAMES: ProtocolNames = ProtocolNames {
    acquire: "get_async_enumerator",
    advance: "move_next_async",
    current: "current",
    enumerable: Capability::AsyncEnumerable,
};

fn names(is_async: bool) -> &'static ProtocolNames {
    if is_async { &ASYNC_NAMES } else { &SYNC_NAMES }
}

fn dispose_name(cap: Capability) -> &'static str {
    if cap == Capability::AsyncDisposable { "dispose_async" } else { "dispose" }
}

/// A binding plus everything reported while producing it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub binding: IterationBinding,
    pub diagnostics: Vec<IterationError>,
}

/// Advance and current, resolved against an enumerator type.
struct EnumeratorShape {
    advance: Advance,
    current: Current,
    element: Type,
}

pub struct IterationResolver<'a> {
    oracle: &'a dyn SemanticOracle,
    config: &'a IterationConfig,
}

impl<'a> IterationResolver<'a> {
    pub fn new(oracle: &'a dyn SemanticOracle, config: &'a IterationConfig) -> Self {
        Self { oracle, config }
    }

    /// Resolve the protocol for a loop and the conversion of its elements to
    /// the loop's element target.
    pub fn resolve(&self, tree: &LoopTree, site: &CallSiteContext) -> Resolution {
        let mut resolution = self.resolve_protocol(&tree.collection.ty, tree.is_async, site);
        let element = resolution.binding.element_type.clone();
        let current = resolution.binding.current.clone();
        let conversion =
            self.element_conversion(&element, &tree.element_target, &current, &mut resolution.diagnostics);
        resolution.binding.element_conversion = conversion;
        if resolution.diagnostics.iter().any(|d| !d.is_warning()) {
            resolution.binding.has_errors = true;
        }
        resolution
    }

    /// Resolve how a collection of `collection_ty` is iterated. The element
    /// conversion of the result is the identity.
    pub fn resolve_protocol(&self, collection_ty: &Type, is_async: bool, site: &CallSiteContext) -> Resolution {
        let mut diagnostics = Vec::new();
        let binding = self.protocol(collection_ty, is_async, site, &mut diagnostics);
        tracing::debug!(
            collection = %self.oracle.display_type(collection_ty),
            protocol = %binding.protocol,
            is_async,
            disposal = ?binding.disposal.as_ref().map(|d| (d.requires_null_guard, d.is_suspending)),
            has_errors = binding.has_errors,
            "resolved iteration protocol"
        );
        Resolution { binding, diagnostics }
    }

    fn protocol(
        &self,
        ty: &Type,
        is_async: bool,
        site: &CallSiteContext,
        diags: &mut Vec<IterationError>,
    ) -> IterationBinding {
        if ty.is_error() {
            return self.recovery(ty, is_async, site);
        }
        if *ty == Type::Dynamic {
            return self.dynamic(is_async, site);
        }
        if let Some(binding) = self.builtin(ty, is_async) {
            return binding;
        }

        let names = names(is_async);
        let query = MemberQuery::method(names.acquire);

        // Capability types are iterated through the capability itself.
        if ty.as_capability().is_none() {
            match self.oracle.resolve_member(ty, query, false) {
                MemberResolution::Found(acq) if !matches!(acq.owner, MemberOwner::Capability { .. }) => {
                    return self.assemble(
                        ProtocolKind::StructuralPattern,
                        ty,
                        Conversion::identity(ty.clone()),
                        acq,
                        is_async,
                        site,
                        diags,
                    );
                }
                MemberResolution::Found(_) => {}
                MemberResolution::Ambiguous(candidates) => {
                    diags.push(self.ambiguous(ty, &candidates, site));
                    return self.recovery(ty, is_async, site);
                }
                MemberResolution::NotFound { inapplicable } => {
                    if !inapplicable.is_empty() {
                        diags.push(IterationError::pattern_not_applicable(
                            self.oracle.display_type(ty),
                            names.acquire,
                            site.span,
                        ));
                    }
                }
            }

            if self.config.extension_acquisition {
                match self.oracle.resolve_member(ty, query, true) {
                    MemberResolution::Found(acq) if acq.is_extension => {
                        let receiver = acq.receiver.clone().unwrap_or_else(|| ty.clone());
                        let conversion = self
                            .oracle
                            .resolve_conversion(ty, &receiver)
                            .unwrap_or_else(|| Conversion::invalid(ty.clone(), receiver));
                        return self.assemble(
                            ProtocolKind::ExtensionSuppliedPattern,
                            ty,
                            conversion,
                            acq,
                            is_async,
                            site,
                            diags,
                        );
                    }
                    MemberResolution::Ambiguous(candidates) if candidates.iter().all(|c| c.is_extension) => {
                        diags.push(self.ambiguous(ty, &candidates, site));
                        return self.recovery(ty, is_async, site);
                    }
                    _ => {}
                }
            }
        }

        self.interface(ty, is_async, site, diags)
    }

    fn builtin(&self, ty: &Type, is_async: bool) -> Option<IterationBinding> {
        if is_async {
            return None;
        }
        let (protocol, element, by_ref, read_only) = match ty {
            Type::Span { elem, read_only } => (ProtocolKind::SpanLike, (**elem).clone(), true, *read_only),
            Type::Array(elem) if self.config.builtin_fast_paths => {
                (ProtocolKind::Array, (**elem).clone(), false, false)
            }
            Type::String if self.config.builtin_fast_paths => (ProtocolKind::StringIndexed, Type::Char, false, false),
            _ => return None,
        };
        Some(IterationBinding {
            protocol,
            acquisition: Acquisition {
                member: MemberRef::Intrinsic(CursorOp::Start),
                args: Vec::new(),
                is_suspending: false,
            },
            advance: Advance {
                member: MemberRef::Intrinsic(CursorOp::Advance),
                args: Vec::new(),
                is_suspending: false,
            },
            current: Current {
                member: MemberRef::Intrinsic(CursorOp::Current),
                is_by_ref: by_ref,
                is_read_only_ref: read_only,
            },
            disposal: None,
            element_conversion: ElementConversion::Leaf(Conversion::identity(element.clone())),
            collection_conversion: Conversion::identity(ty.clone()),
            collection_type: ty.clone(),
            enumerator_type: Type::I32,
            element_type: element,
            is_async: false,
            has_errors: false,
        })
    }

    fn interface(
        &self,
        ty: &Type,
        is_async: bool,
        site: &CallSiteContext,
        diags: &mut Vec<IterationError>,
    ) -> IterationBinding {
        let names = names(is_async);
        let mut instances = self.oracle.capability_instances(ty, names.enumerable);
        let iface = match instances.len() {
            1 => instances.remove(0),
            0 if !is_async && self.oracle.implements(ty, Capability::Enumerable) => {
                Type::capability(Capability::Enumerable)
            }
            0 => {
                diags.push(IterationError::no_protocol(self.oracle.display_type(ty), is_async, site.span));
                return self.recovery(ty, is_async, site);
            }
            _ => {
                let candidates: Vec<String> = instances.iter().map(|t| self.oracle.display_type(t)).collect();
                diags.push(IterationError::ambiguous(self.oracle.display_type(ty), candidates, site.span));
                return self.recovery(ty, is_async, site);
            }
        };

        let conversion = self
            .oracle
            .resolve_conversion(ty, &iface)
            .unwrap_or_else(|| Conversion::invalid(ty.clone(), iface.clone()));
        match self.oracle.resolve_member(&iface, MemberQuery::method(names.acquire), false) {
            MemberResolution::Found(acq) => {
                self.assemble(ProtocolKind::InterfaceDispatch, ty, conversion, acq, is_async, site, diags)
            }
            _ => {
                diags.push(IterationError::no_protocol(self.oracle.display_type(ty), is_async, site.span));
                self.recovery(ty, is_async, site)
            }
        }
    }

    /// Complete a binding from a chosen acquisition member.
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        protocol: ProtocolKind,
        ty: &Type,
        collection_conversion: Conversion,
        acq: MemberBinding,
        is_async: bool,
        site: &CallSiteContext,
        diags: &mut Vec<IterationError>,
    ) -> IterationBinding {
        let enumerator = acq.ret.clone();
        let shape = match self.enumerator_shape(&enumerator, is_async, site) {
            Ok(shape) => shape,
            Err(err) => {
                diags.push(err);
                return self.recovery(ty, is_async, site);
            }
        };
        let args = self.oracle.materialize_default_arguments(&acq, 0, site);
        let disposal = self.disposal(&enumerator, is_async, site);
        IterationBinding {
            protocol,
            acquisition: Acquisition { member: MemberRef::Member(acq), args, is_suspending: false },
            advance: shape.advance,
            current: shape.current,
            disposal,
            element_conversion: ElementConversion::Leaf(Conversion::identity(shape.element.clone())),
            collection_conversion,
            collection_type: ty.clone(),
            enumerator_type: enumerator,
            element_type: shape.element,
            is_async,
            has_errors: false,
        }
    }

    fn enumerator_shape(
        &self,
        enumerator: &Type,
        is_async: bool,
        site: &CallSiteContext,
    ) -> Result<EnumeratorShape, IterationError> {
        let names = names(is_async);
        let malformed = |member: &str| {
            IterationError::malformed(self.oracle.display_type(enumerator), member, site.span)
        };

        let expected = if is_async { Type::awaitable(Type::Bool) } else { Type::Bool };
        let advance = match self.oracle.resolve_member(enumerator, MemberQuery::method(names.advance), false) {
            MemberResolution::Found(b) if b.ret == expected => b,
            _ => return Err(malformed(names.advance)),
        };
        let current = match self.oracle.resolve_member(enumerator, MemberQuery::property(names.current), false) {
            MemberResolution::Found(b) if b.ret != Type::Unit => b,
            _ => return Err(malformed(names.current)),
        };

        let args = self.oracle.materialize_default_arguments(&advance, 0, site);
        let element = current.ret.clone();
        Ok(EnumeratorShape {
            advance: Advance { member: MemberRef::Member(advance), args, is_suspending: is_async },
            current: Current {
                is_by_ref: current.ret_ref != RefKind::Value,
                is_read_only_ref: current.ret_ref == RefKind::RefReadOnly,
                member: MemberRef::Member(current),
            },
            element,
        })
    }

    /// Decide whether and how the enumerator is disposed.
    fn disposal(&self, enumerator: &Type, is_async: bool, site: &CallSiteContext) -> Option<Disposal> {
        let class = self.oracle.classify(enumerator);
        let caps: &[Capability] = match (is_async, self.config.prefer_async_disposal) {
            (false, _) => &[Capability::Disposable],
            (true, true) => &[Capability::AsyncDisposable, Capability::Disposable],
            (true, false) => &[Capability::Disposable, Capability::AsyncDisposable],
        };

        match class {
            TypeClass::Error => None,
            // Statically exact: one check, and the call is unconditional.
            TypeClass::Value | TypeClass::RefLikeValue | TypeClass::SealedRef => {
                for &cap in caps {
                    if self.oracle.implements(enumerator, cap) {
                        return Some(self.nominal_disposal(enumerator, cap, false, site));
                    }
                    if self.structural_allowed(class) {
                        if let Some(d) = self.structural_disposal(enumerator, cap, site) {
                            return Some(d);
                        }
                    }
                }
                None
            }
            TypeClass::UnsealedRef | TypeClass::Interface | TypeClass::Dynamic => {
                for &cap in caps {
                    if self.oracle.implements(enumerator, cap) {
                        return Some(self.nominal_disposal(enumerator, cap, true, site));
                    }
                }
                // The runtime type may still be disposable.
                let cap = *caps.first()?;
                let cap_ty = Type::capability(cap);
                let conversion = self
                    .oracle
                    .resolve_conversion(enumerator, &cap_ty)
                    .unwrap_or_else(|| Conversion::invalid(enumerator.clone(), cap_ty.clone()));
                let member = self.capability_member(&cap_ty, dispose_name(cap));
                Some(Disposal {
                    args: self.args_for(&member, site),
                    member,
                    requires_null_guard: true,
                    is_suspending: cap == Capability::AsyncDisposable,
                    conversion: Some(conversion),
                })
            }
        }
    }

    fn structural_allowed(&self, class: TypeClass) -> bool {
        match self.config.structural_disposal {
            StructuralDisposal::RefLikeOnly => class == TypeClass::RefLikeValue,
            StructuralDisposal::AllExact => class.is_exact(),
        }
    }

    fn nominal_disposal(&self, enumerator: &Type, cap: Capability, guard: bool, site: &CallSiteContext) -> Disposal {
        let name = dispose_name(cap);
        let is_suspending = cap == Capability::AsyncDisposable;

        if !guard {
            if let MemberResolution::Found(own) = self.oracle.resolve_member(enumerator, MemberQuery::method(name), false) {
                if matches!(own.owner, MemberOwner::Type(_)) {
                    let args = self.oracle.materialize_default_arguments(&own, 0, site);
                    return Disposal {
                        member: MemberRef::Member(own),
                        args,
                        requires_null_guard: false,
                        is_suspending,
                        conversion: None,
                    };
                }
            }
        }

        let cap_ty = Type::capability(cap);
        let conversion = self
            .oracle
            .resolve_conversion(enumerator, &cap_ty)
            .unwrap_or_else(|| Conversion::invalid(enumerator.clone(), cap_ty.clone()));
        let member = self.capability_member(&cap_ty, name);
        Disposal {
            args: self.args_for(&member, site),
            member,
            requires_null_guard: guard,
            is_suspending,
            conversion: Some(conversion),
        }
    }

    /// A `dispose` member with no required arguments, without the capability.
    fn structural_disposal(&self, enumerator: &Type, cap: Capability, site: &CallSiteContext) -> Option<Disposal> {
        let is_suspending = cap == Capability::AsyncDisposable;
        match self.oracle.resolve_member(enumerator, MemberQuery::method(dispose_name(cap)), false) {
            MemberResolution::Found(own) => {
                let returns_awaitable = matches!(own.ret.as_capability(), Some((Capability::Awaitable, _)));
                if returns_awaitable != is_suspending {
                    return None;
                }
                let args = self.oracle.materialize_default_arguments(&own, 0, site);
                Some(Disposal {
                    member: MemberRef::Member(own),
                    args,
                    requires_null_guard: false,
                    is_suspending,
                    conversion: None,
                })
            }
            _ => None,
        }
    }

    fn capability_member(&self, cap_ty: &Type, name: &str) -> MemberRef {
        match self.oracle.resolve_member(cap_ty, MemberQuery::method(name), false) {
            MemberResolution::Found(b) => MemberRef::Member(b),
            _ => MemberRef::Deferred { name: name.to_string(), fallback: None },
        }
    }

    fn capability_property(&self, cap_ty: &Type, name: &str) -> Option<MemberBinding> {
        match self.oracle.resolve_member(cap_ty, MemberQuery::property(name), false) {
            MemberResolution::Found(b) => Some(b),
            _ => None,
        }
    }

    fn args_for(&self, member: &MemberRef, site: &CallSiteContext) -> ArgumentList {
        member
            .binding()
            .map(|b| self.oracle.materialize_default_arguments(b, 0, site))
            .unwrap_or_default()
    }

    /// Runtime binding by name over the canonical capability shape.
    fn dynamic(&self, is_async: bool, site: &CallSiteContext) -> IterationBinding {
        let names = names(is_async);
        let iface = if is_async {
            Type::async_enumerable(Type::Dynamic)
        } else {
            Type::capability(Capability::Enumerable)
        };
        let mut binding = self.capability_shape(&iface, is_async, site, Type::Dynamic);
        let defer = |member: &MemberRef, name: &str| MemberRef::Deferred {
            name: name.to_string(),
            fallback: member.binding().cloned(),
        };
        binding.protocol = ProtocolKind::DynamicDispatch;
        binding.collection_type = Type::Dynamic;
        binding.collection_conversion = self
            .oracle
            .resolve_conversion(&Type::Dynamic, &iface)
            .unwrap_or_else(|| Conversion::invalid(Type::Dynamic, iface.clone()));
        binding.acquisition.member = defer(&binding.acquisition.member, names.acquire);
        binding.advance.member = defer(&binding.advance.member, names.advance);
        binding.current.member = defer(&binding.current.member, names.current);

        let cap = if is_async { Capability::AsyncDisposable } else { Capability::Disposable };
        let cap_ty = Type::capability(cap);
        let fallback = self.capability_member(&cap_ty, dispose_name(cap));
        binding.disposal = Some(Disposal {
            args: self.args_for(&fallback, site),
            member: defer(&fallback, dispose_name(cap)),
            requires_null_guard: true,
            is_suspending: is_async,
            conversion: self.oracle.resolve_conversion(&binding.enumerator_type, &cap_ty),
        });
        binding
    }

    /// Placeholder binding after an error.
    fn recovery(&self, ty: &Type, is_async: bool, site: &CallSiteContext) -> IterationBinding {
        let iface = if is_async {
            Type::async_enumerable(Type::Error)
        } else {
            Type::capability(Capability::Enumerable)
        };
        let mut binding = self.capability_shape(&iface, is_async, site, Type::Error);
        binding.collection_type = ty.clone();
        binding.collection_conversion = self
            .oracle
            .resolve_conversion(ty, &iface)
            .unwrap_or_else(|| Conversion::invalid(ty.clone(), iface.clone()));
        binding.disposal = self.disposal(&binding.enumerator_type, is_async, site);
        binding.has_errors = true;
        binding
    }

    /// Interface-dispatch binding over `iface` with the given element type,
    /// without disposal.
    fn capability_shape(&self, iface: &Type, is_async: bool, site: &CallSiteContext, element: Type) -> IterationBinding {
        let names = names(is_async);
        let acquisition = self.capability_member(iface, names.acquire);
        let enumerator = acquisition
            .binding()
            .map(|b| b.ret.clone())
            .unwrap_or(Type::capability(Capability::Enumerator));
        let advance = self.capability_member(&enumerator, names.advance);
        let current = match self.capability_property(&enumerator, names.current) {
            Some(b) => MemberRef::Member(b),
            None => MemberRef::Deferred { name: names.current.to_string(), fallback: None },
        };
        IterationBinding {
            protocol: ProtocolKind::InterfaceDispatch,
            acquisition: Acquisition {
                args: self.args_for(&acquisition, site),
                member: acquisition,
                is_suspending: false,
            },
            advance: Advance { args: self.args_for(&advance, site), member: advance, is_suspending: is_async },
            current: Current { member: current, is_by_ref: false, is_read_only_ref: false },
            disposal: None,
            element_conversion: ElementConversion::Leaf(Conversion::identity(element.clone())),
            collection_conversion: Conversion::identity(iface.clone()),
            collection_type: iface.clone(),
            enumerator_type: enumerator,
            element_type: element,
            is_async,
            has_errors: false,
        }
    }

    fn ambiguous(&self, ty: &Type, candidates: &[MemberBinding], site: &CallSiteContext) -> IterationError {
        let names = candidates
            .iter()
            .map(|c| match &c.receiver {
                Some(recv) => format!("{}({})", c.name, self.oracle.display_type(recv)),
                None => format!("{}/{}", c.name, c.params.len()),
            })
            .collect();
        IterationError::ambiguous(self.oracle.display_type(ty), names, site.span)
    }

    fn element_conversion(
        &self,
        element: &Type,
        target: &ElementTarget,
        current: &Current,
        diags: &mut Vec<IterationError>,
    ) -> ElementConversion {
        match target {
            ElementTarget::SingleVariable(var) => {
                if var.ref_kind != RefKind::Value {
                    if !current.is_by_ref {
                        diags.push(IterationError::invalid_ref(
                            "the enumerator does not return its elements by reference",
                            var.span,
                        ));
                    } else if var.ref_kind == RefKind::Ref && current.is_read_only_ref {
                        diags.push(IterationError::invalid_ref(
                            "elements are read-only; use `ref readonly`",
                            var.span,
                        ));
                    }
                    return match &var.declared_type {
                        Some(t) if t != element && !t.is_error() && !element.is_error() => {
                            diags.push(IterationError::invalid_ref(
                                format!(
                                    "a by-reference variable of type `{}` cannot refer to `{}`",
                                    self.oracle.display_type(t),
                                    self.oracle.display_type(element)
                                ),
                                var.span,
                            ));
                            ElementConversion::Leaf(Conversion::invalid(element.clone(), t.clone()))
                        }
                        _ => ElementConversion::Leaf(Conversion::identity(element.clone())),
                    };
                }
                match &var.declared_type {
                    None => ElementConversion::Leaf(Conversion::identity(element.clone())),
                    Some(t) => self.convert(element, t, var.span, diags),
                }
            }
            ElementTarget::Discard(_) => ElementConversion::Leaf(Conversion::identity(element.clone())),
            ElementTarget::AssignableExpression { expr, ty } => self.convert(element, ty, expr.span, diags),
            ElementTarget::Destructuring { elements, span } => {
                let parts: Vec<Type> = match element {
                    Type::Tuple(parts) if parts.len() == elements.len() => parts.clone(),
                    Type::Error => vec![Type::Error; elements.len()],
                    Type::Tuple(parts) => {
                        diags.push(IterationError::arity(
                            elements.len(),
                            Some(parts.len()),
                            self.oracle.display_type(element),
                            *span,
                        ));
                        vec![Type::Error; elements.len()]
                    }
                    other => {
                        diags.push(IterationError::arity(elements.len(), None, self.oracle.display_type(other), *span));
                        vec![Type::Error; elements.len()]
                    }
                };
                let by_value = Current { member: current.member.clone(), is_by_ref: false, is_read_only_ref: false };
                ElementConversion::Deconstruct {
                    from: element.clone(),
                    elements: parts
                        .iter()
                        .zip(elements)
                        .map(|(part, target)| self.element_conversion(part, target, &by_value, diags))
                        .collect(),
                }
            }
        }
    }

    fn convert(&self, from: &Type, to: &Type, span: Span, diags: &mut Vec<IterationError>) -> ElementConversion {
        match self.oracle.resolve_conversion(from, to) {
            Some(conversion) => ElementConversion::Leaf(conversion),
            None => {
                diags.push(IterationError::conversion_missing(
                    self.oracle.display_type(from),
                    self.oracle.display_type(to),
                    span,
                ));
                ElementConversion::Leaf(Conversion::invalid(from.clone(), to.clone()))
            }
        }
    }
}
