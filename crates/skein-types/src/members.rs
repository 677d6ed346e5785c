// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Member lookup by call shape, and default-argument materialization.

use skein_ast::{RefKind, Span};

use crate::conversions::{ConversionKind, ConversionResolver};
use crate::table::{CallerInfo, MemberDef, MemberId, MemberKind, MemberOwner, ParamDef, TypeTable};
use crate::types::{ConstValue, Type};

/// The shape of a member access: `ty.name(<arg_count args>)` or `ty.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberQuery<'a> {
    pub name: &'a str,
    pub kind: MemberKind,
    pub arg_count: usize,
}

impl<'a> MemberQuery<'a> {
    pub fn method(name: &'a str) -> Self {
        Self { name, kind: MemberKind::Method, arg_count: 0 }
    }

    pub fn property(name: &'a str) -> Self {
        Self { name, kind: MemberKind::Property, arg_count: 0 }
    }
}

/// A member selected for a call shape, with its signature instantiated at
/// the receiver's element type.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberBinding {
    pub member: MemberId,
    pub name: String,
    pub owner: MemberOwner,
    pub kind: MemberKind,
    pub is_static: bool,
    /// Declared as an extension: the receiver is passed as the first argument.
    pub is_extension: bool,
    /// Type of the extension receiver parameter.
    pub receiver: Option<Type>,
    /// Parameters after the receiver.
    pub params: Vec<ParamDef>,
    pub ret: Type,
    pub ret_ref: RefKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberResolution {
    Found(MemberBinding),
    /// Several equally good candidates.
    Ambiguous(Vec<MemberBinding>),
    /// No applicable candidate. `inapplicable` lists members with the
    /// requested name that did not fit the call shape.
    NotFound { inapplicable: Vec<MemberBinding> },
}

/// Position and enclosing member of a synthesized call, used to fill
/// caller-information parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteContext {
    pub member_name: String,
    pub file_path: String,
    pub line: u32,
    pub span: Span,
}

/// A materialized argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Argument supplied at the call site (an already-bound expression,
    /// identified by its position in the supplied list).
    Supplied(usize),
    Const(ConstValue),
    /// Empty array for an omitted variadic tail.
    EmptyCollection(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgument {
    pub param: String,
    pub ty: Type,
    pub value: ArgValue,
}

pub type ArgumentList = Vec<BoundArgument>;

/// Answers "does member M with this call shape exist on T".
pub trait MemberLookup {
    /// Instance members are searched first, most derived type first; the
    /// first type declaring the name decides. With `lookup_extensions`,
    /// extension scopes are searched innermost first when instance lookup
    /// finds nothing applicable.
    fn resolve_member(&self, ty: &Type, query: MemberQuery<'_>, lookup_extensions: bool) -> MemberResolution;

    /// Complete the argument list of `binding` with literal values for every
    /// parameter `supplied` does not cover.
    fn materialize_default_arguments(
        &self,
        binding: &MemberBinding,
        supplied: usize,
        ctx: &CallSiteContext,
    ) -> ArgumentList {
        binding
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| BoundArgument {
                param: param.name.clone(),
                ty: param.ty.clone(),
                value: if i < supplied {
                    ArgValue::Supplied(i)
                } else {
                    default_value(param, ctx)
                },
            })
            .collect()
    }
}

/// Caller information wins over the declared default.
fn default_value(param: &ParamDef, ctx: &CallSiteContext) -> ArgValue {
    if let Some(info) = param.caller_info {
        return ArgValue::Const(match info {
            CallerInfo::MemberName => ConstValue::Str(ctx.member_name.clone()),
            CallerInfo::LineNumber => ConstValue::Int(i64::from(ctx.line)),
            CallerInfo::FilePath => ConstValue::Str(ctx.file_path.clone()),
        });
    }
    if let Some(default) = &param.default {
        return ArgValue::Const(default.clone());
    }
    if param.is_params {
        let elem = match &param.ty {
            Type::Array(elem) => (**elem).clone(),
            other => other.clone(),
        };
        return ArgValue::EmptyCollection(elem);
    }
    ArgValue::Const(ConstValue::Default(param.ty.clone()))
}

fn applicable(def: &MemberDef, query: &MemberQuery<'_>, skip: usize) -> bool {
    if def.kind != query.kind {
        return false;
    }
    let params = &def.params[skip.min(def.params.len())..];
    let variadic = params.last().is_some_and(|p| p.is_params);
    if query.arg_count > params.len() && !variadic {
        return false;
    }
    params.iter().skip(query.arg_count).all(ParamDef::is_optional)
}

impl TypeTable {
    fn bind(&self, def: &MemberDef, elem: &Type) -> MemberBinding {
        let is_extension = matches!(def.owner, MemberOwner::Extension(_));
        let mut params: Vec<ParamDef> = def
            .params
            .iter()
            .map(|p| ParamDef { ty: p.ty.substitute(elem), ..p.clone() })
            .collect();
        let receiver = if is_extension && !params.is_empty() {
            Some(params.remove(0).ty)
        } else {
            None
        };
        MemberBinding {
            member: def.id,
            name: def.name.clone(),
            owner: def.owner,
            kind: def.kind,
            is_static: def.is_static,
            is_extension,
            receiver,
            params,
            ret: def.ret.substitute(elem),
            ret_ref: def.ret_ref,
        }
    }

    /// Pick the applicable candidate with the fewest parameters.
    fn pick(mut applicable: Vec<MemberBinding>) -> Option<MemberResolution> {
        let fewest = applicable.iter().map(|b| b.params.len()).min()?;
        applicable.retain(|b| b.params.len() == fewest);
        Some(if applicable.len() == 1 {
            MemberResolution::Found(applicable.remove(0))
        } else {
            MemberResolution::Ambiguous(applicable)
        })
    }

    fn receiver_accepts(&self, receiver: &Type, ty: &Type) -> bool {
        matches!(
            self.resolve_conversion(ty, receiver).map(|c| c.kind),
            Some(ConversionKind::Identity | ConversionKind::ImplicitReference | ConversionKind::Boxing)
        )
    }
}

impl MemberLookup for TypeTable {
    fn resolve_member(&self, ty: &Type, query: MemberQuery<'_>, lookup_extensions: bool) -> MemberResolution {
        let mut inapplicable = Vec::new();

        for (members, elem) in self.instance_scopes(ty) {
            let Some(ids) = members.get(query.name) else {
                continue;
            };
            let mut fits = Vec::new();
            for def in ids.iter().filter_map(|id| self.member(*id)) {
                let binding = self.bind(def, &elem);
                if !def.is_static && applicable(def, &query, 0) {
                    fits.push(binding);
                } else {
                    inapplicable.push(binding);
                }
            }
            if let Some(resolution) = Self::pick(fits) {
                return resolution;
            }
            // The most derived declaration hides the rest.
            break;
        }

        if lookup_extensions {
            for scope in self.extension_scopes().iter().rev() {
                let Some(ids) = scope.members.get(query.name) else {
                    continue;
                };
                let fits: Vec<_> = ids
                    .iter()
                    .filter_map(|id| self.member(*id))
                    .filter(|def| applicable(def, &query, 1))
                    .map(|def| self.bind(def, &Type::Object))
                    .filter(|b| b.receiver.as_ref().is_some_and(|r| self.receiver_accepts(r, ty)))
                    .collect();
                if let Some(resolution) = Self::pick(fits) {
                    return resolution;
                }
            }
        }

        MemberResolution::NotFound { inapplicable }
    }
}
