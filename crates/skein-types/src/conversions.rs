// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversion classification.
//!
//! Only the conversions iteration lowering requests are modelled: identity,
//! numeric, reference (to interfaces, bases and derived types), boxing and
//! unboxing, dynamic, and element-wise tuple conversions.

use crate::table::TypeTable;
use crate::types::{Type, TypeClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    Identity,
    ImplicitNumeric,
    ExplicitNumeric,
    ImplicitReference,
    ExplicitReference,
    Boxing,
    Unboxing,
    /// From `dynamic` to a static type; checked at runtime
    Dynamic,
    /// Element-wise conversion between tuples of the same arity
    Tuple,
    /// Stands in for a conversion that does not exist, in error recovery.
    /// Never returned by a resolver.
    NoConversion,
}

impl ConversionKind {
    pub fn name(self) -> &'static str {
        match self {
            ConversionKind::Identity => "identity",
            ConversionKind::ImplicitNumeric => "implicit numeric",
            ConversionKind::ExplicitNumeric => "explicit numeric",
            ConversionKind::ImplicitReference => "implicit reference",
            ConversionKind::ExplicitReference => "explicit reference",
            ConversionKind::Boxing => "boxing",
            ConversionKind::Unboxing => "unboxing",
            ConversionKind::Dynamic => "dynamic",
            ConversionKind::Tuple => "tuple",
            ConversionKind::NoConversion => "no conversion",
        }
    }
}

/// A classified conversion between two types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub kind: ConversionKind,
    pub from: Type,
    pub to: Type,
    pub is_implicit: bool,
}

impl Conversion {
    pub fn identity(ty: Type) -> Self {
        Conversion { kind: ConversionKind::Identity, from: ty.clone(), to: ty, is_implicit: true }
    }

    pub fn invalid(from: Type, to: Type) -> Self {
        Conversion { kind: ConversionKind::NoConversion, from, to, is_implicit: false }
    }

    pub fn is_valid(&self) -> bool {
        self.kind != ConversionKind::NoConversion
    }

    pub fn is_identity(&self) -> bool {
        self.kind == ConversionKind::Identity
    }
}

/// Answers "does a conversion from A to B exist, and what kind".
pub trait ConversionResolver {
    fn resolve_conversion(&self, from: &Type, to: &Type) -> Option<Conversion>;
}

impl ConversionResolver for TypeTable {
    fn resolve_conversion(&self, from: &Type, to: &Type) -> Option<Conversion> {
        let kind = self.classify_conversion(from, to)?;
        let is_implicit = match kind {
            ConversionKind::Identity
            | ConversionKind::ImplicitNumeric
            | ConversionKind::ImplicitReference
            | ConversionKind::Boxing
            | ConversionKind::Dynamic => true,
            ConversionKind::ExplicitNumeric
            | ConversionKind::ExplicitReference
            | ConversionKind::Unboxing
            | ConversionKind::NoConversion => false,
            ConversionKind::Tuple => match (from, to) {
                (Type::Tuple(fs), Type::Tuple(ts)) => fs
                    .iter()
                    .zip(ts)
                    .all(|(f, t)| self.resolve_conversion(f, t).is_some_and(|c| c.is_implicit)),
                _ => false,
            },
        };
        Some(Conversion { kind, from: from.clone(), to: to.clone(), is_implicit })
    }
}

impl TypeTable {
    fn classify_conversion(&self, from: &Type, to: &Type) -> Option<ConversionKind> {
        if from == to || from.is_error() || to.is_error() {
            return Some(ConversionKind::Identity);
        }

        if *from == Type::Dynamic {
            return Some(ConversionKind::Dynamic);
        }

        if from.is_numeric() && to.is_numeric() {
            return Some(if implicit_numeric(from, to) {
                ConversionKind::ImplicitNumeric
            } else {
                ConversionKind::ExplicitNumeric
            });
        }

        if let (Type::Tuple(fs), Type::Tuple(ts)) = (from, to) {
            if fs.len() == ts.len() && fs.iter().zip(ts).all(|(f, t)| self.classify_conversion(f, t).is_some()) {
                return Some(ConversionKind::Tuple);
            }
            return None;
        }

        let from_class = self.classify(from);
        let to_class = self.classify(to);

        // Stack-only types convert to nothing but themselves.
        if from_class == TypeClass::RefLikeValue || to_class == TypeClass::RefLikeValue {
            return None;
        }

        if matches!(to, Type::Object | Type::Dynamic) {
            return Some(if from_class.is_value() {
                ConversionKind::Boxing
            } else {
                ConversionKind::ImplicitReference
            });
        }

        if *from == Type::Object {
            return Some(if to_class.is_value() {
                ConversionKind::Unboxing
            } else {
                ConversionKind::ExplicitReference
            });
        }

        if to_class == TypeClass::Interface && self.all_interfaces(from).contains(to) {
            return Some(if from_class.is_value() {
                ConversionKind::Boxing
            } else {
                ConversionKind::ImplicitReference
            });
        }

        if let (Type::Named(f), Type::Named(t)) = (from, to) {
            if self.base_chain(*f).contains(t) {
                return Some(ConversionKind::ImplicitReference);
            }
            if self.base_chain(*t).contains(f) {
                return Some(ConversionKind::ExplicitReference);
            }
        }

        if let (Type::Array(fe), Type::Array(te)) = (from, to) {
            if self.classify(fe).is_value() || self.classify(te).is_value() {
                return None;
            }
            return match self.classify_conversion(fe, te)? {
                ConversionKind::ImplicitReference => Some(ConversionKind::ImplicitReference),
                ConversionKind::ExplicitReference => Some(ConversionKind::ExplicitReference),
                _ => None,
            };
        }

        if from_class == TypeClass::Interface {
            if to_class.is_value() && self.all_interfaces(to).contains(from) {
                return Some(ConversionKind::Unboxing);
            }
            // The runtime object may implement anything unless its type is sealed.
            if to_class == TypeClass::Interface || to_class == TypeClass::UnsealedRef {
                return Some(ConversionKind::ExplicitReference);
            }
            if to_class == TypeClass::SealedRef && self.all_interfaces(to).contains(from) {
                return Some(ConversionKind::ExplicitReference);
            }
        }

        if from_class == TypeClass::UnsealedRef && to_class == TypeClass::Interface {
            return Some(ConversionKind::ExplicitReference);
        }

        None
    }
}

/// Lossless widening, including the integral-to-floating conversions.
fn implicit_numeric(from: &Type, to: &Type) -> bool {
    use Type::*;
    match from {
        I8 => matches!(to, I16 | I32 | I64 | F32 | F64),
        U8 => matches!(to, I16 | U16 | I32 | U32 | I64 | U64 | F32 | F64),
        I16 => matches!(to, I32 | I64 | F32 | F64),
        U16 | Char => matches!(to, I32 | U32 | I64 | U64 | F32 | F64) || (*from == Char && *to == U16),
        I32 => matches!(to, I64 | F32 | F64),
        U32 => matches!(to, I64 | U64 | F32 | F64),
        I64 | U64 => matches!(to, F32 | F64),
        F32 => *to == F64,
        _ => false,
    }
}
