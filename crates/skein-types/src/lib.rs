// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type model and semantic queries for iteration lowering.
//!
//! The iteration binder never inspects type definitions directly. It asks two
//! questions through traits: "does a conversion from A to B exist, and what
//! kind" ([`ConversionResolver`]) and "does a member with this call shape
//! exist on T" ([`MemberLookup`]). [`TypeTable`] is the in-tree implementation
//! of both, built over a small nominal type model.

mod types;
mod table;
mod parse_type;
mod conversions;
mod members;
mod errors;

pub use types::{Capability, ConstValue, Type, TypeId, TypeClass};
pub use table::{
    CallerInfo, ExtensionScope, MemberDef, MemberId, MemberKind, MemberOwner, MemberSig,
    NodeTypes, ParamDef, TypeBuilder, TypeDef, TypeKind, TypeTable,
};
pub use parse_type::parse_type_string;
pub use conversions::{Conversion, ConversionKind, ConversionResolver};
pub use members::{
    ArgValue, ArgumentList, BoundArgument, CallSiteContext, MemberBinding, MemberLookup,
    MemberQuery, MemberResolution,
};
pub use errors::TypeError;

/// Everything the iteration binder consumes from the outer compiler.
///
/// Implementations must be safe to share across threads: method bodies are
/// lowered concurrently against one read-only table.
pub trait SemanticOracle: ConversionResolver + MemberLookup + Send + Sync {
    /// Human-readable name for diagnostics and graph dumps.
    fn display_type(&self, ty: &Type) -> String;

    /// Storage classification used for null-guard and disposal decisions.
    fn classify(&self, ty: &Type) -> TypeClass;

    /// Whether `ty` nominally implements `cap` (directly or through a base
    /// type or inherited interface), for any element type.
    fn implements(&self, ty: &Type, cap: Capability) -> bool;

    /// Every instantiation of the generic capability `cap` that `ty`
    /// implements, in declaration order, without duplicates.
    fn capability_instances(&self, ty: &Type, cap: Capability) -> Vec<Type>;

    /// Resolve a written type annotation.
    fn parse_type(&self, text: &str) -> Result<Type, TypeError>;
}

impl SemanticOracle for TypeTable {
    fn display_type(&self, ty: &Type) -> String {
        self.type_name(ty)
    }

    fn classify(&self, ty: &Type) -> TypeClass {
        TypeTable::classify(self, ty)
    }

    fn implements(&self, ty: &Type, cap: Capability) -> bool {
        TypeTable::implements(self, ty, cap)
    }

    fn capability_instances(&self, ty: &Type, cap: Capability) -> Vec<Type> {
        TypeTable::capability_instances(self, ty, cap)
    }

    fn parse_type(&self, text: &str) -> Result<Type, TypeError> {
        parse_type_string(text, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_oracle<T: SemanticOracle>() {}

    #[test]
    fn table_is_a_shareable_oracle() {
        assert_oracle::<TypeTable>();
        let table = TypeTable::new();
        let oracle: &dyn SemanticOracle = &table;
        assert_eq!(oracle.display_type(&Type::array(Type::Char)), "[char]");
        assert_eq!(oracle.parse_type("span<i32>"), Ok(Type::span(Type::I32)));
    }
}
