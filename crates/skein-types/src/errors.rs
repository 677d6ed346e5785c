// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type table error types.

/// An error building or querying the type table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("undefined type: {0}")]
    Undefined(String),
    #[error("invalid type string: {0}")]
    InvalidTypeString(String),
    #[error("type `{0}` is already defined")]
    DuplicateType(String),
    #[error("`{0}` is declared ref-like but is not a struct")]
    RefLikeNotStruct(String),
    #[error("type `{name}` has an invalid base type")]
    InvalidBase { name: String },
    #[error("extension member `{name}` has no receiver parameter")]
    ExtensionWithoutReceiver { name: String },
    #[error("no extension scope with index {0}")]
    UnknownExtensionScope(usize),
    #[error("{cap} takes {expected} type argument(s)")]
    CapabilityArity { cap: String, expected: usize },
}
