// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The resolved iteration protocol of one loop.

use std::fmt;

use skein_types::{ArgumentList, Conversion, MemberBinding, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Array,
    StringIndexed,
    SpanLike,
    InterfaceDispatch,
    StructuralPattern,
    ExtensionSuppliedPattern,
    DynamicDispatch,
}

impl ProtocolKind {
    /// Index-based lowering with no enumerator object.
    pub fn is_builtin(self) -> bool {
        matches!(self, ProtocolKind::Array | ProtocolKind::StringIndexed | ProtocolKind::SpanLike)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolKind::Array => "array",
            ProtocolKind::StringIndexed => "string",
            ProtocolKind::SpanLike => "span",
            ProtocolKind::InterfaceDispatch => "interface",
            ProtocolKind::StructuralPattern => "pattern",
            ProtocolKind::ExtensionSuppliedPattern => "extension",
            ProtocolKind::DynamicDispatch => "dynamic",
        };
        write!(f, "{}", name)
    }
}

/// Cursor operations of the built-in index-based shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorOp {
    /// Start at index 0
    Start,
    /// Step the index and compare it with the length
    Advance,
    /// Element at the index
    Current,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberRef {
    Member(MemberBinding),
    Intrinsic(CursorOp),
    /// Bound by name at runtime. `fallback` is the capability member whose
    /// signature shapes the lowering.
    Deferred { name: String, fallback: Option<MemberBinding> },
}

impl MemberRef {
    pub fn name(&self) -> &str {
        match self {
            MemberRef::Member(b) => &b.name,
            MemberRef::Intrinsic(CursorOp::Start) => "start",
            MemberRef::Intrinsic(CursorOp::Advance) => "advance",
            MemberRef::Intrinsic(CursorOp::Current) => "current",
            MemberRef::Deferred { name, .. } => name,
        }
    }

    pub fn binding(&self) -> Option<&MemberBinding> {
        match self {
            MemberRef::Member(b) => Some(b),
            MemberRef::Deferred { fallback, .. } => fallback.as_ref(),
            MemberRef::Intrinsic(_) => None,
        }
    }
}

/// Call producing the enumerator from the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub member: MemberRef,
    pub args: ArgumentList,
    pub is_suspending: bool,
}

/// Call producing "is there another element".
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub member: MemberRef,
    pub args: ArgumentList,
    /// Returns an awaitable of bool.
    pub is_suspending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Current {
    pub member: MemberRef,
    pub is_by_ref: bool,
    pub is_read_only_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Disposal {
    pub member: MemberRef,
    pub args: ArgumentList,
    pub requires_null_guard: bool,
    pub is_suspending: bool,
    /// Conversion of the enumerator to the disposal capability before the
    /// null test and call; `None` when calling the enumerator's own member.
    pub conversion: Option<Conversion>,
}

/// Conversion from the element to the loop variable(s).
#[derive(Debug, Clone, PartialEq)]
pub enum ElementConversion {
    Leaf(Conversion),
    /// Tuple element split into the pattern's parts, one conversion each.
    Deconstruct { from: Type, elements: Vec<ElementConversion> },
}

impl ElementConversion {
    pub fn is_valid(&self) -> bool {
        match self {
            ElementConversion::Leaf(c) => c.is_valid(),
            ElementConversion::Deconstruct { elements, .. } => elements.iter().all(Self::is_valid),
        }
    }
}

/// How one loop iterates its collection. Immutable once resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationBinding {
    pub protocol: ProtocolKind,
    pub acquisition: Acquisition,
    pub advance: Advance,
    pub current: Current,
    pub disposal: Option<Disposal>,
    pub element_conversion: ElementConversion,
    pub collection_conversion: Conversion,
    pub collection_type: Type,
    /// Type of the acquired enumerator; the index type for built-in shapes.
    pub enumerator_type: Type,
    /// Type produced by `current`.
    pub element_type: Type,
    pub is_async: bool,
    /// Best-effort placeholder after an error.
    pub has_errors: bool,
}

impl IterationBinding {
    /// The three call sites that may suspend, in program order.
    pub fn suspending_sites(&self) -> impl Iterator<Item = &'static str> {
        [
            (self.acquisition.is_suspending, "acquisition"),
            (self.advance.is_suspending, "advance"),
            (self.disposal.as_ref().is_some_and(|d| d.is_suspending), "disposal"),
        ]
        .into_iter()
        .filter(|(s, _)| *s)
        .map(|(_, name)| name)
    }
}
