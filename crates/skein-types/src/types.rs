// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type definitions for the iteration type model.

use std::fmt;

/// Unique identifier for user-defined types (classes, structs, interfaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Well-known interfaces the iteration binder reasons about by identity.
///
/// These play the role of the runtime library's enumerable, enumerator and
/// disposal interfaces. They are not registered in the type table; their
/// members are synthesized on lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Enumerable,
    Enumerator,
    AsyncEnumerable,
    AsyncEnumerator,
    Disposable,
    AsyncDisposable,
    Awaitable,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::Enumerable => "Enumerable",
            Capability::Enumerator => "Enumerator",
            Capability::AsyncEnumerable => "AsyncEnumerable",
            Capability::AsyncEnumerator => "AsyncEnumerator",
            Capability::Disposable => "Disposable",
            Capability::AsyncDisposable => "AsyncDisposable",
            Capability::Awaitable => "Awaitable",
        }
    }

    pub fn from_name(name: &str) -> Option<Capability> {
        Some(match name {
            "Enumerable" => Capability::Enumerable,
            "Enumerator" => Capability::Enumerator,
            "AsyncEnumerable" => Capability::AsyncEnumerable,
            "AsyncEnumerator" => Capability::AsyncEnumerator,
            "Disposable" => Capability::Disposable,
            "AsyncDisposable" => Capability::AsyncDisposable,
            "Awaitable" => Capability::Awaitable,
            _ => return None,
        })
    }

    /// Whether the capability takes an element/result type argument.
    /// `Enumerable` and `Enumerator` exist in both forms.
    pub fn is_generic(self) -> bool {
        !matches!(self, Capability::Disposable | Capability::AsyncDisposable)
    }
}

/// A type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Unit type
    Unit,
    Bool,
    Char,
    /// Signed integers
    I8,
    I16,
    I32,
    I64,
    /// Unsigned integers
    U8,
    U16,
    U32,
    U64,
    /// Floating point
    F32,
    F64,
    /// UTF-16 text
    String,
    /// Root of the reference hierarchy
    Object,
    /// Late-bound type; member access is resolved at runtime
    Dynamic,
    /// Named user-defined type
    Named(TypeId),
    /// Single-dimensional array
    Array(Box<Type>),
    /// Stack-only view over contiguous elements
    Span { elem: Box<Type>, read_only: bool },
    /// Tuple type
    Tuple(Vec<Type>),
    /// Well-known interface, optionally instantiated
    Capability {
        cap: Capability,
        arg: Option<Box<Type>>,
    },
    /// Element parameter inside capability member signatures
    Elem,
    /// Error placeholder for recovery
    Error,
}

impl Type {
    pub fn array(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    pub fn span(elem: Type) -> Type {
        Type::Span { elem: Box::new(elem), read_only: false }
    }

    pub fn readonly_span(elem: Type) -> Type {
        Type::Span { elem: Box::new(elem), read_only: true }
    }

    pub fn capability(cap: Capability) -> Type {
        Type::Capability { cap, arg: None }
    }

    pub fn generic_capability(cap: Capability, arg: Type) -> Type {
        Type::Capability { cap, arg: Some(Box::new(arg)) }
    }

    pub fn enumerable(elem: Type) -> Type {
        Type::generic_capability(Capability::Enumerable, elem)
    }

    pub fn enumerator(elem: Type) -> Type {
        Type::generic_capability(Capability::Enumerator, elem)
    }

    pub fn async_enumerable(elem: Type) -> Type {
        Type::generic_capability(Capability::AsyncEnumerable, elem)
    }

    pub fn async_enumerator(elem: Type) -> Type {
        Type::generic_capability(Capability::AsyncEnumerator, elem)
    }

    pub fn awaitable(result: Type) -> Type {
        Type::generic_capability(Capability::Awaitable, result)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
                | Type::F32
                | Type::F64
                | Type::Char
        )
    }

    /// The capability and argument if this is a capability type.
    pub fn as_capability(&self) -> Option<(Capability, Option<&Type>)> {
        match self {
            Type::Capability { cap, arg } => Some((*cap, arg.as_deref())),
            _ => None,
        }
    }

    /// Replace the element placeholder with `elem`.
    pub fn substitute(&self, elem: &Type) -> Type {
        match self {
            Type::Elem => elem.clone(),
            Type::Array(inner) => Type::Array(Box::new(inner.substitute(elem))),
            Type::Span { elem: inner, read_only } => Type::Span {
                elem: Box::new(inner.substitute(elem)),
                read_only: *read_only,
            },
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(|t| t.substitute(elem)).collect()),
            Type::Capability { cap, arg } => Type::Capability {
                cap: *cap,
                arg: arg.as_ref().map(|a| Box::new(a.substitute(elem))),
            },
            other => other.clone(),
        }
    }
}

/// Storage classification of a type, as far as disposal and null checks care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// Struct, primitive, or tuple
    Value,
    /// Stack-only struct ("ref struct"); cannot implement interfaces
    RefLikeValue,
    /// Class that cannot be derived from (also arrays and strings)
    SealedRef,
    /// Class that may have derived types
    UnsealedRef,
    Interface,
    Dynamic,
    Error,
}

impl TypeClass {
    /// Values can never be null and their exact runtime type is the static one.
    pub fn is_value(self) -> bool {
        matches!(self, TypeClass::Value | TypeClass::RefLikeValue)
    }

    /// The runtime type is statically known: value types and sealed classes.
    pub fn is_exact(self) -> bool {
        matches!(self, TypeClass::Value | TypeClass::RefLikeValue | TypeClass::SealedRef)
    }
}

/// A compile-time constant, as used for parameter defaults and materialized
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    /// `default(T)`
    Default(Type),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "()"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::U32 => write!(f, "u32"),
            Type::U64 => write!(f, "u64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::String => write!(f, "string"),
            Type::Object => write!(f, "object"),
            Type::Dynamic => write!(f, "dynamic"),
            Type::Named(id) => write!(f, "<type#{}>", id.0),
            Type::Array(elem) => write!(f, "[{}]", elem),
            Type::Span { elem, read_only } => {
                if *read_only {
                    write!(f, "readonly_span<{}>", elem)
                } else {
                    write!(f, "span<{}>", elem)
                }
            }
            Type::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Type::Capability { cap, arg: None } => write!(f, "{}", cap),
            Type::Capability { cap, arg: Some(arg) } => write!(f, "{}<{}>", cap, arg),
            Type::Elem => write!(f, "T"),
            Type::Error => write!(f, "<error>"),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => write!(f, "null"),
            ConstValue::Bool(b) => write!(f, "{}", b),
            ConstValue::Int(n) => write!(f, "{}", n),
            ConstValue::Str(s) => write!(f, "{:?}", s),
            ConstValue::Default(ty) => write!(f, "default({})", ty),
        }
    }
}
