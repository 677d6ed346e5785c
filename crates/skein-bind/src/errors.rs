// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Iteration binding and lowering error types.
//!
//! Nothing here is fatal: every error is reported and the offending part of
//! the loop is replaced by a placeholder so lowering can still produce a
//! well-formed graph.

use skein_ast::Span;
use thiserror::Error;

/// An error from validating the syntactic loop construct.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct LoopTreeError {
    pub kind: LoopTreeErrorKind,
    pub span: Span,
}

impl LoopTreeError {
    pub fn invalid_target(reason: impl Into<String>, span: Span) -> Self {
        Self { kind: LoopTreeErrorKind::InvalidElementTarget { reason: reason.into() }, span }
    }

    pub fn duplicate(name: String, span: Span, previous: Span) -> Self {
        Self { kind: LoopTreeErrorKind::DuplicateDeclaration { name, previous }, span }
    }

    pub fn null_collection(span: Span) -> Self {
        Self { kind: LoopTreeErrorKind::NullCollection, span }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoopTreeErrorKind {
    #[error("invalid loop variable: {reason}")]
    InvalidElementTarget { reason: String },

    #[error("`{name}` is already declared in this scope (previously declared at {previous:?})")]
    DuplicateDeclaration { name: String, previous: Span },

    #[error("cannot iterate over the `null` literal")]
    NullCollection,
}

/// An error from resolving how a collection is iterated.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct IterationError {
    pub kind: IterationErrorKind,
    pub span: Span,
}

impl IterationError {
    pub fn no_protocol(ty: String, is_async: bool, span: Span) -> Self {
        Self { kind: IterationErrorKind::NoIterationProtocol { ty, is_async }, span }
    }

    pub fn ambiguous(ty: String, candidates: Vec<String>, span: Span) -> Self {
        Self { kind: IterationErrorKind::AmbiguousAcquisition { ty, candidates }, span }
    }

    pub fn malformed(enumerator: String, member: &str, span: Span) -> Self {
        Self {
            kind: IterationErrorKind::MalformedAdvanceOrCurrentShape {
                enumerator,
                member: member.to_string(),
            },
            span,
        }
    }

    pub fn conversion_missing(from: String, to: String, span: Span) -> Self {
        Self { kind: IterationErrorKind::ElementConversionMissing { from, to }, span }
    }

    pub fn arity(expected: usize, found: Option<usize>, ty: String, span: Span) -> Self {
        Self { kind: IterationErrorKind::DestructuringArityMismatch { expected, found, ty }, span }
    }

    pub fn pattern_not_applicable(ty: String, member: &str, span: Span) -> Self {
        Self {
            kind: IterationErrorKind::PatternNotApplicable { ty, member: member.to_string() },
            span,
        }
    }

    pub fn invalid_ref(reason: impl Into<String>, span: Span) -> Self {
        Self { kind: IterationErrorKind::InvalidRefElement { reason: reason.into() }, span }
    }

    /// Warnings do not make the binding erroneous.
    pub fn is_warning(&self) -> bool {
        matches!(self.kind, IterationErrorKind::PatternNotApplicable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IterationErrorKind {
    #[error("{}`{ty}` cannot be iterated: no {}enumeration pattern or capability found",
        if *is_async { "async " } else { "" }, if *is_async { "async " } else { "" })]
    NoIterationProtocol { ty: String, is_async: bool },

    #[error("iteration over `{ty}` is ambiguous between {}", candidates.join(" and "))]
    AmbiguousAcquisition { ty: String, candidates: Vec<String> },

    #[error("enumerator `{enumerator}` has no usable `{member}`")]
    MalformedAdvanceOrCurrentShape { enumerator: String, member: String },

    #[error("cannot convert element of type `{from}` to `{to}`")]
    ElementConversionMissing { from: String, to: String },

    #[error("cannot destructure `{ty}` into {expected} elements{}",
        found.map(|n| format!(" (it has {})", n)).unwrap_or_default())]
    DestructuringArityMismatch { expected: usize, found: Option<usize>, ty: String },

    #[error("`{ty}` has a `{member}` member that does not fit the enumeration pattern")]
    PatternNotApplicable { ty: String, member: String },

    #[error("invalid by-reference loop variable: {reason}")]
    InvalidRefElement { reason: String },
}

/// An error from lowering control transfers inside a loop body.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct LoweringError {
    pub kind: LoweringErrorKind,
    pub span: Span,
}

impl LoweringError {
    /// `in_scope` lists the labels of the enclosing loops, innermost first.
    pub fn unknown_label(label: String, in_scope: Vec<String>, span: Span) -> Self {
        Self { kind: LoweringErrorKind::UnknownLoopLabel { label, in_scope }, span }
    }

    pub fn outside_loop(keyword: &'static str, span: Span) -> Self {
        Self { kind: LoweringErrorKind::TransferOutsideLoop { keyword }, span }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoweringErrorKind {
    #[error("no enclosing loop is labelled `{label}`")]
    UnknownLoopLabel { label: String, in_scope: Vec<String> },

    #[error("`{keyword}` outside of a loop")]
    TransferOutsideLoop { keyword: &'static str },
}

/// Anything reported to a [`crate::DiagnosticSink`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindDiagnostic {
    #[error(transparent)]
    LoopTree(#[from] LoopTreeError),
    #[error(transparent)]
    Iteration(#[from] IterationError),
    #[error(transparent)]
    Lowering(#[from] LoweringError),
}

impl BindDiagnostic {
    pub fn span(&self) -> Span {
        match self {
            BindDiagnostic::LoopTree(e) => e.span,
            BindDiagnostic::Iteration(e) => e.span,
            BindDiagnostic::Lowering(e) => e.span,
        }
    }

    pub fn is_error(&self) -> bool {
        match self {
            BindDiagnostic::Iteration(e) => !e.is_warning(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let e = IterationError::no_protocol("Bag".into(), true, Span::new(1, 4));
        assert_eq!(
            e.to_string(),
            "async `Bag` cannot be iterated: no async enumeration pattern or capability found"
        );
        let e = IterationError::arity(3, Some(2), "(i32, i32)".into(), Span::DUMMY);
        assert_eq!(e.to_string(), "cannot destructure `(i32, i32)` into 3 elements (it has 2)");
        let e = LoweringError::outside_loop("break", Span::DUMMY);
        assert_eq!(e.to_string(), "`break` outside of a loop");
    }

    #[test]
    fn warnings_are_not_errors() {
        let warn: BindDiagnostic =
            IterationError::pattern_not_applicable("Bag".into(), "get_enumerator", Span::DUMMY).into();
        assert!(!warn.is_error());
        let err: BindDiagnostic = LoopTreeError::null_collection(Span::new(3, 7)).into();
        assert!(err.is_error());
        assert_eq!(err.span(), Span::new(3, 7));
    }
}
