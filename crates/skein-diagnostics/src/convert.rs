// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversions from phase error types to `Diagnostic`.

use skein_bind::{
    BindDiagnostic, IterationError, IterationErrorKind, LoopTreeError, LoopTreeErrorKind, LoweringError,
    LoweringErrorKind,
};
use skein_types::TypeError;

use crate::suggestions::did_you_mean;
use crate::{Diagnostic, ToDiagnostic};

// ============================================================================
// Loop Tree Errors
// ============================================================================

impl ToDiagnostic for LoopTreeError {
    fn to_diagnostic(&self) -> Diagnostic {
        match &self.kind {
            LoopTreeErrorKind::InvalidElementTarget { reason } => {
                Diagnostic::error(format!("invalid loop variable: {}", reason))
                    .with_code("E0910")
                    .with_primary(self.span, "cannot assign elements to this")
                    .with_help("declare a variable (`var x`), use `_`, or name an assignable location")
            }

            LoopTreeErrorKind::DuplicateDeclaration { name, previous } => {
                Diagnostic::error(format!("`{}` is already declared", name))
                    .with_code("E0911")
                    .with_primary(self.span, "declared again here")
                    .with_secondary(*previous, "first declared here")
                    .with_help("rename one of the variables")
            }

            LoopTreeErrorKind::NullCollection => Diagnostic::error("cannot iterate over `null`")
                .with_code("E0912")
                .with_primary(self.span, "`null` has no type to iterate")
                .with_note("the loop body is still checked with an unknown element type"),
        }
    }
}

// ============================================================================
// Iteration Errors
// ============================================================================

impl ToDiagnostic for IterationError {
    fn to_diagnostic(&self) -> Diagnostic {
        use IterationErrorKind::*;

        match &self.kind {
            NoIterationProtocol { ty, is_async } => {
                let (method, cap) = if *is_async {
                    ("get_async_enumerator", "AsyncEnumerable<T>")
                } else {
                    ("get_enumerator", "Enumerable<T>")
                };
                let mut diag = Diagnostic::error(self.kind.to_string())
                    .with_code("E0900")
                    .with_primary(self.span, format!("`{}` is not iterable", ty))
                    .with_help(format!("implement `{}` or add a `{}` method", cap, method));
                if *is_async {
                    diag = diag.with_note("async loops need an async enumeration pattern");
                }
                diag
            }

            AmbiguousAcquisition { ty, candidates } => Diagnostic::error(self.kind.to_string())
                .with_code("E0901")
                .with_primary(self.span, format!("`{}` has {} enumerable implementations", ty, candidates.len()))
                .with_help("convert the collection to the enumerable you mean"),

            MalformedAdvanceOrCurrentShape { enumerator, member } => Diagnostic::error(self.kind.to_string())
                .with_code("E0902")
                .with_primary(self.span, "returned by the enumeration pattern here")
                .with_note(format!("`{}` needs `move_next` returning bool and a `current` property", enumerator))
                .with_help(format!("fix the signature of `{}`", member)),

            ElementConversionMissing { from, to } => Diagnostic::error(self.kind.to_string())
                .with_code("E0903")
                .with_primary(self.span, format!("expected `{}`, found `{}`", to, from))
                .with_help("use `var` to take the element type"),

            DestructuringArityMismatch { expected, found, .. } => {
                let label = match found {
                    Some(n) => format!("{} names for {} elements", expected, n),
                    None => "element is not a tuple".to_string(),
                };
                Diagnostic::error(self.kind.to_string()).with_code("E0904").with_primary(self.span, label)
            }

            InvalidRefElement { reason } => Diagnostic::error(self.kind.to_string())
                .with_code("E0905")
                .with_primary(self.span, reason.clone()),

            PatternNotApplicable { member, .. } => Diagnostic::warning(self.kind.to_string())
                .with_code("E0906")
                .with_primary(self.span, format!("`{}` is ignored", member))
                .with_note("a usable pattern member takes no required arguments and is not static"),
        }
    }
}

// ============================================================================
// Lowering Errors
// ============================================================================

impl ToDiagnostic for LoweringError {
    fn to_diagnostic(&self) -> Diagnostic {
        match &self.kind {
            LoweringErrorKind::UnknownLoopLabel { label, in_scope } => {
                let mut diag = Diagnostic::error(self.kind.to_string())
                    .with_code("E0920")
                    .with_primary(self.span, "no loop with this label");
                if let Some(hint) = did_you_mean(label, in_scope.iter().map(String::as_str)) {
                    diag = diag.with_help(hint);
                } else if !in_scope.is_empty() {
                    diag = diag.with_note(format!("enclosing loops are labelled {}", quoted(in_scope)));
                }
                diag
            }

            LoweringErrorKind::TransferOutsideLoop { keyword } => Diagnostic::error(self.kind.to_string())
                .with_code("E0921")
                .with_primary(self.span, format!("cannot `{}` here", keyword)),
        }
    }
}

fn quoted(names: &[String]) -> String {
    names.iter().map(|n| format!("`{}`", n)).collect::<Vec<_>>().join(", ")
}

impl ToDiagnostic for BindDiagnostic {
    fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BindDiagnostic::LoopTree(e) => e.to_diagnostic(),
            BindDiagnostic::Iteration(e) => e.to_diagnostic(),
            BindDiagnostic::Lowering(e) => e.to_diagnostic(),
        }
    }
}

// ============================================================================
// Type Table Errors
// ============================================================================

impl ToDiagnostic for TypeError {
    fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            TypeError::Undefined(_) => "E0930",
            TypeError::InvalidTypeString(_) | TypeError::CapabilityArity { .. } => "E0931",
            _ => "E0932",
        };
        Diagnostic::error(self.to_string()).with_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, Severity};
    use skein_ast::Span;

    #[test]
    fn pattern_warning_stays_a_warning() {
        let e = IterationError::pattern_not_applicable("List".into(), "get_enumerator", Span::new(3, 8));
        let d = BindDiagnostic::from(e).to_diagnostic();
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.code, Some(ErrorCode("E0906".into())));
        assert_eq!(d.primary_span(), Some(Span::new(3, 8)));
    }

    #[test]
    fn duplicate_points_at_both_declarations() {
        let e = LoopTreeError::duplicate("x".into(), Span::new(20, 21), Span::new(4, 5));
        let d = e.to_diagnostic();
        assert_eq!(d.labels.len(), 2);
        assert_eq!(d.labels[1].span, Span::new(4, 5));
    }

    #[test]
    fn unknown_label_suggests_a_near_miss() {
        let e = LoweringError::unknown_label("outr".into(), vec!["inner".into(), "outer".into()], Span::DUMMY);
        let d = e.to_diagnostic();
        assert_eq!(d.help.map(|h| h.message), Some("did you mean `outer`?".to_string()));

        let e = LoweringError::unknown_label("rows".into(), vec!["cells".into()], Span::DUMMY);
        let d = e.to_diagnostic();
        assert!(d.help.is_none());
        assert_eq!(d.notes, vec!["enclosing loops are labelled `cells`".to_string()]);
    }

    #[test]
    fn type_errors_have_no_labels() {
        let d = TypeError::Undefined("Foo".into()).to_diagnostic();
        assert_eq!(d.message, "undefined type: Foo");
        assert!(d.labels.is_empty());
        assert_eq!(d.code, Some(ErrorCode("E0930".into())));
    }
}
