// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Diagnostic reporting.

use std::sync::Mutex;

use crate::errors::BindDiagnostic;

/// Structured error/warning reporting.
///
/// Shared by every method body being lowered, possibly from several threads.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: BindDiagnostic);
}

/// Append-only, thread-safe collection of reported diagnostics.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    items: Mutex<Vec<BindDiagnostic>>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_items<R>(&self, f: impl FnOnce(&mut Vec<BindDiagnostic>) -> R) -> R {
        // A panic elsewhere cannot leave a Vec half-pushed.
        let mut guard = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.with_items(|items| items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_errors(&self) -> bool {
        self.with_items(|items| items.iter().any(BindDiagnostic::is_error))
    }

    /// Copy of everything reported so far, in report order.
    pub fn snapshot(&self) -> Vec<BindDiagnostic> {
        self.with_items(|items| items.clone())
    }

    pub fn into_vec(self) -> Vec<BindDiagnostic> {
        self.items.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for DiagnosticBag {
    fn report(&self, diagnostic: BindDiagnostic) {
        tracing::debug!(%diagnostic, "reported");
        self.with_items(|items| items.push(diagnostic));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{IterationError, LoopTreeError};
    use skein_ast::Span;

    #[test]
    fn concurrent_reports_are_all_kept() {
        let bag = DiagnosticBag::new();
        std::thread::scope(|s| {
            for t in 0..4 {
                let bag = &bag;
                s.spawn(move || {
                    for i in 0..25 {
                        bag.report(LoopTreeError::null_collection(Span::new(t * 100 + i, t * 100 + i + 1)).into());
                    }
                });
            }
        });
        assert_eq!(bag.len(), 100);
        assert!(bag.has_errors());
    }

    #[test]
    fn warnings_only() {
        let bag = DiagnosticBag::new();
        assert!(bag.is_empty());
        bag.report(IterationError::pattern_not_applicable("Bag".into(), "get_enumerator", Span::DUMMY).into());
        assert!(!bag.has_errors());
        assert_eq!(bag.into_vec().len(), 1);
    }
}
