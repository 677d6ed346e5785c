// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Local name scopes of one method body.

use std::collections::HashMap;

use skein_ast::Span;

/// Names declared in one method, block or loop scope.
type Scope = HashMap<String, Span>;

/// Stack of scopes, innermost last. The bottom scope holds the method's
/// parameters.
///
/// No scope inside a method body may shadow another: a local cannot be
/// redeclared while an outer declaration of the same name is in scope.
/// [`ScopeChain::define`] reports the earlier declaration but still records
/// the new one, so later lookups see the shadowing name.
#[derive(Debug)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeChain {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// Pop the innermost scope. The method scope is never popped.
    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Span of the visible declaration of `name`.
    pub fn lookup(&self, name: &str) -> Option<Span> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    /// Define `name` in the innermost scope. Returns the span of a previous
    /// visible declaration, if any.
    pub fn define(&mut self, name: &str, span: Span) -> Result<(), Span> {
        let previous = self.lookup(name);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), span);
        }
        match previous {
            Some(prev) => Err(prev),
            None => Ok(()),
        }
    }
}
