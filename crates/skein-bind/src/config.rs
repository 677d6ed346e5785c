// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Iteration resolver configuration.

use serde::{Deserialize, Serialize};

/// Which enumerators may be disposed through a `dispose` member that is not
/// backed by the disposal capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralDisposal {
    /// Only stack-only structs, which cannot implement capabilities.
    #[default]
    RefLikeOnly,
    /// Any value type or sealed class.
    AllExact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    /// Index-based lowering for arrays and strings. Spans always use it.
    pub builtin_fast_paths: bool,
    /// Allow acquisition members supplied by extension scopes.
    pub extension_acquisition: bool,
    pub structural_disposal: StructuralDisposal,
    /// Async loops try the async disposal capability before the sync one.
    pub prefer_async_disposal: bool,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            builtin_fast_paths: true,
            extension_acquisition: true,
            structural_disposal: StructuralDisposal::RefLikeOnly,
            prefer_async_disposal: true,
        }
    }
}

impl IterationConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = IterationConfig::from_json(r#"{ "structural_disposal": "all_exact" }"#).unwrap();
        assert_eq!(config.structural_disposal, StructuralDisposal::AllExact);
        assert!(config.builtin_fast_paths);
        assert!(config.prefer_async_disposal);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(IterationConfig::from_json(r#"{ "structural_disposal": "always" }"#).is_err());
    }
}
