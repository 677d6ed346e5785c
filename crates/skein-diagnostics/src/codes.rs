// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error code registry.
//!
//! Iteration errors live in E09xx: E090x for protocol resolution, E091x for
//! the loop construct itself, E092x for control transfers and E093x for the
//! type table.

use std::collections::HashMap;

pub struct ErrorCodeRegistry {
    codes: HashMap<&'static str, ErrorCodeInfo>,
}

pub struct ErrorCodeInfo {
    pub code: &'static str,
    pub title: &'static str,
    pub category: ErrorCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Iteration,
    Type,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Iteration => write!(f, "Iteration"),
            ErrorCategory::Type => write!(f, "Type"),
        }
    }
}

macro_rules! register_codes {
    ($($code:literal => ($title:literal, $cat:expr)),* $(,)?) => {{
        let mut map = HashMap::new();
        $(
            map.insert($code, ErrorCodeInfo {
                code: $code,
                title: $title,
                category: $cat,
            });
        )*
        map
    }};
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        use ErrorCategory::*;

        Self {
            codes: register_codes! {
                // Protocol resolution (E090x)
                "E0900" => ("type cannot be iterated", Iteration),
                "E0901" => ("ambiguous enumerable implementation", Iteration),
                "E0902" => ("malformed enumerator", Iteration),
                "E0903" => ("element conversion missing", Iteration),
                "E0904" => ("destructuring arity mismatch", Iteration),
                "E0905" => ("invalid by-reference loop variable", Iteration),
                "E0906" => ("enumeration pattern not applicable", Iteration),

                // Loop construct (E091x)
                "E0910" => ("invalid loop variable", Iteration),
                "E0911" => ("duplicate declaration", Iteration),
                "E0912" => ("iteration over null", Iteration),

                // Control transfer (E092x)
                "E0920" => ("unknown loop label", Iteration),
                "E0921" => ("transfer outside of loop", Iteration),

                // Type table (E093x)
                "E0930" => ("undefined type", Type),
                "E0931" => ("invalid type", Type),
                "E0932" => ("invalid type definition", Type),
            },
        }
    }
}

impl ErrorCodeRegistry {
    pub fn get(&self, code: &str) -> Option<&ErrorCodeInfo> {
        self.codes.get(code)
    }

    /// Every code, sorted.
    pub fn all(&self) -> Vec<&ErrorCodeInfo> {
        let mut all: Vec<_> = self.codes.values().collect();
        all.sort_by_key(|info| info.code);
        all
    }
}
