// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Loop tree construction and iteration protocol resolution.
//!
//! For each `foreach` in a method body, [`LoopTreeBuilder`] validates the
//! construct and produces a [`LoopTree`], then [`IterationResolver`] decides
//! how its collection is iterated and produces an [`IterationBinding`]. Both
//! report through a [`DiagnosticSink`] and never fail outright: erroneous
//! parts become placeholders so the CFG can still be built.

mod binding;
mod config;
mod errors;
mod loop_tree;
mod resolver;
mod scope;
mod sink;

pub use binding::{
    Acquisition, Advance, CursorOp, Current, Disposal, ElementConversion, IterationBinding,
    MemberRef, ProtocolKind,
};
pub use config::{IterationConfig, StructuralDisposal};
pub use errors::{
    BindDiagnostic, IterationError, IterationErrorKind, LoopTreeError, LoopTreeErrorKind,
    LoweringError, LoweringErrorKind,
};
pub use loop_tree::{
    CollectionExpr, ElementTarget, LabelAllocator, LabelId, LoopLabels, LoopTree, LoopTreeBuilder,
    VariableTarget,
};
pub use resolver::{IterationResolver, Resolution};
pub use scope::ScopeChain;
pub use sink::{DiagnosticBag, DiagnosticSink};
