// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Region-structured CFG construction for iteration loops.
//!
//! Each method body becomes a [`ControlFlowGraph`]: basic blocks in program
//! order, nested regions (locals scopes and try/finally pairs), and edges that
//! know which regions they leave and which finally handlers they run. Loops
//! are expanded into acquisition, advance, element binding and disposal, with
//! suspension points marked for asynchronous loops.

mod builder;
mod display;
mod graph;

pub mod analysis;
pub mod lower;
pub mod transform;

pub use builder::GraphBuilder;
pub use graph::{
    BasicBlock, BlockId, Capture, CaptureId, ControlFlowGraph, Edge, Local, LocalId, Operation, Pattern,
    Place, Region, RegionId, RegionKind, Rvalue, SuspensionPoint, SuspensionSite, Terminator, Value,
};
pub use lower::{lower_method, LoweredLoop, LoweringContext, MethodLowerer};
pub use transform::suspension::{SuspensionError, annotate, points_for_loop};
