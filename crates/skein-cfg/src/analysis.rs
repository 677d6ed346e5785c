// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Structural checks on a finished graph.
//!
//! Lowering builds graphs that pass these by construction; later passes and
//! tests use them to catch regressions.

use std::collections::HashSet;

use crate::graph::{BlockId, ControlFlowGraph, RegionId, RegionKind, Terminator};
use crate::transform::suspension::{self, SuspensionError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("bb{0} has no terminator")]
    Unterminated(u32),
    #[error("bb{block} jumps to bb{target}, which is not in the layout")]
    DanglingEdge { block: u32, target: u32 },
    #[error("blocks of r{0} are not contiguous")]
    NonContiguous(u32),
    #[error("try/finally r{0} must have exactly a try and a finally child")]
    MalformedTryFinally(u32),
    #[error("edge bb{block} -> bb{target} leaves try r{region} without running its finally")]
    SkippedFinally { block: u32, target: u32, region: u32 },
    #[error("edge bb{block} -> bb{target} jumps into finally r{region}")]
    EntersFinally { block: u32, target: u32, region: u32 },
    #[error("edge bb{block} -> bb{target} enters try r{region} past its first block")]
    EntersTryMidway { block: u32, target: u32, region: u32 },
    #[error(transparent)]
    Suspension(#[from] SuspensionError),
}

/// Every structural problem in `graph`, in a stable order.
pub fn validate(graph: &ControlFlowGraph) -> Vec<GraphError> {
    let mut errors = Vec::new();
    let placed: HashSet<BlockId> = graph.layout.iter().copied().collect();

    for block in graph.blocks_in_order() {
        if block.terminator == Terminator::Unreachable {
            errors.push(GraphError::Unterminated(block.id.0));
        }
        for edge in block.terminator.edges() {
            if !placed.contains(&edge.target) {
                errors.push(GraphError::DanglingEdge { block: block.id.0, target: edge.target.0 });
            }
        }
    }

    for region in &graph.regions {
        if !is_contiguous(graph, region.id) {
            errors.push(GraphError::NonContiguous(region.id.0));
        }
        if region.kind == RegionKind::TryFinally {
            let kinds: Vec<RegionKind> = region.children.iter().map(|c| graph.region(*c).kind).collect();
            if kinds != [RegionKind::Try, RegionKind::Finally] {
                errors.push(GraphError::MalformedTryFinally(region.id.0));
            }
        }
    }

    errors.extend(check_edges(graph));

    if let Err(err) = suspension::verify(graph) {
        errors.push(err.into());
    }
    errors
}

/// Leaving a try runs its finally; finally and try bodies are only entered
/// at the top, and finally handlers only through `finalizing`.
fn check_edges(graph: &ControlFlowGraph) -> Vec<GraphError> {
    let mut errors = Vec::new();
    for (block, edge) in graph.edges() {
        for left in &edge.leaving {
            if let Some(finally) = graph.finally_of(*left) {
                if !edge.finalizing.contains(&finally) {
                    errors.push(GraphError::SkippedFinally { block: block.0, target: edge.target.0, region: left.0 });
                }
            }
        }
        for entered in &edge.entering {
            let region = graph.region(*entered);
            match region.kind {
                RegionKind::Finally => errors.push(GraphError::EntersFinally {
                    block: block.0,
                    target: edge.target.0,
                    region: entered.0,
                }),
                RegionKind::Try if region.first_block != Some(edge.target) => {
                    errors.push(GraphError::EntersTryMidway { block: block.0, target: edge.target.0, region: entered.0 })
                }
                _ => {}
            }
        }
    }
    errors
}

fn is_contiguous(graph: &ControlFlowGraph, region: RegionId) -> bool {
    let positions: Vec<usize> = graph
        .layout
        .iter()
        .enumerate()
        .filter(|(_, b)| graph.is_within(graph.block(**b).region, region))
        .map(|(i, _)| i)
        .collect();
    positions.windows(2).all(|w| w[1] == w[0] + 1)
}

/// Blocks reachable from the entry, following regular edges and the finally
/// handlers they run.
pub fn reachable_blocks(graph: &ControlFlowGraph) -> HashSet<BlockId> {
    let mut seen = HashSet::new();
    let mut stack = vec![graph.entry];
    while let Some(block) = stack.pop() {
        if !seen.insert(block) {
            continue;
        }
        for edge in graph.block(block).terminator.edges() {
            stack.push(edge.target);
            for finally in &edge.finalizing {
                stack.extend(graph.region(*finally).first_block);
            }
        }
        // Unwinding out of a try runs its finally too.
        for finally in graph.unwind_handlers(block) {
            stack.extend(graph.region(finally).first_block);
        }
    }
    seen
}
