// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Suspension point annotation for asynchronous loops.
//!
//! Only the acquisition, advance and disposal calls of a loop may suspend.
//! Each one that does is marked on the block that emits it with a sequence
//! number in program order. A later state-machine pass splits blocks at
//! these markers; nothing here splits blocks.

use skein_ast::NodeId;

use crate::builder::GraphBuilder;
use crate::graph::{BlockId, ControlFlowGraph, SuspensionPoint, SuspensionSite};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuspensionError {
    #[error("bb{block} suspends {found} time(s) but carries {marked} marker(s)")]
    Unmarked { block: u32, found: usize, marked: usize },
    #[error("suspension point {seq} is out of program order")]
    OutOfOrder { seq: u32 },
    #[error("suspension point {seq} names bb{block}, which does not list it")]
    Misplaced { seq: u32, block: u32 },
}

/// Mark a suspending call just emitted into `block`.
pub fn annotate(builder: &mut GraphBuilder, block: BlockId, loop_id: NodeId, site: SuspensionSite) -> u32 {
    let seq = builder.record_suspension(block, loop_id, site);
    tracing::debug!(seq, loop_id = loop_id.0, ?site, block = block.0, "suspension point");
    seq
}

/// Markers of one loop, in program order.
pub fn points_for_loop(graph: &ControlFlowGraph, loop_id: NodeId) -> Vec<SuspensionPoint> {
    graph.suspensions.iter().filter(|p| p.loop_id == loop_id).copied().collect()
}

/// Check that every suspension in the graph is marked where it happens and
/// that markers are ordered acquisition, advance, disposal within each loop.
pub fn verify(graph: &ControlFlowGraph) -> Result<(), SuspensionError> {
    for block in graph.blocks_in_order() {
        let found = block.await_count();
        if found != block.suspensions.len() {
            return Err(SuspensionError::Unmarked { block: block.id.0, found, marked: block.suspensions.len() });
        }
    }

    let mut last: Option<u32> = None;
    for point in &graph.suspensions {
        if last.is_some_and(|prev| point.seq <= prev) {
            return Err(SuspensionError::OutOfOrder { seq: point.seq });
        }
        last = Some(point.seq);
        if !graph.block(point.block).suspensions.contains(&point.seq) {
            return Err(SuspensionError::Misplaced { seq: point.seq, block: point.block.0 });
        }
    }

    let mut loops: Vec<NodeId> = graph.suspensions.iter().map(|p| p.loop_id).collect();
    loops.sort();
    loops.dedup();
    for loop_id in loops {
        let points = points_for_loop(graph, loop_id);
        for pair in points.windows(2) {
            if site_rank(pair[1].site) < site_rank(pair[0].site) {
                return Err(SuspensionError::OutOfOrder { seq: pair[1].seq });
            }
        }
    }
    Ok(())
}

fn site_rank(site: SuspensionSite) -> u8 {
    match site {
        SuspensionSite::Acquisition => 0,
        SuspensionSite::Advance => 1,
        SuspensionSite::Disposal => 2,
    }
}
