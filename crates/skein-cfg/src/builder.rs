// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! GraphBuilder - helper for CFG construction during lowering.
//!
//! Blocks can be reserved before they are placed, so jumps to labels that
//! are bound later need no patching. A block joins the innermost open region
//! when it is placed; region crossings on edges are computed by `finish`.

use std::collections::HashMap;

use skein_ast::{NodeId, RefKind};
use skein_bind::{LabelAllocator, LabelId};
use skein_types::Type;

use crate::graph::{
    BasicBlock, BlockId, Capture, CaptureId, ControlFlowGraph, Edge, Local, LocalId, Operation, Region,
    RegionId, RegionKind, SuspensionPoint, SuspensionSite, Terminator,
};

pub struct GraphBuilder {
    name: String,
    blocks: Vec<BasicBlock>,
    placed: Vec<bool>,
    layout: Vec<BlockId>,
    regions: Vec<Region>,
    region_stack: Vec<RegionId>,
    locals: Vec<Local>,
    captures: Vec<Capture>,
    current: BlockId,
    entry: BlockId,
    exit: BlockId,
    labels: LabelAllocator,
    label_blocks: HashMap<LabelId, BlockId>,
    suspensions: Vec<SuspensionPoint>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let root = Region {
            id: ControlFlowGraph::ROOT,
            kind: RegionKind::Root,
            parent: None,
            children: Vec::new(),
            locals: Vec::new(),
            captures: Vec::new(),
            first_block: None,
            last_block: None,
        };
        let mut builder = Self {
            name: name.into(),
            blocks: Vec::new(),
            placed: Vec::new(),
            layout: Vec::new(),
            regions: vec![root],
            region_stack: vec![ControlFlowGraph::ROOT],
            locals: Vec::new(),
            captures: Vec::new(),
            current: BlockId(0),
            entry: BlockId(0),
            exit: BlockId(0),
            labels: LabelAllocator::new(),
            label_blocks: HashMap::new(),
            suspensions: Vec::new(),
        };
        builder.entry = builder.create_block();
        builder.exit = builder.reserve_block();
        builder
    }

    /// Labels for every loop of this method come from here.
    pub fn labels_mut(&mut self) -> &mut LabelAllocator {
        &mut self.labels
    }

    /// Allocate a block without placing it.
    pub fn reserve_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            region: ControlFlowGraph::ROOT,
            operations: Vec::new(),
            terminator: Terminator::Unreachable,
            suspensions: Vec::new(),
        });
        self.placed.push(false);
        id
    }

    /// Append a reserved block to the layout in the innermost open region
    /// and make it current.
    pub fn place_block(&mut self, block: BlockId) {
        let idx = block.0 as usize;
        if self.placed[idx] {
            self.current = block;
            return;
        }
        self.placed[idx] = true;
        self.blocks[idx].region = self.current_region();
        self.layout.push(block);
        self.current = block;
    }

    pub fn create_block(&mut self) -> BlockId {
        let block = self.reserve_block();
        self.place_block(block);
        block
    }

    /// The block a label is bound to, reserving it on first use.
    pub fn label_block(&mut self, label: LabelId) -> BlockId {
        if let Some(block) = self.label_blocks.get(&label) {
            return *block;
        }
        let block = self.reserve_block();
        self.label_blocks.insert(label, block);
        block
    }

    /// Bind `label` to an existing block.
    pub fn bind_label(&mut self, label: LabelId, block: BlockId) {
        self.label_blocks.insert(label, block);
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn exit_block(&self) -> BlockId {
        self.exit
    }

    pub fn current_region(&self) -> RegionId {
        self.region_stack.last().copied().unwrap_or(ControlFlowGraph::ROOT)
    }

    pub fn push(&mut self, op: Operation) {
        self.blocks[self.current.0 as usize].operations.push(op);
    }

    pub fn terminate(&mut self, term: Terminator) {
        self.blocks[self.current.0 as usize].terminator = term;
    }

    pub fn goto(&mut self, target: BlockId) {
        self.terminate(Terminator::Goto(Edge::to(target)));
    }

    /// Check if the current block still has the default Unreachable terminator.
    pub fn current_block_unterminated(&self) -> bool {
        matches!(self.blocks[self.current.0 as usize].terminator, Terminator::Unreachable)
    }

    /// Start a fresh block with no predecessors after an unconditional
    /// transfer.
    pub fn start_dead_block(&mut self) {
        self.create_block();
    }

    pub fn open_region(&mut self, kind: RegionKind) -> RegionId {
        let parent = self.current_region();
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Region {
            id,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            locals: Vec::new(),
            captures: Vec::new(),
            first_block: None,
            last_block: None,
        });
        self.regions[parent.0 as usize].children.push(id);
        self.region_stack.push(id);
        tracing::trace!(region = id.0, ?kind, "open region");
        id
    }

    /// Close the innermost region, which must be `region`.
    pub fn close_region(&mut self, region: RegionId) {
        debug_assert_eq!(self.region_stack.last(), Some(&region), "regions must close innermost first");
        if self.region_stack.len() > 1 && self.region_stack.last() == Some(&region) {
            self.region_stack.pop();
            tracing::trace!(region = region.0, "close region");
        }
    }

    /// Declare a local in the innermost locals scope.
    pub fn declare_local(&mut self, name: Option<String>, ty: Type, ref_kind: RefKind) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        let region = self.locals_owner();
        self.locals.push(Local { id, name, ty, ref_kind, region });
        self.regions[region.0 as usize].locals.push(id);
        id
    }

    /// Allocate a capture owned by the innermost locals scope.
    pub fn capture(&mut self, ty: Type) -> CaptureId {
        let id = CaptureId(self.captures.len() as u32);
        let region = self.locals_owner();
        self.captures.push(Capture { id, ty, region });
        self.regions[region.0 as usize].captures.push(id);
        id
    }

    fn locals_owner(&self) -> RegionId {
        self.region_stack
            .iter()
            .rev()
            .copied()
            .find(|r| matches!(self.regions[r.0 as usize].kind, RegionKind::LocalsScope | RegionKind::Root))
            .unwrap_or(ControlFlowGraph::ROOT)
    }

    /// Record a suspension point emitted in `block`; returns its sequence
    /// number.
    pub(crate) fn record_suspension(&mut self, block: BlockId, loop_id: NodeId, site: SuspensionSite) -> u32 {
        let seq = self.suspensions.len() as u32;
        self.suspensions.push(SuspensionPoint { seq, loop_id, site, block });
        self.blocks[block.0 as usize].suspensions.push(seq);
        seq
    }

    pub fn finish(mut self) -> ControlFlowGraph {
        while self.region_stack.len() > 1 {
            self.region_stack.pop();
        }
        if self.current_block_unterminated() && self.current != self.exit {
            let exit = self.exit;
            self.terminate(Terminator::Return { value: None, edge: Edge::to(exit) });
        }
        self.place_block(self.exit);
        self.terminate(Terminator::Exit);
        // Jump targets that were never bound still need a home.
        for idx in 0..self.blocks.len() {
            if !self.placed[idx] {
                self.place_block(BlockId(idx as u32));
            }
        }

        let mut graph = ControlFlowGraph {
            name: self.name,
            blocks: self.blocks,
            layout: self.layout,
            regions: self.regions,
            locals: self.locals,
            captures: self.captures,
            entry: self.entry,
            exit: self.exit,
            suspensions: self.suspensions,
        };
        compute_region_bounds(&mut graph);
        compute_crossings(&mut graph);
        graph
    }
}

fn compute_region_bounds(graph: &mut ControlFlowGraph) {
    for pos in 0..graph.layout.len() {
        let block = graph.layout[pos];
        for region in graph.ancestors(graph.block(block).region) {
            let r = &mut graph.regions[region.0 as usize];
            r.first_block.get_or_insert(block);
            r.last_block = Some(block);
        }
    }
}

fn compute_crossings(graph: &mut ControlFlowGraph) {
    let mut updates = Vec::new();
    for block in &graph.blocks {
        for (i, edge) in block.terminator.edges().iter().enumerate() {
            let from = graph.ancestors(block.region);
            let to = graph.ancestors(graph.block(edge.target).region);
            let leaving: Vec<RegionId> = from.iter().copied().take_while(|r| !to.contains(r)).collect();
            let mut entering: Vec<RegionId> = to.iter().copied().take_while(|r| !from.contains(r)).collect();
            entering.reverse();
            let finalizing = leaving.iter().filter_map(|r| graph.finally_of(*r)).collect();
            updates.push((block.id, i, leaving, entering, finalizing));
        }
    }
    for (block, i, leaving, entering, finalizing) in updates {
        let mut edges = graph.blocks[block.0 as usize].terminator.edges_mut();
        if let Some(edge) = edges.get_mut(i) {
            edge.leaving = leaving;
            edge.entering = entering;
            edge.finalizing = finalizing;
        }
    }
}
