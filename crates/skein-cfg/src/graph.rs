// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Region-structured control-flow graph.
//!
//! Blocks are stored by id; `layout` gives their program order. Every region
//! covers a contiguous run of `layout`, and regions nest strictly. Edges
//! record the regions they leave and enter and the finally handlers that run
//! on the way.

use skein_ast::{NodeId, RefKind};
use skein_bind::MemberRef;
use skein_types::{ConstValue, Conversion, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

/// A numbered write-once temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Root,
    LocalsScope,
    /// Has exactly two children: `Try` then `Finally`.
    TryFinally,
    Try,
    Finally,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    pub kind: RegionKind,
    pub parent: Option<RegionId>,
    pub children: Vec<RegionId>,
    pub locals: Vec<LocalId>,
    pub captures: Vec<CaptureId>,
    /// First and last block in layout order, including nested regions.
    pub first_block: Option<BlockId>,
    pub last_block: Option<BlockId>,
}

#[derive(Debug, Clone)]
pub struct Local {
    pub id: LocalId,
    /// `None` for synthesized locals such as the index of a built-in loop.
    pub name: Option<String>,
    pub ty: Type,
    pub ref_kind: RefKind,
    pub region: RegionId,
}

#[derive(Debug, Clone)]
pub struct Capture {
    pub id: CaptureId,
    pub ty: Type,
    pub region: RegionId,
}

/// Operand of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Capture(CaptureId),
    Local(LocalId),
    /// Expression bound by the outer binder, evaluated in place.
    Expr { node: NodeId, text: String },
    Const(ConstValue),
    /// Explicit empty collection for a variadic parameter.
    EmptyCollection(Type),
    /// Placeholder for an erroneous part.
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rvalue {
    Use(Value),
    Convert { value: Box<Rvalue>, conversion: Conversion },
    /// Instance call, or extension call with `receiver` as first argument.
    Call { member: MemberRef, receiver: Option<Box<Rvalue>>, args: Vec<Value> },
    /// Suspension point.
    Await(Box<Rvalue>),
    /// Reference to the element rather than a copy.
    ElementRef { value: Box<Rvalue>, read_only: bool },
    IsNull(Value),
}

impl Rvalue {
    pub fn is_await(&self) -> bool {
        matches!(self, Rvalue::Await(_))
    }

    /// Number of suspension points in this rvalue.
    pub fn await_count(&self) -> usize {
        match self {
            Rvalue::Use(_) | Rvalue::IsNull(_) => 0,
            Rvalue::Convert { value, .. } | Rvalue::ElementRef { value, .. } => value.await_count(),
            Rvalue::Call { receiver, .. } => receiver.as_ref().map_or(0, |r| r.await_count()),
            Rvalue::Await(inner) => 1 + inner.await_count(),
        }
    }

    /// The member this rvalue calls, looking through awaits and conversions.
    pub fn called_member(&self) -> Option<&MemberRef> {
        match self {
            Rvalue::Call { member, .. } => Some(member),
            Rvalue::Await(inner) | Rvalue::Convert { value: inner, .. } | Rvalue::ElementRef { value: inner, .. } => {
                inner.called_member()
            }
            Rvalue::Use(_) | Rvalue::IsNull(_) => None,
        }
    }
}

/// Assignment destination.
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Local(LocalId),
    /// A variable declared outside the lowered method body.
    Named(String),
    /// Member or element access.
    Expr { node: NodeId, text: String },
    Discard,
}

/// Left-hand side of a destructuring assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Bind { place: Place, conversion: Conversion },
    Tuple { from: Type, elements: Vec<Pattern> },
}

impl Pattern {
    pub fn places(&self) -> Vec<&Place> {
        match self {
            Pattern::Bind { place, .. } => vec![place],
            Pattern::Tuple { elements, .. } => elements.iter().flat_map(Pattern::places).collect(),
        }
    }
}

/// Straight-line operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Capture { id: CaptureId, value: Rvalue },
    Assign { place: Place, value: Rvalue },
    Deconstruct { pattern: Pattern, value: Rvalue },
    Eval(Rvalue),
}

impl Operation {
    pub fn rvalue(&self) -> &Rvalue {
        match self {
            Operation::Capture { value, .. }
            | Operation::Assign { value, .. }
            | Operation::Deconstruct { value, .. }
            | Operation::Eval(value) => value,
        }
    }
}

/// Control transfer to a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub target: BlockId,
    /// Innermost first.
    pub leaving: Vec<RegionId>,
    /// Outermost first.
    pub entering: Vec<RegionId>,
    /// `Finally` regions run on this edge, innermost first.
    pub finalizing: Vec<RegionId>,
}

impl Edge {
    /// Region crossings are filled in when the graph is finished.
    pub fn to(target: BlockId) -> Self {
        Self { target, leaving: Vec::new(), entering: Vec::new(), finalizing: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Goto(Edge),
    /// Goes to `target` when `condition == jump_if_true`.
    ConditionalGoto { condition: Rvalue, jump_if_true: bool, target: Edge, fallthrough: Edge },
    Return { value: Option<Value>, edge: Edge },
    /// Exceptional unwinding; no regular successor.
    Throw(Value),
    /// End of a finally handler; control continues along the edge that ran it.
    EndFinally,
    /// The method exit block.
    Exit,
    /// Not yet terminated.
    Unreachable,
}

impl Terminator {
    pub fn edges(&self) -> Vec<&Edge> {
        match self {
            Terminator::Goto(edge) | Terminator::Return { edge, .. } => vec![edge],
            Terminator::ConditionalGoto { target, fallthrough, .. } => vec![target, fallthrough],
            Terminator::Throw(_) | Terminator::EndFinally | Terminator::Exit | Terminator::Unreachable => {
                Vec::new()
            }
        }
    }

    pub(crate) fn edges_mut(&mut self) -> Vec<&mut Edge> {
        match self {
            Terminator::Goto(edge) | Terminator::Return { edge, .. } => vec![edge],
            Terminator::ConditionalGoto { target, fallthrough, .. } => vec![target, fallthrough],
            Terminator::Throw(_) | Terminator::EndFinally | Terminator::Exit | Terminator::Unreachable => {
                Vec::new()
            }
        }
    }

    pub fn await_count(&self) -> usize {
        match self {
            Terminator::ConditionalGoto { condition, .. } => condition.await_count(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspensionSite {
    Acquisition,
    Advance,
    Disposal,
}

/// A marked suspension point. `seq` increases in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspensionPoint {
    pub seq: u32,
    pub loop_id: NodeId,
    pub site: SuspensionSite,
    pub block: BlockId,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub region: RegionId,
    pub operations: Vec<Operation>,
    pub terminator: Terminator,
    /// Sequence numbers of the suspension points emitted in this block.
    pub suspensions: Vec<u32>,
}

impl BasicBlock {
    pub fn await_count(&self) -> usize {
        self.operations.iter().map(|op| op.rvalue().await_count()).sum::<usize>() + self.terminator.await_count()
    }
}

/// Lowered method body.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub name: String,
    /// Indexed by `BlockId`.
    pub blocks: Vec<BasicBlock>,
    /// Blocks in program order.
    pub layout: Vec<BlockId>,
    /// Indexed by `RegionId`; region 0 is the root.
    pub regions: Vec<Region>,
    pub locals: Vec<Local>,
    pub captures: Vec<Capture>,
    pub entry: BlockId,
    pub exit: BlockId,
    pub suspensions: Vec<SuspensionPoint>,
}

impl ControlFlowGraph {
    pub const ROOT: RegionId = RegionId(0);

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.0 as usize]
    }

    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id.0 as usize]
    }

    /// Blocks in program order.
    pub fn blocks_in_order(&self) -> impl Iterator<Item = &BasicBlock> {
        self.layout.iter().map(move |id| self.block(*id))
    }

    pub fn regions_of_kind(&self, kind: RegionKind) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(move |r| r.kind == kind)
    }

    /// `region` and its ancestors, innermost first.
    pub fn ancestors(&self, region: RegionId) -> Vec<RegionId> {
        let mut out = vec![region];
        let mut next = self.region(region).parent;
        while let Some(parent) = next {
            out.push(parent);
            next = self.region(parent).parent;
        }
        out
    }

    pub fn is_within(&self, region: RegionId, ancestor: RegionId) -> bool {
        self.ancestors(region).contains(&ancestor)
    }

    /// Blocks of `region` and its descendants, in program order.
    pub fn blocks_in_region(&self, region: RegionId) -> Vec<BlockId> {
        self.layout
            .iter()
            .copied()
            .filter(|b| self.is_within(self.block(*b).region, region))
            .collect()
    }

    /// Every regular edge with its source block, in program order.
    pub fn edges(&self) -> impl Iterator<Item = (BlockId, &Edge)> {
        self.blocks_in_order()
            .flat_map(|b| b.terminator.edges().into_iter().map(move |e| (b.id, e)))
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.block(block).terminator.edges().iter().map(|e| e.target).collect()
    }

    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.edges().filter(|(_, e)| e.target == block).map(|(src, _)| src).collect()
    }

    /// The `Finally` sibling of a `Try` region.
    pub fn finally_of(&self, try_region: RegionId) -> Option<RegionId> {
        let region = self.region(try_region);
        if region.kind != RegionKind::Try {
            return None;
        }
        let parent = self.region(region.parent?);
        parent.children.iter().copied().find(|c| self.region(*c).kind == RegionKind::Finally)
    }

    /// Finally handlers run when an exception unwinds out of `block`,
    /// innermost first.
    pub fn unwind_handlers(&self, block: BlockId) -> Vec<RegionId> {
        self.ancestors(self.block(block).region)
            .into_iter()
            .filter_map(|r| self.finally_of(r))
            .collect()
    }
}
